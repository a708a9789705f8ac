//! # storecast
//!
//! `storecast` pushes live table status for a chain of stores to browsers
//! over Server-Sent Events. Each store is a topic; every client watching a
//! store holds one long-lived HTTP response that the server writes events to.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `broker`: the topic registry, the broadcaster and the connection lifecycle.
//! - `client`: a single subscriber connection and its state machine.
//! - `publisher`: periodic per-topic snapshot publishing.
//! - `store`: the in-memory store and table catalog that snapshots come from.
//! - `config`: loading and merging server configuration.
//! - `transport`: the HTTP API and the event stream endpoint.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod publisher;
pub mod store;
pub mod transport;
pub mod utils;
