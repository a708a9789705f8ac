//! The `client` module defines the representation of a subscriber connection.
//!
//! It provides the `Connection` struct, which encapsulates the state of a
//! single push stream: its identifier, the topic it is filed under, the
//! bounded channel feeding its HTTP response, and its lifecycle state.

pub mod connection;
pub use connection::{CloseReason, Connection, ConnectionState, SendFailure};

#[cfg(test)]
mod tests;
