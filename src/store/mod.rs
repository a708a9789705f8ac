//! The `store` module holds the in-memory store catalog: the stores, their
//! tables and each table's status.
//!
//! It is the data-store collaborator of the broker. Its table listing for a
//! store is the Snapshot payload pushed to that store's subscribers.

pub mod catalog;

pub use catalog::{Catalog, StoreSummary, Table, TableStatus, store_topic};
