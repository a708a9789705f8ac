//! The `error` module defines the error types used within `storecast`.
//!
//! `BrokerError` covers the subscription registry, the broadcaster and the
//! connection lifecycle. `StoreError` covers the store catalog that supplies
//! topic snapshots.

use thiserror::Error;

use crate::broker::topic::{ConnectionId, TopicId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The connection handle is already filed under the topic.
    #[error("connection {connection} is already subscribed to topic {topic}")]
    DuplicateSubscription {
        topic: TopicId,
        connection: ConnectionId,
    },

    #[error("topic {0} not found")]
    TopicNotFound(TopicId),

    /// A single subscriber could not be written to. Never escapes `publish`.
    #[error("write to connection {connection} failed: {reason}")]
    TransportWriteFailed {
        connection: ConnectionId,
        reason: String,
    },

    #[error("timed out acquiring registry lock for {0}")]
    RegistryLockTimeout(String),

    #[error("connection limit of {0} reached")]
    CapacityExceeded(usize),

    #[error("broker is shutting down")]
    ShuttingDown,

    #[error("failed to encode event payload: {0}")]
    Encode(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store {0} not found")]
    StoreNotFound(String),

    #[error("table {table} not found in store {store}")]
    TableNotFound { store: u32, table: u32 },

    #[error("invalid table status: {0}")]
    InvalidStatus(String),
}
