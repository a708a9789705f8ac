use std::collections::HashMap;
use std::sync::Arc;

use crate::client::Connection;

pub type TopicId = String;
pub type ConnectionId = String;

/// Represents a topic in the broker system
/// Holds the connections currently subscribed, keyed by connection id so
/// removal does not need a scan.
#[derive(Debug, Default)]
pub struct Topic {
    pub name: TopicId,
    pub subscribers: HashMap<ConnectionId, Arc<Connection>>,
    /// Set by the first subscribe and never cleared.
    pub ever_subscribed: bool,
}

impl Topic {
    /// Creates a new instance of the Topic with the given name
    /// Initializes an empty set of subscribers
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashMap::new(),
            ever_subscribed: false,
        }
    }

    /// Adds the connection. Returns `false` if its id was already present,
    /// in which case the existing entry is left untouched.
    pub fn subscribe(&mut self, conn: Arc<Connection>) -> bool {
        if self.subscribers.contains_key(&conn.id) {
            return false;
        }
        self.subscribers.insert(conn.id.clone(), conn);
        self.ever_subscribed = true;
        true
    }

    /// Removes the connection, returning it if it was present.
    pub fn unsubscribe(&mut self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.subscribers.remove(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
