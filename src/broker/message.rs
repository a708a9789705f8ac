use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::broker::topic::TopicId;

/// The two kinds of event pushed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Full current state of a topic; replaces whatever the client had.
    Snapshot,
    /// Free-text, display-oriented message.
    Notice,
}

/// An event addressed to every subscriber of `topic`.
///
/// Only `payload` goes on the wire: a Snapshot is the state value itself
/// (an array of table records for a store), a Notice is `{"message": "..."}`.
///
/// # Example
///
/// ```rust
/// use storecast::broker::message::Event;
///
/// let event = Event::notice("1", "Kitchen closes in 10 minutes");
/// assert_eq!(event.encode().unwrap().as_str(), r#"{"message":"Kitchen closes in 10 minutes"}"#);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: TopicId,
    pub kind: EventKind,
    pub payload: Value,
}

impl Event {
    pub fn snapshot(topic: impl Into<TopicId>, state: Value) -> Self {
        Self {
            topic: topic.into(),
            kind: EventKind::Snapshot,
            payload: state,
        }
    }

    pub fn notice(topic: impl Into<TopicId>, message: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            kind: EventKind::Notice,
            payload: json!({ "message": message.into() }),
        }
    }

    /// Serializes the payload once; the resulting frame is shared by every recipient.
    pub fn encode(&self) -> serde_json::Result<Frame> {
        serde_json::to_string(&self.payload).map(Frame::from)
    }
}

/// A serialized payload, cheap to clone across many connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Arc<str>);

impl Frame {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Frame {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&str> for Frame {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
