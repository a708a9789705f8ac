use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::broker::message::Frame;
use crate::broker::topic::{ConnectionId, TopicId};

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle of a connection. Transitions only move forward:
/// `Open -> Closing -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Why a connection is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The response stream was dropped by the HTTP layer.
    Disconnected,
    /// A write to the connection failed during a broadcast.
    TransportError,
    Administrative,
    /// Process shutdown. No leave announcement is sent.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Disconnected => "disconnected",
            CloseReason::TransportError => "transport error",
            CloseReason::Administrative => "administrative",
            CloseReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// A failed attempt to hand a frame to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The connection is no longer open or its receiver has gone away.
    Closed,
    /// The subscriber stopped consuming and its buffer is full.
    Full,
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendFailure::Closed => f.write_str("transport closed"),
            SendFailure::Full => f.write_str("subscriber buffer full"),
        }
    }
}

/// Represents a single push stream to one subscriber.
///
/// The connection owns the sending half of a bounded channel; the receiving
/// half is consumed by exactly one response stream, which keeps writes to the
/// underlying transport serialized. Releasing the connection drops the
/// sender, which ends that stream.
pub struct Connection {
    /// Unique identifier for the connection (`client-<uuid>`).
    pub id: ConnectionId,

    /// Topic this connection is filed under.
    pub topic: TopicId,

    /// Display name used in join/leave announcements.
    pub name: String,

    pub opened_at: DateTime<Utc>,

    state: AtomicU8,
    sender: Mutex<Option<mpsc::Sender<Frame>>>,
}

impl Connection {
    /// Creates an open connection and the receiver its frames arrive on.
    ///
    /// A missing or blank `name` becomes `guest-<first 8 hex digits>`.
    pub fn new(
        topic: impl Into<TopicId>,
        name: Option<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("guest-{}", &uuid[..8]));
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let conn = Self {
            id: format!("client-{uuid}"),
            topic: topic.into(),
            name,
            opened_at: Utc::now(),
            state: AtomicU8::new(OPEN),
            sender: Mutex::new(Some(tx)),
        };
        (conn, rx)
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            OPEN => ConnectionState::Open,
            CLOSING => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Queues a frame without waiting.
    pub fn send(&self, frame: Frame) -> Result<(), SendFailure> {
        if !self.is_open() {
            return Err(SendFailure::Closed);
        }
        let guard = self.sender.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(SendFailure::Closed);
        };
        tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendFailure::Full,
            TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    /// Moves `Open -> Closing`. Only the first caller gets `true`.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drops the transport handle and moves to `Closed`.
    pub(crate) fn release(&self) {
        self.sender.lock().take();
        self.state.store(CLOSED, Ordering::Release);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
