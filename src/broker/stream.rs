use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::broker::engine::Broker;
use crate::broker::message::Frame;
use crate::client::{CloseReason, Connection};

/// The frames of one connection, in the order they were queued.
///
/// The stream ends once the connection is closed. Dropping it is the
/// disconnect signal: the connection is closed with
/// [`CloseReason::Disconnected`] unless something closed it first.
pub struct ConnectionStream {
    broker: Arc<Broker>,
    conn: Arc<Connection>,
    rx: mpsc::Receiver<Frame>,
}

impl ConnectionStream {
    pub(crate) fn new(broker: Arc<Broker>, conn: Arc<Connection>, rx: mpsc::Receiver<Frame>) -> Self {
        Self { broker, conn, rx }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }
}

impl fmt::Debug for ConnectionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionStream")
            .field("connection", &self.conn)
            .field("queued", &self.rx.len())
            .finish()
    }
}

impl Stream for ConnectionStream {
    type Item = Frame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for ConnectionStream {
    fn drop(&mut self) {
        self.broker.close(&self.conn, CloseReason::Disconnected);
    }
}
