//! Broker engine
//!
//! This module contains the broadcaster and the connection lifecycle:
//! - opening connections (register, welcome, join announcement)
//! - publishing events to every subscriber of a topic
//! - closing connections exactly once, from whichever path gets there first
//!   (client disconnect, failed write, administrative action, shutdown)
//!
//! Concurrency and usage notes:
//! - The API is synchronous and takes `&self`; the broker is shared as
//!   `Arc<Broker>`. All locking lives in the [`Registry`], and no lock is
//!   held while frames are handed to connections.
//! - Writes never wait. A subscriber whose buffer is full, or whose stream
//!   has gone away, is counted as failed and reaped after the fan-out.
//! - Leave announcements can fail on further stalled subscribers. Those are
//!   reaped through a work queue, never by recursing into `publish`.
//! - After [`Broker::shutdown`] no connection can be opened.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::broker::message::Event;
use crate::broker::registry::Registry;
use crate::broker::stream::ConnectionStream;
use crate::broker::topic::ConnectionId;
use crate::client::{CloseReason, Connection, ConnectionState};
use crate::config::BrokerSettings;
use crate::utils::error::BrokerError;

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Connections the frame was queued on.
    pub delivered: usize,
    /// Connections already closing or closed when the broadcast reached them.
    pub skipped_closed: usize,
    /// Connections whose write failed; they have been closed.
    pub failed: usize,
}

#[derive(Debug)]
pub struct Broker {
    registry: Arc<Registry>,
    channel_capacity: usize,
    max_connections: usize,
    live: AtomicUsize,
    shutting_down: AtomicBool,
}

impl Broker {
    pub fn new(registry: Arc<Registry>, settings: &BrokerSettings) -> Self {
        Self {
            registry,
            channel_capacity: settings.channel_capacity,
            max_connections: settings.max_connections,
            live: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn from_settings(settings: &BrokerSettings) -> Self {
        let registry = Registry::new(Duration::from_millis(settings.lock_timeout_ms));
        Self::new(Arc::new(registry), settings)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Number of connections opened and not yet closed.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Opens a connection on `topic` and returns it with its frame stream.
    ///
    /// The new subscriber gets a welcome notice directly; the other
    /// subscribers of the topic, if any, get a join announcement.
    pub fn open(
        self: &Arc<Self>,
        topic: &str,
        name: Option<String>,
    ) -> Result<(Arc<Connection>, ConnectionStream), BrokerError> {
        if self.is_shutting_down() {
            return Err(BrokerError::ShuttingDown);
        }
        if !self.registry.topic_exists(topic) {
            return Err(BrokerError::TopicNotFound(topic.to_string()));
        }

        if self.live.fetch_add(1, Ordering::AcqRel) >= self.max_connections {
            self.live.fetch_sub(1, Ordering::AcqRel);
            return Err(BrokerError::CapacityExceeded(self.max_connections));
        }

        let (conn, rx) = Connection::new(topic, name, self.channel_capacity);
        let conn = Arc::new(conn);

        if let Err(e) = self.registry.subscribe(conn.clone()) {
            self.live.fetch_sub(1, Ordering::AcqRel);
            return Err(e);
        }
        // shutdown may have enumerated the registry before this subscribe landed
        if self.is_shutting_down() {
            self.close(&conn, CloseReason::Shutdown);
            return Err(BrokerError::ShuttingDown);
        }
        let stream = ConnectionStream::new(self.clone(), conn.clone(), rx);

        info!("{} ({}) subscribed to {}", conn.id, conn.name, topic);

        let welcome = Event::notice(topic, format!("Connected to store {topic} as {}.", conn.name));
        match welcome.encode() {
            Ok(frame) => {
                if let Err(e) = conn.send(frame) {
                    warn!("Failed to send welcome to {}: {e}", conn.id);
                }
            }
            Err(e) => warn!("Failed to encode welcome for {}: {e}", conn.id),
        }

        match self.registry.subscriber_count(topic) {
            Ok(n) if n > 1 => {
                let joined = Event::notice(topic, format!("{} has joined store {topic}.", conn.name));
                if let Err(e) = self.publish(&joined, Some(&conn.id)) {
                    warn!("Failed to announce {} on {topic}: {e}", conn.id);
                }
            }
            Ok(_) => debug!("{} is alone on {topic}, join announcement suppressed", conn.id),
            Err(e) => warn!("Failed to announce {} on {topic}: {e}", conn.id),
        }

        Ok((conn, stream))
    }

    /// Publishes an event to every subscriber of `event.topic` except `exclude`.
    ///
    /// The payload is serialized once. A failing subscriber never stops
    /// delivery to the others; it is closed after the fan-out completes.
    pub fn publish(
        &self,
        event: &Event,
        exclude: Option<&ConnectionId>,
    ) -> Result<DeliveryReport, BrokerError> {
        let (report, dead) = self.fan_out(event, exclude)?;
        let departed = self.detach_all(dead);
        self.announce_departures(departed);
        Ok(report)
    }

    /// Closes a connection. Only the first call for a given connection does
    /// anything and returns `true`; later calls are no-ops.
    ///
    /// Unless the broker is shutting down, the remaining subscribers of the
    /// topic receive a leave announcement.
    pub fn close(&self, conn: &Arc<Connection>, reason: CloseReason) -> bool {
        if !self.detach(conn, reason) {
            return false;
        }
        if reason != CloseReason::Shutdown {
            self.announce_departures(VecDeque::from([conn.clone()]));
        }
        true
    }

    /// Queues the frame on every open subscriber and hands back the ones
    /// whose write failed, still registered and untouched.
    fn fan_out(
        &self,
        event: &Event,
        exclude: Option<&ConnectionId>,
    ) -> Result<(DeliveryReport, Vec<Arc<Connection>>), BrokerError> {
        let topic = &event.topic;
        if !self.registry.topic_exists(topic) {
            return Err(BrokerError::TopicNotFound(topic.clone()));
        }

        let frame = event
            .encode()
            .map_err(|e| BrokerError::Encode(e.to_string()))?;

        let mut report = DeliveryReport::default();
        let mut dead = Vec::new();

        for conn in self.registry.snapshot(topic)? {
            if exclude == Some(&conn.id) {
                continue;
            }
            if !conn.is_open() {
                report.skipped_closed += 1;
                if conn.state() == ConnectionState::Closed {
                    // closed but its removal did not go through
                    if let Err(e) = self.registry.unsubscribe(topic, &conn.id) {
                        warn!("Failed to unregister closed {}: {e}", conn.id);
                    }
                }
                continue;
            }
            match conn.send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    report.failed += 1;
                    let err = BrokerError::TransportWriteFailed {
                        connection: conn.id.clone(),
                        reason: failure.to_string(),
                    };
                    warn!("{err}");
                    dead.push(conn);
                }
            }
        }

        debug!(
            "Published {:?} to {topic}: {} delivered, {} skipped, {} failed",
            event.kind, report.delivered, report.skipped_closed, report.failed
        );
        Ok((report, dead))
    }

    /// Unregisters and releases a connection without announcing it.
    /// Returns `false` if another caller got there first.
    fn detach(&self, conn: &Arc<Connection>, reason: CloseReason) -> bool {
        if !conn.begin_close() {
            debug!("{} already closing ({reason})", conn.id);
            return false;
        }

        match self.registry.unsubscribe(&conn.topic, &conn.id) {
            Ok(true) => {}
            Ok(false) => debug!("{} was not registered under {}", conn.id, conn.topic),
            Err(e) => warn!("Failed to unregister {}: {e}", conn.id),
        }
        conn.release();
        self.live.fetch_sub(1, Ordering::AcqRel);

        let lifetime = chrono::Utc::now() - conn.opened_at;
        info!(
            "{} ({}) left {} after {}s: {reason}",
            conn.id,
            conn.name,
            conn.topic,
            lifetime.num_seconds()
        );
        true
    }

    /// Detaches every connection whose write failed and returns the ones
    /// this call detached.
    fn detach_all(&self, dead: Vec<Arc<Connection>>) -> VecDeque<Arc<Connection>> {
        dead.into_iter()
            .filter(|conn| self.detach(conn, CloseReason::TransportError))
            .collect()
    }

    /// Announces each departure to whoever is left on its topic. Subscribers
    /// that fail an announcement are detached and queued for their own.
    fn announce_departures(&self, mut departed: VecDeque<Arc<Connection>>) {
        while let Some(conn) = departed.pop_front() {
            match self.registry.subscriber_count(&conn.topic) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to announce departure of {}: {e}", conn.id);
                    continue;
                }
            }
            let left = Event::notice(
                conn.topic.clone(),
                format!("{} has left store {}.", conn.name, conn.topic),
            );
            match self.fan_out(&left, None) {
                Ok((_, dead)) => departed.extend(self.detach_all(dead)),
                Err(e) => warn!("Failed to announce departure of {}: {e}", conn.id),
            }
        }
    }

    /// Administrative close by id. Returns whether a connection was closed.
    pub fn close_by_id(
        &self,
        topic: &str,
        id: &ConnectionId,
        reason: CloseReason,
    ) -> Result<bool, BrokerError> {
        match self.registry.get(topic, id)? {
            Some(conn) => Ok(self.close(&conn, reason)),
            None => Ok(false),
        }
    }

    /// Refuses new connections, then closes every registered one without
    /// announcements. Returns how many were closed by this call.
    pub fn shutdown(&self) -> usize {
        self.shutting_down.store(true, Ordering::SeqCst);
        let conns = match self.registry.connections() {
            Ok(conns) => conns,
            Err(e) => {
                warn!("Failed to enumerate connections for shutdown: {e}");
                return 0;
            }
        };
        let closed = conns
            .iter()
            .filter(|conn| self.close(conn, CloseReason::Shutdown))
            .count();
        info!("Closed {closed} connections on shutdown");
        closed
    }
}
