//! Periodic snapshot publisher
//!
//! One ticker task per topic. Each tick fetches the topic's current state
//! from a [`SnapshotSource`] and publishes it as a Snapshot event.
//!
//! - A tick that fires while the previous fetch/publish for the same topic is
//!   still running is dropped, so a slow source never builds a backlog.
//! - A failed fetch is logged and that tick is skipped; the next attempt
//!   waits for the next interval.
//! - A ticker whose topic has had no subscribers for the idle grace period
//!   stops itself. [`PeriodicPublisher::stop`] stops one immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::broker::topic::TopicId;
use crate::broker::{Broker, Event};
use crate::utils::error::StoreError;

/// Supplies the current state of a topic.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self, topic: &TopicId) -> Result<Value, StoreError>;
}

impl<F> SnapshotSource for F
where
    F: Fn(&TopicId) -> Result<Value, StoreError> + Send + Sync,
{
    fn snapshot(&self, topic: &TopicId) -> Result<Value, StoreError> {
        self(topic)
    }
}

/// Counters across all tickers of one publisher.
#[derive(Debug, Default)]
pub struct PublisherStats {
    pub published: AtomicU64,
    pub skipped_ticks: AtomicU64,
    pub failed_fetches: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub published: u64,
    pub skipped_ticks: u64,
    pub failed_fetches: u64,
}

struct Ticker {
    generation: u64,
    handle: JoinHandle<()>,
}

type Tickers = Arc<Mutex<HashMap<TopicId, Ticker>>>;

pub struct PeriodicPublisher {
    broker: Arc<Broker>,
    idle_grace: Duration,
    tickers: Tickers,
    stats: Arc<PublisherStats>,
    next_generation: AtomicU64,
    stopped: AtomicBool,
}

impl PeriodicPublisher {
    pub fn new(broker: Arc<Broker>, idle_grace: Duration) -> Self {
        Self {
            broker,
            idle_grace,
            tickers: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(PublisherStats::default()),
            next_generation: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// Starts publishing snapshots of `topic` every `interval`. The first
    /// snapshot goes out right away. Returns `false` if the topic already
    /// has a running ticker, or if [`stop_all`](Self::stop_all) has run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, topic: &str, interval: Duration, source: Arc<dyn SnapshotSource>) -> bool {
        let mut tickers = self.tickers.lock();
        if self.stopped.load(Ordering::Acquire) {
            debug!("Publisher stopped, not starting a ticker for {topic}");
            return false;
        }
        if tickers.contains_key(topic) {
            return false;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let ticker = TickerTask {
            broker: self.broker.clone(),
            tickers: self.tickers.clone(),
            stats: self.stats.clone(),
            source,
            topic: topic.to_string(),
            generation,
            interval,
            idle_grace: self.idle_grace,
        };
        let handle = tokio::spawn(ticker.run());
        tickers.insert(topic.to_string(), Ticker { generation, handle });

        info!("Periodic publisher started for {topic} every {interval:?}");
        true
    }

    /// Stops the ticker for `topic`. Returns whether one was running.
    pub fn stop(&self, topic: &str) -> bool {
        match self.tickers.lock().remove(topic) {
            Some(ticker) => {
                ticker.handle.abort();
                info!("Periodic publisher stopped for {topic}");
                true
            }
            None => false,
        }
    }

    /// Stops every ticker for good; later calls to `start` are refused.
    pub fn stop_all(&self) {
        let drained: Vec<_> = {
            let mut tickers = self.tickers.lock();
            self.stopped.store(true, Ordering::Release);
            tickers.drain().collect()
        };
        for (_, ticker) in &drained {
            ticker.handle.abort();
        }
        info!("Stopped {} periodic publishers", drained.len());
    }

    pub fn is_running(&self, topic: &str) -> bool {
        self.tickers.lock().contains_key(topic)
    }

    pub fn running(&self) -> usize {
        self.tickers.lock().len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            published: self.stats.published.load(Ordering::Relaxed),
            skipped_ticks: self.stats.skipped_ticks.load(Ordering::Relaxed),
            failed_fetches: self.stats.failed_fetches.load(Ordering::Relaxed),
        }
    }
}

impl Drop for PeriodicPublisher {
    fn drop(&mut self) {
        for (_, ticker) in self.tickers.lock().drain() {
            ticker.handle.abort();
        }
    }
}

struct TickerTask {
    broker: Arc<Broker>,
    tickers: Tickers,
    stats: Arc<PublisherStats>,
    source: Arc<dyn SnapshotSource>,
    topic: TopicId,
    generation: u64,
    interval: Duration,
    idle_grace: Duration,
}

/// Clears the in-flight flag when the publish job ends, panics included.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TickerTask {
    async fn run(self) {
        let mut ticks = tokio::time::interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let in_flight = Arc::new(AtomicBool::new(false));
        let mut idle_since: Option<Instant> = None;

        loop {
            ticks.tick().await;

            match self.broker.registry().subscriber_count(&self.topic) {
                Ok(0) => {
                    let since = *idle_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= self.idle_grace && self.retire() {
                        return;
                    }
                    continue;
                }
                Ok(_) => idle_since = None,
                Err(e) => {
                    warn!("Skipping tick for {}: {e}", self.topic);
                    continue;
                }
            }

            if in_flight.swap(true, Ordering::AcqRel) {
                self.stats.skipped_ticks.fetch_add(1, Ordering::Relaxed);
                debug!("Previous publish for {} still in flight, tick dropped", self.topic);
                continue;
            }

            let guard = InFlight(in_flight.clone());
            let broker = self.broker.clone();
            let source = self.source.clone();
            let stats = self.stats.clone();
            let topic = self.topic.clone();
            tokio::task::spawn_blocking(move || {
                let _guard = guard;
                publish_once(&broker, source.as_ref(), &stats, topic);
            });
        }
    }

    /// Removes this ticker from the map if the topic is still empty.
    /// Holding the map lock while checking means a subscriber arriving
    /// concurrently either keeps this ticker alive or starts a fresh one.
    fn retire(&self) -> bool {
        let mut tickers = self.tickers.lock();
        if self
            .broker
            .registry()
            .subscriber_count(&self.topic)
            .unwrap_or(0)
            > 0
        {
            return false;
        }
        if tickers
            .get(&self.topic)
            .is_some_and(|t| t.generation == self.generation)
        {
            tickers.remove(&self.topic);
        }
        info!(
            "Periodic publisher for {} idle for {:?}, stopping",
            self.topic, self.idle_grace
        );
        true
    }
}

fn publish_once(broker: &Broker, source: &dyn SnapshotSource, stats: &PublisherStats, topic: TopicId) {
    let state = match source.snapshot(&topic) {
        Ok(state) => state,
        Err(e) => {
            stats.failed_fetches.fetch_add(1, Ordering::Relaxed);
            warn!("Snapshot fetch for {topic} failed, skipping tick: {e}");
            return;
        }
    };
    match broker.publish(&Event::snapshot(topic.clone(), state), None) {
        Ok(report) => {
            stats.published.fetch_add(1, Ordering::Relaxed);
            debug!("Periodic snapshot for {topic}: {report:?}");
        }
        Err(e) => warn!("Periodic publish for {topic} failed: {e}"),
    }
}
