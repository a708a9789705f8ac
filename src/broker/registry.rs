//! Topic registry
//!
//! Maps each topic to the set of connections currently subscribed to it.
//!
//! Locking is two-level: the topic map sits behind a read-write lock that is
//! only written when a topic is created, and every topic's subscriber set has
//! its own mutex, so subscribing to one store never waits on another.
//! Every acquisition is bounded by the configured lock timeout and surfaces
//! `BrokerError::RegistryLockTimeout` instead of blocking indefinitely.
//! No lock is ever held while writing to a connection: the broadcaster
//! works on the copies returned by [`Registry::snapshot`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::warn;

use crate::broker::topic::{ConnectionId, Topic, TopicId};
use crate::client::Connection;
use crate::utils::error::BrokerError;

type TopicSlot = Arc<Mutex<Topic>>;

#[derive(Debug)]
pub struct Registry {
    topics: RwLock<HashMap<TopicId, TopicSlot>>,
    lock_timeout: Duration,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl Registry {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Makes `topic` known with an empty subscriber set. Declaring an
    /// existing topic is a no-op.
    pub fn declare(&self, topic: &str) -> Result<(), BrokerError> {
        self.slot_or_create(topic).map(|_| ())
    }

    pub fn topic_exists(&self, topic: &str) -> bool {
        match self.slot(topic) {
            Ok(slot) => slot.is_some(),
            Err(e) => {
                warn!("topic lookup for {topic} failed: {e}");
                false
            }
        }
    }

    /// Files the connection under its own topic, creating the topic if needed.
    pub fn subscribe(&self, conn: Arc<Connection>) -> Result<(), BrokerError> {
        let slot = self.slot_or_create(&conn.topic)?;
        let mut topic = self.lock_topic(&slot, &conn.topic)?;
        let id = conn.id.clone();
        if !topic.subscribe(conn) {
            return Err(BrokerError::DuplicateSubscription {
                topic: topic.name.clone(),
                connection: id,
            });
        }
        Ok(())
    }

    /// Removes the connection if present. Calling it again is safe and
    /// returns `false`.
    pub fn unsubscribe(&self, topic: &str, id: &ConnectionId) -> Result<bool, BrokerError> {
        let Some(slot) = self.slot(topic)? else {
            return Ok(false);
        };
        let mut t = self.lock_topic(&slot, topic)?;
        Ok(t.unsubscribe(id).is_some())
    }

    /// Point-in-time copy of the subscribers of `topic`; empty for unknown topics.
    pub fn snapshot(&self, topic: &str) -> Result<Vec<Arc<Connection>>, BrokerError> {
        let Some(slot) = self.slot(topic)? else {
            return Ok(Vec::new());
        };
        let t = self.lock_topic(&slot, topic)?;
        Ok(t.subscribers.values().cloned().collect())
    }

    pub fn subscriber_count(&self, topic: &str) -> Result<usize, BrokerError> {
        let Some(slot) = self.slot(topic)? else {
            return Ok(0);
        };
        let t = self.lock_topic(&slot, topic)?;
        Ok(t.len())
    }

    pub fn get(&self, topic: &str, id: &ConnectionId) -> Result<Option<Arc<Connection>>, BrokerError> {
        let Some(slot) = self.slot(topic)? else {
            return Ok(None);
        };
        let t = self.lock_topic(&slot, topic)?;
        Ok(t.subscribers.get(id).cloned())
    }

    /// Subscriber count of every topic that has ever had a subscriber,
    /// including those now down to zero.
    pub fn counts(&self) -> Result<BTreeMap<TopicId, usize>, BrokerError> {
        let mut out = BTreeMap::new();
        for (name, slot) in self.slots()? {
            let t = self.lock_topic(&slot, &name)?;
            if t.ever_subscribed {
                out.insert(name, t.len());
            }
        }
        Ok(out)
    }

    /// Every registered connection across all topics.
    pub fn connections(&self) -> Result<Vec<Arc<Connection>>, BrokerError> {
        let mut out = Vec::new();
        for (name, slot) in self.slots()? {
            out.extend(self.lock_topic(&slot, &name)?.subscribers.values().cloned());
        }
        Ok(out)
    }

    fn slots(&self) -> Result<Vec<(TopicId, TopicSlot)>, BrokerError> {
        let topics = self
            .topics
            .try_read_for(self.lock_timeout)
            .ok_or_else(|| BrokerError::RegistryLockTimeout("topic map".to_string()))?;
        Ok(topics
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect())
    }

    fn slot(&self, topic: &str) -> Result<Option<TopicSlot>, BrokerError> {
        let topics = self
            .topics
            .try_read_for(self.lock_timeout)
            .ok_or_else(|| BrokerError::RegistryLockTimeout("topic map".to_string()))?;
        Ok(topics.get(topic).cloned())
    }

    fn slot_or_create(&self, topic: &str) -> Result<TopicSlot, BrokerError> {
        if let Some(slot) = self.slot(topic)? {
            return Ok(slot);
        }
        let mut topics = self
            .topics
            .try_write_for(self.lock_timeout)
            .ok_or_else(|| BrokerError::RegistryLockTimeout("topic map".to_string()))?;
        Ok(topics
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Topic::new(topic))))
            .clone())
    }

    fn lock_topic<'a>(
        &self,
        slot: &'a TopicSlot,
        topic: &str,
    ) -> Result<MutexGuard<'a, Topic>, BrokerError> {
        slot.try_lock_for(self.lock_timeout)
            .ok_or_else(|| BrokerError::RegistryLockTimeout(format!("topic {topic}")))
    }
}
