//! Message bus
//!
//! Fans messages out from a producer to its subscribers over a single
//! delivery channel. Each delivery is a batch in producer order. Delivery is
//! at-least-once; redelivering a message id to the same recipient within the
//! dedup window is dropped.

use crate::metrics::{bump, BusMetrics};
use agentflow_common::{AgentId, AgentflowError, Message, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Bus settings, the `bus` configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Redeliveries inside this window are dropped; 0 disables deduplication
    pub dedup_window_secs: u64,
    /// Messages kept per producer in the message log
    pub retained_messages: usize,
    /// Delivery channel capacity
    pub channel_buffer: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 3_600,
            retained_messages: 100,
            channel_buffer: 1_024,
        }
    }
}

/// A batch of messages bound for one agent
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipient: AgentId,
    pub messages: Vec<Message>,
}

pub struct MessageBus {
    config: BusConfig,
    /// producer -> subscribers, in subscription order
    routes: RwLock<HashMap<AgentId, Vec<AgentId>>>,
    /// Recent messages per producer
    log: DashMap<AgentId, VecDeque<Message>>,
    /// (recipient, message id) -> first delivery time in millis
    seen: DashMap<(AgentId, Uuid), i64>,
    tx: mpsc::Sender<Delivery>,
    metrics: BusMetrics,
}

impl MessageBus {
    /// Create a bus and the receiving end of its delivery channel
    pub fn new(config: BusConfig) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        let bus = Self {
            config,
            routes: RwLock::new(HashMap::new()),
            log: DashMap::new(),
            seen: DashMap::new(),
            tx,
            metrics: BusMetrics::default(),
        };
        (bus, rx)
    }

    pub fn subscribe(&self, producer: AgentId, subscriber: AgentId) {
        let mut routes = self.routes.write();
        let subscribers = routes.entry(producer).or_default();
        if !subscribers.contains(&subscriber) {
            subscribers.push(subscriber);
        }
    }

    pub fn subscribers(&self, producer: &AgentId) -> Vec<AgentId> {
        self.routes.read().get(producer).cloned().unwrap_or_default()
    }

    /// Log the messages and hand them to every subscriber; returns the
    /// number of deliveries sent.
    #[instrument(skip(self, messages), fields(producer = %producer, count = messages.len()))]
    pub async fn publish(&self, producer: &AgentId, messages: Vec<Message>) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }
        self.record(producer, &messages);
        bump(&self.metrics.messages_published, messages.len() as u64);

        let mut sent = 0;
        for subscriber in self.subscribers(producer) {
            if self.deliver(subscriber, messages.clone()).await? {
                sent += 1;
            }
        }
        debug!(deliveries = sent, "Published messages");
        Ok(sent)
    }

    /// Send a batch to one recipient, minus the messages it already got
    /// within the dedup window. Returns false when nothing was left to send.
    ///
    /// Messages count as delivered only once the send succeeded.
    pub async fn deliver(&self, recipient: AgentId, messages: Vec<Message>) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();
        let fresh: Vec<Message> = messages
            .into_iter()
            .filter(|m| !self.recently_delivered(&recipient, m.id(), now))
            .collect();
        if fresh.is_empty() {
            return Ok(false);
        }
        let ids: Vec<Uuid> = fresh.iter().map(Message::id).collect();

        self.tx
            .send(Delivery {
                recipient: recipient.clone(),
                messages: fresh,
            })
            .await
            .map_err(|_| AgentflowError::Internal("Delivery channel closed".into()))?;
        bump(&self.metrics.deliveries_sent, 1);

        if self.window_millis() > 0 {
            for id in ids {
                self.seen.insert((recipient.clone(), id), now);
            }
        }
        Ok(true)
    }

    fn recently_delivered(&self, recipient: &AgentId, message_id: Uuid, now: i64) -> bool {
        let window = self.window_millis();
        if window == 0 {
            return false;
        }
        let recent = self
            .seen
            .get(&(recipient.clone(), message_id))
            .is_some_and(|seen_at| now - *seen_at < window);
        if recent {
            bump(&self.metrics.deliveries_deduplicated, 1);
            debug!(recipient = %recipient, message_id = %message_id, "Deduplicated delivery");
        }
        recent
    }

    /// Forget deliveries older than the dedup window; returns how many remain
    pub fn prune_seen(&self) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let window = self.window_millis();
        self.seen.retain(|_, seen_at| now - *seen_at < window);
        self.seen.len()
    }

    fn record(&self, producer: &AgentId, messages: &[Message]) {
        let keep = self.config.retained_messages;
        if keep == 0 {
            return;
        }
        let mut log = self.log.entry(producer.clone()).or_default();
        log.extend(messages.iter().cloned());
        while log.len() > keep {
            log.pop_front();
        }
    }

    /// Up to `limit` of the latest messages of a producer, oldest first
    pub fn recent(&self, producer: &AgentId, limit: usize) -> Vec<Message> {
        self.log
            .get(producer)
            .map(|log| {
                let skip = log.len().saturating_sub(limit);
                log.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.config.dedup_window_secs)
    }

    fn window_millis(&self) -> i64 {
        i64::try_from(self.config.dedup_window_secs.saturating_mul(1_000)).unwrap_or(i64::MAX)
    }

    pub fn metrics(&self) -> &BusMetrics {
        &self.metrics
    }
}
