//! Agent runtime
//!
//! Owns the registered agents and drives every invocation:
//!
//! ```text
//! lock(agent) -> validate -> load memory -> check/receive -> save memory -> publish
//! ```
//!
//! Any failure before the save leaves the stored memory untouched and
//! publishes nothing. Invocations of one agent are serialized; different
//! agents run concurrently.

use crate::bus::{Delivery, MessageBus};
use crate::config::AgentSpec;
use crate::metrics::{bump, MetricsSnapshot, RuntimeMetrics};
use crate::store::MemoryStore;
use agentflow_agents::{Agent, AgentFactory, AgentKind, AgentStatus, AnyAgent, Schedule};
use agentflow_common::{AgentId, AgentflowError, Memory, Message, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// How often the dispatcher forgets expired dedup entries
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// A failed invocation, attributed to its agent and input message
#[derive(Debug, Error)]
#[error("agent {agent_id} failed: {error}")]
pub struct InvocationError {
    pub agent_id: AgentId,
    pub message_id: Option<Uuid>,
    #[source]
    pub error: AgentflowError,
}

impl InvocationError {
    fn new(agent_id: &AgentId, error: AgentflowError) -> Self {
        Self {
            agent_id: agent_id.clone(),
            message_id: error.message_id(),
            error,
        }
    }
}

/// An agent ready to be registered
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: AgentId,
    pub name: String,
    pub agent: AnyAgent,
    pub sources: Vec<AgentId>,
    pub schedule: Option<Schedule>,
    pub disabled: bool,
}

impl Registration {
    pub fn new(id: impl Into<AgentId>, agent: AnyAgent) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            agent,
            sources: Vec::new(),
            schedule: None,
            disabled: false,
        }
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = AgentId>) -> Self {
        self.sources = sources.into_iter().collect();
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

/// Health report of one agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentHealth {
    pub id: AgentId,
    pub name: String,
    pub kind: AgentKind,
    pub disabled: bool,
    pub working: bool,
    pub status: AgentStatus,
}

struct Slot {
    name: String,
    agent: AnyAgent,
    schedule: Option<Schedule>,
    disabled: bool,
    /// Held across load -> invoke -> save
    lock: Mutex<()>,
    status: RwLock<AgentStatus>,
}

#[derive(Clone, Copy)]
enum Trigger<'a> {
    Check,
    Receive(&'a [Message]),
}

pub struct Runtime {
    agents: DashMap<AgentId, Arc<Slot>>,
    /// Registration order
    order: RwLock<Vec<AgentId>>,
    store: Arc<dyn MemoryStore>,
    bus: Arc<MessageBus>,
    metrics: RuntimeMetrics,
}

impl Runtime {
    pub fn new(store: Arc<dyn MemoryStore>, bus: Arc<MessageBus>) -> Self {
        Self {
            agents: DashMap::new(),
            order: RwLock::new(Vec::new()),
            store,
            bus,
            metrics: RuntimeMetrics::default(),
        }
    }

    /// Add an agent; its options must validate and its sources need it to receive.
    #[instrument(skip(self, registration), fields(agent_id = %registration.id))]
    pub fn register(&self, registration: Registration) -> Result<()> {
        let Registration {
            id,
            name,
            agent,
            sources,
            schedule,
            disabled,
        } = registration;

        if id.is_empty() {
            return Err(AgentflowError::Config("agent id must not be empty".into()));
        }
        if self.agents.contains_key(&id) {
            return Err(AgentflowError::Config(format!("agent `{id}` is already registered")));
        }
        agent.validate()?;
        if !sources.is_empty() && !agent.can_receive() {
            return Err(AgentflowError::Config(format!(
                "agent `{id}` has sources but {} agents do not receive messages",
                agent.kind()
            )));
        }
        if schedule.is_some() && !agent.can_be_scheduled() {
            warn!(kind = %agent.kind(), "Schedule ignored, agent kind is not scheduled");
        }

        for source in sources {
            self.bus.subscribe(source, id.clone());
        }
        info!(kind = %agent.kind(), name = %name, disabled, "Registered agent");

        let slot = Slot {
            name,
            schedule: schedule.or_else(|| agent.default_schedule()),
            agent,
            disabled,
            lock: Mutex::new(()),
            status: RwLock::new(AgentStatus::default()),
        };
        self.agents.insert(id.clone(), Arc::new(slot));
        self.order.write().push(id);
        Ok(())
    }

    /// Build the agent described by a configuration entry and register it
    pub fn register_spec(&self, spec: AgentSpec, factory: &AgentFactory) -> Result<()> {
        let name = spec.display_name().to_string();
        let agent = factory.build(spec.options)?;
        let mut registration = Registration::new(spec.id, agent)
            .with_sources(spec.sources)
            .disabled(spec.disabled);
        registration.name = name;
        registration.schedule = spec.schedule;
        self.register(registration)
    }

    fn slot(&self, agent_id: &AgentId) -> Result<Arc<Slot>> {
        self.agents
            .get(agent_id)
            .map(|slot| slot.clone())
            .ok_or_else(|| AgentflowError::UnknownAgent(agent_id.clone()))
    }

    /// Registered agent ids, in registration order
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.order.read().clone()
    }

    pub fn is_enabled(&self, agent_id: &AgentId) -> bool {
        self.agents.get(agent_id).is_some_and(|slot| !slot.disabled)
    }

    /// Enabled agents that should be checked, with their cadence
    pub fn scheduled(&self) -> Vec<(AgentId, Schedule)> {
        self.agent_ids()
            .into_iter()
            .filter_map(|id| {
                let slot = self.agents.get(&id)?;
                if slot.disabled || !slot.agent.can_be_scheduled() {
                    return None;
                }
                let schedule = slot.schedule?;
                Some((id, schedule))
            })
            .collect()
    }

    /// Time-triggered invocation; returns the number of messages emitted
    pub async fn check(
        &self,
        agent_id: &AgentId,
        now: DateTime<Utc>,
    ) -> std::result::Result<usize, InvocationError> {
        self.invoke(agent_id, Trigger::Check, now).await
    }

    /// Event-triggered invocation; an empty batch is a no-op
    pub async fn receive(
        &self,
        agent_id: &AgentId,
        messages: &[Message],
        now: DateTime<Utc>,
    ) -> std::result::Result<usize, InvocationError> {
        if messages.is_empty() {
            return Ok(0);
        }
        self.invoke(agent_id, Trigger::Receive(messages), now).await
    }

    async fn invoke(
        &self,
        agent_id: &AgentId,
        trigger: Trigger<'_>,
        now: DateTime<Utc>,
    ) -> std::result::Result<usize, InvocationError> {
        let slot = self
            .slot(agent_id)
            .map_err(|e| InvocationError::new(agent_id, e))?;
        if slot.disabled {
            debug!(agent_id = %agent_id, "Skipping disabled agent");
            return Ok(0);
        }

        let _guard = slot.lock.lock().await;
        bump(&self.metrics.invocations, 1);
        {
            let mut status = slot.status.write();
            match trigger {
                Trigger::Check => status.last_check_at = Some(now),
                Trigger::Receive(_) => status.last_receive_at = Some(now),
            }
        }

        match self.run(agent_id, &slot, trigger, now).await {
            Ok(emitted) => {
                let mut status = slot.status.write();
                status.last_error = None;
                status.last_error_at = None;
                if emitted > 0 {
                    status.last_message_at = Some(now);
                }
                Ok(emitted)
            }
            Err(error) => {
                bump(&self.metrics.failures, 1);
                let failure = InvocationError::new(agent_id, error);
                warn!(
                    agent_id = %agent_id,
                    message_id = ?failure.message_id,
                    error = %failure.error,
                    "Invocation failed"
                );
                let mut status = slot.status.write();
                status.last_error = Some(failure.error.to_string());
                status.last_error_at = Some(now);
                Err(failure)
            }
        }
    }

    async fn run(
        &self,
        agent_id: &AgentId,
        slot: &Slot,
        trigger: Trigger<'_>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        slot.agent.validate()?;
        let memory = self.store.load(agent_id).await?;

        let outcome = match trigger {
            Trigger::Check => slot.agent.check(memory, now).await?,
            Trigger::Receive(messages) => slot.agent.receive(memory, messages, now).await?,
        };

        self.store.save(agent_id, &outcome.memory).await?;

        let messages: Vec<Message> = outcome
            .emitted
            .into_iter()
            .map(|payload| Message::at(agent_id.clone(), payload, now))
            .collect();
        let emitted = messages.len();
        if emitted > 0 {
            bump(&self.metrics.messages_emitted, emitted as u64);
            debug!(agent_id = %agent_id, emitted, "Agent emitted messages");
            self.bus.publish(agent_id, messages).await?;
        }
        Ok(emitted)
    }

    pub fn status(&self, agent_id: &AgentId) -> Option<AgentStatus> {
        self.agents.get(agent_id).map(|slot| slot.status.read().clone())
    }

    pub fn is_working(&self, agent_id: &AgentId, now: DateTime<Utc>) -> Option<bool> {
        self.agents
            .get(agent_id)
            .map(|slot| slot.agent.is_working(&slot.status.read(), now))
    }

    /// Health of every agent, in registration order
    pub fn health(&self, now: DateTime<Utc>) -> Vec<AgentHealth> {
        self.agent_ids()
            .into_iter()
            .filter_map(|id| {
                let slot = self.agents.get(&id)?;
                let status = slot.status.read().clone();
                Some(AgentHealth {
                    name: slot.name.clone(),
                    kind: slot.agent.kind(),
                    disabled: slot.disabled,
                    working: slot.agent.is_working(&status, now),
                    status,
                    id,
                })
            })
            .collect()
    }

    /// Stored memory of an agent
    pub async fn memory(&self, agent_id: &AgentId) -> Result<Memory> {
        self.slot(agent_id)?;
        Ok(self.store.load(agent_id).await?)
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::capture(&self.metrics, self.bus.metrics())
    }

    /// Route bus deliveries to their recipients until shutdown.
    ///
    /// Each recipient gets its own worker so batches for one agent run in
    /// delivery order while different agents proceed concurrently.
    pub async fn dispatch(
        self: Arc<Self>,
        mut deliveries: mpsc::Receiver<Delivery>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut workers = Workers::default();
        let mut prune_timer = tokio::time::interval(PRUNE_INTERVAL);

        loop {
            tokio::select! {
                delivery = deliveries.recv() => {
                    let Some(Delivery { recipient, messages }) = delivery else {
                        info!("Delivery channel closed, dispatcher exiting");
                        break;
                    };
                    if !self.is_enabled(&recipient) {
                        debug!(recipient = %recipient, "Dropping delivery for disabled or unknown agent");
                        continue;
                    }
                    workers.route(&self, recipient, messages);
                }

                _ = prune_timer.tick() => {
                    let remaining = self.bus.prune_seen();
                    debug!(remaining, "Pruned delivery dedup entries");
                }

                _ = shutdown.changed() => {
                    info!("Dispatcher shutting down");
                    break;
                }
            }
        }

        // Workers drain what they already hold; later publishes fail fast.
        drop(deliveries);
        workers.finish().await;
    }

    async fn work(self: Arc<Self>, agent_id: AgentId, mut batches: mpsc::UnboundedReceiver<Vec<Message>>) {
        while let Some(messages) = batches.recv().await {
            // failures are logged and recorded in the agent status by invoke
            let _ = self.receive(&agent_id, &messages, Utc::now()).await;
        }
    }
}

/// Per-recipient worker tasks of the dispatcher
#[derive(Default)]
struct Workers {
    senders: HashMap<AgentId, mpsc::UnboundedSender<Vec<Message>>>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Hand a batch to the recipient's worker, restarting a worker that stopped
    fn route(&mut self, runtime: &Arc<Runtime>, recipient: AgentId, messages: Vec<Message>) {
        let messages = match self.senders.get(&recipient) {
            Some(worker) => match worker.send(messages) {
                Ok(()) => return,
                Err(mpsc::error::SendError(messages)) => {
                    warn!(recipient = %recipient, "Agent worker stopped, restarting it");
                    messages
                }
            },
            None => messages,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        self.handles
            .push(tokio::spawn(runtime.clone().work(recipient.clone(), rx)));
        if tx.send(messages).is_err() {
            error!(recipient = %recipient, "Agent worker stopped on start");
        }
        self.senders.insert(recipient, tx);
    }

    async fn finish(self) {
        drop(self.senders);
        for joined in futures::future::join_all(self.handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Agent worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusConfig;
    use crate::store::InMemoryStore;
    use agentflow_agents::{
        AttributeDifferenceAgent, AttributeDifferenceOptions, FeedPollerAgent, FeedPollerOptions,
        FeedSource,
    };
    use agentflow_common::Payload;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EmptyFeed;

    #[async_trait]
    impl FeedSource for EmptyFeed {
        async fn fetch(
            &self,
            _source: &str,
            _cursor_path: &str,
            _since: Option<&str>,
        ) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }
    }

    fn runtime() -> (Arc<Runtime>, mpsc::Receiver<Delivery>) {
        let (bus, rx) = MessageBus::new(BusConfig::default());
        let runtime = Runtime::new(Arc::new(InMemoryStore::new()), Arc::new(bus));
        (Arc::new(runtime), rx)
    }

    fn difference(method: &str) -> AnyAgent {
        AnyAgent::AttributeDifference(AttributeDifferenceAgent::new(AttributeDifferenceOptions {
            path: "rate".into(),
            output: "rate_change".into(),
            method: method.into(),
            decimal_precision: None,
            expected_update_period_in_days: Some("1".into()),
        }))
    }

    fn poller() -> AnyAgent {
        AnyAgent::FeedPoller(FeedPollerAgent::new(
            FeedPollerOptions {
                source: "inbox".into(),
                cursor_path: None,
                expected_update_period_in_days: Some("1".into()),
            },
            Arc::new(EmptyFeed),
        ))
    }

    fn rate(value: Value) -> Message {
        let mut payload = Payload::new();
        payload.insert("rate".into(), value);
        Message::new(AgentId::from("upstream"), payload)
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_options() {
        let (runtime, _rx) = runtime();
        let err = runtime
            .register(Registration::new("diff", difference("sideways")))
            .unwrap_err();
        assert!(matches!(err, AgentflowError::Validation(_)));
        assert!(runtime.agent_ids().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_bad_sources() {
        let (runtime, _rx) = runtime();
        runtime.register(Registration::new("diff", difference("decimal_difference"))).unwrap();

        let dup = runtime.register(Registration::new("diff", difference("decimal_difference")));
        assert!(matches!(dup, Err(AgentflowError::Config(_))));

        let feed = Registration::new("feed", poller()).with_sources([AgentId::from("diff")]);
        assert!(matches!(runtime.register(feed), Err(AgentflowError::Config(_))));
    }

    #[tokio::test]
    async fn test_receive_commits_memory_and_publishes() {
        let (runtime, mut rx) = runtime();
        runtime.register(Registration::new("diff", difference("decimal_difference"))).unwrap();
        runtime
            .register(Registration::new("sink", difference("decimal_difference")).with_sources([AgentId::from("diff")]))
            .unwrap();
        let id = AgentId::from("diff");

        let emitted = runtime
            .receive(&id, &[rate(json!(5.5)), rate(json!(6.4))], Utc::now())
            .await
            .unwrap();
        assert_eq!(emitted, 2);

        let memory = runtime.memory(&id).await.unwrap();
        assert_eq!(memory.get("last_value"), Some(&json!(6.4)));

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.recipient, AgentId::from("sink"));
        let changes: Vec<Value> = delivery
            .messages
            .iter()
            .map(|m| m.payload()["rate_change"].clone())
            .collect();
        assert_eq!(changes, vec![json!(0), json!(0.9)]);
        assert!(delivery.messages.iter().all(|m| m.agent_id() == &id));

        let metrics = runtime.metrics();
        assert_eq!(metrics.invocations, 1);
        assert_eq!(metrics.messages_emitted, 2);
        assert_eq!(metrics.deliveries_sent, 1);
    }

    #[tokio::test]
    async fn test_failure_leaves_memory_untouched() {
        let (runtime, mut rx) = runtime();
        runtime.register(Registration::new("diff", difference("percentage_change"))).unwrap();
        runtime
            .register(Registration::new("sink", difference("decimal_difference")).with_sources([AgentId::from("diff")]))
            .unwrap();
        let id = AgentId::from("diff");

        runtime.receive(&id, &[rate(json!(0))], Utc::now()).await.unwrap();
        let before = runtime.memory(&id).await.unwrap();
        let _ = rx.recv().await.unwrap();

        let bad = rate(json!(3));
        let err = runtime
            .receive(&id, &[bad.clone()], Utc::now())
            .await
            .unwrap_err();

        assert_eq!(err.agent_id, id);
        assert_eq!(err.message_id, Some(bad.id()));
        assert!(err.error.is_data_error());
        assert_eq!(runtime.memory(&id).await.unwrap(), before);
        assert!(rx.try_recv().is_err());

        let status = runtime.status(&id).unwrap();
        assert!(status.has_error());
        assert_eq!(runtime.metrics().failures, 1);
    }

    #[tokio::test]
    async fn test_success_clears_error() {
        let (runtime, _rx) = runtime();
        runtime.register(Registration::new("diff", difference("decimal_difference"))).unwrap();
        let id = AgentId::from("diff");

        assert!(runtime.receive(&id, &[rate(json!("n/a"))], Utc::now()).await.is_err());
        assert!(runtime.status(&id).unwrap().has_error());

        runtime.receive(&id, &[rate(json!(1))], Utc::now()).await.unwrap();
        let status = runtime.status(&id).unwrap();
        assert!(!status.has_error());
        assert!(status.last_message_at.is_some());
        assert_eq!(runtime.is_working(&id, Utc::now()), Some(true));
    }

    #[tokio::test]
    async fn test_empty_batch_and_disabled_agent_are_noops() {
        let (runtime, _rx) = runtime();
        runtime
            .register(Registration::new("off", difference("decimal_difference")).disabled(true))
            .unwrap();
        runtime.register(Registration::new("on", difference("decimal_difference"))).unwrap();

        let off = AgentId::from("off");
        assert_eq!(runtime.receive(&off, &[rate(json!(1))], Utc::now()).await.unwrap(), 0);
        assert!(runtime.memory(&off).await.unwrap().is_empty());
        assert!(!runtime.is_enabled(&off));

        let on = AgentId::from("on");
        assert_eq!(runtime.receive(&on, &[], Utc::now()).await.unwrap(), 0);
        assert_eq!(runtime.status(&on).unwrap(), AgentStatus::default());
        assert_eq!(runtime.metrics().invocations, 0);
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let (runtime, _rx) = runtime();
        let err = runtime
            .check(&AgentId::from("ghost"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err.error, AgentflowError::UnknownAgent(_)));
        assert!(runtime.memory(&AgentId::from("ghost")).await.is_err());
    }

    #[tokio::test]
    async fn test_scheduled_agents_and_health() {
        let (runtime, _rx) = runtime();
        runtime.register(Registration::new("diff", difference("decimal_difference"))).unwrap();
        runtime.register(Registration::new("feed", poller())).unwrap();
        runtime
            .register(Registration::new("paused", poller()).disabled(true))
            .unwrap();

        let scheduled = runtime.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, AgentId::from("feed"));
        assert_eq!(scheduled[0].1.to_string(), "every_10m");

        let health = runtime.health(Utc::now());
        let ids: Vec<&str> = health.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["diff", "feed", "paused"]);
        assert!(health.iter().all(|h| !h.working));
        assert_eq!(health[1].kind, AgentKind::FeedPoller);
    }

    #[tokio::test]
    async fn test_stopped_worker_is_restarted() {
        let (runtime, _rx) = runtime();
        runtime.register(Registration::new("diff", difference("decimal_difference"))).unwrap();
        let id = AgentId::from("diff");

        let mut workers = Workers::default();
        let (dead, gone) = mpsc::unbounded_channel();
        drop(gone);
        workers.senders.insert(id.clone(), dead);

        workers.route(&runtime, id.clone(), vec![rate(json!(7))]);
        assert!(!workers.senders[&id].is_closed());
        workers.finish().await;

        let memory = runtime.memory(&id).await.unwrap();
        assert_eq!(memory.get("last_value"), Some(&json!(7.0)));
    }

    #[tokio::test]
    async fn test_check_on_receive_only_agent_changes_nothing() {
        let (runtime, _rx) = runtime();
        runtime.register(Registration::new("diff", difference("decimal_difference"))).unwrap();
        let id = AgentId::from("diff");
        runtime.receive(&id, &[rate(json!(2))], Utc::now()).await.unwrap();
        let before = runtime.memory(&id).await.unwrap();

        assert_eq!(runtime.check(&id, Utc::now()).await.unwrap(), 0);
        assert_eq!(runtime.memory(&id).await.unwrap(), before);
    }
}
