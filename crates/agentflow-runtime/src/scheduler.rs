//! Scheduler: runs `check` for every scheduled agent at its cadence

use crate::runtime::{InvocationError, Runtime};
use agentflow_agents::Schedule;
use agentflow_common::AgentId;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

pub struct Scheduler {
    runtime: Arc<Runtime>,
}

impl Scheduler {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    /// Start one timer task per scheduled agent. The first check happens one
    /// period after start.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.runtime
            .scheduled()
            .into_iter()
            .map(|(agent_id, schedule)| {
                tokio::spawn(run_schedule(
                    self.runtime.clone(),
                    agent_id,
                    schedule,
                    shutdown.clone(),
                ))
            })
            .collect()
    }

    /// Check every scheduled agent once, in registration order
    pub async fn check_all(&self, now: DateTime<Utc>) -> Vec<InvocationError> {
        let mut failures = Vec::new();
        for (agent_id, _) in self.runtime.scheduled() {
            if let Err(failure) = self.runtime.check(&agent_id, now).await {
                failures.push(failure);
            }
        }
        failures
    }
}

async fn run_schedule(
    runtime: Arc<Runtime>,
    agent_id: AgentId,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = schedule.interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(agent_id = %agent_id, schedule = %schedule, "Scheduled agent");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // failures are logged and recorded by the runtime
                if let Ok(emitted) = runtime.check(&agent_id, Utc::now()).await {
                    debug!(agent_id = %agent_id, emitted, "Scheduled check done");
                }
            }

            _ = shutdown.changed() => {
                debug!(agent_id = %agent_id, "Schedule stopped");
                break;
            }
        }
    }
}
