//! The agent contract

use crate::kinds::AgentKind;
use crate::schedule::Schedule;
use agentflow_common::{AgentflowError, Memory, Message, Payload, Result, ValidationError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// What a successful invocation hands back to the runtime
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Memory to persist
    pub memory: Memory,
    /// Payloads to publish, in emission order
    pub emitted: Vec<Payload>,
}

impl Outcome {
    /// Keep the memory as is and emit nothing
    pub fn unchanged(memory: Memory) -> Self {
        Self {
            memory,
            emitted: Vec::new(),
        }
    }

    pub fn emit(&mut self, payload: Payload) {
        self.emitted.push(payload);
    }
}

/// Per-agent activity timestamps maintained by the runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_receive_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Error of the latest invocation; cleared by the next success
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl AgentStatus {
    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }
}

/// True when `at` is no older than `period` relative to `now`
pub(crate) fn within(at: Option<DateTime<Utc>>, period: Duration, now: DateTime<Utc>) -> bool {
    at.is_some_and(|at| now - at <= period)
}

/// A processing unit with private memory.
///
/// Implementations are pure with respect to storage: all state changes travel
/// in the returned [`Outcome`].
#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Check the options; the first failing constraint is reported.
    fn validate(&self) -> std::result::Result<(), ValidationError>;

    /// Whether upstream messages may be delivered to this agent
    fn can_receive(&self) -> bool {
        true
    }

    /// Whether the scheduler should call [`Agent::check`]
    fn can_be_scheduled(&self) -> bool {
        false
    }

    /// Cadence used when configuration does not set one
    fn default_schedule(&self) -> Option<Schedule> {
        None
    }

    /// Whether the agent behaves as its expected period says it should
    fn is_working(&self, status: &AgentStatus, now: DateTime<Utc>) -> bool;

    /// Time-triggered production
    async fn check(&self, memory: Memory, _now: DateTime<Utc>) -> Result<Outcome> {
        Ok(Outcome::unchanged(memory))
    }

    /// Event-triggered consumption of a batch in producer order
    async fn receive(
        &self,
        memory: Memory,
        messages: &[Message],
        now: DateTime<Utc>,
    ) -> Result<Outcome>;
}

/// Rejection used by agents that never consume messages
pub(crate) fn cannot_receive(kind: AgentKind) -> AgentflowError {
    AgentflowError::Unsupported(format!("{kind} agents do not receive messages"))
}
