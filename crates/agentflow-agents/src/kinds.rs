//! The closed set of agent kinds and their construction from options

use crate::agent::{Agent, AgentStatus, Outcome};
use crate::attribute_difference::{AttributeDifferenceAgent, AttributeDifferenceOptions};
use crate::feed_poller::{FeedPollerAgent, FeedPollerOptions, FeedSource};
use crate::peak_detector::{PeakDetectorAgent, PeakDetectorOptions};
use crate::schedule::Schedule;
use agentflow_common::{AgentflowError, Memory, Message, Result, ValidationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Agent kind discriminator, as written in the `type` option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    AttributeDifference,
    PeakDetector,
    FeedPoller,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::AttributeDifference => "attribute_difference",
            AgentKind::PeakDetector => "peak_detector",
            AgentKind::FeedPoller => "feed_poller",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific options, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentOptions {
    AttributeDifference(AttributeDifferenceOptions),
    PeakDetector(PeakDetectorOptions),
    FeedPoller(FeedPollerOptions),
}

impl AgentOptions {
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentOptions::AttributeDifference(_) => AgentKind::AttributeDifference,
            AgentOptions::PeakDetector(_) => AgentKind::PeakDetector,
            AgentOptions::FeedPoller(_) => AgentKind::FeedPoller,
        }
    }
}

/// Any concrete agent, dispatched statically
#[derive(Debug, Clone)]
pub enum AnyAgent {
    AttributeDifference(AttributeDifferenceAgent),
    PeakDetector(PeakDetectorAgent),
    FeedPoller(FeedPollerAgent),
}

macro_rules! dispatch {
    ($self:ident, $agent:ident => $body:expr) => {
        match $self {
            AnyAgent::AttributeDifference($agent) => $body,
            AnyAgent::PeakDetector($agent) => $body,
            AnyAgent::FeedPoller($agent) => $body,
        }
    };
}

#[async_trait]
impl Agent for AnyAgent {
    fn kind(&self) -> AgentKind {
        dispatch!(self, a => a.kind())
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        dispatch!(self, a => a.validate())
    }

    fn can_receive(&self) -> bool {
        dispatch!(self, a => a.can_receive())
    }

    fn can_be_scheduled(&self) -> bool {
        dispatch!(self, a => a.can_be_scheduled())
    }

    fn default_schedule(&self) -> Option<Schedule> {
        dispatch!(self, a => a.default_schedule())
    }

    fn is_working(&self, status: &AgentStatus, now: DateTime<Utc>) -> bool {
        dispatch!(self, a => a.is_working(status, now))
    }

    async fn check(&self, memory: Memory, now: DateTime<Utc>) -> Result<Outcome> {
        dispatch!(self, a => a.check(memory, now).await)
    }

    async fn receive(
        &self,
        memory: Memory,
        messages: &[Message],
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        dispatch!(self, a => a.receive(memory, messages, now).await)
    }
}

/// Builds agents from options, wiring in the external services they need
#[derive(Clone, Default)]
pub struct AgentFactory {
    feeds: Option<Arc<dyn FeedSource>>,
}

impl AgentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed source handed to every feed poller
    pub fn with_feeds(mut self, feeds: Arc<dyn FeedSource>) -> Self {
        self.feeds = Some(feeds);
        self
    }

    pub fn build(&self, options: AgentOptions) -> Result<AnyAgent> {
        match options {
            AgentOptions::AttributeDifference(o) => {
                Ok(AnyAgent::AttributeDifference(AttributeDifferenceAgent::new(o)))
            }
            AgentOptions::PeakDetector(o) => Ok(AnyAgent::PeakDetector(PeakDetectorAgent::new(o))),
            AgentOptions::FeedPoller(o) => {
                let feeds = self.feeds.clone().ok_or_else(|| {
                    AgentflowError::Config("feed_poller agents need a feed source".into())
                })?;
                Ok(AnyAgent::FeedPoller(FeedPollerAgent::new(o, feeds)))
            }
        }
    }
}
