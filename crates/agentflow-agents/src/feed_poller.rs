//! Feed poller agent
//!
//! Polls a [`FeedSource`] on a schedule and emits one message per new item.
//! The cursor of the newest item is kept in memory and passed back to the
//! source on the next poll.

use crate::agent::{cannot_receive, within, Agent, AgentStatus, Outcome};
use crate::kinds::AgentKind;
use crate::options::{self, LenientNumber};
use crate::schedule::Schedule;
use agentflow_common::{
    payload::{render, value_at},
    Memory, Message, Payload, Result, ValidationError,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, info, instrument};

/// Memory slot holding the cursor of the newest item seen
pub const CURSOR_KEY: &str = "last_cursor";

const DEFAULT_CURSOR_PATH: &str = "created_at";
const DEFAULT_SCHEDULE: StdDuration = StdDuration::from_secs(10 * 60);

/// Where feed items come from.
///
/// Items are returned newest first. `since` is the cursor recorded on the
/// previous poll, read from each item at `cursor_path`; sources may use it to
/// skip items they know are older.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(
        &self,
        source: &str,
        cursor_path: &str,
        since: Option<&str>,
    ) -> Result<Vec<Value>>;
}

/// Options as written in configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPollerOptions {
    /// Feed identifier handed to the [`FeedSource`]
    #[serde(default)]
    pub source: String,
    /// Path of the item field used as cursor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_update_period_in_days: Option<LenientNumber>,
}

#[derive(Debug, Clone, PartialEq)]
struct Settings {
    source: String,
    cursor_path: String,
    expected_update_period: Duration,
}

/// Emits the items a feed gained since the previous poll
#[derive(Clone)]
pub struct FeedPollerAgent {
    options: FeedPollerOptions,
    feed: Arc<dyn FeedSource>,
}

impl fmt::Debug for FeedPollerAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedPollerAgent")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl FeedPollerAgent {
    pub fn new(options: FeedPollerOptions, feed: Arc<dyn FeedSource>) -> Self {
        Self { options, feed }
    }

    pub fn options(&self) -> &FeedPollerOptions {
        &self.options
    }

    fn settings(&self) -> std::result::Result<Settings, ValidationError> {
        let source = options::required_text("source", &self.options.source)?;
        let cursor_path = self
            .options
            .cursor_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_CURSOR_PATH)
            .to_string();
        let period_days = options::required_days(
            "expected_update_period_in_days",
            self.options.expected_update_period_in_days.as_ref(),
        )?;

        Ok(Settings {
            source,
            cursor_path,
            expected_update_period: Duration::seconds(options::days_to_secs(period_days)),
        })
    }
}

/// Item as a payload; non-object items land under `value`
fn into_payload(item: Value) -> Payload {
    match item {
        Value::Object(map) => map,
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

#[async_trait]
impl Agent for FeedPollerAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::FeedPoller
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        self.settings().map(|_| ())
    }

    fn can_receive(&self) -> bool {
        false
    }

    fn can_be_scheduled(&self) -> bool {
        true
    }

    fn default_schedule(&self) -> Option<Schedule> {
        Some(Schedule::every(DEFAULT_SCHEDULE))
    }

    fn is_working(&self, status: &AgentStatus, now: DateTime<Utc>) -> bool {
        match self.settings() {
            Ok(settings) => {
                within(status.last_message_at, settings.expected_update_period, now)
                    && !status.has_error()
            }
            Err(_) => false,
        }
    }

    #[instrument(skip_all, fields(source = %self.options.source))]
    async fn check(&self, memory: Memory, _now: DateTime<Utc>) -> Result<Outcome> {
        let settings = self.settings()?;
        let since: Option<String> = memory.get_as(CURSOR_KEY)?;
        let items = self
            .feed
            .fetch(&settings.source, &settings.cursor_path, since.as_deref())
            .await?;

        let newest_cursor = items
            .first()
            .and_then(|item| item.as_object())
            .and_then(|item| value_at(item, &settings.cursor_path).ok())
            .map(render)
            .filter(|cursor| !cursor.is_empty());

        let mut outcome = Outcome::unchanged(memory);
        if since.is_some() {
            for item in items {
                outcome.emit(into_payload(item));
            }
            info!(emitted = outcome.emitted.len(), "Polled feed");
        } else {
            debug!(fetched = items.len(), "First poll only records the cursor");
        }

        if let Some(cursor) = newest_cursor {
            outcome.memory.set(CURSOR_KEY, cursor);
        }
        Ok(outcome)
    }

    async fn receive(
        &self,
        _memory: Memory,
        _messages: &[Message],
        _now: DateTime<Utc>,
    ) -> Result<Outcome> {
        Err(cannot_receive(self.kind()))
    }
}
