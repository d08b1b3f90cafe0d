//! Peak detector agent
//!
//! Keeps, per group, a rolling window of `(value, timestamp)` samples and the
//! peaks already fired. A message whose value stands out from the window
//! fires a peak unless another peak of the same group fired within the
//! minimum spacing.
//!
//! ```text
//! memory = {
//!   "data":  { group: [[value, ts], ...] },
//!   "peaks": { group: [[value, ts], ...] }
//! }
//! ```

pub mod detection;
pub mod window;

pub use detection::Detection;
pub use window::{PeakRecord, Sample};

use crate::agent::{within, Agent, AgentStatus, Outcome};
use crate::kinds::AgentKind;
use crate::options::{self, LenientNumber};
use agentflow_common::{
    payload::{interpolate, numeric_at, render, value_at},
    AgentflowError, Memory, Message, Payload, Result, ValidationError, DEFAULT_GROUP,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Memory slot of the per-group sample windows
pub const DATA_KEY: &str = "data";
/// Memory slot of the per-group fired peaks
pub const PEAKS_KEY: &str = "peaks";

const DEFAULT_MIN_MESSAGES: u32 = 1;
const DEFAULT_WINDOW_DAYS: f64 = 2.0;
const DEFAULT_MIN_PEAK_SPACING_DAYS: f64 = 1.0;
const DEFAULT_STD_MULTIPLE: f64 = 3.0;

type Windows = BTreeMap<String, Vec<Sample>>;
type Peaks = BTreeMap<String, Vec<PeakRecord>>;

/// Options as written in configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakDetectorOptions {
    /// Path of the numeric value to track
    #[serde(default)]
    pub value_path: String,
    /// Path of the grouping value; blank tracks a single series
    #[serde(default)]
    pub group_by_path: String,
    /// Text of the emitted message, `{{ path }}` placeholders allowed
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_messages: Option<LenientNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_duration_in_days: Option<LenientNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_peak_spacing_in_days: Option<LenientNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_receive_period_in_days: Option<LenientNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_multiple: Option<LenientNumber>,
    #[serde(default)]
    pub detection: Detection,
}

/// Validated options with durations in whole seconds
#[derive(Debug, Clone, PartialEq)]
struct Settings {
    value_path: String,
    group_by_path: Option<String>,
    message: String,
    min_messages: usize,
    window_secs: i64,
    spacing_secs: i64,
    expected_receive_period: Duration,
    std_multiple: f64,
    detection: Detection,
}

impl Settings {
    /// Group of a payload; a missing grouping value falls into the default group.
    fn group_of(&self, payload: &Payload) -> String {
        self.group_by_path
            .as_deref()
            .and_then(|path| value_at(payload, path).ok())
            .map(render)
            .unwrap_or_else(|| DEFAULT_GROUP.to_string())
    }

    /// Peaks are kept long enough for both the window and the debounce check
    fn peak_retention_secs(&self) -> i64 {
        self.window_secs.max(self.spacing_secs)
    }
}

/// Detects peaks in a numeric field, independently per group
#[derive(Debug, Clone)]
pub struct PeakDetectorAgent {
    options: PeakDetectorOptions,
}

impl PeakDetectorAgent {
    pub fn new(options: PeakDetectorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PeakDetectorOptions {
        &self.options
    }

    fn settings(&self) -> std::result::Result<Settings, ValidationError> {
        let o = &self.options;
        let message = options::required_text("message", &o.message)?;
        let value_path = options::required_text("value_path", &o.value_path)?;
        let expected_days = options::required_days(
            "expected_receive_period_in_days",
            o.expected_receive_period_in_days.as_ref(),
        )?;

        let min_messages = options::whole("min_messages", o.min_messages.as_ref())?
            .unwrap_or(DEFAULT_MIN_MESSAGES);
        if min_messages == 0 {
            return Err(ValidationError::new("min_messages", "must be at least 1"));
        }
        let window_days = options::positive("window_duration_in_days", o.window_duration_in_days.as_ref())?
            .unwrap_or(DEFAULT_WINDOW_DAYS);
        let spacing_days =
            options::positive("min_peak_spacing_in_days", o.min_peak_spacing_in_days.as_ref())?
                .unwrap_or(DEFAULT_MIN_PEAK_SPACING_DAYS);
        let std_multiple = options::positive("std_multiple", o.std_multiple.as_ref())?
            .unwrap_or(DEFAULT_STD_MULTIPLE);

        let group_by_path = Some(o.group_by_path.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Ok(Settings {
            value_path,
            group_by_path,
            message,
            min_messages: min_messages as usize,
            window_secs: options::days_to_secs(window_days),
            spacing_secs: options::days_to_secs(spacing_days),
            expected_receive_period: Duration::seconds(options::days_to_secs(expected_days)),
            std_multiple,
            detection: o.detection,
        })
    }

    /// Fold one message into the windows, returning the peak payload if one fired
    fn track(
        &self,
        settings: &Settings,
        windows: &mut Windows,
        peaks: &mut Peaks,
        message: &Message,
    ) -> Result<Option<Payload>> {
        let payload = message.payload();
        let value = numeric_at(payload, &settings.value_path)?;
        let group = settings.group_of(payload);
        let at = message.timestamp();

        let samples = windows.entry(group.clone()).or_default();
        let newest = window::insert(samples, Sample::new(value, at));
        let horizon = samples.last().map_or(at, |s| s.timestamp);
        window::trim(samples, horizon - settings.window_secs);

        if !newest {
            debug!(group = %group, at, "Late sample stored without peak evaluation");
            return Ok(None);
        }
        if samples.len() < settings.min_messages {
            return Ok(None);
        }

        let group_peaks = peaks.entry(group.clone()).or_default();
        if !window::spaced(group_peaks, at, settings.spacing_secs) {
            return Ok(None);
        }
        if !settings.detection.is_candidate(samples, settings.std_multiple) {
            return Ok(None);
        }

        group_peaks.push(PeakRecord { value, timestamp: at });
        window::trim_peaks(group_peaks, at - settings.peak_retention_secs());

        info!(group = %group, peak = value, at, "Peak detected");

        let mut out = Payload::new();
        out.insert("message".into(), Value::from(interpolate(&settings.message, payload)));
        out.insert("peak".into(), Value::from(value));
        out.insert("peak_time".into(), Value::from(at));
        out.insert("grouped_by".into(), Value::from(group));
        Ok(Some(out))
    }
}

#[async_trait]
impl Agent for PeakDetectorAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::PeakDetector
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        self.settings().map(|_| ())
    }

    fn is_working(&self, status: &AgentStatus, now: DateTime<Utc>) -> bool {
        match self.settings() {
            Ok(settings) => {
                within(status.last_receive_at, settings.expected_receive_period, now)
                    && !status.has_error()
            }
            Err(_) => false,
        }
    }

    #[instrument(skip_all, fields(batch = messages.len()))]
    async fn receive(
        &self,
        memory: Memory,
        messages: &[Message],
        _now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let settings = self.settings().map_err(AgentflowError::from)?;
        if messages.is_empty() {
            return Ok(Outcome::unchanged(memory));
        }

        let mut windows: Windows = memory.get_as(DATA_KEY)?.unwrap_or_default();
        let mut peaks: Peaks = memory.get_as(PEAKS_KEY)?.unwrap_or_default();

        // arrival order; a late sample is placed by window::insert
        let mut outcome = Outcome::unchanged(memory);
        for message in messages {
            let fired = self
                .track(&settings, &mut windows, &mut peaks, message)
                .map_err(|e| e.in_message(message.id()))?;
            if let Some(payload) = fired {
                outcome.emit(payload);
            }
        }

        outcome.memory.set_as(DATA_KEY, &windows)?;
        outcome.memory.set_as(PEAKS_KEY, &peaks)?;
        Ok(outcome)
    }
}
