//! Attribute difference agent
//!
//! Compares a numeric field of every incoming message against the value seen
//! in the previous message and re-emits the payload with the difference added
//! under the configured output field.

use crate::agent::{within, Agent, AgentStatus, Outcome};
use crate::kinds::AgentKind;
use crate::options::{self, LenientNumber};
use agentflow_common::{
    payload::numeric_at, AgentflowError, ArithmeticError, Memory, Message, Payload, Result,
    ValidationError, DEFAULT_DECIMAL_PRECISION,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

/// Memory slot holding the raw value of the previous message
pub const LAST_VALUE_KEY: &str = "last_value";

/// Largest precision that still rounds meaningfully in an f64
const MAX_DECIMAL_PRECISION: u32 = 15;

/// How the difference is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceMethod {
    /// `round(v) - round(previous)`
    IntegerDifference,
    /// `v - previous`, rounded
    DecimalDifference,
    /// `(v - previous) / previous * 100`, rounded
    PercentageChange,
}

impl FromStr for DifferenceMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "integer_difference" => Ok(Self::IntegerDifference),
            "decimal_difference" => Ok(Self::DecimalDifference),
            "percentage_change" => Ok(Self::PercentageChange),
            other => Err(ValidationError::new(
                "method",
                format!(
                    "must be one of integer_difference, decimal_difference, percentage_change (got `{other}`)"
                ),
            )),
        }
    }
}

impl fmt::Display for DifferenceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IntegerDifference => "integer_difference",
            Self::DecimalDifference => "decimal_difference",
            Self::PercentageChange => "percentage_change",
        })
    }
}

/// Options as written in configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeDifferenceOptions {
    /// Path of the numeric field to compare
    #[serde(default)]
    pub path: String,
    /// Field added to the emitted payload
    #[serde(default)]
    pub output: String,
    /// One of `integer_difference`, `decimal_difference`, `percentage_change`
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal_precision: Option<LenientNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_update_period_in_days: Option<LenientNumber>,
}

/// Validated options
#[derive(Debug, Clone, PartialEq)]
struct Settings {
    path: String,
    output: String,
    method: DifferenceMethod,
    precision: u32,
    expected_update_period: Duration,
}

/// Emits each incoming payload enriched with its difference to the previous one
#[derive(Debug, Clone)]
pub struct AttributeDifferenceAgent {
    options: AttributeDifferenceOptions,
}

impl AttributeDifferenceAgent {
    pub fn new(options: AttributeDifferenceOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AttributeDifferenceOptions {
        &self.options
    }

    fn settings(&self) -> std::result::Result<Settings, ValidationError> {
        let path = options::required_text("path", &self.options.path)?;
        let output = options::required_text("output", &self.options.output)?;
        let method = options::required_text("method", &self.options.method)?
            .parse::<DifferenceMethod>()?;
        let precision = options::whole("decimal_precision", self.options.decimal_precision.as_ref())?
            .unwrap_or(DEFAULT_DECIMAL_PRECISION);
        if precision > MAX_DECIMAL_PRECISION {
            return Err(ValidationError::new(
                "decimal_precision",
                format!("must be at most {MAX_DECIMAL_PRECISION}"),
            ));
        }
        let period_days = options::required_days(
            "expected_update_period_in_days",
            self.options.expected_update_period_in_days.as_ref(),
        )?;

        Ok(Settings {
            path,
            output,
            method,
            precision,
            expected_update_period: Duration::seconds(options::days_to_secs(period_days)),
        })
    }

    fn handle(&self, settings: &Settings, memory: &mut Memory, message: &Message) -> Result<Payload> {
        let value = numeric_at(message.payload(), &settings.path)?;
        let previous: Option<f64> = memory.get_as(LAST_VALUE_KEY)?;
        let delta = difference(settings, value, previous)?;

        debug!(
            message_id = %message.id(),
            value,
            previous = ?previous,
            delta = %delta,
            "Computed attribute difference"
        );

        let mut payload = message.payload().clone();
        payload.insert(settings.output.clone(), delta);
        memory.set(LAST_VALUE_KEY, value);
        Ok(payload)
    }
}

fn difference(settings: &Settings, value: f64, previous: Option<f64>) -> Result<Value> {
    let Some(previous) = previous else {
        return Ok(Value::from(0));
    };
    let out_of_range = || ArithmeticError::OutOfRange {
        path: settings.path.clone(),
    };

    if settings.method == DifferenceMethod::IntegerDifference {
        let delta = value.round() - previous.round();
        // i64::MAX as f64 is 2^63, itself out of range
        if !delta.is_finite() || delta < i64::MIN as f64 || delta >= i64::MAX as f64 {
            return Err(out_of_range().into());
        }
        return Ok(Value::from(delta as i64));
    }

    let current = Decimal::from_f64(value).ok_or_else(out_of_range)?;
    let previous = Decimal::from_f64(previous).ok_or_else(out_of_range)?;
    let delta = current.checked_sub(previous).ok_or_else(out_of_range)?;

    let result = match settings.method {
        DifferenceMethod::PercentageChange => {
            if previous.is_zero() {
                return Err(ArithmeticError::ZeroBaseline {
                    path: settings.path.clone(),
                }
                .into());
            }
            delta
                .checked_div(previous)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .ok_or_else(out_of_range)?
        }
        _ => delta,
    };

    let rounded = result
        .round_dp_with_strategy(settings.precision, RoundingStrategy::MidpointAwayFromZero)
        .to_f64();
    rounded
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| {
            ArithmeticError::NonFinite {
                path: settings.path.clone(),
            }
            .into()
        })
}

#[async_trait]
impl Agent for AttributeDifferenceAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::AttributeDifference
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        self.settings().map(|_| ())
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

    #[instrument(skip_all, fields(batch = messages.len()))]
    async fn receive(
        &self,
        mut memory: Memory,
        messages: &[Message],
        _now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let settings = self.settings().map_err(AgentflowError::from)?;

        let mut emitted = Vec::with_capacity(messages.len());
        for message in messages {
            let payload = self
                .handle(&settings, &mut memory, message)
                .map_err(|e| e.in_message(message.id()))?;
            emitted.push(payload);
        }

        Ok(Outcome { memory, emitted })
    }
}
