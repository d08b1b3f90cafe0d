//! Option parsing shared by the agent kinds
//!
//! Numeric options arrive either as JSON numbers or as strings (`"4"`,
//! `"0.5"`), so they are kept lenient at deserialization time and checked in
//! `validate`.

use agentflow_common::{ValidationError, SECONDS_PER_DAY};
use serde::{Deserialize, Serialize};

/// A number, or a string holding one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LenientNumber {
    Number(f64),
    Text(String),
}

impl LenientNumber {
    /// Parsed value; `None` for blank or non-numeric text
    pub fn value(&self) -> Option<f64> {
        match self {
            LenientNumber::Number(n) => Some(*n).filter(|n| n.is_finite()),
            LenientNumber::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, LenientNumber::Text(s) if s.trim().is_empty())
    }
}

impl From<f64> for LenientNumber {
    fn from(n: f64) -> Self {
        LenientNumber::Number(n)
    }
}

impl From<&str> for LenientNumber {
    fn from(s: &str) -> Self {
        LenientNumber::Text(s.to_string())
    }
}

/// A non-blank string option
pub(crate) fn required_text(field: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::missing(field))
    } else {
        Ok(trimmed.to_string())
    }
}

/// A strictly positive number; blank counts as absent
pub(crate) fn positive(
    field: &str,
    value: Option<&LenientNumber>,
) -> Result<Option<f64>, ValidationError> {
    match value {
        None => Ok(None),
        Some(v) if v.is_blank() => Ok(None),
        Some(v) => match v.value() {
            Some(n) if n > 0.0 => Ok(Some(n)),
            _ => Err(ValidationError::new(field, "must be a positive number")),
        },
    }
}

/// A non-negative whole number; blank counts as absent
pub(crate) fn whole(
    field: &str,
    value: Option<&LenientNumber>,
) -> Result<Option<u32>, ValidationError> {
    match value {
        None => Ok(None),
        Some(v) if v.is_blank() => Ok(None),
        Some(v) => match v.value() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => Ok(Some(n as u32)),
            _ => Err(ValidationError::new(field, "must be a non-negative integer")),
        },
    }
}

/// A positive number of days, required
pub(crate) fn required_days(
    field: &str,
    value: Option<&LenientNumber>,
) -> Result<f64, ValidationError> {
    positive(field, value)?.ok_or_else(|| ValidationError::missing(field))
}

/// Whole seconds in a fractional number of days
pub(crate) fn days_to_secs(days: f64) -> i64 {
    (days * SECONDS_PER_DAY).round() as i64
}
