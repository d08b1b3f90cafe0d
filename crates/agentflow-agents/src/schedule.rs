//! Named check cadences such as `every_10m`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Interval between two scheduled checks.
///
/// Written as `every_<n><unit>` with unit `s`, `m`, `h` or `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Schedule {
    every: Duration,
}

impl Schedule {
    pub fn every(every: Duration) -> Self {
        Self { every }
    }

    pub fn interval(&self) -> Duration {
        self.every
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid schedule `{0}`, expected every_<n><s|m|h|d>")]
pub struct ScheduleParseError(String);

impl FromStr for Schedule {
    type Err = ScheduleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ScheduleParseError(s.to_string());
        let spec = s.trim().strip_prefix("every_").ok_or_else(err)?;
        if spec.len() < 2 {
            return Err(err());
        }
        let (amount, unit) = spec.split_at(spec.len() - 1);
        let amount: u64 = amount.parse().map_err(|_| err())?;
        let unit_secs = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            _ => return Err(err()),
        };
        if amount == 0 {
            return Err(err());
        }
        let secs = amount.checked_mul(unit_secs).ok_or_else(err)?;
        Ok(Self::every(Duration::from_secs(secs)))
    }
}

impl TryFrom<String> for Schedule {
    type Error = ScheduleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Schedule> for String {
    fn from(schedule: Schedule) -> Self {
        schedule.to_string()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.every.as_secs();
        let (amount, unit) = [(86_400, "d"), (3_600, "h"), (60, "m")]
            .into_iter()
            .find(|(size, _)| secs % size == 0)
            .map_or((secs, "s"), |(size, unit)| (secs / size, unit));
        write!(f, "every_{amount}{unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_schedules() {
        assert_eq!("every_10m".parse::<Schedule>().unwrap().interval(), Duration::from_secs(600));
        assert_eq!("every_1d".parse::<Schedule>().unwrap().interval(), Duration::from_secs(86_400));
        assert_eq!("every_30s".parse::<Schedule>().unwrap().interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_reject_bad_schedules() {
        for bad in [
            "10m",
            "every_m",
            "every_0m",
            "every_5w",
            "midnight",
            "every_300000000000000d",
        ] {
            assert!(bad.parse::<Schedule>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_display_uses_largest_unit() {
        assert_eq!(Schedule::every(Duration::from_secs(7_200)).to_string(), "every_2h");
        assert_eq!(Schedule::every(Duration::from_secs(90)).to_string(), "every_90s");
    }
}
