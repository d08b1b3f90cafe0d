//! Peak candidate rules

use super::window::{Sample, Stats};
use serde::{Deserialize, Serialize};

/// How the newest sample of a window is judged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detection {
    /// Newest value exceeds `mean + std_multiple * std_dev` of the earlier samples
    #[default]
    StdDev,
    /// Newest value equals the maximum of the window
    RunningMax,
}

impl Detection {
    /// Judge the last sample of `window` against the rest of it
    pub fn is_candidate(self, window: &[Sample], std_multiple: f64) -> bool {
        let Some((newest, earlier)) = window.split_last() else {
            return false;
        };

        match self {
            Detection::StdDev => Stats::of(earlier)
                .is_some_and(|stats| newest.value > stats.mean + std_multiple * stats.std_dev),
            Detection::RunningMax => earlier.iter().all(|s| s.value <= newest.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(*v, i as i64))
            .collect()
    }

    #[test]
    fn test_std_dev_needs_history() {
        assert!(!Detection::StdDev.is_candidate(&window(&[50.0]), 3.0));
        assert!(!Detection::StdDev.is_candidate(&[], 3.0));
    }

    #[test]
    fn test_std_dev_outlier() {
        assert!(Detection::StdDev.is_candidate(&window(&[5.0, 6.0, 4.0, 5.0, 4.0, 5.0, 15.0]), 3.0));
        assert!(!Detection::StdDev.is_candidate(&window(&[5.0, 6.0, 4.0, 5.0, 6.0]), 3.0));
    }

    #[test]
    fn test_flat_series_is_not_a_peak() {
        assert!(!Detection::StdDev.is_candidate(&window(&[1.0, 1.0, 1.0, 1.0]), 3.0));
        // a plateau is always a running maximum
        assert!(Detection::RunningMax.is_candidate(&window(&[1.0, 1.0, 1.0, 1.0]), 3.0));
    }

    #[test]
    fn test_running_max() {
        assert!(Detection::RunningMax.is_candidate(&window(&[3.0, 1.0, 3.0]), 0.0));
        assert!(!Detection::RunningMax.is_candidate(&window(&[3.0, 4.0, 3.5]), 0.0));
        assert!(Detection::RunningMax.is_candidate(&window(&[7.0]), 0.0));
    }
}
