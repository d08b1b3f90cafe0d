//! Time-ordered sample and peak buffers kept per group

use serde::{Deserialize, Serialize};

/// One observed value, serialized as `[value, timestamp]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, i64)", into = "(f64, i64)")]
pub struct Sample {
    pub value: f64,
    /// Unix seconds
    pub timestamp: i64,
}

/// A fired peak, serialized as `[value, timestamp]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, i64)", into = "(f64, i64)")]
pub struct PeakRecord {
    pub value: f64,
    /// Unix seconds
    pub timestamp: i64,
}

impl Sample {
    pub fn new(value: f64, timestamp: i64) -> Self {
        Self { value, timestamp }
    }
}

impl From<(f64, i64)> for Sample {
    fn from((value, timestamp): (f64, i64)) -> Self {
        Self { value, timestamp }
    }
}

impl From<Sample> for (f64, i64) {
    fn from(sample: Sample) -> Self {
        (sample.value, sample.timestamp)
    }
}

impl From<(f64, i64)> for PeakRecord {
    fn from((value, timestamp): (f64, i64)) -> Self {
        Self { value, timestamp }
    }
}

impl From<PeakRecord> for (f64, i64) {
    fn from(peak: PeakRecord) -> Self {
        (peak.value, peak.timestamp)
    }
}

/// Insert keeping timestamps non-decreasing.
///
/// Returns true when the sample became the newest entry; a late sample lands
/// at its chronological position instead.
pub fn insert(samples: &mut Vec<Sample>, sample: Sample) -> bool {
    let at = samples.partition_point(|s| s.timestamp <= sample.timestamp);
    let newest = at == samples.len();
    samples.insert(at, sample);
    newest
}

/// Drop samples at or before `cutoff`
pub fn trim(samples: &mut Vec<Sample>, cutoff: i64) {
    samples.retain(|s| s.timestamp > cutoff);
}

/// Drop peaks at or before `cutoff`
pub fn trim_peaks(peaks: &mut Vec<PeakRecord>, cutoff: i64) {
    peaks.retain(|p| p.timestamp > cutoff);
}

/// True when no recorded peak lies within `spacing` seconds before `at`
pub fn spaced(peaks: &[PeakRecord], at: i64, spacing: i64) -> bool {
    peaks.iter().all(|p| p.timestamp < at - spacing)
}

/// Population mean and standard deviation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
}

impl Stats {
    pub fn of(samples: &[Sample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().map(|s| s.value).sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s.value - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(points: &[(f64, i64)]) -> Vec<Sample> {
        points.iter().copied().map(Sample::from).collect()
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut buf = samples(&[(1.0, 10), (2.0, 20)]);
        assert!(insert(&mut buf, Sample::new(3.0, 30)));
        assert!(insert(&mut buf, Sample::new(4.0, 30)));
        assert!(!insert(&mut buf, Sample::new(5.0, 15)));

        let times: Vec<i64> = buf.iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![10, 15, 20, 30, 30]);
    }

    #[test]
    fn test_trim_is_exclusive_of_cutoff() {
        let mut buf = samples(&[(1.0, 10), (2.0, 20), (3.0, 30)]);
        trim(&mut buf, 20);
        assert_eq!(buf, samples(&[(3.0, 30)]));
    }

    #[test]
    fn test_spacing() {
        let peaks = vec![PeakRecord::from((9.0, 100))];
        assert!(!spaced(&peaks, 150, 50));
        assert!(spaced(&peaks, 151, 50));
        assert!(spaced(&[], 0, 50));
    }

    #[test]
    fn test_stats() {
        let stats = Stats::of(&samples(&[(2.0, 0), (4.0, 1), (4.0, 2), (4.0, 3), (5.0, 4), (5.0, 5), (7.0, 6), (9.0, 7)])).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std_dev, 2.0);
        assert!(Stats::of(&[]).is_none());
    }

    #[test]
    fn test_serialized_as_pairs() {
        let json = serde_json::to_string(&samples(&[(1.5, 10)])).unwrap();
        assert_eq!(json, "[[1.5,10]]");
        let back: Vec<PeakRecord> = serde_json::from_str("[[15.0,3600]]").unwrap();
        assert_eq!(back[0].timestamp, 3600);
    }
}
