//! Benchmark accumulation
//!
//! A [`BenchmarkRecorder`] folds per-iteration timings into a
//! [`BenchmarkReport`]. It knows nothing about what is being measured.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Summary of a sequential benchmark run. Durations are in milliseconds.
///
/// `success_rate` is a ratio in `0.0..=1.0`. A run of zero iterations reports
/// zero for every field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub iterations: u64,
    pub success_count: u64,
    pub success_rate: f64,
    pub total_ms: f64,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub throughput_per_sec: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BenchmarkRecorder {
    iterations: u64,
    success_count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

impl BenchmarkRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, elapsed: Duration, success: bool) {
        self.iterations += 1;
        if success {
            self.success_count += 1;
        }
        self.total += elapsed;
        self.min = Some(self.min.map_or(elapsed, |min| min.min(elapsed)));
        self.max = self.max.max(elapsed);
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn finish(self) -> BenchmarkReport {
        if self.iterations == 0 {
            return BenchmarkReport::default();
        }

        let total_ms = as_ms(self.total);
        let iterations = self.iterations as f64;
        let throughput_per_sec = if total_ms > 0.0 {
            iterations / (total_ms / 1000.0)
        } else {
            0.0
        };

        BenchmarkReport {
            iterations: self.iterations,
            success_count: self.success_count,
            success_rate: self.success_count as f64 / iterations,
            total_ms,
            average_ms: total_ms / iterations,
            min_ms: self.min.map(as_ms).unwrap_or(0.0),
            max_ms: as_ms(self.max),
            throughput_per_sec,
        }
    }
}

fn as_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_run_is_all_zero() {
        let report = BenchmarkRecorder::new().finish();
        assert_eq!(report, BenchmarkReport::default());
        assert_eq!(report.average_ms, 0.0);
        assert_eq!(report.throughput_per_sec, 0.0);
    }

    #[test]
    fn test_report_aggregates() {
        let mut recorder = BenchmarkRecorder::new();
        recorder.record(Duration::from_millis(10), true);
        recorder.record(Duration::from_millis(30), false);
        recorder.record(Duration::from_millis(20), true);
        recorder.record(Duration::from_millis(40), true);

        let report = recorder.finish();
        assert_eq!(report.iterations, 4);
        assert_eq!(report.success_count, 3);
        assert!((report.success_rate - 0.75).abs() < 1e-9);
        assert!((report.total_ms - 100.0).abs() < 1e-6);
        assert!((report.average_ms - 25.0).abs() < 1e-6);
        assert!((report.min_ms - 10.0).abs() < 1e-6);
        assert!((report.max_ms - 40.0).abs() < 1e-6);
        assert!((report.throughput_per_sec - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_min_le_avg_le_max() {
        let mut recorder = BenchmarkRecorder::new();
        for ms in [5, 1, 9, 3] {
            recorder.record(Duration::from_millis(ms), true);
        }
        let report = recorder.finish();
        assert!(report.min_ms <= report.average_ms);
        assert!(report.average_ms <= report.max_ms);
        assert_eq!(report.success_rate, 1.0);
    }

    #[test]
    fn test_zero_duration_iterations() {
        let mut recorder = BenchmarkRecorder::new();
        recorder.record(Duration::ZERO, true);
        let report = recorder.finish();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.throughput_per_sec, 0.0);
    }
}
