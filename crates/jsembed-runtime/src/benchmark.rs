//! Sequential benchmark runs.

use jsembed_common::ExecutionResult;
use jsembed_metrics::{BenchmarkRecorder, BenchmarkReport};
use std::time::Instant;

/// Calls `call` `iterations` times on the current thread and reports timings.
///
/// Failed iterations are counted and the run continues.
pub fn run_benchmark<F>(iterations: u64, mut call: F) -> BenchmarkReport
where
    F: FnMut() -> ExecutionResult,
{
    let mut recorder = BenchmarkRecorder::new();
    for i in 0..iterations {
        let start = Instant::now();
        let result = call();
        let elapsed = start.elapsed();

        if let Err(e) = &result {
            tracing::debug!("Benchmark iteration {} failed: {}", i, e);
        }
        recorder.record(elapsed, result.is_ok());
    }

    let report = recorder.finish();
    tracing::info!(
        "Benchmark finished: {} iterations, {:.3}ms average, {:.1}% success",
        report.iterations,
        report.average_ms,
        report.success_rate * 100.0
    );
    report
}
