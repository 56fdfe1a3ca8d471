use crate::snapshot::{FunctionMetrics, MetricsSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::{Instant, SystemTime};

/// Seven decades (1us .. 10s) of ten sub-bins each, plus one overflow bin.
const NUM_HISTOGRAM_BINS: usize = 71;

/// Fallback timestamp counter for when SystemTime::duration_since() fails.
static TIMESTAMP_FALLBACK: AtomicU64 = AtomicU64::new(1);

/// Tracks the last issued timestamp so that access times are strictly increasing.
static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Returns a timestamp in milliseconds strictly greater than every previous one.
///
/// LRU eviction needs a total order of access times; two calls in the same
/// millisecond still get distinct values.
fn get_monotonic_timestamp() -> u64 {
    let system_time = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|_| TIMESTAMP_FALLBACK.fetch_add(1, Ordering::SeqCst));

    loop {
        let last = LAST_TIMESTAMP.load(Ordering::Acquire);
        let new_timestamp = system_time.max(last + 1);

        match LAST_TIMESTAMP.compare_exchange_weak(
            last,
            new_timestamp,
            Ordering::SeqCst,
            Ordering::Acquire,
        ) {
            Ok(_) => return new_timestamp,
            Err(_) => continue,
        }
    }
}

/// Size limit for the per-function table.
///
/// Function names come from callers, so the table is bounded; when it grows
/// past `max_functions` the least-recently-used entries are evicted. Global
/// counters are never affected by eviction.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub max_functions: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { max_functions: 1000 }
    }
}

/// Log-linear latency histogram.
///
/// Bin `d * 10 + k` covers `[k * 10^d, (k + 1) * 10^d)` microseconds for
/// `k` in 1..=9; bin 0 holds zero-latency samples and the last bin holds
/// everything from 10 seconds up. Recording is a single atomic increment.
#[derive(Debug)]
struct LatencyHistogram {
    bins: [AtomicU64; NUM_HISTOGRAM_BINS],
    total_latency: AtomicU64,
    sample_count: AtomicU64,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            bins: std::array::from_fn(|_| AtomicU64::new(0)),
            total_latency: AtomicU64::new(0),
            sample_count: AtomicU64::new(0),
        }
    }

    fn record(&self, latency_us: u64) {
        let bin = Self::latency_to_bin(latency_us);
        self.bins[bin].fetch_add(1, Ordering::Relaxed);
        self.total_latency.fetch_add(latency_us, Ordering::Relaxed);
        self.sample_count.fetch_add(1, Ordering::Relaxed);
    }

    fn latency_to_bin(latency_us: u64) -> usize {
        if latency_us == 0 {
            return 0;
        }
        let decade = latency_us.ilog10() as usize;
        let leading = (latency_us / 10u64.pow(decade as u32)) as usize;
        (decade * 10 + leading).min(NUM_HISTOGRAM_BINS - 1)
    }

    /// `[lower, upper)` bounds of a bin in microseconds.
    fn bin_bounds(bin: usize) -> (u64, u64) {
        if bin == 0 {
            return (0, 1);
        }
        let decade = (bin / 10) as u32;
        let leading = (bin % 10) as u64;
        let scale = 10u64.pow(decade);
        if bin == NUM_HISTOGRAM_BINS - 1 {
            return (scale * leading.max(1), scale * 10);
        }
        (scale * leading, scale * (leading + 1))
    }

    /// Estimates the latency at `percentile` (0-100), interpolating inside the bin.
    fn estimate_percentile(&self, percentile: u64) -> u64 {
        let total = self.sample_count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }

        let target = ((total * percentile).div_ceil(100)).max(1);
        let mut cumulative = 0;

        for (bin_idx, bin) in self.bins.iter().enumerate() {
            let count = bin.load(Ordering::Relaxed);
            if count > 0 && cumulative + count >= target {
                let (lower, upper) = Self::bin_bounds(bin_idx);
                let fraction = (target - cumulative) as f64 / count as f64;
                return lower + (fraction * (upper - lower) as f64) as u64;
            }
            cumulative += count;
        }

        Self::bin_bounds(NUM_HISTOGRAM_BINS - 1).1
    }

    /// Returns `(avg, p50, p95, p99)` in microseconds, zeros when empty.
    fn calculate_percentiles(&self) -> (u64, u64, u64, u64) {
        let total = self.sample_count.load(Ordering::Relaxed);
        if total == 0 {
            return (0, 0, 0, 0);
        }

        let avg = self.total_latency.load(Ordering::Relaxed) / total;
        (
            avg,
            self.estimate_percentile(50),
            self.estimate_percentile(95),
            self.estimate_percentile(99),
        )
    }
}

/// Per-function counters. All fields are atomics; relaxed ordering throughout
/// since snapshots are eventually consistent.
#[derive(Debug)]
struct FunctionStats {
    call_count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    latencies: LatencyHistogram,
    last_access_ms: AtomicU64,
}

impl FunctionStats {
    fn new() -> Self {
        Self {
            call_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            latencies: LatencyHistogram::new(),
            last_access_ms: AtomicU64::new(get_monotonic_timestamp()),
        }
    }

    fn record(&self, latency_us: u64, success: bool) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        self.latencies.record(latency_us);
        self.last_access_ms
            .store(get_monotonic_timestamp(), Ordering::Relaxed);
    }

    fn snapshot(&self) -> FunctionMetrics {
        let (avg_latency_us, p50_latency_us, p95_latency_us, p99_latency_us) =
            self.latencies.calculate_percentiles();

        FunctionMetrics {
            call_count: self.call_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            avg_latency_us,
            p50_latency_us,
            p95_latency_us,
            p99_latency_us,
        }
    }
}

/// Thread-safe store for invocation metrics.
///
/// Global counters are lock-free atomics. The per-function table sits behind
/// an `RwLock`; the write lock is only held to insert (and possibly evict),
/// never while recording. A poisoned table is recovered rather than
/// propagated; entries are independent counters.
#[derive(Debug)]
pub struct MetricsRegistry {
    total_invocations: AtomicU64,
    successful_invocations: AtomicU64,
    failed_invocations: AtomicU64,
    functions: StdRwLock<HashMap<String, Arc<FunctionStats>>>,
    start_time: Instant,
    config: MetricsConfig,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_config(MetricsConfig::default())
    }

    pub fn with_config(config: MetricsConfig) -> Self {
        Self {
            total_invocations: AtomicU64::new(0),
            successful_invocations: AtomicU64::new(0),
            failed_invocations: AtomicU64::new(0),
            functions: StdRwLock::new(HashMap::new()),
            start_time: Instant::now(),
            config,
        }
    }

    pub fn record_function_call(&self, function: &str, latency_us: u64, success: bool) {
        self.total_invocations.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_invocations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_invocations.fetch_add(1, Ordering::Relaxed);
        }

        let stats = self.stats_for(function);
        stats.record(latency_us, success);
    }

    fn stats_for(&self, function: &str) -> Arc<FunctionStats> {
        let existing = self
            .functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(function)
            .cloned();
        if let Some(stats) = existing {
            return stats;
        }

        let mut functions = self.functions.write().unwrap_or_else(PoisonError::into_inner);
        let stats = functions
            .entry(function.to_string())
            .or_insert_with(|| Arc::new(FunctionStats::new()))
            .clone();

        if functions.len() > self.config.max_functions {
            Self::evict_least_recent(&mut functions, self.config.max_functions, function);
        }
        stats
    }

    fn evict_least_recent(
        functions: &mut HashMap<String, Arc<FunctionStats>>,
        max_functions: usize,
        keep: &str,
    ) {
        let mut entries: Vec<_> = functions
            .iter()
            .filter(|(name, _)| name.as_str() != keep)
            .map(|(name, stats)| (name.clone(), stats.last_access_ms.load(Ordering::Relaxed)))
            .collect();
        entries.sort_by_key(|&(_, last_access)| last_access);

        let to_remove = functions.len().saturating_sub(max_functions);
        for (name, _) in entries.into_iter().take(to_remove) {
            functions.remove(&name);
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let functions = self
            .functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot()))
            .collect();

        MetricsSnapshot {
            total_invocations: self.total_invocations.load(Ordering::Relaxed),
            successful_invocations: self.successful_invocations.load(Ordering::Relaxed),
            failed_invocations: self.failed_invocations.load(Ordering::Relaxed),
            uptime_ms: self.uptime_ms(),
            functions,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
