//! jsembed Metrics Collection
//!
//! Thread-safe invocation metrics and benchmark accounting for the embedded
//! script runtime.
//!
//! # Architecture
//!
//! - [`MetricsRegistry`]: storage with lock-free counters and per-function histograms
//! - [`MetricsCollector`]: the trait the runtime reports through
//! - [`MetricsSnapshot`]: serializable view of the registry
//! - [`BenchmarkRecorder`] / [`BenchmarkReport`]: timing summary of a benchmark run
//!
//! # Usage Example
//!
//! ```rust
//! use jsembed_metrics::{InvocationMetricsCollector, MetricsCollector};
//! use std::time::Instant;
//!
//! let collector = InvocationMetricsCollector::new();
//!
//! let start = Instant::now();
//! // ... invoke a script function ...
//! collector.record_call("data-processing.parseCSV", start, true);
//!
//! let snapshot = collector.snapshot();
//! println!("Total invocations: {}", snapshot.total_invocations);
//! ```
//!
//! # Thread Safety
//!
//! Collectors are `Send + Sync` and cheap to clone. Counter increments are
//! atomic; the per-function table is guarded by an `RwLock` that is only
//! written when a new function name shows up.

mod benchmark;
mod collector;
mod registry;
mod snapshot;

pub use benchmark::{BenchmarkRecorder, BenchmarkReport};
pub use collector::{InvocationMetricsCollector, MetricsCollector};
pub use registry::{MetricsConfig, MetricsRegistry};
pub use snapshot::{FunctionMetrics, MetricsSnapshot};
