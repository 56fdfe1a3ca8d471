// Copyright 2025 jsembed Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::registry::{MetricsConfig, MetricsRegistry};
use crate::snapshot::MetricsSnapshot;
use std::sync::Arc;
use std::time::Instant;

/// Interface the runtime reports invocations through.
///
/// # Example
///
/// ```rust
/// use jsembed_metrics::{InvocationMetricsCollector, MetricsCollector};
/// use std::time::Instant;
///
/// let collector = InvocationMetricsCollector::new();
///
/// let start = Instant::now();
/// // ... invoke business-rules.analyzeData ...
/// collector.record_call("business-rules.analyzeData", start, true);
///
/// assert_eq!(collector.snapshot().total_invocations, 1);
/// ```
pub trait MetricsCollector: Send + Sync {
    /// Records one finished invocation.
    ///
    /// # Arguments
    /// * `function` - Qualified name, `script.function` for invocations
    /// * `start_time` - When the call began; latency is measured from here
    /// * `success` - Whether the call produced a value
    fn record_call(&self, function: &str, start_time: Instant, success: bool);

    /// Current state of all counters.
    fn snapshot(&self) -> MetricsSnapshot;
}

/// Default collector backed by a [`MetricsRegistry`].
///
/// Cloning shares the registry, so every clone of a service reports into the
/// same counters.
#[derive(Debug, Clone)]
pub struct InvocationMetricsCollector {
    registry: Arc<MetricsRegistry>,
}

impl InvocationMetricsCollector {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_config(config: MetricsConfig) -> Self {
        Self {
            registry: Arc::new(MetricsRegistry::with_config(config)),
        }
    }

    pub fn with_registry(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }
}

impl Default for InvocationMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector for InvocationMetricsCollector {
    fn record_call(&self, function: &str, start_time: Instant, success: bool) {
        let latency_us = start_time.elapsed().as_micros() as u64;
        self.registry.record_function_call(function, latency_us, success);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        self.registry.snapshot()
    }
}
