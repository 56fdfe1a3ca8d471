use jsembed_common::{
    to_bindings, Bindings, EmbedError, ExecutionRequest, ExecutionResult, Output, Result, Value,
};
use jsembed_metrics::{
    BenchmarkReport, InvocationMetricsCollector, MetricsCollector, MetricsConfig, MetricsSnapshot,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::benchmark::run_benchmark;
use crate::engine::Engine;
use crate::invocation::{
    self, BusinessRule, Catalog, DataOperation, Invocation, BUSINESS_RULES_SCRIPT,
    DATA_PROCESSING_SCRIPT,
};
use crate::logic::{self, run_business_logic, BusinessLogic, LogicEntry};
use crate::resource_limits::ResourceLimits;
use crate::resources::{DirectoryResources, EmbeddedResources, ScriptResources};
use crate::store::{ScriptSource, ScriptStore, SourceView};

/// Configuration for a [`ScriptService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub limits: ResourceLimits,
    /// Scripts evaluated before caller code in [`ScriptService::execute_custom`].
    pub prelude: Vec<String>,
    pub metrics: MetricsConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            prelude: vec![
                BUSINESS_RULES_SCRIPT.to_string(),
                DATA_PROCESSING_SCRIPT.to_string(),
            ],
            metrics: MetricsConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_prelude<I, S>(mut self, scripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prelude = scripts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Script execution service: a store, an engine and invocation metrics.
///
/// Every call gets a fresh environment, so calls may run in parallel from any
/// number of threads. Cloning is cheap and clones share the store cache, the
/// live-environment gauge and the metrics.
///
/// # Example
///
/// ```
/// use jsembed_runtime::{BusinessRule, ScriptService};
/// use serde_json::json;
///
/// let service = ScriptService::embedded();
/// let output = service
///     .business_rule(
///         BusinessRule::CalculateAdvancedDiscount,
///         json!({"price": 100.0, "quantity": 15, "customerTier": "gold"}),
///     )
///     .unwrap();
///
/// let final_price = output.as_structured().unwrap()["finalPrice"].as_f64().unwrap();
/// assert!(final_price < 1500.0);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptService {
    store: Arc<ScriptStore>,
    engine: Engine,
    metrics: InvocationMetricsCollector,
    prelude: Arc<Vec<String>>,
}

impl ScriptService {
    /// Creates a service over `resources` with the default configuration.
    pub fn new(resources: impl ScriptResources + 'static) -> Self {
        Self::build(resources, ServiceConfig::default(), Engine::default())
    }

    /// Creates a service over `resources`.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the resource limits are invalid.
    pub fn with_config(resources: impl ScriptResources + 'static, config: ServiceConfig) -> Result<Self> {
        let engine = Engine::new(config.limits.clone())?;
        Ok(Self::build(resources, config, engine))
    }

    /// Service over the bundled scripts.
    pub fn embedded() -> Self {
        Self::new(EmbeddedResources)
    }

    /// Service over `<dir>/<name>.js`.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if `dir` is not a directory.
    pub fn from_directory(dir: impl Into<PathBuf>, config: ServiceConfig) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(EmbedError::InvalidRequest(format!(
                "Scripts directory does not exist: {}",
                dir.display()
            )));
        }
        Self::with_config(DirectoryResources::new(dir), config)
    }

    fn build(resources: impl ScriptResources + 'static, config: ServiceConfig, engine: Engine) -> Self {
        tracing::info!(
            "Script service ready ({:?}, timeout {}ms)",
            resources,
            engine.limits().timeout_ms()
        );
        Self {
            store: Arc::new(ScriptStore::new(resources)),
            engine,
            metrics: InvocationMetricsCollector::with_config(config.metrics),
            prelude: Arc::new(config.prelude),
        }
    }

    /// Loads a script through the store cache.
    pub fn load_script(&self, name: &str) -> Result<Option<ScriptSource>> {
        self.store.load(name)
    }

    /// Source text of a stored script, or of a built-in business-logic
    /// script when the store has none by that name.
    ///
    /// # Errors
    ///
    /// `ScriptNotFound` if neither exists.
    pub fn script_source(&self, name: &str) -> Result<SourceView> {
        if let Some(script) = self.store.load(name)? {
            return Ok(script.view());
        }
        let logic: BusinessLogic = name.parse()?;
        Ok(ScriptSource::new(logic.name(), logic.source()).view())
    }

    /// Evaluates `source` with `bindings` injected.
    pub fn execute(&self, source: &str, bindings: &Bindings) -> ExecutionResult {
        self.engine.execute(source, bindings)
    }

    pub fn run(&self, request: ExecutionRequest) -> ExecutionResult {
        self.engine.run(request)
    }

    /// Evaluates caller code on top of the prelude scripts.
    ///
    /// Each `context` entry is bound as a variable after the prelude has run.
    /// Prelude scripts missing from the store are skipped.
    pub fn execute_custom(&self, code: &str, context: &Bindings) -> ExecutionResult {
        let mut prelude = Vec::with_capacity(self.prelude.len());
        for name in self.prelude.iter() {
            match self.store.load(name)? {
                Some(script) => prelude.push(script),
                None => tracing::warn!("Prelude script '{}' not found; skipping", name),
            }
        }

        let code = code.to_string();
        let context = context.clone();
        self.engine.with_environment(move |env| {
            for script in &prelude {
                tracing::debug!("Evaluating prelude script '{}'", script.name());
                env.load(script.text())?;
            }
            env.bind_all(&context)?;
            env.eval(&code)
        })
    }

    /// Calls `function` from `script` with `params`.
    ///
    /// `params` must be a mapping (or `null`); anything else is
    /// `InvalidRequest`.
    pub fn invoke(&self, script: &str, function: &str, params: Value) -> ExecutionResult {
        self.invoke_request(&Invocation::new(script, function, to_bindings(params)?))
    }

    /// Like [`invoke`](Self::invoke), passing `options` as the second argument
    /// under the data-processing convention.
    pub fn invoke_with_options(
        &self,
        script: &str,
        function: &str,
        params: Value,
        options: Bindings,
    ) -> ExecutionResult {
        self.invoke_request(&Invocation::new(script, function, to_bindings(params)?).with_options(options))
    }

    /// Runs an invocation and records it under `script.function`.
    pub fn invoke_request(&self, request: &Invocation) -> ExecutionResult {
        let start_time = Instant::now();
        let result = invocation::invoke(&self.store, &self.engine, request);

        self.metrics
            .record_call(&request.qualified_name(), start_time, result.is_ok());
        if let Err(e) = &result {
            tracing::debug!("{} failed: {}", request.qualified_name(), e);
        }
        result
    }

    pub fn business_rule(&self, rule: BusinessRule, params: Value) -> ExecutionResult {
        self.invoke_request(&Invocation::business_rule(rule, to_bindings(params)?))
    }

    pub fn process_data(
        &self,
        op: DataOperation,
        input: Value,
        options: Option<Bindings>,
    ) -> ExecutionResult {
        let mut request = Invocation::data_operation(op, to_bindings(input)?);
        request.options = options;
        self.invoke_request(&request)
    }

    pub fn parse_csv(&self, csv_text: &str, options: Option<Bindings>) -> ExecutionResult {
        self.process_data(DataOperation::ParseCsv, json!({ "csvText": csv_text }), options)
    }

    pub fn query_json(&self, data: Value, path: &str) -> ExecutionResult {
        self.process_data(DataOperation::QueryJson, json!({ "data": data, "path": path }), None)
    }

    pub fn clean_data(&self, data: Value, rules: Value) -> ExecutionResult {
        self.process_data(DataOperation::CleanData, json!({ "data": data, "rules": rules }), None)
    }

    pub fn calculate_advanced_discount(&self, order: Value) -> ExecutionResult {
        self.business_rule(BusinessRule::CalculateAdvancedDiscount, order)
    }

    pub fn validate_complex_form(&self, form: Value) -> ExecutionResult {
        self.business_rule(BusinessRule::ValidateComplexForm, form)
    }

    pub fn analyze_data(&self, dataset: &[f64]) -> ExecutionResult {
        self.business_rule(BusinessRule::AnalyzeData, json!({ "dataset": dataset }))
    }

    /// Runs the built-in business-logic script `name` over `input` and
    /// returns the members of its `result` object.
    ///
    /// Recorded under `logic.<name>`.
    ///
    /// # Errors
    ///
    /// `ScriptNotFound` for an unknown name, `InvalidRequest` if `input` is
    /// not a mapping.
    pub fn business_logic(&self, name: &str, input: Value) -> ExecutionResult {
        let logic: BusinessLogic = name.parse()?;
        let input = to_bindings(input)?;

        let start_time = Instant::now();
        let result = run_business_logic(&self.engine, logic, input)
            .map(|members| Output::Structured(Value::Object(members)));
        self.metrics
            .record_call(&format!("logic.{}", logic), start_time, result.is_ok());
        result
    }

    pub fn business_logic_listing(&self) -> Vec<LogicEntry> {
        logic::listing()
    }

    /// Invokes `script.function` `iterations` times in sequence.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if `params` is not a mapping.
    pub fn benchmark(
        &self,
        script: &str,
        function: &str,
        params: Value,
        iterations: u64,
    ) -> Result<BenchmarkReport> {
        let request = Invocation::new(script, function, to_bindings(params)?);
        tracing::info!(
            "Benchmarking {} for {} iterations",
            request.qualified_name(),
            iterations
        );
        Ok(run_benchmark(iterations, || self.invoke_request(&request)))
    }

    pub fn catalog(&self) -> Catalog {
        invocation::catalog()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Environments currently alive across all clones of this service.
    pub fn live_environments(&self) -> usize {
        self.engine.live_environments()
    }

    pub fn limits(&self) -> &ResourceLimits {
        self.engine.limits()
    }

    pub fn store(&self) -> &ScriptStore {
        &self.store
    }

    /// Runs an invocation on tokio's blocking pool.
    pub async fn invoke_async(&self, request: Invocation) -> ExecutionResult {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.invoke_request(&request))
            .await
            .map_err(|e| EmbedError::Worker(format!("Invocation task failed: {}", e)))?
    }

    /// Evaluates `source` on tokio's blocking pool.
    pub async fn execute_async(&self, source: String, bindings: Bindings) -> ExecutionResult {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.execute(&source, &bindings))
            .await
            .map_err(|e| EmbedError::Worker(format!("Execution task failed: {}", e)))?
    }
}
