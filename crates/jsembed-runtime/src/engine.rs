//! Execution engine
//!
//! Runs each evaluation in its own [`Environment`] on a dedicated thread and
//! waits for the result.
//!
//! # Lifecycle of one call
//!
//! 1. Refuse the call if too many abandoned evaluations are outstanding.
//! 2. Spawn an evaluation thread.
//! 3. On that thread: create the environment (bridge installed, limits
//!    applied, deadline armed), run the task, drop the environment, send the
//!    result.
//! 4. The caller waits on the result channel.
//!
//! The deadline is enforced inside the engine: the runtime's interrupt hook
//! aborts script code, native built-ins included, once `execution_timeout` has
//! passed, and the thread reports [`EmbedError::Timeout`]. Only a task that
//! blocks outside script code can outlive the deadline; after `abort_grace`
//! the caller gets `Timeout` anyway and the thread is counted as detached
//! until it finishes. With `max_detached` of them outstanding, new calls fail
//! with [`EmbedError::Overloaded`].

use jsembed_common::{
    Bindings, EmbedError, ExecutionRequest, ExecutionResult, FunctionCall, Result,
};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use crate::resource_limits::ResourceLimits;
use crate::runtime::Environment;

const EVAL_THREAD_NAME: &str = "jsembed-eval";
const EVAL_THREAD_STACK_SIZE: usize = 8 * 1024 * 1024;

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// Creates, runs and tears down execution environments.
///
/// Cloning is cheap; clones share the live-environment and detached gauges.
///
/// # Example
///
/// ```
/// use jsembed_runtime::{Engine, ResourceLimits};
/// use jsembed_common::{Bindings, Output};
/// use serde_json::json;
///
/// let engine = Engine::new(ResourceLimits::default()).unwrap();
/// let mut bindings = Bindings::new();
/// bindings.insert("price".into(), json!(2.5));
///
/// let output = engine.execute("price * 4", &bindings).unwrap();
/// assert_eq!(output, Output::Number(10.0));
/// assert_eq!(engine.live_environments(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    limits: ResourceLimits,
    live: Arc<AtomicUsize>,
    detached: Arc<AtomicUsize>,
}

impl Engine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if `limits` fail [`ResourceLimits::validate`].
    pub fn new(limits: ResourceLimits) -> Result<Self> {
        limits
            .validate()
            .map_err(|e| EmbedError::InvalidRequest(format!("Invalid resource limits: {}", e)))?;
        Ok(Self {
            limits,
            live: Arc::new(AtomicUsize::new(0)),
            detached: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Number of environments that currently exist.
    ///
    /// Zero whenever no call is in flight, except while a detached
    /// evaluation is still winding down.
    pub fn live_environments(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Evaluations abandoned past their deadline that have not finished yet.
    pub fn detached_evaluations(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }

    /// Evaluates `source` with `bindings` injected and coerces the final value.
    pub fn execute(&self, source: &str, bindings: &Bindings) -> ExecutionResult {
        self.run(ExecutionRequest::new(source).with_bindings(bindings.clone()))
    }

    /// Runs a full request: bind, evaluate, optionally call a function.
    pub fn run(&self, request: ExecutionRequest) -> ExecutionResult {
        if let Some(call) = &request.call {
            call.validate()?;
        }

        tracing::debug!("Executing request {}", request.id);
        let ExecutionRequest {
            source,
            bindings,
            call,
            ..
        } = request;

        self.with_environment(move |env| {
            env.bind_all(&bindings)?;
            match call {
                Some(FunctionCall { name, args }) => {
                    env.load(&source)?;
                    env.call(&name, &args)
                }
                None => env.eval(&source),
            }
        })
    }

    /// Runs `task` inside a fresh environment on an evaluation thread.
    ///
    /// The environment is dropped on the evaluation thread before the result
    /// is handed back, whatever the outcome.
    pub fn with_environment<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Environment) -> Result<T> + Send + 'static,
    {
        let detached = self.detached_evaluations();
        if detached >= self.limits.max_detached {
            tracing::warn!("Refusing evaluation: {} detached evaluations outstanding", detached);
            return Err(EmbedError::Overloaded(detached));
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let limits = self.limits.clone();
        let live = Arc::clone(&self.live);
        let state = Arc::new(AtomicU8::new(RUNNING));
        let completion = Completion {
            state: Arc::clone(&state),
            detached: Arc::clone(&self.detached),
        };

        let handle = thread::Builder::new()
            .name(EVAL_THREAD_NAME.to_string())
            .stack_size(EVAL_THREAD_STACK_SIZE)
            .spawn(move || {
                let result = Environment::new(&limits, &live).and_then(|env| task(&env));
                drop(completion);
                // the caller may have given up and hung up
                let _ = tx.send(result);
            })
            .map_err(|e| EmbedError::Worker(format!("Failed to spawn evaluation thread: {}", e)))?;

        match rx.recv_timeout(self.limits.execution_timeout + self.limits.abort_grace) {
            Ok(result) => {
                if handle.join().is_err() {
                    tracing::warn!("Evaluation thread panicked after sending its result");
                }
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                self.detached.fetch_add(1, Ordering::SeqCst);
                if state
                    .compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    // finished between the timeout and now
                    self.detached.fetch_sub(1, Ordering::SeqCst);
                    return rx.recv().unwrap_or_else(|_| {
                        Err(EmbedError::Worker("evaluation thread exited without a result".into()))
                    });
                }
                tracing::warn!(
                    "Evaluation ignored the {}ms deadline; detaching its thread",
                    self.limits.timeout_ms()
                );
                Err(EmbedError::Timeout(self.limits.timeout_ms()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let reason = match handle.join() {
                    Err(panic) => panic_message(panic.as_ref()),
                    Ok(()) => "evaluation thread exited without a result".to_string(),
                };
                Err(EmbedError::Worker(reason))
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            live: Arc::new(AtomicUsize::new(0)),
            detached: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Marks an evaluation finished when the thread is done with it, on success,
/// error or panic. If the caller already abandoned it, it leaves the detached
/// count.
struct Completion {
    state: Arc<AtomicU8>,
    detached: Arc<AtomicUsize>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        let abandoned = self
            .state
            .compare_exchange(RUNNING, FINISHED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err();
        if abandoned {
            self.detached.fetch_sub(1, Ordering::SeqCst);
            tracing::info!("Detached evaluation finished");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("evaluation thread panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("evaluation thread panicked: {}", message)
    } else {
        "evaluation thread panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsembed_common::{ErrorKind, Output};
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn bindings(value: serde_json::Value) -> Bindings {
        jsembed_common::to_bindings(value).unwrap()
    }

    fn engine_with_timeout(millis: u64) -> Engine {
        Engine::new(ResourceLimits::new().with_execution_timeout(Duration::from_millis(millis))).unwrap()
    }

    #[test]
    fn test_new_validates_limits() {
        let err = Engine::new(ResourceLimits::new().with_execution_timeout(Duration::ZERO)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let err = Engine::new(ResourceLimits::new().with_max_detached(0)).unwrap_err();
        assert!(err.to_string().contains("detached"), "{err}");

        assert_eq!(Engine::default().limits(), &ResourceLimits::default());
    }

    #[test]
    fn test_execute_with_bindings() {
        let engine = Engine::default();
        let output = engine
            .execute("price * quantity", &bindings(json!({"price": 2.5, "quantity": 4})))
            .unwrap();
        assert_eq!(output, Output::Number(10.0));
    }

    #[test]
    fn test_execute_division_by_zero() {
        let engine = Engine::default();
        let output = engine.execute("1/0", &Bindings::new()).unwrap();
        assert_eq!(output, Output::Number(f64::INFINITY));
    }

    #[test]
    fn test_run_with_function_call() {
        let engine = Engine::default();
        let request = ExecutionRequest::new("function scale(x, by) { return { value: x * by.factor }; }")
            .with_call(
                FunctionCall::new("scale")
                    .with_arg(json!(21))
                    .with_keyword_args(bindings(json!({"factor": 2}))),
            );
        let output = engine.run(request).unwrap();
        assert_eq!(output, Output::Structured(json!({"value": 42})));
    }

    #[test]
    fn test_run_call_ignores_completion_value() {
        let engine = Engine::default();
        let request = ExecutionRequest::new("function one() { return 1; } (function () {})")
            .with_call(FunctionCall::new("one"));
        assert_eq!(engine.run(request).unwrap(), Output::Number(1.0));
    }

    #[test]
    fn test_run_rejects_bad_function_name() {
        let engine = Engine::default();
        let request = ExecutionRequest::new("1").with_call(FunctionCall::new("alert(1)"));
        let err = engine.run(request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(engine.live_environments(), 0);
    }

    #[test]
    fn test_failures_leave_no_environment() {
        let engine = Engine::default();
        let failing = [
            "throw new Error('boom')",
            "this is not javascript ))",
            "undefinedVariable",
            "(function() {})",
        ];
        for _ in 0..5 {
            for source in failing {
                assert!(engine.execute(source, &Bindings::new()).is_err(), "{source}");
            }
        }
        assert_eq!(engine.live_environments(), 0);
    }

    #[test]
    fn test_reserved_binding_is_invalid_request() {
        let engine = Engine::default();
        let err = engine
            .execute("hostUtils", &bindings(json!({"hostUtils": 1})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_deadline_aborts_loop() {
        let engine = engine_with_timeout(200);

        let start = Instant::now();
        let err = engine.execute("while (true) {}", &Bindings::new()).unwrap_err();
        assert!(matches!(err, EmbedError::Timeout(200)), "{err:?}");
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(engine.live_environments(), 0);
        assert_eq!(engine.detached_evaluations(), 0);
    }

    #[test]
    fn test_deadline_is_not_catchable() {
        let engine = engine_with_timeout(100);
        let err = engine
            .execute("try { for (;;) {} } catch (e) { 'swallowed' }", &Bindings::new())
            .unwrap_err();
        assert!(matches!(err, EmbedError::Timeout(100)), "{err:?}");
    }

    #[test]
    fn test_deadline_aborts_catastrophic_regex() {
        let engine = engine_with_timeout(200);

        let start = Instant::now();
        let err = engine
            .execute("/(a+)+$/.test('a'.repeat(34) + '!')", &Bindings::new())
            .unwrap_err();
        assert!(matches!(err, EmbedError::Timeout(200)), "{err:?}");
        assert!(start.elapsed() < Duration::from_secs(5));

        // the abort landed inside the engine: nothing is left running
        assert_eq!(engine.live_environments(), 0);
        assert_eq!(engine.detached_evaluations(), 0);
    }

    #[test]
    fn test_detached_evaluations_are_capped() {
        let limits = ResourceLimits::new()
            .with_execution_timeout(Duration::from_millis(50))
            .with_abort_grace(Duration::from_millis(50))
            .with_max_detached(1);
        let engine = Engine::new(limits).unwrap();

        // blocks outside script code, so the interrupt cannot reach it
        let err = engine
            .with_environment(|_env| {
                thread::sleep(Duration::from_millis(800));
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, EmbedError::Timeout(50)), "{err:?}");
        assert_eq!(engine.detached_evaluations(), 1);

        let refused = engine.execute("1 + 1", &Bindings::new()).unwrap_err();
        assert!(matches!(refused, EmbedError::Overloaded(1)), "{refused:?}");
        assert_eq!(refused.kind(), ErrorKind::Unavailable);

        let deadline = Instant::now() + Duration::from_secs(10);
        while engine.detached_evaluations() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(engine.detached_evaluations(), 0);
        assert_eq!(engine.live_environments(), 0);
        assert_eq!(engine.execute("1 + 1", &Bindings::new()).unwrap(), Output::Number(2.0));
    }

    #[test]
    fn test_with_environment_generic_result() {
        let engine = Engine::default();
        let names = engine
            .with_environment(|env| env.eval_value("Object.keys(hostUtils)"))
            .unwrap();
        assert_eq!(
            names,
            json!(["formatCurrency", "getCurrentTimestamp", "generateUUID", "calculateTax"])
        );
    }

    #[test]
    fn test_panicking_task_is_worker_error() {
        let engine = Engine::default();
        let err = engine
            .with_environment(|_env| -> Result<()> { panic!("task exploded") })
            .unwrap_err();
        assert!(matches!(err, EmbedError::Worker(ref m) if m.contains("task exploded")), "{err:?}");
        assert_eq!(engine.live_environments(), 0);
        assert_eq!(engine.detached_evaluations(), 0);
    }

    #[test]
    fn test_parallel_executions_are_independent() {
        let engine = Engine::default();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                thread::spawn(move || {
                    engine
                        .execute("var shared = (typeof shared === 'undefined' ? 0 : shared) + n; shared", &bindings(json!({"n": i})))
                        .unwrap()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), Output::Number(i as f64));
        }
        assert_eq!(engine.live_environments(), 0);
    }
}
