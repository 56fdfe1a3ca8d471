use jsembed_common::{is_identifier, Bindings, EmbedError, Output, Result, Value};
use rquickjs::{function::Rest, Context, Ctx, Runtime, Value as JsValue};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::resource_limits::ResourceLimits;
use crate::runtime::{
    bindings::{self, HOST_UTILS},
    conversions::{js_value_to_json, js_value_to_output, json_to_js_value, thrown_message},
};

/// Isolated, single-use script environment.
///
/// Each environment owns its own QuickJS runtime and context with the
/// capability bridge installed, the heap and stack limits applied and an
/// interrupt hook armed for the deadline. Nothing is shared between
/// environments. A runtime is `!Send`, so an environment lives and dies on the
/// thread that created it.
///
/// The API speaks host values only; script values never outlive a call.
///
/// # Example
///
/// ```ignore
/// let env = Environment::new(&ResourceLimits::default(), &gauge)?;
/// env.bind("price", &json!(2.5))?;
/// assert_eq!(env.eval("price * 4")?, Output::Number(10.0));
/// ```
pub struct Environment {
    context: Context,
    _runtime: Runtime,
    interrupted: Arc<AtomicBool>,
    timeout_ms: u64,
    _live: LiveGuard,
}

/// Counts an environment in the engine's live gauge for as long as it exists.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(gauge: &Arc<AtomicUsize>) -> Self {
        gauge.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(gauge))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Environment {
    /// Creates an environment with the bridge installed and limits applied.
    ///
    /// The deadline starts now. `gauge` is incremented now and decremented
    /// when the environment drops.
    pub fn new(limits: &ResourceLimits, gauge: &Arc<AtomicUsize>) -> Result<Self> {
        let live = LiveGuard::new(gauge);
        let runtime = Runtime::new()
            .map_err(|e| EmbedError::Worker(format!("Failed to create script runtime: {}", e)))?;
        runtime.set_memory_limit(limits.memory_limit);
        runtime.set_max_stack_size(limits.max_stack_size);

        let interrupted = Arc::new(AtomicBool::new(false));
        let deadline = Instant::now() + limits.execution_timeout;
        let flag = Arc::clone(&interrupted);
        runtime.set_interrupt_handler(Some(Box::new(move || {
            if Instant::now() >= deadline {
                flag.store(true, Ordering::SeqCst);
                return true;
            }
            false
        })));

        let context = Context::full(&runtime)
            .map_err(|e| EmbedError::Worker(format!("Failed to create script context: {}", e)))?;
        context.with(|ctx| {
            bindings::install_host_utils(&ctx).map_err(|e| {
                EmbedError::Worker(format!("Failed to install {}: {}", HOST_UTILS, thrown_message(&ctx, e)))
            })
        })?;

        tracing::debug!("Created execution environment");
        Ok(Self {
            context,
            _runtime: runtime,
            interrupted,
            timeout_ms: limits.timeout_ms(),
            _live: live,
        })
    }

    /// Whether the deadline fired and aborted script code.
    pub fn timed_out(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Binds a host value as a global variable.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if `name` is not a plain identifier or is the reserved
    /// bridge name.
    pub fn bind(&self, name: &str, value: &Value) -> Result<()> {
        check_binding_name(name)?;
        tracing::debug!("Binding '{}'", name);

        self.scoped(|ctx| {
            let js_value = json_to_js_value(ctx, value)?;
            ctx.globals().set(name, js_value).map_err(|e| {
                EmbedError::InvalidRequest(format!("Cannot bind '{}': {}", name, thrown_message(ctx, e)))
            })
        })
    }

    /// Binds every entry of `bindings`, in map order.
    pub fn bind_all(&self, bindings: &Bindings) -> Result<()> {
        for (name, value) in bindings {
            self.bind(name, value)?;
        }
        Ok(())
    }

    /// Evaluates `source` and coerces its completion value.
    pub fn eval(&self, source: &str) -> Result<Output> {
        self.scoped(|ctx| {
            let value = eval_js(ctx, source)?;
            js_value_to_output(ctx, &value)
        })
    }

    /// Evaluates `source` and converts its completion value to the lattice.
    pub fn eval_value(&self, source: &str) -> Result<Value> {
        self.scoped(|ctx| {
            let value = eval_js(ctx, source)?;
            js_value_to_json(ctx, &value)
        })
    }

    /// Evaluates `source` for its side effects, discarding the completion.
    pub fn load(&self, source: &str) -> Result<()> {
        self.scoped(|ctx| eval_js(ctx, source).map(drop))
    }

    /// Evaluates a library script and returns the names of the global
    /// functions it declared.
    ///
    /// Only globals that did not exist before the script ran count, so
    /// intrinsics such as `eval` or `Function` are never part of the result.
    pub fn load_library(&self, source: &str) -> Result<BTreeSet<String>> {
        self.scoped(|ctx| {
            let globals = ctx.globals();
            let before = own_keys(ctx, &globals)?;
            eval_js(ctx, source)?;

            let mut declared = BTreeSet::new();
            for name in own_keys(ctx, &globals)?.difference(&before) {
                let value: JsValue = globals.get(name.as_str()).map_err(|e| script_error(ctx, e))?;
                if value.is_function() {
                    declared.insert(name.clone());
                }
            }
            Ok(declared)
        })
    }

    /// Calls the global function `name` with `args`.
    ///
    /// The name is looked up as a property of the global object, never
    /// evaluated. A missing or non-callable name is an evaluation error.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Output> {
        self.scoped(|ctx| {
            let candidate: JsValue = ctx.globals().get(name).map_err(|e| script_error(ctx, e))?;
            let function = match candidate.as_function() {
                Some(function) => function.clone(),
                None if candidate.is_undefined() => {
                    return Err(EmbedError::Evaluation(format!(
                        "ReferenceError: {} is not defined",
                        name
                    )))
                }
                None => {
                    return Err(EmbedError::Evaluation(format!(
                        "TypeError: {} is not a function",
                        name
                    )))
                }
            };

            let args = args
                .iter()
                .map(|arg| json_to_js_value(ctx, arg))
                .collect::<Result<Vec<_>>>()?;

            tracing::debug!("Calling '{}' with {} argument(s)", name, args.len());
            let value: JsValue = function.call((Rest(args),)).map_err(|e| script_error(ctx, e))?;
            js_value_to_output(ctx, &value)
        })
    }

    /// Reads a global variable as a lattice value; unset reads as `null`.
    pub fn global(&self, name: &str) -> Result<Value> {
        self.scoped(|ctx| {
            let value: JsValue = ctx.globals().get(name).map_err(|e| script_error(ctx, e))?;
            js_value_to_json(ctx, &value)
        })
    }

    /// Runs `f` against the raw script context.
    pub(crate) fn with_ctx<R>(&self, f: impl for<'js> FnOnce(Ctx<'js>) -> R) -> R {
        self.context.with(f)
    }

    /// Runs `f` in the context; once the deadline has fired every failure is
    /// reported as the timeout it really is.
    fn scoped<T>(&self, f: impl for<'js> FnOnce(&Ctx<'js>) -> Result<T>) -> Result<T> {
        self.context.with(|ctx| f(&ctx)).map_err(|e| {
            if self.timed_out() {
                tracing::warn!("Execution aborted at the {}ms deadline", self.timeout_ms);
                EmbedError::Timeout(self.timeout_ms)
            } else {
                e
            }
        })
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        tracing::debug!("Releasing execution environment");
    }
}

fn eval_js<'js>(ctx: &Ctx<'js>, source: &str) -> Result<JsValue<'js>> {
    ctx.eval::<JsValue, _>(source).map_err(|e| script_error(ctx, e))
}

fn own_keys<'js>(ctx: &Ctx<'js>, object: &rquickjs::Object<'js>) -> Result<BTreeSet<String>> {
    object
        .keys::<String>()
        .collect::<rquickjs::Result<BTreeSet<String>>>()
        .map_err(|e| script_error(ctx, e))
}

fn check_binding_name(name: &str) -> Result<()> {
    if name == HOST_UTILS {
        return Err(EmbedError::InvalidRequest(format!(
            "'{}' is reserved for host capabilities",
            HOST_UTILS
        )));
    }
    if !is_identifier(name) {
        return Err(EmbedError::InvalidRequest(format!(
            "'{}' is not a valid binding name",
            name
        )));
    }
    Ok(())
}

/// Messages the engine throws when the heap or stack limit is hit.
const EXHAUSTION_MESSAGES: [&str; 3] = [
    "out of memory",
    "stack overflow",
    "Maximum call stack size exceeded",
];

/// Maps an engine error to an [`EmbedError`].
///
/// Heap and stack exhaustion become `BudgetExhausted`; everything else is an
/// evaluation error carrying the script's message.
pub(crate) fn script_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> EmbedError {
    let message = thrown_message(ctx, err);
    if EXHAUSTION_MESSAGES.iter().any(|m| message.contains(m)) {
        tracing::warn!("Execution budget exhausted: {}", message);
        return EmbedError::BudgetExhausted(message);
    }
    EmbedError::Evaluation(message)
}
