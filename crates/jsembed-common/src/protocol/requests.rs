//! Execution request types
//!
//! An [`ExecutionRequest`] is everything the engine needs for one evaluation:
//! the source text, the bindings to inject, and optionally a function to call
//! once the source has been evaluated.
//!
//! # Example
//!
//! ```
//! use jsembed_common::protocol::requests::{ExecutionRequest, FunctionCall};
//! use serde_json::json;
//!
//! let request = ExecutionRequest::new("function double(x) { return x * 2; }")
//!     .with_binding("factor", json!(2))
//!     .with_call(FunctionCall::new("double").with_arg(json!(21)));
//! assert_eq!(request.call.unwrap().name, "double");
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use super::error::{EmbedError, Result};
use super::value::{Bindings, Value};

pub type RequestId = u64;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directive to call a global function after the source has been evaluated.
///
/// Arguments are positional. Keyword arguments travel as one trailing mapping
/// (see [`FunctionCall::with_keyword_args`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionCall {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: Value) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_keyword_args(mut self, kwargs: Bindings) -> Self {
        self.args.push(Value::Object(kwargs));
        self
    }

    /// Function names are looked up, never spliced into source, but they are
    /// still restricted to plain identifiers.
    pub fn validate(&self) -> Result<()> {
        if is_identifier(&self.name) {
            Ok(())
        } else {
            Err(EmbedError::InvalidRequest(format!(
                "'{}' is not a valid function name",
                self.name
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRequest {
    pub id: RequestId,
    pub source: String,
    pub bindings: Bindings,
    pub call: Option<FunctionCall>,
}

impl ExecutionRequest {
    pub fn new(source: impl Into<String>) -> Self {
        ExecutionRequest {
            id: generate_request_id(),
            source: source.into(),
            bindings: Bindings::new(),
            call: None,
        }
    }

    pub fn with_binding(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings.extend(bindings);
        self
    }

    pub fn with_call(mut self, call: FunctionCall) -> Self {
        self.call = Some(call);
        self
    }
}

/// ASCII identifier check: `[A-Za-z_$][A-Za-z0-9_$]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn generate_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

    // upper 32 bits from the clock, lower 32 from the counter
    (timestamp & 0xFFFFFFFF00000000) | (counter & 0xFFFFFFFF)
}
