//! Host-side value lattice
//!
//! The host/script contract is the JSON lattice: null, boolean, number, string,
//! ordered sequence and string-keyed mapping. `serde_json::Value` is the host
//! representation; [`Output`] is what an evaluation hands back, tagged by the
//! type of the script's final value.
//!
//! Numbers cross the boundary as `f64`. Integer vs. float is not preserved, so
//! use [`same_value`] rather than `==` when checking a round trip.

use serde::{Deserialize, Serialize};

use super::error::{EmbedError, Result};

pub type Value = serde_json::Value;

/// Named variables injected into an execution environment.
pub type Bindings = serde_json::Map<String, Value>;

/// Coerced result of an evaluation.
///
/// Scalars keep their script type. A top-level number may be non-finite
/// (`1/0` evaluates to `Infinity`), which is why numbers are kept as `f64`
/// here rather than folded into `Structured`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Output {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Structured(Value),
}

impl Output {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Output::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Output::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Output::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Output::Structured(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Output::Null)
    }

    /// Folds a boundary (JSON) value into the tagged form.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Output::Null,
            Value::Bool(b) => Output::Bool(b),
            Value::Number(n) => Output::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Output::String(s),
            structured => Output::Structured(structured),
        }
    }

    /// Renders the output as JSON for a transport.
    ///
    /// Integral numbers in the safe-integer range render as JSON integers
    /// (`10`, not `10.0`). Non-finite numbers have no JSON form; they render
    /// the way the script would print them (`"Infinity"`, `"-Infinity"`,
    /// `"NaN"`).
    pub fn to_json(&self) -> Value {
        match self {
            Output::Null => Value::Null,
            Output::Bool(b) => Value::Bool(*b),
            Output::Number(n) => number_to_json(*n),
            Output::String(s) => Value::String(s.clone()),
            Output::Structured(v) => v.clone(),
        }
    }
}

/// Largest integer a script number holds exactly.
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        // -0 has no integer form and reads back as 0
        Value::from(n as i64)
    } else if n.is_nan() {
        Value::String("NaN".into())
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        Value::String(text.into())
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Marshals any serializable host value onto the lattice.
///
/// Values with no lattice form (maps keyed by non-strings, for instance) fail
/// with [`EmbedError::Marshal`] instead of being stringified.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| EmbedError::Marshal(format!("host value outside the supported lattice: {}", e)))
}

/// Converts `params` into a binding map.
///
/// `null` is an empty mapping; any other non-mapping is an invalid request.
pub fn to_bindings(params: Value) -> Result<Bindings> {
    match params {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Bindings::new()),
        other => Err(EmbedError::InvalidRequest(format!(
            "expected a mapping of names to values, got {}",
            type_name(&other)
        ))),
    }
}

/// Representational equality over the lattice.
///
/// Numbers compare as `f64`, mapping key order is ignored.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| same_value(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, l)| y.get(k).is_some_and(|r| same_value(l, r)))
        }
        _ => false,
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
