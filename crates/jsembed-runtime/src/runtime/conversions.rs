//! JSON <-> JavaScript Value Conversions
//!
//! The boundary representation is JSON text. Host values go in through the
//! engine's `JSON.parse`; script values come out through its `JSON.stringify`,
//! so what the host sees is exactly what the script would serialize:
//! non-enumerable and symbol-keyed properties are skipped, boxed primitives
//! unwrap, `toJSON` is honored and `undefined` members are dropped (or become
//! `null` inside arrays).
//!
//! # Type Mapping
//!
//! | JSON Type | JavaScript Type |
//! |-----------|-----------------|
//! | null | null |
//! | boolean | Boolean |
//! | number | Number |
//! | string | String |
//! | array | Array |
//! | object | Object |
//!
//! # Script-side values with no JSON form
//!
//! Where `JSON.stringify` would silently drop or rewrite a value, the
//! marshaller fails with [`EmbedError::Marshal`] instead:
//!
//! - functions and symbols, at any depth
//! - BigInts and cyclic structures
//! - non-finite numbers when nested; a top-level non-finite number is kept by
//!   [`js_value_to_output`]
//! - nesting deeper than [`MAX_DEPTH`], in either direction

use jsembed_common::{EmbedError, Output, Result, Value, MAX_SAFE_INTEGER};
use rquickjs::{convert::Coerced, Ctx, Function, Type, Value as JsValue};

/// Deepest container nesting accepted in either direction. A scalar has
/// depth 0, `[1]` depth 1.
pub const MAX_DEPTH: usize = 100;

/// Throws on the values `JSON.stringify` would otherwise drop or rewrite.
const STRICT_REPLACER: &str = r#"(function (key, value) {
    var kind = typeof value;
    if (kind === 'function' || kind === 'symbol') {
        throw new TypeError(kind + ' at "' + key + '" cannot cross the host boundary');
    }
    if (kind === 'number' && (value !== value || value === 1 / 0 || value === -1 / 0)) {
        throw new TypeError(value + ' at "' + key + '" has no JSON representation');
    }
    return value;
})"#;

/// Convert a host value to a script value.
pub fn json_to_js_value<'js>(ctx: &Ctx<'js>, value: &Value) -> Result<JsValue<'js>> {
    check_depth(value)?;
    let text = serde_json::to_string(value)?;
    ctx.json_parse(text)
        .map_err(|e| EmbedError::Marshal(format!("engine rejected host value: {}", thrown_message(ctx, e))))
}

/// Convert a script value to the host lattice.
///
/// `undefined` at the top level becomes `null`.
pub fn js_value_to_json<'js>(ctx: &Ctx<'js>, value: &JsValue<'js>) -> Result<Value> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return number_to_json(n);
    }
    if value.is_string() {
        return Ok(Value::String(std_string(value)?));
    }
    if value.is_function() {
        return Err(EmbedError::Marshal("functions cannot cross the host boundary".into()));
    }
    match value.type_of() {
        Type::Symbol => Err(EmbedError::Marshal("symbols cannot cross the host boundary".into())),
        Type::BigInt => Err(EmbedError::Marshal("BigInt values cannot cross the host boundary".into())),
        _ => stringify(ctx, value),
    }
}

/// Coerce the final value of an evaluation into an [`Output`].
///
/// Scalars keep their script type and a top-level number may be non-finite.
/// Everything else goes through [`js_value_to_json`] and is folded, so a
/// boxed primitive or a `Date` comes back as the scalar it serializes to.
pub fn js_value_to_output<'js>(ctx: &Ctx<'js>, value: &JsValue<'js>) -> Result<Output> {
    if value.is_undefined() || value.is_null() {
        return Ok(Output::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(Output::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return Ok(Output::Number(n));
    }
    if value.is_string() {
        return Ok(Output::String(std_string(value)?));
    }
    js_value_to_json(ctx, value).map(Output::from_value)
}

fn stringify<'js>(ctx: &Ctx<'js>, value: &JsValue<'js>) -> Result<Value> {
    let replacer: Function = ctx
        .eval(STRICT_REPLACER)
        .map_err(|e| EmbedError::Worker(format!("failed to compile replacer: {}", e)))?;

    let text = match ctx.json_stringify_replacer(value.clone(), replacer) {
        Ok(Some(text)) => text
            .to_string()
            .map_err(|e| EmbedError::Marshal(format!("string is not valid UTF-8: {}", e)))?,
        Ok(None) => return Ok(Value::Null),
        Err(e) => return Err(EmbedError::Marshal(thrown_message(ctx, e))),
    };

    // serde_json stops at 128 levels on its own; MAX_DEPTH is the tighter bound
    let parsed: Value = serde_json::from_str(&text)
        .map_err(|e| EmbedError::Marshal(format!("value nested too deeply or malformed: {}", e)))?;
    check_depth(&parsed)?;
    Ok(parsed)
}

/// Integral values inside the safe-integer range come back as JSON integers so
/// `30` reads back as `30` rather than `30.0`.
fn number_to_json(n: f64) -> Result<Value> {
    if !n.is_finite() {
        return Err(EmbedError::Marshal(format!(
            "non-finite number {} has no JSON representation",
            n
        )));
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Ok(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| EmbedError::Marshal(format!("invalid float {}", n)))
}

fn check_depth(value: &Value) -> Result<()> {
    let mut pending = vec![(value, 0usize)];
    while let Some((value, depth)) = pending.pop() {
        let children: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => map.values().collect(),
            _ => continue,
        };
        if depth + 1 > MAX_DEPTH {
            return Err(EmbedError::Marshal(format!(
                "value nested deeper than {} levels",
                MAX_DEPTH
            )));
        }
        pending.extend(children.into_iter().map(|child| (child, depth + 1)));
    }
    Ok(())
}

fn std_string(value: &JsValue<'_>) -> Result<String> {
    value
        .as_string()
        .ok_or_else(|| EmbedError::Marshal("expected a string".into()))?
        .to_string()
        .map_err(|e| EmbedError::Marshal(format!("string is not valid UTF-8: {}", e)))
}

/// Describes a script failure: the pending exception if there is one,
/// otherwise the engine error itself.
pub(crate) fn thrown_message(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if !matches!(err, rquickjs::Error::Exception) {
        return err.to_string();
    }
    describe_thrown(&ctx.catch())
}

/// `Name: message` for error objects, `String(value)` for anything else.
pub(crate) fn describe_thrown(thrown: &JsValue<'_>) -> String {
    if let Some(object) = thrown.as_object() {
        let message = object.get::<_, Option<String>>("message").ok().flatten();
        if let Some(message) = message {
            return match object.get::<_, Option<String>>("name").ok().flatten() {
                Some(name) if !name.is_empty() => format!("{}: {}", name, message),
                _ => message,
            };
        }
    }
    thrown
        .get::<Coerced<String>>()
        .map(|text| text.0)
        .unwrap_or_else(|_| "uncaught exception".to_string())
}
