//! Transport-facing rendering of an execution result.

use serde::{Deserialize, Serialize};

use super::error::{EmbedError, ErrorKind};
use super::value::{Output, Value};

/// Outcome of one evaluation: a coerced value or a failure.
///
/// This is the tagged result the core hands to its callers. It never carries a
/// panic; every failure mode is an [`EmbedError`].
pub type ExecutionResult = std::result::Result<Output, EmbedError>;

/// Serializable form of an [`ExecutionResult`].
///
/// # Fields
///
/// - `success`: whether the evaluation produced a value
/// - `result`: the value rendered as JSON (present on success)
/// - `error`: human-readable message (present on failure)
/// - `error_kind`: stable classification of the failure
///
/// # Example
///
/// ```
/// use jsembed_common::protocol::responses::ExecutionResponse;
/// use jsembed_common::{EmbedError, Output};
///
/// let ok = ExecutionResponse::from_result(&Ok(Output::Number(3.0)));
/// assert!(ok.success);
///
/// let err = ExecutionResponse::from_result(&Err(EmbedError::ScriptNotFound("x".into())));
/// assert_eq!(err.error.as_deref(), Some("Script not found: x"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResponse {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl ExecutionResponse {
    pub fn success(output: &Output) -> Self {
        ExecutionResponse {
            success: true,
            result: Some(output.to_json()),
            error: None,
            error_kind: None,
        }
    }

    pub fn error(error: &EmbedError) -> Self {
        ExecutionResponse {
            success: false,
            result: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn from_result(result: &ExecutionResult) -> Self {
        match result {
            Ok(output) => Self::success(output),
            Err(e) => Self::error(e),
        }
    }
}

impl From<ExecutionResult> for ExecutionResponse {
    fn from(result: ExecutionResult) -> Self {
        Self::from_result(&result)
    }
}
