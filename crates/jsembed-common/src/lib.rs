//! jsembed Common Types
//!
//! Shared definitions for the embedded script execution subsystem:
//!
//! - **Errors**: [`EmbedError`] and its transport-facing [`ErrorKind`]
//! - **Values**: the JSON lattice used at the host/script boundary and the
//!   tagged [`Output`] of an evaluation
//! - **Requests**: [`ExecutionRequest`] and [`FunctionCall`]
//! - **Responses**: [`ExecutionResult`] and its serializable [`ExecutionResponse`]
//!
//! # Example
//!
//! ```
//! use jsembed_common::{ExecutionRequest, ExecutionResponse, Output};
//! use serde_json::json;
//!
//! let request = ExecutionRequest::new("price * quantity")
//!     .with_binding("price", json!(2.5))
//!     .with_binding("quantity", json!(4));
//!
//! // ... evaluated by the engine ...
//! let response = ExecutionResponse::from_result(&Ok(Output::Number(10.0)));
//! assert_eq!(response.result, Some(json!(10)));
//! ```

pub mod protocol;

pub use protocol::*;
