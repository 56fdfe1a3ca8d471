pub mod error;
pub mod requests;
pub mod responses;
pub mod value;


pub use error::{EmbedError, ErrorKind, Result};
pub use requests::{is_identifier, ExecutionRequest, FunctionCall, RequestId};
pub use responses::{ExecutionResponse, ExecutionResult};
pub use value::{
    same_value, to_bindings, to_value, type_name, Bindings, Output, Value, MAX_SAFE_INTEGER,
};
