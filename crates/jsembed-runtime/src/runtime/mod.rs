//! QuickJS-backed script runtime
//!
//! - [`conversions`]: the value marshaller between the host lattice and script values
//! - [`bindings`]: the host capability bridge (`hostUtils`)
//! - [`environment`]: one isolated, single-use execution environment

pub mod bindings;
pub mod conversions;
pub mod environment;


pub use bindings::HOST_UTILS;
pub use conversions::MAX_DEPTH;
pub use environment::Environment;
