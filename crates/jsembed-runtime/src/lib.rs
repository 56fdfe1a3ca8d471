//! jsembed Runtime
//!
//! Embedded script execution built on the QuickJS engine (via `rquickjs`).
//!
//! - [`ScriptStore`] loads named scripts from a [`ScriptResources`] set and
//!   caches them for its lifetime.
//! - [`Engine`] runs every evaluation in a fresh, isolated [`Environment`] with
//!   the `hostUtils` capability bridge installed, under a deadline the engine
//!   enforces through its interrupt hook, with capped heap and stack.
//! - [`invocation`] calls named functions of stored scripts with parameters
//!   bound as data.
//! - [`logic`] runs the built-in business-logic scripts over an `inputData`
//!   binding and returns what they leave in `result`.
//! - [`ScriptService`] ties these together with invocation metrics,
//!   benchmarking and an async facade.

pub mod benchmark;
pub mod engine;
pub mod invocation;
pub mod logic;
pub mod resource_limits;
pub mod resources;
pub mod runtime;
pub mod service;
pub mod store;

pub use benchmark::run_benchmark;
pub use engine::Engine;
pub use invocation::{
    catalog, invoke, BusinessRule, CallingConvention, Catalog, CatalogEntry, DataOperation,
    Invocation, BUSINESS_RULES_SCRIPT, DATA_PROCESSING_SCRIPT,
};
pub use logic::{listing, run_business_logic, BusinessLogic, LogicEntry};
pub use resource_limits::ResourceLimits;
pub use resources::{DirectoryResources, EmbeddedResources, ScriptResources};
pub use runtime::{Environment, HOST_UTILS, MAX_DEPTH};
pub use service::{ScriptService, ServiceConfig};
pub use store::{ScriptSource, ScriptStore, SourceView};
