#![deny(missing_docs)]
//! Tool registry and middleware pipeline for neuron.
//!
//! [`ToolDyn`] (re-exported from `neuron-types`) is the object-safe tool
//! abstraction any tool source — local function, MCP server, HTTP endpoint —
//! implements. [`ToolRegistry`] is the generic keyed store of tools,
//! dispatched through a composable [`ToolMiddleware`] chain (permissions,
//! schema validation, timeouts, output formatting, structured-output
//! retries) identical in shape to axum's `from_fn` middleware.

pub mod builtin;
pub mod middleware;
pub mod registry;

pub use builtin::{
    OutputFormatter, PermissionChecker, RetryLimitedValidator, SchemaValidator,
    StructuredOutputValidator, TimeoutMiddleware,
};
pub use middleware::{tool_middleware_fn, Next, ToolCall, ToolMiddleware};
pub use registry::ToolRegistry;

pub use neuron_types::{ToolDyn, ToolError, ToolStreamEvent, ToolStreamHandle};
