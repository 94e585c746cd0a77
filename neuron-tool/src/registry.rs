//! The tool registry: a generic keyed store of tools, executed through the
//! middleware pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use neuron_types::{ToolContext, ToolDefinition, ToolDyn, ToolError, ToolOutput, ToolStreamHandle};

use crate::middleware::{Next, ToolCall, ToolMiddleware};

/// Keyed store of tools, dispatched through an ordered middleware chain.
///
/// Tools are keyed by their own `name()` — `generateId()` for this registry
/// is simply "the tool's declared name" — so `register` rejects a second
/// tool with a name already present rather than silently overwriting it.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolDyn>>,
    middleware: Vec<Arc<dyn ToolMiddleware>>,
}

impl ToolRegistry {
    /// Create an empty registry with no middleware.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            middleware: Vec::new(),
        }
    }

    /// Append a middleware stage to the execution pipeline.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn ToolMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Append a middleware stage to the execution pipeline.
    pub fn add_middleware(&mut self, middleware: Arc<dyn ToolMiddleware>) {
        self.middleware.push(middleware);
    }

    /// Register a tool, keyed by its own name.
    ///
    /// Returns the assigned id (the tool's name) on success, or
    /// `ToolError::InvalidInput` if a tool with that name is already
    /// registered.
    pub fn register(&mut self, tool: Arc<dyn ToolDyn>) -> Result<String, ToolError> {
        let id = tool.name().to_string();
        if self.tools.contains_key(&id) {
            return Err(ToolError::InvalidInput(format!(
                "duplicate tool: {id}"
            )));
        }
        self.tools.insert(id.clone(), tool);
        Ok(id)
    }

    /// Register every tool in `tools`, stopping at the first duplicate.
    pub fn register_all(
        &mut self,
        tools: impl IntoIterator<Item = Arc<dyn ToolDyn>>,
    ) -> Result<Vec<String>, ToolError> {
        let mut ids = Vec::new();
        for tool in tools {
            ids.push(self.register(tool)?);
        }
        Ok(ids)
    }

    /// Remove and return the tool registered under `id`.
    pub fn deregister(&mut self, id: &str) -> Result<Arc<dyn ToolDyn>, ToolError> {
        self.tools
            .remove(id)
            .ok_or_else(|| ToolError::NotFound(id.to_string()))
    }

    /// Remove and return every tool named in `ids`, skipping ids not found.
    pub fn deregister_all(&mut self, ids: &[String]) -> Vec<Arc<dyn ToolDyn>> {
        ids.iter().filter_map(|id| self.tools.remove(id)).collect()
    }

    /// Find the first tool matching `predicate`, remove it, and return it.
    pub fn find_deregister(
        &mut self,
        predicate: impl Fn(&dyn ToolDyn) -> bool,
    ) -> Option<Arc<dyn ToolDyn>> {
        let id = self
            .tools
            .iter()
            .find(|(_, tool)| predicate(tool.as_ref()))
            .map(|(id, _)| id.clone())?;
        self.tools.remove(&id)
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn ToolDyn>> {
        self.tools.get(id)
    }

    /// Find the first tool matching `predicate`.
    #[must_use]
    pub fn find(&self, predicate: impl Fn(&dyn ToolDyn) -> bool) -> Option<&Arc<dyn ToolDyn>> {
        self.tools.values().find(|tool| predicate(tool.as_ref()))
    }

    /// All registered tool names.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.tools.keys()
    }

    /// All registered tools.
    pub fn values(&self) -> impl Iterator<Item = &Arc<dyn ToolDyn>> {
        self.tools.values()
    }

    /// All registered `(name, tool)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&String, &Arc<dyn ToolDyn>)> {
        self.tools.iter()
    }

    /// Remove every registered tool.
    pub fn clear(&mut self) {
        self.tools.clear();
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry holds no tools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Provider-facing definitions for every registered tool, in the shape
    /// a [`neuron_types::CompletionRequest`] expects.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                title: None,
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
                output_schema: None,
                annotations: None,
                cache_control: None,
            })
            .collect()
    }

    /// Run the named tool's input through the middleware pipeline and, at
    /// the end of the chain, the tool itself.
    ///
    /// Returns `ToolError::NotFound` if no tool with that name is
    /// registered — callers at the loop level convert this into a
    /// synthesized error `ToolResult` rather than aborting the turn.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let call = ToolCall {
            id: String::new(),
            name: name.to_string(),
            input,
        };
        let next = Next::new(tool.as_ref(), &self.middleware);
        next.run(&call, ctx).await
    }

    /// Run the named tool's input through the middleware pipeline as a
    /// stream, surfacing the tool's own intermediate events where it (and
    /// the pipeline) supports them.
    ///
    /// See [`Self::execute`] for error semantics; the same
    /// `ToolError::NotFound` case applies here.
    pub async fn execute_stream(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolStreamHandle, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let call = ToolCall {
            id: String::new(),
            name: name.to_string(),
            input,
        };
        let next = Next::new(tool.as_ref(), &self.middleware);
        next.run_stream(&call, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
