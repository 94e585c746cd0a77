//! Configuration types for the agentic loop.

use neuron_types::{SystemPrompt, UsageLimits};

/// Configuration for the agentic loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// The system prompt for the LLM provider.
    pub system_prompt: SystemPrompt,
    /// Maximum number of turns before the loop terminates.
    /// `None` means no limit.
    pub max_turns: Option<usize>,
    /// Whether to execute tool calls in parallel when multiple are returned.
    ///
    /// Defaults to `true`: a turn with N tool calls runs all N concurrently
    /// via `join_all`, same as a single pending request fans out to several
    /// independent tool invocations would in any other agent runtime. Set to
    /// `false` only when tools share mutable state that isn't safe under
    /// concurrent access.
    pub parallel_tool_execution: bool,
    /// Resource usage limits (requests, tokens, tool calls) enforced across
    /// the run. `None` means unlimited. See [`UsageLimits`].
    pub usage_limits: Option<UsageLimits>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            system_prompt: SystemPrompt::Text(String::new()),
            max_turns: None,
            parallel_tool_execution: true,
            usage_limits: None,
        }
    }
}
