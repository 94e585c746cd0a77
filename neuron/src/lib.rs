#![deny(missing_docs)]
//! # neuron — umbrella crate
//!
//! A single import surface over the neuron agent runtime: the turn-taking
//! [`neuron_loop::AgentLoop`], its tool registry and hook pipeline, context
//! compaction strategies, the swarm orchestrator, and session snapshotting —
//! each usable standalone from its own crate, assembled here behind feature
//! flags for applications that want the whole stack as one dependency.

pub use neuron_loop;
pub use neuron_tool as tool;
pub use neuron_types;

#[cfg(feature = "context")]
pub use neuron_context as context;
#[cfg(feature = "hooks")]
pub use neuron_hooks as hooks;
#[cfg(feature = "orch")]
pub use neuron_orch as orch;
#[cfg(feature = "runtime")]
pub use neuron_runtime as runtime;
#[cfg(feature = "state-fs")]
pub use neuron_state_fs as state_fs;
#[cfg(feature = "state-memory")]
pub use neuron_state_memory as state_memory;

/// Happy-path imports for composing neuron agents.
pub mod prelude {
    pub use neuron_loop::{AgentLoop, AgentResult, LoopConfig, TurnResult};
    pub use neuron_tool::{ToolDyn, ToolError, ToolRegistry};
    pub use neuron_types::{
        CompletionRequest, CompletionResponse, ContentBlock, ContentItem, ContextError,
        ContextStrategy, LoopError, Message, Provider, ProviderError, Role, StopReason,
        SystemPrompt, TokenUsage, ToolContext, ToolOutput, WasmBoxedFuture,
    };

    #[cfg(feature = "hooks")]
    pub use neuron_hooks::HookRegistry;

    #[cfg(feature = "orch")]
    pub use neuron_orch::{SwarmNode, SwarmOrchestrator};

    #[cfg(feature = "runtime")]
    pub use neuron_runtime::SubAgentManager;
}
