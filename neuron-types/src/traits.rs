//! Core trait contracts implemented by callers and consumed by the agent
//! loop, context manager, and tool subsystem: [`Provider`], [`ContextStrategy`],
//! [`ObservabilityHook`], [`DurableContext`], [`ToolDyn`], [`PermissionPolicy`].

use std::future::Future;
use std::time::Duration;

use crate::agent::Interrupt;
use crate::error::{ContextError, DurableError, HookError, ProviderError, ToolError};
use crate::stream::{StreamHandle, ToolStreamEvent, ToolStreamHandle};
use crate::types::{CompletionRequest, CompletionResponse, Message, ToolContext, ToolOutput};
use crate::wasm::{WasmBoxedFuture, WasmCompatSend, WasmCompatSync};

/// An LLM backend: turns a [`CompletionRequest`] into a full response or a
/// live event stream.
///
/// Implementors only need to speak their own wire format; every other
/// crate in the workspace consumes the normalized [`CompletionResponse`] /
/// [`crate::stream::StreamEvent`] shapes.
pub trait Provider: WasmCompatSend + WasmCompatSync {
    /// Run a completion to a single, fully assembled response.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, ProviderError>> + WasmCompatSend;

    /// Run a completion as a live stream of normalized events.
    fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<StreamHandle, ProviderError>> + WasmCompatSend;
}

/// A conversation-context compaction strategy.
///
/// Implementors decide when a message history has grown too large
/// (`should_compact`) and how to shrink it (`compact`). `token_estimate`
/// gives a cheap, strategy-specific token count used to drive that
/// decision without requiring an exact tokenizer.
pub trait ContextStrategy: WasmCompatSend + WasmCompatSync {
    /// Whether the given history should be compacted, given its token count.
    fn should_compact(&self, messages: &[Message], token_count: usize) -> bool;

    /// Compact the given history, returning the replacement message list.
    fn compact(
        &self,
        messages: Vec<Message>,
    ) -> impl Future<Output = Result<Vec<Message>, ContextError>> + WasmCompatSend;

    /// Estimate the token count of the given history.
    fn token_estimate(&self, messages: &[Message]) -> usize;
}

/// A lifecycle event fired by the agent loop (and, via the multi-agent
/// analogs, the swarm orchestrator).
///
/// "Before" events dispatch callbacks in registration order; "after"
/// events dispatch in reverse registration order (see
/// [`neuron-hooks`](https://docs.rs/neuron-hooks)).
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub enum HookEvent<'a> {
    /// Fired once, before the first cycle of a top-level invocation.
    BeforeInvocation,
    /// Fired once, after the invocation terminates (reverse order).
    AfterInvocation,
    /// Fired before each LLM request is sent (`BeforeModelCall`).
    PreLlmCall {
        /// The request about to be sent.
        request: &'a CompletionRequest,
    },
    /// Fired after each LLM response is assembled (`AfterModelCall`, reverse order).
    PostLlmCall {
        /// The assembled response.
        response: &'a CompletionResponse,
    },
    /// Fired whenever the loop appends a message to history (assistant or
    /// tool-result messages only — not the caller's initial input).
    MessageAdded {
        /// The message that was appended.
        message: &'a Message,
    },
    /// Fired before each tool invocation (`BeforeToolCall`).
    PreToolExecution {
        /// Name of the tool about to run.
        tool_name: &'a str,
        /// The tool's input arguments.
        input: &'a serde_json::Value,
        /// The owning agent's interrupt state, for callbacks that need to
        /// raise or check on a human-in-the-loop interrupt at this site.
        interrupts: &'a crate::agent::InterruptState,
    },
    /// Fired after each tool invocation completes (`AfterToolCall`, reverse order).
    PostToolExecution {
        /// Name of the tool that ran.
        tool_name: &'a str,
        /// The tool's output.
        output: &'a ToolOutput,
    },
    /// Fired at the start of each loop cycle.
    LoopIteration {
        /// The current turn/cycle number.
        turn: usize,
    },
    /// Fired when the conversation manager compacts history.
    ContextCompaction {
        /// Token estimate before compaction.
        old_tokens: usize,
        /// Token estimate after compaction.
        new_tokens: usize,
    },
    /// Fired when a session/invocation starts.
    SessionStart {
        /// The session identifier.
        session_id: &'a str,
    },
    /// Fired when a session/invocation ends.
    SessionEnd {
        /// The session identifier.
        session_id: &'a str,
    },
    /// Fired once, before a swarm's first node runs.
    BeforeMultiAgentInvocation,
    /// Fired once, after a swarm run terminates (reverse order).
    AfterMultiAgentInvocation,
    /// Fired before each node invocation within a swarm. A callback
    /// returning `HookAction::Interrupt` suspends the swarm run with
    /// `MultiAgentStopReason::Interrupted`, surfaced as a `NodeInterrupt`
    /// stream event.
    BeforeNodeCall {
        /// The node about to run.
        node_id: &'a str,
    },
    /// Fired after each node invocation completes (reverse order).
    AfterNodeCall {
        /// The node that ran.
        node_id: &'a str,
    },
}

/// The outcome of a hook callback.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum HookAction {
    /// Proceed normally.
    Continue,
    /// Skip the pending operation (tool call) with the given reason.
    Skip {
        /// Human-readable reason the operation was skipped.
        reason: String,
    },
    /// Abort the current invocation with the given reason.
    Terminate {
        /// Human-readable reason the invocation was terminated.
        reason: String,
    },
    /// Suspend the current invocation on a human-in-the-loop interrupt.
    ///
    /// Returned by a callback that called
    /// [`neuron-hooks`](https://docs.rs/neuron-hooks)`::interrupt(..)` and
    /// got back [`InterruptOutcome::Pending`](https://docs.rs/neuron-hooks)
    /// rather than a stored response.
    Interrupt(Interrupt),
}

/// An observer (and optional controller) of agent loop lifecycle events.
///
/// Registered observability hooks are consulted at every [`HookEvent`] site;
/// see the module docs on dispatch ordering and interrupt handling.
pub trait ObservabilityHook: WasmCompatSend + WasmCompatSync {
    /// Handle a lifecycle event, returning the action the loop should take.
    fn on_event(
        &self,
        event: HookEvent<'_>,
    ) -> impl Future<Output = Result<HookAction, HookError>> + WasmCompatSend;
}

/// Retry policy for a durable activity.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: Option<u32>,
    /// Initial backoff between attempts.
    pub initial_interval: Option<Duration>,
}

/// Options controlling a durable activity invocation.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// Maximum time from schedule to close.
    pub start_to_close_timeout: Duration,
    /// Maximum time between heartbeats before the activity is considered dead.
    pub heartbeat_timeout: Option<Duration>,
    /// Retry policy for transient failures.
    pub retry_policy: Option<RetryPolicy>,
}

/// An indirection point for LLM calls and tool executions, allowing a
/// production embedding to journal/replay them (e.g. via a durable
/// execution engine) without the agent loop itself knowing about it.
///
/// The crate ships only [`crate::LocalDurableContext`]-style passthrough
/// implementations live in `neuron-runtime`; this trait is the seam.
pub trait DurableContext: WasmCompatSend + WasmCompatSync {
    /// Execute an LLM call, possibly journaled/replayed.
    fn execute_llm_call(
        &self,
        request: CompletionRequest,
        options: ActivityOptions,
    ) -> impl Future<Output = Result<CompletionResponse, DurableError>> + WasmCompatSend;

    /// Execute a tool call, possibly journaled/replayed.
    fn execute_tool<'a>(
        &'a self,
        tool_name: &'a str,
        input: serde_json::Value,
        ctx: &'a ToolContext,
        options: ActivityOptions,
    ) -> impl Future<Output = Result<ToolOutput, DurableError>> + WasmCompatSend + 'a;

    /// Wait for an external signal of type `T`, with the durable engine's
    /// own timeout semantics.
    fn wait_for_signal<T: serde::de::DeserializeOwned + WasmCompatSend>(
        &self,
        signal_name: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<T>, DurableError>> + WasmCompatSend;

    /// Whether the engine wants this workflow to continue-as-new (reset its
    /// history) rather than keep accumulating events.
    fn should_continue_as_new(&self) -> bool {
        false
    }

    /// Perform a continue-as-new transition, if supported.
    fn continue_as_new(
        &self,
        messages: Vec<Message>,
    ) -> impl Future<Output = Result<(), DurableError>> + WasmCompatSend;

    /// Durable sleep (journaled, so it replays without actually waiting).
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + WasmCompatSend;

    /// The durable engine's notion of "now" (deterministic under replay).
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}

/// A dyn-compatible tool, callable by name with JSON input.
///
/// This is the object-safe surface [`neuron-tool`](https://docs.rs/neuron-tool)'s
/// registry stores trait objects of; typed tool authors usually implement a
/// higher-level macro-generated trait that blanket-implements this one.
pub trait ToolDyn: WasmCompatSend + WasmCompatSync {
    /// The tool's unique name.
    fn name(&self) -> &str;

    /// Human-readable description, shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's input arguments.
    fn input_schema(&self) -> serde_json::Value;

    /// Invoke the tool with already-validated JSON input.
    fn call_dyn<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: &'a ToolContext,
    ) -> WasmBoxedFuture<'a, Result<ToolOutput, ToolError>>;

    /// Invoke the tool as a live stream of intermediate events, terminated
    /// by the same [`ToolOutput`] `call_dyn` would have returned.
    ///
    /// The default bridges to `call_dyn` and emits a single terminal
    /// `Complete` event with no progress in between. Override only for
    /// tools that have something meaningful to say before they finish (a
    /// shell command streaming its stdout, a long file download reporting
    /// bytes transferred).
    fn call_dyn_stream<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: &'a ToolContext,
    ) -> WasmBoxedFuture<'a, Result<ToolStreamHandle, ToolError>> {
        Box::pin(async move {
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            let result = self.call_dyn(input, ctx).await?;
            let _ = tx.send(ToolStreamEvent::Complete(result)).await;
            Ok(ToolStreamHandle::new(rx))
        })
    }
}

/// A decision on whether a tool call is permitted to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    /// The call is permitted.
    Allow,
    /// The call is denied, with a human-readable reason.
    Deny(String),
    /// The call requires interactive confirmation, with a prompt.
    Ask(String),
}

/// A synchronous policy deciding whether a tool call may proceed.
pub trait PermissionPolicy: WasmCompatSend + WasmCompatSync {
    /// Decide whether the named tool may run with the given input.
    fn check(&self, tool_name: &str, input: &serde_json::Value) -> PermissionDecision;
}
