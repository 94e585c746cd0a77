#![deny(missing_docs)]
//! Swarm orchestrator: sequential handoff scheduling across a fixed set of
//! agent nodes, each a full [`AgentLoop`].
//!
//! At most one node runs at a time. A node requests a handoff by calling the
//! reserved `handoff_to_agent` tool, auto-registered into every node's own
//! [`ToolRegistry`] and intercepted here rather than passed through to the
//! node's tool subsystem. The scheduler stops when a node terminates without
//! a handoff, or when one of the run's guardrails (iteration count, handoff
//! count, repetition detector, token budget, wall-clock timeout) fires.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use neuron_hooks::HookRegistry;
use neuron_loop::{AgentLoop, AgentResult, LoopConfig, TurnResult};
use neuron_tool::ToolRegistry;
use neuron_types::{
    ContentBlock, ContentItem, ContextStrategy, HookAction, HookEvent, Interrupt, InterruptState,
    Message, ObservabilityHook, Provider, StopReason, StreamEvent, SwarmConfig, SwarmState,
    SystemPrompt, ToolContext, ToolDyn, ToolError, ToolOutput, TokenUsage, WasmBoxedFuture,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// The reserved tool name every node's registry gains automatically. Never
/// supplied by the caller; intercepted by the orchestrator before it would
/// reach a node's own tool subsystem.
pub const HANDOFF_TOOL_NAME: &str = "handoff_to_agent";

/// The structured request a node emits to ask for a handoff.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HandoffRequest {
    /// The id of the node to hand off to.
    pub agent: String,
    /// An optional message to seed the target node's next turn with.
    /// Defaults to the handing-off node's final response text.
    pub message: Option<String>,
    /// An optional human-readable reason, surfaced on the `Handoff` event.
    pub reason: Option<String>,
}

struct HandoffTool {
    slot: Arc<Mutex<Option<HandoffRequest>>>,
}

impl ToolDyn for HandoffTool {
    fn name(&self) -> &str {
        HANDOFF_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Hand off control of the conversation to another agent in this swarm."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agent": {"type": "string"},
                "message": {"type": "string"},
                "reason": {"type": "string"},
            },
            "required": ["agent"],
        })
    }

    fn call_dyn<'a>(
        &'a self,
        input: serde_json::Value,
        _ctx: &'a ToolContext,
    ) -> WasmBoxedFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let request: HandoffRequest = serde_json::from_value(input)
                .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
            let summary = format!("handing off to {}", request.agent);
            *self.slot.lock().await = Some(request);
            Ok(ToolOutput {
                content: vec![ContentItem::Text(summary)],
                structured_content: None,
                is_error: false,
            })
        })
    }
}

/// One node in a swarm: its own system prompt, tools, and turn limit.
///
/// The `handoff_to_agent` tool is registered automatically; registering a
/// tool under that name explicitly is rejected by [`ToolRegistry::register`].
pub struct SwarmNode {
    tools: ToolRegistry,
    system_prompt: SystemPrompt,
    max_turns: Option<usize>,
    handoff_slot: Arc<Mutex<Option<HandoffRequest>>>,
}

impl SwarmNode {
    /// Create a node with the given system prompt and no tools beyond the
    /// auto-registered handoff tool.
    #[must_use]
    pub fn new(system_prompt: impl Into<SystemPrompt>) -> Self {
        let slot = Arc::new(Mutex::new(None));
        let mut tools = ToolRegistry::new();
        tools
            .register(Arc::new(HandoffTool { slot: slot.clone() }))
            .expect("handoff tool name is reserved and registered exactly once");
        Self {
            tools,
            system_prompt: system_prompt.into(),
            max_turns: None,
            handoff_slot: slot,
        }
    }

    /// Add a tool the node can call, beyond the auto-registered handoff tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidInput`] if the tool's name is already
    /// registered (including the reserved `handoff_to_agent` name).
    pub fn with_tool(mut self, tool: Arc<dyn ToolDyn>) -> Result<Self, ToolError> {
        self.tools.register(tool)?;
        Ok(self)
    }

    /// Cap this node's own turn count within a single invocation.
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }
}

/// Errors from running a swarm to completion.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SwarmError {
    /// A handoff (or the configured entry node) named a node id that was
    /// never registered.
    #[error("no such swarm node: {0}")]
    NodeNotFound(String),
    /// A node's own `AgentLoop` run failed.
    #[error("node {node_id} failed: {source}")]
    Node {
        /// The node that failed.
        node_id: String,
        /// The underlying loop error.
        #[source]
        source: neuron_types::LoopError,
    },
    /// The observed token usage exceeded `max_run_total_tokens`.
    #[error("run token budget exceeded: {observed} > {budget}")]
    TokenBudgetExceeded {
        /// Tokens observed so far.
        observed: u64,
        /// The configured budget.
        budget: u64,
    },
    /// A `BeforeMultiAgentInvocation`/`BeforeNodeCall`/`AfterNodeCall`/
    /// `AfterMultiAgentInvocation` hook requested termination.
    #[error("swarm run terminated by hook: {0}")]
    HookTerminated(String),
}

/// Why a swarm run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MultiAgentStopReason {
    /// A node terminated without requesting a handoff.
    Completed,
    /// `SwarmConfig::max_iterations` was reached.
    MaxIterations,
    /// `SwarmConfig::max_handoffs` was reached.
    MaxHandoffs,
    /// The repetition detector fired: too few distinct nodes in the
    /// trailing handoff window.
    RepetitiveHandoff,
    /// `SwarmConfig::execution_timeout` elapsed.
    ExecutionTimeout,
    /// A node's own invocation exceeded `SwarmConfig::node_timeout` and the
    /// configured [`neuron_types::NodeTimeoutPolicy`] was `Abort`.
    NodeTimeout,
    /// A hook raised an interrupt during a node's invocation.
    Interrupted,
    /// The caller's cancellation token fired before a node was dispatched.
    Cancelled,
}

/// A single event from a running swarm, forwarded to callers of
/// [`SwarmOrchestrator::run_stream`].
///
/// Events for a given node never interleave with another node's events —
/// at most one node runs at a time — but a `NodeStream` event's own nested
/// [`StreamEvent`] is a coarse, message-granularity approximation of the
/// node's activity rather than the full token-delta stream a direct
/// `AgentLoop::run_stream` caller would see (see `DESIGN.md`).
#[derive(Debug)]
#[non_exhaustive]
pub enum MultiAgentStreamEvent {
    /// A node is about to run.
    NodeStart {
        /// The node about to run.
        node_id: String,
    },
    /// The message a node is about to be invoked with.
    NodeInput {
        /// The node receiving the message.
        node_id: String,
        /// The message.
        message: Message,
    },
    /// A nested event forwarded from a node's own invocation.
    NodeStream {
        /// The node this event came from.
        node_id: String,
        /// The nested event.
        event: StreamEvent,
    },
    /// A node finished running, with or without a following handoff.
    NodeStop {
        /// The node that finished.
        node_id: String,
    },
    /// One node handed off control to another.
    Handoff {
        /// The node handing off.
        from: String,
        /// The node receiving control.
        to: String,
        /// The optional reason the handing-off node gave.
        reason: Option<String>,
    },
    /// A node invocation was cancelled before it was dispatched.
    NodeCancel {
        /// The node that was cancelled.
        node_id: String,
    },
    /// A `BeforeNodeCall` hook raised a human-in-the-loop interrupt.
    NodeInterrupt {
        /// The node the interrupt was raised against.
        node_id: String,
        /// The interrupt itself.
        interrupt: Interrupt,
    },
    /// The run's terminal result.
    Result(Box<MultiAgentResult>),
}

/// The outcome of a completed (or deliberately terminated) swarm run.
#[derive(Debug, Clone)]
pub struct MultiAgentResult {
    /// The node that was executing (or had just finished) when the run
    /// stopped.
    pub final_node_id: String,
    /// The final node's text response, if it produced one.
    pub response: String,
    /// The final node's own conversation history.
    pub messages: Vec<Message>,
    /// Token usage accumulated across every node that ran.
    pub usage: TokenUsage,
    /// The scheduler state at the moment the run stopped.
    pub state: SwarmState,
    /// Why the run stopped.
    pub stop_reason: MultiAgentStopReason,
}

/// Sequential handoff orchestrator over a fixed set of [`SwarmNode`]s.
///
/// Generic over `P`/`C` because [`Provider`]/[`ContextStrategy`] use RPITIT
/// and aren't dyn-compatible — every node in one swarm shares the same
/// provider and context-strategy type, cloned per node invocation.
pub struct SwarmOrchestrator<P, C> {
    nodes: HashMap<String, SwarmNode>,
    entry_node: String,
    config: SwarmConfig,
    provider: P,
    context: C,
    hooks: HookRegistry,
    interrupts: InterruptState,
}

impl<P, C> SwarmOrchestrator<P, C>
where
    P: Provider + Clone,
    C: ContextStrategy + Clone,
{
    /// Create an orchestrator with the given entry node id, provider,
    /// context strategy, and scheduler configuration. Nodes are added with
    /// [`Self::add_node`] before calling [`Self::run`].
    #[must_use]
    pub fn new(entry_node: impl Into<String>, provider: P, context: C, config: SwarmConfig) -> Self {
        Self {
            nodes: HashMap::new(),
            entry_node: entry_node.into(),
            config,
            provider,
            context,
            hooks: HookRegistry::new(),
            interrupts: InterruptState::new(),
        }
    }

    /// Register a node under the given id.
    pub fn add_node(&mut self, id: impl Into<String>, node: SwarmNode) -> &mut Self {
        self.nodes.insert(id.into(), node);
        self
    }

    /// Register a multi-agent lifecycle hook, observing
    /// `BeforeMultiAgentInvocation`/`AfterMultiAgentInvocation`/
    /// `BeforeNodeCall`/`AfterNodeCall` events fired by
    /// [`Self::run_stream`]. Not consulted by [`Self::run`].
    pub fn add_hook(&mut self, hook: Arc<dyn ObservabilityHook>) -> &mut Self {
        self.hooks.add(hook);
        self
    }

    fn repetition_fires(&self, history: &[String]) -> bool {
        let window = self.config.repetitive_handoff_window;
        if history.len() < window {
            return false;
        }
        let distinct: HashSet<&String> = history[history.len() - window..].iter().collect();
        distinct.len() < self.config.repetitive_handoff_min_unique
    }

    fn token_total(usage: &TokenUsage) -> u64 {
        (usage.input_tokens + usage.output_tokens) as u64
    }

    fn stopped(
        state: SwarmState,
        result: Option<AgentResult>,
        reason: MultiAgentStopReason,
    ) -> MultiAgentResult {
        let (response, messages) = match result {
            Some(r) => (r.response, r.messages),
            None => (String::new(), Vec::new()),
        };
        MultiAgentResult {
            final_node_id: state.current_node_id.clone(),
            response,
            messages,
            usage: state.accumulated_usage.clone(),
            state,
            stop_reason: reason,
        }
    }

    /// Run the swarm to completion, starting at the configured entry node.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::NodeNotFound`] if the entry node or a
    /// handoff target was never registered with [`Self::add_node`],
    /// [`SwarmError::Node`] if a node's own loop returns an error other than
    /// a timeout, or [`SwarmError::TokenBudgetExceeded`] if the observed
    /// usage exceeds `max_run_total_tokens`.
    pub async fn run(
        &mut self,
        task: Message,
        tool_ctx: &ToolContext,
    ) -> Result<MultiAgentResult, SwarmError> {
        let deadline = Instant::now() + self.config.execution_timeout;
        let mut state = SwarmState {
            current_node_id: self.entry_node.clone(),
            ..SwarmState::default()
        };
        let mut input = task;
        let mut last_result: Option<AgentResult> = None;

        loop {
            if state.iteration >= self.config.max_iterations {
                return Ok(Self::stopped(state, last_result, MultiAgentStopReason::MaxIterations));
            }
            if state.node_history.len() >= self.config.max_handoffs {
                return Ok(Self::stopped(state, last_result, MultiAgentStopReason::MaxHandoffs));
            }
            if self.repetition_fires(&state.node_history) {
                return Ok(Self::stopped(
                    state,
                    last_result,
                    MultiAgentStopReason::RepetitiveHandoff,
                ));
            }
            if Instant::now() >= deadline {
                return Ok(Self::stopped(
                    state,
                    last_result,
                    MultiAgentStopReason::ExecutionTimeout,
                ));
            }

            let node_id = state.current_node_id.clone();
            tracing::info!(node = %node_id, iteration = state.iteration, "swarm: starting node");

            let node = self
                .nodes
                .get_mut(&node_id)
                .ok_or_else(|| SwarmError::NodeNotFound(node_id.clone()))?;
            *node.handoff_slot.lock().await = None;
            let node_tools = std::mem::take(&mut node.tools);
            let max_turns = node.max_turns;
            let loop_config = LoopConfig {
                system_prompt: node.system_prompt.clone(),
                max_turns,
                parallel_tool_execution: true,
                ..LoopConfig::default()
            };

            let mut agent_loop =
                AgentLoop::new(self.provider.clone(), node_tools, self.context.clone(), loop_config);

            // Drive the node one turn at a time rather than calling `run`
            // straight through: a node that calls `handoff_to_agent` must
            // yield control back to the scheduler immediately rather than
            // keep taking turns, since the loop itself doesn't know that
            // tool name is special.
            let run_outcome = tokio::time::timeout(self.config.node_timeout, async {
                let mut steps = agent_loop.run_step(input.clone(), tool_ctx);
                loop {
                    match steps.next().await {
                        Some(TurnResult::ToolsExecuted { calls, .. }) => {
                            if calls.iter().any(|(_, name, _)| name == HANDOFF_TOOL_NAME) {
                                return Ok(steps.finish_now());
                            }
                        }
                        Some(TurnResult::CompactionOccurred { .. }) => {}
                        Some(TurnResult::FinalResponse(result) | TurnResult::Interrupted(result)) => {
                            return Ok(result);
                        }
                        Some(TurnResult::MaxTurnsReached) => {
                            return Err(neuron_types::LoopError::MaxTurns(max_turns.unwrap_or(0)));
                        }
                        Some(TurnResult::Error(e)) => return Err(e),
                        None => unreachable!("StepIterator yields a terminal TurnResult before exhausting"),
                    }
                }
            })
            .await;

            // Reclaim the node's tool registry regardless of outcome so the
            // node is runnable again on a later handoff back to it.
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.tools = std::mem::replace(agent_loop.tools_mut(), ToolRegistry::new());
            }

            let result = match run_outcome {
                Ok(Ok(result)) => result,
                Ok(Err(source)) => return Err(SwarmError::Node { node_id, source }),
                Err(_elapsed) => {
                    tracing::warn!(node = %node_id, "swarm: node timed out");
                    match self.config.node_timeout_policy {
                        // Treated like a normal non-handoff terminal result:
                        // the swarm stops here instead of failing the run.
                        neuron_types::NodeTimeoutPolicy::Advance => {
                            return Ok(Self::stopped(
                                state,
                                last_result,
                                MultiAgentStopReason::Completed,
                            ));
                        }
                        neuron_types::NodeTimeoutPolicy::Abort => {
                            return Ok(Self::stopped(
                                state,
                                last_result,
                                MultiAgentStopReason::NodeTimeout,
                            ));
                        }
                    }
                }
            };

            state.accumulated_usage = add_usage(&state.accumulated_usage, &result.usage);
            if let Some(budget) = self.config.max_run_total_tokens {
                let observed = Self::token_total(&state.accumulated_usage);
                if observed > budget {
                    return Err(SwarmError::TokenBudgetExceeded { observed, budget });
                }
            }

            if result.stop_reason == StopReason::Interrupted {
                last_result = Some(result);
                return Ok(Self::stopped(state, last_result, MultiAgentStopReason::Interrupted));
            }

            let handoff = self.nodes[&node_id].handoff_slot.lock().await.take();
            let final_text = if result.response.is_empty() {
                // `finish_now` stopped the node right after the handoff
                // tool executed, before a text-only final turn — pull any
                // explanatory text the model attached to the handoff call
                // itself from its last assistant message.
                last_assistant_text(&result.messages)
            } else {
                result.response.clone()
            };
            last_result = Some(result);

            match handoff {
                Some(request) if self.nodes.contains_key(&request.agent) => {
                    tracing::info!(
                        from = %node_id, to = %request.agent, reason = request.reason.as_deref().unwrap_or(""),
                        "swarm: handoff"
                    );
                    state.node_history.push(node_id.clone());
                    state.current_node_id = request.agent.clone();
                    input = Message {
                        role: neuron_types::Role::User,
                        content: vec![ContentBlock::Text(
                            request.message.unwrap_or(final_text),
                        )],
                    };
                }
                Some(request) => {
                    return Err(SwarmError::NodeNotFound(request.agent));
                }
                None => {
                    return Ok(Self::stopped(state, last_result, MultiAgentStopReason::Completed));
                }
            }

            state.iteration += 1;
        }
    }

    /// Run the swarm with a live event stream, mirroring
    /// [`neuron_loop::AgentLoop::run_stream`]'s shape: spawns the scheduler
    /// loop onto a background task and returns immediately with a receiver
    /// and the task's join handle.
    ///
    /// Unlike [`Self::run`], this fires the multi-agent hook events
    /// (`BeforeMultiAgentInvocation`, `BeforeNodeCall`, `AfterNodeCall`,
    /// `AfterMultiAgentInvocation`) registered via [`Self::add_hook`]. A
    /// `BeforeNodeCall` hook returning `HookAction::Interrupt` suspends the
    /// run with `MultiAgentStopReason::Interrupted` (and a `NodeInterrupt`
    /// event) instead of dispatching the node; `HookAction::Terminate` at
    /// any multi-agent hook site aborts the run with
    /// `SwarmError::HookTerminated`.
    ///
    /// # Errors
    ///
    /// The join handle resolves to the same errors [`Self::run`] can
    /// return, plus [`SwarmError::HookTerminated`].
    pub fn run_stream(
        mut self,
        task: Message,
        tool_ctx: ToolContext,
    ) -> (
        mpsc::Receiver<MultiAgentStreamEvent>,
        JoinHandle<Result<MultiAgentResult, SwarmError>>,
    )
    where
        P: 'static,
        C: 'static,
    {
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move { self.drive_multi_agent_stream(task, tool_ctx, tx).await });
        (rx, handle)
    }

    /// The loop body driven by [`Self::run_stream`] on its spawned task.
    async fn drive_multi_agent_stream(
        &mut self,
        task: Message,
        tool_ctx: ToolContext,
        tx: mpsc::Sender<MultiAgentStreamEvent>,
    ) -> Result<MultiAgentResult, SwarmError> {
        if let HookAction::Terminate { reason } =
            self.hooks.dispatch(HookEvent::BeforeMultiAgentInvocation).await
        {
            return Err(SwarmError::HookTerminated(reason));
        }

        let deadline = Instant::now() + self.config.execution_timeout;
        let mut state = SwarmState {
            current_node_id: self.entry_node.clone(),
            ..SwarmState::default()
        };
        let mut input = task;
        let mut last_result: Option<AgentResult> = None;

        let outcome = loop {
            if state.iteration >= self.config.max_iterations {
                break Self::stopped(state, last_result, MultiAgentStopReason::MaxIterations);
            }
            if state.node_history.len() >= self.config.max_handoffs {
                break Self::stopped(state, last_result, MultiAgentStopReason::MaxHandoffs);
            }
            if self.repetition_fires(&state.node_history) {
                break Self::stopped(state, last_result, MultiAgentStopReason::RepetitiveHandoff);
            }
            if Instant::now() >= deadline {
                break Self::stopped(state, last_result, MultiAgentStopReason::ExecutionTimeout);
            }

            let node_id = state.current_node_id.clone();

            match self
                .hooks
                .dispatch(HookEvent::BeforeNodeCall { node_id: &node_id })
                .await
            {
                HookAction::Terminate { reason } => return Err(SwarmError::HookTerminated(reason)),
                HookAction::Interrupt(interrupt) => {
                    self.interrupts.insert(interrupt.clone());
                    let _ = tx
                        .send(MultiAgentStreamEvent::NodeInterrupt {
                            node_id: node_id.clone(),
                            interrupt,
                        })
                        .await;
                    break Self::stopped(state, last_result, MultiAgentStopReason::Interrupted);
                }
                HookAction::Skip { .. } | HookAction::Continue => {}
            }

            if tool_ctx.cancellation_token.is_cancelled() {
                let _ = tx
                    .send(MultiAgentStreamEvent::NodeCancel {
                        node_id: node_id.clone(),
                    })
                    .await;
                break Self::stopped(state, last_result, MultiAgentStopReason::Cancelled);
            }

            tracing::info!(node = %node_id, iteration = state.iteration, "swarm: starting node");
            let _ = tx
                .send(MultiAgentStreamEvent::NodeStart {
                    node_id: node_id.clone(),
                })
                .await;
            let _ = tx
                .send(MultiAgentStreamEvent::NodeInput {
                    node_id: node_id.clone(),
                    message: input.clone(),
                })
                .await;

            let node = self
                .nodes
                .get_mut(&node_id)
                .ok_or_else(|| SwarmError::NodeNotFound(node_id.clone()))?;
            *node.handoff_slot.lock().await = None;
            let node_tools = std::mem::take(&mut node.tools);
            let max_turns = node.max_turns;
            let loop_config = LoopConfig {
                system_prompt: node.system_prompt.clone(),
                max_turns,
                parallel_tool_execution: true,
                ..LoopConfig::default()
            };

            let mut agent_loop =
                AgentLoop::new(self.provider.clone(), node_tools, self.context.clone(), loop_config);

            let run_outcome = tokio::time::timeout(self.config.node_timeout, async {
                let mut steps = agent_loop.run_step(input.clone(), &tool_ctx);
                loop {
                    match steps.next().await {
                        Some(TurnResult::ToolsExecuted { calls, .. }) => {
                            if calls.iter().any(|(_, name, _)| name == HANDOFF_TOOL_NAME) {
                                return Ok(steps.finish_now());
                            }
                        }
                        Some(TurnResult::CompactionOccurred { .. }) => {}
                        Some(TurnResult::FinalResponse(result) | TurnResult::Interrupted(result)) => {
                            return Ok(result);
                        }
                        Some(TurnResult::MaxTurnsReached) => {
                            return Err(neuron_types::LoopError::MaxTurns(max_turns.unwrap_or(0)));
                        }
                        Some(TurnResult::Error(e)) => return Err(e),
                        None => unreachable!("StepIterator yields a terminal TurnResult before exhausting"),
                    }
                }
            })
            .await;

            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.tools = std::mem::replace(agent_loop.tools_mut(), ToolRegistry::new());
            }

            let _ = tx
                .send(MultiAgentStreamEvent::NodeStop {
                    node_id: node_id.clone(),
                })
                .await;
            if let HookAction::Terminate { reason } = self
                .hooks
                .dispatch(HookEvent::AfterNodeCall { node_id: &node_id })
                .await
            {
                return Err(SwarmError::HookTerminated(reason));
            }

            let result = match run_outcome {
                Ok(Ok(result)) => result,
                Ok(Err(source)) => return Err(SwarmError::Node { node_id, source }),
                Err(_elapsed) => {
                    tracing::warn!(node = %node_id, "swarm: node timed out");
                    match self.config.node_timeout_policy {
                        neuron_types::NodeTimeoutPolicy::Advance => {
                            break Self::stopped(state, last_result, MultiAgentStopReason::Completed);
                        }
                        neuron_types::NodeTimeoutPolicy::Abort => {
                            break Self::stopped(state, last_result, MultiAgentStopReason::NodeTimeout);
                        }
                    }
                }
            };

            if let Some(last) = result.messages.last() {
                let _ = tx
                    .send(MultiAgentStreamEvent::NodeStream {
                        node_id: node_id.clone(),
                        event: StreamEvent::MessageComplete(last.clone()),
                    })
                    .await;
            }
            let _ = tx
                .send(MultiAgentStreamEvent::NodeStream {
                    node_id: node_id.clone(),
                    event: StreamEvent::Usage(result.usage.clone()),
                })
                .await;

            state.accumulated_usage = add_usage(&state.accumulated_usage, &result.usage);
            if let Some(budget) = self.config.max_run_total_tokens {
                let observed = Self::token_total(&state.accumulated_usage);
                if observed > budget {
                    return Err(SwarmError::TokenBudgetExceeded { observed, budget });
                }
            }

            if result.stop_reason == StopReason::Interrupted {
                last_result = Some(result);
                break Self::stopped(state, last_result, MultiAgentStopReason::Interrupted);
            }

            let handoff = self.nodes[&node_id].handoff_slot.lock().await.take();
            let final_text = if result.response.is_empty() {
                last_assistant_text(&result.messages)
            } else {
                result.response.clone()
            };
            last_result = Some(result);

            match handoff {
                Some(request) if self.nodes.contains_key(&request.agent) => {
                    tracing::info!(
                        from = %node_id, to = %request.agent, reason = request.reason.as_deref().unwrap_or(""),
                        "swarm: handoff"
                    );
                    let _ = tx
                        .send(MultiAgentStreamEvent::Handoff {
                            from: node_id.clone(),
                            to: request.agent.clone(),
                            reason: request.reason.clone(),
                        })
                        .await;
                    state.node_history.push(node_id.clone());
                    state.current_node_id = request.agent.clone();
                    input = Message {
                        role: neuron_types::Role::User,
                        content: vec![ContentBlock::Text(
                            request.message.unwrap_or(final_text),
                        )],
                    };
                }
                Some(request) => {
                    return Err(SwarmError::NodeNotFound(request.agent));
                }
                None => {
                    break Self::stopped(state, last_result, MultiAgentStopReason::Completed);
                }
            }

            state.iteration += 1;
        };

        if let HookAction::Terminate { reason } =
            self.hooks.dispatch(HookEvent::AfterMultiAgentInvocation).await
        {
            return Err(SwarmError::HookTerminated(reason));
        }
        let _ = tx.send(MultiAgentStreamEvent::Result(Box::new(outcome.clone()))).await;
        Ok(outcome)
    }
}

fn last_assistant_text(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == neuron_types::Role::Assistant)
        .map(|m| {
            m.content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn add_usage(a: &TokenUsage, b: &TokenUsage) -> TokenUsage {
    TokenUsage {
        input_tokens: a.input_tokens + b.input_tokens,
        output_tokens: a.output_tokens + b.output_tokens,
        cache_read_tokens: add_opt(a.cache_read_tokens, b.cache_read_tokens),
        cache_creation_tokens: add_opt(a.cache_creation_tokens, b.cache_creation_tokens),
        reasoning_tokens: add_opt(a.reasoning_tokens, b.reasoning_tokens),
        iterations: None,
    }
}

fn add_opt(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}
