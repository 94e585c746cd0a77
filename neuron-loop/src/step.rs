//! Step-by-step iteration types for the agentic loop.
//!
//! [`StepIterator`] lets you drive the loop one turn at a time, inspect
//! intermediate state, inject messages, and modify the tool registry
//! between turns.

use neuron_tool::ToolRegistry;
use futures::StreamExt;

use neuron_types::{
    CompletionRequest, CompletionResponse, ContentBlock, ContentItem, ContextError, ContextStrategy,
    HookAction, LoopError, Message, Provider, ProviderError, Role, StopReason, StreamError,
    StreamEvent, TokenUsage, ToolContext, ToolOutput,
};

use crate::loop_impl::{
    accumulate_usage, check_request_limit, check_token_limits, check_tool_calls_limit,
    extract_text, fire_after_invocation_hooks, fire_before_invocation_hooks, fire_compaction_hooks,
    fire_loop_iteration_hooks, fire_message_added_hooks, fire_post_llm_hooks, fire_pre_llm_hooks,
    AgentLoop, AgentResult, ToolStepOutcome,
};

/// The result of a single turn in the agentic loop.
#[derive(Debug)]
pub enum TurnResult {
    /// Tool calls were executed and results appended.
    ToolsExecuted {
        /// The tool calls made by the model.
        calls: Vec<(String, String, serde_json::Value)>,
        /// The tool outputs.
        results: Vec<ToolOutput>,
    },
    /// The model returned a final text response.
    FinalResponse(AgentResult),
    /// Context compaction occurred.
    CompactionOccurred {
        /// Token count before compaction.
        old_tokens: usize,
        /// Token count after compaction.
        new_tokens: usize,
    },
    /// The turn limit was reached.
    MaxTurnsReached,
    /// A pre-execution hook suspended a tool call pending a host response.
    Interrupted(AgentResult),
    /// An error occurred.
    Error(LoopError),
}

/// Step-by-step iterator over the agentic loop.
///
/// Allows driving the loop one turn at a time with full control
/// between turns: inspect messages, inject new messages, modify
/// tools.
///
/// Created via [`AgentLoop::run_step`].
pub struct StepIterator<'a, P: Provider, C: ContextStrategy> {
    loop_ref: &'a mut AgentLoop<P, C>,
    tool_ctx: &'a ToolContext,
    total_usage: TokenUsage,
    turns: usize,
    tool_calls_count: usize,
    finished: bool,
    started: bool,
}

impl<'a, P: Provider, C: ContextStrategy> StepIterator<'a, P, C> {
    /// Advance the loop by one turn.
    ///
    /// Returns `None` if the loop has already completed (final response
    /// was returned or an error occurred).
    pub async fn next(&mut self) -> Option<TurnResult> {
        if self.finished {
            return None;
        }

        if !self.started {
            self.started = true;
            if let Err(e) = fire_before_invocation_hooks(&self.loop_ref.hooks).await {
                self.finished = true;
                return Some(TurnResult::Error(e));
            }
            let message = self.loop_ref.messages.last().expect("run_step pushed one");
            if let Err(e) = fire_message_added_hooks(&self.loop_ref.hooks, message).await {
                self.finished = true;
                return Some(TurnResult::Error(e));
            }
        }

        // Check cancellation
        if self.tool_ctx.cancellation_token.is_cancelled() {
            self.finished = true;
            return Some(TurnResult::Error(LoopError::Cancelled));
        }

        // Check max turns
        if let Some(max) = self.loop_ref.config.max_turns
            && self.turns >= max
        {
            self.finished = true;
            return Some(TurnResult::MaxTurnsReached);
        }

        // Check request-count usage limit before making another call.
        if let Err(e) = check_request_limit(self.loop_ref.config.usage_limits.as_ref(), self.turns)
        {
            self.finished = true;
            return Some(TurnResult::Error(e));
        }

        // Fire LoopIteration hooks
        match fire_loop_iteration_hooks(&self.loop_ref.hooks, self.turns).await {
            Ok(Some(HookAction::Terminate { reason })) => {
                self.finished = true;
                return Some(TurnResult::Error(LoopError::HookTerminated(reason)));
            }
            Err(e) => {
                self.finished = true;
                return Some(TurnResult::Error(e));
            }
            _ => {}
        }

        // Proactive, tool-pairing-aware trim (see `AgentLoop::run`'s doc
        // comment on why this runs ahead of the token-budget strategy below).
        if let Err(e) = self
            .loop_ref
            .conversation_manager
            .apply_management(&mut self.loop_ref.messages)
        {
            self.finished = true;
            return Some(TurnResult::Error(e.into()));
        }

        // Check context compaction
        let token_count = self.loop_ref.context.token_estimate(&self.loop_ref.messages);
        if self
            .loop_ref
            .context
            .should_compact(&self.loop_ref.messages, token_count)
        {
            let old_tokens = token_count;
            match self
                .loop_ref
                .context
                .compact(self.loop_ref.messages.clone())
                .await
            {
                Ok(compacted) => {
                    self.loop_ref.messages = compacted;
                    let new_tokens =
                        self.loop_ref.context.token_estimate(&self.loop_ref.messages);

                    // Fire compaction hooks
                    match fire_compaction_hooks(&self.loop_ref.hooks, old_tokens, new_tokens).await
                    {
                        Ok(Some(HookAction::Terminate { reason })) => {
                            self.finished = true;
                            return Some(TurnResult::Error(LoopError::HookTerminated(reason)));
                        }
                        Err(e) => {
                            self.finished = true;
                            return Some(TurnResult::Error(e));
                        }
                        _ => {}
                    }

                    return Some(TurnResult::CompactionOccurred {
                        old_tokens,
                        new_tokens,
                    });
                }
                Err(e) => {
                    self.finished = true;
                    return Some(TurnResult::Error(e.into()));
                }
            }
        }

        // Build completion request
        let request = CompletionRequest {
            model: String::new(),
            messages: self.loop_ref.messages.clone(),
            system: Some(self.loop_ref.config.system_prompt.clone()),
            tools: self.loop_ref.tools.definitions(),
            ..Default::default()
        };

        // Fire PreLlmCall hooks
        match fire_pre_llm_hooks(&self.loop_ref.hooks, &request).await {
            Ok(Some(HookAction::Terminate { reason })) => {
                self.finished = true;
                return Some(TurnResult::Error(LoopError::HookTerminated(reason)));
            }
            Err(e) => {
                self.finished = true;
                return Some(TurnResult::Error(e));
            }
            _ => {}
        }

        // Call provider (via durability if set). One recovery attempt on a
        // context-window-overflow response, same as `AgentLoop::run`.
        let response = match self.loop_ref.call_provider(request.clone()).await {
            Ok(r) => r,
            Err(neuron_types::ProviderError::ContextWindowExceeded(msg)) => {
                if let Err(e) = self.loop_ref.conversation_manager.reduce_context(
                    &mut self.loop_ref.messages,
                    Some(neuron_types::ContextError::WindowOverflow(msg)),
                ) {
                    self.finished = true;
                    return Some(TurnResult::Error(e.into()));
                }
                let retry_request = CompletionRequest {
                    messages: self.loop_ref.messages.clone(),
                    ..request
                };
                match self.loop_ref.call_provider(retry_request).await {
                    Ok(r) => r,
                    Err(e) => {
                        self.finished = true;
                        return Some(TurnResult::Error(e.into()));
                    }
                }
            }
            Err(e) => {
                self.finished = true;
                return Some(TurnResult::Error(e.into()));
            }
        };

        // Fire PostLlmCall hooks
        match fire_post_llm_hooks(&self.loop_ref.hooks, &response).await {
            Ok(Some(HookAction::Terminate { reason })) => {
                self.finished = true;
                return Some(TurnResult::Error(LoopError::HookTerminated(reason)));
            }
            Err(e) => {
                self.finished = true;
                return Some(TurnResult::Error(e));
            }
            _ => {}
        }

        // Accumulate usage
        accumulate_usage(&mut self.total_usage, &response.usage);
        self.turns += 1;
        if let Err(e) = check_token_limits(self.loop_ref.config.usage_limits.as_ref(), &self.total_usage)
        {
            self.finished = true;
            return Some(TurnResult::Error(e));
        }

        // Check for tool calls
        let tool_calls: Vec<_> = response
            .message
            .content
            .iter()
            .filter_map(|block| {
                if let ContentBlock::ToolUse { id, name, input } = block {
                    Some((id.clone(), name.clone(), input.clone()))
                } else {
                    None
                }
            })
            .collect();

        // Append assistant message
        self.loop_ref.messages.push(response.message.clone());
        if let Err(e) = fire_message_added_hooks(
            &self.loop_ref.hooks,
            self.loop_ref.messages.last().expect("just pushed"),
        )
        .await
        {
            self.finished = true;
            return Some(TurnResult::Error(e));
        }

        // Server-side compaction: the provider paused to compact context.
        // Report as a compaction event so the caller can continue stepping.
        if response.stop_reason == StopReason::Compaction {
            return Some(TurnResult::CompactionOccurred {
                old_tokens: 0,
                new_tokens: 0,
            });
        }

        if tool_calls.is_empty() || response.stop_reason == StopReason::EndTurn {
            self.finished = true;
            let response_text = extract_text(&response.message);
            if let Err(e) = fire_after_invocation_hooks(&self.loop_ref.hooks).await {
                return Some(TurnResult::Error(e));
            }
            return Some(TurnResult::FinalResponse(AgentResult {
                response: response_text,
                messages: self.loop_ref.messages.clone(),
                usage: self.total_usage.clone(),
                turns: self.turns,
                stop_reason: response.stop_reason,
                last_message: self.loop_ref.messages.last().cloned(),
                interrupts: self.loop_ref.interrupts.clone(),
            }));
        }

        // Check cumulative tool-call usage limit before dispatching.
        if let Err(e) = check_tool_calls_limit(
            self.loop_ref.config.usage_limits.as_ref(),
            self.tool_calls_count,
            tool_calls.len(),
        ) {
            self.finished = true;
            return Some(TurnResult::Error(e));
        }
        self.tool_calls_count += tool_calls.len();

        // Check cancellation before tool execution
        if self.tool_ctx.cancellation_token.is_cancelled() {
            self.finished = true;
            return Some(TurnResult::Error(LoopError::Cancelled));
        }

        let admissions: Vec<_> = tool_calls
            .iter()
            .map(|(_, tool_name, _)| {
                self.loop_ref
                    .policy_guard
                    .check_and_record(&self.loop_ref.run_policy, tool_name)
            })
            .collect();

        // Execute tool calls (parallel or sequential)
        let mut tool_result_blocks = Vec::new();
        let mut tool_outputs = Vec::new();
        let mut interrupted = None;

        if self.loop_ref.config.parallel_tool_execution && tool_calls.len() > 1 {
            let futs = tool_calls.iter().zip(admissions.iter()).map(
                |((call_id, tool_name, input), admission)| {
                    self.loop_ref
                        .dispatch_tool_call(call_id, tool_name, input, admission, self.tool_ctx)
                },
            );
            let results = futures::future::join_all(futs).await;
            for result in results {
                match result {
                    Ok(ToolStepOutcome::Completed(block)) => {
                        if let ContentBlock::ToolResult { content, is_error, .. } = &block {
                            tool_outputs.push(ToolOutput {
                                content: content.clone(),
                                structured_content: None,
                                is_error: *is_error,
                            });
                        }
                        tool_result_blocks.push(block);
                    }
                    Ok(ToolStepOutcome::Interrupted(interrupt)) => interrupted = Some(interrupt),
                    Err(e) => {
                        self.finished = true;
                        return Some(TurnResult::Error(e));
                    }
                }
            }
        } else {
            for ((call_id, tool_name, input), admission) in tool_calls.iter().zip(admissions.iter())
            {
                match self
                    .loop_ref
                    .dispatch_tool_call(call_id, tool_name, input, admission, self.tool_ctx)
                    .await
                {
                    Ok(ToolStepOutcome::Completed(block)) => {
                        if let ContentBlock::ToolResult { content, is_error, .. } = &block {
                            tool_outputs.push(ToolOutput {
                                content: content.clone(),
                                structured_content: None,
                                is_error: *is_error,
                            });
                        }
                        tool_result_blocks.push(block);
                    }
                    Ok(ToolStepOutcome::Interrupted(interrupt)) => {
                        interrupted = Some(interrupt);
                        break;
                    }
                    Err(e) => {
                        self.finished = true;
                        return Some(TurnResult::Error(e));
                    }
                }
            }
        }

        if let Some(interrupt) = interrupted {
            self.finished = true;
            self.loop_ref.interrupts.insert(interrupt);
            return Some(TurnResult::Interrupted(AgentResult {
                response: String::new(),
                messages: self.loop_ref.messages.clone(),
                usage: self.total_usage.clone(),
                turns: self.turns,
                stop_reason: StopReason::Interrupted,
                last_message: self.loop_ref.messages.last().cloned(),
                interrupts: self.loop_ref.interrupts.clone(),
            }));
        }

        // Append tool results
        self.loop_ref.messages.push(Message {
            role: Role::User,
            content: tool_result_blocks,
        });
        if let Err(e) = fire_message_added_hooks(
            &self.loop_ref.hooks,
            self.loop_ref.messages.last().expect("just pushed"),
        )
        .await
        {
            self.finished = true;
            return Some(TurnResult::Error(e));
        }

        Some(TurnResult::ToolsExecuted {
            calls: tool_calls,
            results: tool_outputs,
        })
    }

    /// Returns a reference to the current messages.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.loop_ref.messages
    }

    /// Inject a message into the conversation between turns.
    pub fn inject_message(&mut self, message: Message) {
        self.loop_ref.messages.push(message);
    }

    /// Returns a mutable reference to the tool registry.
    #[must_use]
    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.loop_ref.tools
    }

    /// Stop driving the loop right where it stands and return its current
    /// state as a result, as if the model had ended its turn here.
    ///
    /// For a caller that recognizes, from a [`TurnResult::ToolsExecuted`]
    /// tool name, that the node should yield control (a swarm handoff, say)
    /// without running the further turns the model would otherwise take.
    #[must_use]
    pub fn finish_now(self) -> AgentResult {
        AgentResult {
            response: String::new(),
            messages: self.loop_ref.messages.clone(),
            usage: self.total_usage,
            turns: self.turns,
            stop_reason: StopReason::ToolUse,
            last_message: self.loop_ref.messages.last().cloned(),
            interrupts: self.loop_ref.interrupts.clone(),
        }
    }
}

impl<P: Provider, C: ContextStrategy> AgentLoop<P, C> {
    /// Create a step-by-step iterator over the loop.
    ///
    /// Unlike [`run`](AgentLoop::run) which drives to completion, this
    /// lets you advance one turn at a time, inspect state, inject messages,
    /// and modify tools between turns.
    ///
    /// The user message is appended immediately. Call
    /// [`StepIterator::next`] to advance.
    #[must_use]
    pub fn run_step<'a>(
        &'a mut self,
        user_message: Message,
        tool_ctx: &'a ToolContext,
    ) -> StepIterator<'a, P, C> {
        self.messages.push(user_message);
        StepIterator {
            loop_ref: self,
            tool_ctx,
            total_usage: TokenUsage::default(),
            turns: 0,
            tool_calls_count: 0,
            finished: false,
            started: false,
        }
    }

    /// Run the loop with streaming, forwarding [`StreamEvent`]s through a channel.
    ///
    /// Spawns the loop body onto a background task and returns immediately
    /// with a receiver and the task's join handle. Drive the receiver to
    /// consume [`StreamEvent`]s as they arrive; await the join handle for
    /// the terminal [`AgentResult`] once the receiver is drained (or to
    /// observe why the loop ended if you don't need every event).
    ///
    /// Uses `provider.complete_stream()` instead of `provider.complete()` for
    /// each LLM turn. When durability is set, falls back to
    /// `DurableContext::execute_llm_call` (full response) and synthesizes
    /// stream events from the result.
    ///
    /// Tool execution is handled identically to [`run`](AgentLoop::run):
    /// parallel dispatch when `config.parallel_tool_execution` is set, and
    /// one context-window-overflow recovery attempt via the conversation
    /// manager before a provider error is fatal. Fires the same hook events
    /// as `run()`: `LoopIteration`, `PreLlmCall`, `PostLlmCall`,
    /// `PreToolExecution`, `PostToolExecution`, and `ContextCompaction`.
    ///
    /// # Errors
    ///
    /// The join handle resolves to the same errors [`run`](AgentLoop::run)
    /// can return. A matching `StreamEvent::Error` is also sent on the
    /// channel before the task ends, so a caller only watching the stream
    /// still observes the failure.
    pub fn run_stream(
        mut self,
        user_message: Message,
        tool_ctx: ToolContext,
    ) -> (
        tokio::sync::mpsc::Receiver<StreamEvent>,
        tokio::task::JoinHandle<Result<AgentResult, LoopError>>,
    )
    where
        P: 'static,
        C: 'static,
    {
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let handle = tokio::spawn(async move { self.drive_stream(user_message, tool_ctx, tx).await });
        (rx, handle)
    }

    /// The loop body driven by [`Self::run_stream`] on its spawned task.
    async fn drive_stream(
        &mut self,
        user_message: Message,
        tool_ctx: ToolContext,
        tx: tokio::sync::mpsc::Sender<StreamEvent>,
    ) -> Result<AgentResult, LoopError> {
        if let Some(HookAction::Terminate { reason }) =
            fire_before_invocation_hooks(&self.hooks).await?
        {
            return fail_stream(&tx, LoopError::HookTerminated(reason)).await;
        }
        self.messages.push(user_message);
        fire_message_added_hooks(&self.hooks, self.messages.last().expect("just pushed")).await?;

        let mut total_usage = TokenUsage::default();
        let mut turns: usize = 0;
        let mut tool_calls_count: usize = 0;

        loop {
            // Check cancellation
            if tool_ctx.cancellation_token.is_cancelled() {
                return fail_stream(&tx, LoopError::Cancelled).await;
            }

            // Check max turns
            if let Some(max) = self.config.max_turns
                && turns >= max
            {
                return fail_stream(&tx, LoopError::MaxTurns(max)).await;
            }

            // Check request-count usage limit before making another call.
            if let Err(e) = check_request_limit(self.config.usage_limits.as_ref(), turns) {
                return fail_stream(&tx, e).await;
            }

            // Fire LoopIteration hooks
            if let Some(HookAction::Terminate { reason }) =
                fire_loop_iteration_hooks(&self.hooks, turns).await?
            {
                return fail_stream(&tx, LoopError::HookTerminated(reason)).await;
            }

            // Proactive, tool-pairing-aware trim (see `AgentLoop::run`).
            self.conversation_manager.apply_management(&mut self.messages)?;

            // Check context compaction
            let token_count = self.context.token_estimate(&self.messages);
            if self.context.should_compact(&self.messages, token_count) {
                let old_tokens = token_count;
                match self.context.compact(self.messages.clone()).await {
                    Ok(compacted) => self.messages = compacted,
                    Err(e) => {
                        let _ = tx
                            .send(StreamEvent::Error(StreamError::non_retryable(format!(
                                "compaction error: {e}"
                            ))))
                            .await;
                        return Err(e.into());
                    }
                }
                let new_tokens = self.context.token_estimate(&self.messages);

                // Fire ContextCompaction hooks
                if let Some(HookAction::Terminate { reason }) =
                    fire_compaction_hooks(&self.hooks, old_tokens, new_tokens).await?
                {
                    return fail_stream(&tx, LoopError::HookTerminated(reason)).await;
                }
            }

            // Build completion request
            let request = CompletionRequest {
                model: String::new(),
                messages: self.messages.clone(),
                system: Some(self.config.system_prompt.clone()),
                tools: self.tools.definitions(),
                ..Default::default()
            };

            // Fire PreLlmCall hooks
            if let Some(HookAction::Terminate { reason }) =
                fire_pre_llm_hooks(&self.hooks, &request).await?
            {
                return fail_stream(&tx, LoopError::HookTerminated(reason)).await;
            }

            // Call provider: durable path uses call_provider() with
            // synthesized events, non-durable path uses complete_stream()
            // for real streaming. Either way, one retry on a
            // context-window-overflow error, same as `run()`.
            let message = if self.durability.is_some() {
                let response = match self.call_provider(request.clone()).await {
                    Ok(response) => response,
                    Err(ProviderError::ContextWindowExceeded(msg)) => {
                        if let Err(e) = self.conversation_manager.reduce_context(
                            &mut self.messages,
                            Some(ContextError::WindowOverflow(msg)),
                        ) {
                            return fail_stream(&tx, e.into()).await;
                        }
                        let retry_request = CompletionRequest {
                            messages: self.messages.clone(),
                            ..request
                        };
                        match self.call_provider(retry_request).await {
                            Ok(r) => r,
                            Err(e) => return fail_stream(&tx, e.into()).await,
                        }
                    }
                    Err(e) => return fail_stream(&tx, e.into()).await,
                };

                // Synthesize stream events from the durable response
                for block in &response.message.content {
                    if let ContentBlock::Text(text) = block
                        && tx.send(StreamEvent::TextDelta(text.clone())).await.is_err()
                    {
                        return Err(LoopError::Cancelled);
                    }
                }
                if tx.send(StreamEvent::Usage(response.usage.clone())).await.is_err() {
                    return Err(LoopError::Cancelled);
                }
                if tx
                    .send(StreamEvent::MessageComplete(response.message.clone()))
                    .await
                    .is_err()
                {
                    return Err(LoopError::Cancelled);
                }

                // Fire PostLlmCall hooks
                if let Some(HookAction::Terminate { reason }) =
                    fire_post_llm_hooks(&self.hooks, &response).await?
                {
                    return fail_stream(&tx, LoopError::HookTerminated(reason)).await;
                }

                accumulate_usage(&mut total_usage, &response.usage);
                response.message
            } else {
                let stream_handle = match self.provider.complete_stream(request.clone()).await {
                    Ok(h) => h,
                    Err(ProviderError::ContextWindowExceeded(msg)) => {
                        if let Err(e) = self.conversation_manager.reduce_context(
                            &mut self.messages,
                            Some(ContextError::WindowOverflow(msg)),
                        ) {
                            return fail_stream(&tx, e.into()).await;
                        }
                        let retry_request = CompletionRequest {
                            messages: self.messages.clone(),
                            ..request
                        };
                        match self.provider.complete_stream(retry_request).await {
                            Ok(h) => h,
                            Err(e) => return fail_stream(&tx, e.into()).await,
                        }
                    }
                    Err(e) => return fail_stream(&tx, e.into()).await,
                };

                // Forward all stream events to the channel, collect the assembled message
                let mut assembled_message: Option<Message> = None;
                let mut assembled_usage: Option<TokenUsage> = None;
                let mut stream = stream_handle.receiver;

                while let Some(event) = stream.next().await {
                    match &event {
                        StreamEvent::MessageComplete(msg) => {
                            assembled_message = Some(msg.clone());
                        }
                        StreamEvent::Usage(u) => {
                            assembled_usage = Some(u.clone());
                        }
                        _ => {}
                    }
                    if tx.send(event).await.is_err() {
                        return Err(LoopError::Cancelled);
                    }
                }

                let msg = match assembled_message {
                    Some(m) => m,
                    None => {
                        return fail_stream(
                            &tx,
                            LoopError::Provider(ProviderError::StreamError(
                                "stream ended without MessageComplete".to_string(),
                            )),
                        )
                        .await;
                    }
                };

                // Fire PostLlmCall hooks with the assembled response
                let usage = assembled_usage.unwrap_or_default();
                let resp = CompletionResponse {
                    id: String::new(),
                    model: String::new(),
                    message: msg.clone(),
                    usage: usage.clone(),
                    stop_reason: StopReason::EndTurn,
                };
                if let Some(HookAction::Terminate { reason }) =
                    fire_post_llm_hooks(&self.hooks, &resp).await?
                {
                    return fail_stream(&tx, LoopError::HookTerminated(reason)).await;
                }

                accumulate_usage(&mut total_usage, &usage);
                msg
            };

            turns += 1;
            if let Err(e) = check_token_limits(self.config.usage_limits.as_ref(), &total_usage) {
                return fail_stream(&tx, e).await;
            }

            // Check for tool calls
            let tool_calls: Vec<_> = message
                .content
                .iter()
                .filter_map(|block| {
                    if let ContentBlock::ToolUse { id, name, input } = block {
                        Some((id.clone(), name.clone(), input.clone()))
                    } else {
                        None
                    }
                })
                .collect();

            self.messages.push(message.clone());
            fire_message_added_hooks(&self.hooks, self.messages.last().expect("just pushed")).await?;

            if tool_calls.is_empty() {
                // Done — final response was already streamed
                let response_text = extract_text(&message);
                fire_after_invocation_hooks(&self.hooks).await?;
                return Ok(AgentResult {
                    response: response_text,
                    messages: self.messages.clone(),
                    usage: total_usage,
                    turns,
                    stop_reason: StopReason::EndTurn,
                    last_message: self.messages.last().cloned(),
                    interrupts: self.interrupts.clone(),
                });
            }

            // Check cumulative tool-call usage limit before dispatching.
            if let Err(e) =
                check_tool_calls_limit(self.config.usage_limits.as_ref(), tool_calls_count, tool_calls.len())
            {
                return fail_stream(&tx, e).await;
            }
            tool_calls_count += tool_calls.len();

            // Check cancellation before tool execution
            if tool_ctx.cancellation_token.is_cancelled() {
                return fail_stream(&tx, LoopError::Cancelled).await;
            }

            let admissions: Vec<_> = tool_calls
                .iter()
                .map(|(_, tool_name, _)| {
                    self.policy_guard.check_and_record(&self.run_policy, tool_name)
                })
                .collect();

            // Execute tool calls (parallel or sequential), matching `run()`.
            let outcomes = if self.config.parallel_tool_execution && tool_calls.len() > 1 {
                let futs = tool_calls.iter().zip(admissions.iter()).map(
                    |((call_id, tool_name, input), admission)| {
                        self.dispatch_tool_call(call_id, tool_name, input, admission, &tool_ctx)
                    },
                );
                let results = futures::future::join_all(futs).await;
                match results.into_iter().collect::<Result<Vec<_>, _>>() {
                    Ok(outcomes) => outcomes,
                    Err(e) => return fail_stream(&tx, e).await,
                }
            } else {
                let mut outcomes = Vec::new();
                for ((call_id, tool_name, input), admission) in
                    tool_calls.iter().zip(admissions.iter())
                {
                    match self
                        .dispatch_tool_call(call_id, tool_name, input, admission, &tool_ctx)
                        .await
                    {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(e) => return fail_stream(&tx, e).await,
                    }
                }
                outcomes
            };

            if let Some(interrupt) = outcomes.iter().find_map(|o| match o {
                ToolStepOutcome::Interrupted(i) => Some(i.clone()),
                ToolStepOutcome::Completed(_) => None,
            }) {
                self.interrupts.insert(interrupt);
                fire_after_invocation_hooks(&self.hooks).await?;
                return Ok(AgentResult {
                    response: String::new(),
                    messages: self.messages.clone(),
                    usage: total_usage,
                    turns,
                    stop_reason: StopReason::Interrupted,
                    last_message: self.messages.last().cloned(),
                    interrupts: self.interrupts.clone(),
                });
            }

            let tool_result_blocks: Vec<ContentBlock> = outcomes
                .into_iter()
                .map(|o| match o {
                    ToolStepOutcome::Completed(block) => block,
                    ToolStepOutcome::Interrupted(_) => unreachable!("checked above"),
                })
                .collect();

            self.messages.push(Message {
                role: Role::User,
                content: tool_result_blocks,
            });
            fire_message_added_hooks(&self.hooks, self.messages.last().expect("just pushed")).await?;
        }
    }
}

/// Send a [`StreamEvent::Error`] mirroring `err`, then return it.
///
/// Lets `drive_stream` report a failure on the channel and as the task's
/// terminal `Result` in one call, so a caller watching only one of the two
/// still learns why the loop stopped.
async fn fail_stream(
    tx: &tokio::sync::mpsc::Sender<StreamEvent>,
    err: LoopError,
) -> Result<AgentResult, LoopError> {
    let message = err.to_string();
    let _ = tx.send(StreamEvent::Error(StreamError::non_retryable(message))).await;
    Err(err)
}
