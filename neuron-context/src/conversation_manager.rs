//! Conversation history trimming, distinct from [`crate::strategies`]'s
//! generic token-budget [`neuron_types::ContextStrategy`] implementations.
//!
//! A [`ConversationManager`] is driven by the loop itself (once per cycle,
//! via `apply_management`, and again on an explicit context-overflow error,
//! via `reduce_context`) rather than by a token estimate the caller supplies.
//! Its algorithm is tool-pairing aware: it never trims a `toolUse` message
//! away from its matching `toolResult`, which a generic strategy has no way
//! to know about.

use neuron_types::{ContentBlock, ContentItem, ContextError, ConversationManagerState, Message};

const TRUNCATED_SENTINEL: &str = "The tool result was too large!";

fn message_has_tool_result(message: &Message) -> bool {
    message
        .content
        .iter()
        .any(|block| matches!(block, ContentBlock::ToolResult { .. }))
}

fn message_has_tool_use(message: &Message) -> bool {
    message
        .content
        .iter()
        .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
}

fn is_already_truncated(content: &[ContentItem], is_error: bool) -> bool {
    is_error
        && content.len() == 1
        && matches!(&content[0], ContentItem::Text(text) if text == TRUNCATED_SENTINEL)
}

fn truncate_tool_results_in_message(message: &mut Message) -> bool {
    let mut changed = false;
    for block in &mut message.content {
        if let ContentBlock::ToolResult {
            content, is_error, ..
        } = block
        {
            *content = vec![ContentItem::Text(TRUNCATED_SENTINEL.to_string())];
            *is_error = true;
            changed = true;
        }
    }
    changed
}

/// Drives conversation history trimming for one agent.
pub trait ConversationManager: Send + Sync {
    /// The window size above which `apply_management` trims proactively.
    fn window_size(&self) -> usize;

    /// Number of messages removed by trimming so far.
    fn removed_message_count(&self) -> usize;

    /// The manager's serializable state, for inclusion in a snapshot.
    fn state(&self) -> ConversationManagerState;

    /// Restore state from a loaded snapshot.
    fn restore_state(&mut self, state: ConversationManagerState);

    /// Called once per loop cycle. No-ops if history is within budget;
    /// otherwise delegates to [`Self::reduce_context`].
    fn apply_management(&mut self, messages: &mut Vec<Message>) -> Result<(), ContextError> {
        if messages.len() <= self.window_size() {
            return Ok(());
        }
        self.reduce_context(messages, None)
    }

    /// Called on an explicit context-overflow error from the provider, or
    /// internally by [`Self::apply_management`]. Implementations should
    /// prefer the cheapest fix (truncating a stale tool result) before
    /// resorting to dropping messages outright.
    fn reduce_context(
        &mut self,
        messages: &mut Vec<Message>,
        error: Option<ContextError>,
    ) -> Result<(), ContextError>;
}

/// The default [`ConversationManager`]: truncates oversized tool results
/// before trimming, and never splits a `toolUse`/`toolResult` pair.
pub struct SlidingWindowConversationManager {
    window_size: usize,
    should_truncate_results: bool,
    removed_message_count: usize,
}

impl SlidingWindowConversationManager {
    /// Create a manager with the given window size and truncate-first
    /// behavior enabled.
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            should_truncate_results: true,
            removed_message_count: 0,
        }
    }

    /// Disable the truncate-first step, going straight to trimming.
    #[must_use]
    pub fn without_truncation(mut self) -> Self {
        self.should_truncate_results = false;
        self
    }

    fn try_truncate_newest_result(&self, messages: &mut [Message]) -> bool {
        for message in messages.iter_mut().rev() {
            let has_untruncated = message.content.iter().any(|block| match block {
                ContentBlock::ToolResult {
                    content, is_error, ..
                } => !is_already_truncated(content, *is_error),
                _ => false,
            });
            if has_untruncated {
                return truncate_tool_results_in_message(message);
            }
        }
        false
    }
}

impl ConversationManager for SlidingWindowConversationManager {
    fn window_size(&self) -> usize {
        self.window_size
    }

    fn removed_message_count(&self) -> usize {
        self.removed_message_count
    }

    fn state(&self) -> ConversationManagerState {
        ConversationManagerState {
            removed_message_count: self.removed_message_count,
        }
    }

    fn restore_state(&mut self, state: ConversationManagerState) {
        self.removed_message_count = state.removed_message_count;
    }

    fn reduce_context(
        &mut self,
        messages: &mut Vec<Message>,
        error: Option<ContextError>,
    ) -> Result<(), ContextError> {
        if self.should_truncate_results && self.try_truncate_newest_result(messages) {
            return Ok(());
        }

        let mut trim_index = messages.len().saturating_sub(self.window_size).max(2);
        loop {
            if trim_index >= messages.len() {
                return Err(error.unwrap_or_else(|| {
                    ContextError::WindowOverflow(
                        "no safe trim point found in conversation history".to_string(),
                    )
                }));
            }
            let at = &messages[trim_index];
            let blocks_pairing = message_has_tool_result(at)
                || (message_has_tool_use(at)
                    && !messages
                        .get(trim_index + 1)
                        .map(message_has_tool_result)
                        .unwrap_or(false));
            if blocks_pairing {
                trim_index += 1;
                continue;
            }
            break;
        }

        messages.drain(0..trim_index);
        self.removed_message_count += trim_index;
        Ok(())
    }
}

/// A manager that never trims and always fails on overflow — for callers
/// that want context overflow to be a hard, unrecoverable error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConversationManager;

impl ConversationManager for NullConversationManager {
    fn window_size(&self) -> usize {
        usize::MAX
    }

    fn removed_message_count(&self) -> usize {
        0
    }

    fn state(&self) -> ConversationManagerState {
        ConversationManagerState::default()
    }

    fn restore_state(&mut self, _state: ConversationManagerState) {}

    fn reduce_context(
        &mut self,
        _messages: &mut Vec<Message>,
        error: Option<ContextError>,
    ) -> Result<(), ContextError> {
        Err(error.unwrap_or_else(|| {
            ContextError::WindowOverflow("conversation manager is disabled".to_string())
        }))
    }
}
