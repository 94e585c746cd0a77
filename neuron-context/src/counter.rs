//! Cheap token estimation shared by every compaction strategy.
//!
//! None of these strategies need an exact tokenizer count — they only need
//! a monotonic, fast proxy to decide "are we over budget". A fixed
//! chars-per-token ratio, with a flat per-message overhead for role and
//! formatting, is accurate enough for that decision and costs nothing to
//! compute on every cycle.

use neuron_types::{ContentBlock, ContentItem, Message};

/// Estimates token counts for messages using a configurable chars-per-token
/// ratio.
#[derive(Debug, Clone, Copy)]
pub struct TokenCounter {
    chars_per_token: usize,
}

impl TokenCounter {
    /// Create a counter using the default ratio (4 chars per token).
    #[must_use]
    pub fn new() -> Self {
        Self { chars_per_token: 4 }
    }

    /// Create a counter with a custom chars-per-token ratio (minimum 1).
    #[must_use]
    pub fn with_ratio(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    /// Estimate the token count of a single message.
    #[must_use]
    pub fn estimate_message(&self, message: &Message) -> usize {
        let content_tokens: usize = message
            .content
            .iter()
            .map(|block| self.estimate_block(block))
            .sum();
        content_tokens + 4
    }

    /// Estimate the total token count across a message history.
    #[must_use]
    pub fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }

    fn estimate_block(&self, block: &ContentBlock) -> usize {
        match block {
            ContentBlock::Text(text) => text.len() / self.chars_per_token,
            ContentBlock::Thinking { thinking, .. } => thinking.len() / self.chars_per_token,
            ContentBlock::RedactedThinking { data } => data.len() / self.chars_per_token,
            ContentBlock::ToolUse { input, .. } => input.to_string().len() / self.chars_per_token,
            ContentBlock::ToolResult { content, .. } => content
                .iter()
                .map(|item| self.estimate_content_item(item))
                .sum(),
            ContentBlock::Image { .. } | ContentBlock::Video { .. } => 1000,
            ContentBlock::Document { .. } => 1000,
            ContentBlock::Compaction { content } => content.len() / self.chars_per_token,
            ContentBlock::GuardContent { text } => text.len() / self.chars_per_token,
            ContentBlock::Json { value } => value.to_string().len() / self.chars_per_token,
            ContentBlock::CachePoint { .. } => 0,
        }
    }

    fn estimate_content_item(&self, item: &ContentItem) -> usize {
        match item {
            ContentItem::Text(text) => text.len() / self.chars_per_token,
            ContentItem::Image { .. } => 1000,
        }
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}
