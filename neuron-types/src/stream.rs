//! Normalized model-provider streaming events.
//!
//! Every [`Provider`](crate::Provider) implementation, regardless of the
//! wire format of the backend it talks to, emits the same event shape here.
//! The agent loop consumes these without knowing which concrete provider
//! produced them.

use tokio::sync::mpsc;

use crate::types::{Message, TokenUsage, ToolOutput};

/// A live stream of [`StreamEvent`]s from a single completion call.
///
/// Returned by [`Provider::complete_stream`](crate::Provider::complete_stream).
/// The loop drains `receiver` until it closes, forwarding each event to its
/// own consumer and assembling the final message from the
/// [`StreamEvent::MessageComplete`] terminal event.
pub struct StreamHandle {
    /// The channel the provider's background task feeds.
    pub receiver: mpsc::Receiver<StreamEvent>,
}

impl StreamHandle {
    /// Wrap an existing receiver.
    #[must_use]
    pub fn new(receiver: mpsc::Receiver<StreamEvent>) -> Self {
        Self { receiver }
    }
}

/// A single normalized event from a streaming completion.
///
/// Maps onto the provider wire contract's `ModelMessageStart`,
/// `ModelContentBlockStart/Delta/Stop`, `ModelMessageStop`, and
/// `ModelMetadata` events, collapsed to the granularity the loop actually
/// needs to drive its state machine and forward to callers.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum StreamEvent {
    /// The provider started a new assistant message.
    MessageStart,
    /// The provider started a new content block at the given index.
    ContentBlockStart {
        /// Index of the content block within the message.
        index: usize,
    },
    /// Incremental text delta for a text content block.
    TextDelta(String),
    /// Incremental delta for a tool-use input (partial JSON string).
    ToolUseInputDelta {
        /// Index of the content block this delta belongs to.
        index: usize,
        /// The partial JSON fragment.
        partial_json: String,
    },
    /// Incremental delta for extended-thinking content.
    ReasoningDelta {
        /// Incremental reasoning text, if any.
        text: Option<String>,
        /// Incremental cryptographic signature fragment, if any.
        signature: Option<String>,
    },
    /// The provider finished a content block at the given index.
    ContentBlockStop {
        /// Index of the content block that finished.
        index: usize,
    },
    /// Usage accounting for this completion, sent once near the end.
    Usage(TokenUsage),
    /// The fully assembled assistant message (terminal event on success).
    MessageComplete(Message),
    /// The stream ended with an error.
    Error(StreamError),
}

/// A live stream of events from a single tool invocation.
///
/// Returned by [`crate::ToolDyn::call_dyn_stream`]. Mirrors [`StreamHandle`]:
/// the loop drains `receiver` until it closes, forwarding each
/// [`ToolStreamEvent::Progress`] to its own consumer and capturing the tool's
/// result from the terminal [`ToolStreamEvent::Complete`] event.
pub struct ToolStreamHandle {
    /// The channel the tool's own execution feeds.
    pub receiver: mpsc::Receiver<ToolStreamEvent>,
}

impl ToolStreamHandle {
    /// Wrap an existing receiver.
    #[must_use]
    pub fn new(receiver: mpsc::Receiver<ToolStreamEvent>) -> Self {
        Self { receiver }
    }
}

/// A single event from a streaming tool invocation.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ToolStreamEvent {
    /// An intermediate JSON event the tool chose to surface mid-execution
    /// (e.g. partial stdout from a long-running shell command).
    Progress(serde_json::Value),
    /// The tool finished. Always the last event on the channel.
    Complete(ToolOutput),
}

/// An error encountered while consuming a provider stream.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct StreamError {
    /// Human-readable error message.
    pub message: String,
    /// Whether retrying the same request might succeed.
    pub retryable: bool,
}

impl StreamError {
    /// Construct a retryable stream error.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Construct a non-retryable (terminal) stream error.
    #[must_use]
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}
