#![deny(missing_docs)]
//! A scripted, in-process [`Provider`] for exercising neuron agents without
//! a network-backed LLM.
//!
//! [`ScriptedProvider`] replays a queue of pre-programmed responses (or
//! streamed event sequences) enqueued by the test author. It speaks no wire
//! format and does no retrying — it exists so the rest of the workspace can
//! be tested end to end without a real provider adapter.

use std::sync::{Arc, Mutex};

use neuron_types::{
    CompletionRequest, CompletionResponse, Provider, ProviderError, StreamEvent, StreamHandle,
};

/// A queued [`Provider`] response: either a single completed response, or a
/// sequence of stream events to replay for `complete_stream`.
///
/// Not `Clone`: [`ProviderError`] can carry a boxed `dyn Error`. Cloning a
/// whole [`ScriptedProvider`] is still cheap — see its own `Clone` impl.
#[derive(Debug)]
pub enum ScriptedResponse {
    /// Returned directly from `complete`. Also used by `complete_stream`
    /// (wrapped in a single [`StreamEvent::MessageComplete`] after the
    /// usage event), so a script written for `complete` works for either
    /// call path.
    Message(CompletionResponse),
    /// Returned from `complete_stream` only; `complete` rejects a call
    /// whose queued entry is this variant.
    Stream(Vec<StreamEvent>),
    /// The provider call fails with this error instead of returning.
    Error(ProviderError),
}

impl From<CompletionResponse> for ScriptedResponse {
    fn from(response: CompletionResponse) -> Self {
        Self::Message(response)
    }
}

/// An in-process [`Provider`] that replays a pre-programmed queue of
/// [`ScriptedResponse`]s, one per call to `complete`/`complete_stream`.
///
/// Calling past the end of the queue is a test-author error and returns
/// [`ProviderError::InvalidRequest`] rather than panicking, so a
/// misconfigured script fails the assertion it was driving instead of
/// aborting the test binary.
///
/// Cheaply cloneable: clones share the same underlying queue, which lets a
/// single script be handed to, say, every node of a swarm while still
/// draining in call order.
#[derive(Clone)]
pub struct ScriptedProvider {
    queue: Arc<Mutex<Vec<ScriptedResponse>>>,
}

impl ScriptedProvider {
    /// Build a provider that replays `responses` in order, oldest first.
    #[must_use]
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(responses.into_iter().collect())),
        }
    }

    /// Convenience constructor for a single-call provider.
    #[must_use]
    pub fn once(response: impl Into<ScriptedResponse>) -> Self {
        Self::new([response.into()])
    }

    fn next(&self) -> Result<ScriptedResponse, ProviderError> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "ScriptedProvider queue exhausted".to_string(),
            ));
        }
        Ok(queue.remove(0))
    }

    /// Remaining, not-yet-consumed entries.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Provider for ScriptedProvider {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        match self.next()? {
            ScriptedResponse::Message(response) => Ok(response),
            ScriptedResponse::Stream(events) => events
                .into_iter()
                .find_map(|event| match event {
                    StreamEvent::MessageComplete(message) => Some(CompletionResponse {
                        id: "scripted".to_string(),
                        model: "scripted".to_string(),
                        message,
                        usage: neuron_types::TokenUsage::default(),
                        stop_reason: neuron_types::StopReason::EndTurn,
                    }),
                    _ => None,
                })
                .ok_or_else(|| {
                    ProviderError::InvalidRequest(
                        "scripted stream has no MessageComplete event".to_string(),
                    )
                }),
            ScriptedResponse::Error(err) => Err(err),
        }
    }

    async fn complete_stream(
        &self,
        _request: CompletionRequest,
    ) -> Result<StreamHandle, ProviderError> {
        let events = match self.next()? {
            ScriptedResponse::Stream(events) => events,
            ScriptedResponse::Message(response) => vec![
                StreamEvent::MessageStart,
                StreamEvent::Usage(response.usage.clone()),
                StreamEvent::MessageComplete(response.message),
            ],
            ScriptedResponse::Error(err) => return Err(err),
        };

        let (tx, rx) = tokio::sync::mpsc::channel(events.len().max(1));
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(StreamHandle::new(rx))
    }
}
