#![deny(missing_docs)]
//! Hook pipeline dispatch and human-in-the-loop interrupt support for neuron.
//!
//! The [`HookRegistry`] collects multiple [`ObservabilityHook`] implementations
//! into an ordered pipeline. "Before"-type events (`BeforeInvocation`,
//! `PreLlmCall`, `PreToolExecution`, ...) dispatch in registration order;
//! "after"-type events (`AfterInvocation`, `PostLlmCall`, `PostToolExecution`)
//! dispatch in *reverse* registration order, mirroring how middleware stacks
//! unwind. The pipeline short-circuits on any non-`Continue` action; hook
//! errors are logged and treated as `Continue` so one misbehaving observer
//! can't wedge the loop.

use std::sync::Arc;

use neuron_types::{HookAction, HookEvent, Interrupt, InterruptState, ObservabilityHook};

/// Whether `event` dispatches in reverse registration order.
fn is_after_event(event: &HookEvent<'_>) -> bool {
    matches!(
        event,
        HookEvent::AfterInvocation
            | HookEvent::PostLlmCall { .. }
            | HookEvent::PostToolExecution { .. }
            | HookEvent::AfterMultiAgentInvocation
            | HookEvent::AfterNodeCall { .. }
    )
}

/// An ordered pipeline of [`ObservabilityHook`]s.
pub struct HookRegistry {
    hooks: Vec<Arc<dyn ObservabilityHook>>,
}

impl HookRegistry {
    /// Create a new empty hook registry.
    #[must_use]
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add a hook to the end of the registration order.
    ///
    /// Registration order is what "before" events dispatch in directly, and
    /// what "after" events dispatch in reverse.
    pub fn add(&mut self, hook: Arc<dyn ObservabilityHook>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Dispatch an event through the pipeline, in the order appropriate for
    /// that event kind (see module docs), short-circuiting on the first
    /// non-`Continue` action. Hook errors are logged via `tracing` and
    /// treated as `Continue`.
    pub async fn dispatch(&self, event: HookEvent<'_>) -> HookAction {
        if is_after_event(&event) {
            for hook in self.hooks.iter().rev() {
                match hook.on_event(event).await {
                    Ok(HookAction::Continue) => continue,
                    Ok(action) => return action,
                    Err(err) => {
                        tracing::warn!(error = %err, "hook failed, continuing");
                        continue;
                    }
                }
            }
        } else {
            for hook in &self.hooks {
                match hook.on_event(event).await {
                    Ok(HookAction::Continue) => continue,
                    Ok(action) => return action,
                    Err(err) => {
                        tracing::warn!(error = %err, "hook failed, continuing");
                        continue;
                    }
                }
            }
        }
        HookAction::Continue
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The result of checking/raising an interrupt at a given call site.
#[derive(Debug, Clone)]
pub enum InterruptOutcome {
    /// The interrupt was already resolved; here is the host's response.
    Resolved(serde_json::Value),
    /// The interrupt is newly raised or still unresolved; the invocation
    /// should suspend.
    Pending(Interrupt),
}

/// Check or raise a human-in-the-loop interrupt from within a hook callback.
///
/// Computes the interrupt's deterministic id from `schema_version`,
/// `site_tag`, `context_hash`, and `name` (see
/// [`neuron_types::compute_interrupt_id`]). If an interrupt with that id is
/// already recorded in `state` and has a response, returns
/// [`InterruptOutcome::Resolved`]. Otherwise records (if not already present)
/// and returns [`InterruptOutcome::Pending`], which the caller should convert
/// to [`HookAction::Interrupt`] to suspend the invocation.
pub fn interrupt(
    state: &mut InterruptState,
    schema_version: u32,
    site_tag: &str,
    context_hash: &str,
    name: &str,
    reason: impl Into<String>,
) -> InterruptOutcome {
    let id = neuron_types::compute_interrupt_id(schema_version, site_tag, context_hash, name);
    if let Some(existing) = state.get(&id) {
        if let Some(response) = &existing.response {
            return InterruptOutcome::Resolved(response.clone());
        }
        return InterruptOutcome::Pending(existing.clone());
    }
    let interrupt = Interrupt {
        id,
        name: name.to_string(),
        reason: reason.into(),
        response: None,
    };
    state.insert(interrupt.clone());
    InterruptOutcome::Pending(interrupt)
}
