//! Data model shared by the hook pipeline, swarm orchestrator, and
//! snapshot/session subsystem: interrupts, run policy, and snapshots.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A suspended human-in-the-loop request raised by a hook callback.
///
/// `id` is deterministic — computed from a schema version, a site tag
/// (identifying the kind of call site, e.g. `"tool_call"`), a stable
/// context hash (e.g. a `toolUseId`), and the callback-supplied `name` —
/// so that resuming the same invocation with the same inputs reproduces
/// the same id. See [`compute_interrupt_id`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interrupt {
    /// Deterministic identifier, stable across suspend/resume.
    pub id: String,
    /// The callback-supplied name distinguishing this interrupt site.
    pub name: String,
    /// Human-readable reason shown to the host/operator.
    pub reason: String,
    /// The host-supplied response, filled in before resume.
    pub response: Option<serde_json::Value>,
}

/// Compute a deterministic interrupt id.
///
/// Shape: `v{schema_version}:{site_tag}:{context_hash}:{name_hash}`, where
/// `name_hash` is a UUIDv5 of `name` in a fixed private namespace so the
/// same `(site_tag, context_hash, name)` tuple always yields the same id.
#[must_use]
pub fn compute_interrupt_id(
    schema_version: u32,
    site_tag: &str,
    context_hash: &str,
    name: &str,
) -> String {
    const NAMESPACE: Uuid = Uuid::from_bytes([
        0x6e, 0x65, 0x75, 0x72, 0x6f, 0x6e, 0x2d, 0x69, 0x6e, 0x74, 0x65, 0x72, 0x72, 0x75, 0x70,
        0x74,
    ]);
    let name_hash = Uuid::new_v5(&NAMESPACE, name.as_bytes());
    format!("v{schema_version}:{site_tag}:{context_hash}:{name_hash}")
}

/// A map of interrupt id to [`Interrupt`], owned by one agent or swarm and
/// persisted across snapshot/restore.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterruptState {
    interrupts: HashMap<String, Interrupt>,
}

impl InterruptState {
    /// An empty interrupt state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an interrupt by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Interrupt> {
        self.interrupts.get(id)
    }

    /// Record a newly raised (unresolved) interrupt.
    pub fn insert(&mut self, interrupt: Interrupt) {
        self.interrupts.insert(interrupt.id.clone(), interrupt);
    }

    /// Fill in the host-supplied response for an existing interrupt,
    /// returning `false` if no interrupt with that id is known.
    pub fn set_response(&mut self, id: &str, response: serde_json::Value) -> bool {
        match self.interrupts.get_mut(id) {
            Some(interrupt) => {
                interrupt.response = Some(response);
                true
            }
            None => false,
        }
    }

    /// Number of known interrupts (resolved or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.interrupts.len()
    }

    /// Whether no interrupts have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interrupts.is_empty()
    }

    /// Iterate over all known interrupts.
    pub fn values(&self) -> impl Iterator<Item = &Interrupt> {
        self.interrupts.values()
    }
}

/// Per-invocation, immutable tool-use quota policy.
#[derive(Debug, Clone, Default)]
pub struct RunPolicy {
    /// Maximum total tool uses across the whole invocation, if any.
    pub max_total_tool_uses: Option<usize>,
    /// Per-tool-name override limits.
    pub per_tool_limits: HashMap<String, usize>,
    /// Default per-tool limit applied when no override is present.
    pub default_per_tool_limit: Option<usize>,
    /// Tool names that may never be invoked under this policy.
    pub blocked_tools: HashSet<String>,
}

impl RunPolicy {
    /// An unrestricted policy (no quotas, nothing blocked).
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Set the aggregate tool-use cap.
    #[must_use]
    pub fn with_max_total_tool_uses(mut self, max: usize) -> Self {
        self.max_total_tool_uses = Some(max);
        self
    }

    /// Set a per-tool override limit.
    #[must_use]
    pub fn with_tool_limit(mut self, tool_name: impl Into<String>, limit: usize) -> Self {
        self.per_tool_limits.insert(tool_name.into(), limit);
        self
    }

    /// Set the default per-tool limit.
    #[must_use]
    pub fn with_default_per_tool_limit(mut self, limit: usize) -> Self {
        self.default_per_tool_limit = Some(limit);
        self
    }

    /// Block a tool name outright.
    #[must_use]
    pub fn with_blocked_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.blocked_tools.insert(tool_name.into());
        self
    }

    /// The effective limit for a given tool name, if any.
    #[must_use]
    pub fn limit_for(&self, tool_name: &str) -> Option<usize> {
        self.per_tool_limits
            .get(tool_name)
            .copied()
            .or(self.default_per_tool_limit)
    }
}

/// Tracks per-tool and aggregate call counts during one invocation, enforced
/// against a [`RunPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RunPolicyGuard {
    total: usize,
    per_tool: HashMap<String, usize>,
}

/// Why a tool call was rejected by run policy before it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRejection {
    /// The tool name is on the blocked list.
    Blocked,
    /// The per-tool call count would exceed its limit.
    PerToolLimitExceeded,
    /// The aggregate call count would exceed `maxTotalToolUses`.
    AggregateLimitExceeded,
}

impl RunPolicyGuard {
    /// A fresh guard with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `tool_name` may run under `policy`, and if so, record
    /// the call by incrementing counters.
    pub fn check_and_record(
        &mut self,
        policy: &RunPolicy,
        tool_name: &str,
    ) -> Result<(), PolicyRejection> {
        if policy.blocked_tools.contains(tool_name) {
            return Err(PolicyRejection::Blocked);
        }
        if let Some(limit) = policy.limit_for(tool_name) {
            let count = self.per_tool.get(tool_name).copied().unwrap_or(0);
            if count >= limit {
                return Err(PolicyRejection::PerToolLimitExceeded);
            }
        }
        if let Some(max_total) = policy.max_total_tool_uses
            && self.total >= max_total
        {
            return Err(PolicyRejection::AggregateLimitExceeded);
        }
        self.total += 1;
        *self.per_tool.entry(tool_name.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

// --- Snapshot / session ---

/// Which kind of scope a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotScope {
    /// A single agent's state.
    Agent,
    /// A swarm's (multi-agent) state.
    MultiAgent,
}

/// Selectable fields of a [`Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotField {
    /// The message history.
    Messages,
    /// The free-form state bag.
    State,
    /// The system prompt.
    SystemPrompt,
    /// The conversation manager's serializable state.
    ConversationManagerState,
}

impl SnapshotField {
    /// All selectable fields, in a stable order — used by `preset: "session"`.
    #[must_use]
    pub fn all() -> [SnapshotField; 4] {
        [
            SnapshotField::Messages,
            SnapshotField::State,
            SnapshotField::SystemPrompt,
            SnapshotField::ConversationManagerState,
        ]
    }
}

/// Field-selection options for [`crate::SnapshotSource::take_snapshot`]-style
/// operations (implemented concretely in `neuron-runtime::session`).
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    /// Shortcut for "all known fields" (`preset: "session"`).
    pub all_fields: bool,
    /// Explicit include list (ignored if `all_fields` is set).
    pub include: Vec<SnapshotField>,
    /// Fields to exclude from whatever set `all_fields`/`include` produced.
    pub exclude: Vec<SnapshotField>,
    /// Opaque, caller-defined data copied verbatim into the snapshot.
    pub app_data: serde_json::Value,
}

impl SnapshotOptions {
    /// Select every known field.
    #[must_use]
    pub fn session() -> Self {
        Self {
            all_fields: true,
            ..Default::default()
        }
    }

    /// Resolve the effective field set given `all_fields`/`include`/`exclude`.
    #[must_use]
    pub fn resolve_fields(&self) -> HashSet<SnapshotField> {
        let base: HashSet<SnapshotField> = if self.all_fields {
            SnapshotField::all().into_iter().collect()
        } else {
            self.include.iter().copied().collect()
        };
        base.into_iter()
            .filter(|f| !self.exclude.contains(f))
            .collect()
    }
}

/// The serializable content of a snapshot's `data` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Serialized message history, if selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<crate::types::Message>>,
    /// Serialized state bag, if selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<HashMap<String, serde_json::Value>>,
    /// Serialized system prompt, if selected. `Some(None)` serializes as
    /// JSON `null` and is distinguished from "absent" (the whole field
    /// omitted) by [`Option<Option<..>>`]'s outer layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<Option<crate::types::SystemPrompt>>,
    /// Conversation manager state, if selected. Always populated with a
    /// concrete (possibly zeroed) value when present — never an ambiguous
    /// omission — per the conversation-manager design note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_manager_state: Option<ConversationManagerState>,
}

/// The conversation manager's serializable state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationManagerState {
    /// Number of messages the sliding window has removed so far.
    pub removed_message_count: usize,
}

/// Schema version embedded in every [`Snapshot`]; bumping this is a breaking
/// wire change and must be checked exactly by `loadSnapshot`.
pub const SNAPSHOT_SCHEMA_VERSION: &str = "1.0";

/// A durable checkpoint of agent (or swarm) state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Whether this is a single-agent or multi-agent snapshot.
    pub scope: SnapshotScope,
    /// Schema version string; must match [`SNAPSHOT_SCHEMA_VERSION`] exactly.
    pub schema_version: String,
    /// Creation timestamp, UTC.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// The selected field data.
    pub data: SnapshotData,
    /// Opaque caller-defined data, copied verbatim.
    pub app_data: serde_json::Value,
}

/// Identifies where a snapshot lives in a [`crate::StorageProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    /// The session this snapshot belongs to.
    pub session_id: String,
    /// Agent or multi-agent scope.
    pub scope: SnapshotScope,
    /// The agent or swarm identifier within that scope.
    pub scope_id: String,
}

impl Location {
    /// Validate that `session_id` and `scope_id` contain no path separators.
    pub fn validate(&self) -> Result<(), crate::error::StorageError> {
        let bad = |s: &str| s.contains('/') || s.contains('\\') || s.contains("..");
        if bad(&self.session_id) {
            return Err(crate::error::StorageError::Other(
                format!("invalid session id: {}", self.session_id).into(),
            ));
        }
        if bad(&self.scope_id) {
            return Err(crate::error::StorageError::Other(
                format!("invalid scope id: {}", self.scope_id).into(),
            ));
        }
        Ok(())
    }
}

/// Tracks the next snapshot id to assign for a given [`Location`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version, matching [`SNAPSHOT_SCHEMA_VERSION`].
    pub schema_version: String,
    /// The next snapshot id to assign, as a decimal string (unbounded size).
    pub next_snapshot_id: String,
    /// Last update timestamp, UTC.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Manifest {
    /// A fresh manifest with `next_snapshot_id` at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            next_snapshot_id: "00000".to_string(),
            updated_at: chrono::Utc::now(),
        }
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

// --- Swarm data model ---

/// How a swarm reacts to a per-node timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeTimeoutPolicy {
    /// Abort the whole run (default, per spec).
    #[default]
    Abort,
    /// Treat the timed-out node as a normal terminal result and stop there.
    Advance,
}

/// Immutable configuration for a swarm run.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Maximum number of handoffs (history length) before terminating.
    pub max_handoffs: usize,
    /// Maximum number of scheduler iterations before terminating.
    pub max_iterations: usize,
    /// Overall wall-clock budget for the run.
    pub execution_timeout: std::time::Duration,
    /// Per-node wall-clock budget.
    pub node_timeout: std::time::Duration,
    /// Window size (in history entries) for the repetition detector.
    pub repetitive_handoff_window: usize,
    /// Minimum distinct node ids required within that window.
    pub repetitive_handoff_min_unique: usize,
    /// Optional aggregate token budget for the whole run.
    pub max_run_total_tokens: Option<u64>,
    /// Policy applied when a node invocation times out.
    pub node_timeout_policy: NodeTimeoutPolicy,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_handoffs: 20,
            max_iterations: 20,
            execution_timeout: std::time::Duration::from_secs(900),
            node_timeout: std::time::Duration::from_secs(300),
            repetitive_handoff_window: 8,
            repetitive_handoff_min_unique: 3,
            max_run_total_tokens: None,
            node_timeout_policy: NodeTimeoutPolicy::Abort,
        }
    }
}

/// Mutable scheduler state for a running swarm.
#[derive(Debug, Clone, Default)]
pub struct SwarmState {
    /// The node id currently executing (or about to execute).
    pub current_node_id: String,
    /// History of node ids that have run, in order.
    pub node_history: Vec<String>,
    /// Number of scheduler iterations completed.
    pub iteration: usize,
    /// Accumulated token usage across all nodes.
    pub accumulated_usage: crate::types::TokenUsage,
}
