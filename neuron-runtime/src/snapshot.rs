//! The [`StorageProvider`] contract snapshots are persisted through, plus
//! the `take_snapshot`/`load_snapshot` operations that build and unpack the
//! [`Snapshot`] data type owned by `neuron-types`.

use std::collections::HashMap;
use std::future::Future;

use neuron_types::{
    ConversationManagerState, Location, Manifest, Message, Snapshot, SnapshotData,
    SnapshotOptions, SnapshotScope, StorageError, SystemPrompt, WasmCompatSend, WasmCompatSync,
    SNAPSHOT_SCHEMA_VERSION,
};
use thiserror::Error;

/// Errors from field selection or schema validation, distinct from
/// [`StorageError`] (which covers the backing store itself).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SnapshotError {
    /// `include`/`exclude`/`all_fields` resolved to an empty field set.
    #[error("snapshot field selection is empty")]
    EmptySelection,
    /// The snapshot's schema version doesn't match what this crate produces.
    #[error("snapshot schema version mismatch: expected {expected}, got {found}")]
    SchemaMismatch {
        /// The schema version this crate knows how to load.
        expected: String,
        /// The schema version found on the snapshot being loaded.
        found: String,
    },
}

/// Build a [`Snapshot`] from the agent fields the caller already holds,
/// applying [`SnapshotOptions`]'s field-selection rules.
pub fn take_snapshot(
    scope: SnapshotScope,
    messages: &[Message],
    state: &HashMap<String, serde_json::Value>,
    system_prompt: Option<&SystemPrompt>,
    conversation_manager_state: Option<&ConversationManagerState>,
    opts: SnapshotOptions,
) -> Result<Snapshot, SnapshotError> {
    let fields = opts.resolve_fields();
    if fields.is_empty() {
        return Err(SnapshotError::EmptySelection);
    }

    let mut data = SnapshotData::default();
    if fields.contains(&neuron_types::SnapshotField::Messages) {
        data.messages = Some(messages.to_vec());
    }
    if fields.contains(&neuron_types::SnapshotField::State) {
        data.state = Some(state.clone());
    }
    if fields.contains(&neuron_types::SnapshotField::SystemPrompt) {
        data.system_prompt = Some(system_prompt.cloned());
    }
    if fields.contains(&neuron_types::SnapshotField::ConversationManagerState) {
        data.conversation_manager_state =
            Some(conversation_manager_state.cloned().unwrap_or_default());
    }

    Ok(Snapshot {
        scope,
        schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
        created_at: chrono::Utc::now(),
        data,
        app_data: opts.app_data,
    })
}

/// The fields resolved from loading a snapshot, ready for the caller to
/// splice into its own agent state.
#[derive(Debug, Clone, Default)]
pub struct LoadedSnapshot {
    /// Replacement messages, if the snapshot carried any.
    pub messages: Option<Vec<Message>>,
    /// Replacement state bag, if the snapshot carried any.
    pub state: Option<HashMap<String, serde_json::Value>>,
    /// `Some(None)` means "clear the system prompt"; `Some(Some(p))` means
    /// "replace it with `p`"; `None` means the snapshot didn't touch it.
    pub system_prompt: Option<Option<SystemPrompt>>,
    /// Replacement conversation-manager state, if the snapshot carried any.
    pub conversation_manager_state: Option<ConversationManagerState>,
}

/// Validate and unpack a [`Snapshot`] for replay into an agent.
pub fn load_snapshot(snapshot: &Snapshot) -> Result<LoadedSnapshot, SnapshotError> {
    if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
        return Err(SnapshotError::SchemaMismatch {
            expected: SNAPSHOT_SCHEMA_VERSION.to_string(),
            found: snapshot.schema_version.clone(),
        });
    }
    Ok(LoadedSnapshot {
        messages: snapshot.data.messages.clone(),
        state: snapshot.data.state.clone(),
        system_prompt: snapshot.data.system_prompt.clone(),
        conversation_manager_state: snapshot.data.conversation_manager_state.clone(),
    })
}

/// The `{prefix}/{sessionId}/scopes/{scope}/{scopeId}/snapshots/` path
/// layout, as path segments — a filesystem backend joins them into nested
/// directories, an object-store backend joins them with `/`.
#[must_use]
pub fn snapshot_dir_segments(location: &Location) -> Vec<String> {
    let scope = match location.scope {
        SnapshotScope::Agent => "agent",
        SnapshotScope::MultiAgent => "multiAgent",
    };
    vec![
        location.session_id.clone(),
        "scopes".to_string(),
        scope.to_string(),
        location.scope_id.clone(),
        "snapshots".to_string(),
    ]
}

/// The filename for a numbered immutable-history snapshot.
#[must_use]
pub fn snapshot_filename(id: u32) -> String {
    format!("snapshot_{id:05}.json")
}

/// The filename for the "latest" pointer snapshot.
pub const SNAPSHOT_LATEST_FILENAME: &str = "snapshot_latest.json";

/// The filename for a scope's manifest.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Parse a numeric snapshot id out of `snapshot_{5-digit}.json`.
#[must_use]
pub fn parse_snapshot_id(filename: &str) -> Option<u32> {
    filename
        .strip_prefix("snapshot_")
        .and_then(|rest| rest.strip_suffix(".json"))
        .and_then(|digits| digits.parse().ok())
}

/// A request to persist a snapshot at a given location.
#[derive(Debug, Clone)]
pub struct SaveSnapshotRequest {
    /// Where to store it.
    pub location: Location,
    /// The numbered immutable-history id to store under, if any.
    pub snapshot_id: Option<u32>,
    /// Whether to additionally (or only) update the `snapshot_latest.json`
    /// pointer.
    pub is_latest: bool,
    /// The snapshot payload.
    pub snapshot: Snapshot,
}

/// A request to load a snapshot: a specific numbered id, or the latest.
#[derive(Debug, Clone)]
pub struct LoadSnapshotRequest {
    /// Where to look.
    pub location: Location,
    /// A specific immutable-history id, or `None` for `snapshot_latest.json`.
    pub snapshot_id: Option<u32>,
}

/// Pluggable persistence backend for snapshots and their manifests.
///
/// Missing objects resolve to `Ok(None)`; malformed stored content is a hard
/// error (`StorageError::Serialization`) rather than a silent `None`.
pub trait StorageProvider: WasmCompatSend + WasmCompatSync {
    /// Persist a snapshot, either at a specific numbered id, as the latest
    /// pointer, or both (per the request).
    fn save_snapshot(
        &self,
        request: SaveSnapshotRequest,
    ) -> impl Future<Output = Result<(), StorageError>> + WasmCompatSend;

    /// Load a snapshot by numbered id, or the latest if `snapshot_id` is
    /// `None`. Returns `Ok(None)` if nothing is stored there.
    fn load_snapshot(
        &self,
        request: LoadSnapshotRequest,
    ) -> impl Future<Output = Result<Option<Snapshot>, StorageError>> + WasmCompatSend;

    /// List the numbered immutable-history snapshot ids at a location,
    /// sorted ascending.
    fn list_snapshot_ids(
        &self,
        location: Location,
    ) -> impl Future<Output = Result<Vec<u32>, StorageError>> + WasmCompatSend;

    /// Persist a scope's manifest.
    fn save_manifest(
        &self,
        location: Location,
        manifest: Manifest,
    ) -> impl Future<Output = Result<(), StorageError>> + WasmCompatSend;

    /// Load a scope's manifest, or `Ok(None)` if none has been saved yet.
    fn load_manifest(
        &self,
        location: Location,
    ) -> impl Future<Output = Result<Option<Manifest>, StorageError>> + WasmCompatSend;
}
