#![deny(missing_docs)]
//! In-memory [`StorageProvider`] implementation for neuron.
//!
//! Backs snapshots and manifests with a single `HashMap` behind a
//! `tokio::sync::RwLock`, keyed by [`Location`]. Intended for tests and
//! single-process deployments where snapshots don't need to outlive the
//! process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use neuron_runtime::{
    parse_snapshot_id, snapshot_filename, LoadSnapshotRequest, Location, Manifest,
    SaveSnapshotRequest, Snapshot, StorageError, StorageProvider,
};

#[derive(Default)]
struct ScopeStore {
    /// Numbered immutable-history snapshots, keyed by filename.
    history: HashMap<String, Snapshot>,
    /// The `snapshot_latest.json` pointer, if one has been written.
    latest: Option<Snapshot>,
    manifest: Option<Manifest>,
}

/// An in-memory [`StorageProvider`]. Cheaply cloneable; all clones share the
/// same underlying store.
#[derive(Clone, Default)]
pub struct MemoryStorageProvider {
    scopes: Arc<RwLock<HashMap<Location, ScopeStore>>>,
}

impl MemoryStorageProvider {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageProvider for MemoryStorageProvider {
    async fn save_snapshot(&self, request: SaveSnapshotRequest) -> Result<(), StorageError> {
        request.location.validate()?;
        let mut scopes = self.scopes.write().await;
        let scope = scopes.entry(request.location.clone()).or_default();

        if let Some(id) = request.snapshot_id {
            scope
                .history
                .insert(snapshot_filename(id), request.snapshot.clone());
        }
        if request.is_latest {
            scope.latest = Some(request.snapshot);
        }
        Ok(())
    }

    async fn load_snapshot(
        &self,
        request: LoadSnapshotRequest,
    ) -> Result<Option<Snapshot>, StorageError> {
        request.location.validate()?;
        let scopes = self.scopes.read().await;
        let Some(scope) = scopes.get(&request.location) else {
            return Ok(None);
        };
        match request.snapshot_id {
            Some(id) => Ok(scope.history.get(&snapshot_filename(id)).cloned()),
            None => Ok(scope.latest.clone()),
        }
    }

    async fn list_snapshot_ids(&self, location: Location) -> Result<Vec<u32>, StorageError> {
        location.validate()?;
        let scopes = self.scopes.read().await;
        let Some(scope) = scopes.get(&location) else {
            return Ok(Vec::new());
        };
        let mut ids: Vec<u32> = scope
            .history
            .keys()
            .filter_map(|name| parse_snapshot_id(name))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn save_manifest(
        &self,
        location: Location,
        manifest: Manifest,
    ) -> Result<(), StorageError> {
        location.validate()?;
        let mut scopes = self.scopes.write().await;
        scopes.entry(location).or_default().manifest = Some(manifest);
        Ok(())
    }

    async fn load_manifest(&self, location: Location) -> Result<Option<Manifest>, StorageError> {
        location.validate()?;
        let scopes = self.scopes.read().await;
        Ok(scopes.get(&location).and_then(|s| s.manifest.clone()))
    }
}
