#![deny(missing_docs)]
//! Filesystem-backed [`StorageProvider`] implementation for neuron.
//!
//! Mirrors the `{sessionId}/scopes/{scope}/{scopeId}/snapshots/...` layout
//! literally as nested directories under a configurable root, so a
//! snapshot tree can be inspected or backed up with plain filesystem tools.

use std::path::{Path, PathBuf};

use neuron_runtime::{
    snapshot_dir_segments, snapshot_filename, LoadSnapshotRequest, Location, Manifest,
    SaveSnapshotRequest, Snapshot, StorageError, StorageProvider, MANIFEST_FILENAME,
    SNAPSHOT_LATEST_FILENAME,
};

/// Filesystem-backed [`StorageProvider`].
///
/// Directory layout:
/// ```text
/// root/
///   <sessionId>/
///     scopes/
///       <agent|multiAgent>/
///         <scopeId>/
///           snapshots/
///             snapshot_00000.json
///             snapshot_00001.json
///             snapshot_latest.json
///             manifest.json
/// ```
pub struct FsStorageProvider {
    root: PathBuf,
}

impl FsStorageProvider {
    /// Create a new filesystem store rooted at the given directory.
    ///
    /// The directory is created lazily on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn snapshots_dir(&self, location: &Location) -> PathBuf {
        let mut path = self.root.clone();
        for segment in snapshot_dir_segments(location) {
            path.push(segment);
        }
        path
    }

    fn io_err(err: std::io::Error) -> StorageError {
        StorageError::Io(err)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, StorageError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let value = serde_json::from_str(&contents)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FsStorageProvider::io_err(e)),
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(FsStorageProvider::io_err)?;
    }
    let contents = serde_json::to_string_pretty(value)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    tokio::fs::write(path, contents)
        .await
        .map_err(FsStorageProvider::io_err)
}

impl StorageProvider for FsStorageProvider {
    async fn save_snapshot(&self, request: SaveSnapshotRequest) -> Result<(), StorageError> {
        request.location.validate()?;
        let dir = self.snapshots_dir(&request.location);

        if let Some(id) = request.snapshot_id {
            write_json(&dir.join(snapshot_filename(id)), &request.snapshot).await?;
        }
        if request.is_latest {
            write_json(&dir.join(SNAPSHOT_LATEST_FILENAME), &request.snapshot).await?;
        }
        Ok(())
    }

    async fn load_snapshot(
        &self,
        request: LoadSnapshotRequest,
    ) -> Result<Option<Snapshot>, StorageError> {
        request.location.validate()?;
        let dir = self.snapshots_dir(&request.location);
        let filename = match request.snapshot_id {
            Some(id) => snapshot_filename(id),
            None => SNAPSHOT_LATEST_FILENAME.to_string(),
        };
        read_json(&dir.join(filename)).await
    }

    async fn list_snapshot_ids(&self, location: Location) -> Result<Vec<u32>, StorageError> {
        location.validate()?;
        let dir = self.snapshots_dir(&location);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_err(e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Self::io_err)? {
            if let Some(filename) = entry.file_name().to_str() {
                if let Some(id) = neuron_runtime::parse_snapshot_id(filename) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn save_manifest(
        &self,
        location: Location,
        manifest: Manifest,
    ) -> Result<(), StorageError> {
        location.validate()?;
        let dir = self.snapshots_dir(&location);
        write_json(&dir.join(MANIFEST_FILENAME), &manifest).await
    }

    async fn load_manifest(&self, location: Location) -> Result<Option<Manifest>, StorageError> {
        location.validate()?;
        let dir = self.snapshots_dir(&location);
        read_json(&dir.join(MANIFEST_FILENAME)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuron_runtime::{take_snapshot, SnapshotOptions, SnapshotScope, SystemPrompt};
    use std::collections::HashMap;

    fn loc() -> Location {
        Location {
            session_id: "sess-1".to_string(),
            scope: SnapshotScope::Agent,
            scope_id: "agent-1".to_string(),
        }
    }

    fn sample_snapshot() -> Snapshot {
        take_snapshot(
            SnapshotScope::Agent,
            &[],
            &HashMap::new(),
            Some(&SystemPrompt::Text("be helpful".to_string())),
            None,
            SnapshotOptions::session(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorageProvider::new(dir.path());

        store
            .save_snapshot(SaveSnapshotRequest {
                location: loc(),
                snapshot_id: Some(0),
                is_latest: false,
                snapshot: sample_snapshot(),
            })
            .await
            .unwrap();

        let loaded = store
            .load_snapshot(LoadSnapshotRequest {
                location: loc(),
                snapshot_id: Some(0),
            })
            .await
            .unwrap();
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn mirrors_the_literal_path_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorageProvider::new(dir.path());

        store
            .save_snapshot(SaveSnapshotRequest {
                location: loc(),
                snapshot_id: Some(3),
                is_latest: true,
                snapshot: sample_snapshot(),
            })
            .await
            .unwrap();

        let expected = dir
            .path()
            .join("sess-1/scopes/agent/agent-1/snapshots/snapshot_00003.json");
        assert!(expected.exists());
        let expected_latest = dir
            .path()
            .join("sess-1/scopes/agent/agent-1/snapshots/snapshot_latest.json");
        assert!(expected_latest.exists());
    }

    #[tokio::test]
    async fn read_nonexistent_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorageProvider::new(dir.path());

        let loaded = store
            .load_snapshot(LoadSnapshotRequest {
                location: loc(),
                snapshot_id: None,
            })
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn list_snapshot_ids_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorageProvider::new(dir.path());

        for id in [2, 0, 1] {
            store
                .save_snapshot(SaveSnapshotRequest {
                    location: loc(),
                    snapshot_id: Some(id),
                    is_latest: false,
                    snapshot: sample_snapshot(),
                })
                .await
                .unwrap();
        }

        assert_eq!(store.list_snapshot_ids(loc()).await.unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn list_nonexistent_dir_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorageProvider::new(dir.path());

        assert!(store.list_snapshot_ids(loc()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn manifest_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorageProvider::new(dir.path());

        assert!(store.load_manifest(loc()).await.unwrap().is_none());

        let manifest = Manifest::new();
        store.save_manifest(loc(), manifest.clone()).await.unwrap();

        let loaded = store.load_manifest(loc()).await.unwrap().unwrap();
        assert_eq!(loaded.next_snapshot_id, manifest.next_snapshot_id);
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorageProvider::new(dir.path());
        let other = Location {
            session_id: "sess-1".to_string(),
            scope: SnapshotScope::MultiAgent,
            scope_id: "swarm-1".to_string(),
        };

        store
            .save_snapshot(SaveSnapshotRequest {
                location: loc(),
                snapshot_id: Some(0),
                is_latest: true,
                snapshot: sample_snapshot(),
            })
            .await
            .unwrap();

        assert!(store
            .load_snapshot(LoadSnapshotRequest {
                location: other,
                snapshot_id: None,
            })
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rejects_invalid_location() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorageProvider::new(dir.path());
        let bad = Location {
            session_id: "../escape".to_string(),
            scope: SnapshotScope::Agent,
            scope_id: "a".to_string(),
        };

        let err = store
            .load_snapshot(LoadSnapshotRequest {
                location: bad,
                snapshot_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Other(_)));
    }
}
