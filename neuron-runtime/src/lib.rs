#![doc = include_str!("../README.md")]

pub mod durable;
pub mod guardrail;
pub mod guardrail_hook;
pub mod sandbox;
pub mod session;
pub mod snapshot;
pub mod sub_agent;
pub mod tracing_hook;

pub use durable::*;
pub use guardrail::*;
pub use guardrail_hook::*;
pub use sandbox::*;
pub use session::*;
pub use sub_agent::*;
pub use tracing_hook::*;

pub use snapshot::{
    load_snapshot, parse_snapshot_id, snapshot_dir_segments, snapshot_filename, take_snapshot,
    LoadSnapshotRequest, LoadedSnapshot, SaveSnapshotRequest, SnapshotError, StorageProvider,
    MANIFEST_FILENAME, SNAPSHOT_LATEST_FILENAME,
};

pub use neuron_types::{
    ConversationManagerState, Location, Manifest, Snapshot, SnapshotData, SnapshotField,
    SnapshotOptions, SnapshotScope, StorageError, SystemPrompt, SNAPSHOT_SCHEMA_VERSION,
};
