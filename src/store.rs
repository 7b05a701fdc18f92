//! JSON snapshot persistence for per-user counters
//!
//! Each store owns one file mapping user id -> integer value. Writes go
//! through a dedicated flusher task (single writer per store) so ledger
//! mutations never wait on I/O; a missing or corrupt file at load time is
//! treated as an empty map, never as a fatal error.

use crate::types::UserId;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One snapshot file on disk
#[derive(Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, falling back to an empty map on any failure.
    pub fn load(&self) -> HashMap<UserId, u64> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot file, starting empty");
                return HashMap::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read snapshot, starting empty");
                return HashMap::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt snapshot, starting empty");
                HashMap::new()
            }
        }
    }

    /// Write the full snapshot atomically (temp file + rename).
    pub async fn write(&self, snapshot: &HashMap<UserId, u64>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), entries = snapshot.len(), "Snapshot flushed");
        Ok(())
    }
}

/// Handle used to request an asynchronous flush after a mutation
#[derive(Clone)]
pub struct FlushHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl FlushHandle {
    /// Signal the writer task. Never blocks; if the writer is gone the
    /// signal is dropped (in-memory state stays authoritative).
    pub fn request(&self) {
        let _ = self.tx.send(());
    }
}

/// Spawn the single writer task for a store.
///
/// Burst mutations coalesce into one write: the task drains all queued
/// signals before snapshotting. Flush failures are logged and dropped.
pub fn spawn_flusher(store: SnapshotStore, source: Arc<DashMap<UserId, u64>>) -> FlushHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            while rx.try_recv().is_ok() {}
            let snapshot: HashMap<UserId, u64> =
                source.iter().map(|e| (*e.key(), *e.value())).collect();
            if let Err(e) = store.write(&snapshot).await {
                warn!(path = %store.path().display(), error = %e, "Snapshot flush failed");
            }
        }
        debug!(path = %store.path().display(), "Flusher stopped");
    });
    FlushHandle { tx }
}
