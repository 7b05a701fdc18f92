//! Per-user games-played counters
//!
//! Independent of settlement correctness: a counter bump happens once at
//! session start and survives regardless of how the round ends.

use crate::store::{spawn_flusher, FlushHandle, SnapshotStore};
use crate::types::UserId;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct StatsTracker {
    games_played: Arc<DashMap<UserId, u64>>,
    store: SnapshotStore,
    flush: FlushHandle,
}

impl StatsTracker {
    pub fn open(store: SnapshotStore) -> Self {
        let games_played = Arc::new(DashMap::new());
        for (user_id, count) in store.load() {
            games_played.insert(user_id, count);
        }
        info!(users = games_played.len(), "Stats tracker loaded");
        let flush = spawn_flusher(store.clone(), Arc::clone(&games_played));
        Self {
            games_played,
            store,
            flush,
        }
    }

    pub fn increment_games_played(&self, user_id: UserId) {
        *self.games_played.entry(user_id).or_insert(0) += 1;
        self.flush.request();
    }

    pub fn games_played(&self, user_id: UserId) -> u64 {
        self.games_played
            .get(&user_id)
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Synchronous best-effort flush, used at shutdown.
    pub async fn flush_now(&self) {
        let snapshot: HashMap<UserId, u64> = self
            .games_played
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect();
        if let Err(e) = self.store.write(&snapshot).await {
            warn!(error = %e, "Final stats flush failed");
        }
    }
}
