//! Authoritative in-memory balance ledger
//!
//! Balances are unsigned, so a negative balance is unrepresentable; the
//! reserve path enforces the check-and-decrement atomically under the map's
//! per-key entry lock. Operations on different users never contend beyond
//! shard granularity. Every successful mutation signals the snapshot
//! flusher; flush failures never propagate back here.

use crate::errors::{GameError, GameResult};
use crate::store::{spawn_flusher, FlushHandle, SnapshotStore};
use crate::types::UserId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct BalanceLedger {
    balances: Arc<DashMap<UserId, u64>>,
    starting_balance: u64,
    store: SnapshotStore,
    flush: FlushHandle,
}

impl BalanceLedger {
    /// Load the snapshot from disk and start the writer task.
    pub fn open(store: SnapshotStore, starting_balance: u64) -> Self {
        let balances = Arc::new(DashMap::new());
        for (user_id, balance) in store.load() {
            balances.insert(user_id, balance);
        }
        info!(accounts = balances.len(), "Balance ledger loaded");
        let flush = spawn_flusher(store.clone(), Arc::clone(&balances));
        Self {
            balances,
            starting_balance,
            store,
            flush,
        }
    }

    /// Current balance, creating the account with the default starting
    /// balance on first contact.
    pub fn balance(&self, user_id: UserId) -> u64 {
        match self.balances.entry(user_id) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                debug!(user_id, balance = self.starting_balance, "New account");
                entry.insert(self.starting_balance);
                self.flush.request();
                self.starting_balance
            }
        }
    }

    /// Atomically check `balance >= amount` and decrement. On success
    /// returns the remaining balance; on failure the balance is unchanged.
    pub fn reserve(&self, user_id: UserId, amount: u64) -> GameResult<u64> {
        if amount == 0 {
            return Err(GameError::InvalidStake);
        }
        let created;
        let mut guard = match self.balances.entry(user_id) {
            Entry::Occupied(entry) => {
                created = false;
                entry.into_ref()
            }
            Entry::Vacant(entry) => {
                created = true;
                entry.insert(self.starting_balance)
            }
        };
        let available = *guard;
        if available < amount {
            drop(guard);
            if created {
                self.flush.request();
            }
            return Err(GameError::InsufficientFunds {
                required: amount,
                available,
            });
        }
        *guard -= amount;
        let remaining = *guard;
        drop(guard);
        self.flush.request();
        Ok(remaining)
    }

    /// Atomically increment the balance. Returns the new balance.
    pub fn credit(&self, user_id: UserId, amount: u64) -> u64 {
        let mut guard = self
            .balances
            .entry(user_id)
            .or_insert(self.starting_balance);
        *guard = guard.saturating_add(amount);
        let balance = *guard;
        drop(guard);
        self.flush.request();
        balance
    }

    /// Known accounts sorted by balance descending, truncated to `limit`.
    pub fn top_balances(&self, limit: usize) -> Vec<(UserId, u64)> {
        let mut entries: Vec<(UserId, u64)> = self
            .balances
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(limit);
        entries
    }

    pub fn account_count(&self) -> usize {
        self.balances.len()
    }

    /// Synchronous best-effort flush, used at shutdown.
    pub async fn flush_now(&self) {
        let snapshot: HashMap<UserId, u64> = self
            .balances
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect();
        if let Err(e) = self.store.write(&snapshot).await {
            warn!(error = %e, "Final ledger flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_ledger(dir: &TempDir) -> BalanceLedger {
        let store = SnapshotStore::new(dir.path().join("balances.json"));
        BalanceLedger::open(store, 500)
    }

    #[tokio::test]
    async fn test_first_contact_gets_starting_balance() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);
        assert_eq!(ledger.balance(1), 500);
        assert_eq!(ledger.balance(1), 500);
        assert_eq!(ledger.account_count(), 1);
    }

    #[tokio::test]
    async fn test_reserve_and_credit_conserve_balance() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        assert_eq!(ledger.reserve(1, 100).unwrap(), 400);
        assert_eq!(ledger.credit(1, 200), 600);
        assert_eq!(ledger.balance(1), 600);
    }

    #[tokio::test]
    async fn test_reserve_rejects_insufficient_stake() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        let err = ledger.reserve(1, 600).unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientFunds {
                required: 600,
                available: 500
            }
        );
        assert_eq!(ledger.balance(1), 500);
    }

    #[tokio::test]
    async fn test_reserve_rejects_zero_amount() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);
        assert_eq!(ledger.reserve(1, 0).unwrap_err(), GameError::InvalidStake);
    }

    #[tokio::test]
    async fn test_concurrent_reserves_never_overdraw() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(open_ledger(&dir));
        ledger.balance(1);

        // Balance 500, eight threads each trying to take 300: exactly one
        // can succeed.
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::task::spawn_blocking(move || ledger.reserve(1, 300)));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(ledger.balance(1), 200);
    }

    #[tokio::test]
    async fn test_top_balances_sorted_descending() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);
        ledger.credit(1, 100); // 600
        ledger.balance(2); // 500
        ledger.credit(3, 700); // 1200

        let top = ledger.top_balances(2);
        assert_eq!(top, vec![(3, 1200), (1, 600)]);
    }

    #[tokio::test]
    async fn test_flush_now_writes_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("balances.json");
        {
            let ledger = BalanceLedger::open(SnapshotStore::new(path.clone()), 500);
            ledger.credit(7, 250);
            ledger.flush_now().await;
        }
        let reopened = BalanceLedger::open(SnapshotStore::new(path), 500);
        assert_eq!(reopened.balance(7), 750);
    }
}
