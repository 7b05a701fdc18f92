//! Game engine: per-session growth loop and settlement
//!
//! One tokio task per active session drives the multiplier up over
//! randomized intervals and races the memoryless crash trial against a
//! caller-driven cash-out. The session's packed status word is the single
//! arbitration point: whichever actor wins the Running -> terminal
//! compare-and-set settles the round, the loser observes it already gone
//! and touches neither the ledger nor the notifier.

use crate::config::GameConfig;
use crate::errors::{GameError, GameResult};
use crate::ledger::BalanceLedger;
use crate::notifier::Notifier;
use crate::registry::SessionRegistry;
use crate::stats::StatsTracker;
use crate::types::{
    CashOutReceipt, GameEvent, Profile, Session, SessionStatus, UserId, WithdrawReceipt,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct GameEngine {
    config: GameConfig,
    ledger: Arc<BalanceLedger>,
    registry: Arc<SessionRegistry>,
    stats: Arc<StatsTracker>,
    notifier: Arc<dyn Notifier>,
}

impl GameEngine {
    pub fn new(
        config: GameConfig,
        ledger: Arc<BalanceLedger>,
        registry: Arc<SessionRegistry>,
        stats: Arc<StatsTracker>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            ledger,
            registry,
            stats,
            notifier,
        }
    }

    pub fn ledger(&self) -> &BalanceLedger {
        &self.ledger
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Reserve the stake, create the session and spawn its growth loop.
    ///
    /// The reservation happens inside the registry's per-user critical
    /// section, so the session only becomes visible once the stake is
    /// locked in and the balance can never go negative from staking.
    pub async fn start_session(
        &self,
        user_id: UserId,
        stake: u64,
    ) -> GameResult<Arc<Session>> {
        if stake == 0 {
            return self.reject(user_id, GameError::InvalidStake).await;
        }

        let created = self.registry.create_with(user_id, || {
            self.ledger.reserve(user_id, stake)?;
            Ok(Session::new(user_id, stake))
        });

        let session = match created {
            Ok(session) => session,
            Err(e) => return self.reject(user_id, e).await,
        };

        self.stats.increment_games_played(user_id);
        info!(user_id, stake, "Session started");

        let engine = self.clone();
        let loop_session = Arc::clone(&session);
        tokio::spawn(async move {
            engine.run_session(loop_session).await;
        });

        Ok(session)
    }

    /// Lock in the current multiplier and credit `floor(stake * multiplier)`.
    pub async fn cash_out(&self, user_id: UserId) -> GameResult<CashOutReceipt> {
        let session = match self.registry.get(user_id) {
            Some(session) => session,
            None => return self.reject(user_id, GameError::NoActiveSession).await,
        };

        let hundredths = match session.settle(SessionStatus::CashedOut) {
            Some(hundredths) => hundredths,
            // The crash trial won the race; the loop settles the round.
            None => return self.reject(user_id, GameError::NoActiveSession).await,
        };

        self.registry.remove(user_id);
        let stake = session.stake();
        let payout = stake * hundredths as u64 / 100;
        let balance = self.ledger.credit(user_id, payout);
        let multiplier = hundredths as f64 / 100.0;
        info!(user_id, stake, multiplier, payout, "Session cashed out");

        self.notifier
            .notify(GameEvent::CashOut {
                user_id,
                stake,
                multiplier,
                payout,
            })
            .await;

        Ok(CashOutReceipt {
            user_id,
            stake,
            multiplier,
            payout,
            balance,
        })
    }

    /// Debit an amount from the balance outside of any session.
    pub async fn withdraw(&self, user_id: UserId, amount: u64) -> GameResult<WithdrawReceipt> {
        if amount == 0 {
            return self.reject(user_id, GameError::InvalidStake).await;
        }
        match self.ledger.reserve(user_id, amount) {
            Ok(balance) => {
                info!(user_id, amount, balance, "Withdrawal");
                Ok(WithdrawReceipt {
                    user_id,
                    amount,
                    balance,
                })
            }
            Err(e) => self.reject(user_id, e).await,
        }
    }

    pub fn balance(&self, user_id: UserId) -> u64 {
        self.ledger.balance(user_id)
    }

    pub fn profile(&self, user_id: UserId) -> Profile {
        Profile {
            user_id,
            balance: self.ledger.balance(user_id),
            games_played: self.stats.games_played(user_id),
        }
    }

    pub fn top_players(&self, limit: usize) -> Vec<(UserId, u64)> {
        self.ledger.top_balances(limit)
    }

    async fn reject<T>(&self, user_id: UserId, error: GameError) -> GameResult<T> {
        self.notifier
            .notify(GameEvent::Rejected {
                user_id,
                reason: error.to_string(),
            })
            .await;
        Err(error)
    }

    /// The growth loop for one session.
    ///
    /// Each iteration: sleep a random interval, bail out if the session was
    /// settled and removed while sleeping, run the crash trial, otherwise
    /// bump the multiplier and emit a tick. Every mutating step re-checks
    /// the status word, so a loop waking after an external settlement exits
    /// without side effects.
    async fn run_session(&self, session: Arc<Session>) {
        let user_id = session.owner();
        loop {
            let delay = rand::thread_rng()
                .gen_range(self.config.tick_min_ms..=self.config.tick_max_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            match self.registry.get(user_id) {
                Some(current) if Arc::ptr_eq(&current, &session) => {}
                _ => break,
            }

            if rand::thread_rng().gen::<f64>() < self.config.crash_probability {
                if let Some(hundredths) = session.settle(SessionStatus::Crashed) {
                    self.registry.remove(user_id);
                    info!(
                        user_id,
                        stake = session.stake(),
                        multiplier = hundredths as f64 / 100.0,
                        "Session crashed"
                    );
                    self.notifier.notify(GameEvent::Crash { user_id }).await;
                }
                break;
            }

            let delta = rand::thread_rng()
                .gen_range(self.config.step_min_hundredths..=self.config.step_max_hundredths);
            match session.bump_multiplier(delta) {
                Some(hundredths) => {
                    self.notifier
                        .notify(GameEvent::Tick {
                            user_id,
                            multiplier: hundredths as f64 / 100.0,
                        })
                        .await;
                }
                None => break,
            }
        }
        debug!(user_id, status = %session.status(), "Growth loop exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ChannelNotifier;
    use crate::store::SnapshotStore;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn fast_config(crash_probability: f64) -> GameConfig {
        GameConfig {
            starting_balance: 500,
            crash_probability,
            tick_min_ms: 1,
            tick_max_ms: 2,
            step_min_hundredths: 10,
            step_max_hundredths: 50,
        }
    }

    fn build_engine(
        dir: &TempDir,
        crash_probability: f64,
    ) -> (GameEngine, UnboundedReceiver<GameEvent>) {
        let ledger = Arc::new(BalanceLedger::open(
            SnapshotStore::new(dir.path().join("balances.json")),
            500,
        ));
        let stats = Arc::new(StatsTracker::open(SnapshotStore::new(
            dir.path().join("stats.json"),
        )));
        let (notifier, rx) = ChannelNotifier::new();
        let engine = GameEngine::new(
            fast_config(crash_probability),
            ledger,
            Arc::new(SessionRegistry::new()),
            stats,
            Arc::new(notifier),
        );
        (engine, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<GameEvent>) -> Vec<GameEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_cash_out_pays_floor_of_stake_times_multiplier() {
        let dir = TempDir::new().unwrap();
        let (engine, _rx) = build_engine(&dir, 0.0);

        let session = engine.start_session(1, 100).await.unwrap();
        assert_eq!(engine.balance(1), 400);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let receipt = engine.cash_out(1).await.unwrap();

        let hundredths = session.multiplier_hundredths() as u64;
        assert!(hundredths > 100, "multiplier should have grown");
        assert_eq!(receipt.payout, 100 * hundredths / 100);
        assert_eq!(receipt.balance, 400 + receipt.payout);
        assert_eq!(engine.balance(1), 400 + receipt.payout);
        assert!(engine.registry().get(1).is_none());
    }

    #[tokio::test]
    async fn test_crash_forfeits_stake() {
        let dir = TempDir::new().unwrap();
        let (engine, mut rx) = build_engine(&dir, 1.0);

        engine.start_session(1, 50).await.unwrap();
        assert_eq!(engine.balance(1), 450);

        // With p = 1.0 the first tick crashes the session.
        let event = rx.recv().await.unwrap();
        assert_eq!(event, GameEvent::Crash { user_id: 1 });

        assert_eq!(engine.balance(1), 450);
        assert!(engine.registry().get(1).is_none());
        assert_eq!(
            engine.cash_out(1).await.unwrap_err(),
            GameError::NoActiveSession
        );
    }

    #[tokio::test]
    async fn test_concurrent_session_rejected() {
        let dir = TempDir::new().unwrap();
        let (engine, _rx) = build_engine(&dir, 0.0);

        engine.start_session(1, 100).await.unwrap();
        let err = engine.start_session(1, 50).await.unwrap_err();
        assert_eq!(err, GameError::ConcurrentSessionExists);

        // Only the first stake was reserved; the first session is intact.
        assert_eq!(engine.balance(1), 400);
        assert_eq!(engine.registry().get(1).unwrap().stake(), 100);
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_balance_unchanged() {
        let dir = TempDir::new().unwrap();
        let (engine, mut rx) = build_engine(&dir, 0.0);

        let err = engine.start_session(1, 600).await.unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientFunds {
                required: 600,
                available: 500
            }
        );
        assert_eq!(engine.balance(1), 500);
        assert!(engine.registry().get(1).is_none());

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::Rejected { user_id: 1, .. })));
    }

    #[tokio::test]
    async fn test_zero_stake_rejected() {
        let dir = TempDir::new().unwrap();
        let (engine, _rx) = build_engine(&dir, 0.0);
        assert_eq!(
            engine.start_session(1, 0).await.unwrap_err(),
            GameError::InvalidStake
        );
    }

    #[tokio::test]
    async fn test_cash_out_without_session() {
        let dir = TempDir::new().unwrap();
        let (engine, _rx) = build_engine(&dir, 0.0);
        assert_eq!(
            engine.cash_out(1).await.unwrap_err(),
            GameError::NoActiveSession
        );
        assert_eq!(engine.balance(1), 500);
    }

    #[tokio::test]
    async fn test_ticks_are_monotonic_and_stop_after_cash_out() {
        let dir = TempDir::new().unwrap();
        let (engine, mut rx) = build_engine(&dir, 0.0);

        engine.start_session(1, 100).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.cash_out(1).await.unwrap();
        // Allow a sleeping loop iteration to wake and observe the settlement.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let events = drain(&mut rx);
        let mut last = 1.0;
        let mut saw_cash_out = false;
        for event in events {
            match event {
                GameEvent::Tick { multiplier, .. } => {
                    assert!(!saw_cash_out, "tick emitted after settlement");
                    assert!(multiplier >= last);
                    last = multiplier;
                }
                GameEvent::CashOut { .. } => saw_cash_out = true,
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert!(saw_cash_out);
    }

    #[tokio::test]
    async fn test_crash_versus_cash_out_settles_exactly_once() {
        for _ in 0..20 {
            let dir = TempDir::new().unwrap();
            let (engine, mut rx) = build_engine(&dir, 1.0);

            engine.start_session(1, 100).await.unwrap();
            assert_eq!(engine.balance(1), 400);

            // Hammer cash-out while the first tick tries to crash the round.
            let mut receipts = Vec::new();
            while engine.registry().get(1).is_some() {
                if let Ok(receipt) = engine.cash_out(1).await {
                    receipts.push(receipt);
                }
                tokio::task::yield_now().await;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;

            assert!(receipts.len() <= 1);
            let events = drain(&mut rx);
            let terminal = events
                .iter()
                .filter(|e| matches!(e, GameEvent::Crash { .. } | GameEvent::CashOut { .. }))
                .count();
            assert_eq!(terminal, 1, "exactly one settlement per session");

            match receipts.first() {
                Some(receipt) => assert_eq!(engine.balance(1), 400 + receipt.payout),
                None => assert_eq!(engine.balance(1), 400),
            }
        }
    }

    #[tokio::test]
    async fn test_profile_and_stats() {
        let dir = TempDir::new().unwrap();
        let (engine, _rx) = build_engine(&dir, 0.0);

        engine.start_session(1, 100).await.unwrap();
        engine.cash_out(1).await.unwrap();
        engine.start_session(1, 100).await.unwrap();
        engine.cash_out(1).await.unwrap();

        let profile = engine.profile(1);
        assert_eq!(profile.games_played, 2);
        assert_eq!(profile.balance, engine.balance(1));
    }

    #[tokio::test]
    async fn test_withdraw() {
        let dir = TempDir::new().unwrap();
        let (engine, _rx) = build_engine(&dir, 0.0);

        let receipt = engine.withdraw(1, 200).await.unwrap();
        assert_eq!(receipt.balance, 300);
        assert!(matches!(
            engine.withdraw(1, 400).await.unwrap_err(),
            GameError::InsufficientFunds { .. }
        ));
        assert_eq!(
            engine.withdraw(1, 0).await.unwrap_err(),
            GameError::InvalidStake
        );
        assert_eq!(engine.balance(1), 300);
    }
}
