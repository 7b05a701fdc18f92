//! Crashpot - concurrent crash-game session engine
//!
//! A wagering mini-game: a user stakes virtual currency, a multiplier grows
//! over randomized intervals, and the user races a memoryless crash event to
//! cash out at `floor(stake * multiplier)`. The crate owns the session state
//! machine and the balance ledger; message rendering and transport live
//! behind the [`notifier::Notifier`] seam.

pub mod config;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod notifier;
pub mod registry;
pub mod stats;
pub mod store;
pub mod types;

pub use config::{Config, ConfigLoader, GameConfig, StorageConfig};
pub use engine::GameEngine;
pub use errors::{ConfigError, GameError, GameResult};
pub use ledger::BalanceLedger;
pub use notifier::{ChannelNotifier, LogNotifier, Notifier};
pub use registry::SessionRegistry;
pub use stats::StatsTracker;
pub use store::SnapshotStore;
pub use types::{
    CashOutReceipt, GameEvent, Profile, Session, SessionStatus, UserId, WithdrawReceipt,
};
