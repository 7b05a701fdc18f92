//! Core domain types: sessions, events, receipts
//!
//! The central piece is [`Session`], which packs the lifecycle status and the
//! current multiplier into a single atomic word. Every mutation of a running
//! session (multiplier bump, cash-out, crash) is a compare-and-set on that
//! word, so exactly one terminal transition can ever win and the multiplier
//! is frozen in the same atomic step.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// User identifier (chat/account id in the original deployment)
pub type UserId = u64;

/// Multiplier is tracked in integer hundredths; x1.00 == 100.
pub const MULTIPLIER_START: u32 = 100;

const MULTIPLIER_MASK: u64 = 0xFFFF_FFFF;
const STATUS_SHIFT: u64 = 32;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    CashedOut,
    Crashed,
}

impl SessionStatus {
    fn code(self) -> u64 {
        match self {
            SessionStatus::Running => 0,
            SessionStatus::CashedOut => 1,
            SessionStatus::Crashed => 2,
        }
    }

    fn from_code(code: u64) -> Self {
        match code {
            0 => SessionStatus::Running,
            1 => SessionStatus::CashedOut,
            _ => SessionStatus::Crashed,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::CashedOut => write!(f, "cashed_out"),
            SessionStatus::Crashed => write!(f, "crashed"),
        }
    }
}

/// One active wagering round for a single user.
///
/// Word layout: bits 0..32 hold the multiplier in hundredths, bits 32..
/// hold the status code. Status 0 (Running) is the only state that accepts
/// further updates.
pub struct Session {
    owner: UserId,
    stake: u64,
    started_at: Instant,
    state: AtomicU64,
}

impl Session {
    pub fn new(owner: UserId, stake: u64) -> Self {
        Self {
            owner,
            stake,
            started_at: Instant::now(),
            state: AtomicU64::new(MULTIPLIER_START as u64),
        }
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn stake(&self) -> u64 {
        self.stake
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_code(self.state.load(Ordering::SeqCst) >> STATUS_SHIFT)
    }

    /// Current multiplier in hundredths (100 == x1.00)
    pub fn multiplier_hundredths(&self) -> u32 {
        (self.state.load(Ordering::SeqCst) & MULTIPLIER_MASK) as u32
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier_hundredths() as f64 / 100.0
    }

    /// Raise the multiplier by `delta` hundredths if the session is still
    /// running. Returns the new multiplier on success, `None` if a terminal
    /// transition already won.
    pub fn bump_multiplier(&self, delta: u32) -> Option<u32> {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                if word >> STATUS_SHIFT == SessionStatus::Running.code() {
                    Some(word + delta as u64)
                } else {
                    None
                }
            })
            .ok()
            .map(|prev| (prev & MULTIPLIER_MASK) as u32 + delta)
    }

    /// Attempt the single terminal transition Running -> `to`.
    ///
    /// Returns the frozen multiplier (hundredths) if this call won the race,
    /// `None` if the session was already settled by the other actor. This is
    /// the arbitration point between the growth loop and a cash-out request.
    pub fn settle(&self, to: SessionStatus) -> Option<u32> {
        debug_assert!(to != SessionStatus::Running);
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                if word >> STATUS_SHIFT == SessionStatus::Running.code() {
                    Some((to.code() << STATUS_SHIFT) | (word & MULTIPLIER_MASK))
                } else {
                    None
                }
            })
            .ok()
            .map(|prev| (prev & MULTIPLIER_MASK) as u32)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("owner", &self.owner)
            .field("stake", &self.stake)
            .field("multiplier", &self.multiplier())
            .field("status", &self.status())
            .finish()
    }
}

/// Events consumed by the notifier collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    Tick {
        user_id: UserId,
        multiplier: f64,
    },
    Crash {
        user_id: UserId,
    },
    CashOut {
        user_id: UserId,
        stake: u64,
        multiplier: f64,
        payout: u64,
    },
    Rejected {
        user_id: UserId,
        reason: String,
    },
}

/// Outcome of a successful cash-out
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashOutReceipt {
    pub user_id: UserId,
    pub stake: u64,
    pub multiplier: f64,
    pub payout: u64,
    pub balance: u64,
}

/// Outcome of a successful withdrawal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawReceipt {
    pub user_id: UserId,
    pub amount: u64,
    pub balance: u64,
}

/// Per-user account summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub user_id: UserId,
    pub balance: u64,
    pub games_played: u64,
}
