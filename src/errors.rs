//! Error types for the crashpot engine
//!
//! All game errors are recoverable and reported to the caller as typed
//! outcomes; persistence failures are logged at the call site and never
//! propagated into the in-memory path.

use thiserror::Error;

/// Typed rejections for caller-facing operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Stake must be a positive amount")]
    InvalidStake,

    #[error("Insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("A session is already running for this user")]
    ConcurrentSessionExists,

    #[error("No active session for this user")]
    NoActiveSession,
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Convenience alias for game operation results
pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GameError::InsufficientFunds {
            required: 600,
            available: 500,
        };
        assert!(err.to_string().contains("need 600"));
        assert!(err.to_string().contains("have 500"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "game.crash_probability".to_string(),
            reason: "must be within [0, 1]".to_string(),
        };
        assert!(err.to_string().contains("crash_probability"));
    }
}
