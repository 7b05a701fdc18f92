//! Configuration with TOML file loading, environment overrides and validation

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub game: GameConfig,
    pub storage: StorageConfig,
}

/// Tunables for the growth loop and ledger defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Balance granted on first contact
    pub starting_balance: u64,
    /// Per-tick Bernoulli crash probability (memoryless)
    pub crash_probability: f64,
    /// Tick sleep interval, uniform in [tick_min_ms, tick_max_ms]
    pub tick_min_ms: u64,
    pub tick_max_ms: u64,
    /// Multiplier increment per tick, uniform in hundredths
    pub step_min_hundredths: u32,
    pub step_max_hundredths: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_balance: 500,
            crash_probability: 0.05,
            tick_min_ms: 500,
            tick_max_ms: 1500,
            step_min_hundredths: 10,
            step_max_hundredths: 50,
        }
    }
}

/// Snapshot file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub balances_file: String,
    pub stats_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            balances_file: "user_balances.json".to_string(),
            stats_file: "user_stats.json".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn balances_path(&self) -> std::path::PathBuf {
        Path::new(&self.data_dir).join(&self.balances_file)
    }

    pub fn stats_path(&self) -> std::path::PathBuf {
        Path::new(&self.data_dir).join(&self.stats_file)
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            Config::default()
        };

        self.apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_string(),
            source: e,
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Ok(dir) = env::var("CRASHPOT_DATA_DIR") {
            config.storage.data_dir = dir;
        }
        if let Ok(value) = env::var("CRASHPOT_STARTING_BALANCE") {
            config.game.starting_balance =
                value.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "CRASHPOT_STARTING_BALANCE".to_string(),
                    reason: format!("'{}' is not an integer", value),
                })?;
        }
        if let Ok(value) = env::var("CRASHPOT_CRASH_PROBABILITY") {
            config.game.crash_probability =
                value.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "CRASHPOT_CRASH_PROBABILITY".to_string(),
                    reason: format!("'{}' is not a number", value),
                })?;
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let game = &config.game;
    if !(0.0..=1.0).contains(&game.crash_probability) {
        return Err(ConfigError::InvalidValue {
            field: "game.crash_probability".to_string(),
            reason: "must be within [0, 1]".to_string(),
        });
    }
    if game.tick_min_ms == 0 || game.tick_min_ms > game.tick_max_ms {
        return Err(ConfigError::InvalidValue {
            field: "game.tick_min_ms".to_string(),
            reason: "must be positive and not exceed tick_max_ms".to_string(),
        });
    }
    if game.step_min_hundredths == 0 || game.step_min_hundredths > game.step_max_hundredths {
        return Err(ConfigError::InvalidValue {
            field: "game.step_min_hundredths".to_string(),
            reason: "must be positive and not exceed step_max_hundredths".to_string(),
        });
    }
    if config.storage.data_dir.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "storage.data_dir".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}
