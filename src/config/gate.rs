//! Gate, queue, ledger, and store configuration structures.

use serde::{Deserialize, Serialize};

/// Default concurrent synthesis slots.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;
/// Default recurring free allowance per user.
pub const DEFAULT_FREE_LIMIT: u32 = 30;
/// Default minimum interval between admitted requests, in seconds.
pub const DEFAULT_FLOOD_INTERVAL_SECS: u64 = 5;
/// Default free-allowance reset window, in days.
pub const DEFAULT_RESET_WINDOW_DAYS: i64 = 7;
/// Default maximum input text length, in characters.
pub const DEFAULT_MAX_TEXT_LEN: usize = 300;

/// Job-queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum jobs executing concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Entitlement-ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Recurring free allowance granted to every user.
    #[serde(default = "default_free_limit")]
    pub free_limit: u32,
    /// Minimum interval between admitted requests, in seconds.
    #[serde(default = "default_flood_interval_secs")]
    pub flood_interval_secs: u64,
    /// Free-allowance reset window, in days.
    #[serde(default = "default_reset_window_days")]
    pub reset_window_days: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            free_limit: DEFAULT_FREE_LIMIT,
            flood_interval_secs: DEFAULT_FLOOD_INTERVAL_SECS,
            reset_window_days: DEFAULT_RESET_WINDOW_DAYS,
        }
    }
}

/// Ledger store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store; state dies with the process.
    Memory,
    /// SQLite database file; survives restart.
    Sqlite {
        /// Database file path, created if missing.
        path: String,
    },
}

impl Default for StoreBackendConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Root configuration for the admission gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Queue settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Ledger settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Store backend selection.
    #[serde(default)]
    pub store: StoreBackendConfig,
    /// Maximum input text length, in characters.
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            ledger: LedgerConfig::default(),
            store: StoreBackendConfig::default(),
            max_text_len: DEFAULT_MAX_TEXT_LEN,
        }
    }
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_free_limit() -> u32 {
    DEFAULT_FREE_LIMIT
}

fn default_flood_interval_secs() -> u64 {
    DEFAULT_FLOOD_INTERVAL_SECS
}

fn default_reset_window_days() -> i64 {
    DEFAULT_RESET_WINDOW_DAYS
}

fn default_max_text_len() -> usize {
    DEFAULT_MAX_TEXT_LEN
}

impl QueueConfig {
    /// Validate queue configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be greater than 0".into());
        }
        Ok(())
    }
}

impl LedgerConfig {
    /// Validate ledger configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.reset_window_days <= 0 {
            return Err("reset_window_days must be greater than 0".into());
        }
        if self.flood_interval_secs > i64::MAX as u64 {
            return Err("flood_interval_secs out of range".into());
        }
        Ok(())
    }
}

impl StoreBackendConfig {
    /// Validate backend selection.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Memory => Ok(()),
            Self::Sqlite { path } if path.is_empty() => {
                Err("sqlite store requires a non-empty path".into())
            }
            Self::Sqlite { .. } => Ok(()),
        }
    }
}

impl GateConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), String> {
        self.queue.validate().map_err(|e| format!("queue: {e}"))?;
        self.ledger.validate().map_err(|e| format!("ledger: {e}"))?;
        self.store.validate().map_err(|e| format!("store: {e}"))?;
        if self.max_text_len == 0 {
            return Err("max_text_len must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse gate configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: GateConfig =
            serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
