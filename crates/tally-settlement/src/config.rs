//! # Settlement Configuration
//!
//! Configuration for the checkout orchestrator and its reference adapters.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_PAYMENT_TIMEOUT_MS=3000                                      │
//! │     TALLY_DB_PATH=/var/lib/tally/tally.db                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     explicit path, or the platform config dir:                         │
//! │     ~/.config/tally/tally.toml (Linux)                                 │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # tally.toml
//! [settlement]
//! payment_timeout_ms = 5000
//! max_line_items = 100
//! max_item_quantity = 999
//!
//! [inventory]
//! default_reorder_threshold = 10
//!
//! [database]
//! path = "/var/lib/tally/tally.db"
//!
//! [gateway]
//! max_charge_cents = 1000000
//! latency_ms = 0
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use tally_core::validation::OrderLimits;
use tally_core::{DEFAULT_REORDER_THRESHOLD, MAX_ITEM_QUANTITY, MAX_LINE_ITEMS};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

/// Checkout limits and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSettings {
    /// Upper bound on a single payment call.
    #[serde(default = "default_payment_timeout")]
    pub payment_timeout_ms: u64,

    #[serde(default = "default_max_line_items")]
    pub max_line_items: usize,

    #[serde(default = "default_max_item_quantity")]
    pub max_item_quantity: i64,
}

fn default_payment_timeout() -> u64 {
    5_000
}

fn default_max_line_items() -> usize {
    MAX_LINE_ITEMS
}

fn default_max_item_quantity() -> i64 {
    MAX_ITEM_QUANTITY
}

impl Default for SettlementSettings {
    fn default() -> Self {
        SettlementSettings {
            payment_timeout_ms: default_payment_timeout(),
            max_line_items: default_max_line_items(),
            max_item_quantity: default_max_item_quantity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySettings {
    /// Threshold given to products introduced without one.
    #[serde(default = "default_reorder_threshold")]
    pub default_reorder_threshold: i64,
}

fn default_reorder_threshold() -> i64 {
    DEFAULT_REORDER_THRESHOLD
}

impl Default for InventorySettings {
    fn default() -> Self {
        InventorySettings {
            default_reorder_threshold: default_reorder_threshold(),
        }
    }
}

/// SQLite location. Without a path the in-memory adapters are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Behaviour of the simulated payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Charges above this amount are declined.
    #[serde(default = "default_max_charge")]
    pub max_charge_cents: i64,

    /// Artificial delay before every charge answers.
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_max_charge() -> i64 {
    1_000_000
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            max_charge_cents: default_max_charge(),
            latency_ms: 0,
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default)]
    pub settlement: SettlementSettings,

    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub gateway: GatewaySettings,
}

impl SettlementConfig {
    /// Loads file, then environment, then validates.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading settlement config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        info!(?path, "Settlement config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.settlement.payment_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "payment_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.settlement.max_line_items == 0 {
            return Err(ConfigError::Invalid(
                "max_line_items must be greater than 0".into(),
            ));
        }

        if self.settlement.max_item_quantity <= 0 {
            return Err(ConfigError::Invalid(
                "max_item_quantity must be greater than 0".into(),
            ));
        }

        if self.inventory.default_reorder_threshold < 0 {
            return Err(ConfigError::Invalid(
                "default_reorder_threshold must not be negative".into(),
            ));
        }

        if self.gateway.max_charge_cents <= 0 {
            return Err(ConfigError::Invalid(
                "max_charge_cents must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `TALLY_*` overrides obtained through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_var(&lookup, "TALLY_PAYMENT_TIMEOUT_MS") {
            debug!(payment_timeout_ms = ms, "Overriding payment timeout from environment");
            self.settlement.payment_timeout_ms = ms;
        }

        if let Some(n) = parse_var(&lookup, "TALLY_MAX_LINE_ITEMS") {
            self.settlement.max_line_items = n;
        }

        if let Some(n) = parse_var(&lookup, "TALLY_MAX_ITEM_QUANTITY") {
            self.settlement.max_item_quantity = n;
        }

        if let Some(n) = parse_var(&lookup, "TALLY_REORDER_THRESHOLD") {
            self.inventory.default_reorder_threshold = n;
        }

        if let Some(path) = lookup("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(cents) = parse_var(&lookup, "TALLY_GATEWAY_MAX_CHARGE_CENTS") {
            self.gateway.max_charge_cents = cents;
        }

        if let Some(ms) = parse_var(&lookup, "TALLY_GATEWAY_LATENCY_MS") {
            self.gateway.latency_ms = ms;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "tally")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_millis(self.settlement.payment_timeout_ms)
    }

    pub fn gateway_latency(&self) -> Duration {
        Duration::from_millis(self.gateway.latency_ms)
    }

    pub fn order_limits(&self) -> OrderLimits {
        OrderLimits {
            max_line_items: self.settlement.max_line_items,
            max_item_quantity: self.settlement.max_item_quantity,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
