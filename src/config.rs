//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section except `[[accounts]]` has defaults, so a minimal file lists only
//! the accounts and their strategy tables.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use crate::precision::{wait_secs, MAX_WAIT_SECS};
use crate::strategy::StrategyConfig;
use crate::types::HedgeError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub price_feed: PriceFeedConfig,
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    /// Directory holding one state file per account.
    pub state_dir: String,
    /// How long an account sits out after a gateway failure.
    pub exchange_fault_backoff_secs: u64,
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            state_dir: "state".to_string(),
            exchange_fault_backoff_secs: 30,
            event_buffer: 1024,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn fault_backoff(&self) -> chrono::Duration {
        wait_secs(self.exchange_fault_backoff_secs)
    }
}

/// Fill-confirmation polling.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub max_wait_ms: u64,
    pub poll_interval_ms: u64,
    /// Share of the requested quantity that counts as filled.
    pub min_fill_ratio: Decimal,
    /// Largest remaining position, as a share of the requested quantity,
    /// that counts as closed.
    pub close_residual_ratio: Decimal,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: 3000,
            poll_interval_ms: 200,
            min_fill_ratio: dec!(0.5),
            close_residual_ratio: dec!(0.2),
        }
    }
}

impl ConfirmationConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PriceFeedConfig {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fapi.binance.com".to_string(),
            poll_interval_ms: 1000,
            timeout_secs: 10,
        }
    }
}

/// One trading account: a symbol and its strategy.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
    pub id: String,
    pub symbol: String,
    pub strategy: StrategyConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HedgeError> {
        if self.accounts.is_empty() {
            return Err(HedgeError::Config("no accounts configured".into()));
        }
        if self.engine.tick_interval_ms == 0 {
            return Err(HedgeError::Config("engine.tick_interval_ms must be positive".into()));
        }
        if self.engine.exchange_fault_backoff_secs > MAX_WAIT_SECS {
            return Err(HedgeError::Config(format!(
                "engine.exchange_fault_backoff_secs exceeds {MAX_WAIT_SECS} seconds"
            )));
        }
        let c = &self.confirmation;
        if c.min_fill_ratio <= Decimal::ZERO || c.min_fill_ratio > Decimal::ONE {
            return Err(HedgeError::Config("confirmation.min_fill_ratio must be in (0, 1]".into()));
        }
        if c.close_residual_ratio < Decimal::ZERO || c.close_residual_ratio >= Decimal::ONE {
            return Err(HedgeError::Config("confirmation.close_residual_ratio must be in [0, 1)".into()));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.id.trim().is_empty() || account.symbol.trim().is_empty() {
                return Err(HedgeError::Config("account id and symbol must be set".into()));
            }
            if !seen.insert(account.id.as_str()) {
                return Err(HedgeError::Config(format!("duplicate account id {}", account.id)));
            }
            account
                .strategy
                .validate()
                .map_err(|e| HedgeError::Config(format!("account {}: {e}", account.id)))?;
        }
        Ok(())
    }
}
