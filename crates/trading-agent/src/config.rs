use anyhow::{ensure, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_WATCHLIST: [&str; 4] = ["bitcoin", "ethereum", "solana", "matic-network"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // Proposal universe
    pub watchlist: Vec<String>,

    // New agents
    pub starting_cash_usdc: Decimal,           // 1000
    pub default_max_daily_loss_usdc: Decimal,  // 50
    pub default_max_drawdown_pct: f64,         // 25%

    // Cycle behavior
    pub safety_check_each_cycle: bool,         // run the safety monitor after each snapshot
    pub cycles: u32,                           // cycles per agent for the demo binary
    pub rng_seed: Option<u64>,                 // fixed seed for reproducible runs

    // Inputs / storage
    pub price_file: Option<String>,            // JSON {asset: price}
    pub database_url: String,
    pub user_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watchlist: DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
            starting_cash_usdc: Decimal::from(1000),
            default_max_daily_loss_usdc: Decimal::from(50),
            default_max_drawdown_pct: 25.0,
            safety_check_each_cycle: true,
            cycles: 1,
            rng_seed: None,
            price_file: None,
            database_url: "sqlite::memory:".to_string(),
            user_id: "demo".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            watchlist: env::var("WATCHLIST")
                .unwrap_or_else(|_| DEFAULT_WATCHLIST.join(","))
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            starting_cash_usdc: env::var("STARTING_CASH_USDC")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("STARTING_CASH_USDC must be a decimal")?,
            default_max_daily_loss_usdc: env::var("DEFAULT_MAX_DAILY_LOSS_USDC")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("DEFAULT_MAX_DAILY_LOSS_USDC must be a decimal")?,
            default_max_drawdown_pct: env::var("DEFAULT_MAX_DRAWDOWN_PCT")
                .unwrap_or_else(|_| "25.0".to_string())
                .parse()?,

            safety_check_each_cycle: env::var("SAFETY_CHECK_EACH_CYCLE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            cycles: env::var("CYCLES")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
            rng_seed: match env::var("RNG_SEED") {
                Ok(raw) if !raw.trim().is_empty() => {
                    Some(raw.trim().parse().context("RNG_SEED must be an unsigned integer")?)
                }
                _ => None,
            },

            price_file: env::var("PRICE_FILE").ok().filter(|s| !s.trim().is_empty()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite::memory:".to_string()),
            user_id: env::var("USER_ID").unwrap_or_else(|_| "demo".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.watchlist.is_empty(), "WATCHLIST must name at least one asset");
        ensure!(
            self.starting_cash_usdc >= Decimal::ZERO,
            "STARTING_CASH_USDC must not be negative"
        );
        ensure!(
            self.default_max_daily_loss_usdc >= Decimal::ZERO,
            "DEFAULT_MAX_DAILY_LOSS_USDC must not be negative"
        );
        ensure!(
            (0.0..=100.0).contains(&self.default_max_drawdown_pct),
            "DEFAULT_MAX_DRAWDOWN_PCT must be within 0-100"
        );
        ensure!(self.cycles >= 1, "CYCLES must be at least 1");
        ensure!(!self.user_id.trim().is_empty(), "USER_ID must not be empty");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.watchlist.len(), 4);
        assert_eq!(config.starting_cash_usdc, Decimal::from(1000));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.watchlist.clear();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.default_max_drawdown_pct = 150.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.cycles = 0;
        assert!(config.validate().is_err());
    }
}
