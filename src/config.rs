// ============================================================================
// Runtime configuration
// ============================================================================
//
// Read once at start-up from the environment (and `.env` via dotenv).
// Engine-facing values are turned into `EngineParams` so the engine itself
// never touches the environment.
// ============================================================================

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::wager::engine::{EngineParams, DEFAULT_OWNER};
use crate::wager::oracle_timeout::OracleTimeoutCoordinator;
use crate::wager::types::{Address, SECONDS_PER_DAY};

pub const DEFAULT_BIND: &str = "0.0.0.0:1234";
pub const DEFAULT_STATE_PATH: &str = "data/friend_markets.json";
pub const DEFAULT_ORACLE_TIMEOUT_DAYS: u64 = 30;
pub const DEFAULT_POLL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    /// Address derived from the owner's signing key (see `auth::address_from_pubkey`)
    pub owner: Address,
    pub oracle_reporter: Option<Address>,
    pub oracle_timeout_days: u64,
    pub one_vs_one_fee: Decimal,
    pub group_fee: Decimal,
    pub state_path: String,
    pub public_market_feed_url: Option<String>,
    pub public_market_poll_secs: u64,
    /// Anyone may create markets when true; otherwise an owner-managed allowlist
    pub open_creation: bool,
    pub faucet_amount: Decimal,
    pub log_level: String,
    /// `pretty` or `json`
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            owner: Address::new(DEFAULT_OWNER),
            oracle_reporter: None,
            oracle_timeout_days: DEFAULT_ORACLE_TIMEOUT_DAYS,
            one_vs_one_fee: Decimal::new(1, 1),
            group_fee: Decimal::new(2, 1),
            state_path: DEFAULT_STATE_PATH.to_string(),
            public_market_feed_url: None,
            public_market_poll_secs: DEFAULT_POLL_SECS,
            open_creation: true,
            faucet_amount: Decimal::new(100, 0),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            bind: env_or("FRIEND_MARKETS_BIND", defaults.bind),
            owner: std::env::var("FRIEND_MARKETS_OWNER").map(Address::new).unwrap_or(defaults.owner),
            oracle_reporter: std::env::var("ORACLE_REPORTER").ok().filter(|s| !s.trim().is_empty()).map(Address::new),
            oracle_timeout_days: parse_env("ORACLE_TIMEOUT_DAYS", defaults.oracle_timeout_days)?,
            one_vs_one_fee: parse_env("ONE_VS_ONE_FEE", defaults.one_vs_one_fee)?,
            group_fee: parse_env("GROUP_FEE", defaults.group_fee)?,
            state_path: env_or("STATE_PATH", defaults.state_path),
            public_market_feed_url: std::env::var("PUBLIC_MARKET_FEED_URL").ok().filter(|s| !s.trim().is_empty()),
            public_market_poll_secs: parse_env("PUBLIC_MARKET_POLL_SECS", defaults.public_market_poll_secs)?,
            open_creation: std::env::var("OPEN_CREATION")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.open_creation),
            faucet_amount: parse_env("FAUCET_AMOUNT", defaults.faucet_amount)?,
            log_level: env_or("LOG_LEVEL", defaults.log_level),
            log_format: env_or("LOG_FORMAT", defaults.log_format),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.owner.is_zero() {
            return Err("FRIEND_MARKETS_OWNER must not be the zero address".into());
        }
        OracleTimeoutCoordinator::validate_timeout(self.oracle_timeout_secs()).map_err(|e| e.to_string())?;
        if self.one_vs_one_fee < Decimal::ZERO || self.group_fee < Decimal::ZERO {
            return Err("creation fees must not be negative".into());
        }
        if self.faucet_amount <= Decimal::ZERO {
            return Err("FAUCET_AMOUNT must be positive".into());
        }
        if self.public_market_poll_secs == 0 {
            return Err("PUBLIC_MARKET_POLL_SECS must be at least 1".into());
        }
        Ok(())
    }

    pub fn oracle_timeout_secs(&self) -> u64 {
        self.oracle_timeout_days.saturating_mul(SECONDS_PER_DAY)
    }

    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            owner: self.owner.clone(),
            oracle_reporter: self.oracle_reporter.clone(),
            one_vs_one_fee: self.one_vs_one_fee,
            group_fee: self.group_fee,
            oracle_timeout_secs: self.oracle_timeout_secs(),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty()).unwrap_or(default)
}

fn parse_env<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| format!("Invalid {}={}: {}", key, raw, e)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        let params = config.engine_params();
        assert_eq!(params.one_vs_one_fee, dec!(0.1));
        assert_eq!(params.group_fee, dec!(0.2));
        assert_eq!(params.oracle_timeout_secs, 30 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config { oracle_timeout_days: 6, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { oracle_timeout_days: 181, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { owner: Address::zero(), ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { group_fee: dec!(-0.2), ..Config::default() };
        assert!(config.validate().is_err());
    }
}
