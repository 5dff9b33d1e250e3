//! Runtime configuration, read from `REMIT_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

use crate::Amount;

pub const DEFAULT_RATES_URL: &str = "https://api.exchangerate-api.com/v4/latest";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Limits and lifetimes enforced by the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub otp_ttl: Duration,
    pub session_ttl: Duration,
    /// Transfers strictly above this amount need an OTP.
    pub otp_threshold: Amount,
    /// Largest single top-up.
    pub top_up_limit: Amount,
    /// USD balance of a newly created wallet.
    pub opening_balance: Amount,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            otp_ttl: Duration::minutes(5),
            session_ttl: Duration::hours(24),
            otp_threshold: Amount::from_units(500),
            top_up_limit: Amount::from_units(10_000),
            opening_balance: Amount::from_units(50),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RatesConfig {
    /// Rates are fetched from `<base_url>/<BASE>`.
    pub base_url: String,
    pub ttl: Duration,
    pub timeout: StdDuration,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RATES_URL.to_string(),
            ttl: Duration::hours(1),
            timeout: StdDuration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub rates: RatesConfig,
    /// Delay applied before every client call to mimic a network round trip.
    pub latency: StdDuration,
    /// Return issued OTP codes in responses instead of only "sending" them.
    pub expose_otp: bool,
    /// File backing the key-value mirror; in-memory when unset.
    pub state_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            rates: RatesConfig::default(),
            latency: StdDuration::ZERO,
            expose_otp: true,
            state_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(url) = lookup("REMIT_RATES_URL") {
            config.rates.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse::<i64>(&lookup, "REMIT_RATES_TTL_SECS")? {
            config.rates.ttl = Duration::seconds(secs);
        }
        if let Some(ms) = parse::<u64>(&lookup, "REMIT_RATES_TIMEOUT_MS")? {
            config.rates.timeout = StdDuration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&lookup, "REMIT_LATENCY_MS")? {
            config.latency = StdDuration::from_millis(ms);
        }
        if let Some(secs) = parse::<i64>(&lookup, "REMIT_OTP_TTL_SECS")? {
            config.engine.otp_ttl = Duration::seconds(secs);
        }
        if let Some(secs) = parse::<i64>(&lookup, "REMIT_SESSION_TTL_SECS")? {
            config.engine.session_ttl = Duration::seconds(secs);
        }
        if let Some(value) = parse::<f64>(&lookup, "REMIT_OTP_THRESHOLD")? {
            config.engine.otp_threshold = Amount::from_float(value);
        }
        if let Some(value) = parse::<f64>(&lookup, "REMIT_TOP_UP_LIMIT")? {
            config.engine.top_up_limit = Amount::from_float(value);
        }
        if let Some(value) = parse::<f64>(&lookup, "REMIT_OPENING_BALANCE")? {
            config.engine.opening_balance = Amount::from_float(value);
        }
        if let Some(expose) = parse::<bool>(&lookup, "REMIT_EXPOSE_OTP")? {
            config.expose_otp = expose;
        }
        if let Some(path) = lookup("REMIT_STATE_FILE").filter(|p| !p.is_empty()) {
            config.state_file = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
