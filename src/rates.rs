//! Exchange rates.
//!
//! Rates are fetched per base currency and cached for a fixed TTL. When the
//! provider cannot be reached, a built-in table is used instead and cached
//! for the same TTL, so the next attempt happens on natural expiry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::RatesConfig;
use crate::model::Currency;

/// Units of each currency per one USD, used when the provider is down.
const FALLBACK_USD_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("ETB", 56.5),
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("KES", 129.0),
    ("NGN", 1550.0),
    ("GHS", 15.2),
    ("CAD", 1.36),
    ("AED", 3.67),
    ("SAR", 3.75),
    ("INR", 83.1),
    ("CNY", 7.24),
];

pub type RateTable = HashMap<Currency, f64>;

#[derive(Debug, Error)]
pub enum RateError {
    #[error("rate request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider has no rate for {0}")]
    UnknownCurrency(Currency),
}

/// Where fresh rates come from.
pub trait RateSource: Send + Sync + 'static {
    /// Rates quoted against `base`.
    fn fetch(&self, base: &Currency) -> impl Future<Output = Result<RateTable, RateError>> + Send;
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    rates: HashMap<String, f64>,
}

/// `GET <base_url>/<BASE>` returning `{ "rates": { "<CCY>": number } }`.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateSource {
    pub fn new(config: &RatesConfig) -> Result<Self, RateError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl RateSource for HttpRateSource {
    async fn fetch(&self, base: &Currency) -> Result<RateTable, RateError> {
        let url = format!("{}/{}", self.base_url, base);
        debug!(%url, "fetching exchange rates");
        let latest: LatestRates = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(latest
            .rates
            .into_iter()
            .filter_map(|(code, rate)| Currency::new(&code).map(|c| (c, rate)))
            .collect())
    }
}

/// Fallback rates against `base`, cross-computed through USD.
pub fn fallback_rates(base: &Currency) -> RateTable {
    let usd: HashMap<&str, f64> = FALLBACK_USD_RATES.iter().copied().collect();
    let Some(base_per_usd) = usd.get(base.as_str()).copied() else {
        return RateTable::new();
    };
    FALLBACK_USD_RATES
        .iter()
        .filter_map(|(code, per_usd)| Currency::new(code).map(|c| (c, per_usd / base_per_usd)))
        .collect()
}

#[derive(Debug, Clone)]
struct CachedRates {
    rates: RateTable,
    fetched_at: DateTime<Utc>,
}

/// Per-base cache in front of a [`RateSource`].
pub struct ExchangeRates<S> {
    source: S,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cache: RwLock<HashMap<Currency, CachedRates>>,
}

impl<S: RateSource> ExchangeRates<S> {
    pub fn new(source: S, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            ttl,
            clock,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Units of `to` per one unit of `from`.
    pub async fn rate(&self, from: &Currency, to: &Currency) -> Result<f64, RateError> {
        if from == to {
            return Ok(1.0);
        }
        let table = self.rates_for(from).await;
        table
            .get(to)
            .copied()
            .ok_or_else(|| RateError::UnknownCurrency(to.clone()))
    }

    /// Every known rate against `base`, served from cache while fresh.
    pub async fn rates_for(&self, base: &Currency) -> RateTable {
        let now = self.clock.now();
        if let Some(cached) = self.cache.read().await.get(base) {
            if now - cached.fetched_at < self.ttl {
                return cached.rates.clone();
            }
        }

        let rates = match self.source.fetch(base).await {
            Ok(rates) if !rates.is_empty() => rates,
            Ok(_) => {
                warn!(%base, "rate provider returned no rates, using fallback table");
                fallback_rates(base)
            }
            Err(e) => {
                warn!(%base, reason = %e, "rate provider unavailable, using fallback table");
                fallback_rates(base)
            }
        };

        self.cache.write().await.insert(
            base.clone(),
            CachedRates {
                rates: rates.clone(),
                fetched_at: now,
            },
        );
        rates
    }
}
