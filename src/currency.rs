//! Currency conversion boundary.
//!
//! The aggregations never look rates up themselves; they receive a converter
//! `Fn(amount, from, to) -> Result<f64, ConversionError>`. [`RateTable`] is the
//! converter the service wires in, loaded once at startup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("unknown currency code {0:?}")]
    UnknownCurrency(String),
    #[error("converting {amount} from {from} to {to} did not produce a finite amount")]
    NonFinite {
        amount: f64,
        from: String,
        to: String,
    },
}

#[derive(Debug, Error)]
pub enum RateError {
    #[error("rate request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate for {code} must be a positive finite number, got {rate}")]
    InvalidRate { code: String, rate: f64 },
}

/// Runs `convert` and rejects NaN or infinite output, so a broken rate can't
/// leak into a monetary total.
pub fn convert_checked<F>(convert: &F, amount: f64, from: &str, to: &str) -> Result<f64, ConversionError>
where
    F: Fn(f64, &str, &str) -> Result<f64, ConversionError>,
{
    let converted = convert(amount, from, to)?;
    if converted.is_finite() {
        Ok(converted)
    } else {
        Err(ConversionError::NonFinite {
            amount,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Exchange rates quoted as units of each currency per one unit of `base`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    base: String,
    rates: HashMap<String, f64>,
}

impl RateTable {
    /// A table that only knows its base currency.
    pub fn new(base: &str) -> Self {
        let base = normalize(base);
        let rates = HashMap::from([(base.clone(), 1.0)]);
        RateTable { base, rates }
    }

    pub fn with_rates<I>(base: &str, rates: I) -> Result<Self, RateError>
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut table = RateTable::new(base);
        for (code, rate) in rates {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(RateError::InvalidRate { code, rate });
            }
            table.rates.insert(normalize(&code), rate);
        }
        Ok(table)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn knows(&self, code: &str) -> bool {
        self.rates.contains_key(&normalize(code))
    }

    fn rate(&self, code: &str) -> Result<f64, ConversionError> {
        self.rates
            .get(code)
            .copied()
            .ok_or_else(|| ConversionError::UnknownCurrency(code.to_string()))
    }

    /// Identity when both codes match; otherwise goes through the base currency.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, ConversionError> {
        let from = normalize(from);
        let to = normalize(to);
        if from == to {
            return Ok(amount);
        }
        Ok(amount / self.rate(&from)? * self.rate(&to)?)
    }
}

#[derive(Debug, Deserialize)]
struct RatesPayload {
    base: String,
    rates: HashMap<String, f64>,
}

/// Fetches `{ "base": "USD", "rates": { "EUR": 0.92, ... } }` from `url`.
pub async fn fetch_rates(client: &reqwest::Client, url: &str) -> Result<RateTable, RateError> {
    let payload: RatesPayload = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    RateTable::with_rates(&payload.base, payload.rates)
}

/// Loads the rate table for the service: remote rates when configured and
/// reachable, the configured fallback list otherwise.
pub async fn load_rates(config: &AppConfig) -> RateTable {
    if let Some(url) = &config.rates_url {
        match fetch_rates(&reqwest::Client::new(), url).await {
            Ok(table) => {
                tracing::info!(base = %table.base(), count = table.rates.len(), "loaded exchange rates");
                return table;
            }
            Err(error) => {
                tracing::warn!(%error, url = %url, "could not fetch exchange rates, using fallback rates");
            }
        }
    }

    match RateTable::with_rates(&config.base_currency, config.fallback_rates.clone()) {
        Ok(table) => table,
        Err(error) => {
            tracing::warn!(%error, "ignoring fallback rates");
            RateTable::new(&config.base_currency)
        }
    }
}
