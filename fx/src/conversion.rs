//! Normalization of the provider feed to the base currency.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use ratekeeper_common::{CurrencyCode, Snapshot, BASE_CURRENCY, RATE_SCALE};

use crate::error::{FxError, FxResult};

/// Body of a successful provider response.
///
/// Rates are quoted against the provider's own base (USD on the free plan).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub base: Option<String>,
    pub rates: HashMap<String, Decimal>,
    /// Unix seconds of the quote.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Rebase a provider response on RUB.
///
/// With `usd_to_rub = rates["RUB"]`, every other currency becomes
/// `rates[C] / usd_to_rub`, rounded to [`RATE_SCALE`] digits. The RUB entry
/// itself is not emitted.
pub fn normalize(response: ProviderResponse, fetched_at: DateTime<Utc>) -> FxResult<Snapshot> {
    let usd_to_rub = *response.rates.get(BASE_CURRENCY).ok_or_else(|| {
        FxError::Format(format!("provider feed lacks the {} entry", BASE_CURRENCY))
    })?;

    if usd_to_rub <= Decimal::ZERO {
        return Err(FxError::Format(format!(
            "non-positive {} rate: {}",
            BASE_CURRENCY, usd_to_rub
        )));
    }

    let mut rates = BTreeMap::new();
    for (code, provider_rate) in &response.rates {
        if code == BASE_CURRENCY {
            continue;
        }

        let currency = CurrencyCode::parse(code).map_err(|e| FxError::Format(e.to_string()))?;
        if *provider_rate <= Decimal::ZERO {
            return Err(FxError::Format(format!(
                "non-positive rate for {}: {}",
                code, provider_rate
            )));
        }

        let value = provider_rate
            .checked_div(usd_to_rub)
            .ok_or_else(|| FxError::Format(format!("rate for {} out of range", code)))?
            .round_dp(RATE_SCALE);

        if value.is_zero() {
            warn!(currency = %code, provider_rate = %provider_rate, "Rate rounds to zero, dropped");
            continue;
        }

        rates.insert(currency, value);
    }

    let captured_at = response
        .timestamp
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or(fetched_at);

    info!(
        provider_base = response.base.as_deref().unwrap_or("USD"),
        usd_to_rub = %usd_to_rub,
        currencies_count = rates.len(),
        "Converted rates to RUB base"
    );

    Ok(Snapshot::new(rates, captured_at))
}
