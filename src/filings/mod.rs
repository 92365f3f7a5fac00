//! Filing ingestion
//!
//! Turns the filer's latest 13F information table into the raw position
//! rows the tracker consumes. 13F entries are keyed by CUSIP; tickers come
//! from config overrides, a built-in table of common issuers, or a remote
//! symbol lookup, in that order. Holdings whose CUSIP cannot be resolved
//! are skipped with a warning rather than failing the cycle.

pub mod edgar;

use anyhow::Result;
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::holdings::RawPosition;
use crate::pricing::yahoo;

use edgar::FilingHolding;

/// CUSIPs of issuers that show up in the tracked filings cycle after
/// cycle. Saves a remote lookup per holding per cycle.
static KNOWN_CUSIPS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("037833100", "AAPL"),
        ("025816109", "AXP"),
        ("060505104", "BAC"),
        ("166764100", "CVX"),
        ("191216100", "KO"),
        ("500754106", "KHC"),
        ("615369105", "MCO"),
        ("674599105", "OXY"),
        ("22160K105", "COST"),
        ("92826C839", "V"),
    ])
});

/// Fetch the latest filing and convert it to raw positions.
pub fn fetch_latest_positions(config: &TrackerConfig) -> Result<Vec<RawPosition>> {
    let holdings = edgar::fetch_latest_holdings(&config.cik, &config.user_agent)
        .map_err(|e| TrackerError::FetchFailure(format!("13F retrieval failed: {:#}", e)))?;
    Ok(to_raw_positions(holdings, &config.cusip_overrides))
}

/// Resolve tickers and merge multiple info-table rows per issuer (13F
/// filings split a position across discretion classes).
pub fn to_raw_positions(
    holdings: Vec<FilingHolding>,
    overrides: &HashMap<String, String>,
) -> Vec<RawPosition> {
    let mut merged: BTreeMap<String, RawPosition> = BTreeMap::new();
    let mut skipped = 0usize;

    for holding in holdings {
        let Some(ticker) = resolve_ticker(&holding.cusip, overrides) else {
            warn!(
                "No ticker for CUSIP {} ({}); skipping",
                holding.cusip, holding.issuer
            );
            skipped += 1;
            continue;
        };

        merged
            .entry(ticker.clone())
            .and_modify(|pos| {
                pos.shares += holding.shares;
                pos.value += holding.value;
            })
            .or_insert(RawPosition {
                ticker,
                shares: holding.shares,
                value: holding.value,
            });
    }

    if skipped > 0 {
        info!("Skipped {} filing rows with unresolved CUSIPs", skipped);
    }
    merged.into_values().collect()
}

fn resolve_ticker(cusip: &str, overrides: &HashMap<String, String>) -> Option<String> {
    if let Some(ticker) = overrides.get(cusip) {
        return Some(ticker.clone());
    }
    if let Some(ticker) = KNOWN_CUSIPS.get(cusip) {
        return Some((*ticker).to_string());
    }
    match yahoo::lookup_symbol(cusip) {
        Ok(symbol) => Some(symbol),
        Err(e) => {
            warn!("Remote symbol lookup failed for CUSIP {}: {}", cusip, e);
            None
        }
    }
}
