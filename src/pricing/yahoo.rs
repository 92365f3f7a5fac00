use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Shared blocking client. Quote lookups run on blocking threads (the
/// analysis cycle is synchronous); one client reuses connections across
/// the whole ticker universe.
static HTTP: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent("Mozilla/5.0 (compatible; VantageBot/1.0)")
        .build()
        .expect("failed to build HTTP client")
});

/// Yahoo Finance quote response
#[derive(Debug, Deserialize)]
struct YahooQuoteResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    currency: Option<String>,
    #[allow(dead_code)]
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

/// Yahoo symbol search response (used for CUSIP resolution)
#[derive(Debug, Deserialize)]
struct YahooSearchResponse {
    quotes: Option<Vec<SearchQuote>>,
}

#[derive(Debug, Deserialize)]
struct SearchQuote {
    symbol: Option<String>,
    #[serde(rename = "quoteType")]
    quote_type: Option<String>,
}

/// Fetched price data
#[derive(Debug, Clone, Serialize)]
pub struct PriceData {
    pub ticker: String,
    pub price: Decimal,
    pub currency: String,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

/// Fetch the current price for a US-listed symbol from Yahoo Finance.
pub fn fetch_current_price(ticker: &str) -> Result<PriceData> {
    info!("Fetching current price for {} from Yahoo Finance", ticker);

    let url = format!(
        "https://query1.finance.yahoo.com/v8/finance/chart/{}",
        ticker
    );

    let response = HTTP
        .get(&url)
        .send()
        .context("Failed to send request to Yahoo Finance")?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Yahoo Finance returned error status: {}",
            response.status()
        ));
    }

    let data: YahooQuoteResponse = response
        .json()
        .context("Failed to parse Yahoo Finance response")?;

    if let Some(error) = data.chart.error {
        return Err(anyhow!(
            "Yahoo Finance API error: {} - {}",
            error.code,
            error.description
        ));
    }

    let result = data
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("No data returned from Yahoo Finance"))?;

    let price = result
        .meta
        .regular_market_price
        .ok_or_else(|| anyhow!("No price data available for {}", ticker))?;

    let currency = result.meta.currency.unwrap_or_else(|| "USD".to_string());

    Ok(PriceData {
        ticker: ticker.to_string(),
        price: Decimal::from_f64_retain(price).ok_or_else(|| anyhow!("Invalid price value"))?,
        currency,
        fetched_at: chrono::Utc::now(),
    })
}

/// Resolve a free-form query (a CUSIP, in practice) to a listed equity
/// symbol via the Yahoo search endpoint.
pub fn lookup_symbol(query: &str) -> Result<String> {
    let url = format!(
        "https://query1.finance.yahoo.com/v1/finance/search?q={}&quotesCount=1&newsCount=0",
        query
    );

    let response = HTTP
        .get(&url)
        .send()
        .context("Failed to send search request to Yahoo Finance")?
        .error_for_status()
        .context("Yahoo Finance search returned error status")?;

    let data: YahooSearchResponse = response
        .json()
        .context("Failed to parse Yahoo Finance search response")?;

    let symbol = data
        .quotes
        .unwrap_or_default()
        .into_iter()
        .filter(|q| {
            q.quote_type
                .as_deref()
                .map(|t| t.eq_ignore_ascii_case("EQUITY"))
                .unwrap_or(true)
        })
        .find_map(|q| q.symbol)
        .ok_or_else(|| anyhow!("No symbol match for '{}'", query))?;

    debug!("Resolved '{}' to symbol {}", query, symbol);
    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn should_skip_online_tests() -> bool {
        std::env::var("VANTAGE_SKIP_ONLINE_TESTS")
            .map(|v| v != "0")
            .unwrap_or(false)
    }

    #[test]
    fn test_fetch_current_price() {
        if should_skip_online_tests() {
            return;
        }

        let result = fetch_current_price("AAPL");
        if let Err(e) = &result {
            eprintln!("Skipping Yahoo current price test: {}", e);
            return;
        }
        let price_data = result.unwrap();

        assert_eq!(price_data.ticker, "AAPL");
        assert!(price_data.price > Decimal::ZERO);
        println!("AAPL price: $ {}", price_data.price);
    }

    #[test]
    fn test_lookup_symbol_by_cusip() {
        if should_skip_online_tests() {
            return;
        }

        // Apple's CUSIP
        let result = lookup_symbol("037833100");
        if let Err(e) = &result {
            eprintln!("Skipping Yahoo symbol lookup test: {}", e);
            return;
        }
        assert_eq!(result.unwrap(), "AAPL");
    }
}
