// Pricing module - durable quote cache + Yahoo Finance client

pub mod yahoo;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::db::read_decimal;

/// One cached quote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceRecord {
    pub ticker: String,
    pub price: Decimal,
    pub fetched_at: DateTime<Utc>,
}

/// Ticker -> latest quote, with time-based expiry.
///
/// A `get` past the TTL is a MISS: the caller fetches a fresh quote from
/// the price collaborator and `put`s it back. There is no eviction beyond
/// the staleness check; the ticker universe is tens of positions, so every
/// known ticker is retained until overwritten.
#[derive(Debug)]
pub struct PriceCache {
    entries: HashMap<String, PriceRecord>,
    ttl: Duration,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True once `now - fetched_at` exceeds the TTL.
    pub fn is_expired(&self, record: &PriceRecord, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(record.fetched_at) > self.ttl
    }

    /// Cached record for a ticker, or None (MISS) when absent or expired.
    pub fn get(&self, ticker: &str, now: DateTime<Utc>) -> Option<&PriceRecord> {
        let record = self.entries.get(ticker)?;
        if self.is_expired(record, now) {
            debug!(
                "Cached price for {} is stale (age: {}m)",
                ticker,
                now.signed_duration_since(record.fetched_at).num_minutes()
            );
            return None;
        }
        Some(record)
    }

    pub fn put(&mut self, record: PriceRecord) {
        self.entries.insert(record.ticker.clone(), record);
    }

    /// Load the cache from disk. Expired rows are loaded as-is; `get`
    /// filters them, and the next cycle overwrites them.
    pub fn load(conn: &Connection, ttl: Duration) -> Result<PriceCache> {
        let mut stmt = conn.prepare("SELECT ticker, price, fetched_at FROM price_cache")?;
        let mut rows = stmt.query([])?;
        let mut entries = HashMap::new();
        while let Some(row) = rows.next()? {
            let ticker: String = row.get(0)?;
            let price = read_decimal(row, 1, "price_cache")?;
            let fetched_at: DateTime<Utc> = row.get(2)?;
            entries.insert(
                ticker.clone(),
                PriceRecord {
                    ticker,
                    price,
                    fetched_at,
                },
            );
        }
        Ok(PriceCache { entries, ttl })
    }

    /// Write the full cache, inside the caller's transaction.
    pub fn persist(&self, conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM price_cache", [])?;
        let mut stmt = conn
            .prepare("INSERT INTO price_cache (ticker, price, fetched_at) VALUES (?1, ?2, ?3)")?;
        for record in self.entries.values() {
            stmt.execute(params![
                record.ticker,
                record.price.to_string(),
                record.fetched_at
            ])?;
        }
        Ok(())
    }
}
