//! Holdings snapshots
//!
//! A snapshot is the immutable point-in-time state of the portfolio as
//! reported by one regulatory filing. Snapshots are superseded, never
//! mutated; the diff engine compares consecutive ones.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::db::read_decimal;

/// One already-parsed position row as supplied by the filing collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPosition {
    pub ticker: String,
    pub shares: i64,
    pub value: Decimal,
}

/// A held position within a snapshot. Shares are always positive: a
/// position sold to zero is removed from the set, not stored with 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub shares: i64,
    pub value: Decimal,
}

/// Immutable point-in-time portfolio state, keyed by ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldingsSnapshot {
    filed_at: DateTime<Utc>,
    positions: BTreeMap<String, Position>,
}

impl HoldingsSnapshot {
    /// Build a snapshot from raw filing rows.
    ///
    /// Zero-share rows are dropped here so a decrease-to-zero always
    /// surfaces as CLOSED downstream, never as DECREASED with 0 left.
    /// Duplicate tickers keep the last row, matching the filing order.
    pub fn from_raw(raw: Vec<RawPosition>, filed_at: DateTime<Utc>) -> Self {
        let mut positions = BTreeMap::new();
        for row in raw {
            if row.shares <= 0 {
                debug!("Dropping zero-share filing row for {}", row.ticker);
                continue;
            }
            positions.insert(
                row.ticker.clone(),
                Position {
                    ticker: row.ticker,
                    shares: row.shares,
                    value: row.value,
                },
            );
        }
        Self {
            filed_at,
            positions,
        }
    }

    pub fn filed_at(&self) -> DateTime<Utc> {
        self.filed_at
    }

    pub fn get(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.positions.contains_key(ticker)
    }

    /// Positions in ascending ticker order.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Total reported market value across positions.
    pub fn total_value(&self) -> Decimal {
        self.positions.values().map(|p| p.value).sum()
    }

    /// Load the stored snapshot, if any. A database without a snapshot row
    /// is a valid first-run state, not an error.
    pub fn load(conn: &Connection) -> Result<Option<HoldingsSnapshot>> {
        let filed_at: Option<DateTime<Utc>> = conn
            .query_row("SELECT filed_at FROM snapshot_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .context("Failed to load snapshot store")?;

        let Some(filed_at) = filed_at else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT ticker, shares, value FROM snapshot_positions ORDER BY ticker")?;
        let mut rows = stmt.query([])?;
        let mut positions = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let ticker: String = row.get(0)?;
            let shares: i64 = row.get(1)?;
            let value = read_decimal(row, 2, "snapshot")?;
            positions.insert(
                ticker.clone(),
                Position {
                    ticker,
                    shares,
                    value,
                },
            );
        }

        Ok(Some(HoldingsSnapshot {
            filed_at,
            positions,
        }))
    }

    /// Replace the stored snapshot with this one, inside the caller's
    /// transaction.
    pub fn persist(&self, conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM snapshot_positions", [])?;
        conn.execute("DELETE FROM snapshot_meta", [])?;
        conn.execute(
            "INSERT INTO snapshot_meta (id, filed_at) VALUES (1, ?1)",
            params![self.filed_at],
        )?;

        let mut stmt = conn.prepare(
            "INSERT INTO snapshot_positions (ticker, shares, value) VALUES (?1, ?2, ?3)",
        )?;
        for position in self.positions.values() {
            stmt.execute(params![
                position.ticker,
                position.shares,
                position.value.to_string()
            ])?;
        }
        Ok(())
    }
}
