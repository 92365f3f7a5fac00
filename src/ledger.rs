//! Sale ledger
//!
//! Durable, append-only record of realized sale events (full exits and
//! partial sales) derived from snapshot diffs. Records are never mutated
//! or removed once written; the "last 30 days" and "complete history"
//! report views are both served by `query`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::db::read_decimal;
use crate::diff::ChangeEntry;
use crate::error::TrackerError;

/// Kind of realized sale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SaleType {
    /// The position went to zero shares in the corresponding snapshot.
    FullExit,
    Partial,
}

impl SaleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleType::FullExit => "FULL_EXIT",
            SaleType::Partial => "PARTIAL",
        }
    }
}

impl FromStr for SaleType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FULL_EXIT" => Ok(SaleType::FullExit),
            "PARTIAL" => Ok(SaleType::Partial),
            _ => Err(()),
        }
    }
}

/// One realized sale event. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaleRecord {
    pub id: Option<i64>,
    pub ticker: String,
    pub shares_sold: i64,
    pub sale_type: SaleType,
    pub value_at_sale: Decimal,
    pub remaining_shares: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only ledger of sale events with SQLite durability.
#[derive(Debug, Default)]
pub struct SaleLedger {
    records: Vec<SaleRecord>,
}

impl SaleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Derive a sale record from a CLOSED or DECREASED change entry and
    /// append it.
    ///
    /// Partial sales are valued at the current filing's per-share value;
    /// full exits at the previous filing's, since no current value exists
    /// for a ticker that left the portfolio. The caller is responsible for
    /// invoking this at most once per snapshot transition.
    pub fn record(&mut self, entry: &ChangeEntry, now: DateTime<Utc>) -> Result<SaleRecord> {
        if !entry.category.is_sale() {
            return Err(TrackerError::ValidationError(format!(
                "{} entry for {} is not a sale",
                entry.category.as_str(),
                entry.ticker
            ))
            .into());
        }

        let shares_sold = entry.previous_shares - entry.current_shares;
        if shares_sold <= 0 {
            return Err(TrackerError::ValidationError(format!(
                "sale entry for {} has non-positive shares_sold ({})",
                entry.ticker, shares_sold
            ))
            .into());
        }

        let per_share = if entry.current_shares > 0 {
            entry.current_value / Decimal::from(entry.current_shares)
        } else if entry.previous_shares > 0 {
            entry.previous_value / Decimal::from(entry.previous_shares)
        } else {
            Decimal::ZERO
        };

        let record = SaleRecord {
            id: None,
            ticker: entry.ticker.clone(),
            shares_sold,
            sale_type: if entry.current_shares == 0 {
                SaleType::FullExit
            } else {
                SaleType::Partial
            },
            value_at_sale: per_share * Decimal::from(shares_sold),
            remaining_shares: entry.current_shares,
            recorded_at: now,
        };

        self.records.push(record.clone());
        Ok(record)
    }

    /// Records with `recorded_at >= since` (all records when `since` is
    /// None), in ascending chronological order.
    pub fn query(&self, since: Option<DateTime<Utc>>) -> Vec<SaleRecord> {
        let mut matched: Vec<SaleRecord> = self
            .records
            .iter()
            .filter(|r| since.map_or(true, |t| r.recorded_at >= t))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then(a.id.cmp(&b.id)));
        matched
    }

    /// Load the full ledger. An empty table is a valid first-run state.
    pub fn load(conn: &Connection) -> Result<SaleLedger> {
        let mut stmt = conn.prepare(
            "SELECT id, ticker, shares_sold, sale_type, value_at_sale,
                    remaining_shares, recorded_at
             FROM sale_ledger
             ORDER BY recorded_at, id",
        )?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let sale_type_raw: String = row.get(3)?;
            let sale_type = sale_type_raw.parse::<SaleType>().map_err(|_| {
                TrackerError::corrupt(
                    "sale_ledger",
                    format!("unknown sale type '{}'", sale_type_raw),
                )
            })?;

            records.push(SaleRecord {
                id: Some(row.get(0)?),
                ticker: row.get(1)?,
                shares_sold: row.get(2)?,
                sale_type,
                value_at_sale: read_decimal(row, 4, "sale_ledger")?,
                remaining_shares: row.get(5)?,
                recorded_at: row.get(6)?,
            });
        }
        Ok(SaleLedger { records })
    }

    /// Append records not yet on disk, inside the caller's transaction.
    /// Existing rows are never touched.
    pub fn persist(&mut self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(
            "INSERT INTO sale_ledger
                (ticker, shares_sold, sale_type, value_at_sale, remaining_shares, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for record in self.records.iter_mut().filter(|r| r.id.is_none()) {
            stmt.execute(params![
                record.ticker,
                record.shares_sold,
                record.sale_type.as_str(),
                record.value_at_sale.to_string(),
                record.remaining_shares,
                record.recorded_at,
            ])?;
            record.id = Some(conn.last_insert_rowid());
        }
        Ok(())
    }
}
