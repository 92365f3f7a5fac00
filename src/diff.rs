//! Snapshot diff engine
//!
//! Compares two consecutive holdings snapshots and classifies every ticker
//! in their union into exactly one change category. Output ordering is
//! fixed so reports reproduce byte-for-byte for the same inputs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::holdings::HoldingsSnapshot;

/// Change classification for one ticker between two snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChangeCategory {
    New,
    Closed,
    Increased,
    Decreased,
    Unchanged,
}

impl ChangeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeCategory::New => "NEW",
            ChangeCategory::Closed => "CLOSED",
            ChangeCategory::Increased => "INCREASED",
            ChangeCategory::Decreased => "DECREASED",
            ChangeCategory::Unchanged => "UNCHANGED",
        }
    }

    /// Report group order: sales first, then entries, then holds.
    pub fn group_rank(&self) -> u8 {
        match self {
            ChangeCategory::Closed => 0,
            ChangeCategory::Decreased => 1,
            ChangeCategory::New => 2,
            ChangeCategory::Increased => 3,
            ChangeCategory::Unchanged => 4,
        }
    }

    /// Categories that realize a sale and feed the ledger.
    pub fn is_sale(&self) -> bool {
        matches!(self, ChangeCategory::Closed | ChangeCategory::Decreased)
    }
}

impl FromStr for ChangeCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(ChangeCategory::New),
            "CLOSED" => Ok(ChangeCategory::Closed),
            "INCREASED" => Ok(ChangeCategory::Increased),
            "DECREASED" => Ok(ChangeCategory::Decreased),
            "UNCHANGED" => Ok(ChangeCategory::Unchanged),
            _ => Err(()),
        }
    }
}

/// One classified ticker. Produced fresh each cycle; only the sale
/// categories leave a durable trace (via the ledger).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEntry {
    pub ticker: String,
    pub category: ChangeCategory,
    pub previous_shares: i64,
    pub current_shares: i64,
    pub previous_value: Decimal,
    pub current_value: Decimal,
}

impl ChangeEntry {
    pub fn shares_delta(&self) -> i64 {
        self.current_shares - self.previous_shares
    }
}

/// Classify every ticker present in either snapshot.
///
/// With no previous snapshot (first-ever run) every current ticker is NEW:
/// bootstrap must not fabricate CLOSED/DECREASED noise. Entries come back
/// grouped {CLOSED, DECREASED, NEW, INCREASED, UNCHANGED}, ticker-ascending
/// within each group.
pub fn diff(previous: Option<&HoldingsSnapshot>, current: &HoldingsSnapshot) -> Vec<ChangeEntry> {
    let mut entries: Vec<ChangeEntry> = match previous {
        None => current
            .positions()
            .map(|pos| ChangeEntry {
                ticker: pos.ticker.clone(),
                category: ChangeCategory::New,
                previous_shares: 0,
                current_shares: pos.shares,
                previous_value: Decimal::ZERO,
                current_value: pos.value,
            })
            .collect(),
        Some(previous) => {
            let mut tickers: Vec<&str> = previous.tickers().chain(current.tickers()).collect();
            tickers.sort_unstable();
            tickers.dedup();

            tickers
                .into_iter()
                .map(|ticker| classify(ticker, previous, current))
                .collect()
        }
    };

    entries.sort_by(|a, b| {
        a.category
            .group_rank()
            .cmp(&b.category.group_rank())
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    entries
}

fn classify(ticker: &str, previous: &HoldingsSnapshot, current: &HoldingsSnapshot) -> ChangeEntry {
    let prev = previous.get(ticker);
    let cur = current.get(ticker);

    let previous_shares = prev.map_or(0, |p| p.shares);
    let current_shares = cur.map_or(0, |p| p.shares);
    let previous_value = prev.map_or(Decimal::ZERO, |p| p.value);
    let current_value = cur.map_or(Decimal::ZERO, |p| p.value);

    // Snapshots never hold zero-share positions, so "present" implies
    // shares > 0 on that side.
    let category = match (prev, cur) {
        (None, Some(_)) => ChangeCategory::New,
        (Some(_), None) => ChangeCategory::Closed,
        (Some(p), Some(c)) if c.shares > p.shares => ChangeCategory::Increased,
        (Some(p), Some(c)) if c.shares < p.shares => ChangeCategory::Decreased,
        (Some(_), Some(_)) => ChangeCategory::Unchanged,
        (None, None) => unreachable!("ticker came from the union of both snapshots"),
    };

    ChangeEntry {
        ticker: ticker.to_string(),
        category,
        previous_shares,
        current_shares,
        previous_value,
        current_value,
    }
}
