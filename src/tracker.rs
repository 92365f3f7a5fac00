//! Portfolio tracker orchestrator
//!
//! Owns the previous snapshot, the price cache and the sale ledger, and
//! drives one analysis cycle: wrap the raw filing rows into a snapshot,
//! diff against the stored one, record realized sales, resolve prices
//! through the cache, and assemble a report-ready result. All durable
//! state persists in a single transaction at the end of the cycle, so an
//! abort anywhere leaves the previous cycle's stores untouched.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::db;
use crate::diff::{self, ChangeEntry};
use crate::holdings::{HoldingsSnapshot, Position, RawPosition};
use crate::ledger::{SaleLedger, SaleRecord};
use crate::pricing::{PriceCache, PriceRecord};

/// Window for the "recent sales" report view.
pub const RECENT_SALES_DAYS: i64 = 30;

/// A current position joined with its resolved quote, when one was
/// available. `price` is None when the cache missed and the lookup
/// failed; the cycle still completes.
#[derive(Debug, Clone, Serialize)]
pub struct PricedHolding {
    pub position: Position,
    pub price: Option<Decimal>,
    pub market_value: Option<Decimal>,
}

/// Non-fatal conditions the report should surface prominently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleWarning {
    /// The filing returned zero positions while the stored snapshot has
    /// holdings. Closing the entire book in one cycle is almost always a
    /// scrape failure, so nothing was recorded or persisted.
    SuspectEmptyFiling,
}

impl fmt::Display for CycleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleWarning::SuspectEmptyFiling => write!(
                f,
                "filing returned zero positions while holdings exist; cycle was not persisted"
            ),
        }
    }
}

/// Everything the report writer needs from one cycle.
#[derive(Debug, Serialize)]
pub struct AnalysisResult {
    pub generated_at: DateTime<Utc>,
    pub change_entries: Vec<ChangeEntry>,
    pub holdings: Vec<PricedHolding>,
    pub recent_sales: Vec<SaleRecord>,
    pub sale_history: Vec<SaleRecord>,
    pub warning: Option<CycleWarning>,
}

/// Single-owner orchestrator for the process lifetime. No concurrent
/// cycles: one `run_cycle` completes before the next begins.
#[derive(Debug)]
pub struct PortfolioTracker {
    conn: Connection,
    previous: Option<HoldingsSnapshot>,
    cache: PriceCache,
    ledger: SaleLedger,
    confirm_empty_filings: bool,
}

impl PortfolioTracker {
    /// Open the database (creating the schema if needed) and load all
    /// three stores. Absent data means empty stores; data that fails to
    /// deserialize aborts here, before any cycle can persist on top of it.
    pub fn open(config: &TrackerConfig) -> Result<Self> {
        let path = match &config.db_path {
            Some(path) => path.clone(),
            None => db::default_db_path()?,
        };
        db::init_database(Some(path.clone()))?;
        let conn = db::open_db(Some(path))?;

        let previous = HoldingsSnapshot::load(&conn).context("Failed to load snapshot store")?;
        let cache = PriceCache::load(&conn, config.price_ttl())
            .context("Failed to load price cache store")?;
        let ledger = SaleLedger::load(&conn).context("Failed to load sale ledger store")?;

        debug!(
            "Loaded stores: snapshot={}, cache entries={}, ledger records={}",
            previous.as_ref().map_or(0, |s| s.len()),
            cache.len(),
            ledger.len()
        );

        Ok(Self {
            conn,
            previous,
            cache,
            ledger,
            confirm_empty_filings: config.confirm_empty_filings,
        })
    }

    pub fn previous_snapshot(&self) -> Option<&HoldingsSnapshot> {
        self.previous.as_ref()
    }

    pub fn ledger(&self) -> &SaleLedger {
        &self.ledger
    }

    pub fn price_cache(&self) -> &PriceCache {
        &self.cache
    }

    /// Run one analysis cycle.
    ///
    /// `lookup` is consulted only on cache MISS; a failure there degrades
    /// that ticker to an unpriced row and the cycle continues. The stored
    /// snapshot is replaced and all stores persist together only after
    /// the whole cycle has succeeded.
    pub fn run_cycle<F>(
        &mut self,
        raw_positions: Vec<RawPosition>,
        now: DateTime<Utc>,
        mut lookup: F,
    ) -> Result<AnalysisResult>
    where
        F: FnMut(&str) -> Result<Decimal>,
    {
        let snapshot = HoldingsSnapshot::from_raw(raw_positions, now);
        let change_entries = diff::diff(self.previous.as_ref(), &snapshot);

        let had_holdings = self.previous.as_ref().map_or(false, |p| !p.is_empty());
        if snapshot.is_empty() && had_holdings && !self.confirm_empty_filings {
            warn!(
                "Filing returned zero positions against {} held; flagging instead of persisting",
                self.previous.as_ref().map_or(0, |p| p.len())
            );
            return Ok(AnalysisResult {
                generated_at: now,
                change_entries,
                holdings: Vec::new(),
                recent_sales: self.recent_sales(now),
                sale_history: self.ledger.query(None),
                warning: Some(CycleWarning::SuspectEmptyFiling),
            });
        }

        for entry in change_entries.iter().filter(|e| e.category.is_sale()) {
            let record = self.ledger.record(entry, now)?;
            info!(
                "Recorded {} sale: {} x{} (remaining {})",
                record.sale_type.as_str(),
                record.ticker,
                record.shares_sold,
                record.remaining_shares
            );
        }

        let holdings = self.resolve_prices(&snapshot, now, &mut lookup);

        let recent_sales = self.recent_sales(now);
        let sale_history = self.ledger.query(None);

        let tx = self.conn.transaction().context("Failed to begin persist")?;
        snapshot.persist(&tx)?;
        self.cache.persist(&tx)?;
        self.ledger.persist(&tx)?;
        tx.commit().context("Failed to commit cycle state")?;

        self.previous = Some(snapshot);

        Ok(AnalysisResult {
            generated_at: now,
            change_entries,
            holdings,
            recent_sales,
            sale_history,
            warning: None,
        })
    }

    fn recent_sales(&self, now: DateTime<Utc>) -> Vec<SaleRecord> {
        self.ledger
            .query(Some(now - Duration::days(RECENT_SALES_DAYS)))
    }

    fn resolve_prices<F>(
        &mut self,
        snapshot: &HoldingsSnapshot,
        now: DateTime<Utc>,
        lookup: &mut F,
    ) -> Vec<PricedHolding>
    where
        F: FnMut(&str) -> Result<Decimal>,
    {
        let mut holdings = Vec::with_capacity(snapshot.len());
        for position in snapshot.positions() {
            let price = match self.cache.get(&position.ticker, now) {
                Some(record) => Some(record.price),
                None => match lookup(&position.ticker) {
                    Ok(price) => {
                        self.cache.put(PriceRecord {
                            ticker: position.ticker.clone(),
                            price,
                            fetched_at: now,
                        });
                        Some(price)
                    }
                    Err(e) => {
                        warn!(
                            "Price lookup failed for {}: {} (reported without a quote)",
                            position.ticker, e
                        );
                        None
                    }
                },
            };

            holdings.push(PricedHolding {
                position: position.clone(),
                price,
                market_value: price.map(|p| p * Decimal::from(position.shares)),
            });
        }
        holdings
    }
}
