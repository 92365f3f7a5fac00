//! Integration tests for the snapshot-diff and ledger engine
//!
//! These tests verify end-to-end cycle behavior over a real (temporary)
//! database:
//! - partial-sale and full-exit scenarios
//! - bootstrap classification
//! - idempotent re-runs
//! - restart/reload round-trips
//! - corrupt store handling
//! - price cache TTL across cycles
//! - empty-filing safeguards

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use vantage::config::TrackerConfig;
use vantage::diff::ChangeCategory;
use vantage::holdings::RawPosition;
use vantage::ledger::SaleType;
use vantage::tracker::{CycleWarning, PortfolioTracker};

/// Test helper: config pointing at a temporary database
fn test_config(dir: &TempDir) -> TrackerConfig {
    TrackerConfig {
        db_path: Some(dir.path().join("test.db")),
        ..TrackerConfig::default()
    }
}

fn raw(ticker: &str, shares: i64, value: Decimal) -> RawPosition {
    RawPosition {
        ticker: ticker.to_string(),
        shares,
        value,
    }
}

fn flat_price(price: Decimal) -> impl FnMut(&str) -> Result<Decimal> {
    move |_| Ok(price)
}

#[test]
fn test_partial_sale_and_new_position_scenario() -> Result<()> {
    let dir = TempDir::new()?;
    let mut tracker = PortfolioTracker::open(&test_config(&dir))?;
    let t0 = Utc::now();

    tracker.run_cycle(vec![raw("AAPL", 100, dec!(15000))], t0, flat_price(dec!(150)))?;

    let result = tracker.run_cycle(
        vec![raw("AAPL", 60, dec!(9000)), raw("MSFT", 50, dec!(20000))],
        t0 + Duration::hours(1),
        flat_price(dec!(150)),
    )?;

    let shape: Vec<(&'static str, &str)> = result
        .change_entries
        .iter()
        .map(|e| (e.category.as_str(), e.ticker.as_str()))
        .collect();
    assert_eq!(shape, vec![("DECREASED", "AAPL"), ("NEW", "MSFT")]);

    let aapl = &result.change_entries[0];
    assert_eq!(aapl.previous_shares, 100);
    assert_eq!(aapl.current_shares, 60);

    assert_eq!(result.sale_history.len(), 1);
    let sale = &result.sale_history[0];
    assert_eq!(sale.ticker, "AAPL");
    assert_eq!(sale.shares_sold, 40);
    assert_eq!(sale.sale_type, SaleType::Partial);
    assert_eq!(sale.remaining_shares, 60);
    Ok(())
}

#[test]
fn test_full_exit_with_remaining_positions() -> Result<()> {
    let dir = TempDir::new()?;
    let mut tracker = PortfolioTracker::open(&test_config(&dir))?;
    let t0 = Utc::now();

    tracker.run_cycle(
        vec![raw("KO", 200, dec!(12000)), raw("AAPL", 100, dec!(15000))],
        t0,
        flat_price(dec!(60)),
    )?;

    let result = tracker.run_cycle(
        vec![raw("AAPL", 100, dec!(15000))],
        t0 + Duration::hours(1),
        flat_price(dec!(60)),
    )?;

    let shape: Vec<(&'static str, &str)> = result
        .change_entries
        .iter()
        .map(|e| (e.category.as_str(), e.ticker.as_str()))
        .collect();
    assert_eq!(shape, vec![("CLOSED", "KO"), ("UNCHANGED", "AAPL")]);

    assert_eq!(result.sale_history.len(), 1);
    let sale = &result.sale_history[0];
    assert_eq!(sale.ticker, "KO");
    assert_eq!(sale.shares_sold, 200);
    assert_eq!(sale.sale_type, SaleType::FullExit);
    assert_eq!(sale.value_at_sale, dec!(12000));
    assert_eq!(sale.remaining_shares, 0);
    Ok(())
}

#[test]
fn test_confirmed_full_liquidation_records_every_exit() -> Result<()> {
    let dir = TempDir::new()?;
    let config = TrackerConfig {
        confirm_empty_filings: true,
        ..test_config(&dir)
    };
    let mut tracker = PortfolioTracker::open(&config)?;
    let t0 = Utc::now();

    tracker.run_cycle(vec![raw("KO", 200, dec!(12000))], t0, flat_price(dec!(60)))?;

    let result = tracker.run_cycle(vec![], t0 + Duration::hours(1), flat_price(dec!(60)))?;

    assert!(result.warning.is_none());
    assert_eq!(result.change_entries.len(), 1);
    assert_eq!(result.change_entries[0].category, ChangeCategory::Closed);
    assert_eq!(result.change_entries[0].previous_shares, 200);
    assert_eq!(result.change_entries[0].current_shares, 0);

    assert_eq!(result.sale_history.len(), 1);
    let sale = &result.sale_history[0];
    assert_eq!(sale.ticker, "KO");
    assert_eq!(sale.shares_sold, 200);
    assert_eq!(sale.sale_type, SaleType::FullExit);

    // The emptied snapshot persisted.
    let reopened = PortfolioTracker::open(&config)?;
    assert!(reopened.previous_snapshot().unwrap().is_empty());
    assert_eq!(reopened.ledger().len(), 1);
    Ok(())
}

#[test]
fn test_unconfirmed_empty_filing_is_held() -> Result<()> {
    let dir = TempDir::new()?;
    let config = test_config(&dir);
    let mut tracker = PortfolioTracker::open(&config)?;
    let t0 = Utc::now();

    tracker.run_cycle(vec![raw("KO", 200, dec!(12000))], t0, flat_price(dec!(60)))?;

    let result = tracker.run_cycle(vec![], t0 + Duration::hours(1), flat_price(dec!(60)))?;
    assert_eq!(result.warning, Some(CycleWarning::SuspectEmptyFiling));
    assert!(result.sale_history.is_empty());

    // Stored state is untouched: KO is still held, nothing hit the ledger.
    let reopened = PortfolioTracker::open(&config)?;
    assert!(reopened.previous_snapshot().unwrap().contains("KO"));
    assert!(reopened.ledger().is_empty());
    Ok(())
}

#[test]
fn test_rerun_of_unchanged_filing_appends_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let mut tracker = PortfolioTracker::open(&test_config(&dir))?;
    let t0 = Utc::now();

    tracker.run_cycle(vec![raw("AAPL", 100, dec!(15000))], t0, flat_price(dec!(150)))?;
    tracker.run_cycle(
        vec![raw("AAPL", 60, dec!(9000))],
        t0 + Duration::hours(1),
        flat_price(dec!(150)),
    )?;
    assert_eq!(tracker.ledger().len(), 1);

    // The quarterly filing has not changed between polls; the hourly
    // cycle must not duplicate the sale.
    let result = tracker.run_cycle(
        vec![raw("AAPL", 60, dec!(9000))],
        t0 + Duration::hours(2),
        flat_price(dec!(150)),
    )?;
    assert!(result
        .change_entries
        .iter()
        .all(|e| e.category == ChangeCategory::Unchanged));
    assert_eq!(result.sale_history.len(), 1);
    assert_eq!(tracker.ledger().len(), 1);
    Ok(())
}

#[test]
fn test_state_survives_restart() -> Result<()> {
    let dir = TempDir::new()?;
    let config = test_config(&dir);
    let t0 = Utc::now();

    {
        let mut tracker = PortfolioTracker::open(&config)?;
        tracker.run_cycle(
            vec![raw("AAPL", 100, dec!(15000)), raw("KO", 200, dec!(12000))],
            t0,
            flat_price(dec!(100)),
        )?;
        tracker.run_cycle(
            vec![raw("AAPL", 60, dec!(9000)), raw("KO", 200, dec!(12000))],
            t0 + Duration::minutes(5),
            flat_price(dec!(100)),
        )?;
    }

    // A fresh process sees the same snapshot, cache and ledger.
    let mut tracker = PortfolioTracker::open(&config)?;
    let snapshot = tracker.previous_snapshot().expect("snapshot persisted");
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get("AAPL").unwrap().shares, 60);
    assert_eq!(tracker.price_cache().len(), 2);
    assert_eq!(tracker.ledger().len(), 1);
    let record = &tracker.ledger().query(None)[0];
    assert!(record.id.is_some());
    assert_eq!(record.shares_sold, 40);

    // Diffing the reloaded snapshot against the same filing stays quiet.
    let result = tracker.run_cycle(
        vec![raw("AAPL", 60, dec!(9000)), raw("KO", 200, dec!(12000))],
        t0 + Duration::minutes(10),
        flat_price(dec!(100)),
    )?;
    assert!(result
        .change_entries
        .iter()
        .all(|e| e.category == ChangeCategory::Unchanged));
    assert_eq!(tracker.ledger().len(), 1);
    Ok(())
}

#[test]
fn test_bootstrap_then_reentry_is_new_again() -> Result<()> {
    let dir = TempDir::new()?;
    let mut tracker = PortfolioTracker::open(&test_config(&dir))?;
    let t0 = Utc::now();

    tracker.run_cycle(
        vec![raw("AAPL", 100, dec!(15000)), raw("KO", 50, dec!(3000))],
        t0,
        flat_price(dec!(60)),
    )?;
    tracker.run_cycle(
        vec![raw("AAPL", 100, dec!(15000))],
        t0 + Duration::hours(1),
        flat_price(dec!(60)),
    )?;

    // KO re-enters after a full exit: plain NEW, no special casing.
    let result = tracker.run_cycle(
        vec![raw("AAPL", 100, dec!(15000)), raw("KO", 75, dec!(4500))],
        t0 + Duration::hours(2),
        flat_price(dec!(60)),
    )?;
    let ko = result
        .change_entries
        .iter()
        .find(|e| e.ticker == "KO")
        .unwrap();
    assert_eq!(ko.category, ChangeCategory::New);
    assert_eq!(ko.previous_shares, 0);

    // Only the original exit is in the ledger.
    assert_eq!(tracker.ledger().len(), 1);
    assert_eq!(tracker.ledger().query(None)[0].sale_type, SaleType::FullExit);
    Ok(())
}

#[test]
fn test_price_cache_expires_across_cycles() -> Result<()> {
    let dir = TempDir::new()?;
    let mut tracker = PortfolioTracker::open(&test_config(&dir))?;
    let t0 = Utc::now();
    let positions = || vec![raw("AAPL", 100, dec!(15000))];

    let calls = std::cell::Cell::new(0usize);
    let counting = |_: &str| {
        calls.set(calls.get() + 1);
        Ok(dec!(150))
    };

    tracker.run_cycle(positions(), t0, counting)?;
    tracker.run_cycle(positions(), t0 + Duration::minutes(30), counting)?;
    assert_eq!(calls.get(), 1, "30 minutes is within the 1h TTL");

    tracker.run_cycle(positions(), t0 + Duration::hours(2), counting)?;
    assert_eq!(calls.get(), 2, "2 hours is past the TTL; a refetch is required");
    Ok(())
}

#[test]
fn test_corrupt_ledger_blocks_open() -> Result<()> {
    let dir = TempDir::new()?;
    let config = test_config(&dir);

    {
        let mut tracker = PortfolioTracker::open(&config)?;
        tracker.run_cycle(vec![raw("KO", 200, dec!(12000))], Utc::now(), flat_price(dec!(60)))?;
    }

    // Sabotage the store the way a torn write would.
    let conn = Connection::open(dir.path().join("test.db"))?;
    conn.execute(
        "INSERT INTO sale_ledger
            (ticker, shares_sold, sale_type, value_at_sale, remaining_shares, recorded_at)
         VALUES ('KO', 200, 'COMPLETE', '12000', 0, '2026-01-01T00:00:00Z')",
        [],
    )?;
    drop(conn);

    let err = PortfolioTracker::open(&config).unwrap_err();
    assert!(format!("{:#}", err).contains("corrupt store"));
    Ok(())
}

#[test]
fn test_corrupt_price_cache_blocks_open() -> Result<()> {
    let dir = TempDir::new()?;
    let config = test_config(&dir);

    {
        let mut tracker = PortfolioTracker::open(&config)?;
        tracker.run_cycle(vec![raw("KO", 200, dec!(12000))], Utc::now(), flat_price(dec!(60)))?;
    }

    let conn = Connection::open(dir.path().join("test.db"))?;
    conn.execute("UPDATE price_cache SET price = 'NaN-ish' WHERE ticker = 'KO'", [])?;
    drop(conn);

    let err = PortfolioTracker::open(&config).unwrap_err();
    assert!(format!("{:#}", err).contains("corrupt store"));
    Ok(())
}

#[test]
fn test_sale_query_windows() -> Result<()> {
    let dir = TempDir::new()?;
    let mut tracker = PortfolioTracker::open(&test_config(&dir))?;
    let t0: DateTime<Utc> = Utc::now() - Duration::days(45);

    tracker.run_cycle(
        vec![raw("AAPL", 100, dec!(15000)), raw("KO", 200, dec!(12000))],
        t0,
        flat_price(dec!(100)),
    )?;
    // 45 days ago: KO exits.
    tracker.run_cycle(
        vec![raw("AAPL", 100, dec!(15000))],
        t0 + Duration::hours(1),
        flat_price(dec!(100)),
    )?;
    // 5 days ago: AAPL trimmed.
    let result = tracker.run_cycle(
        vec![raw("AAPL", 60, dec!(9000))],
        Utc::now() - Duration::days(5),
        flat_price(dec!(100)),
    )?;

    assert_eq!(result.sale_history.len(), 2);
    assert!(result.sale_history[0].recorded_at <= result.sale_history[1].recorded_at);

    // Only the recent trim falls inside the 30-day window.
    assert_eq!(result.recent_sales.len(), 1);
    assert_eq!(result.recent_sales[0].ticker, "AAPL");
    Ok(())
}
