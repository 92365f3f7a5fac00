//! Report rendering
//!
//! Turns an `AnalysisResult` into the plain-text analysis report and
//! writes it to a timestamped file. Rendering is deterministic for a
//! given result: the diff engine hands over category-grouped,
//! ticker-sorted entries and the ledger hands over chronologically
//! sorted records, so identical inputs produce identical bytes.

use anyhow::{Context, Result};
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::info;

use crate::diff::ChangeCategory;
use crate::ledger::{SaleRecord, SaleType};
use crate::tracker::AnalysisResult;
use crate::utils::{format_currency, format_shares};

const RULE_WIDTH: usize = 60;
const SECTION_WIDTH: usize = 40;

#[derive(Tabled)]
struct HoldingRow {
    #[tabled(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Shares")]
    shares: String,
    #[tabled(rename = "Reported Value")]
    reported_value: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Market Value")]
    market_value: String,
}

#[derive(Tabled)]
struct SaleRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Type")]
    sale_type: String,
    #[tabled(rename = "Shares Sold")]
    shares_sold: String,
    #[tabled(rename = "Sale Value")]
    sale_value: String,
    #[tabled(rename = "Remaining")]
    remaining: String,
}

/// Render the full analysis report.
pub fn render(result: &AnalysisResult) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Institutional Portfolio Analysis Report - {}",
        result.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    out.push('\n');

    if let Some(warning) = &result.warning {
        let _ = writeln!(out, "!! WARNING: {}", warning);
        out.push('\n');
    }

    render_completely_sold(&mut out, result);
    render_sales_section(&mut out, "RECENT SALES ACTIVITY", &result.recent_sales);
    render_sales_section(&mut out, "ALL HISTORICAL SALES", &result.sale_history);
    render_changes(&mut out, result);
    render_holdings(&mut out, result);

    out
}

/// Write the rendered report to `dir` under a timestamped name and
/// return the path.
pub fn write_report(dir: &Path, result: &AnalysisResult) -> Result<PathBuf> {
    let filename = format!(
        "vantage_analysis_{}.txt",
        result.generated_at.format("%Y%m%d_%H%M")
    );
    let path = dir.join(filename);
    std::fs::write(&path, render(result))
        .with_context(|| format!("Failed to write report to {:?}", path))?;
    info!("Report saved to {:?}", path);
    Ok(path)
}

fn section_header(out: &mut String, title: &str) {
    let _ = writeln!(out, "{}:", title);
    let _ = writeln!(out, "{}", "=".repeat(SECTION_WIDTH));
    out.push('\n');
}

/// Full exits whose ticker never re-entered the current holdings,
/// newest first.
fn render_completely_sold(out: &mut String, result: &AnalysisResult) {
    section_header(out, "COMPLETELY SOLD POSITIONS (NO LONGER HELD)");

    let held: BTreeSet<&str> = result
        .holdings
        .iter()
        .map(|h| h.position.ticker.as_str())
        .collect();

    let exited: Vec<&SaleRecord> = result
        .sale_history
        .iter()
        .rev()
        .filter(|r| r.sale_type == SaleType::FullExit && !held.contains(r.ticker.as_str()))
        .collect();

    if exited.is_empty() {
        let _ = writeln!(out, "No completely sold positions recorded yet.");
    } else {
        for sale in exited {
            let _ = writeln!(out, "Stock: {}", sale.ticker);
            let _ = writeln!(out, "Exit Date: {}", sale.recorded_at.format("%Y-%m-%d"));
            let _ = writeln!(out, "Total Shares Sold: {}", format_shares(sale.shares_sold));
            let _ = writeln!(out, "Exit Value: {}", format_currency(sale.value_at_sale));
            let _ = writeln!(out, "{}", "-".repeat(30));
        }
    }
    out.push('\n');
}

fn render_sales_section(out: &mut String, title: &str, sales: &[SaleRecord]) {
    section_header(out, title);

    if sales.is_empty() {
        let _ = writeln!(out, "No sales recorded for this window.");
        out.push('\n');
        return;
    }

    let rows: Vec<SaleRow> = sales
        .iter()
        .rev() // newest first for reading
        .map(|sale| SaleRow {
            date: sale.recorded_at.format("%Y-%m-%d").to_string(),
            ticker: sale.ticker.clone(),
            sale_type: match sale.sale_type {
                SaleType::FullExit => "Full exit".to_string(),
                SaleType::Partial => "Partial".to_string(),
            },
            shares_sold: format_shares(sale.shares_sold),
            sale_value: format_currency(sale.value_at_sale),
            remaining: format_shares(sale.remaining_shares),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    let _ = writeln!(out, "{}", table);
    out.push('\n');
}

fn render_changes(out: &mut String, result: &AnalysisResult) {
    section_header(out, "POSITION CHANGES SINCE LAST FILING");

    if result.change_entries.is_empty() {
        let _ = writeln!(out, "No positions to compare.");
        out.push('\n');
        return;
    }

    // Entries arrive grouped by category; chunk and render each group.
    for (category, group) in &result.change_entries.iter().chunk_by(|e| e.category) {
        match category {
            ChangeCategory::Closed => {
                let _ = writeln!(out, "NEWLY CLOSED POSITIONS (COMPLETE SALES):");
                for entry in group {
                    let _ = writeln!(
                        out,
                        "- {}: sold all {} shares ({})",
                        entry.ticker,
                        format_shares(entry.previous_shares),
                        format_currency(entry.previous_value)
                    );
                }
            }
            ChangeCategory::Decreased => {
                let _ = writeln!(out, "DECREASED POSITIONS (PARTIAL SALES):");
                for entry in group {
                    let _ = writeln!(
                        out,
                        "- {}: reduced by {} shares, {} remain",
                        entry.ticker,
                        format_shares(entry.previous_shares - entry.current_shares),
                        format_shares(entry.current_shares)
                    );
                }
            }
            ChangeCategory::New => {
                let _ = writeln!(out, "NEW POSITIONS:");
                for entry in group {
                    let _ = writeln!(
                        out,
                        "+ {}: {} shares ({})",
                        entry.ticker,
                        format_shares(entry.current_shares),
                        format_currency(entry.current_value)
                    );
                }
            }
            ChangeCategory::Increased => {
                let _ = writeln!(out, "INCREASED POSITIONS:");
                for entry in group {
                    let _ = writeln!(
                        out,
                        "+ {}: added {} shares, now {}",
                        entry.ticker,
                        format_shares(entry.current_shares - entry.previous_shares),
                        format_shares(entry.current_shares)
                    );
                }
            }
            ChangeCategory::Unchanged => {
                let _ = writeln!(out, "UNCHANGED POSITIONS: {}", group.count());
            }
        }
        out.push('\n');
    }
}

fn render_holdings(out: &mut String, result: &AnalysisResult) {
    section_header(out, "CURRENT HOLDINGS SUMMARY");

    if result.holdings.is_empty() {
        let _ = writeln!(out, "No current holdings.");
        out.push('\n');
        return;
    }

    let rows: Vec<HoldingRow> = result
        .holdings
        .iter()
        .map(|holding| HoldingRow {
            ticker: holding.position.ticker.clone(),
            shares: format_shares(holding.position.shares),
            reported_value: format_currency(holding.position.value),
            price: holding
                .price
                .map_or_else(|| "unavailable".to_string(), format_currency),
            market_value: holding
                .market_value
                .map_or_else(|| "-".to_string(), format_currency),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    let _ = writeln!(out, "{}", table);
    out.push('\n');
}
