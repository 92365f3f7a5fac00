use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use colored::Colorize;
use tracing::{error, info};

use vantage::cli::{Cli, Commands};
use vantage::config::TrackerConfig;
use vantage::diff::ChangeCategory;
use vantage::tracker::{AnalysisResult, PortfolioTracker};
use vantage::utils::{format_currency, format_shares};
use vantage::{db, filings, pricing, reports};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = TrackerConfig::load()?;

    match cli.command {
        Commands::Init => {
            db::init_database(config.db_path.clone())?;
            println!("{} Database initialized", "✓".green().bold());
            Ok(())
        }

        Commands::Run { print } => run_once(&config, print, cli.json).await,

        Commands::Watch { interval } => {
            let interval = interval.unwrap_or(config.poll_interval_secs);
            info!("Watching filings every {}s (Ctrl+C to stop)", interval);
            loop {
                if let Err(e) = run_once(&config, false, cli.json).await {
                    error!("Analysis cycle failed: {:#}", e);
                }
                tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
            }
        }

        Commands::Holdings => show_holdings(&config, cli.json),

        Commands::History { days } => show_history(&config, days, cli.json),
    }
}

/// Fetch the latest filing and run one full analysis cycle.
///
/// The cycle itself is synchronous (filing fetch, SQLite, per-ticker
/// quote lookups), so the whole thing runs on a blocking thread.
async fn run_once(config: &TrackerConfig, print: bool, json: bool) -> Result<()> {
    let cycle_config = config.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<AnalysisResult> {
        let raw_positions = filings::fetch_latest_positions(&cycle_config)?;
        let mut tracker = PortfolioTracker::open(&cycle_config)?;
        tracker.run_cycle(raw_positions, Utc::now(), |ticker| {
            pricing::yahoo::fetch_current_price(ticker).map(|quote| quote.price)
        })
    })
    .await
    .context("Analysis cycle task panicked")??;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print_cycle_summary(&result);

    let report_dir = match &config.report_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let path = reports::write_report(&report_dir, &result)?;
    println!("{} Report saved to {}", "✓".green().bold(), path.display());

    if print {
        println!("\n{}", reports::render(&result));
    }
    Ok(())
}

fn print_cycle_summary(result: &AnalysisResult) {
    if let Some(warning) = &result.warning {
        println!("{} {}", "!".yellow().bold(), warning);
    }

    let count = |category: ChangeCategory| {
        result
            .change_entries
            .iter()
            .filter(|e| e.category == category)
            .count()
    };
    println!(
        "{} {} holdings: {} new, {} closed, {} increased, {} decreased, {} unchanged",
        "✓".green().bold(),
        result.holdings.len(),
        count(ChangeCategory::New),
        count(ChangeCategory::Closed),
        count(ChangeCategory::Increased),
        count(ChangeCategory::Decreased),
        count(ChangeCategory::Unchanged),
    );
}

fn show_holdings(config: &TrackerConfig, json: bool) -> Result<()> {
    use tabled::{settings::Style, Table, Tabled};

    let tracker = PortfolioTracker::open(config)?;
    let Some(snapshot) = tracker.previous_snapshot() else {
        println!("No holdings snapshot stored yet. Run `vantage run` first.");
        return Ok(());
    };

    if json {
        let positions: Vec<_> = snapshot.positions().collect();
        println!("{}", serde_json::to_string_pretty(&positions)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct PositionRow {
        #[tabled(rename = "Ticker")]
        ticker: String,
        #[tabled(rename = "Shares")]
        shares: String,
        #[tabled(rename = "Reported Value")]
        value: String,
    }

    let rows: Vec<PositionRow> = snapshot
        .positions()
        .map(|p| PositionRow {
            ticker: p.ticker.clone(),
            shares: format_shares(p.shares),
            value: format_currency(p.value),
        })
        .collect();

    println!(
        "Snapshot filed at {} ({} positions)\n",
        snapshot.filed_at().format("%Y-%m-%d %H:%M UTC"),
        snapshot.len()
    );
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    println!(
        "\nTotal reported value: {}",
        format_currency(snapshot.total_value())
    );
    Ok(())
}

fn show_history(config: &TrackerConfig, days: Option<i64>, json: bool) -> Result<()> {
    use tabled::{settings::Style, Table, Tabled};

    let tracker = PortfolioTracker::open(config)?;
    let since = days.map(|d| Utc::now() - Duration::days(d));
    let sales = tracker.ledger().query(since);

    if json {
        println!("{}", serde_json::to_string_pretty(&sales)?);
        return Ok(());
    }

    if sales.is_empty() {
        println!("No sales recorded for this window.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct SaleHistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Ticker")]
        ticker: String,
        #[tabled(rename = "Type")]
        sale_type: String,
        #[tabled(rename = "Shares Sold")]
        shares_sold: String,
        #[tabled(rename = "Sale Value")]
        value: String,
    }

    let rows: Vec<SaleHistoryRow> = sales
        .iter()
        .map(|sale| SaleHistoryRow {
            date: sale.recorded_at.format("%Y-%m-%d").to_string(),
            ticker: sale.ticker.clone(),
            sale_type: sale.sale_type.as_str().to_string(),
            shares_sold: format_shares(sale.shares_sold),
            value: format_currency(sale.value_at_sale),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}
