use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vantage")]
#[command(version, about = "Institutional 13F holdings tracker")]
#[command(
    long_about = "Track an institutional investor's 13F holdings over time: diff consecutive \
filings, keep a durable ledger of exits and partial sales, and merge cached market prices into \
plain-text analysis reports."
)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and default directories
    Init,

    /// Fetch the latest filing, run one analysis cycle, write a report
    Run {
        /// Also print the full report to stdout
        #[arg(short, long)]
        print: bool,
    },

    /// Run analysis cycles continuously
    Watch {
        /// Seconds between cycles (default: configured poll interval)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show the stored holdings snapshot
    Holdings,

    /// Show recorded sale history
    History {
        /// Only show sales from the last N days
        #[arg(short, long)]
        days: Option<i64>,
    },
}
