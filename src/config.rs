//! Tracker configuration
//!
//! Loaded from `~/.vantage/config.toml` when present; every field has a
//! default so a missing file just means stock settings. The file is the
//! place to point the tracker at a different CIK or set the User-Agent
//! contact string EDGAR asks for.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Berkshire Hathaway's CIK on EDGAR.
pub const DEFAULT_CIK: &str = "0001067983";

const DEFAULT_USER_AGENT: &str = "vantage/0.1 (holdings research)";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// CIK of the tracked filer.
    pub cik: String,

    /// User-Agent sent to EDGAR (the SEC requires an identifying one).
    pub user_agent: String,

    /// Quote staleness threshold in hours.
    pub price_ttl_hours: i64,

    /// Seconds between cycles in watch mode.
    pub poll_interval_secs: u64,

    /// Database file override; defaults to ~/.vantage/data.db.
    pub db_path: Option<PathBuf>,

    /// Directory report files are written to; defaults to the working
    /// directory.
    pub report_dir: Option<PathBuf>,

    /// Manual CUSIP -> ticker mappings, consulted before the built-in
    /// table and any remote lookup.
    pub cusip_overrides: HashMap<String, String>,

    /// Accept a filing with zero positions as a real full liquidation.
    /// Off by default: an empty filing against existing holdings is far
    /// more often a scrape failure, so the cycle is flagged and held.
    pub confirm_empty_filings: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cik: DEFAULT_CIK.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            price_ttl_hours: 1,
            poll_interval_secs: 3600,
            db_path: None,
            report_dir: None,
            cusip_overrides: HashMap::new(),
            confirm_empty_filings: false,
        }
    }
}

impl TrackerConfig {
    /// Default config file path (~/.vantage/config.toml)
    pub fn default_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".vantage").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist. A file that exists but fails to parse is an
    /// error: silently ignoring a typo'd config is worse than stopping.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path()?)
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config at {:?}", path))
    }

    pub fn price_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.price_ttl_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.cik, DEFAULT_CIK);
        assert_eq!(config.price_ttl_hours, 1);
        assert_eq!(config.poll_interval_secs, 3600);
        assert!(config.cusip_overrides.is_empty());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = TrackerConfig::load_from(PathBuf::from("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.cik, DEFAULT_CIK);
    }

    #[test]
    fn test_partial_file_overrides_defaults() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "cik = \"0000320193\"")?;
        writeln!(file, "price_ttl_hours = 24")?;
        writeln!(file)?;
        writeln!(file, "[cusip_overrides]")?;
        writeln!(file, "\"037833100\" = \"AAPL\"")?;

        let config = TrackerConfig::load_from(file.path().to_path_buf())?;
        assert_eq!(config.cik, "0000320193");
        assert_eq!(config.price_ttl_hours, 24);
        assert_eq!(config.poll_interval_secs, 3600);
        assert_eq!(
            config.cusip_overrides.get("037833100").map(String::as_str),
            Some("AAPL")
        );
        Ok(())
    }

    #[test]
    fn test_unknown_key_is_an_error() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "pol_interval_secs = 60")?;

        assert!(TrackerConfig::load_from(file.path().to_path_buf()).is_err());
        Ok(())
    }
}
