// Database module - SQLite connection for the durable stores

use anyhow::{Context, Result};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

use crate::error::TrackerError;

/// Get the default database path (~/.vantage/data.db)
pub fn default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let vantage_dir = PathBuf::from(home).join(".vantage");

    // Create directory if it doesn't exist
    std::fs::create_dir_all(&vantage_dir).context("Failed to create .vantage directory")?;

    Ok(vantage_dir.join("data.db"))
}

/// Open database connection
pub fn open_db(db_path: Option<PathBuf>) -> Result<Connection> {
    let path = db_path.unwrap_or(default_db_path()?);
    let conn = Connection::open(&path).context(format!("Failed to open database at {:?}", path))?;

    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("Failed to enable foreign keys")?;

    Ok(conn)
}

/// Initialize the database with schema
///
/// Creates the database file if needed and runs the schema SQL. All
/// statements are IF NOT EXISTS, so a fresh file simply means every store
/// starts empty.
pub fn init_database(db_path: Option<PathBuf>) -> Result<()> {
    let path = db_path.unwrap_or(default_db_path()?);

    info!("Initializing database at: {:?}", path);

    let conn = open_db(Some(path))?;

    let schema_sql = include_str!("schema.sql");
    conn.execute_batch(schema_sql)
        .context("Failed to execute schema")?;

    Ok(())
}

/// Read a decimal stored as TEXT from a row column.
///
/// A value that fails to parse means the store on disk is corrupt, which
/// must abort the cycle rather than degrade into an empty store.
pub fn read_decimal(row: &rusqlite::Row, idx: usize, store: &'static str) -> Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| TrackerError::corrupt(store, format!("bad decimal '{}': {}", raw, e)).into())
}
