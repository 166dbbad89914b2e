//! Configuration parsing for MDMS.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of rows a batch writer buffers before it flushes.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of plain SQL statements buffered before they run.
pub const DEFAULT_SQL_BATCH_SIZE: usize = 1;

/// Default SQLite busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Store options shared by every binary, flattened into its CLI.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    #[arg(short, long, env = "MDMS_DATABASE", default_value = "./metadata.db")]
    pub database: PathBuf,

    /// Rows a batch writer buffers before flushing
    #[arg(long, env = "MDMS_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Plain SQL statements buffered before they are executed
    #[arg(long, env = "MDMS_SQL_BATCH_SIZE", default_value_t = DEFAULT_SQL_BATCH_SIZE)]
    pub sql_batch_size: usize,

    /// How long SQLite waits on a locked database, in milliseconds
    #[arg(long, env = "MDMS_BUSY_TIMEOUT_MS", default_value_t = DEFAULT_BUSY_TIMEOUT_MS)]
    pub busy_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Session settings derived from this configuration.
    pub fn access_config(&self) -> AccessConfig {
        AccessConfig {
            batch_size: self.batch_size,
            sql_batch_size: self.sql_batch_size,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }

    /// Create a default configuration for testing.
    #[cfg(test)]
    pub fn test_config(database: PathBuf) -> Self {
        Self {
            database,
            batch_size: 3,
            sql_batch_size: 1,
            busy_timeout_ms: 100,
            log_level: "debug".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("./metadata.db"),
            batch_size: DEFAULT_BATCH_SIZE,
            sql_batch_size: DEFAULT_SQL_BATCH_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            log_level: "info".into(),
        }
    }
}

/// Settings of a single [`DatabaseAccess`](crate::db::DatabaseAccess) session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessConfig {
    /// Default batch size for writers whose factory does not set one
    pub batch_size: usize,
    /// Batch size of the plain SQL executor
    pub sql_batch_size: usize,
    /// SQLite busy timeout
    pub busy_timeout: Duration,
}

impl AccessConfig {
    /// Use the given default writer batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Use the given batch size for plain SQL statements.
    #[must_use]
    pub fn with_sql_batch_size(mut self, sql_batch_size: usize) -> Self {
        self.sql_batch_size = sql_batch_size;
        self
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Config::default().access_config()
    }
}
