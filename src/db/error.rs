//! Error type for database access operations.

use thiserror::Error;

use super::write::WriterId;

/// Errors raised by a [`DatabaseAccess`](super::DatabaseAccess) session.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Batch of writer '{writer}' failed at statement {index} of {size}: {source}")]
    BatchExecution {
        writer: String,
        index: usize,
        size: usize,
        source: rusqlite::Error,
    },

    #[error("Failed to look up foreign keys of table '{table}': {source}")]
    MetadataLookup {
        table: String,
        source: rusqlite::Error,
    },

    #[error("Cyclic flush dependency between writers: {}", .chain.join(" -> "))]
    FlushCycle { chain: Vec<String> },

    #[error("Writer {0} is not registered with this session")]
    UnknownWriter(WriterId),

    #[error("Query {0} is not registered with this session")]
    UnknownQuery(usize),

    #[error("Database access is closed")]
    Closed,
}

impl DbError {
    /// Whether the error came from a failed statement inside a batch.
    pub fn is_batch_failure(&self) -> bool {
        matches!(self, Self::BatchExecution { .. })
    }
}
