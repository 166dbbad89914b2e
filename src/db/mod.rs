//! SQLite access layer for the metadata store.
//!
//! Provides:
//! - [`DatabaseAccess`]: the per-session coordinator owning the connection
//! - Batch writers that buffer rows per logical write stream
//! - Dependency tracking between writers and the tables they touch
//! - Lazily cached foreign-key lookups used to order writes
//! - Prepared queries registered with the session

pub mod access;
pub mod error;
pub mod foreign_keys;
pub mod pragmas;
pub mod query;
pub mod tracker;
pub mod write;

use std::collections::BTreeSet;

pub use access::{AccessStats, DatabaseAccess};
pub use error::DbError;
pub use query::QueryHandle;
pub use write::{
    BatchWriter, DependentWriter, ParamRow, SqlExecutor, WriterFactory, WriterHandle, WriterId,
};

/// An ordered set of table names.
///
/// Tables are identified by their bare name in the `main` schema.
pub type TableSet = BTreeSet<String>;

/// Build a [`TableSet`] from anything yielding table names.
pub fn table_set<I, S>(tables: I) -> TableSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tables.into_iter().map(Into::into).collect()
}
