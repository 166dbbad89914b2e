//! MDMS: a relational metadata store with dependency-aware write batching.
//!
//! The store catalogs datasets (schemas, tables, columns), the constraints
//! profiling algorithms discover over them, and the experiments that produced
//! those constraints. Domain objects persist themselves through the
//! [`db::DatabaseAccess`] session, which batches writes per target table and
//! flushes exactly the batches a read or write depends on.
//!
//! # Architecture
//!
//! - **Batched**: rows are buffered per writer and written as one transaction
//! - **Dependency-aware**: reads flush every writer touching the read tables
//! - **Foreign-key ordered**: writes flush the tables they reference first
//! - **Observable**: every session logs inside its own `tracing` span
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`db`]: Session, writers, dependency tracking and foreign-key lookup
//! - [`observability`]: Tracing setup

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // db::write::WriterFactory is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::similar_names               // table/tables are fine
)]

pub mod config;
pub mod db;
pub mod observability;

pub use config::{AccessConfig, Config};
pub use db::{DatabaseAccess, DbError, TableSet};
