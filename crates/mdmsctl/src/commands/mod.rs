//! Subcommand implementations.

pub mod deps;
pub mod exec;
pub mod load;
pub mod query;

/// Borrow owned table names as the `&str` slice the session expects.
pub(crate) fn table_refs(tables: &[String]) -> Vec<&str> {
    tables.iter().map(String::as_str).collect()
}
