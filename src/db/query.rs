//! Read statements registered with a session.
//!
//! A prepared query remembers which tables it reads so that every execution
//! first flushes the writers holding pending data for those tables.

use std::fmt;

use super::TableSet;

/// Handle to a query registered via
/// [`DatabaseAccess::create_query`](super::DatabaseAccess::create_query).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub(crate) usize);

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// A registered read statement and the tables it reads.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    sql: String,
    tables: TableSet,
}

impl PreparedQuery {
    pub fn new(sql: impl Into<String>, tables: TableSet) -> Self {
        Self {
            sql: sql.into(),
            tables,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn tables(&self) -> &TableSet {
        &self.tables
    }
}
