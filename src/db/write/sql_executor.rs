//! Executor for plain SQL statements issued outside of batch writers.
//!
//! Statements are buffered like batch rows (by default one at a time) and
//! carry the tables they manipulate and reference, so reads against those
//! tables flush them first.

use rusqlite::types::Value;
use rusqlite::Connection;
use std::any::Any;

use super::batch::BatchAccumulator;
use super::{execute_batch, DependentWriter};
use crate::db::{DbError, TableSet};

/// Name under which the executor appears in logs and errors.
pub const SQL_EXECUTOR_NAME: &str = "sql-executor";

const NO_PARAMS: &[Value] = &[];

/// Buffers plain SQL statements together with their table footprint.
#[derive(Debug)]
pub struct SqlExecutor {
    batch: BatchAccumulator<String>,
    accessed: TableSet,
    manipulated: TableSet,
}

impl SqlExecutor {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch: BatchAccumulator::new(batch_size),
            accessed: TableSet::new(),
            manipulated: TableSet::new(),
        }
    }

    /// Buffer a statement.
    ///
    /// Returns true if the buffer is now full.
    pub fn push(&mut self, sql: &str, manipulated: &TableSet, referenced: &TableSet) -> bool {
        self.manipulated.extend(manipulated.iter().cloned());
        self.accessed.extend(referenced.iter().cloned());
        self.batch.push(sql.to_owned())
    }
}

impl DependentWriter for SqlExecutor {
    fn name(&self) -> &str {
        SQL_EXECUTOR_NAME
    }

    fn pending(&self) -> usize {
        self.batch.len()
    }

    fn accessed_tables(&self) -> TableSet {
        self.accessed.clone()
    }

    fn manipulated_tables(&self) -> TableSet {
        self.manipulated.clone()
    }

    fn execute(&mut self, conn: &Connection) -> Result<usize, DbError> {
        let statements = self.batch.drain();
        self.accessed.clear();
        self.manipulated.clear();
        execute_batch(
            conn,
            SQL_EXECUTOR_NAME,
            statements.iter().map(|sql| (sql.as_str(), NO_PARAMS)),
        )
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::table_set;

    #[test]
    fn test_footprint_accumulates_until_execute() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE a (x INTEGER); CREATE TABLE b (y INTEGER);")
            .unwrap();

        let mut executor = SqlExecutor::new(10);
        assert!(executor.manipulated_tables().is_empty());

        executor.push("INSERT INTO a VALUES (1)", &table_set(["a"]), &table_set(["c"]));
        executor.push("INSERT INTO b VALUES (2)", &table_set(["b"]), &TableSet::new());
        assert_eq!(executor.manipulated_tables(), table_set(["a", "b"]));
        assert_eq!(executor.accessed_tables(), table_set(["c"]));

        assert_eq!(executor.execute(&conn).unwrap(), 2);
        assert!(executor.is_empty());
        assert!(executor.manipulated_tables().is_empty());
        assert!(executor.accessed_tables().is_empty());
    }

    #[test]
    fn test_default_size_runs_each_statement() {
        let mut executor = SqlExecutor::new(1);
        assert!(executor.push("DELETE FROM a", &table_set(["a"]), &TableSet::new()));
    }
}
