//! Writers that buffer modifications until the session flushes them.
//!
//! Every writer declares which tables its pending statements manipulate and
//! which tables they depend on. The session uses these declarations to flush
//! writers in an order that keeps foreign keys satisfied and reads fresh.

pub mod batch;
pub mod sql_executor;

use rusqlite::types::Value;
use rusqlite::Connection;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use super::{DbError, TableSet};

pub use batch::{BatchAccumulator, BatchWriter, WriterFactory};
pub use sql_executor::SqlExecutor;

/// Bound parameters of one statement execution.
pub type ParamRow = Vec<Value>;

/// Identifies a writer inside its session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriterId(usize);

impl WriterId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed reference to a writer registered with a session.
///
/// Handles are cheap to copy and only valid for the session that issued them.
pub struct WriterHandle<W> {
    id: WriterId,
    _writer: PhantomData<fn() -> W>,
}

impl<W> WriterHandle<W> {
    pub(crate) fn new(id: WriterId) -> Self {
        Self {
            id,
            _writer: PhantomData,
        }
    }

    pub fn id(&self) -> WriterId {
        self.id
    }
}

impl<W> Clone for WriterHandle<W> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<W> Copy for WriterHandle<W> {}

impl<W> fmt::Debug for WriterHandle<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriterHandle").field(&self.id).finish()
    }
}

/// A writer whose pending statements depend on and manipulate tables.
///
/// Implementations only execute what they have buffered; ordering against
/// other writers is the session's job.
pub trait DependentWriter: Any {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Number of buffered statements.
    fn pending(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Tables the pending statements depend on. Empty while nothing is pending.
    fn accessed_tables(&self) -> TableSet;

    /// Tables the pending statements write to. Empty while nothing is pending.
    fn manipulated_tables(&self) -> TableSet;

    /// Execute and drain the buffered statements, returning how many ran.
    fn execute(&mut self, conn: &Connection) -> Result<usize, DbError>;

    /// Release resources held by the writer. Called once when the session closes.
    fn close(&mut self, _conn: &Connection) -> Result<(), DbError> {
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Run `statements` in one transaction.
///
/// Execution stops at the first failing statement. Statements that ran before
/// it are committed and the failure is reported as
/// [`DbError::BatchExecution`]. If the commit fails as well, nothing is kept
/// and the statement failure is still the one reported.
pub(crate) fn execute_batch<'a, I>(
    conn: &Connection,
    writer: &str,
    statements: I,
) -> Result<usize, DbError>
where
    I: ExactSizeIterator<Item = (&'a str, &'a [Value])>,
{
    let size = statements.len();
    if size == 0 {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    let mut applied = 0;
    let mut failure = None;
    for (sql, params) in statements {
        let outcome = tx
            .prepare_cached(sql)
            .and_then(|mut stmt| stmt.execute(rusqlite::params_from_iter(params.iter())));
        if let Err(source) = outcome {
            failure = Some(source);
            break;
        }
        applied += 1;
    }
    let committed = tx.commit();

    match failure {
        None => {
            committed?;
            tracing::debug!(writer, statements = applied, "Executed batch");
            Ok(applied)
        }
        Some(source) => {
            if let Err(e) = committed {
                tracing::warn!(writer, error = %e, "Failed to commit statements before failure");
            }
            Err(DbError::BatchExecution {
                writer: writer.to_owned(),
                index: applied,
                size,
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_execute_batch() {
        let conn = connection();
        let rows: Vec<ParamRow> = (1..=3)
            .map(|i| vec![Value::Integer(i), Value::Text(format!("n{i}"))])
            .collect();

        let applied = execute_batch(
            &conn,
            "test",
            rows.iter()
                .map(|row| ("INSERT INTO t (id, name) VALUES (?1, ?2)", row.as_slice())),
        )
        .unwrap();

        assert_eq!(applied, 3);
        assert_eq!(count(&conn), 3);
    }

    #[test]
    fn test_failed_statement_keeps_applied_prefix() {
        let conn = connection();
        let rows: Vec<ParamRow> = [1, 2, 2, 3]
            .into_iter()
            .map(|i| vec![Value::Integer(i), Value::Null])
            .collect();

        let err = execute_batch(
            &conn,
            "test",
            rows.iter()
                .map(|row| ("INSERT INTO t (id, name) VALUES (?1, ?2)", row.as_slice())),
        )
        .unwrap_err();

        match err {
            DbError::BatchExecution {
                writer,
                index,
                size,
                ..
            } => {
                assert_eq!(writer, "test");
                assert_eq!(index, 2);
                assert_eq!(size, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn test_statement_failure_reported_over_commit_failure() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (
                 id INTEGER PRIMARY KEY,
                 parent_id INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED
             );",
        )
        .unwrap();
        let rows: Vec<ParamRow> = [1, 1]
            .into_iter()
            .map(|i| vec![Value::Integer(i), Value::Integer(99)])
            .collect();

        // The dangling reference only fails at commit, after the duplicate key.
        let err = execute_batch(
            &conn,
            "children",
            rows.iter().map(|row| {
                (
                    "INSERT INTO child (id, parent_id) VALUES (?1, ?2)",
                    row.as_slice(),
                )
            }),
        )
        .unwrap_err();

        assert!(
            matches!(err, DbError::BatchExecution { index: 1, size: 2, .. }),
            "unexpected error: {err}"
        );
        assert!(conn.is_autocommit());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM child", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let conn = connection();
        let applied = execute_batch(&conn, "test", std::iter::empty()).unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_writer_id_display() {
        assert_eq!(WriterId::new(7).to_string(), "#7");
    }
}
