//! Session-level coordination of writers, reads, and the connection.
//!
//! [`DatabaseAccess`] owns one SQLite connection and every writer created
//! through it. Writes are buffered; a read against a set of tables first
//! flushes each writer that manipulates or accesses one of them, and a write
//! first flushes the writers of the tables it references through foreign
//! keys. Before a writer's batch runs, the writers manipulating the tables it
//! accesses are flushed depth-first; a writer that would have to wait for
//! itself is reported as [`DbError::FlushCycle`].

use rusqlite::{Connection, Params, Row};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::span::EnteredSpan;
use tracing::{debug, error, info, warn, Span};

use super::foreign_keys::ForeignKeyCache;
use super::pragmas::apply_pragmas;
use super::query::{PreparedQuery, QueryHandle};
use super::tracker::DependencyTracker;
use super::write::{
    BatchWriter, DependentWriter, SqlExecutor, WriterFactory, WriterHandle, WriterId,
};
use super::{table_set, DbError, TableSet};
use crate::config::AccessConfig;

/// Counters describing the work a session has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessStats {
    /// Non-empty batches executed, including plain SQL batches
    pub batches_executed: u64,
    /// Statements executed across all batches
    pub statements_executed: u64,
    /// Foreign-key catalog lookups (cache misses)
    pub foreign_key_lookups: u64,
    /// Reads executed through `query` and `run_query`
    pub queries_executed: u64,
}

/// Manages the access to a database by maintaining batch writers and ensuring
/// all relevant data is written before performing a read.
///
/// A session is single-threaded: every operation takes `&mut self` and blocks
/// on SQLite. Closing (explicitly or on drop) flushes all writers and always
/// releases the connection.
pub struct DatabaseAccess {
    conn: Option<Connection>,
    config: AccessConfig,
    /// Every writer of the session; the plain SQL executor lives at index 0.
    writers: Vec<Box<dyn DependentWriter>>,
    executor: WriterHandle<SqlExecutor>,
    tracker: DependencyTracker,
    foreign_keys: ForeignKeyCache,
    queries: Vec<PreparedQuery>,
    /// Writers currently mid-flush, outermost first.
    flushing: Vec<WriterId>,
    stats: AccessStats,
    span: Span,
}

impl DatabaseAccess {
    /// Open the SQLite database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, config: AccessConfig) -> Result<Self, DbError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let access = Self::with_connection(conn, config)?;
        info!(parent: &access.span, path = %path.display(), "Opened database");
        Ok(access)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(config: AccessConfig) -> Result<Self, DbError> {
        Self::with_connection(Connection::open_in_memory()?, config)
    }

    /// Build a session around an already-open connection.
    pub fn with_connection(conn: Connection, config: AccessConfig) -> Result<Self, DbError> {
        Self::with_span(conn, config, tracing::info_span!("database_access"))
    }

    /// Build a session whose log events are recorded inside `span`.
    pub fn with_span(conn: Connection, config: AccessConfig, span: Span) -> Result<Self, DbError> {
        apply_pragmas(&conn, config.busy_timeout)?;
        let executor: Box<dyn DependentWriter> =
            Box::new(SqlExecutor::new(config.sql_batch_size));
        Ok(Self {
            conn: Some(conn),
            config,
            writers: vec![executor],
            executor: WriterHandle::new(WriterId::new(0)),
            tracker: DependencyTracker::new(),
            foreign_keys: ForeignKeyCache::new(),
            queries: Vec::new(),
            flushing: Vec::new(),
            stats: AccessStats::default(),
            span,
        })
    }

    /// The database connection managed by this session.
    pub fn connection(&self) -> Result<&Connection, DbError> {
        self.conn.as_ref().ok_or(DbError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn stats(&self) -> AccessStats {
        AccessStats {
            foreign_key_lookups: self.foreign_keys.lookups(),
            ..self.stats
        }
    }

    /// Tables referenced by `table` through foreign keys.
    ///
    /// The catalog is consulted at most once per table for the lifetime of
    /// the session; failed lookups are not cached.
    pub fn referenced_tables(&mut self, table: &str) -> Result<TableSet, DbError> {
        let _entered = self.enter();
        let conn = self.conn.as_ref().ok_or(DbError::Closed)?;
        Ok(self.foreign_keys.referenced_tables(conn, table)?.clone())
    }

    /// Create a batch writer from `factory` and register its declared tables.
    pub fn create_writer<F>(&mut self, factory: F) -> Result<WriterHandle<BatchWriter<F>>, DbError>
    where
        F: WriterFactory + 'static,
    {
        self.ensure_open()?;
        let writer = BatchWriter::new(factory, self.config.batch_size);
        let id = WriterId::new(self.writers.len());
        self.tracker
            .notify_access(id, writer.declared_accessed_tables());
        self.tracker
            .notify_manipulation(id, writer.declared_manipulated_tables());
        debug!(
            parent: &self.span,
            writer = writer.factory().name(),
            %id,
            batch_size = writer.batch_size(),
            accessed = ?writer.declared_accessed_tables(),
            manipulated = ?writer.declared_manipulated_tables(),
            "Created batch writer"
        );
        self.writers.push(Box::new(writer));
        Ok(WriterHandle::new(id))
    }

    /// Register a custom writer with the session.
    ///
    /// The writer's current tables are registered right away. Call
    /// [`notify_pending`](Self::notify_pending) after buffering more data
    /// through [`writer_mut`](Self::writer_mut).
    pub fn register_writer<W: DependentWriter>(
        &mut self,
        writer: W,
    ) -> Result<WriterHandle<W>, DbError> {
        self.ensure_open()?;
        let id = WriterId::new(self.writers.len());
        self.tracker.notify_access(id, &writer.accessed_tables());
        self.tracker
            .notify_manipulation(id, &writer.manipulated_tables());
        debug!(parent: &self.span, writer = writer.name(), %id, "Registered writer");
        self.writers.push(Box::new(writer));
        Ok(WriterHandle::new(id))
    }

    /// Mutable access to a registered writer.
    pub fn writer_mut<W: DependentWriter>(
        &mut self,
        handle: &WriterHandle<W>,
    ) -> Result<&mut W, DbError> {
        self.writers
            .get_mut(handle.id().index())
            .and_then(|writer| writer.as_any_mut().downcast_mut::<W>())
            .ok_or(DbError::UnknownWriter(handle.id()))
    }

    /// Number of statements buffered by `writer`.
    pub fn pending(&self, writer: WriterId) -> Result<usize, DbError> {
        self.writers
            .get(writer.index())
            .map(|writer| writer.pending())
            .ok_or(DbError::UnknownWriter(writer))
    }

    /// Re-register the current tables of `writer` with the tracker.
    pub fn notify_pending(&mut self, writer: WriterId) -> Result<(), DbError> {
        let registered = self
            .writers
            .get(writer.index())
            .ok_or(DbError::UnknownWriter(writer))?;
        let accessed = registered.accessed_tables();
        let manipulated = registered.manipulated_tables();
        self.tracker.notify_access(writer, &accessed);
        self.tracker.notify_manipulation(writer, &manipulated);
        Ok(())
    }

    /// Buffer `element` in a batch writer, flushing the writer once its batch
    /// is full.
    pub fn add<F>(
        &mut self,
        handle: &WriterHandle<BatchWriter<F>>,
        element: &F::Element,
    ) -> Result<(), DbError>
    where
        F: WriterFactory + 'static,
    {
        self.ensure_open()?;
        let _entered = self.enter();
        let id = handle.id();

        let (full, newly_pending) = {
            let writer = self.writer_mut(handle)?;
            let was_empty = writer.is_empty();
            let full = writer.push(element);
            let newly_pending =
                was_empty.then(|| (writer.accessed_tables(), writer.manipulated_tables()));
            (full, newly_pending)
        };

        if let Some((accessed, manipulated)) = newly_pending {
            debug!(%id, accessed = ?accessed, manipulated = ?manipulated, "Writer has pending rows");
            self.tracker.notify_manipulation(id, &manipulated);
            self.tracker.notify_access(id, &accessed);
        }

        if full {
            self.flush_writer(id)?;
        }
        Ok(())
    }

    /// Execute a write statement, ordering it after pending writes on the
    /// manipulated tables and on every table they reference.
    pub fn execute_write(&mut self, sql: &str, manipulated_tables: &[&str]) -> Result<(), DbError> {
        let _entered = self.enter();
        let manipulated = table_set(manipulated_tables.iter().copied());
        let mut referenced = TableSet::new();
        for table in &manipulated {
            referenced.extend(self.referenced_tables(table)?);
        }
        self.issue_write(sql, manipulated, referenced)
    }

    /// Execute a write statement with explicitly given referenced tables.
    ///
    /// Falls back to the foreign-key references of `manipulated_table` when
    /// `referenced_tables` is empty.
    pub fn execute_write_with_referenced_tables(
        &mut self,
        sql: &str,
        manipulated_table: &str,
        referenced_tables: &[&str],
    ) -> Result<(), DbError> {
        let _entered = self.enter();
        let referenced = if referenced_tables.is_empty() {
            self.referenced_tables(manipulated_table)?
        } else {
            warn!(
                table = manipulated_table,
                referenced = ?referenced_tables,
                "Manually passed referenced tables"
            );
            table_set(referenced_tables.iter().copied())
        };
        self.issue_write(sql, table_set([manipulated_table]), referenced)
    }

    /// Run a read after flushing every writer involved with `queried_tables`.
    pub fn query<T, P, F>(
        &mut self,
        sql: &str,
        queried_tables: &[&str],
        params: P,
        f: F,
    ) -> Result<Vec<T>, DbError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.flush_tables(queried_tables.iter().copied())?;
        self.run_read(sql, params, f)
    }

    /// Like [`query`](Self::query) for statements returning exactly one row.
    pub fn query_row<T, P, F>(
        &mut self,
        sql: &str,
        queried_tables: &[&str],
        params: P,
        f: F,
    ) -> Result<T, DbError>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.flush_tables(queried_tables.iter().copied())?;
        let conn = self.conn.as_ref().ok_or(DbError::Closed)?;
        let value = conn.query_row(sql, params, f)?;
        self.stats.queries_executed += 1;
        Ok(value)
    }

    /// Register a read statement with the session.
    pub fn create_query(
        &mut self,
        sql: impl Into<String>,
        queried_tables: &[&str],
    ) -> Result<QueryHandle, DbError> {
        self.ensure_open()?;
        let handle = QueryHandle(self.queries.len());
        let query = PreparedQuery::new(sql, table_set(queried_tables.iter().copied()));
        debug!(parent: &self.span, query = %handle, tables = ?query.tables(), "Created query");
        self.queries.push(query);
        Ok(handle)
    }

    /// Run a registered query, flushing the writers of its tables first.
    pub fn run_query<T, P, F>(&mut self, handle: QueryHandle, params: P, f: F) -> Result<Vec<T>, DbError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let query = self
            .queries
            .get(handle.0)
            .cloned()
            .ok_or(DbError::UnknownQuery(handle.0))?;
        self.flush_tables(query.tables().iter().map(String::as_str))?;
        self.run_read(query.sql(), params, f)
    }

    /// Flush all writers.
    pub fn flush(&mut self) -> Result<(), DbError> {
        self.ensure_open()?;
        let _entered = self.enter();
        for index in 0..self.writers.len() {
            self.flush_writer(WriterId::new(index))?;
        }
        Ok(())
    }

    /// Flush the plain SQL executor and (at least) all writers that
    /// manipulate or access the given tables.
    pub fn flush_tables<'a, I>(&mut self, tables: I) -> Result<(), DbError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.ensure_open()?;
        let _entered = self.enter();
        let tables: Vec<&str> = tables.into_iter().collect();
        debug!(tables = ?tables, "Flushing modifications");

        self.flush_writer(self.executor.id())?;
        for id in self.tracker.writers_for(tables.iter().copied()) {
            self.flush_writer(id)?;
        }
        Ok(())
    }

    /// Flush pending changes, close every writer and query, and release the
    /// connection.
    ///
    /// Every writer gets a flush and a close attempt even if others fail. The
    /// first flush error is returned; otherwise the first close error. The
    /// connection is released in all cases. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), DbError> {
        if self.conn.is_none() {
            return Ok(());
        }
        let _entered = self.enter();

        let mut flush_error = None;
        for index in 0..self.writers.len() {
            if let Err(e) = self.flush_writer(WriterId::new(index)) {
                error!(writer = self.writers[index].name(), error = %e, "Flush before close failed");
                if flush_error.is_none() {
                    flush_error = Some(e);
                }
            }
        }

        let mut close_error = None;
        if let Some(conn) = self.conn.as_ref() {
            for writer in &mut self.writers {
                if let Err(e) = writer.close(conn) {
                    warn!(writer = writer.name(), error = %e, "Failed to close writer");
                    if close_error.is_none() {
                        close_error = Some(e);
                    }
                }
            }
            conn.flush_prepared_statement_cache();
        }
        debug!(queries = self.queries.len(), "Released queries");
        self.queries.clear();
        self.tracker.clear();

        if let Some(conn) = self.conn.take() {
            if let Err((_conn, e)) = conn.close() {
                warn!(error = %e, "Failed to close connection cleanly");
                if close_error.is_none() {
                    close_error = Some(DbError::Database(e));
                }
            }
        }
        info!(stats = ?self.stats(), "Closed database access");

        match flush_error.or(close_error) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn enter(&self) -> EnteredSpan {
        self.span.clone().entered()
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        self.connection().map(|_| ())
    }

    fn issue_write(
        &mut self,
        sql: &str,
        manipulated: TableSet,
        referenced: TableSet,
    ) -> Result<(), DbError> {
        self.ensure_open()?;
        let executor = self.executor;
        let footprint: TableSet = manipulated.union(&referenced).cloned().collect();
        // The executor stays buffered; its statements run in issue order.
        let writers = self.tracker.writers_for(footprint.iter().map(String::as_str));
        for id in writers.into_iter().filter(|id| *id != executor.id()) {
            self.flush_writer(id)?;
        }

        let full = self
            .writer_mut(&executor)?
            .push(sql, &manipulated, &referenced);
        self.tracker.notify_manipulation(executor.id(), &manipulated);
        self.tracker.notify_access(executor.id(), &referenced);

        if full {
            self.flush_writer(executor.id())?;
        }
        Ok(())
    }

    fn run_read<T, P, F>(&mut self, sql: &str, params: P, f: F) -> Result<Vec<T>, DbError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn.as_ref().ok_or(DbError::Closed)?;
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, f)?
            .collect::<Result<Vec<_>, _>>()?;
        self.stats.queries_executed += 1;
        Ok(rows)
    }

    fn flush_writer(&mut self, id: WriterId) -> Result<(), DbError> {
        let writer = self
            .writers
            .get(id.index())
            .ok_or(DbError::UnknownWriter(id))?;
        if writer.is_empty() {
            self.tracker.notify_tables_clear(id);
            return Ok(());
        }

        if self.flushing.contains(&id) {
            let chain = self
                .flushing
                .iter()
                .chain(std::iter::once(&id))
                .map(|w| self.writers[w.index()].name().to_owned())
                .collect();
            return Err(DbError::FlushCycle { chain });
        }

        let accessed = self.writers[id.index()].accessed_tables();
        self.flushing.push(id);
        let result = self
            .flush_dependencies(id, &accessed)
            .and_then(|()| self.execute_writer(id));
        self.flushing.pop();

        if self.writers[id.index()].is_empty() {
            self.tracker.notify_tables_clear(id);
        }
        result
    }

    fn flush_dependencies(&mut self, id: WriterId, accessed: &TableSet) -> Result<(), DbError> {
        let dependencies: BTreeSet<WriterId> = accessed
            .iter()
            .flat_map(|table| self.tracker.manipulators_of(table))
            .filter(|dependency| *dependency != id)
            .collect();
        for dependency in dependencies {
            self.flush_writer(dependency)?;
        }
        Ok(())
    }

    fn execute_writer(&mut self, id: WriterId) -> Result<(), DbError> {
        let conn = self.conn.as_ref().ok_or(DbError::Closed)?;
        let writer = self
            .writers
            .get_mut(id.index())
            .ok_or(DbError::UnknownWriter(id))?;
        let statements = writer.execute(conn)?;
        self.stats.batches_executed += 1;
        self.stats.statements_executed += statements as u64;
        debug!(writer = writer.name(), %id, statements, "Flushed writer");
        Ok(())
    }
}

impl Drop for DatabaseAccess {
    fn drop(&mut self) {
        if self.conn.is_some() {
            if let Err(e) = self.close() {
                warn!(error = %e, "Failed to close database access on drop");
            }
        }
    }
}
