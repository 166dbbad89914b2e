//! Size-triggered batching of writes for one logical write stream.
//!
//! A [`BatchWriter`] buffers the parameter rows of a single INSERT/UPDATE
//! statement and executes them together:
//! - Collect rows until the configured batch size is reached
//! - Execute the whole batch inside one transaction
//! - Report no table dependencies while the buffer is empty

use rusqlite::Connection;
use std::any::Any;

use super::{execute_batch, DependentWriter, ParamRow};
use crate::db::{DbError, TableSet};

/// Batch accumulator for write operations.
///
/// Collects items until the batch is full.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    max_batch_size: usize,
    items: Vec<T>,
}

impl<T> BatchAccumulator<T> {
    /// Create a new batch accumulator.
    ///
    /// A size of zero behaves like one: every item fills the batch.
    pub fn new(max_batch_size: usize) -> Self {
        let max_batch_size = max_batch_size.max(1);
        Self {
            max_batch_size,
            items: Vec::new(),
        }
    }

    /// Add an item to the batch.
    ///
    /// Returns true if the batch is now ready to flush.
    pub fn push(&mut self, item: T) -> bool {
        self.items.push(item);
        self.is_ready()
    }

    /// Check if the batch is full.
    pub fn is_ready(&self) -> bool {
        self.items.len() >= self.max_batch_size
    }

    /// Drain the batch, returning all accumulated items.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    /// Accumulated items in insertion order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the current batch size.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// The size at which the batch becomes ready.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

/// Describes a write stream: its statement, its table footprint, and how
/// elements bind to statement parameters.
///
/// # Example
///
/// ```
/// use mdms::db::{table_set, ParamRow, TableSet, WriterFactory};
/// use rusqlite::types::Value;
///
/// struct ColumnWriterFactory;
///
/// impl WriterFactory for ColumnWriterFactory {
///     type Element = (i64, i64, String);
///
///     fn name(&self) -> &str {
///         "columns"
///     }
///
///     fn sql(&self) -> &str {
///         r#"INSERT INTO "Column" (id, table_id, name) VALUES (?1, ?2, ?3)"#
///     }
///
///     fn accessed_tables(&self) -> TableSet {
///         table_set(["Table"])
///     }
///
///     fn manipulated_tables(&self) -> TableSet {
///         table_set(["Column"])
///     }
///
///     fn bind(&self, (id, table_id, name): &Self::Element) -> ParamRow {
///         vec![Value::Integer(*id), Value::Integer(*table_id), Value::Text(name.clone())]
///     }
/// }
/// ```
pub trait WriterFactory {
    /// The values handed to [`DatabaseAccess::add`](crate::db::DatabaseAccess::add).
    type Element;

    fn name(&self) -> &str;

    /// The statement executed once per element.
    fn sql(&self) -> &str;

    /// Tables whose pending writes must land before this writer's rows.
    fn accessed_tables(&self) -> TableSet;

    /// Tables this writer writes to.
    fn manipulated_tables(&self) -> TableSet;

    /// Statement parameters for one element.
    fn bind(&self, element: &Self::Element) -> ParamRow;

    /// Batch size for this writer; `None` uses the session default.
    fn batch_size(&self) -> Option<usize> {
        None
    }
}

/// Buffers bound rows of a [`WriterFactory`] statement.
pub struct BatchWriter<F: WriterFactory> {
    factory: F,
    accessed: TableSet,
    manipulated: TableSet,
    batch: BatchAccumulator<ParamRow>,
}

impl<F: WriterFactory> BatchWriter<F> {
    /// Create a writer, using `default_batch_size` unless the factory sets one.
    pub fn new(factory: F, default_batch_size: usize) -> Self {
        let batch_size = factory.batch_size().unwrap_or(default_batch_size);
        Self {
            accessed: factory.accessed_tables(),
            manipulated: factory.manipulated_tables(),
            batch: BatchAccumulator::new(batch_size),
            factory,
        }
    }

    /// Bind `element` and buffer its row.
    ///
    /// Returns true if the batch is now full.
    pub fn push(&mut self, element: &F::Element) -> bool {
        let row = self.factory.bind(element);
        self.batch.push(row)
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Accessed tables as declared by the factory, regardless of buffer state.
    pub fn declared_accessed_tables(&self) -> &TableSet {
        &self.accessed
    }

    /// Manipulated tables as declared by the factory, regardless of buffer state.
    pub fn declared_manipulated_tables(&self) -> &TableSet {
        &self.manipulated
    }

    pub fn batch_size(&self) -> usize {
        self.batch.max_batch_size()
    }
}

impl<F: WriterFactory + 'static> DependentWriter for BatchWriter<F> {
    fn name(&self) -> &str {
        self.factory.name()
    }

    fn pending(&self) -> usize {
        self.batch.len()
    }

    fn accessed_tables(&self) -> TableSet {
        if self.batch.is_empty() {
            return TableSet::new();
        }
        self.accessed.clone()
    }

    fn manipulated_tables(&self) -> TableSet {
        if self.batch.is_empty() {
            return TableSet::new();
        }
        self.manipulated.clone()
    }

    fn execute(&mut self, conn: &Connection) -> Result<usize, DbError> {
        let rows = self.batch.drain();
        let sql = self.factory.sql();
        execute_batch(
            conn,
            self.factory.name(),
            rows.iter().map(|row| (sql, row.as_slice())),
        )
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
