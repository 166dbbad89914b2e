//! Bookkeeping of which writers hold unflushed data for which tables.
//!
//! Two adjacency maps are kept:
//! - table -> writers whose pending rows manipulate the table
//! - table -> writers whose pending rows depend on the table's contents
//!
//! A writer is registered when it is created and again whenever its buffer
//! goes from empty to non-empty; it is removed once its tables are clear.
//!
//! Table names are compared ASCII case-insensitively, like SQLite does.

use std::collections::{BTreeSet, HashMap};

use super::write::WriterId;
use super::TableSet;

/// Key under which a table name is tracked.
pub(crate) fn table_key(table: &str) -> String {
    table.to_ascii_lowercase()
}

/// Table-to-writer adjacency for one session.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    manipulating: HashMap<String, BTreeSet<WriterId>>,
    accessing: HashMap<String, BTreeSet<WriterId>>,
}

impl DependencyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `writer` is about to manipulate `tables`.
    pub fn notify_manipulation(&mut self, writer: WriterId, tables: &TableSet) {
        for table in tables {
            self.manipulating
                .entry(table_key(table))
                .or_default()
                .insert(writer);
        }
    }

    /// Record that `writer` depends on the contents of `tables`.
    pub fn notify_access(&mut self, writer: WriterId, tables: &TableSet) {
        for table in tables {
            self.accessing
                .entry(table_key(table))
                .or_default()
                .insert(writer);
        }
    }

    /// Forget every table registration of `writer`.
    pub fn notify_tables_clear(&mut self, writer: WriterId) {
        for map in [&mut self.manipulating, &mut self.accessing] {
            map.retain(|_, writers| {
                writers.remove(&writer);
                !writers.is_empty()
            });
        }
    }

    /// Writers registered as manipulating `table`.
    pub fn manipulators_of(&self, table: &str) -> impl Iterator<Item = WriterId> + '_ {
        self.manipulating
            .get(&table_key(table))
            .into_iter()
            .flat_map(|writers| writers.iter().copied())
    }

    /// Writers that manipulate or access any of `tables`.
    pub fn writers_for<'a, I>(&self, tables: I) -> BTreeSet<WriterId>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut writers = BTreeSet::new();
        for table in tables {
            let key = table_key(table);
            for map in [&self.manipulating, &self.accessing] {
                if let Some(registered) = map.get(&key) {
                    writers.extend(registered.iter().copied());
                }
            }
        }
        writers
    }

    /// Whether no writer is registered for any table.
    pub fn is_empty(&self) -> bool {
        self.manipulating.is_empty() && self.accessing.is_empty()
    }

    /// Drop all registrations.
    pub fn clear(&mut self) {
        self.manipulating.clear();
        self.accessing.clear();
    }
}
