//! Test utilities and catalog fixtures for MDMS tests.
//!
//! Provides:
//! - A temporary database holding a small schema/table/column catalog
//! - Writer factories for the catalog tables
//! - An independent connection for observing what reached the store

#![allow(dead_code)]

use mdms::db::{table_set, ParamRow, TableSet, WriterFactory};
use mdms::{AccessConfig, DatabaseAccess};
use rusqlite::types::Value;
use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

/// Catalog schema: columns reference tables, tables reference schemas.
pub const CATALOG_SQL: &str = r#"
CREATE TABLE "Schema" (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE "Table" (
    id INTEGER PRIMARY KEY,
    schema_id INTEGER NOT NULL REFERENCES "Schema"(id),
    name TEXT NOT NULL
);
CREATE TABLE "Column" (
    id INTEGER PRIMARY KEY,
    table_id INTEGER NOT NULL REFERENCES "Table"(id),
    name TEXT NOT NULL
);
"#;

/// Test fixture that manages a temporary catalog database.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    /// Create a new fixture with the catalog schema in place.
    pub fn new() -> Self {
        mdms::observability::tracing::init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let conn = Connection::open(&db_path).expect("failed to create database");
        conn.execute_batch(CATALOG_SQL)
            .expect("failed to create catalog");
        Self { temp_dir, db_path }
    }

    /// Open a session on the fixture database.
    pub fn open(&self, config: AccessConfig) -> DatabaseAccess {
        DatabaseAccess::open(&self.db_path, config).expect("failed to open database access")
    }

    /// Run extra DDL against the fixture database.
    pub fn execute_batch(&self, sql: &str) {
        let conn = Connection::open(&self.db_path).expect("failed to open observer connection");
        conn.execute_batch(sql).expect("failed to run SQL");
    }

    /// Count rows of `table` through a separate connection.
    ///
    /// Only committed data is visible, so this observes what reached the store.
    pub fn count(&self, table: &str) -> i64 {
        let conn = Connection::open(&self.db_path).expect("failed to open observer connection");
        conn.query_row(&format!(r#"SELECT COUNT(*) FROM "{table}""#), [], |row| {
            row.get(0)
        })
        .expect("failed to count rows")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes rows of the `"Schema"` table.
pub struct SchemaWriterFactory {
    pub batch_size: usize,
}

impl WriterFactory for SchemaWriterFactory {
    type Element = (i64, &'static str);

    fn name(&self) -> &str {
        "schemas"
    }

    fn sql(&self) -> &str {
        r#"INSERT INTO "Schema" (id, name) VALUES (?1, ?2)"#
    }

    fn accessed_tables(&self) -> TableSet {
        TableSet::new()
    }

    fn manipulated_tables(&self) -> TableSet {
        table_set(["Schema"])
    }

    fn bind(&self, (id, name): &Self::Element) -> ParamRow {
        vec![Value::Integer(*id), Value::Text((*name).to_owned())]
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.batch_size)
    }
}

/// Writes rows of the `"Table"` table; depends on `"Schema"`.
pub struct TableWriterFactory {
    pub batch_size: usize,
}

impl WriterFactory for TableWriterFactory {
    type Element = (i64, i64, &'static str);

    fn name(&self) -> &str {
        "tables"
    }

    fn sql(&self) -> &str {
        r#"INSERT INTO "Table" (id, schema_id, name) VALUES (?1, ?2, ?3)"#
    }

    fn accessed_tables(&self) -> TableSet {
        table_set(["Schema"])
    }

    fn manipulated_tables(&self) -> TableSet {
        table_set(["Table"])
    }

    fn bind(&self, (id, schema_id, name): &Self::Element) -> ParamRow {
        vec![
            Value::Integer(*id),
            Value::Integer(*schema_id),
            Value::Text((*name).to_owned()),
        ]
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.batch_size)
    }
}

/// Writes rows of the `"Column"` table; depends on `"Table"`.
pub struct ColumnWriterFactory {
    pub batch_size: usize,
}

impl WriterFactory for ColumnWriterFactory {
    type Element = (i64, i64, &'static str);

    fn name(&self) -> &str {
        "columns"
    }

    fn sql(&self) -> &str {
        r#"INSERT INTO "Column" (id, table_id, name) VALUES (?1, ?2, ?3)"#
    }

    fn accessed_tables(&self) -> TableSet {
        table_set(["Table"])
    }

    fn manipulated_tables(&self) -> TableSet {
        table_set(["Column"])
    }

    fn bind(&self, (id, table_id, name): &Self::Element) -> ParamRow {
        vec![
            Value::Integer(*id),
            Value::Integer(*table_id),
            Value::Text((*name).to_owned()),
        ]
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.batch_size)
    }
}

/// Insert schema 1 with table 10 through plain SQL.
pub fn seed_catalog(access: &mut DatabaseAccess) {
    access
        .execute_write(r#"INSERT INTO "Schema" (id, name) VALUES (1, 'public')"#, &["Schema"])
        .expect("failed to insert schema");
    access
        .execute_write(
            r#"INSERT INTO "Table" (id, schema_id, name) VALUES (10, 1, 'orders')"#,
            &["Table"],
        )
        .expect("failed to insert table");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_catalog() {
        let fixture = TestFixture::new();
        assert!(fixture.temp_dir.path().exists());
        assert_eq!(fixture.count("Column"), 0);
    }
}
