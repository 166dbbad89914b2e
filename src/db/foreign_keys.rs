//! Lazily populated cache of foreign-key references between tables.
//!
//! The referenced tables of a table are read from SQLite's catalog the first
//! time they are needed and kept for the rest of the session. Schema changes
//! made after a lookup are not picked up.
//!
//! Referenced names are reported as declared in `sqlite_schema`, not as spelled
//! in the `REFERENCES` clause. Lookups are keyed case-insensitively, matching
//! SQLite's own table name resolution.

use rusqlite::Connection;
use std::collections::HashMap;

use super::tracker::table_key;
use super::{DbError, TableSet};

const REFERENCED_TABLES_SQL: &str = r#"
SELECT DISTINCT COALESCE(s.name, fk."table")
FROM pragma_foreign_key_list(?1) AS fk
LEFT JOIN sqlite_schema AS s
    ON s.type = 'table' AND s.name = fk."table" COLLATE NOCASE
ORDER BY 1
"#;

/// Memoized table -> referenced tables mapping.
#[derive(Debug, Default)]
pub struct ForeignKeyCache {
    referenced: HashMap<String, TableSet>,
    lookups: u64,
}

impl ForeignKeyCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables referenced by `table` through foreign keys.
    ///
    /// Queries the catalog on a cache miss. A failed lookup leaves the cache
    /// untouched, so the next call queries again.
    pub fn referenced_tables(
        &mut self,
        conn: &Connection,
        table: &str,
    ) -> Result<&TableSet, DbError> {
        let key = table_key(table);
        if !self.referenced.contains_key(&key) {
            self.lookups += 1;
            let referenced = lookup_referenced_tables(conn, table).map_err(|source| {
                DbError::MetadataLookup {
                    table: table.to_owned(),
                    source,
                }
            })?;
            tracing::debug!(table, referenced = ?referenced, "Loaded foreign keys");
            self.referenced.insert(key.clone(), referenced);
        }
        Ok(&self.referenced[&key])
    }

    /// Whether the references of `table` are already cached.
    pub fn is_cached(&self, table: &str) -> bool {
        self.referenced.contains_key(&table_key(table))
    }

    /// Number of catalog lookups issued so far.
    pub fn lookups(&self) -> u64 {
        self.lookups
    }
}

fn lookup_referenced_tables(conn: &Connection, table: &str) -> rusqlite::Result<TableSet> {
    let mut stmt = conn.prepare_cached(REFERENCED_TABLES_SQL)?;
    let referenced = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<TableSet, _>>()?;
    Ok(referenced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::table_set;

    fn catalog() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE "Schema" (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
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
            CREATE TABLE "Scope" (
                column_id INTEGER REFERENCES "Column"(id),
                table_id INTEGER REFERENCES "Table"(id),
                other_column_id INTEGER REFERENCES "Column"(id)
            );
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_referenced_tables() {
        let conn = catalog();
        let mut cache = ForeignKeyCache::new();

        assert_eq!(
            cache.referenced_tables(&conn, "Column").unwrap(),
            &table_set(["Table"])
        );
        assert_eq!(
            cache.referenced_tables(&conn, "Scope").unwrap(),
            &table_set(["Column", "Table"])
        );
        assert!(cache.referenced_tables(&conn, "Schema").unwrap().is_empty());
    }

    #[test]
    fn test_lookup_happens_once_per_table() {
        let conn = catalog();
        let mut cache = ForeignKeyCache::new();

        for _ in 0..5 {
            cache.referenced_tables(&conn, "Column").unwrap();
        }
        assert_eq!(cache.lookups(), 1);
        assert!(cache.is_cached("Column"));
        assert!(!cache.is_cached("Table"));

        cache.referenced_tables(&conn, "Table").unwrap();
        assert_eq!(cache.lookups(), 2);
    }

    #[test]
    fn test_references_use_declared_table_names() {
        let conn = catalog();
        conn.execute_batch(
            "CREATE TABLE note (id INTEGER PRIMARY KEY, schema_id INTEGER REFERENCES schema(id))",
        )
        .unwrap();
        let mut cache = ForeignKeyCache::new();

        assert_eq!(
            cache.referenced_tables(&conn, "note").unwrap(),
            &table_set(["Schema"])
        );
        assert!(cache.is_cached("NOTE"));
        cache.referenced_tables(&conn, "Note").unwrap();
        assert_eq!(cache.lookups(), 1);
    }

    #[test]
    fn test_failed_lookup_is_not_cached() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("locked.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE "Schema" (id INTEGER PRIMARY KEY);
            CREATE TABLE "Table" (id INTEGER PRIMARY KEY, schema_id INTEGER REFERENCES "Schema"(id));
            "#,
        )
        .unwrap();
        conn.busy_timeout(std::time::Duration::ZERO).unwrap();
        let mut cache = ForeignKeyCache::new();

        // An exclusive lock in rollback-journal mode keeps every reader out.
        let locker = Connection::open(&path).unwrap();
        locker.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let err = cache.referenced_tables(&conn, "Table").unwrap_err();
        assert!(
            matches!(&err, DbError::MetadataLookup { table, .. } if table == "Table"),
            "unexpected error: {err}"
        );
        assert!(!cache.is_cached("Table"));

        locker.execute_batch("ROLLBACK").unwrap();

        assert_eq!(
            cache.referenced_tables(&conn, "Table").unwrap(),
            &table_set(["Schema"])
        );
        assert_eq!(cache.lookups(), 2);
    }

    #[test]
    fn test_unknown_table_has_no_references() {
        let conn = catalog();
        let mut cache = ForeignKeyCache::new();

        assert!(cache.referenced_tables(&conn, "Missing").unwrap().is_empty());
    }
}
