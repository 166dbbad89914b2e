//! Connection setup applied when a session is opened.

use rusqlite::Connection;
use std::time::Duration;

/// SQL that we run as part of opening a connection.
///
/// - Enables foreign key enforcement, which makes flush ordering observable
/// - Switches to WAL so other connections can read while a batch commits
/// - Relaxes fsync to once per checkpoint in WAL mode
const INITIAL_SQL: &str = r#"
PRAGMA foreign_keys = ON;
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
"#;

/// Apply the session pragmas and busy timeout to a connection.
pub fn apply_pragmas(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(INITIAL_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        apply_pragmas(&conn, Duration::from_millis(100)).unwrap();

        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_wal_on_file_database() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let conn = Connection::open(temp_dir.path().join("wal.db")).unwrap();
        apply_pragmas(&conn, Duration::from_millis(100)).unwrap();

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
