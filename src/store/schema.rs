//! Store schema and connection setup.

use rusqlite::Connection;

use crate::error::StoreError;

/// Bumped whenever the tables below change shape.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    rule_id      TEXT    NOT NULL,
    key          TEXT    NOT NULL,
    file_path    TEXT    NOT NULL,
    line         INTEGER NOT NULL,
    end_line     INTEGER NOT NULL,
    payload      TEXT    NOT NULL,
    content_hash TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_records_rule_key ON records(rule_id, key);
CREATE INDEX IF NOT EXISTS idx_records_rule_file ON records(rule_id, file_path);

CREATE TABLE IF NOT EXISTS indexed (
    rule_id         TEXT NOT NULL,
    file_path       TEXT NOT NULL,
    content_hash    TEXT NOT NULL,
    fingerprint     TEXT NOT NULL,
    violations_json TEXT NOT NULL,
    PRIMARY KEY (rule_id, file_path)
);
"#;

/// Apply connection PRAGMAs. Must run on every connection right after open.
pub fn configure(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA temp_store = MEMORY;
        ",
    )?;
    Ok(())
}

/// Fail when SQLite reports anything other than `ok` from a quick check.
pub fn check_integrity(conn: &Connection) -> Result<(), StoreError> {
    let result: String = conn.pragma_query_value(None, "quick_check", |row| row.get(0))?;
    if result != "ok" {
        return Err(StoreError::Corrupt(result));
    }
    Ok(())
}

/// Create the tables on a fresh database, or verify the version of an
/// existing one.
pub fn ensure(conn: &Connection) -> Result<(), StoreError> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    match version {
        0 => {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        found => Err(StoreError::SchemaMismatch {
            found,
            expected: SCHEMA_VERSION,
        }),
    }
}
