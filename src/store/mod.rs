//! Persistent cross-file record store.
//!
//! Stateful rules emit keyed records while checking individual files and
//! query them back, grouped by key, when they finalize. Records are tagged
//! with the content hash of the file that produced them, so an unchanged
//! file's records and check output can be reused on the next run.
//!
//! The store lives in `~/.cache/layerlint/crossfile/<root hash>.sqlite`
//! unless the config points elsewhere or disables persistence.

mod schema;

pub use schema::SCHEMA_VERSION;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use tempfile::TempDir;

use crate::config::CacheConfig;
use crate::error::StoreError;
use crate::violation::{Diagnostic, DiagnosticKind, Violation};

/// Hex xxh3 digest used for content hashes and record keys.
pub fn hash_hex(bytes: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(bytes))
}

/// One record emitted by a stateful rule for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossFileRecord {
    pub key: String,
    /// Project-root relative path.
    pub file_path: String,
    pub line: usize,
    pub end_line: usize,
    /// Rule-defined JSON payload.
    pub payload: String,
}

/// All records sharing a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordGroup {
    pub key: String,
    /// Ordered by (file_path, line).
    pub records: Vec<CrossFileRecord>,
}

impl RecordGroup {
    /// Number of distinct files holding this key.
    pub fn distinct_files(&self) -> usize {
        let mut files: Vec<&str> = self.records.iter().map(|r| r.file_path.as_str()).collect();
        files.dedup();
        files.len()
    }
}

/// Where the database lives.
#[derive(Debug, Clone)]
pub enum StoreLocation {
    /// Survives across runs.
    Persistent(PathBuf),
    /// A file in a temp dir, removed when the last handle drops.
    Ephemeral { path: PathBuf, dir: Arc<TempDir> },
    /// Private to one connection; cannot be shared with workers.
    Memory,
}

impl StoreLocation {
    pub fn is_shareable(&self) -> bool {
        !matches!(self, StoreLocation::Memory)
    }

    fn path(&self) -> Option<&Path> {
        match self {
            StoreLocation::Persistent(path) => Some(path),
            StoreLocation::Ephemeral { path, .. } => Some(path),
            StoreLocation::Memory => None,
        }
    }
}

impl std::fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreLocation::Persistent(path) => write!(f, "{}", path.display()),
            StoreLocation::Ephemeral { path, .. } => write!(f, "{} (ephemeral)", path.display()),
            StoreLocation::Memory => write!(f, ":memory:"),
        }
    }
}

/// Default database path for a project root.
pub fn database_path(project_root: &Path, cache: &CacheConfig) -> Option<PathBuf> {
    let dir = match &cache.dir {
        Some(dir) => dir.clone(),
        None => ProjectDirs::from("", "", "layerlint")?.cache_dir().to_path_buf(),
    };
    let canonical = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    let name = format!("{}.sqlite", hash_hex(canonical.to_string_lossy().as_bytes()));
    Some(dir.join("crossfile").join(name))
}

/// Handle on the cross-file store. One SQLite connection per handle; use
/// [`CrossFileStore::reopen`] to get a handle for another thread.
pub struct CrossFileStore {
    conn: Connection,
    location: StoreLocation,
}

impl CrossFileStore {
    /// Open the store for a project, degrading step by step when the
    /// database is unusable. Every fallback is reported; only an in-memory
    /// database that cannot be opened is an error.
    pub fn open(
        project_root: &Path,
        cache: &CacheConfig,
    ) -> Result<(Self, Vec<Diagnostic>), StoreError> {
        let mut diagnostics = Vec::new();

        let persistent = if cache.enabled {
            database_path(project_root, cache)
        } else {
            None
        };

        if let Some(path) = persistent {
            match Self::open_at(StoreLocation::Persistent(path.clone())) {
                Ok(store) => return Ok((store, diagnostics)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "recreating cross-file store");
                    diagnostics.push(store_diagnostic(format!(
                        "cross-file store at {} unusable ({}); recreating it",
                        path.display(),
                        e
                    )));
                }
            }

            remove_database(&path);
            match Self::open_at(StoreLocation::Persistent(path.clone())) {
                Ok(store) => return Ok((store, diagnostics)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "falling back to ephemeral store");
                    diagnostics.push(store_diagnostic(format!(
                        "could not recreate cross-file store at {} ({}); using a temporary store",
                        path.display(),
                        e
                    )));
                }
            }
        }

        match Self::open_ephemeral() {
            Ok(store) => return Ok((store, diagnostics)),
            Err(e) => {
                tracing::warn!(error = %e, "falling back to in-memory store");
                diagnostics.push(store_diagnostic(format!(
                    "temporary cross-file store failed ({}); using an in-memory store",
                    e
                )));
            }
        }

        let store = Self::open_in_memory()?;
        Ok((store, diagnostics))
    }

    /// A store in a fresh temp dir, removed when every handle is dropped.
    pub fn open_ephemeral() -> Result<Self, StoreError> {
        let dir = tempfile::Builder::new()
            .prefix("layerlint-store-")
            .tempdir()
            .map_err(|source| StoreError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        let path = dir.path().join("crossfile.sqlite");
        Self::open_at(StoreLocation::Ephemeral {
            path,
            dir: Arc::new(dir),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open_at(StoreLocation::Memory)
    }

    fn open_at(location: StoreLocation) -> Result<Self, StoreError> {
        let conn = match location.path() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };
        schema::configure(&conn)?;
        schema::check_integrity(&conn)?;
        schema::ensure(&conn)?;
        tracing::debug!(location = %location, "opened cross-file store");
        Ok(Self { conn, location })
    }

    /// A new handle on the same database, for another thread.
    pub fn reopen(&self) -> Result<Self, StoreError> {
        if !self.location.is_shareable() {
            return Err(StoreError::NotShareable);
        }
        Self::open_at(self.location.clone())
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    fn immediate(&self) -> Result<Transaction<'_>, StoreError> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Append one record.
    pub fn put(
        &self,
        rule_id: &str,
        content_hash: &str,
        record: &CrossFileRecord,
    ) -> Result<(), StoreError> {
        insert_record(&self.conn, rule_id, content_hash, record)?;
        Ok(())
    }

    /// Replace everything a rule knows about one file: its records and its
    /// cached check output. Atomic.
    pub fn replace_file_records(
        &self,
        rule_id: &str,
        file_path: &str,
        content_hash: &str,
        fingerprint: &str,
        records: &[CrossFileRecord],
        violations: &[Violation],
    ) -> Result<(), StoreError> {
        let violations_json = serde_json::to_string(violations)?;
        let tx = self.immediate()?;
        tx.execute(
            "DELETE FROM records WHERE rule_id = ?1 AND file_path = ?2",
            params![rule_id, file_path],
        )?;
        for record in records {
            insert_record(&tx, rule_id, content_hash, record)?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO indexed
                (rule_id, file_path, content_hash, fingerprint, violations_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![rule_id, file_path, content_hash, fingerprint, violations_json],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Cached check output for an unchanged file under unchanged options.
    pub fn cached_check(
        &self,
        rule_id: &str,
        file_path: &str,
        content_hash: &str,
        fingerprint: &str,
    ) -> Result<Option<Vec<Violation>>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT violations_json FROM indexed
             WHERE rule_id = ?1 AND file_path = ?2 AND content_hash = ?3 AND fingerprint = ?4",
        )?;
        let mut rows = stmt.query(params![rule_id, file_path, content_hash, fingerprint])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    /// Drop a rule's records and cached output for one file.
    pub fn forget_file(&self, rule_id: &str, file_path: &str) -> Result<(), StoreError> {
        let tx = self.immediate()?;
        tx.execute(
            "DELETE FROM records WHERE rule_id = ?1 AND file_path = ?2",
            params![rule_id, file_path],
        )?;
        tx.execute(
            "DELETE FROM indexed WHERE rule_id = ?1 AND file_path = ?2",
            params![rule_id, file_path],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Start a run over `targets`: rows for any other file are pruned, so
    /// deleted or excluded files stop contributing to cross-file findings.
    pub fn begin_run(&self, targets: &[String]) -> Result<usize, StoreError> {
        let tx = self.immediate()?;
        tx.execute_batch(
            "CREATE TEMP TABLE IF NOT EXISTS run_targets (file_path TEXT PRIMARY KEY);
             DELETE FROM run_targets;",
        )?;
        {
            let mut insert =
                tx.prepare("INSERT OR IGNORE INTO run_targets (file_path) VALUES (?1)")?;
            for target in targets {
                insert.execute(params![target])?;
            }
        }
        let pruned = tx.execute(
            "DELETE FROM records WHERE file_path NOT IN (SELECT file_path FROM run_targets)",
            [],
        )?;
        tx.execute(
            "DELETE FROM indexed WHERE file_path NOT IN (SELECT file_path FROM run_targets)",
            [],
        )?;
        tx.execute("DELETE FROM run_targets", [])?;
        tx.commit()?;
        if pruned > 0 {
            tracing::debug!(pruned, "pruned records of files outside this run");
        }
        Ok(pruned)
    }

    /// Records of `rule_id` grouped by key, keeping groups with at least
    /// `min_occurrences` members. Groups are ordered by their first member.
    pub fn query(&self, rule_id: &str, min_occurrences: usize) -> Result<Vec<RecordGroup>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT r.key, r.file_path, r.line, r.end_line, r.payload
             FROM records r
             JOIN (SELECT key FROM records WHERE rule_id = ?1
                   GROUP BY key HAVING COUNT(*) >= ?2) g ON g.key = r.key
             WHERE r.rule_id = ?1
             ORDER BY r.key, r.file_path, r.line, r.end_line, r.payload",
        )?;
        let rows = stmt.query_map(params![rule_id, min_occurrences as i64], |row| {
            Ok(CrossFileRecord {
                key: row.get(0)?,
                file_path: row.get(1)?,
                line: row.get::<_, i64>(2)? as usize,
                end_line: row.get::<_, i64>(3)? as usize,
                payload: row.get(4)?,
            })
        })?;

        let mut groups: Vec<RecordGroup> = Vec::new();
        for record in rows {
            let record = record?;
            match groups.last_mut() {
                Some(group) if group.key == record.key => group.records.push(record),
                _ => groups.push(RecordGroup {
                    key: record.key.clone(),
                    records: vec![record],
                }),
            }
        }

        groups.sort_by(|a, b| {
            let first = |g: &RecordGroup| {
                g.records
                    .first()
                    .map(|r| (r.file_path.clone(), r.line))
                    .unwrap_or_default()
            };
            first(a).cmp(&first(b)).then_with(|| a.key.cmp(&b.key))
        });
        Ok(groups)
    }

    /// Number of records held for a rule.
    pub fn record_count(&self, rule_id: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE rule_id = ?1",
            [rule_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn insert_record(
    conn: &Connection,
    rule_id: &str,
    content_hash: &str,
    record: &CrossFileRecord,
) -> Result<(), rusqlite::Error> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO records (rule_id, key, file_path, line, end_line, payload, content_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    stmt.execute(params![
        rule_id,
        record.key,
        record.file_path,
        record.line as i64,
        record.end_line as i64,
        record.payload,
        content_hash,
    ])?;
    Ok(())
}

fn remove_database(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        let file = PathBuf::from(name);
        if let Err(e) = std::fs::remove_file(&file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %file.display(), error = %e, "could not remove store file");
            }
        }
    }
}

fn store_diagnostic(message: String) -> Diagnostic {
    Diagnostic::new(DiagnosticKind::Store, message)
}
