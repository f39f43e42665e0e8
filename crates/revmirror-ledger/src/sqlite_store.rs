//! SQLite-backed storage for the commit ledger.
//!
//! A single `ledger.db` (WAL mode) holds the canonical `commits` table and the
//! `todo` staging table of chain links waiting to be folded in.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use revmirror_core::{Commit, CommitId, LedgerEntry, TodoEntry};
use rusqlite::{params, Connection, OptionalExtension};
use std::io::{Read, Write};
use std::path::Path;
use time::OffsetDateTime;

const SCHEMA_SQL: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS commits (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    hash TEXT UNIQUE NOT NULL,
    author_name TEXT NOT NULL,
    author_email TEXT NOT NULL,
    commit_ts INTEGER NOT NULL,
    message BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS todo (
    oldrev TEXT PRIMARY KEY,
    newrev TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const SCHEMA_VERSION: u32 = 1;

const COMMIT_COLUMNS: &str = "seq, hash, author_name, author_email, commit_ts, message";

/// SQLite-backed storage engine.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open an existing ledger.db.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if !db_path.exists() {
            anyhow::bail!(
                "no ledger at {} (run `revmirror init` first)",
                db_path.display()
            );
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        Ok(store)
    }

    /// Open or create ledger.db with full schema.
    pub fn open_or_create(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        store.apply_schema()?;
        Ok(store)
    }

    fn apply_pragmas(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn apply_schema(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    pub fn schema_version(&self) -> anyhow::Result<u32> {
        let version: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    // ── Commits ─────────────────────────────────────────────────────

    /// Number of commits in the ledger.
    pub fn commit_count(&self) -> anyhow::Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// The most recently appended commit.
    pub fn tail(&self) -> anyhow::Result<Option<LedgerEntry>> {
        let sql = format!("SELECT {COMMIT_COLUMNS} FROM commits ORDER BY seq DESC LIMIT 1");
        let row = self.conn.query_row(&sql, [], map_commit_row).optional()?;
        row.map(CommitRow::into_entry).transpose()
    }

    /// Hash of the most recently appended commit.
    pub fn tail_hash(&self) -> anyhow::Result<Option<CommitId>> {
        let hash: Option<String> = self
            .conn
            .query_row(
                "SELECT hash FROM commits ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        hash.map(|h| h.parse().map_err(anyhow::Error::from))
            .transpose()
    }

    /// Bootstrap the ledger with its first commit. Refuses a non-empty ledger.
    pub fn seed(&self, commit: &Commit) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let count: i64 = tx.query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))?;
        if count > 0 {
            anyhow::bail!("ledger already seeded ({count} commits)");
        }
        insert_commit(&tx, commit)?;
        tx.commit()?;
        Ok(())
    }

    /// Append `commit` as the successor of `old` and consume the link
    /// `(old, commit.hash)`, atomically.
    ///
    /// Fails without side effects if `old` is no longer the tail.
    pub fn append_and_consume(&self, old: &CommitId, commit: &Commit) -> anyhow::Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let tail: Option<String> = tx
            .query_row(
                "SELECT hash FROM commits ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if tail.as_deref() != Some(old.as_str()) {
            anyhow::bail!(
                "ledger tail moved: expected {old}, found {}",
                tail.as_deref().unwrap_or("<empty>")
            );
        }
        let seq = insert_commit(&tx, commit)?;
        tx.execute(
            "DELETE FROM todo WHERE oldrev = ?1 AND newrev = ?2",
            params![old.as_str(), commit.hash.as_str()],
        )?;
        tx.commit()?;
        Ok(seq)
    }

    /// All commits in insertion order.
    pub fn iter_commits(&self) -> anyhow::Result<Vec<LedgerEntry>> {
        let sql = format!("SELECT {COMMIT_COLUMNS} FROM commits ORDER BY seq");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_commit_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(CommitRow::into_entry).collect()
    }

    /// The newest `limit` commits, newest first.
    pub fn recent_commits(&self, limit: usize) -> anyhow::Result<Vec<LedgerEntry>> {
        let sql = format!("SELECT {COMMIT_COLUMNS} FROM commits ORDER BY seq DESC LIMIT ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], map_commit_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(CommitRow::into_entry).collect()
    }

    pub fn get_commit(&self, hash: &CommitId) -> anyhow::Result<Option<LedgerEntry>> {
        let sql = format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE hash = ?1");
        let row = self
            .conn
            .query_row(&sql, params![hash.as_str()], map_commit_row)
            .optional()?;
        row.map(CommitRow::into_entry).transpose()
    }

    // ── Staging ─────────────────────────────────────────────────────

    /// Insert chain links, replacing any existing link with the same `old`.
    pub fn upsert_todos(&self, entries: &[TodoEntry]) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO todo (oldrev, newrev) VALUES (?1, ?2)")?;
            for entry in entries {
                stmt.execute(params![entry.old.as_str(), entry.new.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// The staged successor of `old`, if any.
    pub fn todo_after(&self, old: &CommitId) -> anyhow::Result<Option<CommitId>> {
        let newrev: Option<String> = self
            .conn
            .query_row(
                "SELECT newrev FROM todo WHERE oldrev = ?1",
                params![old.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        newrev
            .map(|h| h.parse().map_err(anyhow::Error::from))
            .transpose()
    }

    /// All staged links, ordered by `old`.
    pub fn todo_entries(&self) -> anyhow::Result<Vec<TodoEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT oldrev, newrev FROM todo ORDER BY oldrev")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(old, new)| {
                Ok(TodoEntry {
                    old: old.parse()?,
                    new: new.parse()?,
                })
            })
            .collect()
    }

    pub fn todo_count(&self) -> anyhow::Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM todo", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

struct CommitRow {
    seq: i64,
    hash: String,
    author_name: String,
    author_email: String,
    commit_ts: i64,
    message: Vec<u8>,
}

fn map_commit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommitRow> {
    Ok(CommitRow {
        seq: row.get(0)?,
        hash: row.get(1)?,
        author_name: row.get(2)?,
        author_email: row.get(3)?,
        commit_ts: row.get(4)?,
        message: row.get(5)?,
    })
}

impl CommitRow {
    fn into_entry(self) -> anyhow::Result<LedgerEntry> {
        Ok(LedgerEntry {
            seq: self.seq,
            commit: Commit {
                hash: self.hash.parse()?,
                author_name: self.author_name,
                author_email: self.author_email,
                timestamp: OffsetDateTime::from_unix_timestamp(self.commit_ts)?,
                message: decompress(&self.message)?,
            },
        })
    }
}

fn insert_commit(conn: &Connection, commit: &Commit) -> anyhow::Result<i64> {
    let message = compress(&commit.message)?;
    conn.execute(
        "INSERT INTO commits (hash, author_name, author_email, commit_ts, message)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            commit.hash.as_str(),
            commit.author_name,
            commit.author_email,
            commit.timestamp.unix_timestamp(),
            message,
        ],
    )
    .map_err(|e| anyhow::anyhow!("cannot append commit {}: {e}", commit.hash))?;
    Ok(conn.last_insert_rowid())
}

fn compress(message: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(message)?;
    Ok(encoder.finish()?)
}

fn decompress(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut message = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut message)?;
    Ok(message)
}
