//! Chunk store backed by SQLite
use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub mod chunks;
pub mod history;
pub mod models;
pub mod stats;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS code_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL,
    chunk_type TEXT NOT NULL CHECK (chunk_type IN ('module', 'function', 'class')),
    name TEXT NOT NULL,
    content TEXT NOT NULL,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL,
    docstring TEXT NOT NULL DEFAULT '',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    CHECK (line_start >= 1 AND line_start <= line_end)
);

CREATE INDEX IF NOT EXISTS idx_chunks_file_line ON code_chunks(file_path, line_start);

CREATE TABLE IF NOT EXISTS chat_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question TEXT NOT NULL,
    response TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by store operations.
///
/// The store never repairs itself; callers decide whether to re-initialize.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("chunk table is missing (store not initialized)")]
    SchemaMissing,

    #[error("database is corrupt or not a SQLite file: {0}")]
    Corrupt(#[source] rusqlite::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, msg) = &err {
            if matches!(e.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) {
                return StoreError::Corrupt(err);
            }
            if msg.as_deref().is_some_and(|m| m.contains("no such table")) {
                return StoreError::SchemaMissing;
            }
        }
        StoreError::Sqlite(err)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A wrapper around a SQLite connection holding the chunk table.
pub struct Db {
    pub(crate) conn: Connection,
}

impl Db {
    /// Open (creating if needed) the database file at `path`.
    ///
    /// The schema is not touched; call [`Db::initialize`] for that.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening database: {}", path.display());
        let conn = Connection::open(path)?;
        Self::configure(conn)
    }

    /// Open an existing database file, failing if it is absent.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::configure(conn)
    }

    /// Open an in-memory database connection (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Create the tables if they do not exist. Existing rows are kept.
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        info!("Database schema ready");
        Ok(())
    }

    /// Whether the chunk table exists.
    pub fn is_initialized(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'code_chunks'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
