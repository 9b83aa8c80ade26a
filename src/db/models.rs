use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Kind of indexed unit. Persisted as its lower-case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Module,
    Function,
    Class,
}

impl ChunkType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkType::Module => "module",
            ChunkType::Function => "function",
            ChunkType::Class => "class",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown chunk type: {0}")]
pub struct UnknownChunkType(String);

impl FromStr for ChunkType {
    type Err = UnknownChunkType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "module" => Ok(ChunkType::Module),
            "function" => Ok(ChunkType::Function),
            "class" => Ok(ChunkType::Class),
            other => Err(UnknownChunkType(other.to_string())),
        }
    }
}

impl ToSql for ChunkType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ChunkType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A named, positioned unit of indexed source.
///
/// Lines are 1-based and inclusive. `file_path` is relative to the scan root
/// and always uses `/` as separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub file_path: String,
    pub chunk_type: ChunkType,
    pub name: String,
    pub content: String,
    pub line_start: usize,
    pub line_end: usize,
    pub docstring: String,
}

impl AsRef<Chunk> for Chunk {
    fn as_ref(&self) -> &Chunk {
        self
    }
}

/// A chunk as read back from the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredChunk {
    pub id: i64,
    #[serde(flatten)]
    pub chunk: Chunk,
    pub created_at: DateTime<Utc>,
}

impl Deref for StoredChunk {
    type Target = Chunk;

    fn deref(&self) -> &Chunk {
        &self.chunk
    }
}

impl AsRef<Chunk> for StoredChunk {
    fn as_ref(&self) -> &Chunk {
        &self.chunk
    }
}

/// Aggregate counts over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkStats {
    pub total_chunks: usize,
    pub distinct_files: usize,
    pub function_count: usize,
    pub class_count: usize,
}
