use super::{Db, Result, models::*};
use chrono::Utc;
use rusqlite::{Row, TransactionBehavior, params};
use tracing::info;

const SELECT_COLUMNS: &str = "SELECT id, file_path, chunk_type, name, content, line_start, line_end, docstring, created_at FROM code_chunks";

fn map_chunk_row(row: &Row<'_>) -> rusqlite::Result<StoredChunk> {
    Ok(StoredChunk {
        id: row.get(0)?,
        chunk: Chunk {
            file_path: row.get(1)?,
            chunk_type: row.get(2)?,
            name: row.get(3)?,
            content: row.get(4)?,
            line_start: row.get::<_, i64>(5)? as usize,
            line_end: row.get::<_, i64>(6)? as usize,
            docstring: row.get(7)?,
        },
        created_at: row.get(8)?,
    })
}

impl Db {
    /// Discard every stored chunk and insert `chunks` in their place.
    ///
    /// Runs in a single transaction: if any insert fails nothing is
    /// committed and the previous contents remain visible.
    pub fn replace_all(&mut self, chunks: &[Chunk]) -> Result<usize> {
        let created_at = Utc::now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = tx.execute("DELETE FROM code_chunks", [])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO code_chunks (file_path, chunk_type, name, content, line_start, line_end, docstring, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.file_path,
                    chunk.chunk_type,
                    chunk.name,
                    chunk.content,
                    chunk.line_start as i64,
                    chunk.line_end as i64,
                    chunk.docstring,
                    created_at,
                ])?;
            }
        }

        tx.commit()?;
        info!("Replaced {} stored chunks with {}", removed, chunks.len());
        Ok(chunks.len())
    }

    /// Every stored chunk, ordered by file path then start line.
    pub fn list_all(&self) -> Result<Vec<StoredChunk>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY file_path ASC, line_start ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], map_chunk_row)?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?);
        }
        Ok(chunks)
    }

    /// Chunks whose `file_path` equals `file_path` exactly, by start line.
    pub fn list_by_file(&self, file_path: &str) -> Result<Vec<StoredChunk>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE file_path = ? ORDER BY line_start ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![file_path], map_chunk_row)?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?);
        }
        Ok(chunks)
    }
}
