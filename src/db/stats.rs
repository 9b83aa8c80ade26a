use super::{Db, Result, models::*};
use std::collections::HashSet;

impl ChunkStats {
    /// Aggregate counts in a single pass.
    pub fn from_chunks<C: AsRef<Chunk>>(chunks: &[C]) -> Self {
        let mut files = HashSet::new();
        let mut stats = ChunkStats {
            total_chunks: chunks.len(),
            ..Default::default()
        };

        for chunk in chunks {
            let chunk: &Chunk = chunk.as_ref();
            files.insert(chunk.file_path.as_str());
            match chunk.chunk_type {
                ChunkType::Function => stats.function_count += 1,
                ChunkType::Class => stats.class_count += 1,
                ChunkType::Module => {}
            }
        }

        stats.distinct_files = files.len();
        stats
    }
}

impl Db {
    /// Recomputed from [`Db::list_all`] on every call; nothing is cached.
    pub fn stats(&self) -> Result<ChunkStats> {
        Ok(ChunkStats::from_chunks(&self.list_all()?))
    }
}
