use crate::config::DATA_DIR_NAME;
use crate::db::models::{Chunk, ChunkType};
use crate::indexer::code_parser::{CodeParser, DeclKind, Declaration, ParseError, SOURCE_EXTENSION};
use ignore::{DirEntry, WalkBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Directory names never descended into. Matched by exact name.
pub const IGNORED_DIRS: &[&str] = &[".git", "__pycache__", DATA_DIR_NAME, "node_modules", ".env"];

/// Module chunks keep only this many leading characters of the file.
pub const MODULE_PREFIX_CHARS: usize = 500;

/// Span assumed for a declaration whose end line is unknown.
///
/// This is an approximation: the chunk covers the declaration line and the
/// nine lines after it (clamped to the file), whatever the real extent is.
pub const SYNTHETIC_SPAN_LINES: usize = 10;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scan root is not a directory: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error(transparent)]
    Parser(#[from] ParseError),
}

/// Why a single file was left out of the scan.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug)]
pub struct SkippedFile {
    pub path: String,
    pub error: FileError,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    /// All chunks, grouped by file in walk order.
    pub chunks: Vec<Chunk>,
    pub files_scanned: usize,
    pub skipped: Vec<SkippedFile>,
}

pub struct Scanner {
    root: PathBuf,
    parser: CodeParser,
}

/// Scan `root` with a fresh [`Scanner`].
pub fn scan<P: AsRef<Path>>(root: P) -> Result<ScanReport, ScanError> {
    Scanner::new(root)?.scan()
}

impl Scanner {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, ScanError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(ScanError::RootNotFound(root.to_path_buf()));
        }
        Ok(Self {
            root: root.to_path_buf(),
            parser: CodeParser::new()?,
        })
    }

    /// Walk the tree and chunk every eligible file.
    ///
    /// Unreadable or unparsable files are skipped and reported; they never
    /// abort the scan.
    pub fn scan(&mut self) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport::default();

        // Standard filters off: only IGNORED_DIRS decides what is skipped.
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(|entry| !is_ignored_dir(entry))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable path: {e}");
                    continue;
                }
            };
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir()
                || path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION)
            {
                continue;
            }

            let rel_path = relative_path(&self.root, path);
            // Links are not followed by the walk; a link to a file counts as that file.
            let result = if file_type.is_symlink() {
                match fs::metadata(path) {
                    Ok(meta) if meta.is_file() => self.chunk_file(path, &rel_path),
                    Ok(_) => continue,
                    Err(e) => Err(FileError::Read(e)),
                }
            } else if file_type.is_file() {
                self.chunk_file(path, &rel_path)
            } else {
                continue;
            };

            match result {
                Ok(chunks) => {
                    debug!("{}: {} chunks", rel_path, chunks.len());
                    report.files_scanned += 1;
                    report.chunks.extend(chunks);
                }
                Err(error) => {
                    warn!("Skipping {}: {}", rel_path, error);
                    report.skipped.push(SkippedFile {
                        path: rel_path,
                        error,
                    });
                }
            }
        }

        info!(
            "Scanned {} files into {} chunks ({} skipped)",
            report.files_scanned,
            report.chunks.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn chunk_file(&mut self, path: &Path, rel_path: &str) -> Result<Vec<Chunk>, FileError> {
        let content = fs::read_to_string(path)?;
        let parsed = self.parser.parse(&content)?;

        let lines: Vec<&str> = content.split('\n').collect();
        let total_lines = lines.len();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut chunks = Vec::with_capacity(parsed.declarations.len() + 1);
        chunks.push(Chunk {
            file_path: rel_path.to_string(),
            chunk_type: ChunkType::Module,
            name: stem,
            content: content.chars().take(MODULE_PREFIX_CHARS).collect(),
            line_start: 1,
            line_end: total_lines,
            docstring: parsed.docstring,
        });

        for decl in parsed.declarations {
            let (line_start, line_end) = resolve_span(&decl, total_lines);
            chunks.push(Chunk {
                file_path: rel_path.to_string(),
                chunk_type: decl.kind.into(),
                name: decl.name,
                content: lines[line_start - 1..line_end].join("\n"),
                line_start,
                line_end,
                docstring: decl.docstring,
            });
        }

        Ok(chunks)
    }
}

impl From<DeclKind> for ChunkType {
    fn from(kind: DeclKind) -> Self {
        match kind {
            DeclKind::Function => ChunkType::Function,
            DeclKind::Class => ChunkType::Class,
        }
    }
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_some_and(|ft| ft.is_dir())
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Line span of a declaration, falling back to [`SYNTHETIC_SPAN_LINES`] when
/// the parser gave no end line. Always within `1..=total_lines`.
fn resolve_span(decl: &Declaration, total_lines: usize) -> (usize, usize) {
    let start = decl.start_line.clamp(1, total_lines.max(1));
    let end = decl
        .end_line
        .unwrap_or(start + SYNTHETIC_SPAN_LINES - 1)
        .clamp(start, total_lines.max(start));
    (start, end)
}
