//! Question answering over the index.
//!
//! The assistant retrieves the chunks most relevant to a question, wraps
//! them with a short overview of the project and hands the prompt to a
//! [`Generator`]. Generator failures never escape: they come back as the
//! answer text so an interactive session keeps going.
use tracing::{debug, info, warn};

use crate::db::Db;
use crate::db::models::{ChunkType, StoredChunk};
use crate::generator::Generator;
use crate::retriever;

/// Characters of the project overview included in each prompt.
pub const PROJECT_CONTEXT_CHARS: usize = 1500;

const PREAMBLE: [&str; 2] = [
    "You are Ath, an AI assistant that helps developers understand and work with their specific codebase.",
    "You have access to the complete source code and can provide detailed, contextual help.",
];

const GUIDELINES: [&str; 6] = [
    "- Reference specific functions, classes, and files from this codebase",
    "- Provide practical examples using the actual project structure",
    "- Help with debugging by understanding the full context",
    "- Suggest improvements based on existing patterns",
    "- Be specific about line numbers and file locations when helpful",
    "- Keep responses concise but informative",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Ids of the chunks the prompt was grounded on, most relevant first.
    pub sources: Vec<i64>,
}

/// Overview of every indexed file with its classes and functions.
///
/// Chunks must arrive grouped by file, which `Db::list_all` guarantees.
pub fn build_project_context(chunks: &[StoredChunk]) -> String {
    let mut files: Vec<(&str, Vec<&StoredChunk>)> = Vec::new();
    for chunk in chunks {
        match files.last_mut() {
            Some((path, group)) if *path == chunk.file_path => group.push(chunk),
            _ => files.push((chunk.file_path.as_str(), vec![chunk])),
        }
    }

    let mut lines = vec![
        "=== PROJECT OVERVIEW ===".to_string(),
        format!("Total files: {}", files.len()),
        format!("Total code chunks: {}", chunks.len()),
        "\n=== FILE STRUCTURE ===".to_string(),
    ];

    for (path, group) in &files {
        lines.push(format!("\n{path}:"));
        let classes = names_of(group, ChunkType::Class);
        if !classes.is_empty() {
            lines.push(format!("  Classes: {classes}"));
        }
        let functions = names_of(group, ChunkType::Function);
        if !functions.is_empty() {
            lines.push(format!("  Functions: {functions}"));
        }
    }

    lines.join("\n")
}

fn names_of(group: &[&StoredChunk], kind: ChunkType) -> String {
    group
        .iter()
        .filter(|c| c.chunk_type == kind)
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Assemble the full prompt sent to the generator.
pub fn build_prompt(project_context: &str, relevant: &[&StoredChunk], question: &str) -> String {
    let mut parts: Vec<String> = PREAMBLE.iter().map(|s| s.to_string()).collect();
    parts.push(String::new());
    parts.push("PROJECT CONTEXT:".to_string());
    if project_context.is_empty() {
        parts.push("No context available".to_string());
    } else {
        parts.push(project_context.chars().take(PROJECT_CONTEXT_CHARS).collect());
    }

    if !relevant.is_empty() {
        parts.push("\nRELEVANT CODE SECTIONS:".to_string());
        for chunk in relevant {
            parts.push(format!(
                "\n{}: {} in {}",
                chunk.chunk_type.as_str().to_uppercase(),
                chunk.name,
                chunk.file_path
            ));
            if !chunk.docstring.is_empty() {
                parts.push(format!("Documentation: {}", chunk.docstring));
            }
        }
    }

    parts.push(String::new());
    parts.push("Guidelines:".to_string());
    parts.extend(GUIDELINES.iter().map(|s| s.to_string()));

    format!("{}\n\nUser question: {question}", parts.join("\n"))
}

/// A chat session bound to one store and one generator.
pub struct Assistant<'a, G: Generator + ?Sized> {
    db: &'a Db,
    generator: &'a G,
    top_k: usize,
    project_context: String,
}

impl<'a, G: Generator + ?Sized> Assistant<'a, G> {
    /// Build the session, loading the project overview once.
    ///
    /// An unreadable store yields an empty overview rather than an error.
    pub fn new(db: &'a Db, generator: &'a G, top_k: usize) -> Self {
        let project_context = match db.list_all() {
            Ok(chunks) => {
                info!("Loaded {} code chunks for chat context", chunks.len());
                build_project_context(&chunks)
            }
            Err(e) => {
                warn!("Could not load project context: {e}");
                String::new()
            }
        };

        Self {
            db,
            generator,
            top_k,
            project_context,
        }
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Answer one question. Always returns an answer.
    pub fn ask(&self, question: &str) -> Answer {
        let chunks = self.db.list_all().unwrap_or_else(|e| {
            warn!("Could not find relevant chunks: {e}");
            Vec::new()
        });
        let relevant = retriever::retrieve(question, &chunks, self.top_k);
        debug!("{} relevant chunks for {:?}", relevant.len(), question);

        let prompt = build_prompt(&self.project_context, &relevant, question);
        let text = match self.generator.generate(&prompt) {
            Ok(text) => text,
            Err(e) => {
                warn!("{} failed: {e}", self.generator.name());
                format!("Sorry, I could not get an answer from {}: {e}", self.generator.name())
            }
        };

        if let Err(e) = self.db.save_chat(question, &text) {
            warn!("Failed to save chat history: {e}");
        }

        Answer {
            text,
            sources: relevant.iter().map(|c| c.id).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Chunk;
    use crate::generator::mock::MockGenerator;

    fn chunk(file_path: &str, chunk_type: ChunkType, name: &str, line: usize, doc: &str) -> Chunk {
        Chunk {
            file_path: file_path.to_string(),
            chunk_type,
            name: name.to_string(),
            content: format!("# {name}"),
            line_start: line,
            line_end: line,
            docstring: doc.to_string(),
        }
    }

    fn seeded_db() -> Db {
        let mut db = Db::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.replace_all(&[
            chunk("calc.py", ChunkType::Module, "calc", 1, "Arithmetic."),
            chunk("calc.py", ChunkType::Function, "add", 3, "Add two numbers."),
            chunk("calc.py", ChunkType::Class, "Subtractor", 8, ""),
            chunk("io/reader.py", ChunkType::Module, "reader", 1, ""),
            chunk("io/reader.py", ChunkType::Function, "read_lines", 2, ""),
        ])
        .unwrap();
        db
    }

    #[test]
    fn test_project_context_groups_by_file() {
        let db = seeded_db();
        let context = build_project_context(&db.list_all().unwrap());

        assert!(context.starts_with("=== PROJECT OVERVIEW ===\nTotal files: 2\nTotal code chunks: 5"));
        assert!(context.contains("\ncalc.py:\n  Classes: Subtractor\n  Functions: add"));
        assert!(context.contains("\nio/reader.py:\n  Functions: read_lines"));
    }

    #[test]
    fn test_prompt_layout() {
        let db = seeded_db();
        let chunks = db.list_all().unwrap();
        let add = chunks.iter().find(|c| c.name == "add").unwrap();

        let prompt = build_prompt("overview", &[add], "what does add do?");
        assert!(prompt.starts_with("You are Ath"));
        assert!(prompt.contains("PROJECT CONTEXT:\noverview\n"));
        assert!(prompt.contains("RELEVANT CODE SECTIONS:\n\nFUNCTION: add in calc.py\nDocumentation: Add two numbers."));
        assert!(prompt.contains("Guidelines:\n- Reference"));
        assert!(prompt.ends_with("\n\nUser question: what does add do?"));
    }

    #[test]
    fn test_prompt_truncates_context_and_handles_empty() {
        let long = "x".repeat(PROJECT_CONTEXT_CHARS + 200);
        let prompt = build_prompt(&long, &[], "q");
        assert!(prompt.contains(&"x".repeat(PROJECT_CONTEXT_CHARS)));
        assert!(!prompt.contains(&"x".repeat(PROJECT_CONTEXT_CHARS + 1)));
        assert!(!prompt.contains("RELEVANT CODE SECTIONS"));

        let prompt = build_prompt("", &[], "q");
        assert!(prompt.contains("PROJECT CONTEXT:\nNo context available"));
    }

    #[test]
    fn test_ask_grounds_prompt_and_records_history() {
        let db = seeded_db();
        let generator = MockGenerator::replying("It adds.");
        let assistant = Assistant::new(&db, &generator, 10);

        let answer = assistant.ask("what does add return");
        assert_eq!(answer.text, "It adds.");

        let add_id = db.list_by_file("calc.py").unwrap()[1].id;
        assert_eq!(answer.sources, vec![add_id]);

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("FUNCTION: add in calc.py"));
        assert_eq!(db.chat_history_len().unwrap(), 1);
    }

    #[test]
    fn test_generator_failure_becomes_answer_text() {
        let db = seeded_db();
        let generator = MockGenerator::failing("connection refused");
        let assistant = Assistant::new(&db, &generator, 10);

        let answer = assistant.ask("read_lines");
        assert!(answer.text.starts_with("Sorry"));
        assert!(answer.text.contains("connection refused"));
        assert_eq!(db.chat_history_len().unwrap(), 1);
    }

    #[test]
    fn test_uninitialized_store_still_answers() {
        let db = Db::open_in_memory().unwrap();
        let generator = MockGenerator::replying("No code indexed.");
        let assistant = Assistant::new(&db, &generator, 10);

        let answer = assistant.ask("anything here");
        assert_eq!(answer.text, "No code indexed.");
        assert!(answer.sources.is_empty());
        assert!(generator.prompts()[0].contains("No context available"));
    }
}
