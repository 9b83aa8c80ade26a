//! # ath, a local code assistant for Python projects
//!
//! Indexes the top-level functions and classes of every `.py` file under a
//! project root into SQLite, ranks them lexically against free-text
//! questions and hands the best matches to a text generator as context.
//!
//! ## Architecture
//!
//! - **[`indexer`]**: Directory walk and tree-sitter parsing into chunks
//! - **[`db`]**: SQLite chunk store (bulk replace, ordered reads, stats, chat history)
//! - **[`retriever`]**: Weighted name/docstring/path keyword ranking
//! - **[`generator`]**: Ollama, OpenAI and Anthropic clients behind one trait
//! - **[`chat`]**: Prompt assembly and the question/answer session
//! - **[`config`]**: Project layout, per-project and per-user settings

pub mod chat;
pub mod config;
pub mod db;
pub mod generator;
pub mod indexer;
pub mod retriever;
