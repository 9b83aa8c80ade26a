//! Lexical relevance ranking over indexed chunks.
//!
//! A chunk's score is the weighted count of query words that also appear in
//! its name, its docstring and its file path. There is no stemming and no
//! semantic similarity: `subtract` does not match `subtractor`.
use crate::db::models::Chunk;
use std::collections::HashSet;

pub const DEFAULT_TOP_K: usize = 5;

const NAME_WEIGHT: u32 = 5;
const DOC_WEIGHT: u32 = 3;
const PATH_WEIGHT: u32 = 2;

/// Query words of this many characters or fewer are dropped.
const MAX_SHORT_WORD_LEN: usize = 2;

#[derive(Debug)]
pub struct ScoredChunk<'a, C> {
    pub chunk: &'a C,
    pub score: u32,
}

/// Lower-cased whitespace-separated words of `query` longer than two
/// characters.
pub fn query_words(query: &str) -> HashSet<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() > MAX_SHORT_WORD_LEN)
        .collect()
}

/// Score one chunk against a prepared set of query words.
pub fn score_chunk(words: &HashSet<String>, chunk: &Chunk) -> u32 {
    if words.is_empty() {
        return 0;
    }

    let name = chunk.name.to_lowercase();
    let name_tokens: HashSet<&str> = name.split('_').chain(name.split_whitespace()).collect();

    let doc = chunk.docstring.to_lowercase();
    let doc_tokens: HashSet<&str> = doc.split_whitespace().collect();

    let path = chunk.file_path.to_lowercase().replace(['/', '\\', '.'], " ");
    let path_tokens: HashSet<&str> = path.split_whitespace().collect();

    NAME_WEIGHT * overlap(words, &name_tokens)
        + DOC_WEIGHT * overlap(words, &doc_tokens)
        + PATH_WEIGHT * overlap(words, &path_tokens)
}

fn overlap(words: &HashSet<String>, tokens: &HashSet<&str>) -> u32 {
    words.iter().filter(|w| tokens.contains(w.as_str())).count() as u32
}

/// Every chunk with a positive score, best first. Equal scores keep the
/// order of `chunks`.
pub fn rank<'a, C: AsRef<Chunk>>(query: &str, chunks: &'a [C]) -> Vec<ScoredChunk<'a, C>> {
    let words = query_words(query);
    let mut scored: Vec<ScoredChunk<'a, C>> = chunks
        .iter()
        .map(|chunk| ScoredChunk {
            chunk,
            score: score_chunk(&words, chunk.as_ref()),
        })
        .filter(|s| s.score > 0)
        .collect();

    // stable: ties stay in input order
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

/// The `top_k` chunks most relevant to `query`.
pub fn retrieve<'a, C: AsRef<Chunk>>(query: &str, chunks: &'a [C], top_k: usize) -> Vec<&'a C> {
    rank(query, chunks)
        .into_iter()
        .take(top_k)
        .map(|s| s.chunk)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ChunkType;

    fn chunk(file_path: &str, name: &str, docstring: &str) -> Chunk {
        Chunk {
            file_path: file_path.to_string(),
            chunk_type: ChunkType::Function,
            name: name.to_string(),
            content: String::new(),
            line_start: 1,
            line_end: 1,
            docstring: docstring.to_string(),
        }
    }

    fn names<'a>(chunks: &[&'a Chunk]) -> Vec<&'a str> {
        chunks.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_query_words_drop_short_tokens() {
        let words = query_words("How do I Parse the CONFIG?");
        let mut sorted: Vec<&str> = words.iter().map(String::as_str).collect();
        sorted.sort();
        assert_eq!(sorted, vec!["config?", "how", "parse", "the"]);
    }

    #[test]
    fn test_name_match_outranks_no_match() {
        let chunks = vec![
            chunk("app/view.py", "render_view", ""),
            chunk("app/settings.py", "parse_config", ""),
        ];
        let result = retrieve("config parser", &chunks, 5);
        assert_eq!(names(&result), vec!["parse_config"]);
    }

    #[test]
    fn test_weights() {
        let words = query_words("loader config yaml");
        assert_eq!(score_chunk(&words, &chunk("x.py", "config_loader", "")), 10);
        assert_eq!(score_chunk(&words, &chunk("x.py", "f", "reads yaml config")), 6);
        assert_eq!(score_chunk(&words, &chunk("config/yaml.py", "f", "")), 4);
        assert_eq!(
            score_chunk(&words, &chunk("config.py", "config", "the config")),
            5 + 3 + 2
        );
    }

    #[test]
    fn test_whole_name_and_underscore_parts_both_match() {
        let words = query_words("parse_config");
        assert_eq!(score_chunk(&words, &chunk("x.py", "parse_config", "")), 5);
        let words = query_words("parse");
        assert_eq!(score_chunk(&words, &chunk("x.py", "PARSE_config", "")), 5);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let chunks = vec![
            chunk("a.py", "load_one", ""),
            chunk("b.py", "load_two", ""),
            chunk("c.py", "store", "load it"),
            chunk("d.py", "load_three", ""),
        ];
        let first = retrieve("load", &chunks, 5);
        let second = retrieve("load", &chunks, 5);
        assert_eq!(names(&first), vec!["load_one", "load_two", "load_three", "store"]);
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn test_top_k_limits() {
        let chunks: Vec<Chunk> = (0..8)
            .map(|i| chunk("a.py", &format!("handler_{i}"), ""))
            .collect();
        assert_eq!(retrieve("handler", &chunks, 3).len(), 3);
        assert!(retrieve("handler", &chunks, 0).is_empty());
    }

    #[test]
    fn test_empty_query_and_empty_input() {
        let chunks = vec![chunk("a.py", "anything", "some words")];
        assert!(retrieve("", &chunks, 5).is_empty());
        assert!(retrieve("an of", &chunks, 5).is_empty());
        let none: Vec<Chunk> = Vec::new();
        assert!(retrieve("x", &none, 5).is_empty());
        assert!(retrieve("anything", &none, 5).is_empty());
    }
}
