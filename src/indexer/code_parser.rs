//! Structural parsing of Python source with Tree-sitter.
//!
//! Only the top level of a module is visited. Each `def`/`class` there
//! (decorated or not, `async def` included) becomes a [`Declaration`] with
//! its line span and docstring. Nested functions and methods stay inside
//! their parent's span.
//!
//! Docstrings follow the Python convention: the first statement of a body
//! that is a plain string literal. The literal is unquoted, escapes are
//! decoded (unless raw; `\N{name}` stays as written), and the text is
//! cleaned the way `inspect.cleandoc` does it.
//!
//! A file is rejected when the tree has an error node or uses a Python 2
//! `print`/`exec` statement. Checks that CPython only makes at compile time,
//! such as `return` outside a function, are not applied.
use thiserror::Error;
use tree_sitter::{Language, LanguageError, Node, Parser};

/// File extension of the single supported source language.
pub const SOURCE_EXTENSION: &str = "py";

const TAB_SIZE: usize = 8;

const LEGACY_STATEMENTS: [&str; 2] = ["print_statement", "exec_statement"];

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to load the Python grammar: {0}")]
    Language(#[from] LanguageError),

    #[error("syntax error near line {line}")]
    Syntax { line: usize },

    #[error("parser returned no syntax tree")]
    NoTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Function,
    Class,
}

/// A top-level function or class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclKind,
    pub name: String,
    /// 1-based line of the `def` / `class` keyword (decorators excluded).
    pub start_line: usize,
    /// 1-based inclusive end line, `None` when the tree gives no usable end.
    pub end_line: Option<usize>,
    pub docstring: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSource {
    /// Module-level docstring, empty if none.
    pub docstring: String,
    pub declarations: Vec<Declaration>,
}

/// The node kinds the parser cares about.
enum Definition<'t> {
    Function(Node<'t>),
    Class(Node<'t>),
    Other,
}

impl<'t> Definition<'t> {
    fn classify(node: Node<'t>) -> Self {
        match node.kind() {
            "function_definition" => Definition::Function(node),
            "class_definition" => Definition::Class(node),
            "decorated_definition" => node
                .child_by_field_name("definition")
                .map_or(Definition::Other, Definition::classify),
            _ => Definition::Other,
        }
    }
}

pub struct CodeParser {
    parser: Parser,
}

impl CodeParser {
    pub fn new() -> Result<Self, ParseError> {
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        parser.set_language(&language)?;
        Ok(Self { parser })
    }

    /// Parse one file's text into its module docstring and top-level
    /// declarations. Any syntax error fails the whole file.
    pub fn parse(&mut self, source: &str) -> Result<ParsedSource, ParseError> {
        let bytes = source.as_bytes();
        let tree = self.parser.parse(bytes, None).ok_or(ParseError::NoTree)?;
        let root = tree.root_node();

        if root.has_error() {
            let line = first_error_line(root).unwrap_or(1);
            return Err(ParseError::Syntax { line });
        }
        if let Some(line) = first_legacy_statement_line(root) {
            return Err(ParseError::Syntax { line });
        }

        let docstring = block_docstring(root, bytes).unwrap_or_default();

        let mut declarations = Vec::new();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            let (kind, def) = match Definition::classify(node) {
                Definition::Function(def) => (DeclKind::Function, def),
                Definition::Class(def) => (DeclKind::Class, def),
                Definition::Other => continue,
            };
            if let Some(decl) = declaration(kind, def, bytes) {
                declarations.push(decl);
            }
        }

        Ok(ParsedSource {
            docstring,
            declarations,
        })
    }
}

fn declaration(kind: DeclKind, node: Node, source: &[u8]) -> Option<Declaration> {
    let name = node
        .child_by_field_name("name")?
        .utf8_text(source)
        .ok()?
        .to_string();
    let start_line = node.start_position().row + 1;
    let docstring = node
        .child_by_field_name("body")
        .and_then(|body| block_docstring(body, source))
        .unwrap_or_default();

    Some(Declaration {
        kind,
        name,
        start_line,
        end_line: end_line(node, start_line),
        docstring,
    })
}

fn end_line(node: Node, start_line: usize) -> Option<usize> {
    let end = node.end_position();
    // An end at column 0 means the node stopped before that row.
    let line = if end.column == 0 { end.row } else { end.row + 1 };
    (line >= start_line).then_some(line)
}

fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(line) = first_error_line(child) {
                return Some(line);
            }
        }
    }
    None
}

/// Python 2 `print x` / `exec code` statements. The grammar accepts them
/// without error nodes; Python 3 does not.
fn first_legacy_statement_line(node: Node) -> Option<usize> {
    if LEGACY_STATEMENTS.contains(&node.kind()) {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    children.into_iter().find_map(first_legacy_statement_line)
}

/// Docstring of a module or a `def`/`class` body.
fn block_docstring(block: Node, source: &[u8]) -> Option<String> {
    let mut cursor = block.walk();
    let first = block
        .named_children(&mut cursor)
        .find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }

    let mut inner = first.walk();
    let exprs: Vec<Node> = first.named_children(&mut inner).collect();
    let [expr] = exprs.as_slice() else {
        return None;
    };
    let expr = unparenthesize(*expr)?;

    let raw = match expr.kind() {
        "string" => string_value(expr, source)?,
        "concatenated_string" => {
            let mut parts = expr.walk();
            let mut joined = String::new();
            for part in expr.named_children(&mut parts) {
                if part.kind() == "string" {
                    joined.push_str(&string_value(part, source)?);
                }
            }
            joined
        }
        _ => return None,
    };

    Some(clean_docstring(&raw))
}

/// `("doc")` is still a docstring.
fn unparenthesize(mut node: Node) -> Option<Node> {
    while node.kind() == "parenthesized_expression" {
        let mut cursor = node.walk();
        let inner: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|n| n.kind() != "comment")
            .collect();
        let [only] = inner.as_slice() else {
            return None;
        };
        node = *only;
    }
    Some(node)
}

fn string_value(node: Node, source: &[u8]) -> Option<String> {
    string_literal_value(node.utf8_text(source).ok()?)
}

/// Value of a Python string literal, or `None` for bytes and f-strings.
fn string_literal_value(literal: &str) -> Option<String> {
    let quote_at = literal.find(['"', '\''])?;
    let prefix = literal[..quote_at].to_ascii_lowercase();
    if prefix.contains(['b', 'f']) {
        return None;
    }

    let quoted = &literal[quote_at..];
    let delimiter = if quoted.starts_with("\"\"\"") || quoted.starts_with("'''") {
        &quoted[..3]
    } else {
        &quoted[..1]
    };
    let body = quoted
        .strip_prefix(delimiter)?
        .strip_suffix(delimiter)?
        .replace("\r\n", "\n");

    if prefix.contains('r') {
        Some(body)
    } else {
        Some(unescape(&body))
    }
}

/// Decode backslash escapes. `\N{name}` and malformed escapes are kept as
/// written.
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'v' => out.push('\u{0B}'),
            '\\' | '\'' | '"' => out.push(next),
            // line continuation
            '\n' => {}
            '0'..='7' => {
                let mut value = next.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.extend(char::from_u32(value));
            }
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.clone().take(width).collect();
                let decoded = if digits.len() == width
                    && digits.chars().all(|d| d.is_ascii_hexdigit())
                {
                    u32::from_str_radix(&digits, 16)
                        .ok()
                        .and_then(char::from_u32)
                } else {
                    None
                };
                match decoded {
                    Some(ch) => {
                        out.push(ch);
                        for _ in 0..width {
                            chars.next();
                        }
                    }
                    None => {
                        out.push('\\');
                        out.push(next);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

/// Strip the common indentation of all lines after the first, and blank
/// lines at both ends.
fn clean_docstring(doc: &str) -> String {
    let expanded: Vec<String> = doc.split('\n').map(expand_tabs).collect();

    let margin = expanded
        .iter()
        .skip(1)
        .filter(|line| !line.trim_start().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min();

    let mut lines: Vec<&str> = expanded
        .iter()
        .enumerate()
        .map(|(i, line)| match (i, margin) {
            (0, _) => line.trim_start(),
            (_, Some(m)) => line.get(m..).unwrap_or_else(|| line.trim_start()),
            (_, None) => line.as_str(),
        })
        .collect();

    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.trim().is_empty()).count();

    lines[leading..].join("\n")
}

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut column = 0;
    for c in line.chars() {
        if c == '\t' {
            let pad = TAB_SIZE - column % TAB_SIZE;
            out.extend(std::iter::repeat_n(' ', pad));
            column += pad;
        } else {
            out.push(c);
            column += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#""""Utility helpers.

    Indented second line.
"""
import os

# leading comment
def add(a, b):
    """adds two numbers"""
    return a + b


class Subtractor:
    '''Subtract numbers.'''

    def run(self):
        return 1


@decorator
def wrapped():
    pass
"#;

    #[test]
    fn test_parse_top_level_declarations() {
        let mut parser = CodeParser::new().expect("Failed to initialize CodeParser");
        let parsed = parser.parse(SAMPLE).expect("Failed to parse Python code");

        assert_eq!(
            parsed.docstring,
            "Utility helpers.\n\nIndented second line."
        );

        let summary: Vec<(DeclKind, &str, usize, Option<usize>)> = parsed
            .declarations
            .iter()
            .map(|d| (d.kind, d.name.as_str(), d.start_line, d.end_line))
            .collect();
        assert_eq!(
            summary,
            vec![
                (DeclKind::Function, "add", 8, Some(10)),
                (DeclKind::Class, "Subtractor", 13, Some(17)),
                (DeclKind::Function, "wrapped", 21, Some(22)),
            ]
        );

        assert_eq!(parsed.declarations[0].docstring, "adds two numbers");
        assert_eq!(parsed.declarations[1].docstring, "Subtract numbers.");
        assert_eq!(parsed.declarations[2].docstring, "");
    }

    #[test]
    fn test_methods_are_not_top_level() {
        let mut parser = CodeParser::new().unwrap();
        let parsed = parser.parse(SAMPLE).unwrap();
        assert!(parsed.declarations.iter().all(|d| d.name != "run"));
    }

    #[test]
    fn test_async_function_is_a_function() {
        let mut parser = CodeParser::new().unwrap();
        let parsed = parser
            .parse("async def fetch(url):\n    \"\"\"Fetch a page.\"\"\"\n    return url\n")
            .unwrap();
        assert_eq!(parsed.declarations.len(), 1);
        assert_eq!(parsed.declarations[0].kind, DeclKind::Function);
        assert_eq!(parsed.declarations[0].name, "fetch");
        assert_eq!(parsed.declarations[0].docstring, "Fetch a page.");
    }

    #[test]
    fn test_syntax_error_fails_the_file() {
        let mut parser = CodeParser::new().unwrap();
        let err = parser.parse("def broken(:\n    pass\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }), "got {err:?}");
    }

    #[test]
    fn test_non_docstring_literals() {
        let mut parser = CodeParser::new().unwrap();
        let source = "def b():\n    b\"bytes\"\n\ndef f():\n    f\"x{1}\"\n\ndef later():\n    x = 1\n    \"not first\"\n";
        let parsed = parser.parse(source).unwrap();
        assert_eq!(parsed.declarations.len(), 3);
        assert!(parsed.declarations.iter().all(|d| d.docstring.is_empty()));
        assert!(parsed.docstring.is_empty());
    }

    #[test]
    fn test_empty_and_comment_only_sources() {
        let mut parser = CodeParser::new().unwrap();
        assert_eq!(parser.parse("").unwrap(), ParsedSource::default());
        assert_eq!(
            parser.parse("# just a comment\n").unwrap(),
            ParsedSource::default()
        );
    }

    #[test]
    fn test_string_literal_value() {
        assert_eq!(string_literal_value("'x'").as_deref(), Some("x"));
        assert_eq!(string_literal_value("\"\"\"x\"\"\"").as_deref(), Some("x"));
        assert_eq!(string_literal_value(r#"r"keep\n""#).as_deref(), Some(r"keep\n"));
        assert_eq!(string_literal_value(r#""a\nb""#).as_deref(), Some("a\nb"));
        assert_eq!(string_literal_value(r#"U"u""#).as_deref(), Some("u"));
        assert_eq!(string_literal_value("b'x'"), None);
        assert_eq!(string_literal_value("rf'x'"), None);
    }

    #[test]
    fn test_clean_docstring() {
        assert_eq!(clean_docstring("  one line  "), "one line  ");
        assert_eq!(
            clean_docstring("\n    First.\n\n      Indented more.\n    "),
            "First.\n\n  Indented more."
        );
        assert_eq!(clean_docstring("\n\n"), "");
    }

    #[test]
    fn test_escapes_are_decoded() {
        assert_eq!(
            string_literal_value(r#""caf\xe9 \u00e9 \U0001F600""#).as_deref(),
            Some("café é 😀")
        );
        assert_eq!(string_literal_value(r"'\101\0'").as_deref(), Some("A\0"));
        assert_eq!(
            string_literal_value(r"'\a\b\f\v'").as_deref(),
            Some("\u{07}\u{08}\u{0C}\u{0B}")
        );
        // Named escapes, unknown and truncated escapes are kept.
        assert_eq!(
            string_literal_value(r"'\N{BULLET} \q \xZ1'").as_deref(),
            Some(r"\N{BULLET} \q \xZ1")
        );
        assert_eq!(string_literal_value(r"r'\xe9'").as_deref(), Some(r"\xe9"));
    }

    #[test]
    fn test_escaped_docstring_through_parse() {
        let mut parser = CodeParser::new().unwrap();
        let parsed = parser
            .parse("def f():\n    \"\"\"caf\\xe9 \\u00e9 \\N{BULLET}\"\"\"\n")
            .unwrap();
        assert_eq!(parsed.declarations[0].docstring, "café é \\N{BULLET}");
    }

    #[test]
    fn test_parenthesized_docstring() {
        let mut parser = CodeParser::new().unwrap();
        let parsed = parser
            .parse("(\"Module doc.\")\n\ndef f():\n    (\"paren \" \"doc\")\n")
            .unwrap();
        assert_eq!(parsed.docstring, "Module doc.");
        assert_eq!(parsed.declarations[0].docstring, "paren doc");
    }

    #[test]
    fn test_crlf_docstring() {
        assert_eq!(string_literal_value("'a\\\r\nb'").as_deref(), Some("ab"));

        let mut parser = CodeParser::new().unwrap();
        let parsed = parser
            .parse("def f():\r\n    \"\"\"First.\r\n\r\n    Second.\r\n    \"\"\"\r\n    return 1\r\n")
            .unwrap();
        assert_eq!(parsed.declarations[0].docstring, "First.\n\nSecond.");
    }

    #[test]
    fn test_python2_statements_fail_the_file() {
        let mut parser = CodeParser::new().unwrap();
        let err = parser.parse("print 'hi'\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1 }), "got {err:?}");

        let err = parser
            .parse("def run():\n    exec \"x = 1\"\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2 }), "got {err:?}");

        let parsed = parser.parse("def run():\n    print(\"hi\")\n").unwrap();
        assert_eq!(parsed.declarations.len(), 1);
    }
}
