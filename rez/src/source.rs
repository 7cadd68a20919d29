/*!
The logical file: the conceptual concatenation of the root source and every
included file, as produced by the preprocessor. The compiler only ever sees
combined text; this module maps combined line numbers back to physical
`(file, line)` pairs.
*/

use std::fmt::{self, Formatter};

use memchr::memchr_iter;
use serde::Serialize;

/// A resolved source position: physical file, 1-based line, 1-based column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    /// The physical file path
    pub file: String,

    /// 1-based line within `file`
    pub line: usize,

    /// 1-based column within the line
    pub col: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// A run of combined lines that all came from one physical file.
#[derive(Debug, Clone, Serialize)]
struct SourceSpan {
    /// First combined line (1-based) covered by this span
    start_line: usize,

    /// The physical file the span came from
    file: String,

    /// Physical line in `file` corresponding to `start_line`
    origin_line: usize,
}

/// An in-memory logical file. Built by the preprocessor from a root source
/// plus any number of inclusions; consumed by the parser, which asks it to
/// map combined line numbers back to physical positions.
#[derive(Debug, Clone, Serialize)]
pub struct LogicalFile {
    text: String,
    spans: Vec<SourceSpan>,
}

impl LogicalFile {
    /// Create a logical file from a single root source.
    pub fn new(file: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            spans: vec![SourceSpan {
                start_line: 1,
                file: file.into(),
                origin_line: 1,
            }],
        }
    }

    /// Append text included from another physical file. The included text
    /// begins on a fresh combined line and its lines map back to `file`
    /// starting at `origin_line`.
    pub fn include(&mut self, file: impl Into<String>, origin_line: usize, text: &str) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }

        self.spans.push(SourceSpan {
            start_line: self.line_count(),
            file: file.into(),
            origin_line,
        });
        self.text.push_str(text);
    }

    /// The combined source text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of lines in the combined text. The empty text still counts as
    /// one line.
    pub fn line_count(&self) -> usize {
        memchr_iter(b'\n', self.text.as_bytes()).count() + 1
    }

    /// Map a combined 1-based line number to its physical `(file, line)`.
    /// Total over `1..=line_count()`; anything outside that range is `None`.
    pub fn resolve_line(&self, line: usize) -> Option<(&str, usize)> {
        if line == 0 || line > self.line_count() {
            return None;
        }

        let index = self.spans.partition_point(|span| span.start_line <= line);
        let span = &self.spans[index.checked_sub(1)?];
        Some((&span.file, span.origin_line + (line - span.start_line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_file() {
        let source = LogicalFile::new("game.rez", "a\nb\nc");
        assert_eq!(source.line_count(), 3);
        assert_eq!(source.resolve_line(1), Some(("game.rez", 1)));
        assert_eq!(source.resolve_line(3), Some(("game.rez", 3)));
        assert_eq!(source.resolve_line(4), None);
        assert_eq!(source.resolve_line(0), None);
    }

    #[test]
    fn with_inclusion() {
        let mut source = LogicalFile::new("game.rez", "a\nb\n");
        source.include("items.rez", 1, "c\nd");

        // Combined text: a / b / c / d
        assert_eq!(source.text(), "a\nb\nc\nd");
        assert_eq!(source.resolve_line(2), Some(("game.rez", 2)));
        assert_eq!(source.resolve_line(3), Some(("items.rez", 1)));
        assert_eq!(source.resolve_line(4), Some(("items.rez", 2)));
    }

    #[test]
    fn inclusion_mid_file() {
        let mut source = LogicalFile::new("game.rez", "a");
        source.include("items.rez", 10, "b");
        source.include("scenes.rez", 1, "c");

        assert_eq!(source.resolve_line(1), Some(("game.rez", 1)));
        assert_eq!(source.resolve_line(2), Some(("items.rez", 10)));
        assert_eq!(source.resolve_line(3), Some(("scenes.rez", 1)));
    }

    #[test]
    fn position_display() {
        let position = Position {
            file: "game.rez".to_owned(),
            line: 4,
            col: 2,
        };
        assert_eq!(position.to_string(), "game.rez:4:2");
    }
}
