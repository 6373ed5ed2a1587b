//! Line reader for configuration text
//!
//! This module turns a buffered character stream into logical lines. A
//! logical line is one or more physical lines joined by backslash
//! continuations, classified as blank, comment, section header, include
//! directive or variable assignment.

use std::io::{self, BufRead};

/// Keyword that starts an include directive
pub const DEFAULT_INCLUDE_DIRECTIVE: &str = "%include";

/// Classification of a logical line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Empty after leading whitespace is stripped
    Blank,
    /// Starts with `#` or `!`
    Comment,
    /// Starts with `[`
    Section,
    /// First token is the include directive
    Include,
    /// Anything else
    Variable,
}

/// A logical line read from the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Classification of the line
    pub kind: LineKind,
    /// Number of the first physical line (1-based)
    pub number: usize,
    /// Text with leading whitespace and continuations removed
    pub text: String,
}

/// Reader producing logical lines from a buffered stream
pub struct LineReader<R: BufRead> {
    /// Buffered reader for input
    reader: R,
    /// Keyword recognised as an include directive
    include_directive: String,
    /// Number of physical lines consumed so far
    line_number: usize,
    /// Scratch buffer for the physical line being read
    buffer: String,
}

impl<R: BufRead> LineReader<R> {
    /// Creates a new line reader using the default include directive
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            include_directive: DEFAULT_INCLUDE_DIRECTIVE.to_string(),
            line_number: 0,
            buffer: String::with_capacity(256),
        }
    }

    /// Sets the keyword recognised as an include directive
    pub fn with_include_directive(mut self, directive: impl Into<String>) -> Self {
        self.include_directive = directive.into();
        self
    }

    /// Returns the number of physical lines consumed so far
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Classifies a physical line whose leading whitespace is already gone
    pub fn classify(&self, text: &str) -> LineKind {
        if text.is_empty() {
            LineKind::Blank
        } else if text.starts_with('#') || text.starts_with('!') {
            LineKind::Comment
        } else if text.starts_with('[') {
            LineKind::Section
        } else if text.split_whitespace().next() == Some(self.include_directive.as_str()) {
            LineKind::Include
        } else {
            LineKind::Variable
        }
    }

    /// Reads the next logical line, or `None` at end of input
    pub fn next_line(&mut self) -> io::Result<Option<Line>> {
        let Some(first) = self.read_physical()? else {
            return Ok(None);
        };
        let number = self.line_number;
        let kind = self.classify(&first);
        let mut text = first;

        if kind == LineKind::Variable {
            while ends_with_continuation(&text) {
                text.pop();
                match self.read_physical()? {
                    Some(next) => text.push_str(&next),
                    None => break,
                }
            }
        }

        Ok(Some(Line { kind, number, text }))
    }

    /// Reads one physical line without its terminator or leading whitespace
    fn read_physical(&mut self) -> io::Result<Option<String>> {
        self.buffer.clear();
        if self.reader.read_line(&mut self.buffer)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        let mut line = self.buffer.as_str();
        if let Some(stripped) = line.strip_suffix('\n') {
            line = stripped.strip_suffix('\r').unwrap_or(stripped);
        }
        Ok(Some(line.trim_start().to_string()))
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}

/// Returns true if `text` ends in an odd number of backslashes
pub fn ends_with_continuation(text: &str) -> bool {
    let trailing = text.bytes().rev().take_while(|&b| b == b'\\').count();
    trailing % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &str) -> Vec<Line> {
        LineReader::new(input.as_bytes())
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_classification() {
        let result = lines(
            "\n  # comment\n! also comment\n[main]\n%include \"other.cfg\"\n  name = value\n",
        );
        let kinds: Vec<LineKind> = result.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LineKind::Blank,
                LineKind::Comment,
                LineKind::Comment,
                LineKind::Section,
                LineKind::Include,
                LineKind::Variable,
            ]
        );
        assert_eq!(result[5].text, "name = value");
        assert_eq!(result[5].number, 6);
    }

    #[test]
    fn test_include_keyword_must_be_whole_token() {
        let result = lines("%includes = 3\n%include\"x\"\n");
        assert_eq!(result[0].kind, LineKind::Variable);
        assert_eq!(result[1].kind, LineKind::Variable);
    }

    #[test]
    fn test_custom_include_directive() {
        let reader = LineReader::new("@import \"a\"\n".as_bytes()).with_include_directive("@import");
        let result: Vec<Line> = reader.collect::<io::Result<_>>().unwrap();
        assert_eq!(result[0].kind, LineKind::Include);
    }

    #[test]
    fn test_continuation_lines() {
        let result = lines("[s]\nlong = one \\\n    two \\\n    three\nnext = 1\n");
        assert_eq!(result[1].text, "long = one two three");
        assert_eq!(result[1].number, 2);
        assert_eq!(result[2].text, "next = 1");
        assert_eq!(result[2].number, 5);
    }

    #[test]
    fn test_even_backslashes_do_not_continue() {
        let result = lines("path = C:\\\\\nnext = 1\n");
        assert_eq!(result[0].text, "path = C:\\\\");
        assert_eq!(result[1].text, "next = 1");

        let result = lines("odd = a\\\\\\\nb\n");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "odd = a\\\\b");
    }

    #[test]
    fn test_only_variables_continue() {
        let result = lines("# comment \\\nname = v\n");
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].kind, LineKind::Variable);
    }

    #[test]
    fn test_partial_line_flushed_at_eof() {
        let result = lines("name = dangling \\");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "name = dangling ");

        let mut reader = LineReader::new("".as_bytes());
        assert!(reader.next_line().unwrap().is_none());
    }

    #[test]
    fn test_crlf_terminators() {
        let result = lines("[s]\r\nname = v\r\n");
        assert_eq!(result[0].text, "[s]");
        assert_eq!(result[1].text, "name = v");
    }

    #[test]
    fn test_ends_with_continuation() {
        assert!(ends_with_continuation("a\\"));
        assert!(!ends_with_continuation("a\\\\"));
        assert!(ends_with_continuation("a\\\\\\"));
        assert!(!ends_with_continuation("a"));
        assert!(!ends_with_continuation(""));
    }
}
