//! Source spans — a (byte offset, line, column, length) quadruple attached
//! to every token and AST node for diagnostics.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub line: u32,
    pub column: u32,
    pub len: usize,
}

impl Span {
    pub fn new(start: usize, line: u32, column: u32, len: usize) -> Self {
        Self { start, line, column, len }
    }

    /// A zero-length span at end-of-file, used for the synthetic EOF token.
    pub fn eof(start: usize, line: u32, column: u32) -> Self {
        Self { start, line, column, len: 0 }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
