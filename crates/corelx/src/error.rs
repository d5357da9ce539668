//! Error taxonomy — one enum, each variant carrying a source span and a
//! human-readable message. Hand-rolled `Display`/`Error` impls rather than
//! a derive-macro error crate, matching every main-line crate in this
//! corpus.

use crate::span::Span;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize)]
pub enum CompileError {
    Lex { span: Span, message: String },
    Parse { span: Span, message: String },
    Semantic { span: Span, message: String },
    Codegen { span: Option<Span>, message: String },
    Io { message: String },
}

impl CompileError {
    pub fn lex(span: Span, message: impl Into<String>) -> Self {
        CompileError::Lex { span, message: message.into() }
    }
    pub fn parse(span: Span, message: impl Into<String>) -> Self {
        CompileError::Parse { span, message: message.into() }
    }
    pub fn semantic(span: Span, message: impl Into<String>) -> Self {
        CompileError::Semantic { span, message: message.into() }
    }
    pub fn codegen(span: Option<Span>, message: impl Into<String>) -> Self {
        CompileError::Codegen { span, message: message.into() }
    }
    pub fn io(message: impl Into<String>) -> Self {
        CompileError::Io { message: message.into() }
    }

    /// The `<phase>` component of the `<phase> error: <message>` line.
    pub fn phase(&self) -> &'static str {
        match self {
            CompileError::Lex { .. } => "lex",
            CompileError::Parse { .. } => "parse",
            CompileError::Semantic { .. } => "semantic",
            CompileError::Codegen { .. } => "codegen",
            CompileError::Io { .. } => "io",
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Lex { span, .. }
            | CompileError::Parse { span, .. }
            | CompileError::Semantic { span, .. } => Some(*span),
            CompileError::Codegen { span, .. } => *span,
            CompileError::Io { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CompileError::Lex { message, .. }
            | CompileError::Parse { message, .. }
            | CompileError::Semantic { message, .. }
            | CompileError::Codegen { message, .. }
            | CompileError::Io { message } => message,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span() {
            Some(span) => write!(f, "{} error: {} ({span})", self.phase(), self.message()),
            None => write!(f, "{} error: {}", self.phase(), self.message()),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::io(e.to_string())
    }
}
