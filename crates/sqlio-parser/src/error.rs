//! Parse errors

use crate::token::Token;

/// Result type for parser operations
pub type Result<T> = std::result::Result<T, ParseError>;

/// A syntax error with the cursor position it was detected at
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at line {line}, column {col}")]
pub struct ParseError {
    /// What went wrong
    pub message: String,
    /// Byte offset into the source
    pub position: usize,
    /// Line (1-based)
    pub line: u32,
    /// Column (1-based, in characters)
    pub col: u32,
}

impl ParseError {
    /// Error located at `token`
    pub fn at(message: impl Into<String>, token: &Token) -> Self {
        Self {
            message: message.into(),
            position: token.position,
            line: token.line,
            col: token.col,
        }
    }

    /// Error at an explicit cursor position
    pub fn new(message: impl Into<String>, position: usize, line: u32, col: u32) -> Self {
        Self {
            message: message.into(),
            position,
            line,
            col,
        }
    }
}
