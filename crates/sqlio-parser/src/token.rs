//! Tokens produced by the lexer

use std::fmt;

/// A token and where it starts in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub position: usize,
    /// Line (1-based)
    pub line: u32,
    /// Column (1-based)
    pub col: u32,
}

/// Token kinds
///
/// Keywords are not separate kinds: the parser matches [`TokenKind::Word`]
/// case-insensitively, so every keyword can still appear quoted as an
/// identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word: identifier or keyword
    Word(String),
    /// Quoted identifier and its opening quote (`` ` ``, `"` or `[`)
    Quoted(String, char),
    /// Integer literal that fits in `i64`
    Integer(i64),
    /// Any other numeric literal, kept as written
    Numeric(String),
    /// Single-quoted string, unescaped
    String(String),
    /// Bind parameter as written: `?`, `?1`, `$1`, `:name`, `@name`
    Placeholder(String),
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `*`
    Star,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `/`
    Slash,
    /// `=`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `;`
    Semicolon,
    /// End of input
    Eof,
}

impl TokenKind {
    /// Whether this is the word `kw`, ignoring case
    pub fn is_word(&self, kw: &str) -> bool {
        matches!(self, Self::Word(w) if w.eq_ignore_ascii_case(kw))
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => write!(f, "'{w}'"),
            Self::Quoted(w, q) => write!(f, "quoted identifier {q}{w}"),
            Self::Integer(n) => write!(f, "integer {n}"),
            Self::Numeric(n) => write!(f, "number {n}"),
            Self::String(s) => write!(f, "string '{s}'"),
            Self::Placeholder(p) => write!(f, "placeholder {p}"),
            Self::Comma => f.write_str("','"),
            Self::Dot => f.write_str("'.'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Star => f.write_str("'*'"),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Slash => f.write_str("'/'"),
            Self::Eq => f.write_str("'='"),
            Self::Ne => f.write_str("'!='"),
            Self::Lt => f.write_str("'<'"),
            Self::Le => f.write_str("'<='"),
            Self::Gt => f.write_str("'>'"),
            Self::Ge => f.write_str("'>='"),
            Self::Semicolon => f.write_str("';'"),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

/// Words that end an expression or clause and so never act as aliases
pub const RESERVED: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BY", "CASE", "CROSS", "DESC", "DISTINCT", "ELSE", "END", "EXCEPT",
    "FALSE", "FROM", "FULL", "GROUP", "HAVING", "IN", "INNER", "IS", "JOIN", "LEFT", "LIMIT", "NOT",
    "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "PARTITION", "RIGHT", "SELECT", "SET", "THEN",
    "TRUE", "UNION", "UPDATE", "WHEN", "WHERE", "WINDOW", "WITH",
];

/// Whether `word` is reserved
pub fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|kw| kw.eq_ignore_ascii_case(word))
}
