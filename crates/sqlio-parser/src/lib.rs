//! # sqlio-parser
//!
//! Parser for the SELECT/UPDATE subset used by `sqlio`.
//!
//! Provides:
//! - **Lexer**: tokens with byte offset, line and column
//! - **AST**: [`Select`], [`Update`] and the [`Expr`] tree
//! - **Parser**: recursive descent for statements, precedence climbing for
//!   expressions
//! - **Printer**: `Display` on every node emits canonically spaced SQL that
//!   parses back to the same tree
//!
//! # Example
//!
//! ```
//! use sqlio_parser::parse_select;
//!
//! let select = parse_select("select id, name from users u where u.id in (1,2)").unwrap();
//! assert_eq!(
//!     select.to_string(),
//!     "SELECT id, name FROM users u WHERE u.id IN (1, 2)"
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod ast;
pub mod error;
mod expr;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{BinaryOp, Expr, Ident, Literal, Name, Select, Statement, Update};
pub use error::{ParseError, Result};
pub use parser::Parser;

/// Parse a single SELECT or UPDATE statement
pub fn parse(sql: &str) -> Result<Statement> {
    Parser::new(sql)?.statement()
}

/// Parse a SELECT statement
pub fn parse_select(sql: &str) -> Result<Select> {
    let mut parser = Parser::new(sql)?;
    let select = parser.select()?;
    parser.finish()?;
    Ok(select)
}

/// Parse an UPDATE statement
pub fn parse_update(sql: &str) -> Result<Update> {
    let mut parser = Parser::new(sql)?;
    let update = parser.update()?;
    parser.finish()?;
    Ok(update)
}

/// Parse a standalone expression
pub fn parse_expr(sql: &str) -> Result<Expr> {
    let mut parser = Parser::new(sql)?;
    let expr = parser.expr()?;
    parser.finish()?;
    Ok(expr)
}
