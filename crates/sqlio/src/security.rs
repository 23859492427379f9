//! Identifier checks and literal escaping for SQL that cannot be parameterized.
//!
//! Provides:
//! - Identifier validation for table, staging table and lock names
//! - String literal escaping for `SHOW CREATE TABLE`, `LOAD DATA` file names
//!   and information-schema lookups
//!
//! Placeholders are always preferred; these helpers guard the few places
//! where a name has to be spliced into the statement text.

use crate::error::Error;

/// Maximum length of a single identifier part
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Validate a single SQL identifier.
///
/// Must start with an ASCII letter or underscore and contain only ASCII
/// alphanumerics, underscores and `$`.
///
/// ```
/// use sqlio::security::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("users").is_ok());
/// assert!(validate_sql_identifier("stage_users_1a2b").is_ok());
/// assert!(validate_sql_identifier("x; DROP TABLE users--").is_err());
/// assert!(validate_sql_identifier("").is_err());
/// ```
pub fn validate_sql_identifier(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::config("SQL identifier cannot be empty"));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::config(format!(
            "SQL identifier too long: {} chars (max {MAX_IDENTIFIER_LEN})",
            name.len()
        )));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => {
            return Err(Error::config(format!(
                "invalid SQL identifier '{name}': must start with a letter or underscore"
            )));
        }
    }

    if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$')) {
        return Err(Error::config(format!(
            "invalid SQL identifier '{name}': contains invalid character '{c}'"
        )));
    }

    Ok(())
}

/// Validate a possibly schema-qualified name such as `db.users`.
///
/// ```
/// use sqlio::security::validate_qualified_name;
///
/// assert!(validate_qualified_name("sales.orders").is_ok());
/// assert!(validate_qualified_name("sales..orders").is_err());
/// ```
pub fn validate_qualified_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::config("SQL identifier cannot be empty"));
    }
    name.split('.').try_for_each(validate_sql_identifier)
}

/// Escape a value for a single-quoted SQL string literal.
///
/// ```
/// use sqlio::security::escape_string_literal;
///
/// assert_eq!(escape_string_literal("users"), "users");
/// assert_eq!(escape_string_literal("don't"), "don''t");
/// ```
pub fn escape_string_literal(value: &str) -> String {
    if !value.contains('\'') {
        return value.to_string();
    }
    value.replace('\'', "''")
}

/// Split `schema.table` into its parts.
pub fn split_qualified_name(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    }
}
