//! Bulk load statement

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Handling of rows that collide with an existing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Fail on duplicates
    #[default]
    Insert,
    /// Replace colliding rows
    Replace,
    /// Skip colliding rows
    Ignore,
}

/// Delimiters and mode of a bulk load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Field separator
    pub field_separator: char,
    /// Optional field enclosure
    pub enclosed_by: Option<char>,
    /// Escape character
    pub escaped_by: char,
    /// Line terminator
    pub line_terminator: char,
    /// Duplicate handling
    pub mode: LoadMode,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            field_separator: '\t',
            enclosed_by: None,
            escaped_by: '\\',
            line_terminator: '\n',
            mode: LoadMode::Insert,
        }
    }
}

impl LoadOptions {
    /// Set the field separator
    pub fn with_field_separator(mut self, c: char) -> Self {
        self.field_separator = c;
        self
    }

    /// Enclose fields in `c`
    pub fn with_enclosed_by(mut self, c: char) -> Self {
        self.enclosed_by = Some(c);
        self
    }

    /// Set the line terminator
    pub fn with_line_terminator(mut self, c: char) -> Self {
        self.line_terminator = c;
        self
    }

    /// Set duplicate handling
    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }
}

fn literal(c: char) -> String {
    match c {
        '\t' => "'\\t'".into(),
        '\n' => "'\\n'".into(),
        '\r' => "'\\r'".into(),
        '\\' => "'\\\\'".into(),
        '\'' => "'\\''".into(),
        c => format!("'{c}'"),
    }
}

/// `LOAD DATA LOCAL INFILE '<reader>' INTO TABLE <table> ...`
pub fn load_sql(
    dialect: &Dialect,
    table: &str,
    columns: &[&str],
    reader: &str,
    options: &LoadOptions,
) -> Result<String> {
    if !dialect.load {
        return Err(Error::unsupported(format!(
            "bulk load is not supported by {}",
            dialect.name
        )));
    }
    let mut sql = format!(
        "LOAD DATA LOCAL INFILE '{}'",
        dialect.escape_string(reader)
    );
    match options.mode {
        LoadMode::Insert => {}
        LoadMode::Replace => sql.push_str(" REPLACE"),
        LoadMode::Ignore => sql.push_str(" IGNORE"),
    }
    sql.push_str(" INTO TABLE ");
    sql.push_str(table);
    sql.push_str(" FIELDS TERMINATED BY ");
    sql.push_str(&literal(options.field_separator));
    if let Some(c) = options.enclosed_by {
        sql.push_str(" ENCLOSED BY ");
        sql.push_str(&literal(c));
    }
    sql.push_str(" ESCAPED BY ");
    sql.push_str(&literal(options.escaped_by));
    sql.push_str(" LINES TERMINATED BY ");
    sql.push_str(&literal(options.line_terminator));
    if !columns.is_empty() {
        sql.push_str(" (");
        sql.push_str(&columns.join(","));
        sql.push(')');
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_sql_defaults() {
        let sql = load_sql(
            &Dialect::mysql(),
            "events",
            &["id", "name"],
            "Reader::abc",
            &LoadOptions::default(),
        )
        .unwrap();
        assert_eq!(
            sql,
            "LOAD DATA LOCAL INFILE 'Reader::abc' INTO TABLE events FIELDS TERMINATED BY '\\t' \
             ESCAPED BY '\\\\' LINES TERMINATED BY '\\n' (id,name)"
        );
    }

    #[test]
    fn test_load_sql_replace_enclosed() {
        let opts = LoadOptions::default()
            .with_field_separator(',')
            .with_enclosed_by('"')
            .with_mode(LoadMode::Replace);
        let sql = load_sql(&Dialect::mysql(), "t", &[], "Reader::x", &opts).unwrap();
        assert!(sql.contains(" REPLACE INTO TABLE t"));
        assert!(sql.contains("TERMINATED BY ','"));
        assert!(sql.contains("ENCLOSED BY '\"'"));
        assert!(!sql.contains('('));
    }

    #[test]
    fn test_load_unsupported() {
        let err = load_sql(&Dialect::postgres(), "t", &[], "r", &LoadOptions::default())
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Unsupported);
    }

    #[test]
    fn test_load_mode_serde() {
        let mode: LoadMode = serde_json::from_str("\"ignore\"").unwrap();
        assert_eq!(mode, LoadMode::Ignore);
    }
}
