//! Multi-row INSERT builder

use super::{prefix, TupleEnds};
use crate::dialect::{Dialect, PlaceholderGenerator};
use crate::error::{Error, Result};
use std::borrow::Cow;

/// Prebuilt `INSERT INTO t(c1,..) VALUES (..),(..)` for a batch size
///
/// The statement for the full batch is rendered once; smaller batches are
/// prefixes of it, so building never allocates unless a `RETURNING` clause
/// or an upsert tail has to be appended.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    sql: String,
    ends: TupleEnds,
    columns: usize,
    suffix: Option<String>,
}

impl InsertBuilder {
    /// Render the statement for `batch_size` tuples of `columns`
    ///
    /// `placeholders` yields one token per bound value in statement order,
    /// so ordinal styles keep counting across tuples.
    pub fn new(
        table: &str,
        columns: &[&str],
        mut placeholders: PlaceholderGenerator,
        batch_size: usize,
    ) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::mapping(format!("no columns to insert into {table}")));
        }
        let batch_size = batch_size.max(1);
        let mut sql = String::with_capacity(32 + table.len() + batch_size * columns.len() * 4);
        sql.push_str("INSERT INTO ");
        sql.push_str(table);
        sql.push('(');
        sql.push_str(&columns.join(","));
        sql.push_str(") VALUES ");

        let mut ends = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            if i > 0 {
                sql.push(',');
            }
            sql.push('(');
            for j in 0..columns.len() {
                if j > 0 {
                    sql.push(',');
                }
                sql.push_str(&placeholders.next_token());
            }
            sql.push(')');
            ends.push(sql.len());
        }

        Ok(Self {
            sql,
            ends,
            columns: columns.len(),
            suffix: None,
        })
    }

    /// Append a vendor upsert tail (`ON DUPLICATE KEY UPDATE ...`)
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        self.suffix = (!suffix.trim().is_empty()).then_some(suffix);
        self
    }

    /// Configured batch size
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.ends.len()
    }

    /// Values bound per tuple
    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Statement for `requested` tuples
    ///
    /// `RETURNING <identity>` is appended when the dialect supports it and
    /// an identity column is given.
    pub fn build<'a>(
        &'a self,
        requested: usize,
        dialect: &Dialect,
        identity: Option<&str>,
    ) -> Result<Cow<'a, str>> {
        let head = prefix(&self.sql, &self.ends, requested).ok_or_else(|| {
            Error::internal(format!(
                "requested {requested} tuples from an insert built for {}",
                self.batch_size()
            ))
        })?;
        let returning = identity.filter(|_| dialect.supports_returning());
        if returning.is_none() && self.suffix.is_none() {
            return Ok(Cow::Borrowed(head));
        }

        let mut sql = String::with_capacity(head.len() + 64);
        sql.push_str(head);
        if let Some(suffix) = &self.suffix {
            sql.push(' ');
            sql.push_str(suffix.trim());
        }
        if let Some(id) = returning {
            sql.push_str(" RETURNING ");
            sql.push_str(id);
        }
        Ok(Cow::Owned(sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(dialect: &Dialect, batch: usize) -> InsertBuilder {
        InsertBuilder::new("users", &["id", "name"], dialect.placeholders(), batch).unwrap()
    }

    #[test]
    fn test_full_batch_is_borrowed() {
        let d = Dialect::mysql();
        let b = builder(&d, 3);
        let sql = b.build(3, &d, Some("id")).unwrap();
        assert!(matches!(sql, Cow::Borrowed(_)));
        assert_eq!(sql, "INSERT INTO users(id,name) VALUES (?,?),(?,?),(?,?)");
    }

    #[test]
    fn test_truncated_prefix() {
        let d = Dialect::mysql();
        let b = builder(&d, 4);
        for r in 1..=4 {
            let sql = b.build(r, &d, None).unwrap();
            assert_eq!(sql.matches('(').count(), r + 1);
            assert!(!sql.ends_with(','));
        }
        assert_eq!(b.build(1, &d, None).unwrap(), "INSERT INTO users(id,name) VALUES (?,?)");
    }

    #[test]
    fn test_out_of_range_request() {
        let d = Dialect::mysql();
        let b = builder(&d, 2);
        assert!(b.build(0, &d, None).is_err());
        assert!(b.build(3, &d, None).is_err());
    }

    #[test]
    fn test_ordinal_placeholders_with_returning() {
        let d = Dialect::postgres();
        let b = builder(&d, 2);
        assert_eq!(
            b.build(2, &d, Some("id")).unwrap(),
            "INSERT INTO users(id,name) VALUES ($1,$2),($3,$4) RETURNING id"
        );
        assert_eq!(
            b.build(1, &d, None).unwrap(),
            "INSERT INTO users(id,name) VALUES ($1,$2)"
        );
    }

    #[test]
    fn test_upsert_suffix() {
        let d = Dialect::mysql();
        let b = builder(&d, 2).with_suffix("ON DUPLICATE KEY UPDATE name = VALUES(name)");
        assert_eq!(
            b.build(1, &d, Some("id")).unwrap(),
            "INSERT INTO users(id,name) VALUES (?,?) ON DUPLICATE KEY UPDATE name = VALUES(name)"
        );
    }

    #[test]
    fn test_no_columns() {
        let d = Dialect::mysql();
        assert!(InsertBuilder::new("t", &[], d.placeholders(), 1).is_err());
    }
}
