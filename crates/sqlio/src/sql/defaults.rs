//! Default-value resolution SELECT

use super::{prefix, TupleEnds};
use crate::dialect::PlaceholderGenerator;
use crate::error::{Error, Result};

/// Alias of the row position column in a defaults SELECT
pub const POSITION_COLUMN: &str = "SQLX_POS";

/// Prebuilt `SELECT COALESCE(?, <default>) AS c, ..., ?+0 AS SQLX_POS UNION ...`
///
/// Each row binds one value per column followed by the row position. A
/// `NULL` argument lets the database evaluate the column default.
#[derive(Debug, Clone)]
pub struct DefaultsBuilder {
    sql: String,
    ends: TupleEnds,
    columns: Vec<String>,
}

impl DefaultsBuilder {
    /// Render the statement for `batch_size` rows
    ///
    /// `columns` pairs each column name with its default expression.
    pub fn new(
        columns: &[(String, String)],
        mut placeholders: PlaceholderGenerator,
        batch_size: usize,
    ) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::mapping("no defaulted columns"));
        }
        let batch_size = batch_size.max(1);
        let mut sql = String::with_capacity(batch_size * columns.len() * 32);
        let mut ends = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            if i > 0 {
                sql.push_str(" UNION ");
            }
            sql.push_str("SELECT ");
            for (name, expr) in columns {
                sql.push_str("COALESCE(");
                sql.push_str(&placeholders.next_token());
                sql.push_str(", ");
                sql.push_str(expr);
                sql.push_str(") AS ");
                sql.push_str(name);
                sql.push_str(", ");
            }
            sql.push_str(&placeholders.next_token());
            sql.push_str("+0 AS ");
            sql.push_str(POSITION_COLUMN);
            ends.push(sql.len());
        }
        Ok(Self {
            sql,
            ends,
            columns: columns.iter().map(|(n, _)| n.clone()).collect(),
        })
    }

    /// Defaulted column names in binding order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Arguments bound per row, including the position
    #[inline]
    pub fn arity(&self) -> usize {
        self.columns.len() + 1
    }

    /// Configured batch size
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.ends.len()
    }

    /// Statement for `requested` rows
    pub fn build(&self, requested: usize) -> Result<&str> {
        prefix(&self.sql, &self.ends, requested).ok_or_else(|| {
            Error::internal(format!(
                "requested {requested} rows from a defaults select built for {}",
                self.batch_size()
            ))
        })
    }
}
