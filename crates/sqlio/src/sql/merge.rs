//! Merge auxiliary statements
//!
//! UPDATE and DELETE are rendered through sea-query for the products it has
//! a backend for; SQL Server falls back to hand-written SQL.

use crate::dialect::{Dialect, PlaceholderStyle};
use crate::error::{Error, Result};
use crate::security::{split_qualified_name, validate_qualified_name, validate_sql_identifier};
use sea_query::{
    Alias, DeleteStatement, Expr, IntoIden, MysqlQueryBuilder, PostgresQueryBuilder, Query,
    SimpleExpr, SqliteQueryBuilder, TableRef, UpdateStatement,
};

/// Staging table name token replaced by a random suffix
const RAND: &str = "${Rand}";
/// Staging table name token replaced by the destination table
const TABLE: &str = "${Table}";
/// Operation SQL token replaced by the staging table name
const TRANSIENT: &str = "${Transient}";

fn sea_table_ref(name: &str) -> TableRef {
    match split_qualified_name(name) {
        (Some(schema), table) => TableRef::SchemaTable(
            Alias::new(schema).into_iden(),
            Alias::new(table).into_iden(),
        ),
        (None, table) => TableRef::Table(Alias::new(table).into_iden()),
    }
}

/// Expand `${Table}` and `${Rand}` in a staging table name pattern
pub fn expand_table_pattern(pattern: &str, table: &str) -> String {
    let (_, bare) = split_qualified_name(table);
    let mut out = pattern.replace(TABLE, bare);
    while out.contains(RAND) {
        let rand = uuid::Uuid::new_v4().simple().to_string();
        out = out.replacen(RAND, &rand[..8], 1);
    }
    out
}

/// Expand `${Table}` and `${Transient}` in operation SQL
pub fn expand_transient(sql: &str, table: &str, transient: Option<&str>) -> String {
    let out = sql.replace(TABLE, table);
    match transient {
        Some(t) => out.replace(TRANSIENT, t),
        None => out,
    }
}

/// Placeholder tokens for `count` parameters
fn params(dialect: &Dialect, count: usize) -> Vec<SimpleExpr> {
    dialect.placeholders().take(count).map(Expr::cust).collect()
}

/// sea-query backend matching a dialect's syntax
#[derive(Debug, Clone, Copy)]
enum Backend {
    Mysql,
    Postgres,
    Sqlite,
}

impl Backend {
    fn of(dialect: &Dialect) -> Option<Self> {
        match (dialect.placeholder, dialect.quote.0) {
            (PlaceholderStyle::Ordinal, _) => Some(Self::Postgres),
            (PlaceholderStyle::Positional, '`') => Some(Self::Mysql),
            (PlaceholderStyle::Positional, '"') => Some(Self::Sqlite),
            _ => None,
        }
    }

    fn update(self, stmt: &UpdateStatement) -> String {
        match self {
            Self::Mysql => stmt.to_string(MysqlQueryBuilder),
            Self::Postgres => stmt.to_string(PostgresQueryBuilder),
            Self::Sqlite => stmt.to_string(SqliteQueryBuilder),
        }
    }

    fn delete(self, stmt: &DeleteStatement) -> String {
        match self {
            Self::Mysql => stmt.to_string(MysqlQueryBuilder),
            Self::Postgres => stmt.to_string(PostgresQueryBuilder),
            Self::Sqlite => stmt.to_string(SqliteQueryBuilder),
        }
    }
}

/// `UPDATE t SET c1 = ?, ... WHERE key = ?`
///
/// Parameters bind the SET values in column order followed by the key.
pub fn update_sql(dialect: &Dialect, table: &str, columns: &[&str], key: &str) -> Result<String> {
    validate_qualified_name(table)?;
    validate_sql_identifier(key)?;
    for c in columns {
        validate_sql_identifier(c)?;
    }
    if columns.is_empty() {
        return Err(Error::merge(format!("no columns to update in {table}")));
    }

    let Some(backend) = Backend::of(dialect) else {
        let set: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = @p{}", dialect.quote_identifier(c), i + 1))
            .collect();
        return Ok(format!(
            "UPDATE {} SET {} WHERE {} = @p{}",
            quote_table(dialect, table),
            set.join(", "),
            dialect.quote_identifier(key),
            columns.len() + 1
        ));
    };

    let mut values = params(dialect, columns.len() + 1);
    let key_param = values
        .pop()
        .ok_or_else(|| Error::internal("missing key parameter"))?;

    let mut stmt = Query::update();
    stmt.table(sea_table_ref(table))
        .values(columns.iter().map(|c| Alias::new(*c)).zip(values))
        .and_where(Expr::col(Alias::new(key)).eq(key_param));
    Ok(backend.update(&stmt))
}

/// `DELETE FROM t WHERE key IN (?, ...)` for `count` keys
pub fn delete_sql(dialect: &Dialect, table: &str, key: &str, count: usize) -> Result<String> {
    validate_qualified_name(table)?;
    validate_sql_identifier(key)?;
    if count == 0 {
        return Err(Error::merge(format!("no keys to delete from {table}")));
    }

    let Some(backend) = Backend::of(dialect) else {
        let keys: Vec<String> = (1..=count).map(|i| format!("@p{i}")).collect();
        return Ok(format!(
            "DELETE FROM {} WHERE {} IN ({})",
            quote_table(dialect, table),
            dialect.quote_identifier(key),
            keys.join(", ")
        ));
    };

    let mut stmt = Query::delete();
    stmt.from_table(sea_table_ref(table))
        .and_where(Expr::col(Alias::new(key)).is_in(params(dialect, count)));
    Ok(backend.delete(&stmt))
}

fn quote_table(dialect: &Dialect, table: &str) -> String {
    match split_qualified_name(table) {
        (Some(schema), name) => format!(
            "{}.{}",
            dialect.quote_identifier(schema),
            dialect.quote_identifier(name)
        ),
        (None, name) => dialect.quote_identifier(name),
    }
}
