//! Information-schema query registry
//!
//! Queries are keyed by ([`Kind`], product) and carry a minimum version.
//! [`info`] picks the best match for a detected [`Product`], runs it and
//! decodes the rows through [`FromRow`]. Optional pre-handlers rewrite the
//! SQL and arguments (e.g. splice a validated table name into
//! `SHOW CREATE TABLE`); post-handlers reshape the raw rows.

use crate::connection::Executor;
use crate::context::{cancellable, Context};
use crate::dialect::{Product, MARIADB, MYSQL, POSTGRESQL, SQLITE};
use crate::error::{Error, Result};
use crate::security::validate_sql_identifier;
use crate::sequence::Sequence;
use crate::types::{Column, Nullability, Row, Value, AUTOINCREMENT};
use parking_lot::RwLock;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::trace;

/// Kind of metadata a query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Server version string
    Version,
    /// Catalog names
    Catalogs,
    /// Schema names
    Schemas,
    /// Tables of a schema: `[schema]`
    Tables,
    /// Columns of a table: `[schema, table]`
    Columns,
    /// Primary key columns: `[schema, table]`
    PrimaryKeys,
    /// Foreign keys: `[schema, table]`
    ForeignKeys,
    /// Identity sequence of a table: `[schema, table]`
    Sequences,
    /// Current session (pid, catalog, schema)
    Session,
    /// Acquire a named lock: `[name, timeout_secs]`
    LockAcquire,
    /// Release a named lock: `[name]`
    LockRelease,
    /// Advance a counter through a database function: `[name, count]`
    SequenceNextValue,
    /// Server auto-increment offset and increment
    AutoIncrement,
    /// Disable foreign key checks for the session
    ForeignKeyChecksOff,
    /// Re-enable foreign key checks for the session
    ForeignKeyChecksOn,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Rewrites SQL and arguments before execution
pub type PreHandler = Arc<dyn Fn(&str, &[Value]) -> Result<(String, Vec<Value>)> + Send + Sync>;

/// Reshapes result rows after execution
pub type PostHandler = Arc<dyn Fn(Vec<Row>) -> Result<Vec<Row>> + Send + Sync>;

/// Registered metadata query
#[derive(Clone)]
pub struct Query {
    /// Metadata kind
    pub kind: Kind,
    /// Product name
    pub product: String,
    /// Minimum `(major, minor)` version
    pub min_version: (u32, u32),
    /// SQL template
    pub sql: String,
    pre: Option<PreHandler>,
    post: Option<PostHandler>,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("kind", &self.kind)
            .field("product", &self.product)
            .field("min_version", &self.min_version)
            .field("sql", &self.sql)
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

impl Query {
    /// Query valid for every version of `product`
    pub fn new(kind: Kind, product: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            kind,
            product: product.into(),
            min_version: (0, 0),
            sql: sql.into(),
            pre: None,
            post: None,
        }
    }

    /// Require at least `major.minor`
    pub fn with_min_version(mut self, major: u32, minor: u32) -> Self {
        self.min_version = (major, minor);
        self
    }

    /// Attach a pre-handler
    pub fn with_pre<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<(String, Vec<Value>)> + Send + Sync + 'static,
    {
        self.pre = Some(Arc::new(f));
        self
    }

    /// Attach a post-handler
    pub fn with_post<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Row>) -> Result<Vec<Row>> + Send + Sync + 'static,
    {
        self.post = Some(Arc::new(f));
        self
    }

    /// Run the query, applying its handlers
    pub async fn run(&self, ctx: &Context, db: &Executor, args: &[Value]) -> Result<Vec<Row>> {
        let (sql, args) = match &self.pre {
            Some(pre) => pre(&self.sql, args)?,
            None => (self.sql.clone(), args.to_vec()),
        };
        trace!(kind = %self.kind, sql = %sql, "metadata query");
        let rows = cancellable(ctx, db.query(&sql, &args)).await?;
        match &self.post {
            Some(post) => post(rows),
            None => Ok(rows),
        }
    }

    /// Run a statement-like query (no rows expected)
    pub async fn exec(&self, ctx: &Context, db: &Executor, args: &[Value]) -> Result<()> {
        let (sql, args) = match &self.pre {
            Some(pre) => pre(&self.sql, args)?,
            None => (self.sql.clone(), args.to_vec()),
        };
        trace!(kind = %self.kind, sql = %sql, "metadata statement");
        cancellable(ctx, db.execute(&sql, &args)).await?;
        Ok(())
    }
}

static QUERIES: LazyLock<RwLock<Vec<Query>>> = LazyLock::new(|| RwLock::new(builtin_queries()));

/// Register a query; a query with the same kind, product and version replaces it
pub fn register_query(query: Query) {
    let mut queries = QUERIES.write();
    queries.retain(|q| {
        !(q.kind == query.kind
            && q.product.eq_ignore_ascii_case(&query.product)
            && q.min_version == query.min_version)
    });
    queries.push(query);
}

/// Best-matching query for `product`
///
/// Picks the highest `min_version` not above the product version. A single
/// registered query is used regardless of version.
pub fn lookup_query(kind: Kind, product: &Product) -> Option<Query> {
    let queries = QUERIES.read();
    let candidates: Vec<&Query> = queries
        .iter()
        .filter(|q| q.kind == kind && q.product.eq_ignore_ascii_case(&product.name))
        .collect();
    if candidates.len() == 1 {
        return Some(candidates[0].clone());
    }
    candidates
        .into_iter()
        .filter(|q| q.min_version <= product.version())
        .max_by_key(|q| q.min_version)
        .cloned()
}

/// Whether a query of `kind` exists for `product`
pub fn has_query(kind: Kind, product: &Product) -> bool {
    lookup_query(kind, product).is_some()
}

fn require_query(kind: Kind, product: &Product) -> Result<Query> {
    lookup_query(kind, product)
        .ok_or_else(|| Error::unsupported(format!("no {kind} query for {product}")))
}

/// Decode a metadata row
pub trait FromRow: Sized {
    /// Decode one row
    fn from_row(row: &Row) -> Result<Self>;
}

/// Run the best-matching query of `kind` and decode every row
pub async fn info<T: FromRow>(
    ctx: &Context,
    db: &Executor,
    product: &Product,
    kind: Kind,
    args: &[Value],
) -> Result<Vec<T>> {
    let query = require_query(kind, product)?;
    let rows = query.run(ctx, db, args).await?;
    rows.iter().map(T::from_row).collect()
}

/// Like [`info`] but returns only the first row
pub async fn info_one<T: FromRow>(
    ctx: &Context,
    db: &Executor,
    product: &Product,
    kind: Kind,
    args: &[Value],
) -> Result<Option<T>> {
    Ok(info::<T>(ctx, db, product, kind, args)
        .await?
        .into_iter()
        .next())
}

/// Run a statement-like query of `kind`
pub async fn exec(
    ctx: &Context,
    db: &Executor,
    product: &Product,
    kind: Kind,
    args: &[Value],
) -> Result<()> {
    require_query(kind, product)?.exec(ctx, db, args).await
}

// ============================================================================
// Row decoders
// ============================================================================

fn first(row: &Row) -> Result<&Value> {
    row.get(0)
        .ok_or_else(|| Error::mapping("metadata query returned an empty row"))
}

fn text(row: &Row, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| row.get_by_name(n))
        .and_then(Value::as_string)
}

fn int(row: &Row, names: &[&str]) -> Option<i64> {
    names
        .iter()
        .find_map(|n| row.get_by_name(n))
        .and_then(Value::as_i64)
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

impl FromRow for bool {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(first(row)?.as_bool().unwrap_or(false))
    }
}

impl FromRow for i64 {
    fn from_row(row: &Row) -> Result<Self> {
        let v = first(row)?;
        v.as_i64()
            .ok_or_else(|| Error::mapping(format!("expected integer, got {}", v.sql_type())))
    }
}

impl FromRow for String {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(first(row)?.as_string().unwrap_or_default())
    }
}

impl FromRow for Sequence {
    fn from_row(row: &Row) -> Result<Self> {
        let defaults = Sequence::default();
        Ok(Sequence {
            catalog: text(row, &["sequence_catalog", "catalog_name"]).unwrap_or_default(),
            schema: text(row, &["sequence_schema", "schema_name"]).unwrap_or_default(),
            name: text(row, &["sequence_name", "table_name"]).unwrap_or_default(),
            value: int(row, &["sequence_value", "value"])
                .ok_or_else(|| Error::mapping("sequence row without value"))?,
            increment_by: int(row, &["increment_by"]).unwrap_or(defaults.increment_by),
            start_value: int(row, &["start_value"]).unwrap_or(defaults.start_value),
            max_value: int(row, &["max_value"]).unwrap_or(defaults.max_value),
            data_type: text(row, &["data_type"]).unwrap_or_default(),
        })
    }
}

impl FromRow for Column {
    fn from_row(row: &Row) -> Result<Self> {
        let name = text(row, &["column_name"])
            .ok_or_else(|| Error::mapping("column row without column_name"))?;
        let type_name = text(row, &["data_type", "column_type"]).unwrap_or_default();
        let mut column = Column::new(name, type_name);
        if let Some(len) = int(row, &["character_maximum_length"]) {
            column = column.with_length(len);
        }
        if let Some(p) = int(row, &["numeric_precision"]) {
            column = column.with_precision(p, int(row, &["numeric_scale"]).unwrap_or(0));
        }
        let nullable = text(row, &["is_nullable"]).map(|v| v.eq_ignore_ascii_case("yes"));
        column = column.with_nullability(Nullability::from(nullable));
        if let Some(pos) = int(row, &["ordinal_position"]) {
            column = column.with_ordinal(usize::try_from(pos).unwrap_or_default());
        }
        if let Some(default) = text(row, &["column_default"]) {
            if default.starts_with("nextval(") {
                column = column.with_generator(AUTOINCREMENT);
            }
            column = column.with_default(default);
        }
        if text(row, &["column_key"]).is_some_and(|k| k == "PRI") {
            column = column.with_primary_key(true);
        }
        if text(row, &["extra"]).is_some_and(|e| e.contains("auto_increment")) {
            column = column.with_generator(AUTOINCREMENT);
        }
        Ok(column)
    }
}

// ============================================================================
// Built-in queries
// ============================================================================

static AUTO_INCREMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)AUTO_INCREMENT=(\d+)").unwrap());

/// `[schema, table]` → `SHOW CREATE TABLE schema.table`
fn show_create_pre(sql: &str, args: &[Value]) -> Result<(String, Vec<Value>)> {
    let names: Vec<String> = args.iter().filter_map(Value::as_string).collect();
    let target = match names.as_slice() {
        [schema, table] if !schema.is_empty() => {
            validate_sql_identifier(schema)?;
            validate_sql_identifier(table)?;
            format!("{schema}.{table}")
        }
        [.., table] => {
            validate_sql_identifier(table)?;
            table.clone()
        }
        [] => return Err(Error::config("SHOW CREATE TABLE requires a table name")),
    };
    Ok((format!("{sql} {target}"), Vec::new()))
}

/// `(Table, Create Table)` → sequence rows; tables without AUTO_INCREMENT=
/// report value 1
fn show_create_post(rows: Vec<Row>) -> Result<Vec<Row>> {
    let columns: Arc<[String]> = ["sequence_name", "sequence_value", "data_type"]
        .map(String::from)
        .into();
    rows.into_iter()
        .map(|row| {
            let table = row.get(0).and_then(Value::as_string).unwrap_or_default();
            let ddl = row.get(1).and_then(Value::as_string).unwrap_or_default();
            let value = AUTO_INCREMENT_RE
                .captures(&ddl)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .unwrap_or(1);
            Ok(Row::new(
                columns.clone(),
                vec![
                    Value::String(table),
                    Value::Int64(value),
                    Value::String("int".into()),
                ],
            ))
        })
        .collect()
}

/// Drop the timeout argument for products whose lock call does not take one
fn lock_name_only(sql: &str, args: &[Value]) -> Result<(String, Vec<Value>)> {
    Ok((sql.to_string(), args.iter().take(1).cloned().collect()))
}

fn mysql_family(product: &str) -> Vec<Query> {
    vec![
        Query::new(Kind::Version, product, "SELECT VERSION()"),
        Query::new(
            Kind::Catalogs,
            product,
            "SELECT DISTINCT CATALOG_NAME AS catalog_name FROM INFORMATION_SCHEMA.SCHEMATA",
        ),
        Query::new(
            Kind::Schemas,
            product,
            "SELECT SCHEMA_NAME AS schema_name FROM INFORMATION_SCHEMA.SCHEMATA",
        ),
        Query::new(
            Kind::Tables,
            product,
            "SELECT TABLE_NAME AS table_name FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = ?",
        ),
        Query::new(
            Kind::Columns,
            product,
            "SELECT COLUMN_NAME AS column_name, DATA_TYPE AS data_type, \
             CHARACTER_MAXIMUM_LENGTH AS character_maximum_length, \
             NUMERIC_PRECISION AS numeric_precision, NUMERIC_SCALE AS numeric_scale, \
             IS_NULLABLE AS is_nullable, ORDINAL_POSITION AS ordinal_position, \
             COLUMN_DEFAULT AS column_default, COLUMN_KEY AS column_key, EXTRA AS extra \
             FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
        ),
        Query::new(
            Kind::PrimaryKeys,
            product,
            "SELECT COLUMN_NAME AS column_name FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' \
             ORDER BY ORDINAL_POSITION",
        ),
        Query::new(
            Kind::ForeignKeys,
            product,
            "SELECT CONSTRAINT_NAME AS constraint_name, COLUMN_NAME AS column_name, \
             REFERENCED_TABLE_NAME AS referenced_table, \
             REFERENCED_COLUMN_NAME AS referenced_column \
             FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND REFERENCED_TABLE_NAME IS NOT NULL",
        ),
        // INFORMATION_SCHEMA.TABLES.AUTO_INCREMENT is a cached statistic from 8.0 on
        Query::new(
            Kind::Sequences,
            product,
            "SELECT TABLE_CATALOG AS sequence_catalog, TABLE_SCHEMA AS sequence_schema, \
             TABLE_NAME AS sequence_name, COALESCE(AUTO_INCREMENT, 1) AS sequence_value, \
             'int' AS data_type FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
        )
        .with_min_version(5, 0),
        Query::new(Kind::Sequences, product, "SHOW CREATE TABLE")
            .with_min_version(8, 0)
            .with_pre(show_create_pre)
            .with_post(show_create_post),
        Query::new(
            Kind::Session,
            product,
            "SELECT CONNECTION_ID() AS pid, 'def' AS catalog_name, DATABASE() AS schema_name",
        ),
        Query::new(Kind::LockAcquire, product, "SELECT GET_LOCK(?, ?)"),
        Query::new(Kind::LockRelease, product, "SELECT RELEASE_LOCK(?)"),
        Query::new(
            Kind::SequenceNextValue,
            product,
            "CALL SQLIO_NEXT_SEQUENCE_VALUE(?, ?)",
        ),
        Query::new(
            Kind::AutoIncrement,
            product,
            "SELECT @@SESSION.auto_increment_increment AS increment_by, \
             @@SESSION.auto_increment_offset AS start_value",
        ),
        Query::new(Kind::ForeignKeyChecksOff, product, "SET FOREIGN_KEY_CHECKS = 0"),
        Query::new(Kind::ForeignKeyChecksOn, product, "SET FOREIGN_KEY_CHECKS = 1"),
    ]
}

fn postgres_queries() -> Vec<Query> {
    let p = POSTGRESQL;
    vec![
        Query::new(Kind::Version, p, "SELECT version()"),
        Query::new(
            Kind::Catalogs,
            p,
            "SELECT datname AS catalog_name FROM pg_database WHERE NOT datistemplate",
        ),
        Query::new(
            Kind::Schemas,
            p,
            "SELECT schema_name FROM information_schema.schemata",
        ),
        Query::new(
            Kind::Tables,
            p,
            "SELECT table_name FROM information_schema.tables WHERE table_schema = $1",
        ),
        Query::new(
            Kind::Columns,
            p,
            "SELECT column_name, data_type, character_maximum_length, numeric_precision, \
             numeric_scale, is_nullable, ordinal_position, column_default \
             FROM information_schema.columns WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
        ),
        Query::new(
            Kind::PrimaryKeys,
            p,
            "SELECT ku.column_name FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage ku \
             ON tc.constraint_name = ku.constraint_name AND tc.table_schema = ku.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1 \
             AND tc.table_name = $2 ORDER BY ku.ordinal_position",
        ),
        Query::new(
            Kind::ForeignKeys,
            p,
            "SELECT tc.constraint_name, ku.column_name, ccu.table_name AS referenced_table, \
             ccu.column_name AS referenced_column FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage ku ON tc.constraint_name = ku.constraint_name \
             JOIN information_schema.constraint_column_usage ccu \
             ON tc.constraint_name = ccu.constraint_name \
             WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1 \
             AND tc.table_name = $2",
        ),
        Query::new(
            Kind::Sequences,
            p,
            "SELECT current_database() AS sequence_catalog, schemaname AS sequence_schema, \
             sequencename AS sequence_name, \
             COALESCE(last_value + increment_by, start_value) AS sequence_value, \
             increment_by, start_value, max_value, data_type::text AS data_type \
             FROM pg_sequences WHERE schemaname = $1 AND sequencename LIKE $2 || '%'",
        )
        .with_min_version(10, 0),
        Query::new(
            Kind::Session,
            p,
            "SELECT pg_backend_pid() AS pid, current_database() AS catalog_name, \
             current_schema() AS schema_name",
        ),
        Query::new(
            Kind::LockAcquire,
            p,
            "SELECT pg_try_advisory_lock(hashtext($1))",
        )
        .with_pre(lock_name_only),
        Query::new(
            Kind::LockRelease,
            p,
            "SELECT pg_advisory_unlock(hashtext($1))",
        ),
        Query::new(
            Kind::SequenceNextValue,
            p,
            "SELECT nextval($1) AS sequence_value",
        )
        .with_pre(lock_name_only),
        Query::new(
            Kind::ForeignKeyChecksOff,
            p,
            "SET session_replication_role = replica",
        ),
        Query::new(
            Kind::ForeignKeyChecksOn,
            p,
            "SET session_replication_role = DEFAULT",
        ),
    ]
}

fn sqlite_queries() -> Vec<Query> {
    vec![
        Query::new(Kind::Version, SQLITE, "SELECT sqlite_version()"),
        Query::new(
            Kind::Tables,
            SQLITE,
            "SELECT name AS table_name FROM sqlite_master WHERE type = 'table'",
        ),
        Query::new(
            Kind::Sequences,
            SQLITE,
            "SELECT name AS sequence_name, seq + 1 AS sequence_value FROM sqlite_sequence \
             WHERE name = ?",
        )
        .with_pre(|sql, args| Ok((sql.to_string(), args.iter().skip(1).cloned().collect()))),
        Query::new(Kind::ForeignKeyChecksOff, SQLITE, "PRAGMA foreign_keys = OFF"),
        Query::new(Kind::ForeignKeyChecksOn, SQLITE, "PRAGMA foreign_keys = ON"),
    ]
}

fn builtin_queries() -> Vec<Query> {
    let mut queries = mysql_family(MYSQL);
    queries.extend(mysql_family(MARIADB));
    queries.extend(postgres_queries());
    queries.extend(sqlite_queries());
    queries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matching_picks_highest_eligible() {
        let q = lookup_query(Kind::Sequences, &Product::new(MYSQL, 8, 0, 33)).unwrap();
        assert_eq!(q.sql, "SHOW CREATE TABLE");

        let q = lookup_query(Kind::Sequences, &Product::new(MYSQL, 5, 7, 0)).unwrap();
        assert!(q.sql.contains("INFORMATION_SCHEMA.TABLES"));
    }

    #[test]
    fn test_single_query_used_regardless_of_version() {
        let q = lookup_query(Kind::Sequences, &Product::new(POSTGRESQL, 9, 6, 0)).unwrap();
        assert!(q.sql.contains("pg_sequences"));
    }

    #[test]
    fn test_missing_query() {
        assert!(lookup_query(Kind::AutoIncrement, &Product::new(POSTGRESQL, 15, 0, 0)).is_none());
        assert!(lookup_query(Kind::Version, &Product::new("oracle", 19, 0, 0)).is_none());
    }

    #[test]
    fn test_register_replaces_same_version() {
        register_query(Query::new(Kind::Version, "h2", "SELECT H2VERSION()"));
        register_query(Query::new(Kind::Version, "h2", "SELECT H2VERSION() AS v"));
        let q = lookup_query(Kind::Version, &Product::new("h2", 2, 1, 0)).unwrap();
        assert_eq!(q.sql, "SELECT H2VERSION() AS v");
    }

    #[test]
    fn test_show_create_handlers() {
        let (sql, args) = show_create_pre(
            "SHOW CREATE TABLE",
            &[Value::from("sales"), Value::from("orders")],
        )
        .unwrap();
        assert_eq!(sql, "SHOW CREATE TABLE sales.orders");
        assert!(args.is_empty());

        assert!(show_create_pre("SHOW CREATE TABLE", &[Value::from("x;drop")]).is_err());

        let row = Row::new(
            vec!["Table".to_string(), "Create Table".to_string()],
            vec![
                Value::from("orders"),
                Value::from("CREATE TABLE `orders` (..) ENGINE=InnoDB AUTO_INCREMENT=42"),
            ],
        );
        let rows = show_create_post(vec![row]).unwrap();
        let seq = Sequence::from_row(&rows[0]).unwrap();
        assert_eq!(seq.name, "orders");
        assert_eq!(seq.value, 42);
        assert_eq!(seq.increment_by, 1);
    }

    #[test]
    fn test_column_from_row() {
        let row = Row::new(
            vec![
                "column_name".to_string(),
                "data_type".to_string(),
                "is_nullable".to_string(),
                "extra".to_string(),
                "column_key".to_string(),
            ],
            vec![
                Value::from("id"),
                Value::from("bigint"),
                Value::from("NO"),
                Value::from("auto_increment"),
                Value::from("PRI"),
            ],
        );
        let c = Column::from_row(&row).unwrap();
        assert!(c.is_auto_increment());
        assert!(c.is_primary_key());
        assert_eq!(c.nullability(), Nullability::NotNull);
    }
}
