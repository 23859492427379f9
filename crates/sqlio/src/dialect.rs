//! SQL dialects and database product detection
//!
//! - [`Dialect`]: static capability record per database product
//! - [`PlaceholderGenerator`]: stateful producer of `?`, `$N` or `@pN` tokens
//! - [`Product`]: vendor and version parsed from the server version string
//! - Process-wide registry: [`register_dialect`], [`lookup_dialect`]

use crate::connection::Executor;
use crate::context::{cancellable, Context};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Product name of MySQL
pub const MYSQL: &str = "mysql";
/// Product name of MariaDB
pub const MARIADB: &str = "mariadb";
/// Product name of PostgreSQL
pub const POSTGRESQL: &str = "postgresql";
/// Product name of Microsoft SQL Server
pub const SQLSERVER: &str = "sqlserver";
/// Product name of SQLite
pub const SQLITE: &str = "sqlite";

/// Bind parameter syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderStyle {
    /// `?`
    Positional,
    /// `$1`, `$2`, ...
    Ordinal,
    /// `@p1`, `@p2`, ...
    Named,
}

/// Supported INSERT statement shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertShape {
    /// One tuple per statement
    SingleValues,
    /// `VALUES (..), (..)`
    MultiValues,
    /// `VALUES (..), (..) RETURNING id`
    MultiValuesReturning,
}

/// Upsert syntax of the product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpsertShape {
    /// No upsert statement
    Unsupported,
    /// `ON DUPLICATE KEY UPDATE`
    OnDuplicateKey,
    /// `ON CONFLICT (..) DO UPDATE`
    OnConflict,
    /// `MERGE INTO`
    Merge,
}

/// How identities are pre-assigned before an insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetIdStrategy {
    /// Use the dialect default
    #[default]
    Undefined,
    /// Rolled-back insert under an advisory lock
    Transient,
    /// Database-side procedure advancing a counter table
    Udf,
    /// `SELECT COALESCE(MAX(id), 0)` scan
    #[serde(rename = "maxid")]
    MaxId,
    /// Let the database assign identities
    Ignore,
}

impl fmt::Display for PresetIdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Undefined => "undefined",
            Self::Transient => "transient",
            Self::Udf => "udf",
            Self::MaxId => "maxid",
            Self::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

/// Capability and syntax record of a database product
#[derive(Debug, Clone, PartialEq)]
pub struct Dialect {
    /// Product name the dialect is registered under
    pub name: String,
    /// Bind parameter syntax
    pub placeholder: PlaceholderStyle,
    /// Largest INSERT shape the product accepts
    pub insert: InsertShape,
    /// Upsert syntax
    pub upsert: UpsertShape,
    /// Bulk load (`LOAD DATA LOCAL INFILE`) support
    pub load: bool,
    /// Driver result reports the last inserted identity
    pub can_return_last_insert_id: bool,
    /// Inserts run in a transaction unless the caller supplies one
    pub transactional: bool,
    /// Function returning the last generated identity
    pub auto_increment_function: Option<String>,
    /// Preset strategy when options leave it undefined
    pub preset_id_strategy: PresetIdStrategy,
    /// Opening and closing identifier quote
    pub quote: (char, char),
    /// Escape character inside string literals
    pub escape: char,
    /// Named advisory locks are available
    pub advisory_lock: bool,
}

impl Dialect {
    /// MySQL 5.7+/8.x
    pub fn mysql() -> Self {
        Self {
            name: MYSQL.into(),
            placeholder: PlaceholderStyle::Positional,
            insert: InsertShape::MultiValues,
            upsert: UpsertShape::OnDuplicateKey,
            load: true,
            can_return_last_insert_id: true,
            transactional: true,
            auto_increment_function: Some("LAST_INSERT_ID".into()),
            preset_id_strategy: PresetIdStrategy::Transient,
            quote: ('`', '`'),
            escape: '\\',
            advisory_lock: true,
        }
    }

    /// MariaDB 10.x
    pub fn mariadb() -> Self {
        Self {
            name: MARIADB.into(),
            ..Self::mysql()
        }
    }

    /// PostgreSQL
    pub fn postgres() -> Self {
        Self {
            name: POSTGRESQL.into(),
            placeholder: PlaceholderStyle::Ordinal,
            insert: InsertShape::MultiValuesReturning,
            upsert: UpsertShape::OnConflict,
            load: false,
            can_return_last_insert_id: false,
            transactional: true,
            auto_increment_function: Some("LASTVAL".into()),
            preset_id_strategy: PresetIdStrategy::Ignore,
            quote: ('"', '"'),
            escape: '\'',
            advisory_lock: true,
        }
    }

    /// Microsoft SQL Server
    pub fn sqlserver() -> Self {
        Self {
            name: SQLSERVER.into(),
            placeholder: PlaceholderStyle::Named,
            insert: InsertShape::MultiValues,
            upsert: UpsertShape::Merge,
            load: false,
            can_return_last_insert_id: false,
            transactional: true,
            auto_increment_function: Some("SCOPE_IDENTITY".into()),
            preset_id_strategy: PresetIdStrategy::Ignore,
            quote: ('[', ']'),
            escape: '\'',
            advisory_lock: false,
        }
    }

    /// SQLite 3
    pub fn sqlite() -> Self {
        Self {
            name: SQLITE.into(),
            placeholder: PlaceholderStyle::Positional,
            insert: InsertShape::MultiValues,
            upsert: UpsertShape::OnConflict,
            load: false,
            can_return_last_insert_id: true,
            transactional: true,
            auto_increment_function: Some("last_insert_rowid".into()),
            preset_id_strategy: PresetIdStrategy::Ignore,
            quote: ('"', '"'),
            escape: '\'',
            advisory_lock: false,
        }
    }

    /// Start a fresh placeholder sequence
    #[inline]
    pub fn placeholders(&self) -> PlaceholderGenerator {
        PlaceholderGenerator::new(self.placeholder)
    }

    /// Quote an identifier (table, column name)
    pub fn quote_identifier(&self, name: &str) -> String {
        let (open, close) = self.quote;
        let mut out = String::with_capacity(name.len() + 2);
        out.push(open);
        for c in name.chars() {
            if c == close {
                out.push(close);
            }
            out.push(c);
        }
        out.push(close);
        out
    }

    /// Escape a value for a single-quoted string literal
    pub fn escape_string(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            if c == '\'' || (c == self.escape && c != '\'') {
                out.push(self.escape);
            }
            out.push(c);
        }
        out
    }

    /// Whether multi-row INSERT ... RETURNING is available
    #[inline]
    pub fn supports_returning(&self) -> bool {
        self.insert == InsertShape::MultiValuesReturning
    }

    /// Whether a batch larger than one row fits into one statement
    #[inline]
    pub fn supports_multi_values(&self) -> bool {
        self.insert != InsertShape::SingleValues
    }

    /// Preset strategy, resolving `Undefined` to this dialect's default
    pub fn resolve_preset(&self, requested: PresetIdStrategy) -> PresetIdStrategy {
        match requested {
            PresetIdStrategy::Undefined => self.preset_id_strategy,
            other => other,
        }
    }
}

/// Stateful producer of placeholder tokens
#[derive(Debug, Clone)]
pub struct PlaceholderGenerator {
    style: PlaceholderStyle,
    next: usize,
}

impl PlaceholderGenerator {
    /// Start at the first parameter
    pub fn new(style: PlaceholderStyle) -> Self {
        Self { style, next: 1 }
    }

    /// Produce the next token
    pub fn next_token(&mut self) -> String {
        let idx = self.next;
        self.next += 1;
        match self.style {
            PlaceholderStyle::Positional => "?".to_string(),
            PlaceholderStyle::Ordinal => format!("${idx}"),
            PlaceholderStyle::Named => format!("@p{idx}"),
        }
    }
}

impl Iterator for PlaceholderGenerator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        Some(self.next_token())
    }
}

// ============================================================================
// Product detection
// ============================================================================

/// Database vendor and version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Product {
    /// Registered product name (`mysql`, `postgresql`, ...)
    pub name: String,
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Release/patch number
    pub release: u32,
}

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").unwrap());

impl Product {
    /// Product with a fixed version
    pub fn new(name: impl Into<String>, major: u32, minor: u32, release: u32) -> Self {
        Self {
            name: name.into(),
            major,
            minor,
            release,
        }
    }

    /// Parse a server version string, using `hint` when the text does not
    /// name its vendor (MySQL's `VERSION()` returns a bare number).
    pub fn parse(text: &str, hint: &str) -> Option<Self> {
        let lower = text.to_ascii_lowercase();
        let name = if lower.contains("postgresql") {
            POSTGRESQL
        } else if lower.contains("mariadb") {
            MARIADB
        } else if lower.contains("microsoft sql server") {
            SQLSERVER
        } else {
            hint
        };
        let caps = VERSION_RE.captures(text)?;
        let num = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0)
        };
        Some(Self::new(name, num(1), num(2), num(3)))
    }

    /// `(major, minor)` pair used for version matching
    #[inline]
    pub fn version(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}.{}", self.name, self.major, self.minor, self.release)
    }
}

/// Version probes tried in order, with the product assumed for bare numbers
const VERSION_PROBES: &[(&str, &str)] = &[
    ("SELECT VERSION()", MYSQL),
    ("SELECT @@VERSION", SQLSERVER),
    ("SELECT sqlite_version()", SQLITE),
];

/// Query the server version string and parse vendor/major/minor/release
pub async fn detect_product(ctx: &Context, db: &Executor) -> Result<Product> {
    for (sql, hint) in VERSION_PROBES {
        let rows = match cancellable(ctx, db.query(sql, &[])).await {
            Ok(rows) => rows,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                debug!(sql = %sql, error = %e, "version probe failed");
                continue;
            }
        };
        let text = rows
            .first()
            .and_then(|r| r.get(0))
            .and_then(|v| v.as_string());
        if let Some(product) = text.as_deref().and_then(|t| Product::parse(t, hint)) {
            debug!(product = %product, "detected database product");
            return Ok(product);
        }
    }
    Err(Error::unsupported("unable to detect database product"))
}

/// Detect the product and resolve its dialect
pub async fn detect_dialect(ctx: &Context, db: &Executor) -> Result<(Product, Arc<Dialect>)> {
    let product = detect_product(ctx, db).await?;
    let dialect = lookup_dialect(&product.name)?;
    Ok((product, dialect))
}

// ============================================================================
// Registry
// ============================================================================

static DIALECTS: LazyLock<RwLock<HashMap<String, Arc<Dialect>>>> = LazyLock::new(|| {
    let builtins = [
        Dialect::mysql(),
        Dialect::mariadb(),
        Dialect::postgres(),
        Dialect::sqlserver(),
        Dialect::sqlite(),
    ];
    RwLock::new(
        builtins
            .into_iter()
            .map(|d| (d.name.clone(), Arc::new(d)))
            .collect(),
    )
});

fn normalize_product(product: &str) -> String {
    match product.to_ascii_lowercase().as_str() {
        "postgres" | "pg" => POSTGRESQL.to_string(),
        "mssql" | "sql server" => SQLSERVER.to_string(),
        "sqlite3" => SQLITE.to_string(),
        other => other.to_string(),
    }
}

/// Register (or replace) the dialect for a product; idempotent
pub fn register_dialect(product: &str, dialect: Dialect) {
    DIALECTS
        .write()
        .insert(normalize_product(product), Arc::new(dialect));
}

/// Resolve a product name to its dialect
pub fn lookup_dialect(product: &str) -> Result<Arc<Dialect>> {
    DIALECTS
        .read()
        .get(&normalize_product(product))
        .cloned()
        .ok_or_else(|| Error::unsupported(format!("no dialect registered for {product}")))
}
