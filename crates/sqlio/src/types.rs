//! Value and column types for sqlio
//!
//! - [`Value`]: a database value as bound into statements and scanned from rows
//! - [`Column`] / [`ColumnSet`]: immutable column descriptors with name lookup
//! - [`Row`]: an ordered result row

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// SQL value type that can hold any database value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// 8-bit signed integer (TINYINT)
    Int8(i8),
    /// 16-bit signed integer (SMALLINT)
    Int16(i16),
    /// 32-bit signed integer (INTEGER)
    Int32(i32),
    /// 64-bit signed integer (BIGINT)
    Int64(i64),
    /// 64-bit unsigned integer (BIGINT UNSIGNED)
    UInt64(u64),
    /// 32-bit floating point (REAL)
    Float32(f32),
    /// 64-bit floating point (DOUBLE PRECISION)
    Float64(f64),
    /// Arbitrary precision decimal (NUMERIC, DECIMAL)
    Decimal(Decimal),
    /// Text string (VARCHAR, TEXT, CHAR)
    String(String),
    /// Binary data (BYTEA, BLOB, VARBINARY)
    Bytes(Vec<u8>),
    /// Date without time (DATE)
    Date(NaiveDate),
    /// Time without date (TIME)
    Time(NaiveTime),
    /// Timestamp without timezone (TIMESTAMP)
    DateTime(NaiveDateTime),
    /// Timestamp with timezone (TIMESTAMPTZ)
    DateTimeTz(DateTime<Utc>),
    /// UUID
    Uuid(Uuid),
    /// JSON value
    Json(serde_json::Value),
}

/// Runtime value-type tag used to pick binders and coercions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Type not known (e.g. NULL literal, driver without type info)
    #[default]
    Unknown,
    /// Boolean
    Bool,
    /// Signed integer of any width
    Int,
    /// Unsigned integer
    UInt,
    /// Floating point
    Float,
    /// Fixed point decimal
    Decimal,
    /// Text
    String,
    /// Binary
    Bytes,
    /// Date
    Date,
    /// Time of day
    Time,
    /// Timestamp without zone
    DateTime,
    /// Timestamp with zone
    DateTimeTz,
    /// UUID
    Uuid,
    /// JSON document
    Json,
}

impl ValueKind {
    /// Infer the value kind from a database type name
    pub fn from_type_name(type_name: &str) -> Self {
        let t = type_name.to_ascii_lowercase();
        let base = t.split(['(', ' ']).next().unwrap_or_default();
        if t.contains("unsigned") && base.contains("int") {
            return Self::UInt;
        }
        match base {
            "bool" | "boolean" | "bit" => Self::Bool,
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "int2"
            | "int4" | "int8" | "serial" | "bigserial" | "smallserial" => Self::Int,
            "real" | "float" | "float4" | "float8" | "double" => Self::Float,
            "decimal" | "numeric" | "money" => Self::Decimal,
            "char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext" | "nchar"
            | "nvarchar" | "character" | "enum" | "set" | "citext" => Self::String,
            "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary"
            | "bytea" => Self::Bytes,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" | "timestamp" => {
                if t.contains("with time zone") {
                    Self::DateTimeTz
                } else {
                    Self::DateTime
                }
            }
            "timestamptz" => Self::DateTimeTz,
            "uuid" => Self::Uuid,
            "json" | "jsonb" => Self::Json,
            _ => Self::Unknown,
        }
    }
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Runtime kind of this value
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Unknown,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int8(_) | Self::Int16(_) | Self::Int32(_) | Self::Int64(_) => ValueKind::Int,
            Self::UInt64(_) => ValueKind::UInt,
            Self::Float32(_) | Self::Float64(_) => ValueKind::Float,
            Self::Decimal(_) => ValueKind::Decimal,
            Self::String(_) => ValueKind::String,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Date(_) => ValueKind::Date,
            Self::Time(_) => ValueKind::Time,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::DateTimeTz(_) => ValueKind::DateTimeTz,
            Self::Uuid(_) => ValueKind::Uuid,
            Self::Json(_) => ValueKind::Json,
        }
    }

    /// Get SQL type name
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOLEAN",
            Self::Int8(_) => "TINYINT",
            Self::Int16(_) => "SMALLINT",
            Self::Int32(_) => "INTEGER",
            Self::Int64(_) => "BIGINT",
            Self::UInt64(_) => "BIGINT UNSIGNED",
            Self::Float32(_) => "REAL",
            Self::Float64(_) => "DOUBLE PRECISION",
            Self::Decimal(_) => "DECIMAL",
            Self::String(_) => "VARCHAR",
            Self::Bytes(_) => "BLOB",
            Self::Date(_) => "DATE",
            Self::Time(_) => "TIME",
            Self::DateTime(_) => "TIMESTAMP",
            Self::DateTimeTz(_) => "TIMESTAMPTZ",
            Self::Uuid(_) => "UUID",
            Self::Json(_) => "JSON",
        }
    }

    /// Try to convert to bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int8(n) => Some(*n != 0),
            Self::Int16(n) => Some(*n != 0),
            Self::Int32(n) => Some(*n != 0),
            Self::Int64(n) => Some(*n != 0),
            Self::UInt64(n) => Some(*n != 0),
            Self::String(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Some(true),
                "false" | "f" | "no" | "n" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int8(n) => Some(i64::from(*n)),
            Self::Int16(n) => Some(i64::from(*n)),
            Self::Int32(n) => Some(i64::from(*n)),
            Self::Int64(n) => Some(*n),
            Self::UInt64(n) => i64::try_from(*n).ok(),
            Self::Float32(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
            Self::Float64(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
            Self::Decimal(d) => d.to_string().parse().ok(),
            Self::String(s) => s.trim().parse().ok(),
            Self::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to u64
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt64(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
            other => other.as_i64().and_then(|n| u64::try_from(n).ok()),
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int8(n) => Some(f64::from(*n)),
            Self::Int16(n) => Some(f64::from(*n)),
            Self::Int32(n) => Some(f64::from(*n)),
            Self::Int64(n) => Some(*n as f64),
            Self::UInt64(n) => Some(*n as f64),
            Self::Float32(n) => Some(f64::from(*n)),
            Self::Float64(n) => Some(*n),
            Self::Decimal(d) => d.to_string().parse().ok(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to borrow as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            Self::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to borrow as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b.as_slice()),
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Try to convert to UUID
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            Self::String(s) => Uuid::parse_str(s).ok(),
            Self::Bytes(b) if b.len() == 16 => Uuid::from_slice(b).ok(),
            _ => None,
        }
    }

    /// Try to borrow as JSON
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(j) => Some(j),
            _ => None,
        }
    }

    /// Convert to owned string representation
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::String(s) => Some(s.clone()),
            Self::Bytes(b) => String::from_utf8(b.clone()).ok(),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", u8::from(*b)),
            Self::Int8(n) => write!(f, "{n}"),
            Self::Int16(n) => write!(f, "{n}"),
            Self::Int32(n) => write!(f, "{n}"),
            Self::Int64(n) => write!(f, "{n}"),
            Self::UInt64(n) => write!(f, "{n}"),
            Self::Float32(n) => write!(f, "{n}"),
            Self::Float64(n) => write!(f, "{n}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Self::DateTimeTz(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Json(j) => write!(f, "{j}"),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    Decimal => Decimal,
    String => String,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    DateTime<Utc> => DateTimeTz,
    Uuid => Uuid,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

/// Nullability tri-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Nullability {
    /// Known to accept NULL
    Nullable,
    /// Known to reject NULL
    NotNull,
    /// Driver did not report nullability
    #[default]
    Unknown,
}

impl From<Option<bool>> for Nullability {
    fn from(v: Option<bool>) -> Self {
        match v {
            Some(true) => Self::Nullable,
            Some(false) => Self::NotNull,
            None => Self::Unknown,
        }
    }
}

/// Generator tag value marking an auto-increment column
pub const AUTOINCREMENT: &str = "autoincrement";

/// Database column descriptor
///
/// Built with [`Column::new`] and the consuming `with_*` methods, then
/// read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    type_name: String,
    length: Option<i64>,
    precision_scale: Option<(i64, i64)>,
    nullability: Nullability,
    ordinal: usize,
    kind: ValueKind,
    primary_key: bool,
    generator: Option<String>,
    sequence: Option<String>,
    default_value: Option<String>,
}

impl Column {
    /// Create a column; the value kind is inferred from the type name
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            name: name.into(),
            kind: ValueKind::from_type_name(&type_name),
            type_name,
            length: None,
            precision_scale: None,
            nullability: Nullability::Unknown,
            ordinal: 0,
            primary_key: false,
            generator: None,
            sequence: None,
            default_value: None,
        }
    }

    /// Set the value kind
    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the length
    pub fn with_length(mut self, length: i64) -> Self {
        self.length = Some(length);
        self
    }

    /// Set decimal precision and scale
    pub fn with_precision(mut self, precision: i64, scale: i64) -> Self {
        self.precision_scale = Some((precision, scale));
        self
    }

    /// Set nullability
    pub fn with_nullability(mut self, nullability: Nullability) -> Self {
        self.nullability = nullability;
        self
    }

    /// Set ordinal position
    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = ordinal;
        self
    }

    /// Mark as primary key
    pub fn with_primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }

    /// Set the generator (`autoincrement` or an SQL expression)
    pub fn with_generator(mut self, generator: impl Into<String>) -> Self {
        self.generator = Some(generator.into());
        self
    }

    /// Set the sequence name
    pub fn with_sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = Some(sequence.into());
        self
    }

    /// Set the database default expression
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    /// Column name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Database type name
    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Length, when reported
    #[inline]
    pub fn length(&self) -> Option<i64> {
        self.length
    }

    /// Decimal precision and scale, when reported
    #[inline]
    pub fn precision_scale(&self) -> Option<(i64, i64)> {
        self.precision_scale
    }

    /// Nullability
    #[inline]
    pub fn nullability(&self) -> Nullability {
        self.nullability
    }

    /// Ordinal position
    #[inline]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Runtime value kind
    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Primary key flag
    #[inline]
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Generator tag
    #[inline]
    pub fn generator(&self) -> Option<&str> {
        self.generator.as_deref()
    }

    /// Sequence name
    #[inline]
    pub fn sequence(&self) -> Option<&str> {
        self.sequence.as_deref()
    }

    /// Database default expression
    #[inline]
    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// Whether the database assigns this column's value
    pub fn is_auto_increment(&self) -> bool {
        self.generator
            .as_deref()
            .is_some_and(|g| g.eq_ignore_ascii_case(AUTOINCREMENT))
    }

    /// SQL expression supplying the value when the record leaves it empty
    ///
    /// Only for generator-tagged columns that are not auto-increment.
    pub fn default_expression(&self) -> Option<&str> {
        match self.generator.as_deref() {
            Some(g) if g.eq_ignore_ascii_case(AUTOINCREMENT) => None,
            Some(g) if g.eq_ignore_ascii_case("default") => self.default_value.as_deref(),
            Some(g) => Some(g),
            None => None,
        }
    }
}

/// Ordered, name-indexed collection of columns
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    autoincrement: Option<usize>,
}

impl ColumnSet {
    /// Build a column set; at most one auto-increment column is allowed
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut index = HashMap::with_capacity(columns.len());
        let mut autoincrement = None;
        for (i, column) in columns.iter().enumerate() {
            if index.insert(column.name.to_ascii_lowercase(), i).is_some() {
                return Err(Error::mapping(format!("duplicate column {}", column.name)));
            }
            if column.is_auto_increment() {
                if let Some(prev) = autoincrement.replace(i) {
                    let prev: &Column = &columns[prev];
                    return Err(Error::mapping(format!(
                        "more than one auto-increment column: {}, {}",
                        prev.name, column.name
                    )));
                }
            }
        }
        Ok(Self {
            columns,
            index,
            autoincrement,
        })
    }

    /// Mark `name` as the auto-increment column
    pub fn with_identity(self, name: &str) -> Result<Self> {
        let pos = self
            .position(name)
            .ok_or_else(|| Error::mapping(format!("identity column {name} not found")))?;
        let columns = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                if i == pos {
                    c.with_generator(AUTOINCREMENT)
                } else if c.is_auto_increment() {
                    Column {
                        generator: None,
                        ..c
                    }
                } else {
                    c
                }
            })
            .collect();
        Self::new(columns)
    }

    /// Position of the auto-increment column, if any
    #[inline]
    pub fn autoincrement(&self) -> Option<usize> {
        self.autoincrement
    }

    /// Auto-increment column, if any
    pub fn identity(&self) -> Option<&Column> {
        self.autoincrement.map(|i| &self.columns[i])
    }

    /// Position of a column (case-insensitive)
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_ascii_lowercase()).copied()
    }

    /// Column by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|i| &self.columns[i])
    }

    /// Column names in order
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of columns
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the set is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate columns in order
    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    /// Columns as a slice
    #[inline]
    pub fn as_slice(&self) -> &[Column] {
        &self.columns
    }
}

impl std::ops::Index<usize> for ColumnSet {
    type Output = Column;

    fn index(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }
}

impl<'a> IntoIterator for &'a ColumnSet {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

/// Database row as ordered column values
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column names, shared by all rows of one result
    columns: Arc<[String]>,
    /// Column values (same order as columns)
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: impl Into<Arc<[String]>>, values: Vec<Value>) -> Self {
        let columns = columns.into();
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Take the values
    #[inline]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get value by column name
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Convert row to HashMap
    pub fn into_map(self) -> HashMap<String, Value> {
        self.columns.iter().cloned().zip(self.values).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::Int32(0).is_null());
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::String("yes".into()).as_bool(), Some(true));
        assert_eq!(Value::Int32(42).as_i64(), Some(42));
        assert_eq!(Value::UInt64(7).as_i64(), Some(7));
        assert_eq!(Value::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Value::Float64(2.5).as_i64(), None);
        assert_eq!(Value::Bytes(b"12".to_vec()).as_i64(), Some(12));
        assert_eq!(Value::Int64(-1).as_u64(), None);
    }

    #[test]
    fn test_value_kind() {
        assert_eq!(Value::Int16(1).kind(), ValueKind::Int);
        assert_eq!(Value::Null.kind(), ValueKind::Unknown);
        assert_eq!(ValueKind::from_type_name("BIGINT UNSIGNED"), ValueKind::UInt);
        assert_eq!(ValueKind::from_type_name("varchar(255)"), ValueKind::String);
        assert_eq!(
            ValueKind::from_type_name("timestamp with time zone"),
            ValueKind::DateTimeTz
        );
    }

    #[test]
    fn test_column_set_lookup() {
        let set = ColumnSet::new(vec![
            Column::new("id", "bigint").with_generator(AUTOINCREMENT),
            Column::new("Name", "varchar"),
        ])
        .unwrap();

        assert_eq!(set.autoincrement(), Some(0));
        assert_eq!(set.position("name"), Some(1));
        assert_eq!(set.get("NAME").unwrap().name(), "Name");
        assert_eq!(set.names(), vec!["id", "Name"]);
    }

    #[test]
    fn test_column_set_rejects_two_identities() {
        let err = ColumnSet::new(vec![
            Column::new("a", "int").with_generator(AUTOINCREMENT),
            Column::new("b", "int").with_generator("autoIncrement"),
        ])
        .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Mapping);
    }

    #[test]
    fn test_with_identity_moves_flag() {
        let set = ColumnSet::new(vec![
            Column::new("a", "int").with_generator(AUTOINCREMENT),
            Column::new("b", "int"),
        ])
        .unwrap()
        .with_identity("b")
        .unwrap();
        assert_eq!(set.autoincrement(), Some(1));
    }

    #[test]
    fn test_default_expression() {
        let c = Column::new("created", "datetime").with_generator("NOW()");
        assert_eq!(c.default_expression(), Some("NOW()"));
        let c = Column::new("id", "int").with_generator(AUTOINCREMENT);
        assert_eq!(c.default_expression(), None);
        let c = Column::new("x", "int")
            .with_generator("default")
            .with_default("42");
        assert_eq!(c.default_expression(), Some("42"));
    }

    #[test]
    fn test_row_operations() {
        let row = Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::Int32(1), Value::String("Alice".into())],
        );

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int32(1)));
        assert_eq!(
            row.get_by_name("NAME"),
            Some(&Value::String("Alice".into()))
        );
    }
}
