//! Record to column mapping
//!
//! Records describe themselves through [`Entity`]: a static list of
//! [`Field`]s plus indexed getters and setters. A [`ColumnMapper`] turns the
//! field list into a [`ColumnSet`] and a [`Binder`] that projects records
//! into a flat value buffer. The default [`TagMapper`] reads field tags of
//! the form `name=<col>,primaryKey=<bool>,generator=<kind>,sequence=<name>`.
//!
//! [`impl_entity!`](crate::impl_entity) derives [`Entity`] for plain structs.

use crate::error::{Error, Result};
use crate::types::{Column, ColumnSet, Value, ValueKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Default tag name
pub const DEFAULT_TAG: &str = "sqlx";

/// Rust-side type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum FieldType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    Decimal,
    String,
    Bytes,
    Date,
    Time,
    DateTime,
    DateTimeTz,
    Uuid,
    Json,
}

impl FieldType {
    /// Value kind a column needs to bind without conversion
    pub fn kind(self) -> ValueKind {
        match self {
            Self::Bool => ValueKind::Bool,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::Isize => ValueKind::Int,
            Self::U8 | Self::U16 | Self::U32 | Self::U64 | Self::Usize => ValueKind::UInt,
            Self::F32 | Self::F64 => ValueKind::Float,
            Self::Decimal => ValueKind::Decimal,
            Self::String => ValueKind::String,
            Self::Bytes => ValueKind::Bytes,
            Self::Date => ValueKind::Date,
            Self::Time => ValueKind::Time,
            Self::DateTime => ValueKind::DateTime,
            Self::DateTimeTz => ValueKind::DateTimeTz,
            Self::Uuid => ValueKind::Uuid,
            Self::Json => ValueKind::Json,
        }
    }

    /// Column type name used when a field maps to a new column
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Bool => "BOOLEAN",
            Self::I8 => "TINYINT",
            Self::I16 => "SMALLINT",
            Self::I32 => "INT",
            Self::I64 | Self::Isize => "BIGINT",
            Self::U8 | Self::U16 | Self::U32 => "INT UNSIGNED",
            Self::U64 | Self::Usize => "BIGINT UNSIGNED",
            Self::F32 => "FLOAT",
            Self::F64 => "DOUBLE",
            Self::Decimal => "DECIMAL",
            Self::String => "VARCHAR",
            Self::Bytes => "BLOB",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::DateTime => "DATETIME",
            Self::DateTimeTz => "TIMESTAMP",
            Self::Uuid => "CHAR(36)",
            Self::Json => "JSON",
        }
    }

    /// Integer range of the type, `None` for non-integers
    fn int_range(self) -> Option<(i128, i128)> {
        let r = match self {
            Self::I8 => (i8::MIN as i128, i8::MAX as i128),
            Self::I16 => (i16::MIN as i128, i16::MAX as i128),
            Self::I32 => (i32::MIN as i128, i32::MAX as i128),
            Self::I64 => (i64::MIN as i128, i64::MAX as i128),
            Self::Isize => (isize::MIN as i128, isize::MAX as i128),
            Self::U8 => (0, u8::MAX as i128),
            Self::U16 => (0, u16::MAX as i128),
            Self::U32 => (0, u32::MAX as i128),
            Self::U64 => (0, u64::MAX as i128),
            Self::Usize => (0, usize::MAX as i128),
            _ => return None,
        };
        Some(r)
    }

    /// Whether a value of `kind` can be bound without conversion
    pub fn accepts(self, kind: ValueKind) -> bool {
        kind == ValueKind::Unknown
            || kind == self.kind()
            || (self.int_range().is_some() && matches!(kind, ValueKind::Int | ValueKind::UInt))
    }
}

/// Static description of one record field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: FieldType,
    /// Whether the field is an `Option`
    pub optional: bool,
    tags: Vec<(String, String)>,
}

impl Field {
    /// Describe a field
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
            tags: Vec::new(),
        }
    }

    /// Describe a field from its Rust type
    pub fn of<T: FieldValue>(name: impl Into<String>) -> Self {
        Self {
            optional: T::OPTIONAL,
            ..Self::new(name, T::TYPE)
        }
    }

    /// Describe a field through an accessor closure (used by `impl_entity!`)
    pub fn infer<R, T, F>(name: &str, _accessor: F) -> Self
    where
        T: FieldValue,
        F: Fn(&R) -> &T,
    {
        Self::of::<T>(name)
    }

    /// Mark the field optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Attach a tag value under `tag_name`
    pub fn with_tag(mut self, tag_name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((tag_name.into(), value.into()));
        self
    }

    /// Tag value under `tag_name`
    pub fn tag(&self, tag_name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == tag_name)
            .map(|(_, v)| v.as_str())
    }
}

/// A typed record that can be written to and read from tables
pub trait Entity: Send + Sync + 'static {
    /// Field descriptors in declaration order
    fn fields() -> Vec<Field>;

    /// Read field `idx`
    fn get(&self, idx: usize) -> Value;

    /// Write field `idx`, converting the value to the field type
    fn set(&mut self, idx: usize, value: Value) -> Result<()>;

    /// Type name used in cache fingerprints
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Conversion between a Rust field type and [`Value`]
pub trait FieldValue: Sized {
    /// Field type tag
    const TYPE: FieldType;
    /// `Option<T>` wrapper
    const OPTIONAL: bool = false;

    /// Convert the field to a value
    fn to_value(&self) -> Value;

    /// Convert a value into the field type
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: FieldType, value: &Value) -> Error {
    Error::binding(format!(
        "cannot assign {} value to {expected:?} field",
        value.sql_type()
    ))
}

macro_rules! int_field {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                const TYPE: FieldType = FieldType::$tag;

                fn to_value(&self) -> Value {
                    i64::try_from(*self).map(Value::Int64).unwrap_or_else(|_| {
                        Value::UInt64(u64::try_from(*self).unwrap_or_default())
                    })
                }

                fn from_value(value: Value) -> Result<Self> {
                    let n: Option<i128> = match &value {
                        Value::UInt64(n) => Some(i128::from(*n)),
                        other => other.as_i64().map(i128::from),
                    };
                    n.and_then(|n| <$ty>::try_from(n).ok())
                        .ok_or_else(|| mismatch(Self::TYPE, &value))
                }
            }
        )*
    };
}

int_field! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
}

impl FieldValue for bool {
    const TYPE: FieldType = FieldType::Bool;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch(Self::TYPE, &value))
    }
}

impl FieldValue for f32 {
    const TYPE: FieldType = FieldType::F32;

    fn to_value(&self) -> Value {
        Value::Float32(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value
            .as_f64()
            .map(|f| f as f32)
            .ok_or_else(|| mismatch(Self::TYPE, &value))
    }
}

impl FieldValue for f64 {
    const TYPE: FieldType = FieldType::F64;

    fn to_value(&self) -> Value {
        Value::Float64(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch(Self::TYPE, &value))
    }
}

impl FieldValue for Decimal {
    const TYPE: FieldType = FieldType::Decimal;

    fn to_value(&self) -> Value {
        Value::Decimal(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Decimal(d) => Ok(*d),
            Value::Int64(n) => Ok(Decimal::from(*n)),
            Value::Int32(n) => Ok(Decimal::from(*n)),
            Value::UInt64(n) => Ok(Decimal::from(*n)),
            Value::String(s) => s.parse().map_err(|_| mismatch(Self::TYPE, &value)),
            _ => Err(mismatch(Self::TYPE, &value)),
        }
    }
}

impl FieldValue for String {
    const TYPE: FieldType = FieldType::String;

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            Value::Null => Err(mismatch(Self::TYPE, &Value::Null)),
            other => other.as_string().ok_or_else(|| mismatch(Self::TYPE, &other)),
        }
    }
}

impl FieldValue for Vec<u8> {
    const TYPE: FieldType = FieldType::Bytes;

    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::String(s) => Ok(s.into_bytes()),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl FieldValue for Uuid {
    const TYPE: FieldType = FieldType::Uuid;

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value.as_uuid().ok_or_else(|| mismatch(Self::TYPE, &value))
    }
}

impl FieldValue for serde_json::Value {
    const TYPE: FieldType = FieldType::Json;

    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Json(j) => Ok(j),
            Value::String(s) => {
                serde_json::from_str(&s).map_err(|e| Error::binding(format!("invalid JSON: {e}")))
            }
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

macro_rules! temporal_field {
    ($($ty:ty => $tag:ident, $variant:ident, $parse:expr);* $(;)?) => {
        $(
            impl FieldValue for $ty {
                const TYPE: FieldType = FieldType::$tag;

                fn to_value(&self) -> Value {
                    Value::$variant(*self)
                }

                fn from_value(value: Value) -> Result<Self> {
                    match &value {
                        Value::$variant(v) => Ok(*v),
                        Value::String(s) => {
                            let parse: fn(&str) -> Option<$ty> = $parse;
                            parse(s).ok_or_else(|| mismatch(Self::TYPE, &value))
                        }
                        _ => Err(mismatch(Self::TYPE, &value)),
                    }
                }
            }
        )*
    };
}

temporal_field! {
    NaiveDate => Date, Date, |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
    NaiveTime => Time, Time, |s| NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok();
    NaiveDateTime => DateTime, DateTime,
        |s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok();
    DateTime<Utc> => DateTimeTz, DateTimeTz,
        |s| DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc));
}

impl<T: FieldValue> FieldValue for Option<T> {
    const TYPE: FieldType = T::TYPE;
    const OPTIONAL: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

// ============================================================================
// Tags
// ============================================================================

/// Parsed field tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    /// Field is excluded (`-`)
    pub excluded: bool,
    /// Column name override
    pub column: Option<String>,
    /// Primary key flag
    pub primary_key: bool,
    /// Generator (`autoincrement` or an SQL expression)
    pub generator: Option<String>,
    /// Sequence name
    pub sequence: Option<String>,
}

impl Tag {
    /// Parse a tag value; unknown fragments are ignored
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "-" {
            return Self {
                excluded: true,
                ..Default::default()
            };
        }
        let mut tag = Self::default();
        for (i, fragment) in raw.split(',').map(str::trim).enumerate() {
            if fragment.is_empty() {
                continue;
            }
            let Some((key, value)) = fragment.split_once('=') else {
                if i == 0 {
                    tag.column = Some(fragment.to_string());
                } else if fragment.eq_ignore_ascii_case("primaryKey") {
                    tag.primary_key = true;
                } else if fragment.eq_ignore_ascii_case("autoincrement") {
                    tag.generator = Some(crate::types::AUTOINCREMENT.to_string());
                }
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => tag.column = Some(value.to_string()),
                "primarykey" => tag.primary_key = value.eq_ignore_ascii_case("true"),
                "generator" => tag.generator = Some(value.to_string()),
                "sequence" => tag.sequence = Some(value.to_string()),
                _ => {}
            }
        }
        tag
    }
}

// ============================================================================
// Binder and mappers
// ============================================================================

/// Projects record fields into a flat value slice in column order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binder {
    fields: Arc<[usize]>,
}

impl Binder {
    /// Binder reading field `fields[i]` for column `i`
    pub fn new(fields: Vec<usize>) -> Self {
        Self {
            fields: fields.into(),
        }
    }

    /// Number of columns bound
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no column is bound
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field index backing column `column`
    #[inline]
    pub fn field(&self, column: usize) -> Option<usize> {
        self.fields.get(column).copied()
    }

    /// Write `count` column values starting at column `start` into `out`
    pub fn bind<R: Entity>(
        &self,
        record: &R,
        out: &mut [Value],
        start: usize,
        count: usize,
    ) -> Result<()> {
        let fields = self
            .fields
            .get(start..start + count)
            .ok_or_else(|| Error::binding(format!("column range {start}+{count} out of bounds")))?;
        if out.len() < count {
            return Err(Error::binding(format!(
                "output slice holds {} values, {count} required",
                out.len()
            )));
        }
        for (slot, &field) in out.iter_mut().zip(fields) {
            *slot = record.get(field);
        }
        Ok(())
    }
}

/// Resolved mapping of a record type
#[derive(Debug, Clone)]
pub struct Mapping {
    /// Columns in insert order
    pub columns: ColumnSet,
    /// Binder consistent with `columns`
    pub binder: Binder,
    /// Field descriptors of the record type
    pub fields: Arc<[Field]>,
}

impl Mapping {
    /// Field backing column `column`
    pub fn field(&self, column: usize) -> Option<&Field> {
        self.binder.field(column).and_then(|i| self.fields.get(i))
    }
}

/// Produces columns and a binder for a record type
pub trait ColumnMapper: Send + Sync {
    /// Map `fields` using tags under `tag_name`
    fn map(&self, fields: &[Field], tag_name: &str) -> Result<Mapping>;
}

/// Default mapper driven by field tags
#[derive(Debug, Clone, Copy, Default)]
pub struct TagMapper;

impl ColumnMapper for TagMapper {
    fn map(&self, fields: &[Field], tag_name: &str) -> Result<Mapping> {
        let mut columns = Vec::with_capacity(fields.len());
        let mut binder = Vec::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            let tag = field.tag(tag_name).map(Tag::parse).unwrap_or_default();
            if tag.excluded {
                continue;
            }
            let name = tag.column.unwrap_or_else(|| field.name.clone());
            let mut column = Column::new(name, field.ty.sql_type())
                .with_kind(field.ty.kind())
                .with_primary_key(tag.primary_key)
                .with_ordinal(columns.len() + 1)
                .with_nullability(if field.optional {
                    crate::types::Nullability::Nullable
                } else {
                    crate::types::Nullability::NotNull
                });
            if let Some(generator) = tag.generator {
                column = column.with_generator(generator);
            }
            if let Some(sequence) = tag.sequence {
                column = column.with_sequence(sequence);
            }
            columns.push(column);
            binder.push(idx);
        }
        if columns.is_empty() {
            return Err(Error::mapping("record type maps to no columns"));
        }
        Ok(Mapping {
            columns: ColumnSet::new(columns)?,
            binder: Binder::new(binder),
            fields: fields.to_vec().into(),
        })
    }
}

/// Map an entity type with `mapper`, marking `identity` as auto-increment
pub fn map_entity<R: Entity>(
    mapper: &dyn ColumnMapper,
    tag_name: &str,
    identity: Option<&str>,
) -> Result<Mapping> {
    let fields = R::fields();
    let mut mapping = mapper.map(&fields, tag_name)?;
    if let Some(identity) = identity {
        mapping.columns = mapping.columns.with_identity(identity)?;
    }
    Ok(mapping)
}

// ============================================================================
// Identity assignment
// ============================================================================

/// Whether an identity value means "let the database assign it"
#[inline]
pub fn is_zero_identity(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::UInt64(n) => *n == 0,
        other => other.as_i64() == Some(0),
    }
}

/// Value to store an identity `id` into a field of type `ty`
///
/// `i64`, `isize` and `usize` (and their `Option` forms) are assigned
/// directly; other numeric fields are range-checked.
pub fn identity_value(ty: FieldType, id: i64) -> Result<Value> {
    let out_of_range = || Error::binding(format!("identity {id} out of range for {ty:?} field"));
    match ty {
        FieldType::I64 | FieldType::Isize => Ok(Value::Int64(id)),
        FieldType::Usize | FieldType::U64 => {
            u64::try_from(id).map(Value::UInt64).map_err(|_| out_of_range())
        }
        FieldType::F32 | FieldType::F64 => Ok(Value::Float64(id as f64)),
        FieldType::Decimal => Ok(Value::Decimal(Decimal::from(id))),
        other => match other.int_range() {
            Some((min, max)) if (min..=max).contains(&i128::from(id)) => Ok(Value::Int64(id)),
            Some(_) => Err(out_of_range()),
            None => Err(Error::binding(format!(
                "cannot assign identity to {other:?} field"
            ))),
        },
    }
}

/// Derive [`Entity`] for a struct whose fields implement [`FieldValue`].
///
/// ```
/// #[derive(Default)]
/// struct User {
///     id: i64,
///     name: String,
///     note: Option<String>,
/// }
///
/// sqlio::impl_entity!(User {
///     id => "name=id,generator=autoincrement",
///     name => "name",
///     note => "-",
/// });
/// ```
#[macro_export]
macro_rules! impl_entity {
    ($ty:ty { $($field:ident => $tag:expr),* $(,)? }) => {
        impl $crate::mapping::Entity for $ty {
            fn fields() -> ::std::vec::Vec<$crate::mapping::Field> {
                let mut fields = ::std::vec::Vec::new();
                $(
                    let mut field = $crate::mapping::Field::infer(
                        stringify!($field),
                        |r: &$ty| &r.$field,
                    );
                    let tag: &str = $tag;
                    if !tag.is_empty() {
                        field = field.with_tag($crate::mapping::DEFAULT_TAG, tag);
                    }
                    fields.push(field);
                )*
                fields
            }

            #[allow(unused_assignments)]
            fn get(&self, idx: usize) -> $crate::types::Value {
                let mut i = 0usize;
                $(
                    if idx == i {
                        return $crate::mapping::FieldValue::to_value(&self.$field);
                    }
                    i += 1;
                )*
                $crate::types::Value::Null
            }

            #[allow(unused_assignments)]
            fn set(&mut self, idx: usize, value: $crate::types::Value) -> $crate::error::Result<()> {
                let mut i = 0usize;
                $(
                    if idx == i {
                        self.$field = $crate::mapping::FieldValue::from_value(value)?;
                        return Ok(());
                    }
                    i += 1;
                )*
                Err($crate::error::Error::mapping(format!(
                    "{} has no field {idx}",
                    stringify!($ty)
                )))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Account {
        id: i64,
        email: String,
        balance: Option<Decimal>,
        internal: u8,
        created: String,
    }

    crate::impl_entity!(Account {
        id => "name=ID,generator=autoincrement,primaryKey=true",
        email => "email_address",
        balance => "",
        internal => "-",
        created => "generator=NOW()",
    });

    #[test]
    fn test_tag_parse() {
        let t = Tag::parse("name=id,primaryKey=true,generator=autoincrement,sequence=seq,x=y");
        assert_eq!(t.column.as_deref(), Some("id"));
        assert!(t.primary_key);
        assert_eq!(t.generator.as_deref(), Some("autoincrement"));
        assert_eq!(t.sequence.as_deref(), Some("seq"));

        let t = Tag::parse("user_id,primaryKey");
        assert_eq!(t.column.as_deref(), Some("user_id"));
        assert!(t.primary_key);

        assert!(Tag::parse("-").excluded);
    }

    #[test]
    fn test_tag_mapper() {
        let mapping = TagMapper.map(&Account::fields(), DEFAULT_TAG).unwrap();
        assert_eq!(
            mapping.columns.names(),
            vec!["ID", "email_address", "balance", "created"]
        );
        assert_eq!(mapping.columns.autoincrement(), Some(0));
        assert!(mapping.columns[0].is_primary_key());
        assert_eq!(mapping.columns[3].default_expression(), Some("NOW()"));
        assert_eq!(mapping.field(3).unwrap().name, "created");
        assert!(mapping.field(2).unwrap().optional);
    }

    #[test]
    fn test_binder_projects_values() {
        let mapping = TagMapper.map(&Account::fields(), DEFAULT_TAG).unwrap();
        let account = Account {
            id: 7,
            email: "a@b".into(),
            ..Default::default()
        };
        let mut out = vec![Value::Null; 4];
        mapping.binder.bind(&account, &mut out, 0, 4).unwrap();
        assert_eq!(out[0], Value::Int64(7));
        assert_eq!(out[1], Value::String("a@b".into()));
        assert_eq!(out[2], Value::Null);

        let mut tail = vec![Value::Null; 2];
        mapping.binder.bind(&account, &mut tail, 1, 2).unwrap();
        assert_eq!(tail[0], Value::String("a@b".into()));

        assert!(mapping.binder.bind(&account, &mut tail, 3, 2).is_err());
    }

    #[test]
    fn test_entity_set_converts() {
        let mut a = Account::default();
        a.set(0, Value::UInt64(9)).unwrap();
        a.set(2, Value::String("1.50".into())).unwrap();
        a.set(3, Value::Int64(255)).unwrap();
        assert_eq!(a.id, 9);
        assert_eq!(a.balance, Some(Decimal::new(150, 2)));
        assert_eq!(a.internal, 255);
        assert!(a.set(3, Value::Int64(256)).is_err());
        assert!(a.set(99, Value::Null).is_err());
    }

    #[test]
    fn test_identity_value() {
        assert_eq!(identity_value(FieldType::I64, 5).unwrap(), Value::Int64(5));
        assert_eq!(identity_value(FieldType::Usize, 5).unwrap(), Value::UInt64(5));
        assert!(identity_value(FieldType::Usize, -1).is_err());
        assert!(identity_value(FieldType::I8, 300).is_err());
        assert_eq!(identity_value(FieldType::I32, 300).unwrap(), Value::Int64(300));
        assert!(identity_value(FieldType::String, 1).is_err());
    }

    #[test]
    fn test_zero_identity() {
        assert!(is_zero_identity(&Value::Int64(0)));
        assert!(is_zero_identity(&Value::Null));
        assert!(is_zero_identity(&Value::UInt64(0)));
        assert!(!is_zero_identity(&Value::Int64(3)));
    }
}
