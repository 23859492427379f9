//! Bulk load session
//!
//! Records are encoded as delimited text into an in-memory buffer that is
//! registered under a unique `Reader::<uuid>` name. The load statement
//! references that name and the driver resolves it through
//! [`reader_data`] when the server asks for the file.

use crate::connection::Executor;
use crate::context::{cancellable, Context};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::mapping::{is_zero_identity, map_entity, ColumnMapper, Entity, Mapping, TagMapper};
use crate::sql::{load_sql, LoadOptions};
use crate::types::Value;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

/// Prefix of registered reader names
pub const READER_PREFIX: &str = "Reader::";

/// Encoded NULL in load data
pub const NULL_MARKER: &str = "\\N";

static READERS: LazyLock<Mutex<HashMap<String, Bytes>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Registration of a load buffer; dropping it deregisters the buffer
#[derive(Debug)]
pub struct ReaderHandle {
    name: String,
}

impl ReaderHandle {
    /// Name to put into `LOAD DATA LOCAL INFILE '<name>'`
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        READERS.lock().remove(&self.name);
    }
}

/// Register `data` under a fresh reader name
pub fn register_reader(data: Bytes) -> ReaderHandle {
    let name = format!("{READER_PREFIX}{}", uuid::Uuid::new_v4());
    READERS.lock().insert(name.clone(), data);
    ReaderHandle { name }
}

/// Buffer registered under `name`
pub fn reader_data(name: &str) -> Option<Bytes> {
    READERS.lock().get(name).cloned()
}

/// Number of registered readers
pub fn registered_readers() -> usize {
    READERS.lock().len()
}

/// Append one field, escaping delimiters
fn encode_field(out: &mut BytesMut, value: &Value, options: &LoadOptions) {
    if value.is_null() {
        out.put_slice(NULL_MARKER.as_bytes());
        return;
    }
    let text = value.to_string();
    if let Some(q) = options.enclosed_by {
        out.put_slice(q.encode_utf8(&mut [0; 4]).as_bytes());
    }
    let mut buf = [0; 4];
    for c in text.chars() {
        let special = c == options.escaped_by
            || c == options.field_separator
            || c == options.line_terminator
            || Some(c) == options.enclosed_by;
        if special {
            out.put_slice(options.escaped_by.encode_utf8(&mut buf).as_bytes());
        }
        out.put_slice(c.encode_utf8(&mut buf).as_bytes());
    }
    if let Some(q) = options.enclosed_by {
        out.put_slice(q.encode_utf8(&mut buf).as_bytes());
    }
}

/// Encode rows as delimited text
pub fn encode_rows<'a, I>(rows: I, options: &LoadOptions) -> Bytes
where
    I: IntoIterator<Item = &'a [Value]>,
{
    let mut out = BytesMut::new();
    let mut buf = [0; 4];
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                out.put_slice(options.field_separator.encode_utf8(&mut buf).as_bytes());
            }
            encode_field(&mut out, value, options);
        }
        out.put_slice(options.line_terminator.encode_utf8(&mut buf).as_bytes());
    }
    out.freeze()
}

/// Load session bound to a table and a record type mapping
pub struct Loader {
    dialect: Arc<Dialect>,
    table: String,
    mapping: Mapping,
    options: LoadOptions,
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("dialect", &self.dialect.name)
            .field("table", &self.table)
            .field("columns", &self.mapping.columns.names())
            .field("options", &self.options)
            .finish()
    }
}

impl Loader {
    /// Loader for records of type `R` using the tag mapper
    pub fn new<R: Entity>(
        dialect: Arc<Dialect>,
        table: impl Into<String>,
        options: LoadOptions,
    ) -> Result<Self> {
        Self::with_mapper::<R>(dialect, table, options, &TagMapper, crate::mapping::DEFAULT_TAG)
    }

    /// Loader for records of type `R` using an explicit mapper
    pub fn with_mapper<R: Entity>(
        dialect: Arc<Dialect>,
        table: impl Into<String>,
        options: LoadOptions,
        mapper: &dyn ColumnMapper,
        tag: &str,
    ) -> Result<Self> {
        let table = table.into();
        if !dialect.load {
            return Err(Error::unsupported(format!(
                "bulk load is not supported by {}",
                dialect.name
            )));
        }
        crate::security::validate_qualified_name(&table)?;
        Ok(Self {
            dialect,
            table,
            mapping: map_entity::<R>(mapper, tag, None)?,
            options,
        })
    }

    /// Target table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Load `records`; zero identities load as NULL
    pub async fn load<R: Entity>(
        &self,
        ctx: &Context,
        db: &Executor,
        records: &[R],
    ) -> Result<u64> {
        let width = self.mapping.columns.len();
        let identity = self.mapping.columns.autoincrement();
        let mut values = vec![Value::Null; records.len() * width];
        for (record, chunk) in records.iter().zip(values.chunks_mut(width)) {
            self.mapping.binder.bind(record, chunk, 0, width)?;
            if let Some(pos) = identity {
                if is_zero_identity(&chunk[pos]) {
                    chunk[pos] = Value::Null;
                }
            }
        }
        let columns = self.mapping.columns.names();
        self.load_values(ctx, db, &columns, &values, width).await
    }

    /// Load pre-bound rows laid out as `values[row * width + column]`
    pub async fn load_values(
        &self,
        ctx: &Context,
        db: &Executor,
        columns: &[&str],
        values: &[Value],
        width: usize,
    ) -> Result<u64> {
        if width == 0 || values.is_empty() {
            return Ok(0);
        }
        let rows = values.len() / width;
        let data = encode_rows(values.chunks(width), &self.options);
        let reader = register_reader(data);
        let sql = load_sql(&self.dialect, &self.table, columns, reader.name(), &self.options)?;
        debug!(table = %self.table, rows, reader = %reader.name(), "loading");

        let result = cancellable(ctx, db.execute(&sql, &[])).await;
        drop(reader);

        let affected = match result? {
            r if r.rows_affected == 0 => rows as u64,
            r => r.rows_affected,
        };
        info!(table = %self.table, rows = affected, "load complete");
        Ok(affected)
    }
}
