//! PostgreSQL driver
//!
//! Provides:
//! - [`PgConnection`]: statements, prepared statements, transactions
//! - [`PgConnectionFactory`]: connections from a [`ConnectionConfig`]
//!
//! Parameters are bound through [`Param`], which converts a [`Value`] to
//! the type the server inferred for the placeholder. PostgreSQL reports no
//! last insert id; generated keys come back through `RETURNING`.

use async_trait::async_trait;
use bytes::BytesMut;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tracing::{debug, warn};

use crate::connection::{
    Connection, ConnectionConfig, ConnectionFactory, ExecResult, PreparedStatement, Transaction,
};
use crate::error::{BoxError, Error, Result};
use crate::types::{Row, Value};

// ============================================================================
// Value conversion
// ============================================================================

/// A [`Value`] bound to a placeholder of any server type
#[derive(Debug)]
pub struct Param<'a>(pub &'a Value);

fn integer(value: &Value) -> Option<i128> {
    match value {
        Value::Int8(n) => Some((*n).into()),
        Value::Int16(n) => Some((*n).into()),
        Value::Int32(n) => Some((*n).into()),
        Value::Int64(n) => Some((*n).into()),
        Value::UInt64(n) => Some((*n).into()),
        _ => None,
    }
}

impl ToSql for Param<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        if let Some(n) = integer(self.0) {
            return match *ty {
                Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
                Type::INT8 => i64::try_from(n)?.to_sql(ty, out),
                Type::NUMERIC => Decimal::from_i128_with_scale(n, 0).to_sql(ty, out),
                Type::FLOAT4 => (n as f32).to_sql(ty, out),
                Type::FLOAT8 => (n as f64).to_sql(ty, out),
                Type::BOOL => (n != 0).to_sql(ty, out),
                _ => n.to_string().to_sql(ty, out),
            };
        }
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Float32(f) if *ty == Type::FLOAT8 => f64::from(*f).to_sql(ty, out),
            Value::Float32(f) => f.to_sql(ty, out),
            Value::Float64(f) if *ty == Type::FLOAT4 => (*f as f32).to_sql(ty, out),
            Value::Float64(f) => f.to_sql(ty, out),
            Value::Decimal(d) => d.to_sql(ty, out),
            Value::String(s) if *ty == Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
            Value::String(s) if *ty == Type::JSON || *ty == Type::JSONB => {
                serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
            }
            Value::String(s) => s.as_str().to_sql(ty, out),
            Value::Bytes(b) => b.as_slice().to_sql(ty, out),
            Value::Date(d) => d.to_sql(ty, out),
            Value::Time(t) => t.to_sql(ty, out),
            Value::DateTime(dt) => dt.to_sql(ty, out),
            Value::DateTimeTz(dt) => dt.to_sql(ty, out),
            Value::Uuid(u) if *ty == Type::UUID => u.to_sql(ty, out),
            Value::Uuid(u) => u.to_string().to_sql(ty, out),
            Value::Json(j) => j.to_sql(ty, out),
            _ => Err(format!("cannot bind {:?} to {ty}", self.0.kind()).into()),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn bind(values: &[Value]) -> Vec<Param<'_>> {
    values.iter().map(Param).collect()
}

fn refs<'a>(params: &'a [Param<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn cell<'a, T>(row: &'a tokio_postgres::Row, idx: usize, wrap: fn(T) -> Value) -> Value
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx)
        .ok()
        .flatten()
        .map_or(Value::Null, wrap)
}

fn value_from_sql(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Value {
    match *ty {
        Type::BOOL => cell(row, idx, Value::Bool),
        Type::INT2 => cell(row, idx, Value::Int16),
        Type::INT4 => cell(row, idx, Value::Int32),
        Type::INT8 => cell(row, idx, Value::Int64),
        Type::FLOAT4 => cell(row, idx, Value::Float32),
        Type::FLOAT8 => cell(row, idx, Value::Float64),
        Type::NUMERIC => cell(row, idx, Value::Decimal),
        Type::BYTEA => cell(row, idx, Value::Bytes),
        Type::DATE => cell(row, idx, Value::Date),
        Type::TIME => cell(row, idx, Value::Time),
        Type::TIMESTAMP => cell(row, idx, Value::DateTime),
        Type::TIMESTAMPTZ => cell(row, idx, Value::DateTimeTz),
        Type::UUID => cell(row, idx, Value::Uuid),
        Type::JSON | Type::JSONB => cell(row, idx, Value::Json),
        _ => cell(row, idx, Value::String),
    }
}

fn convert_rows(rows: Vec<tokio_postgres::Row>) -> Vec<Row> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let columns: Arc<[String]> = first.columns().iter().map(|c| c.name().to_string()).collect();
    rows.iter()
        .map(|row| {
            let values = row
                .columns()
                .iter()
                .enumerate()
                .map(|(i, c)| value_from_sql(row, i, c.type_()))
                .collect();
            Row::new(columns.clone(), values)
        })
        .collect()
}

fn driver_error(e: tokio_postgres::Error, sql: &str) -> Error {
    if e.is_closed() {
        Error::connection_with_source("PostgreSQL connection closed", e)
    } else {
        Error::driver_with_sql(e.to_string(), sql)
    }
}

// ============================================================================
// Connection
// ============================================================================

async fn run_query(client: &tokio_postgres::Client, sql: &str, values: &[Value]) -> Result<Vec<Row>> {
    let params = bind(values);
    let rows = client
        .query(sql, &refs(&params))
        .await
        .map_err(|e| driver_error(e, sql))?;
    Ok(convert_rows(rows))
}

async fn run_execute(client: &tokio_postgres::Client, sql: &str, values: &[Value]) -> Result<ExecResult> {
    let params = bind(values);
    let affected = client
        .execute(sql, &refs(&params))
        .await
        .map_err(|e| driver_error(e, sql))?;
    Ok(ExecResult::rows(affected))
}

/// Exclusive use of a session, held per statement or per transaction
type Gate = Arc<Mutex<()>>;

async fn run_prepare(
    client: &Arc<tokio_postgres::Client>,
    gate: Option<Gate>,
    sql: &str,
) -> Result<Box<dyn PreparedStatement>> {
    let statement = client.prepare(sql).await.map_err(|e| driver_error(e, sql))?;
    Ok(Box::new(PgStatement {
        client: client.clone(),
        gate,
        statement,
        sql: sql.to_string(),
    }))
}

/// PostgreSQL connection
///
/// One session: an open transaction makes every other user of the
/// connection, including a second `begin`, wait for its commit or rollback.
pub struct PgConnection {
    client: Arc<tokio_postgres::Client>,
    gate: Gate,
    closed: AtomicBool,
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl PgConnection {
    /// Wrap a connected client
    pub fn new(client: tokio_postgres::Client) -> Self {
        Self {
            client: Arc::new(client),
            gate: Arc::new(Mutex::new(())),
            closed: AtomicBool::new(false),
        }
    }

    /// Underlying client
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    fn open(&self) -> Result<&Arc<tokio_postgres::Client>> {
        if self.closed.load(Ordering::Relaxed) || self.client.is_closed() {
            return Err(Error::connection("connection is closed"));
        }
        Ok(&self.client)
    }

    /// Connect using `config`
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut pg: tokio_postgres::Config = config
            .url
            .parse()
            .map_err(|e| Error::config(format!("invalid PostgreSQL URL: {e}")))?;
        pg.connect_timeout(std::time::Duration::from_millis(config.connect_timeout_ms));
        if let Some(name) = &config.application_name {
            pg.application_name(name);
        }
        let (client, connection) = pg
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| Error::connection_with_source(format!("connecting to {}", config.redacted_url()), e))?;

        let url = config.redacted_url();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(url = %url, error = %e, "PostgreSQL connection terminated");
            }
        });
        debug!(url = %config.redacted_url(), "PostgreSQL connection established");
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let _session = self.gate.lock().await;
        run_query(self.open()?, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let _session = self.gate.lock().await;
        run_execute(self.open()?, sql, params).await
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        let _session = self.gate.lock().await;
        run_prepare(self.open()?, Some(self.gate.clone()), sql).await
    }

    async fn begin(&self) -> Result<Arc<dyn Transaction>> {
        let lease = self.gate.clone().lock_owned().await;
        let client = self.open()?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| Error::transaction(format!("failed to begin transaction: {e}")))?;
        Ok(Arc::new(PgTransaction {
            client: client.clone(),
            lease: parking_lot::Mutex::new(Some(lease)),
            done: AtomicBool::new(false),
        }))
    }

    async fn is_valid(&self) -> bool {
        match self.open() {
            Ok(client) => client.simple_query("SELECT 1").await.is_ok(),
            Err(_) => false,
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Server-side prepared statement
pub struct PgStatement {
    client: Arc<tokio_postgres::Client>,
    /// Session gate for statements prepared outside a transaction
    gate: Option<Gate>,
    statement: tokio_postgres::Statement,
    sql: String,
}

#[async_trait]
impl PreparedStatement for PgStatement {
    async fn execute(&self, values: &[Value]) -> Result<ExecResult> {
        let _session = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        let params = bind(values);
        let affected = self
            .client
            .execute(&self.statement, &refs(&params))
            .await
            .map_err(|e| driver_error(e, &self.sql))?;
        Ok(ExecResult::rows(affected))
    }

    async fn query(&self, values: &[Value]) -> Result<Vec<Row>> {
        let _session = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        let params = bind(values);
        let rows = self
            .client
            .query(&self.statement, &refs(&params))
            .await
            .map_err(|e| driver_error(e, &self.sql))?;
        Ok(convert_rows(rows))
    }

    fn sql(&self) -> &str {
        &self.sql
    }
}

/// PostgreSQL transaction
///
/// Holds the connection's session until commit or rollback.
pub struct PgTransaction {
    client: Arc<tokio_postgres::Client>,
    lease: parking_lot::Mutex<Option<OwnedMutexGuard<()>>>,
    done: AtomicBool,
}

impl PgTransaction {
    fn active(&self) -> Result<&Arc<tokio_postgres::Client>> {
        if self.done.load(Ordering::SeqCst) {
            return Err(Error::transaction("transaction already completed"));
        }
        Ok(&self.client)
    }

    async fn end(&self, sql: &str) -> Result<()> {
        if self.done.swap(true, Ordering::SeqCst) {
            return Err(Error::transaction("transaction already completed"));
        }
        let outcome = self
            .client
            .batch_execute(sql)
            .await
            .map_err(|e| Error::transaction(format!("{sql} failed: {e}")));
        self.lease.lock().take();
        outcome
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if self.done.load(Ordering::SeqCst) {
            return;
        }
        warn!("PostgreSQL transaction dropped without commit or rollback");
        let lease = self.lease.get_mut().take();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = self.client.clone();
        handle.spawn(async move {
            if let Err(e) = client.batch_execute("ROLLBACK").await {
                warn!(error = %e, "rollback of dropped PostgreSQL transaction failed");
            }
            drop(lease);
        });
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        run_query(self.active()?, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        run_execute(self.active()?, sql, params).await
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        run_prepare(self.active()?, None, sql).await
    }

    async fn commit(&self) -> Result<()> {
        self.end("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.end("ROLLBACK").await
    }
}

/// Creates [`PgConnection`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnectionFactory;

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(PgConnection::connect(config).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value, ty: &Type) -> std::result::Result<(IsNull, Vec<u8>), BoxError> {
        let mut out = BytesMut::new();
        let is_null = Param(value).to_sql(ty, &mut out)?;
        Ok((is_null, out.to_vec()))
    }

    #[test]
    fn test_null_binds_to_any_type() {
        for ty in [Type::INT4, Type::TEXT, Type::UUID, Type::TIMESTAMP] {
            assert!(matches!(encode(&Value::Null, &ty).unwrap().0, IsNull::Yes));
        }
    }

    #[test]
    fn test_integer_narrows_to_target() {
        let (_, bytes) = encode(&Value::Int64(7), &Type::INT4).unwrap();
        assert_eq!(bytes, 7i32.to_be_bytes());
        let (_, bytes) = encode(&Value::Int32(7), &Type::INT8).unwrap();
        assert_eq!(bytes, 7i64.to_be_bytes());
        assert!(encode(&Value::Int64(i64::MAX), &Type::INT2).is_err());
    }

    #[test]
    fn test_string_to_uuid() {
        let id = uuid::Uuid::new_v4();
        let (_, bytes) = encode(&Value::String(id.to_string()), &Type::UUID).unwrap();
        assert_eq!(bytes, id.as_bytes());
        assert!(encode(&Value::from("not-a-uuid"), &Type::UUID).is_err());
    }
}
