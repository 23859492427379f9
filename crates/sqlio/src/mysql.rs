//! MySQL driver
//!
//! Provides:
//! - [`MySqlConnection`]: statements, prepared statements, transactions
//! - [`MySqlConnectionFactory`]: connections from a [`ConnectionConfig`]
//! - a `LOCAL INFILE` handler serving [`register_reader`](crate::load::register_reader)
//!   buffers to `LOAD DATA LOCAL INFILE 'Reader::<name>'`
//!
//! MySQL reports the *first* id generated by a multi-row insert. The driver
//! normalises it to the last one, so `last_insert_id` means the same thing
//! across drivers.

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Statement};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::connection::{
    Connection, ConnectionConfig, ConnectionFactory, ExecResult, PreparedStatement, Transaction,
};
use crate::error::{Error, Result};
use crate::load::{reader_data, READER_PREFIX};
use crate::types::{Row, Value};

// ============================================================================
// Value conversion
// ============================================================================

fn value_to_sql(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(b) => mysql_async::Value::from(*b),
        Value::Int8(n) => mysql_async::Value::from(*n),
        Value::Int16(n) => mysql_async::Value::from(*n),
        Value::Int32(n) => mysql_async::Value::from(*n),
        Value::Int64(n) => mysql_async::Value::from(*n),
        Value::UInt64(n) => mysql_async::Value::from(*n),
        Value::Float32(n) => mysql_async::Value::from(*n),
        Value::Float64(n) => mysql_async::Value::from(*n),
        Value::Decimal(d) => mysql_async::Value::from(d.to_string()),
        Value::String(s) => mysql_async::Value::from(s.as_str()),
        Value::Bytes(b) => mysql_async::Value::from(b.as_slice()),
        Value::Date(d) => mysql_async::Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        Value::Time(t) => mysql_async::Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1000,
        ),
        Value::DateTime(dt) => datetime(dt),
        Value::DateTimeTz(dt) => datetime(&dt.naive_utc()),
        Value::Uuid(u) => mysql_async::Value::from(u.to_string()),
        Value::Json(j) => mysql_async::Value::from(j.to_string()),
    }
}

fn datetime(dt: &chrono::NaiveDateTime) -> mysql_async::Value {
    mysql_async::Value::Date(
        dt.year() as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        dt.nanosecond() / 1000,
    )
}

fn params(values: &[Value]) -> mysql_async::Params {
    if values.is_empty() {
        mysql_async::Params::Empty
    } else {
        mysql_async::Params::Positional(values.iter().map(value_to_sql).collect())
    }
}

fn value_from_sql(val: mysql_async::Value) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(b) => match String::from_utf8(b) {
            Ok(s) => Value::String(s),
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Int(n) => Value::Int64(n),
        mysql_async::Value::UInt(n) => i64::try_from(n).map_or(Value::UInt64(n), Value::Int64),
        mysql_async::Value::Float(f) => Value::Float32(f),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let Some(date) = chrono::NaiveDate::from_ymd_opt(year.into(), month.into(), day.into()) else {
                return Value::Null;
            };
            if hour == 0 && min == 0 && sec == 0 && micro == 0 {
                return Value::Date(date);
            }
            chrono::NaiveTime::from_hms_micro_opt(hour.into(), min.into(), sec.into(), micro)
                .map_or(Value::Null, |time| Value::DateTime(date.and_time(time)))
        }
        mysql_async::Value::Time(_, days, hour, min, sec, micro) => {
            let hours = (days * 24 + u32::from(hour)) % 24;
            chrono::NaiveTime::from_hms_micro_opt(hours, min.into(), sec.into(), micro)
                .map_or(Value::Null, Value::Time)
        }
    }
}

fn convert_rows(result: Vec<mysql_async::Row>) -> Vec<Row> {
    let Some(first) = result.first() else {
        return Vec::new();
    };
    let columns: Arc<[String]> = first
        .columns_ref()
        .iter()
        .map(|c| c.name_str().to_string())
        .collect();
    result
        .into_iter()
        .map(|row| {
            let values = row.unwrap().into_iter().map(value_from_sql).collect();
            Row::new(columns.clone(), values)
        })
        .collect()
}

fn driver_error(e: mysql_async::Error, sql: &str) -> Error {
    if matches!(e, mysql_async::Error::Io(_)) {
        Error::connection_with_source("MySQL I/O failure", e)
    } else {
        Error::driver_with_sql(e.to_string(), sql)
    }
}

/// Last id of an insert, from the first id MySQL reports
fn last_insert_id(conn: &Conn) -> Option<i64> {
    let first = i64::try_from(conn.last_insert_id()?).ok()?;
    let affected = i64::try_from(conn.affected_rows()).ok()?;
    (first > 0 && affected > 0).then(|| first + affected - 1)
}

fn exec_result(conn: &Conn) -> ExecResult {
    ExecResult {
        rows_affected: conn.affected_rows(),
        last_insert_id: last_insert_id(conn),
    }
}

// ============================================================================
// LOCAL INFILE
// ============================================================================

/// Serves `Reader::<name>` files from the in-process reader registry
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderInfileHandler;

impl GlobalHandler for ReaderInfileHandler {
    fn handle(&self, file_name: &[u8]) -> BoxFuture<'static, mysql_async::InfileData> {
        let name = String::from_utf8_lossy(file_name).into_owned();
        let data = name
            .starts_with(READER_PREFIX)
            .then(|| reader_data(&name))
            .flatten();
        Box::pin(async move {
            let chunk = data.ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no registered reader for '{name}'"),
                )
            });
            Ok(stream::once(async move { chunk }).boxed())
        })
    }
}

// ============================================================================
// Connection
// ============================================================================

type Slot = Arc<Mutex<Option<Conn>>>;

fn session(slot: &mut Option<Conn>) -> Result<&mut Conn> {
    slot.as_mut()
        .ok_or_else(|| Error::connection("connection is closed"))
}

async fn run_query(slot: &Slot, sql: &str, values: &[Value]) -> Result<Vec<Row>> {
    let mut guard = slot.lock().await;
    let conn = session(&mut guard)?;
    let rows: Vec<mysql_async::Row> = conn
        .exec(sql, params(values))
        .await
        .map_err(|e| driver_error(e, sql))?;
    Ok(convert_rows(rows))
}

async fn run_execute(slot: &Slot, sql: &str, values: &[Value]) -> Result<ExecResult> {
    let mut guard = slot.lock().await;
    let conn = session(&mut guard)?;
    if values.is_empty() {
        // text protocol, needed for LOAD DATA and lock functions
        conn.query_drop(sql).await.map_err(|e| driver_error(e, sql))?;
    } else {
        conn.exec_drop(sql, params(values))
            .await
            .map_err(|e| driver_error(e, sql))?;
    }
    Ok(exec_result(conn))
}

async fn run_prepare(slot: &Slot, sql: &str) -> Result<Box<dyn PreparedStatement>> {
    let mut guard = slot.lock().await;
    let conn = session(&mut guard)?;
    let stmt = conn.prep(sql).await.map_err(|e| driver_error(e, sql))?;
    Ok(Box::new(MySqlStatement {
        slot: slot.clone(),
        stmt,
        sql: sql.to_string(),
    }))
}

/// MySQL connection
pub struct MySqlConnection {
    slot: Slot,
    database: String,
    in_transaction: Arc<AtomicBool>,
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("database", &self.database)
            .field("in_transaction", &self.in_transaction.load(Ordering::Relaxed))
            .finish()
    }
}

impl MySqlConnection {
    /// Wrap an established connection
    pub fn new(conn: Conn, database: String) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(conn))),
            database,
            in_transaction: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Database the connection is bound to
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Connect using `config`
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let url = url::Url::parse(&config.url)
            .map_err(|e| Error::config(format!("invalid MySQL URL: {e}")))?;
        let opts = mysql_async::Opts::from_url(&config.url)
            .map_err(|e| Error::config(format!("invalid MySQL connection string: {e}")))?;
        let mut builder = OptsBuilder::from_opts(opts);
        if config.local_infile {
            builder = builder.local_infile_handler(Some(ReaderInfileHandler));
        }
        let database = url.path().trim_start_matches('/').to_string();

        let timeout = std::time::Duration::from_millis(config.connect_timeout_ms);
        let conn = tokio::time::timeout(timeout, Conn::new(builder))
            .await
            .map_err(|_| Error::timeout(format!("connecting to {}", config.redacted_url())))?
            .map_err(|e| Error::connection_with_source(format!("connecting to {}", config.redacted_url()), e))?;
        debug!(url = %config.redacted_url(), "MySQL connection established");
        Ok(Self::new(conn, database))
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        run_query(&self.slot, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        run_execute(&self.slot, sql, params).await
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        run_prepare(&self.slot, sql).await
    }

    async fn begin(&self) -> Result<Arc<dyn Transaction>> {
        // waits until a running transaction hands the session back
        let mut lease = self.slot.clone().lock_owned().await;
        let mut conn = lease
            .take()
            .ok_or_else(|| Error::transaction("connection is closed"))?;
        if let Err(e) = conn.query_drop("BEGIN").await {
            *lease = Some(conn);
            return Err(Error::transaction(format!("failed to begin transaction: {e}")));
        }
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(Arc::new(MySqlTransaction {
            slot: Arc::new(Mutex::new(Some(conn))),
            lease: Mutex::new(Some(lease)),
            in_transaction: self.in_transaction.clone(),
        }))
    }

    async fn is_valid(&self) -> bool {
        match self.slot.try_lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(conn) => conn.ping().await.is_ok(),
                None => false,
            },
            // busy with a statement or a transaction
            Err(_) => true,
        }
    }

    async fn close(&self) -> Result<()> {
        if let Some(conn) = self.slot.lock().await.take() {
            conn.disconnect()
                .await
                .map_err(|e| Error::connection(format!("failed to close connection: {e}")))?;
        }
        Ok(())
    }
}

/// Server-side prepared statement
pub struct MySqlStatement {
    slot: Slot,
    stmt: Statement,
    sql: String,
}

#[async_trait]
impl PreparedStatement for MySqlStatement {
    async fn execute(&self, values: &[Value]) -> Result<ExecResult> {
        let mut guard = self.slot.lock().await;
        let conn = session(&mut guard)?;
        conn.exec_drop(&self.stmt, params(values))
            .await
            .map_err(|e| driver_error(e, &self.sql))?;
        Ok(exec_result(conn))
    }

    async fn query(&self, values: &[Value]) -> Result<Vec<Row>> {
        let mut guard = self.slot.lock().await;
        let conn = session(&mut guard)?;
        let rows: Vec<mysql_async::Row> = conn
            .exec(&self.stmt, params(values))
            .await
            .map_err(|e| driver_error(e, &self.sql))?;
        Ok(convert_rows(rows))
    }

    fn sql(&self) -> &str {
        &self.sql
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.slot.lock().await;
        match guard.as_mut() {
            Some(conn) => conn
                .close(self.stmt.clone())
                .await
                .map_err(|e| driver_error(e, &self.sql)),
            // the session moved on; its statements went with it
            None => Ok(()),
        }
    }
}

/// MySQL transaction
///
/// Holds the session connection until commit or rollback, then hands it
/// back to the owning [`MySqlConnection`]. Other users of that connection,
/// including a second `begin`, wait until then.
pub struct MySqlTransaction {
    slot: Slot,
    lease: Mutex<Option<OwnedMutexGuard<Option<Conn>>>>,
    in_transaction: Arc<AtomicBool>,
}

impl MySqlTransaction {
    async fn end(&self, sql: &str) -> Result<()> {
        let mut conn = self
            .slot
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::transaction("transaction already completed"))?;
        let outcome = conn.query_drop(sql).await;
        if let Some(mut lease) = self.lease.lock().await.take() {
            *lease = Some(conn);
        }
        self.in_transaction.store(false, Ordering::SeqCst);
        outcome.map_err(|e| Error::transaction(format!("{sql} failed: {e}")))
    }
}

impl Drop for MySqlTransaction {
    fn drop(&mut self) {
        let conn = self.slot.try_lock().ok().and_then(|mut guard| guard.take());
        let lease = self.lease.get_mut().take();
        let (Some(mut conn), Some(mut lease)) = (conn, lease) else {
            return;
        };
        warn!("MySQL transaction dropped without commit or rollback");
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let in_transaction = self.in_transaction.clone();
        handle.spawn(async move {
            if let Err(e) = conn.query_drop("ROLLBACK").await {
                warn!(error = %e, "rollback of dropped MySQL transaction failed");
            }
            *lease = Some(conn);
            in_transaction.store(false, Ordering::SeqCst);
        });
    }
}

#[async_trait]
impl Transaction for MySqlTransaction {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        run_query(&self.slot, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        run_execute(&self.slot, sql, params).await
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        run_prepare(&self.slot, sql).await
    }

    async fn commit(&self) -> Result<()> {
        self.end("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.end("ROLLBACK").await
    }
}

/// Creates [`MySqlConnection`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnectionFactory;

#[async_trait]
impl ConnectionFactory for MySqlConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(MySqlConnection::connect(config).await?))
    }
}
