//! In-memory MySQL-like database for tests
//!
//! [`MockDatabase`] keeps tables, named locks and a statement log behind one
//! mutex. Connections share it, so concurrent tasks observe each other's
//! writes. Auto-increment counters behave like InnoDB: they are never
//! rolled back. Failures and delays can be injected per statement pattern.
//!
//! A session runs one thing at a time: while a transaction is open, other
//! statements and a second `begin` on the same connection wait for it to
//! finish, as they would on a real server connection.
//!
//! ```rust,ignore
//! use sqlio::testing::MockDatabase;
//!
//! let db = MockDatabase::new();
//! db.create_table("users", &["id", "name"], Some("id"));
//! let conn = db.connect();
//! conn.execute("INSERT INTO users(id,name) VALUES (?,?)", &[0i64.into(), "a".into()])
//!     .await?;
//! assert_eq!(db.row_count("users"), 1);
//! ```

mod engine;

use crate::connection::{Connection, ExecResult, PreparedStatement, Transaction};
use crate::error::{Error, Result};
use crate::types::{Row, Value};
use async_trait::async_trait;
use engine::{is_lock_call, Failure, Outcome, State, Table, Undo};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as SessionLock, OwnedMutexGuard};

/// Poll interval of a blocking `GET_LOCK`
const LOCK_POLL: Duration = Duration::from_millis(5);

struct Inner {
    state: Mutex<State>,
    next_conn: AtomicU64,
}

/// Shared in-memory database
#[derive(Clone)]
pub struct MockDatabase {
    inner: Arc<Inner>,
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.inner.state.lock();
        f.debug_struct("MockDatabase")
            .field("version", &s.version)
            .field("tables", &s.tables.keys().collect::<Vec<_>>())
            .field("statements", &s.log.len())
            .finish()
    }
}

impl MockDatabase {
    /// Empty database reporting a MySQL 8.0 version
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                next_conn: AtomicU64::new(1),
            }),
        }
    }

    /// Report `version` from `SELECT VERSION()`
    pub fn with_version(self, version: impl Into<String>) -> Self {
        self.inner.state.lock().version = version.into();
        self
    }

    /// Create a table; `identity` names the auto-increment column
    pub fn create_table(&self, name: &str, columns: &[&str], identity: Option<&str>) {
        self.inner
            .state
            .lock()
            .tables
            .insert(engine::ident(name), Table::new(columns, identity));
    }

    /// Set the next identity of `table`
    pub fn set_auto_increment(&self, table: &str, next: i64) {
        if let Some(t) = self.inner.state.lock().tables.get_mut(&engine::ident(table)) {
            t.counter = next;
        }
    }

    /// Next identity `table` would assign
    pub fn auto_increment(&self, table: &str) -> i64 {
        self.inner
            .state
            .lock()
            .tables
            .get(&engine::ident(table))
            .map_or(0, |t| t.counter)
    }

    /// Server `auto_increment_increment` and `auto_increment_offset`
    pub fn set_auto_increment_vars(&self, increment: i64, offset: i64) {
        let mut s = self.inner.state.lock();
        s.increment = increment.max(1);
        s.offset = offset;
    }

    /// Insert a row directly, returning its identity
    pub fn insert_row(&self, table: &str, values: Vec<Value>) -> Result<Option<i64>> {
        let mut state = self.inner.state.lock();
        let (columns, identity) = state
            .tables
            .get(&engine::ident(table))
            .map(|t| (t.columns.to_vec(), t.identity.map(|i| t.columns[i].clone())))
            .ok_or_else(|| Error::driver(format!("Table '{table}' doesn't exist")))?;
        let placeholders = vec!["?"; columns.len()].join(",");
        let mut sql = format!("INSERT INTO {table}({}) VALUES ({placeholders})", columns.join(","));
        if let Some(id) = &identity {
            sql.push_str(" RETURNING ");
            sql.push_str(id);
        }
        Ok(into_rows(state.run(0, &sql, &values, None)?)
            .first()
            .and_then(|r| r.get(0))
            .and_then(Value::as_i64))
    }

    /// All rows of `table` in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .state
            .lock()
            .tables
            .get(&engine::ident(table))
            .map(Table::to_rows)
            .unwrap_or_default()
    }

    /// Number of rows in `table`
    pub fn row_count(&self, table: &str) -> usize {
        self.inner
            .state
            .lock()
            .tables
            .get(&engine::ident(table))
            .map_or(0, |t| t.rows.len())
    }

    /// Every executed statement in order
    pub fn statements(&self) -> Vec<String> {
        self.inner.state.lock().log.clone()
    }

    /// Executed statements starting with `prefix` (case-insensitive)
    pub fn count_statements(&self, prefix: &str) -> usize {
        let prefix = prefix.to_ascii_uppercase();
        self.inner
            .state
            .lock()
            .log
            .iter()
            .filter(|s| s.trim_start().to_ascii_uppercase().starts_with(&prefix))
            .count()
    }

    /// Forget logged statements
    pub fn clear_log(&self) {
        self.inner.state.lock().log.clear();
    }

    /// Fail the next `times` statements containing `pattern`
    pub fn fail_on(&self, pattern: impl Into<String>, times: usize) {
        self.push_failure(pattern.into(), times, false);
    }

    /// Like [`fail_on`](Self::fail_on) with a retriable connection error
    pub fn fail_retriable_on(&self, pattern: impl Into<String>, times: usize) {
        self.push_failure(pattern.into(), times, true);
    }

    fn push_failure(&self, pattern: String, remaining: usize, retriable: bool) {
        self.inner.state.lock().failures.push(Failure {
            pattern,
            remaining,
            retriable,
        });
    }

    /// Delay statements containing `pattern`
    pub fn delay_on(&self, pattern: impl Into<String>, delay: Duration) {
        self.inner.state.lock().delays.push((pattern.into(), delay));
    }

    /// Prepared statements not yet closed
    pub fn open_statements(&self) -> i64 {
        self.inner.state.lock().open_statements
    }

    /// Transactions neither committed nor rolled back
    pub fn open_transactions(&self) -> i64 {
        self.inner.state.lock().open_transactions
    }

    /// Most transactions ever open at the same time
    pub fn peak_open_transactions(&self) -> i64 {
        self.inner.state.lock().peak_transactions
    }

    /// Names of held advisory locks
    pub fn held_locks(&self) -> Vec<String> {
        self.inner.state.lock().locks.keys().cloned().collect()
    }

    /// Take a named lock on behalf of an outside session
    pub fn hold_lock(&self, name: &str) -> bool {
        self.inner.state.lock().try_lock(name, u64::MAX)
    }

    /// Release a lock taken with [`hold_lock`](Self::hold_lock)
    pub fn release_lock(&self, name: &str) {
        self.inner.state.lock().locks.remove(name);
    }

    /// Open a new session
    pub fn connect(&self) -> Arc<MockConnection> {
        Arc::new(MockConnection {
            db: self.inner.clone(),
            id: self.inner.next_conn.fetch_add(1, Ordering::Relaxed),
            session: Arc::new(SessionLock::new(())),
            closed: AtomicBool::new(false),
        })
    }
}

/// Run one statement against the shared state
async fn dispatch(
    db: &Inner,
    conn: u64,
    undo: Option<&Mutex<Vec<Undo>>>,
    sql: &str,
    params: &[Value],
) -> Result<Outcome> {
    let delay = {
        let mut s = db.state.lock();
        s.log.push(sql.to_string());
        s.delay_for(sql)
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    if let Some(err) = db.state.lock().take_failure(sql) {
        return Err(err);
    }

    if is_lock_call(sql) {
        let name = params.first().and_then(Value::as_string).unwrap_or_default();
        let wait = params.get(1).and_then(Value::as_i64).unwrap_or(0).max(0);
        let deadline = Instant::now() + Duration::from_secs(wait as u64);
        loop {
            if db.state.lock().try_lock(&name, conn) {
                return Ok(Outcome::Rows(vec![Row::new(
                    vec!["value".to_string()],
                    vec![Value::Int64(1)],
                )]));
            }
            if Instant::now() >= deadline {
                return Ok(Outcome::Rows(vec![Row::new(
                    vec!["value".to_string()],
                    vec![Value::Int64(0)],
                )]));
            }
            tokio::time::sleep(LOCK_POLL).await;
        }
    }

    let mut state = db.state.lock();
    match undo {
        Some(log) => {
            let mut log = log.lock();
            state.run(conn, sql, params, Some(&mut log))
        }
        None => state.run(conn, sql, params, None),
    }
}

fn into_rows(outcome: Outcome) -> Vec<Row> {
    match outcome {
        Outcome::Rows(rows) => rows,
        Outcome::Exec(_) => Vec::new(),
    }
}

fn into_exec(outcome: Outcome) -> ExecResult {
    match outcome {
        Outcome::Rows(rows) => ExecResult::rows(rows.len() as u64),
        Outcome::Exec(r) => r,
    }
}

/// Session on a [`MockDatabase`]
pub struct MockConnection {
    db: Arc<Inner>,
    id: u64,
    session: Arc<SessionLock<()>>,
    closed: AtomicBool,
}

impl MockConnection {
    /// Session id reported by `CONNECTION_ID()`
    pub fn id(&self) -> u64 {
        self.id
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::connection("connection is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.ensure_open()?;
        let _session = self.session.lock().await;
        dispatch(&self.db, self.id, None, sql, params)
            .await
            .map(into_rows)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.ensure_open()?;
        let _session = self.session.lock().await;
        dispatch(&self.db, self.id, None, sql, params)
            .await
            .map(into_exec)
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        self.ensure_open()?;
        let _session = self.session.lock().await;
        Ok(Box::new(MockStatement::open(
            self.db.clone(),
            self.id,
            Binding::Session(self.session.clone()),
            sql,
        )))
    }

    async fn begin(&self) -> Result<Arc<dyn Transaction>> {
        self.ensure_open()?;
        let lease = self.session.clone().lock_owned().await;
        {
            let mut s = self.db.state.lock();
            s.open_transactions += 1;
            s.peak_transactions = s.peak_transactions.max(s.open_transactions);
        }
        Ok(Arc::new(MockTransaction {
            db: self.db.clone(),
            conn: self.id,
            undo: Arc::new(Mutex::new(Vec::new())),
            lease: Mutex::new(Some(lease)),
            done: AtomicBool::new(false),
        }))
    }

    async fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.db.state.lock().release_all(self.id);
        }
        Ok(())
    }
}

/// Transaction on a [`MockDatabase`] session
pub struct MockTransaction {
    db: Arc<Inner>,
    conn: u64,
    undo: Arc<Mutex<Vec<Undo>>>,
    /// Exclusive use of the session until commit or rollback
    lease: Mutex<Option<OwnedMutexGuard<()>>>,
    done: AtomicBool,
}

impl MockTransaction {
    fn ensure_active(&self) -> Result<()> {
        if self.done.load(Ordering::Acquire) {
            return Err(Error::transaction("transaction already finished"));
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        if self.done.swap(true, Ordering::AcqRel) {
            return Err(Error::transaction("transaction already finished"));
        }
        self.db.state.lock().open_transactions -= 1;
        self.lease.lock().take();
        Ok(())
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.ensure_active()?;
        dispatch(&self.db, self.conn, Some(&self.undo), sql, params)
            .await
            .map(into_rows)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.ensure_active()?;
        dispatch(&self.db, self.conn, Some(&self.undo), sql, params)
            .await
            .map(into_exec)
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        self.ensure_active()?;
        Ok(Box::new(MockStatement::open(
            self.db.clone(),
            self.conn,
            Binding::Transaction(self.undo.clone()),
            sql,
        )))
    }

    async fn commit(&self) -> Result<()> {
        if let Some(err) = self.db.state.lock().take_failure("COMMIT") {
            return Err(err);
        }
        self.finish()?;
        self.db.state.lock().log.push("COMMIT".into());
        self.undo.lock().clear();
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.finish()?;
        let undo = std::mem::take(&mut *self.undo.lock());
        let mut state = self.db.state.lock();
        state.log.push("ROLLBACK".into());
        state.rollback(undo);
        Ok(())
    }
}

/// What a prepared statement runs against
enum Binding {
    /// Autocommit on the session, waiting for its transactions
    Session(Arc<SessionLock<()>>),
    /// Inside a transaction, recording undo entries
    Transaction(Arc<Mutex<Vec<Undo>>>),
}

/// Prepared statement on a [`MockDatabase`]
pub struct MockStatement {
    db: Arc<Inner>,
    conn: u64,
    binding: Binding,
    sql: String,
    closed: AtomicBool,
}

impl MockStatement {
    fn open(db: Arc<Inner>, conn: u64, binding: Binding, sql: &str) -> Self {
        db.state.lock().open_statements += 1;
        Self {
            db,
            conn,
            binding,
            sql: sql.to_string(),
            closed: AtomicBool::new(false),
        }
    }

    async fn run(&self, params: &[Value]) -> Result<Outcome> {
        match &self.binding {
            Binding::Session(session) => {
                let _session = session.lock().await;
                dispatch(&self.db, self.conn, None, &self.sql, params).await
            }
            Binding::Transaction(undo) => {
                dispatch(&self.db, self.conn, Some(undo.as_ref()), &self.sql, params).await
            }
        }
    }
}

#[async_trait]
impl PreparedStatement for MockStatement {
    async fn execute(&self, params: &[Value]) -> Result<ExecResult> {
        self.run(params).await.map(into_exec)
    }

    async fn query(&self, params: &[Value]) -> Result<Vec<Row>> {
        self.run(params).await.map(into_rows)
    }

    fn sql(&self) -> &str {
        &self.sql
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.db.state.lock().open_statements -= 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rollback_undoes_rows() {
        let db = MockDatabase::new();
        db.create_table("t", &["id", "name"], Some("id"));
        let conn = db.connect();
        let tx = conn.begin().await.unwrap();
        tx.execute("INSERT INTO t(id,name) VALUES (?,?)", &[Value::Null, "a".into()])
            .await
            .unwrap();
        assert_eq!(db.row_count("t"), 1);
        tx.rollback().await.unwrap();
        assert_eq!(db.row_count("t"), 0);
        assert_eq!(db.auto_increment("t"), 2);
        assert_eq!(db.open_transactions(), 0);
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_locks_are_exclusive() {
        let db = MockDatabase::new();
        let a = db.connect();
        let b = db.connect();
        let get = |c: Arc<MockConnection>| async move {
            c.query("SELECT GET_LOCK(?, ?)", &["l".into(), Value::Int64(0)])
                .await
                .unwrap()[0]
                .get(0)
                .and_then(Value::as_i64)
        };
        assert_eq!(get(a.clone()).await, Some(1));
        assert_eq!(get(b.clone()).await, Some(0));
        a.query("SELECT RELEASE_LOCK(?)", &["l".into()]).await.unwrap();
        assert_eq!(get(b).await, Some(1));
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let db = MockDatabase::new();
        db.create_table("t", &["id"], Some("id"));
        db.fail_on("INSERT", 1);
        let conn = db.connect();
        let sql = "INSERT INTO t(id) VALUES (?)";
        assert!(conn.execute(sql, &[Value::Null]).await.is_err());
        assert!(conn.execute(sql, &[Value::Null]).await.is_ok());
        assert_eq!(db.count_statements("INSERT"), 2);
    }

    #[tokio::test]
    async fn test_session_runs_one_transaction_at_a_time() {
        let db = MockDatabase::new();
        db.create_table("t", &["id"], Some("id"));
        let conn = db.connect();
        let first = conn.begin().await.unwrap();

        let waiting = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.begin().await })
        };
        let autocommit = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.execute("INSERT INTO t(id) VALUES (?)", &[Value::Null]).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiting.is_finished());
        assert!(!autocommit.is_finished());
        assert_eq!(db.open_transactions(), 1);

        first.commit().await.unwrap();
        let second = waiting.await.unwrap().unwrap();
        second.rollback().await.unwrap();
        autocommit.await.unwrap().unwrap();
        assert_eq!(db.row_count("t"), 1);
        assert_eq!(db.peak_open_transactions(), 1);

        // other sessions are not blocked
        let _held = conn.begin().await.unwrap();
        let other = db.connect().begin().await.unwrap();
        other.commit().await.unwrap();
        assert_eq!(db.peak_open_transactions(), 2);
    }

    #[tokio::test]
    async fn test_statement_accounting() {
        let db = MockDatabase::new();
        let conn = db.connect();
        let stmt = conn.prepare("SELECT 1").await.unwrap();
        assert_eq!(db.open_statements(), 1);
        stmt.close().await.unwrap();
        stmt.close().await.unwrap();
        assert_eq!(db.open_statements(), 0);
    }
}
