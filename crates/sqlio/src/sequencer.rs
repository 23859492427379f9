//! Identity sequencer
//!
//! Reserves blocks of identities ahead of an insert so records can carry
//! their final primary keys. Provides:
//!
//! - [`Sequencer`]: strategy dispatch (max-id scan, stored function, transient)
//! - [`TransientInsert`]: caller hook producing the single-row probe INSERT
//! - [`ReservationState`]: steps of the transient reservation
//!
//! The transient strategy runs inside its own transaction under a named
//! advisory lock `"<catalog>.<schema>.<table>"`. It inserts one row at the
//! highest identity of the block and rolls back; the auto-increment counter
//! is not rolled back, so the gap belongs to the caller.

use crate::connection::{Connection, Executor};
use crate::context::{self, background, cancellable, Context};
use crate::dialect::{detect_dialect, Dialect, PresetIdStrategy, Product};
use crate::error::{Error, Result};
use crate::metadata::{self, Kind};
use crate::options::Options;
use crate::security::{split_qualified_name, validate_qualified_name, validate_sql_identifier};
use crate::sequence::{Reservation, Sequence};
use crate::types::{Row, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Interval between polls of a non-blocking lock call
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Base delay between reservation retries
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Builds the probe INSERT of a transient reservation
pub trait TransientInsert: Send + Sync {
    /// SQL and arguments of a single-row INSERT writing `id` into the
    /// identity column
    fn build(&self, id: i64) -> Result<(String, Vec<Value>)>;
}

impl<F> TransientInsert for F
where
    F: Fn(i64) -> Result<(String, Vec<Value>)> + Send + Sync,
{
    fn build(&self, id: i64) -> Result<(String, Vec<Value>)> {
        self(id)
    }
}

/// Steps of a transient reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    /// Nothing held
    Idle,
    /// Advisory lock held
    LockAcquired,
    /// Sequence state read
    MetadataRead,
    /// Probe INSERT executed
    InsertIssued,
    /// Reservation transaction rolled back
    RolledBack,
    /// Advisory lock released
    Released,
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::LockAcquired => "lock_acquired",
            Self::MetadataRead => "metadata_read",
            Self::InsertIssued => "insert_issued",
            Self::RolledBack => "rolled_back",
            Self::Released => "released",
        };
        f.write_str(s)
    }
}

/// Logs state transitions of one reservation attempt
struct Trace<'a> {
    lock: &'a str,
    state: ReservationState,
}

impl Trace<'_> {
    fn enter(&mut self, state: ReservationState) {
        debug!(lock = %self.lock, from = %self.state, to = %state, "reservation state");
        self.state = state;
    }
}

/// Identity reservation for one database
pub struct Sequencer {
    db: Arc<dyn Connection>,
    product: Product,
    dialect: Arc<Dialect>,
}

impl fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("product", &self.product)
            .field("dialect", &self.dialect.name)
            .finish()
    }
}

impl Sequencer {
    /// Sequencer for a known product
    pub fn new(db: Arc<dyn Connection>, product: Product, dialect: Arc<Dialect>) -> Self {
        Self {
            db,
            product,
            dialect,
        }
    }

    /// Sequencer with the product taken from `options` or detected
    pub async fn connect(ctx: &Context, db: Arc<dyn Connection>, options: &Options) -> Result<Self> {
        let (product, dialect) = match (&options.product, &options.dialect) {
            (Some(p), Some(d)) => (p.clone(), d.clone()),
            (Some(p), None) => (p.clone(), crate::dialect::lookup_dialect(&p.name)?),
            _ => {
                let (p, d) = detect_dialect(ctx, &Executor::Connection(db.clone())).await?;
                (p, options.dialect.clone().unwrap_or(d))
            }
        };
        Ok(Self::new(db, product, dialect))
    }

    /// Detected product
    pub fn product(&self) -> &Product {
        &self.product
    }

    /// Dialect in use
    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.dialect
    }

    /// Reserve `options.record_count` identities of `table.identity`
    ///
    /// The strategy comes from `options`, defaulting to the dialect's. The
    /// transient strategy requires `probe`. With a caller-owned transaction
    /// the transient strategy falls back to a max-id scan inside it.
    pub async fn reserve(
        &self,
        ctx: &Context,
        table: &str,
        identity: &str,
        options: &Options,
        probe: Option<&dyn TransientInsert>,
    ) -> Result<Reservation> {
        validate_qualified_name(table)?;
        validate_sql_identifier(identity)?;
        let count = options.record_count.unwrap_or(0);
        if count <= 0 {
            return Err(Error::sequencer(format!(
                "record count must be positive, got {count}"
            )));
        }

        let strategy = match self.dialect.resolve_preset(options.preset_id_strategy) {
            PresetIdStrategy::Transient if options.transaction.is_some() => {
                warn!(table = %table, "transient reservation inside a caller transaction, using max-id scan");
                PresetIdStrategy::MaxId
            }
            s => s,
        };
        let reservation = match strategy {
            PresetIdStrategy::MaxId => {
                let db = match &options.transaction {
                    Some(tx) => Executor::Transaction(tx.clone()),
                    None => Executor::Connection(self.db.clone()),
                };
                self.max_id(ctx, &db, table, identity, count).await?
            }
            PresetIdStrategy::Transient => {
                let probe = probe.ok_or_else(|| {
                    Error::config("transient reservation requires a probe insert")
                })?;
                self.transient_with_retry(ctx, table, count, options, probe)
                    .await?
            }
            PresetIdStrategy::Udf => self.udf(ctx, table, count).await?,
            PresetIdStrategy::Ignore | PresetIdStrategy::Undefined => {
                return Err(Error::unsupported(format!(
                    "identity reservation disabled for {} ({strategy})",
                    self.dialect.name
                )))
            }
        };

        if reservation.sequence.max_value > 0 && reservation.last() > reservation.sequence.max_value
        {
            return Err(Error::sequencer(format!(
                "reservation of {count} on {table} exceeds max value {}",
                reservation.sequence.max_value
            )));
        }
        info!(
            table = %table,
            strategy = %strategy,
            first = reservation.first,
            count = reservation.count,
            "reserved identities"
        );
        Ok(reservation)
    }

    /// `SELECT COALESCE(MAX(id), 0)` scan
    async fn max_id(
        &self,
        ctx: &Context,
        db: &Executor,
        table: &str,
        identity: &str,
        count: i64,
    ) -> Result<Reservation> {
        let sql = format!("SELECT COALESCE(MAX({identity}), 0) FROM {table}");
        let rows = cancellable(ctx, db.query(&sql, &[])).await?;
        let max = rows
            .first()
            .and_then(|r| r.get(0))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let sequence = Sequence {
            name: table.to_string(),
            value: max + 1,
            start_value: 1,
            increment_by: 1,
            ..Default::default()
        };
        Reservation::from_sequence(sequence, count)
    }

    /// Database-side counter function
    async fn udf(&self, ctx: &Context, table: &str, count: i64) -> Result<Reservation> {
        let db = Executor::Connection(self.db.clone());
        let args = [Value::from(table), Value::Int64(count)];
        let mut sequence: Sequence =
            metadata::info_one(ctx, &db, &self.product, Kind::SequenceNextValue, &args)
                .await?
                .ok_or_else(|| Error::sequencer(format!("counter function returned no row for {table}")))?;
        if sequence.name.is_empty() {
            sequence.name = table.to_string();
        }
        Reservation::from_sequence(sequence, count)
    }

    async fn transient_with_retry(
        &self,
        ctx: &Context,
        table: &str,
        count: i64,
        options: &Options,
        probe: &dyn TransientInsert,
    ) -> Result<Reservation> {
        let max_retries = options.max_retries();
        let mut attempt = 0;
        loop {
            match self.transient(ctx, table, count, options, probe).await {
                Ok(r) => return Ok(r),
                Err(e) if e.is_retriable() && attempt < max_retries => {
                    attempt += 1;
                    warn!(table = %table, attempt, error = %e, "transient reservation failed, retrying");
                    context::sleep(ctx, RETRY_BACKOFF * attempt).await?;
                }
                Err(e) if e.is_retriable() => {
                    return Err(Error::sequencer(format!(
                        "transient reservation on {table} failed after {attempt} retries: {e}"
                    )))
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `<catalog>.<schema>.<table>` from the session
    async fn lock_name(&self, ctx: &Context, db: &Executor, table: &str) -> Result<String> {
        let (schema, name) = split_qualified_name(table);
        let session = if metadata::has_query(Kind::Session, &self.product) {
            metadata::info_one::<Row>(ctx, db, &self.product, Kind::Session, &[]).await?
        } else {
            None
        };
        let field = |n: &str| {
            session
                .as_ref()
                .and_then(|r| r.get_by_name(n))
                .and_then(Value::as_string)
                .unwrap_or_default()
        };
        let schema = schema.map(str::to_string).unwrap_or_else(|| field("schema_name"));
        Ok(format!("{}.{}.{}", field("catalog_name"), schema, name))
    }

    async fn transient(
        &self,
        ctx: &Context,
        table: &str,
        count: i64,
        options: &Options,
        probe: &dyn TransientInsert,
    ) -> Result<Reservation> {
        let conn = Executor::Connection(self.db.clone());
        let lock = self.lock_name(ctx, &conn, table).await?;
        let mut trace = Trace {
            lock: &lock,
            state: ReservationState::Idle,
        };

        let tx = cancellable(ctx, self.db.begin()).await?;
        let db = Executor::Transaction(tx.clone());

        if let Err(e) = self.acquire_lock(ctx, &db, &lock, options.lock_timeout()).await {
            if let Err(rb) = tx.rollback().await {
                return Err(e.with_rollback(rb));
            }
            return Err(e);
        }
        trace.enter(ReservationState::LockAcquired);

        let result = self
            .probe(ctx, &db, table, count, probe, &mut trace)
            .await;

        let rolled_back = tx.rollback().await;
        trace.enter(ReservationState::RolledBack);
        let released = self.release_lock(&conn, &lock).await;
        trace.enter(ReservationState::Released);

        let result = match (result, rolled_back) {
            (Ok(r), Ok(())) => Ok(r),
            (Ok(_), Err(rb)) => Err(rb),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(rb)) => Err(e.with_rollback(rb)),
        };
        if let Err(e) = released {
            warn!(lock = %lock, error = %e, "failed to release reservation lock");
            result?;
            return Err(e);
        }
        result
    }

    async fn probe(
        &self,
        ctx: &Context,
        db: &Executor,
        table: &str,
        count: i64,
        probe: &dyn TransientInsert,
        trace: &mut Trace<'_>,
    ) -> Result<Reservation> {
        let mut sequence = self.read_sequence(ctx, db, table).await?;
        trace.enter(ReservationState::MetadataRead);

        let first = sequence.min_value(count);
        let id = sequence.compute_next_for_transient(count)?;
        let (sql, args) = probe.build(id)?;
        debug!(table = %table, id, first, "issuing transient insert");

        let fk = metadata::has_query(Kind::ForeignKeyChecksOff, &self.product);
        if fk {
            metadata::exec(ctx, db, &self.product, Kind::ForeignKeyChecksOff, &[]).await?;
        }
        let inserted = cancellable(ctx, db.execute(&sql, &args)).await;
        if fk {
            metadata::exec(&background(), db, &self.product, Kind::ForeignKeyChecksOn, &[])
                .await?;
        }
        inserted?;
        trace.enter(ReservationState::InsertIssued);

        Ok(Reservation {
            sequence,
            first,
            count,
        })
    }

    /// Current auto-increment base with the server offset and increment
    async fn read_sequence(&self, ctx: &Context, db: &Executor, table: &str) -> Result<Sequence> {
        let (schema, name) = split_qualified_name(table);
        let args = [Value::from(schema.unwrap_or_default()), Value::from(name)];
        let mut sequence: Sequence =
            metadata::info_one(ctx, db, &self.product, Kind::Sequences, &args)
                .await?
                .ok_or_else(|| Error::sequencer(format!("no identity sequence for {table}")))?;
        if metadata::has_query(Kind::AutoIncrement, &self.product) {
            if let Some(row) =
                metadata::info_one::<Row>(ctx, db, &self.product, Kind::AutoIncrement, &[]).await?
            {
                if let Some(inc) = row.get_by_name("increment_by").and_then(Value::as_i64) {
                    sequence.increment_by = inc.max(1);
                }
                if let Some(start) = row.get_by_name("start_value").and_then(Value::as_i64) {
                    sequence.start_value = start;
                }
            }
        }
        if sequence.name.is_empty() {
            sequence.name = name.to_string();
        }
        Ok(sequence)
    }

    async fn acquire_lock(
        &self,
        ctx: &Context,
        db: &Executor,
        lock: &str,
        timeout: Duration,
    ) -> Result<()> {
        if !self.dialect.advisory_lock {
            return Err(Error::unsupported(format!(
                "{} has no advisory locks",
                self.dialect.name
            )));
        }
        let deadline = Instant::now() + timeout;
        let args = [
            Value::from(lock),
            Value::Int64(i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX)),
        ];
        loop {
            let acquired: Option<bool> =
                metadata::info_one(ctx, db, &self.product, Kind::LockAcquire, &args).await?;
            if acquired.unwrap_or(false) {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::sequencer(format!(
                    "lock {lock} not acquired within {timeout:?}"
                )));
            }
            context::sleep(ctx, LOCK_POLL_INTERVAL.min(deadline - now)).await?;
        }
    }

    /// Release outside of cancellation
    async fn release_lock(&self, db: &Executor, lock: &str) -> Result<()> {
        let released: Option<bool> = metadata::info_one(
            &background(),
            db,
            &self.product,
            Kind::LockRelease,
            &[Value::from(lock)],
        )
        .await?;
        if !released.unwrap_or(false) {
            warn!(lock = %lock, "lock was not held at release");
        }
        Ok(())
    }
}
