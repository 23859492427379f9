//! Batched insert engine
//!
//! Provides:
//! - [`Inserter`]: multi-row INSERT of typed records with identity back-fill
//! - [`Session`]: per (record type, batch size) statement shape, cached
//! - [`InsertResult`]: affected rows and the last observed identity
//!
//! Records are bound into a flat value buffer, `batch_size` tuples at a
//! time. Full batches share one prepared statement; a shorter tail batch
//! gets its own. Zero identities are sent as `NULL` and read back either
//! through the driver's last insert id or through `RETURNING`, unless a
//! preset strategy reserved them up front.

use crate::connection::{close_statement, finish, Connection, Executor, PreparedStatement};
use crate::context::{cancellable, check, Context};
use crate::dialect::{detect_dialect, lookup_dialect, Dialect, PresetIdStrategy};
use crate::error::{Error, Result};
use crate::mapping::{identity_value, is_zero_identity, map_entity, Entity, Mapping, TagMapper};
use crate::options::Options;
use crate::security::{validate_qualified_name, validate_sql_identifier};
use crate::sequencer::{Sequencer, TransientInsert};
use crate::sql::{DefaultsBuilder, InsertBuilder, POSITION_COLUMN};
use crate::types::Value;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of [`Inserter::exec`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertResult {
    /// Rows written
    pub rows_affected: u64,
    /// Highest identity reported by the driver or reserved up front, 0 if none
    pub last_insert_id: i64,
}

/// Generator-tagged columns resolved through a defaults SELECT
#[derive(Debug, Clone)]
struct Defaults {
    builder: DefaultsBuilder,
    /// Field index of each defaulted column, in builder order
    fields: Vec<usize>,
}

/// Statement shape for one (record type, batch size)
///
/// Shared by concurrent calls; every call owns its own transaction and
/// statement handles.
#[derive(Debug)]
pub struct Session {
    table: String,
    batch_size: usize,
    mapping: Mapping,
    builder: InsertBuilder,
    defaults: Option<Defaults>,
}

impl Session {
    fn new<R: Entity>(table: &str, dialect: &Dialect, options: &Options) -> Result<Self> {
        let mapper = options
            .column_mapper
            .clone()
            .unwrap_or_else(|| Arc::new(TagMapper));
        let mapping = map_entity::<R>(mapper.as_ref(), options.tag(), options.identity.as_deref())?;
        for column in &mapping.columns {
            validate_sql_identifier(column.name())?;
        }

        let batch_size = if dialect.supports_multi_values() {
            options.batch_size()
        } else {
            1
        };
        let names = mapping.columns.names();
        let mut builder = InsertBuilder::new(table, &names, dialect.placeholders(), batch_size)?;
        if let Some(tail) = &options.on_duplicate_key_sql {
            builder = builder.with_suffix(tail.clone());
        }

        let mut defaulted = Vec::new();
        let mut fields = Vec::new();
        for (i, column) in mapping.columns.iter().enumerate() {
            if let (Some(expr), Some(field)) = (column.default_expression(), mapping.binder.field(i)) {
                defaulted.push((column.name().to_string(), expr.to_string()));
                fields.push(field);
            }
        }
        let defaults = if defaulted.is_empty() {
            None
        } else {
            Some(Defaults {
                builder: DefaultsBuilder::new(&defaulted, dialect.placeholders(), batch_size)?,
                fields,
            })
        };

        debug!(
            table = %table,
            record = R::type_name(),
            batch = batch_size,
            columns = names.len(),
            "insert session created"
        );
        Ok(Self {
            table: table.to_string(),
            batch_size,
            mapping,
            builder,
            defaults,
        })
    }

    /// Target table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Tuples per statement
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Resolved columns and binder
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    fn identity(&self) -> Option<(usize, &str)> {
        let pos = self.mapping.columns.autoincrement()?;
        Some((pos, self.mapping.columns[pos].name()))
    }
}

/// Cache key covering every option baked into a [`Session`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    record: TypeId,
    batch_size: usize,
    tag: String,
    identity: Option<String>,
    on_duplicate_key_sql: Option<String>,
    /// Address of an explicit column mapper
    mapper: Option<usize>,
}

impl SessionKey {
    fn new<R: Entity>(options: &Options) -> Self {
        Self {
            record: TypeId::of::<R>(),
            batch_size: options.batch_size(),
            tag: options.tag().to_string(),
            identity: options.identity.clone(),
            on_duplicate_key_sql: options.on_duplicate_key_sql.clone(),
            mapper: options
                .column_mapper
                .as_ref()
                .map(|m| Arc::as_ptr(m) as *const () as usize),
        }
    }
}

/// Running counters of one `exec` call
#[derive(Default)]
struct Progress {
    rows_affected: u64,
    last_insert_id: i64,
}

/// Batched insert engine bound to a table
pub struct Inserter {
    db: Arc<dyn Connection>,
    table: String,
    dialect: Arc<Dialect>,
    options: Options,
    sequencer: Sequencer,
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
}

impl std::fmt::Debug for Inserter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inserter")
            .field("table", &self.table)
            .field("dialect", &self.dialect.name)
            .field("options", &self.options)
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

impl Inserter {
    /// Engine for `table`; detects the dialect unless `options` carry one
    ///
    /// No statement is prepared until the first [`exec`](Self::exec).
    pub async fn new(
        ctx: &Context,
        db: Arc<dyn Connection>,
        table: impl Into<String>,
        options: Options,
    ) -> Result<Self> {
        let table = table.into();
        validate_qualified_name(&table)?;
        let (product, dialect) = match (&options.product, &options.dialect) {
            (Some(p), Some(d)) => (p.clone(), d.clone()),
            (Some(p), None) => (p.clone(), lookup_dialect(&p.name)?),
            (None, _) => {
                let (p, d) = detect_dialect(ctx, &Executor::Connection(db.clone())).await?;
                (p, options.dialect.clone().unwrap_or(d))
            }
        };
        let sequencer = Sequencer::new(db.clone(), product, dialect.clone());
        Ok(Self {
            db,
            table,
            dialect,
            options,
            sequencer,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Target table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Dialect in use
    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.dialect
    }

    /// Engine-level options
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Session for `R` and the shaping options, cached unless disabled
    ///
    /// Batch size, tag, identity column, upsert tail and column mapper all
    /// select a distinct session.
    pub fn session<R: Entity>(&self, options: &Options) -> Result<Arc<Session>> {
        if !options.use_meta_session_cache() {
            return Session::new::<R>(&self.table, &self.dialect, options).map(Arc::new);
        }
        let key = SessionKey::new::<R>(options);
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get(&key) {
            return Ok(session.clone());
        }
        let session = Arc::new(Session::new::<R>(&self.table, &self.dialect, options)?);
        sessions.insert(key, session.clone());
        Ok(session)
    }

    /// Insert `records`, writing assigned identities back into them
    ///
    /// `options` overlay the engine options for this call.
    pub async fn exec<R: Entity>(
        &self,
        ctx: &Context,
        records: &mut [R],
        options: Option<Options>,
    ) -> Result<InsertResult> {
        check(ctx)?;
        if records.is_empty() {
            return Ok(InsertResult::default());
        }
        let options = match &options {
            Some(o) => self.options.merge(o),
            None => self.options.clone(),
        };
        let session = self.session::<R>(&options)?;
        let mut progress = Progress::default();

        if let Some(last) = self.preset_identities(ctx, &session, records, &options).await? {
            progress.last_insert_id = last;
        }

        let local = match &options.transaction {
            None if self.dialect.transactional => {
                Some(cancellable(ctx, self.db.begin()).await?)
            }
            _ => None,
        };
        let db = match (&local, &options.transaction) {
            (Some(tx), _) | (None, Some(tx)) => Executor::Transaction(tx.clone()),
            (None, None) => Executor::Connection(self.db.clone()),
        };

        let outcome = self.write(ctx, &db, &session, records, &mut progress).await;
        match local {
            Some(tx) => finish(tx.as_ref(), outcome).await?,
            None => outcome?,
        }

        info!(
            table = %self.table,
            rows = progress.rows_affected,
            last_insert_id = progress.last_insert_id,
            "insert complete"
        );
        Ok(InsertResult {
            rows_affected: progress.rows_affected,
            last_insert_id: progress.last_insert_id,
        })
    }

    /// Reserve identities for zero-identity records and assign them
    ///
    /// Runs when the call asks for a preset strategy, or when the dialect
    /// has one and cannot report generated identities itself.
    async fn preset_identities<R: Entity>(
        &self,
        ctx: &Context,
        session: &Session,
        records: &mut [R],
        options: &Options,
    ) -> Result<Option<i64>> {
        let Some((pos, identity)) = session.identity() else {
            return Ok(None);
        };
        let reports_ids = self.dialect.can_return_last_insert_id || self.dialect.supports_returning();
        let strategy = match options.preset_id_strategy {
            PresetIdStrategy::Undefined if reports_ids => return Ok(None),
            s => self.dialect.resolve_preset(s),
        };
        if matches!(strategy, PresetIdStrategy::Ignore | PresetIdStrategy::Undefined) {
            return Ok(None);
        }
        let (field_idx, ty) = session
            .mapping
            .binder
            .field(pos)
            .zip(session.mapping.field(pos).map(|f| f.ty))
            .ok_or_else(|| Error::mapping(format!("no field backs identity {identity}")))?;
        let zero: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| is_zero_identity(&r.get(field_idx)))
            .map(|(i, _)| i)
            .collect();
        let Some(&first) = zero.first() else {
            return Ok(None);
        };

        let width = session.mapping.columns.len();
        let mut template = vec![Value::Null; width];
        session.mapping.binder.bind(&records[first], &mut template, 0, width)?;
        let probe_sql = session.builder.build(1, &self.dialect, None)?.into_owned();
        let probe = move |id: i64| -> Result<(String, Vec<Value>)> {
            let mut args = template.clone();
            args[pos] = Value::Int64(id);
            Ok((probe_sql.clone(), args))
        };
        let probe: &dyn TransientInsert = &probe;

        let reserve_opts = options
            .clone()
            .with_preset_id_strategy(strategy)
            .with_record_count(zero.len() as i64);
        let reservation = self
            .sequencer
            .reserve(ctx, &self.table, identity, &reserve_opts, Some(probe))
            .await?;
        for (&i, id) in zero.iter().zip(reservation.ids()) {
            records[i].set(field_idx, identity_value(ty, id)?)?;
        }
        debug!(
            table = %self.table,
            strategy = %strategy,
            first = reservation.first,
            count = zero.len(),
            "preset identities assigned"
        );
        Ok(Some(reservation.last()))
    }

    /// Defaults, then full batches, then the tail
    async fn write<R: Entity>(
        &self,
        ctx: &Context,
        db: &Executor,
        session: &Session,
        records: &mut [R],
        progress: &mut Progress,
    ) -> Result<()> {
        if let Some(defaults) = &session.defaults {
            self.apply_defaults(ctx, db, session, defaults, records).await?;
        }

        let batch = session.batch_size;
        let returning = self.returning(session);
        let mut values = vec![Value::Null; batch * session.mapping.columns.len()];
        let mut full: Option<Box<dyn PreparedStatement>> = None;

        let outcome = async {
            for chunk in records.chunks_mut(batch) {
                if chunk.len() == batch {
                    let stmt = match full.take() {
                        Some(stmt) => stmt,
                        None => {
                            let sql = session.builder.build(batch, &self.dialect, returning)?;
                            debug!(table = %self.table, batch, "preparing insert");
                            cancellable(ctx, db.prepare(&sql)).await?
                        }
                    };
                    let res = self
                        .flush(ctx, session, stmt.as_ref(), &mut values, chunk, progress)
                        .await;
                    full = Some(stmt);
                    res?;
                } else {
                    let sql = session.builder.build(chunk.len(), &self.dialect, returning)?;
                    debug!(table = %self.table, batch = chunk.len(), "preparing tail insert");
                    let tail = cancellable(ctx, db.prepare(&sql)).await?;
                    let res = self
                        .flush(ctx, session, tail.as_ref(), &mut values, chunk, progress)
                        .await;
                    close_statement(tail.as_ref()).await;
                    res?;
                }
            }
            Ok::<_, Error>(())
        }
        .await;

        if let Some(stmt) = full {
            close_statement(stmt.as_ref()).await;
        }
        outcome
    }

    /// Identity column name when identities come back through `RETURNING`
    fn returning<'a>(&self, session: &'a Session) -> Option<&'a str> {
        session
            .identity()
            .filter(|_| !self.dialect.can_return_last_insert_id && self.dialect.supports_returning())
            .map(|(_, name)| name)
    }

    /// Bind one chunk, execute it and back-fill database-assigned identities
    async fn flush<R: Entity>(
        &self,
        ctx: &Context,
        session: &Session,
        stmt: &dyn PreparedStatement,
        values: &mut [Value],
        chunk: &mut [R],
        progress: &mut Progress,
    ) -> Result<()> {
        let width = session.mapping.columns.len();
        let identity = session.identity().map(|(pos, _)| pos);
        let mut pending = Vec::new();
        for (i, (record, out)) in chunk.iter().zip(values.chunks_mut(width)).enumerate() {
            session.mapping.binder.bind(record, out, 0, width)?;
            if let Some(pos) = identity {
                if is_zero_identity(&out[pos]) {
                    out[pos] = Value::Null;
                    pending.push(i);
                }
            }
        }
        let args = &values[..chunk.len() * width];

        if self.returning(session).is_some() {
            let rows = cancellable(ctx, stmt.query(args)).await?;
            progress.rows_affected += rows.len() as u64;
            if let Some(pos) = identity {
                for &i in &pending {
                    if let Some(id) = rows.get(i).and_then(|r| r.get(0)).and_then(Value::as_i64) {
                        self.assign(session, pos, &mut chunk[i], id)?;
                    }
                }
            }
            debug!(table = %self.table, rows = rows.len(), "flushed with returning");
            return Ok(());
        }

        let result = cancellable(ctx, stmt.execute(args)).await?;
        progress.rows_affected += result.rows_affected;
        let last = match (identity, result.last_insert_id) {
            (Some(_), Some(id)) if self.dialect.can_return_last_insert_id => id,
            _ => {
                debug!(table = %self.table, rows = result.rows_affected, "flushed");
                return Ok(());
            }
        };
        progress.last_insert_id = progress.last_insert_id.max(last);

        // Ids handed out by the server are dense and end at `last`; with
        // explicit ids in the same batch they cannot be derived.
        let base = last - pending.len() as i64;
        if base < 0 || pending.len() != chunk.len() {
            debug!(table = %self.table, last, pending = pending.len(), "identity back-fill skipped");
        } else if let Some(pos) = identity {
            for (n, &i) in pending.iter().enumerate() {
                self.assign(session, pos, &mut chunk[i], base + n as i64 + 1)?;
            }
        }
        debug!(table = %self.table, rows = result.rows_affected, last_insert_id = last, "flushed");
        Ok(())
    }

    fn assign<R: Entity>(&self, session: &Session, pos: usize, record: &mut R, id: i64) -> Result<()> {
        let field = session
            .mapping
            .field(pos)
            .ok_or_else(|| Error::mapping("identity column has no backing field"))?;
        let idx = session.mapping.binder.field(pos).unwrap_or(0);
        record.set(idx, identity_value(field.ty, id)?)
    }

    /// Resolve generator-tagged columns through the defaults SELECT
    async fn apply_defaults<R: Entity>(
        &self,
        ctx: &Context,
        db: &Executor,
        session: &Session,
        defaults: &Defaults,
        records: &mut [R],
    ) -> Result<()> {
        let arity = defaults.builder.arity();
        for chunk in records.chunks_mut(session.batch_size) {
            let mut args = Vec::with_capacity(chunk.len() * arity);
            for (i, record) in chunk.iter().enumerate() {
                for &field in &defaults.fields {
                    let value = record.get(field);
                    args.push(if is_unset(&value) { Value::Null } else { value });
                }
                args.push(Value::Int64(i as i64));
            }
            let sql = defaults.builder.build(chunk.len())?;
            let rows = cancellable(ctx, db.query(sql, &args)).await?;
            for row in rows {
                let pos = row
                    .get_by_name(POSITION_COLUMN)
                    .and_then(Value::as_i64)
                    .and_then(|p| usize::try_from(p).ok())
                    .ok_or_else(|| Error::mapping(format!("defaults row without {POSITION_COLUMN}")))?;
                let record = chunk
                    .get_mut(pos)
                    .ok_or_else(|| Error::mapping(format!("defaults row position {pos} out of range")))?;
                for (j, &field) in defaults.fields.iter().enumerate() {
                    if let Some(value) = row.get(j) {
                        record.set(field, value.clone())?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Value the defaults SELECT should replace
fn is_unset(value: &Value) -> bool {
    match value {
        Value::String(s) => s.is_empty(),
        Value::Uuid(u) => u.is_nil(),
        other => is_zero_identity(other),
    }
}
