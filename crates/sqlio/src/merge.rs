//! Merge executor
//!
//! Reconciles a source record set with a destination table. Source and
//! destination rows are aligned by a caller-computed [`MatchKey`]; the
//! differences become up to three data sets (insert, update, delete) that
//! are applied inside one transaction.
//!
//! Each operation runs with its own [`OperationStrategy`]:
//!
//! - `batched`: multi-row INSERT, per-row UPDATE, `DELETE ... IN (..)`
//! - `with_transient`: bulk-load the data set into a staging table, then
//!   run the operation SQL referencing `${Transient}`
//! - `by_load`: bulk-load straight into the destination (insert only)
//! - `with_transient_upsert`: staging load followed by upsert SQL
//!
//! Staging tables are prepared before the main transaction opens; a failure
//! there leaves the destination untouched.

use crate::connection::{close_statement, finish, Connection, Executor, Transaction};
use crate::context::{cancellable, check, Context};
use crate::dialect::{detect_dialect, lookup_dialect, Dialect, Product, UpsertShape};
use crate::error::{Error, Result};
use crate::insert::Inserter;
use crate::load::Loader;
use crate::mapping::{is_zero_identity, map_entity, Entity, Mapping, TagMapper};
use crate::options::Options;
use crate::reader::Reader;
use crate::security::{validate_qualified_name, validate_sql_identifier};
use crate::sql::{delete_sql, expand_table_pattern, expand_transient, update_sql, LoadMode, LoadOptions};
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How source and destination differences are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Insert missing rows, delete extra rows
    #[default]
    InsDel,
    /// Like `InsDel`, updating rows whose identity matches but key differs
    InsUpdDel,
    /// Inserts and updates collapsed into one upsert
    UpsDel,
}

/// Execution strategy of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStrategy {
    /// Load into a staging table, then run the operation SQL
    WithTransient,
    /// Load directly into the destination
    ByLoad,
    /// Statements bound from records
    #[default]
    Batched,
    /// Load into a staging table, then run upsert SQL
    WithTransientUpsert,
}

impl OperationStrategy {
    fn uses_transient(self) -> bool {
        matches!(self, Self::WithTransient | Self::WithTransientUpsert)
    }
}

/// DML operation of a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Insert source-only rows
    Insert,
    /// Update rows matched by identity
    Update,
    /// Delete destination-only rows
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Default execution order
pub const DEFAULT_ORDER: [Operation; 3] = [Operation::Delete, Operation::Update, Operation::Insert];

/// Staging table of one operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Transient {
    /// Name pattern with `${Table}` and `${Rand}` tokens
    pub name: String,
    /// Statements run before loading, with `${Table}` and `${Transient}` expanded
    pub init_sql: Vec<String>,
    /// Load delimiters
    pub load: LoadOptions,
}

impl Transient {
    /// Staging table named by `pattern`
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            name: pattern.into(),
            ..Default::default()
        }
    }

    /// Add an initialisation statement
    pub fn with_init_sql(mut self, sql: impl Into<String>) -> Self {
        self.init_sql.push(sql.into());
        self
    }

    /// Set load delimiters
    pub fn with_load(mut self, load: LoadOptions) -> Self {
        self.load = load;
        self
    }
}

/// Configuration of one operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    /// Operation SQL for staging strategies
    pub sql: Option<String>,
    /// Staging table
    pub transient: Option<Transient>,
    /// Execution strategy
    pub strategy: OperationStrategy,
    /// Insert options for batched inserts
    #[serde(skip)]
    pub options: Options,
}

impl OperationConfig {
    /// Operation with `strategy`
    pub fn new(strategy: OperationStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    /// Set the operation SQL
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Set the staging table
    pub fn with_transient(mut self, transient: Transient) -> Self {
        self.transient = Some(transient);
        self
    }

    /// Set insert options
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
}

/// Logical key and identity of a record
#[derive(Debug, Clone, PartialEq)]
pub struct MatchKey {
    /// Key aligning source and destination rows
    pub key: String,
    /// Primary key value; zero or NULL when not yet assigned
    pub identity: Value,
}

impl MatchKey {
    /// Key with identity
    pub fn new(key: impl Into<String>, identity: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            identity: identity.into(),
        }
    }
}

/// Computes the match key of a record
pub type MatchKeyFn<R> = Arc<dyn Fn(&R) -> Result<MatchKey> + Send + Sync>;

/// Creates an empty record for destination rows
pub type NewRowFn<R> = Arc<dyn Fn() -> R + Send + Sync>;

/// Merge configuration
pub struct MergeConfig<R> {
    /// Destination table
    pub table: String,
    /// Identity column
    pub identity: String,
    /// Difference handling
    pub strategy: MergeStrategy,
    /// Match key of source and destination records
    pub match_key: MatchKeyFn<R>,
    /// Empty record factory
    pub new_row: NewRowFn<R>,
    /// Query reading the destination
    pub fetch_sql: String,
    /// Insert operation
    pub insert: OperationConfig,
    /// Update operation
    pub update: OperationConfig,
    /// Delete operation
    pub delete: OperationConfig,
    /// Execution order, defaults to [`DEFAULT_ORDER`]
    pub order: Vec<Operation>,
}

impl<R> Clone for MergeConfig<R> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            identity: self.identity.clone(),
            strategy: self.strategy,
            match_key: self.match_key.clone(),
            new_row: self.new_row.clone(),
            fetch_sql: self.fetch_sql.clone(),
            insert: self.insert.clone(),
            update: self.update.clone(),
            delete: self.delete.clone(),
            order: self.order.clone(),
        }
    }
}

impl<R> fmt::Debug for MergeConfig<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeConfig")
            .field("table", &self.table)
            .field("identity", &self.identity)
            .field("strategy", &self.strategy)
            .field("fetch_sql", &self.fetch_sql)
            .field("insert", &self.insert)
            .field("update", &self.update)
            .field("delete", &self.delete)
            .field("order", &self.order)
            .finish()
    }
}

impl<R: Entity + Default> MergeConfig<R> {
    /// Config for `table` reading the destination with `fetch_sql`
    pub fn new<F>(table: impl Into<String>, fetch_sql: impl Into<String>, match_key: F) -> Self
    where
        F: Fn(&R) -> Result<MatchKey> + Send + Sync + 'static,
    {
        Self {
            table: table.into(),
            identity: "id".into(),
            strategy: MergeStrategy::default(),
            match_key: Arc::new(match_key),
            new_row: Arc::new(R::default),
            fetch_sql: fetch_sql.into(),
            insert: OperationConfig::default(),
            update: OperationConfig::default(),
            delete: OperationConfig::default(),
            order: DEFAULT_ORDER.to_vec(),
        }
    }
}

impl<R> MergeConfig<R> {
    /// Set the strategy
    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the identity column
    pub fn with_identity(mut self, column: impl Into<String>) -> Self {
        self.identity = column.into();
        self
    }

    /// Set the empty record factory
    pub fn with_new_row<F>(mut self, f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        self.new_row = Arc::new(f);
        self
    }

    /// Set the insert operation
    pub fn with_insert(mut self, op: OperationConfig) -> Self {
        self.insert = op;
        self
    }

    /// Set the update operation
    pub fn with_update(mut self, op: OperationConfig) -> Self {
        self.update = op;
        self
    }

    /// Set the delete operation
    pub fn with_delete(mut self, op: OperationConfig) -> Self {
        self.delete = op;
        self
    }

    /// Set the execution order
    pub fn with_order(mut self, order: Vec<Operation>) -> Self {
        self.order = order;
        self
    }

    fn operation(&self, op: Operation) -> &OperationConfig {
        match op {
            Operation::Insert => &self.insert,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }

    fn validate(&self) -> Result<()> {
        validate_qualified_name(&self.table)?;
        validate_sql_identifier(&self.identity)?;
        if self.fetch_sql.trim().is_empty() {
            return Err(Error::merge("fetch SQL is empty"));
        }
        for (i, op) in self.order.iter().enumerate() {
            if self.order[..i].contains(op) {
                return Err(Error::merge(format!("operation {op} listed twice")));
            }
        }
        for op in [Operation::Insert, Operation::Update, Operation::Delete] {
            let cfg = self.operation(op);
            if cfg.strategy.uses_transient() {
                if cfg.transient.is_none() {
                    return Err(Error::merge(format!("{op}: {:?} needs a staging table", cfg.strategy)));
                }
                if cfg.sql.is_none() {
                    return Err(Error::merge(format!("{op}: {:?} needs operation SQL", cfg.strategy)));
                }
            }
            if cfg.strategy == OperationStrategy::ByLoad && op != Operation::Insert {
                return Err(Error::merge(format!("{op}: by_load applies to inserts only")));
            }
        }
        Ok(())
    }
}

/// Counters of a merge run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Rows inserted
    pub inserted: u64,
    /// Rows updated
    pub updated: u64,
    /// Rows written by an upsert
    pub upserted: u64,
    /// Rows deleted
    pub deleted: u64,
    /// Rows present on both sides with the same key
    pub unchanged: u64,
    /// Time spent indexing and fetching
    pub fetch_time: Duration,
    /// Time spent per operation, staging included
    pub insert_time: Duration,
    /// Update time
    pub update_time: Duration,
    /// Delete time
    pub delete_time: Duration,
    /// Total time
    pub total_time: Duration,
}

impl MergeResult {
    /// Rows changed by DML
    pub fn affected(&self) -> u64 {
        self.inserted + self.updated + self.upserted + self.deleted
    }

    /// One-line summary
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "merge: inserted={} ({:?}), updated={} ({:?}), deleted={} ({:?}), unchanged={}",
            self.inserted,
            self.insert_time,
            self.updated,
            self.update_time,
            self.deleted,
            self.delete_time,
            self.unchanged
        );
        if self.upserted > 0 {
            let _ = write!(out, ", upserted={}", self.upserted);
        }
        let _ = write!(out, ", fetch={:?}, total={:?}", self.fetch_time, self.total_time);
        out
    }

    fn record(&mut self, op: Operation, rows: u64, elapsed: Duration) {
        match op {
            Operation::Insert => {
                self.inserted += rows;
                self.insert_time += elapsed;
            }
            Operation::Update => {
                self.updated += rows;
                self.update_time += elapsed;
            }
            Operation::Delete => {
                self.deleted += rows;
                self.delete_time += elapsed;
            }
        }
    }
}

/// Data sets produced by the diff
#[derive(Debug)]
struct Diff<R> {
    insert: Vec<R>,
    update: Vec<R>,
    delete: Vec<R>,
    unchanged: u64,
}

impl<R> Diff<R> {
    fn records(&self, op: Operation) -> &[R] {
        match op {
            Operation::Insert => &self.insert,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }

    fn records_mut(&mut self, op: Operation) -> &mut Vec<R> {
        match op {
            Operation::Insert => &mut self.insert,
            Operation::Update => &mut self.update,
            Operation::Delete => &mut self.delete,
        }
    }
}

/// Identity usable as a lookup key
fn identity_key(value: &Value) -> Option<String> {
    (!is_zero_identity(value)).then(|| value.to_string())
}

/// Align source and destination by match key
fn diff<R>(
    strategy: MergeStrategy,
    match_key: &MatchKeyFn<R>,
    src: Vec<R>,
    dst: Vec<R>,
) -> Result<Diff<R>> {
    let key_of = |r: &R| (match_key)(r).map_err(|e| Error::merge(format!("match key: {e}")));

    let mut src_keys = Vec::with_capacity(src.len());
    let mut src_by_key = HashMap::with_capacity(src.len());
    let mut src_by_identity = HashMap::new();
    for (i, record) in src.iter().enumerate() {
        let mk = key_of(record)?;
        if src_by_key.insert(mk.key.clone(), i).is_some() {
            return Err(Error::merge(format!("duplicate source key {}", mk.key)));
        }
        if let Some(id) = identity_key(&mk.identity) {
            src_by_identity.insert(id, mk.key.clone());
        }
        src_keys.push(mk.key);
    }

    let mut unchanged = 0;
    let mut only_dst = Vec::new();
    for record in dst {
        let mk = key_of(&record)?;
        if src_by_key.remove(&mk.key).is_some() {
            unchanged += 1;
        } else {
            only_dst.push((mk.identity, record));
        }
    }

    // destination rows whose identity a source record still carries
    let mut updated = vec![false; src.len()];
    let mut delete = Vec::new();
    for (identity, record) in only_dst {
        let claimed = match strategy {
            MergeStrategy::InsDel => None,
            MergeStrategy::InsUpdDel | MergeStrategy::UpsDel => identity_key(&identity)
                .and_then(|id| src_by_identity.get(&id))
                .and_then(|key| src_by_key.remove(key)),
        };
        match claimed {
            Some(i) => updated[i] = true,
            None => delete.push(record),
        }
    }

    let mut out = Diff {
        insert: Vec::new(),
        update: Vec::new(),
        delete,
        unchanged,
    };
    for ((record, key), is_update) in src.into_iter().zip(src_keys).zip(updated) {
        if is_update {
            out.update.push(record);
        } else if src_by_key.contains_key(&key) {
            out.insert.push(record);
        }
    }
    if strategy == MergeStrategy::UpsDel {
        let updates = std::mem::take(&mut out.update);
        out.insert.extend(updates);
    }
    Ok(out)
}

/// Merge executor bound to one database
pub struct Merger {
    db: Arc<dyn Connection>,
    product: Product,
    dialect: Arc<Dialect>,
    reader: Reader,
}

impl fmt::Debug for Merger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Merger")
            .field("product", &self.product)
            .field("dialect", &self.dialect.name)
            .finish()
    }
}

impl Merger {
    /// Executor; the product comes from `options` or is detected
    pub async fn new(ctx: &Context, db: Arc<dyn Connection>, options: &Options) -> Result<Self> {
        let (product, dialect) = match (&options.product, &options.dialect) {
            (Some(p), Some(d)) => (p.clone(), d.clone()),
            (Some(p), None) => (p.clone(), lookup_dialect(&p.name)?),
            (None, _) => {
                let (p, d) = detect_dialect(ctx, &Executor::Connection(db.clone())).await?;
                (p, options.dialect.clone().unwrap_or(d))
            }
        };
        Ok(Self {
            db,
            product,
            dialect,
            reader: Reader::default(),
        })
    }

    /// Use `reader` for destination fetches
    pub fn with_reader(mut self, reader: Reader) -> Self {
        self.reader = reader;
        self
    }

    /// Merge `src` into the destination described by `config`
    pub async fn exec<R: Entity>(
        &self,
        ctx: &Context,
        src: Vec<R>,
        config: &MergeConfig<R>,
    ) -> Result<MergeResult> {
        check(ctx)?;
        config.validate()?;
        let started = Instant::now();
        let mut result = MergeResult::default();
        let conn = Executor::Connection(self.db.clone());

        let new_row = config.new_row.clone();
        let dst: Vec<R> = self
            .reader
            .read_with(ctx, &conn, &config.fetch_sql, &[], move || new_row())
            .await?;
        let fetched = dst.len();
        let mut data = diff(config.strategy, &config.match_key, src, dst)?;
        result.unchanged = data.unchanged;
        result.fetch_time = started.elapsed();
        debug!(
            table = %config.table,
            fetched,
            insert = data.insert.len(),
            update = data.update.len(),
            delete = data.delete.len(),
            unchanged = data.unchanged,
            "merge diff"
        );

        let mapping = map_entity::<R>(&TagMapper, crate::mapping::DEFAULT_TAG, Some(&config.identity))?;

        // staging tables, outside the main transaction
        let mut staging = HashMap::new();
        for op in config.order.iter().copied() {
            let cfg = config.operation(op);
            if !cfg.strategy.uses_transient() || data.records(op).is_empty() {
                continue;
            }
            let Some(transient) = &cfg.transient else {
                continue;
            };
            let op_started = Instant::now();
            let name = self.stage(ctx, &config.table, transient, data.records(op)).await?;
            result.record(op, 0, op_started.elapsed());
            staging.insert(op, name);
        }

        if data.insert.is_empty() && data.update.is_empty() && data.delete.is_empty() {
            result.total_time = started.elapsed();
            info!(table = %config.table, report = %result.report(), "merge complete");
            return Ok(result);
        }

        let tx = cancellable(ctx, self.db.begin()).await?;
        let outcome = self
            .apply(ctx, tx.clone(), config, &mapping, &mut data, &staging, &mut result)
            .await;
        finish(tx.as_ref(), outcome).await?;

        result.total_time = started.elapsed();
        info!(table = %config.table, report = %result.report(), "merge complete");
        Ok(result)
    }

    /// Create, truncate and fill a staging table
    async fn stage<R: Entity>(
        &self,
        ctx: &Context,
        table: &str,
        transient: &Transient,
        records: &[R],
    ) -> Result<String> {
        let name = expand_table_pattern(&transient.name, table);
        validate_qualified_name(&name)?;
        let conn = Executor::Connection(self.db.clone());
        for sql in &transient.init_sql {
            let sql = expand_transient(sql, table, Some(&name));
            cancellable(ctx, conn.execute(&sql, &[])).await?;
        }
        let loader = Loader::new::<R>(self.dialect.clone(), name.clone(), transient.load.clone())?;
        let rows = loader.load(ctx, &conn, records).await?;
        debug!(table = %table, staging = %name, rows, "staging table loaded");
        Ok(name)
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply<R: Entity>(
        &self,
        ctx: &Context,
        tx: Arc<dyn Transaction>,
        config: &MergeConfig<R>,
        mapping: &Mapping,
        data: &mut Diff<R>,
        staging: &HashMap<Operation, String>,
        result: &mut MergeResult,
    ) -> Result<()> {
        let db = Executor::Transaction(tx.clone());
        for op in config.order.iter().copied() {
            if data.records(op).is_empty() {
                continue;
            }
            let cfg = config.operation(op);
            let op_started = Instant::now();
            let rows = match cfg.strategy {
                OperationStrategy::WithTransient | OperationStrategy::WithTransientUpsert => {
                    let sql = cfg.sql.as_deref().unwrap_or_default();
                    let sql = expand_transient(sql, &config.table, staging.get(&op).map(String::as_str));
                    cancellable(ctx, db.execute(&sql, &[])).await?.rows_affected
                }
                OperationStrategy::ByLoad => {
                    let mut load = cfg
                        .transient
                        .as_ref()
                        .map(|t| t.load.clone())
                        .unwrap_or_default();
                    if config.strategy == MergeStrategy::UpsDel {
                        load.mode = LoadMode::Replace;
                    }
                    Loader::new::<R>(self.dialect.clone(), config.table.clone(), load)?
                        .load(ctx, &db, data.records(op))
                        .await?
                }
                OperationStrategy::Batched => match op {
                    Operation::Insert => {
                        let records = data.records_mut(op);
                        self.batched_insert(ctx, tx.clone(), config, mapping, cfg, records)
                            .await?
                    }
                    Operation::Update => {
                        self.batched_update(ctx, &db, config, mapping, data.records(op))
                            .await?
                    }
                    Operation::Delete => {
                        self.batched_delete(ctx, &db, config, cfg, data.records(op))
                            .await?
                    }
                },
            };
            if op == Operation::Insert && config.strategy == MergeStrategy::UpsDel {
                result.upserted += rows;
                result.insert_time += op_started.elapsed();
            } else {
                result.record(op, rows, op_started.elapsed());
            }
            debug!(table = %config.table, operation = %op, rows, "merge operation applied");
        }
        Ok(())
    }

    async fn batched_insert<R: Entity>(
        &self,
        ctx: &Context,
        tx: Arc<dyn Transaction>,
        config: &MergeConfig<R>,
        mapping: &Mapping,
        cfg: &OperationConfig,
        records: &mut [R],
    ) -> Result<u64> {
        let mut options = cfg
            .options
            .clone()
            .with_product(self.product.clone())
            .with_dialect(self.dialect.clone())
            .with_identity(config.identity.clone());
        if config.strategy == MergeStrategy::UpsDel && options.on_duplicate_key_sql.is_none() {
            options = options.with_on_duplicate_key_sql(self.upsert_tail(mapping, &config.identity)?);
        }
        let inserter = Inserter::new(ctx, self.db.clone(), config.table.clone(), options).await?;
        let res = inserter
            .exec(ctx, records, Some(Options::new().with_transaction(tx)))
            .await?;
        Ok(res.rows_affected)
    }

    /// Upsert tail updating every non-identity column
    fn upsert_tail(&self, mapping: &Mapping, identity: &str) -> Result<String> {
        let columns: Vec<&str> = mapping
            .columns
            .names()
            .into_iter()
            .filter(|c| !c.eq_ignore_ascii_case(identity))
            .collect();
        match self.dialect.upsert {
            UpsertShape::OnDuplicateKey => Ok(format!(
                "ON DUPLICATE KEY UPDATE {}",
                columns
                    .iter()
                    .map(|c| format!("{c}=VALUES({c})"))
                    .collect::<Vec<_>>()
                    .join(",")
            )),
            UpsertShape::OnConflict => Ok(format!(
                "ON CONFLICT ({identity}) DO UPDATE SET {}",
                columns
                    .iter()
                    .map(|c| format!("{c}=EXCLUDED.{c}"))
                    .collect::<Vec<_>>()
                    .join(",")
            )),
            shape => Err(Error::unsupported(format!(
                "batched upsert with {shape:?} on {}",
                self.dialect.name
            ))),
        }
    }

    async fn batched_update<R: Entity>(
        &self,
        ctx: &Context,
        db: &Executor,
        config: &MergeConfig<R>,
        mapping: &Mapping,
        records: &[R],
    ) -> Result<u64> {
        let key = mapping
            .columns
            .position(&config.identity)
            .ok_or_else(|| Error::merge(format!("identity column {} is not mapped", config.identity)))?;
        let names = mapping.columns.names();
        let set: Vec<&str> = names
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key)
            .map(|(_, c)| *c)
            .collect();
        let sql = update_sql(&self.dialect, &config.table, &set, &config.identity)?;
        let width = mapping.columns.len();
        let stmt = cancellable(ctx, db.prepare(&sql)).await?;

        let outcome = async {
            let mut row = vec![Value::Null; width];
            let mut affected = 0;
            for record in records {
                mapping.binder.bind(record, &mut row, 0, width)?;
                let mut args: Vec<Value> = Vec::with_capacity(width);
                args.extend(row.iter().enumerate().filter(|(i, _)| *i != key).map(|(_, v)| v.clone()));
                args.push(row[key].clone());
                affected += cancellable(ctx, stmt.execute(&args)).await?.rows_affected;
            }
            Ok::<_, Error>(affected)
        }
        .await;
        close_statement(stmt.as_ref()).await;
        outcome
    }

    async fn batched_delete<R: Entity>(
        &self,
        ctx: &Context,
        db: &Executor,
        config: &MergeConfig<R>,
        cfg: &OperationConfig,
        records: &[R],
    ) -> Result<u64> {
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let mk = (config.match_key)(record).map_err(|e| Error::merge(format!("match key: {e}")))?;
            if is_zero_identity(&mk.identity) {
                return Err(Error::merge(format!("destination row {} has no identity", mk.key)));
            }
            ids.push(mk.identity);
        }
        let mut affected = 0;
        for chunk in ids.chunks(cfg.options.batch_size().max(100)) {
            let sql = delete_sql(&self.dialect, &config.table, &config.identity, chunk.len())?;
            affected += cancellable(ctx, db.execute(&sql, chunk)).await?.rows_affected;
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Item {
        id: i64,
        key: String,
    }

    crate::impl_entity!(Item {
        id => "name=id,generator=autoincrement",
        key => "name=item_key",
    });

    fn items(rows: &[(i64, &str)]) -> Vec<Item> {
        rows.iter()
            .map(|(id, key)| Item {
                id: *id,
                key: key.to_string(),
            })
            .collect()
    }

    fn by_key() -> MatchKeyFn<Item> {
        Arc::new(|r: &Item| Ok(MatchKey::new(r.key.clone(), r.id)))
    }

    #[test]
    fn test_diff_ins_del() {
        let src = items(&[(0, "k2"), (0, "k4")]);
        let dst = items(&[(1, "k1"), (2, "k2"), (3, "k3")]);
        let d = diff(MergeStrategy::InsDel, &by_key(), src, dst).unwrap();
        assert_eq!(d.insert, items(&[(0, "k4")]));
        assert!(d.update.is_empty());
        assert_eq!(d.delete, items(&[(1, "k1"), (3, "k3")]));
        assert_eq!(d.unchanged, 1);
    }

    #[test]
    fn test_diff_ins_upd_del_claims_by_identity() {
        let src = items(&[(3, "k3-renamed"), (0, "k5")]);
        let dst = items(&[(1, "k1"), (3, "k3")]);
        let d = diff(MergeStrategy::InsUpdDel, &by_key(), src, dst).unwrap();
        assert_eq!(d.update, items(&[(3, "k3-renamed")]));
        assert_eq!(d.insert, items(&[(0, "k5")]));
        assert_eq!(d.delete, items(&[(1, "k1")]));
    }

    #[test]
    fn test_diff_ups_del_collapses() {
        let src = items(&[(3, "k3-renamed"), (0, "k5")]);
        let dst = items(&[(3, "k3")]);
        let d = diff(MergeStrategy::UpsDel, &by_key(), src, dst).unwrap();
        assert!(d.update.is_empty());
        assert_eq!(d.insert.len(), 2);
        assert!(d.delete.is_empty());
    }

    #[test]
    fn test_diff_rejects_duplicates_and_key_errors() {
        let src = items(&[(0, "a"), (0, "a")]);
        let err = diff(MergeStrategy::InsDel, &by_key(), src, Vec::new()).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Merge);

        let failing: MatchKeyFn<Item> = Arc::new(|_| Err(Error::mapping("no key")));
        let err = diff(MergeStrategy::InsDel, &failing, items(&[(0, "a")]), Vec::new()).unwrap_err();
        assert!(err.to_string().contains("no key"));
    }

    #[test]
    fn test_config_validation() {
        let base = MergeConfig::<Item>::new("items", "SELECT * FROM items", |r: &Item| {
            Ok(MatchKey::new(r.key.clone(), r.id))
        });
        assert!(base.validate().is_ok());

        let staged = base
            .clone()
            .with_insert(OperationConfig::new(OperationStrategy::WithTransient));
        assert!(staged.validate().is_err());

        let by_load_delete = base
            .clone()
            .with_delete(OperationConfig::new(OperationStrategy::ByLoad));
        assert!(by_load_delete.validate().is_err());

        let twice = base.with_order(vec![Operation::Insert, Operation::Insert]);
        assert!(twice.validate().is_err());
    }

    #[test]
    fn test_strategy_serde() {
        let s: MergeStrategy = serde_json::from_str("\"ins_upd_del\"").unwrap();
        assert_eq!(s, MergeStrategy::InsUpdDel);
        let op: OperationConfig =
            serde_json::from_str(r#"{"strategy": "with_transient", "sql": "DELETE"}"#).unwrap();
        assert_eq!(op.strategy, OperationStrategy::WithTransient);
    }

    #[test]
    fn test_report() {
        let r = MergeResult {
            inserted: 2,
            deleted: 1,
            unchanged: 4,
            ..Default::default()
        };
        assert_eq!(r.affected(), 3);
        let text = r.report();
        assert!(text.contains("inserted=2"));
        assert!(text.contains("unchanged=4"));
        assert!(!text.contains("upserted"));
    }
}
