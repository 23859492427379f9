//! Insert and sequencer options
//!
//! [`Options`] is the enumerated option set accepted by the insert engine,
//! the sequencer and the batcher. Every field is optional so per-call
//! options can be laid over engine-level options with [`Options::merge`].

use crate::connection::Transaction;
use crate::dialect::{Dialect, PresetIdStrategy, Product};
use crate::mapping::{ColumnMapper, DEFAULT_TAG};
use std::sync::Arc;
use std::time::Duration;

/// Default advisory lock wait
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default retry budget for transient reservations
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Option set for inserts and identity reservation
#[derive(Clone, Default)]
pub struct Options {
    /// Records per INSERT statement (default 1)
    pub batch_size: Option<usize>,
    /// Field tag name (default `sqlx`)
    pub tag: Option<String>,
    /// Identity preset strategy (default: dialect's)
    pub preset_id_strategy: PresetIdStrategy,
    /// Auto-increment column when tags do not name one
    pub identity: Option<String>,
    /// Caller-owned transaction
    pub transaction: Option<Arc<dyn Transaction>>,
    /// Explicit dialect, skips detection
    pub dialect: Option<Arc<Dialect>>,
    /// Explicit product, skips detection
    pub product: Option<Product>,
    /// Number of identities to reserve
    pub record_count: Option<i64>,
    /// Reuse the cached insert session for a record type
    pub use_meta_session_cache: Option<bool>,
    /// Upsert tail appended to batched inserts
    pub on_duplicate_key_sql: Option<String>,
    /// Column mapper replacing the tag mapper
    pub column_mapper: Option<Arc<dyn ColumnMapper>>,
    /// Advisory lock wait
    pub lock_timeout: Option<Duration>,
    /// Retry budget for reservations
    pub max_retries: Option<u32>,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("batch_size", &self.batch_size)
            .field("tag", &self.tag)
            .field("preset_id_strategy", &self.preset_id_strategy)
            .field("identity", &self.identity)
            .field("transaction", &self.transaction.is_some())
            .field("dialect", &self.dialect.as_ref().map(|d| d.name.as_str()))
            .field("product", &self.product)
            .field("record_count", &self.record_count)
            .field("use_meta_session_cache", &self.use_meta_session_cache)
            .field("on_duplicate_key_sql", &self.on_duplicate_key_sql)
            .field("column_mapper", &self.column_mapper.is_some())
            .field("lock_timeout", &self.lock_timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Options {
    /// Empty option set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = Some(n);
        self
    }

    /// Set the tag name
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the identity preset strategy
    pub fn with_preset_id_strategy(mut self, strategy: PresetIdStrategy) -> Self {
        self.preset_id_strategy = strategy;
        self
    }

    /// Name the auto-increment column
    pub fn with_identity(mut self, column: impl Into<String>) -> Self {
        self.identity = Some(column.into());
        self
    }

    /// Run inside a caller-owned transaction
    pub fn with_transaction(mut self, tx: Arc<dyn Transaction>) -> Self {
        self.transaction = Some(tx);
        self
    }

    /// Use an explicit dialect
    pub fn with_dialect(mut self, dialect: Arc<Dialect>) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Use an explicit product
    pub fn with_product(mut self, product: Product) -> Self {
        self.product = Some(product);
        self
    }

    /// Set the number of identities to reserve
    pub fn with_record_count(mut self, n: i64) -> Self {
        self.record_count = Some(n);
        self
    }

    /// Toggle the insert session cache
    pub fn with_meta_session_cache(mut self, enabled: bool) -> Self {
        self.use_meta_session_cache = Some(enabled);
        self
    }

    /// Append an upsert tail to inserts
    pub fn with_on_duplicate_key_sql(mut self, sql: impl Into<String>) -> Self {
        self.on_duplicate_key_sql = Some(sql.into());
        self
    }

    /// Replace the tag mapper
    pub fn with_column_mapper(mut self, mapper: Arc<dyn ColumnMapper>) -> Self {
        self.column_mapper = Some(mapper);
        self
    }

    /// Set the advisory lock wait
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Set the reservation retry budget
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Overlay `other` on top of `self`; set fields of `other` win
    pub fn merge(&self, other: &Options) -> Options {
        Options {
            batch_size: other.batch_size.or(self.batch_size),
            tag: other.tag.clone().or_else(|| self.tag.clone()),
            preset_id_strategy: match other.preset_id_strategy {
                PresetIdStrategy::Undefined => self.preset_id_strategy,
                s => s,
            },
            identity: other.identity.clone().or_else(|| self.identity.clone()),
            transaction: other
                .transaction
                .clone()
                .or_else(|| self.transaction.clone()),
            dialect: other.dialect.clone().or_else(|| self.dialect.clone()),
            product: other.product.clone().or_else(|| self.product.clone()),
            record_count: other.record_count.or(self.record_count),
            use_meta_session_cache: other.use_meta_session_cache.or(self.use_meta_session_cache),
            on_duplicate_key_sql: other
                .on_duplicate_key_sql
                .clone()
                .or_else(|| self.on_duplicate_key_sql.clone()),
            column_mapper: other
                .column_mapper
                .clone()
                .or_else(|| self.column_mapper.clone()),
            lock_timeout: other.lock_timeout.or(self.lock_timeout),
            max_retries: other.max_retries.or(self.max_retries),
        }
    }

    /// Effective batch size
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(1).max(1)
    }

    /// Effective tag name
    #[inline]
    pub fn tag(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }

    /// Effective session cache flag
    #[inline]
    pub fn use_meta_session_cache(&self) -> bool {
        self.use_meta_session_cache.unwrap_or(true)
    }

    /// Effective lock wait
    #[inline]
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout.unwrap_or(DEFAULT_LOCK_TIMEOUT)
    }

    /// Effective retry budget
    #[inline]
    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let o = Options::default();
        assert_eq!(o.batch_size(), 1);
        assert_eq!(o.tag(), "sqlx");
        assert_eq!(o.preset_id_strategy, PresetIdStrategy::Undefined);
        assert!(o.use_meta_session_cache());
        assert_eq!(o.max_retries(), 3);
        assert_eq!(Options::new().with_batch_size(0).batch_size(), 1);
    }

    #[test]
    fn test_merge_overlays_set_fields() {
        let base = Options::new()
            .with_batch_size(100)
            .with_tag("db")
            .with_preset_id_strategy(PresetIdStrategy::MaxId);
        let call = Options::new()
            .with_batch_size(10)
            .with_identity("id");

        let merged = base.merge(&call);
        assert_eq!(merged.batch_size(), 10);
        assert_eq!(merged.tag(), "db");
        assert_eq!(merged.preset_id_strategy, PresetIdStrategy::MaxId);
        assert_eq!(merged.identity.as_deref(), Some("id"));
    }

    #[test]
    fn test_debug_hides_handles() {
        let debug = format!("{:?}", Options::new().with_batch_size(5));
        assert!(debug.contains("batch_size: Some(5)"));
        assert!(debug.contains("transaction: false"));
    }
}
