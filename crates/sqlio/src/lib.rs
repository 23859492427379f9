//! # sqlio
//!
//! Batched, dialect-aware relational write engine.
//!
//! The crate turns in-memory records into efficient SQL writes. Everything
//! runs against the [`Connection`](connection::Connection) abstraction, so
//! the same engine drives MySQL, PostgreSQL or the in-memory
//! [`MockDatabase`](testing::MockDatabase).
//!
//! ## Features
//!
//! - **Batched inserts**: multi-row `INSERT` with reused prepared statements
//!   and identity back-fill
//! - **Identity reservation**: transient insert/rollback, UDF, max-id or
//!   sequence based pre-allocation of auto-increment ranges
//! - **Concurrent batching**: many producers share one in-flight batch and
//!   wait on its completion
//! - **Merges**: diff a source set against a table and apply inserts,
//!   updates and deletes in one transaction
//! - **Bulk loads**: `LOAD DATA LOCAL INFILE` from in-memory readers
//! - **Dialect and metadata registry**: product detection, placeholder
//!   styles and per-vendor metadata queries
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sqlio::prelude::*;
//!
//! let ctx = background();
//! let inserter = Inserter::new(&ctx, conn, "users", Options::new().with_batch_size(500)).await?;
//! let result = inserter.exec(&ctx, &mut users, None).await?;
//! println!("inserted {} rows, last id {}", result.rows_affected, result.last_insert_id);
//! ```
//!
//! ## Feature Flags
//!
//! - `mysql` - MySQL/MariaDB driver via mysql_async
//! - `postgres` - PostgreSQL driver via tokio-postgres
//! - `full` - All drivers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod batcher;
pub mod cache;
pub mod connection;
pub mod context;
pub mod dialect;
pub mod error;
pub mod insert;
pub mod load;
pub mod mapping;
pub mod merge;
pub mod metadata;
pub mod options;
pub mod reader;
pub mod security;
pub mod sequence;
pub mod sequencer;
pub mod sql;
pub mod testing;
pub mod types;

// Drivers (conditionally compiled)
#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Prelude module for convenient imports
pub mod prelude {
    // Errors and cancellation
    pub use crate::context::{background, Context};
    pub use crate::error::{Error, ErrorCategory, Result};

    // Values and records
    pub use crate::mapping::{ColumnMapper, Entity, Field, FieldType, TagMapper};
    pub use crate::types::{Column, ColumnSet, Row, Value};

    // Connections
    pub use crate::connection::{
        Connection, ConnectionConfig, ConnectionFactory, ExecResult, Executor, PreparedStatement,
        Transaction,
    };

    // Dialects
    pub use crate::dialect::{
        detect_dialect, lookup_dialect, register_dialect, Dialect, PresetIdStrategy, Product,
    };

    // Engine
    pub use crate::batcher::{Batcher, BatcherConfig, BatcherStats};
    pub use crate::insert::{InsertResult, Inserter};
    pub use crate::load::Loader;
    pub use crate::merge::{
        MatchKey, MergeConfig, MergeResult, MergeStrategy, Merger, Operation, OperationConfig,
        OperationStrategy, Transient,
    };
    pub use crate::options::Options;
    pub use crate::reader::Reader;
    pub use crate::sequence::{Reservation, Sequence};
    pub use crate::sequencer::Sequencer;
    pub use crate::sql::{LoadMode, LoadOptions};
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use types::Value;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _value = Value::Int32(42);
        let _config = ConnectionConfig::new("mysql://localhost/test");
        let _batcher = BatcherConfig::default();
        let _options = Options::new().with_batch_size(10);
        let _strategy = MergeStrategy::default();
    }

    #[test]
    fn test_error_types() {
        let err = Error::connection("refused");
        assert!(err.is_retriable());
        assert_eq!(err.category(), ErrorCategory::Connection);
    }

    #[test]
    fn test_builtin_dialects_registered() {
        for product in ["mysql", "mariadb", "postgresql", "sqlserver", "sqlite"] {
            assert!(lookup_dialect(product).is_ok(), "{product}");
        }
    }
}
