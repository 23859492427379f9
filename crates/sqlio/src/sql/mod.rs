//! SQL statement builders
//!
//! Pure functions and prebuilt buffers producing the statements the engine
//! runs. Nothing in this module touches a database.
//!
//! - [`InsertBuilder`]: multi-row `INSERT` sized to a batch, truncatable
//! - [`DefaultsBuilder`]: `SELECT COALESCE(?, <default>) ... UNION ...`
//! - [`load_sql`]: `LOAD DATA LOCAL INFILE` for a registered reader
//! - [`update_sql`], [`delete_sql`], [`expand_table_pattern`]: merge helpers

mod defaults;
mod insert;
mod load;
mod merge;

pub use defaults::{DefaultsBuilder, POSITION_COLUMN};
pub use insert::InsertBuilder;
pub use load::{load_sql, LoadMode, LoadOptions};
pub use merge::{delete_sql, expand_table_pattern, expand_transient, update_sql};

/// Byte offsets just past each tuple of a prebuilt statement
///
/// `ends[i]` is the length of the statement holding `i + 1` tuples.
pub(crate) type TupleEnds = Vec<usize>;

/// Prefix of `sql` holding `requested` tuples
pub(crate) fn prefix<'a>(sql: &'a str, ends: &[usize], requested: usize) -> Option<&'a str> {
    if requested == 0 {
        return None;
    }
    ends.get(requested - 1).map(|&end| &sql[..end])
}
