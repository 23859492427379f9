//! Query results into records
//!
//! Result columns are bound to record fields through a [`MapperCache`]
//! plan, so repeated reads of the same shape skip name resolution.

use crate::cache::{default_resolver, MapperCache};
use crate::connection::Executor;
use crate::context::{cancellable, Context};
use crate::error::Result;
use crate::mapping::{ColumnMapper, Entity, TagMapper, DEFAULT_TAG};
use crate::types::{Column, Value};
use std::sync::Arc;
use tracing::trace;

/// Maps query rows onto records
#[derive(Clone)]
pub struct Reader {
    cache: Arc<MapperCache>,
    mapper: Arc<dyn ColumnMapper>,
    tag: String,
}

impl Default for Reader {
    fn default() -> Self {
        Self::new(Arc::new(MapperCache::default()))
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("cache", &self.cache)
            .field("tag", &self.tag)
            .finish()
    }
}

impl Reader {
    /// Reader sharing `cache`, using the tag mapper
    pub fn new(cache: Arc<MapperCache>) -> Self {
        Self {
            cache,
            mapper: Arc::new(TagMapper),
            tag: DEFAULT_TAG.to_string(),
        }
    }

    /// Use `mapper` under tag `tag`
    pub fn with_mapper(mut self, mapper: Arc<dyn ColumnMapper>, tag: impl Into<String>) -> Self {
        self.mapper = mapper;
        self.tag = tag.into();
        self
    }

    /// Plan cache in use
    pub fn cache(&self) -> &Arc<MapperCache> {
        &self.cache
    }

    /// Run `sql` and build one default record per row
    pub async fn read<R: Entity + Default>(
        &self,
        ctx: &Context,
        db: &Executor,
        sql: &str,
        args: &[Value],
    ) -> Result<Vec<R>> {
        self.read_with(ctx, db, sql, args, R::default).await
    }

    /// Run `sql` and fill a record from `new_row` per row
    pub async fn read_with<R, F>(
        &self,
        ctx: &Context,
        db: &Executor,
        sql: &str,
        args: &[Value],
        new_row: F,
    ) -> Result<Vec<R>>
    where
        R: Entity,
        F: Fn() -> R,
    {
        let rows = cancellable(ctx, db.query(sql, args)).await?;
        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };

        let fields = R::fields();
        let mapping = self.mapper.map(&fields, &self.tag)?;
        // column name each field is mapped to
        let names: Vec<String> = (0..fields.len())
            .map(|fi| {
                (0..mapping.columns.len())
                    .find(|&c| mapping.binder.field(c) == Some(fi))
                    .map(|c| mapping.columns[c].name().to_string())
                    .unwrap_or_else(|| fields[fi].name.clone())
            })
            .collect();
        let columns: Vec<Column> = first.columns().iter().map(|n| Column::new(n.clone(), "")).collect();
        let plan = self
            .cache
            .plan(R::type_name(), &columns, &fields, &names, &default_resolver);
        trace!(record = R::type_name(), fingerprint = %plan.fingerprint, "read plan");

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = new_row();
            for (slot, value) in plan.slots.iter().zip(row.into_values()) {
                if let Some(field) = slot.field {
                    record.set(field, value)?;
                }
            }
            out.push(record);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::background;
    use crate::testing::MockDatabase;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Account {
        account_id: i64,
        email: String,
        note: Option<String>,
    }

    crate::impl_entity!(Account {
        account_id => "name=id",
        email => "",
        note => "-",
    });

    #[tokio::test]
    async fn test_read_maps_tagged_and_resolved_columns() {
        let db = MockDatabase::new();
        db.create_table("accounts", &["id", "email", "extra"], Some("id"));
        db.insert_row("accounts", vec![Value::Null, "a@x".into(), "z".into()])
            .unwrap();
        db.insert_row("accounts", vec![Value::Null, "b@x".into(), "z".into()])
            .unwrap();

        let reader = Reader::default();
        let exec = Executor::Connection(db.connect());
        let out: Vec<Account> = reader
            .read(&background(), &exec, "SELECT id, email, extra FROM accounts ORDER BY id", &[])
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].account_id, 1);
        assert_eq!(out[1].email, "b@x");
        assert_eq!(out[0].note, None);
        assert_eq!(reader.cache().len(), 1);

        let again: Vec<Account> = reader
            .read(&background(), &exec, "SELECT id, email, extra FROM accounts ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(again, out);
        assert_eq!(reader.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_read_empty() {
        let db = MockDatabase::new();
        db.create_table("accounts", &["id", "email"], Some("id"));
        let exec = Executor::Connection(db.connect());
        let out: Vec<Account> = Reader::default()
            .read(&background(), &exec, "SELECT * FROM accounts", &[])
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
