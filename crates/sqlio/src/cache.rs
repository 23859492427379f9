//! Mapper cache
//!
//! Two-segment cache of column binding plans. Keys are the 64-bit hash of
//! the fingerprint `"<type>/<col1>/<col2>/..."`. Each segment holds at most
//! `capacity` plans; when the active one fills up the inactive one is
//! dropped and the two swap roles. A single mutex guards both segments.

use crate::mapping::Field;
use crate::types::{Column, ValueKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

/// Default plans per segment
pub const DEFAULT_CAPACITY: usize = 1024;

/// Resolves a result column to a record field index
pub type Resolver<'a> = &'a dyn Fn(&Column, &[Field]) -> Option<usize>;

/// Binding of one result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Field receiving the column, `None` when the column is skipped
    pub field: Option<usize>,
    /// Column kind matched the field type when the plan was built
    pub matched: bool,
}

/// Reusable binding plan for one (record type, result shape) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Fingerprint the plan was built for
    pub fingerprint: String,
    /// Result column names
    pub columns: Vec<String>,
    /// One slot per column
    pub slots: Vec<Slot>,
}

/// Fingerprint and key for a record type and a result shape
pub fn fingerprint(type_name: &str, columns: &[Column]) -> (String, u64) {
    let mut text = String::with_capacity(type_name.len() + columns.len() * 8);
    text.push_str(type_name);
    for c in columns {
        text.push('/');
        text.push_str(c.name());
    }
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    (text, hasher.finish())
}

/// Resolve columns against fields by case-insensitive mapped name
pub fn default_resolver(column: &Column, fields: &[Field]) -> Option<usize> {
    let normalize = |s: &str| s.replace('_', "").to_ascii_lowercase();
    let wanted = normalize(column.name());
    fields.iter().position(|f| normalize(&f.name) == wanted)
}

impl Plan {
    /// Build a plan: `names[i]` is the column name each field maps to
    pub fn build(
        fingerprint: String,
        columns: &[Column],
        fields: &[Field],
        names: &[String],
        resolver: Resolver<'_>,
    ) -> Self {
        let slots = columns
            .iter()
            .map(|column| {
                let field = names
                    .iter()
                    .position(|n| n.eq_ignore_ascii_case(column.name()))
                    .or_else(|| resolver(column, fields));
                let matched = field.is_some_and(|f| {
                    column.kind() == ValueKind::Unknown || fields[f].ty.accepts(column.kind())
                });
                Slot { field, matched }
            })
            .collect();
        Self {
            fingerprint,
            columns: columns.iter().map(|c| c.name().to_string()).collect(),
            slots,
        }
    }

    /// Copy with unmatched slots re-resolved through `resolver`
    fn refreshed(&self, columns: &[Column], fields: &[Field], resolver: Resolver<'_>) -> Self {
        let mut plan = self.clone();
        for (slot, column) in plan.slots.iter_mut().zip(columns) {
            if !slot.matched {
                slot.field = resolver(column, fields).or(slot.field);
            }
        }
        plan
    }
}

#[derive(Default)]
struct Segments {
    active: HashMap<u64, Arc<Plan>>,
    inactive: HashMap<u64, Arc<Plan>>,
}

/// Two-segment plan cache
pub struct MapperCache {
    capacity: usize,
    segments: Mutex<Segments>,
}

impl Default for MapperCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for MapperCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.segments.lock();
        f.debug_struct("MapperCache")
            .field("capacity", &self.capacity)
            .field("active", &s.active.len())
            .field("inactive", &s.inactive.len())
            .finish()
    }
}

impl MapperCache {
    /// Cache holding up to `capacity` plans per segment
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            segments: Mutex::new(Segments::default()),
        }
    }

    /// Number of cached plans across both segments
    pub fn len(&self) -> usize {
        let s = self.segments.lock();
        s.active.len() + s.inactive.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a plan by key, checking both segments
    pub fn get(&self, key: u64, fingerprint: &str) -> Option<Arc<Plan>> {
        let s = self.segments.lock();
        s.active
            .get(&key)
            .or_else(|| s.inactive.get(&key))
            .filter(|p| p.fingerprint == fingerprint)
            .cloned()
    }

    /// Insert a plan into the active segment, swapping segments when full
    pub fn put(&self, key: u64, plan: Arc<Plan>) {
        let mut s = self.segments.lock();
        if !s.active.contains_key(&key) && s.active.len() >= self.capacity {
            let full = std::mem::take(&mut s.active);
            s.inactive = full;
        }
        s.active.insert(key, plan);
    }

    /// Cached plan for (type, columns), built on miss
    ///
    /// Unmatched slots of a cached plan are re-resolved through the
    /// caller's `resolver` on every lookup.
    pub fn plan(
        &self,
        type_name: &str,
        columns: &[Column],
        fields: &[Field],
        names: &[String],
        resolver: Resolver<'_>,
    ) -> Arc<Plan> {
        let (text, key) = fingerprint(type_name, columns);
        if let Some(plan) = self.get(key, &text) {
            if plan.slots.iter().all(|s| s.matched) {
                return plan;
            }
            return Arc::new(plan.refreshed(columns, fields, resolver));
        }
        let plan = Arc::new(Plan::build(text, columns, fields, names, resolver));
        self.put(key, plan.clone());
        plan
    }
}
