// ============================================================================
// Store collaborator
// ============================================================================
//
// The mapper never touches storage directly. It hands filtered read/write
// requests to a `Store` and maps the raw rows that come back. Transactional
// grouping is a separate capability (`UnitOfWork`) the caller drives; the
// mapper only participates in a unit handed to it.
//
// ============================================================================

pub mod memory;

use crate::core::{StoreError, StoreResult, TableSchema, Value};
use crate::predicate::Predicate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::future::Future;
use tracing::warn;

pub use memory::MemoryStore;

/// A row as returned by the store, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow {
    values: BTreeMap<String, Value>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// The column's value, `Null` when absent.
    pub fn value(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::ExecutionError(e.to_string()))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Column values a write applies to a row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteSet {
    values: BTreeMap<String, Value>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Builder form of [`WriteSet::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for WriteSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One entry of an update batch: which rows, and what to write to them.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    pub predicate: Predicate,
    pub values: WriteSet,
}

impl RowUpdate {
    pub fn new(predicate: Predicate, values: WriteSet) -> Self {
        Self { predicate, values }
    }
}

/// Backing relational store executing filtered reads and writes.
#[async_trait]
pub trait Store: Send + Sync {
    /// Registers the table if it does not exist yet.
    async fn ensure_table(&self, schema: &TableSchema) -> StoreResult<()>;

    /// Inserts `rows` and returns the stored rows, including every
    /// store-generated column. `result[i]` corresponds to `rows[i]`.
    async fn insert_batch(&self, table: &str, rows: Vec<WriteSet>) -> StoreResult<Vec<RawRow>>;

    /// Applies each update and returns, per entry, the rows it matched as
    /// they read after the write.
    async fn update_batch(
        &self,
        table: &str,
        updates: Vec<RowUpdate>,
    ) -> StoreResult<Vec<Vec<RawRow>>>;

    /// Deletes every row matching `predicate`, returning the count.
    async fn delete(&self, table: &str, predicate: &Predicate) -> StoreResult<u64>;

    async fn select(&self, table: &str, predicate: &Predicate) -> StoreResult<Vec<RawRow>>;
}

/// Transactional grouping offered by a store.
///
/// `begin` returns a handle bound to a fresh unit of work; every `Store`
/// call made through that handle belongs to the unit until it is committed
/// or rolled back.
#[async_trait]
pub trait UnitOfWork: Store + Clone + Sized + 'static {
    async fn begin(&self) -> StoreResult<Self>;

    async fn commit(&self) -> StoreResult<()>;

    async fn rollback(&self) -> StoreResult<()>;
}

/// Runs `op` inside a unit of work, committing on `Ok` and rolling back on `Err`.
///
/// A failed commit is rolled back and reported. A failed rollback after an
/// operation error is logged; the operation error is what the caller sees.
pub async fn with_unit_of_work<S, F, Fut, T, E>(store: &S, op: F) -> Result<T, E>
where
    S: UnitOfWork,
    F: FnOnce(S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<StoreError> + std::fmt::Display,
{
    let unit = store.begin().await?;

    match op(unit.clone()).await {
        Ok(value) => {
            if let Err(err) = unit.commit().await {
                if let Err(rollback_err) = unit.rollback().await {
                    warn!("rollback after failed commit also failed: {}", rollback_err);
                }
                return Err(err.into());
            }
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = unit.rollback().await {
                warn!(
                    "rollback failed after unit of work error '{}': {}",
                    err, rollback_err
                );
            }
            Err(err)
        }
    }
}
