//! In-memory MVCC store.
//!
//! Reference implementation of [`Store`] and [`UnitOfWork`], used by the
//! test suite and handy for prototyping. Every handle shares one database;
//! a handle returned by [`UnitOfWork::begin`] routes its calls through that
//! unit of work.

pub mod table;
pub mod transaction;

use super::{RawRow, RowUpdate, Store, UnitOfWork, WriteSet};
use crate::core::{StoreError, StoreResult, TableSchema};
use crate::predicate::Predicate;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub use table::MvccTable;
pub use transaction::{Snapshot, TransactionId, TransactionManager, TransactionState};

#[derive(Debug, Default)]
struct MemoryDatabase {
    tables: HashMap<String, MvccTable>,
    transactions: TransactionManager,
}

impl MemoryDatabase {
    fn table_mut(&mut self, name: &str) -> StoreResult<&mut MvccTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    /// Runs a write statement; a failed auto-commit statement is aborted as a whole.
    fn write<T>(
        &mut self,
        transaction_id: Option<TransactionId>,
        op: impl FnOnce(&mut MvccTable, &Snapshot, &TransactionManager) -> StoreResult<T>,
        table: &str,
    ) -> StoreResult<T> {
        let snapshot = self.transactions.snapshot(transaction_id)?;
        let Self {
            tables,
            transactions,
        } = self;
        let target = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let result = op(target, &snapshot, transactions);
        if result.is_err() && transaction_id.is_none() {
            transactions.abort_statement(snapshot.tx_id);
        }
        result
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    db: Arc<Mutex<MemoryDatabase>>,
    transaction_id: Option<TransactionId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unit of work this handle belongs to, if any.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    pub async fn table_names(&self) -> Vec<String> {
        let db = self.db.lock().await;
        let mut names: Vec<String> = db.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Rows visible to this handle, regardless of any mapper scope.
    pub async fn row_count(&self, table: &str) -> StoreResult<usize> {
        let mut db = self.db.lock().await;
        let snapshot = db.transactions.snapshot(self.transaction_id)?;
        let table = db.table_mut(table)?;
        Ok(table.row_count(&snapshot))
    }

    pub async fn drop_table(&self, table: &str) -> StoreResult<()> {
        let mut db = self.db.lock().await;
        if db.tables.remove(table).is_none() {
            return Err(StoreError::TableNotFound(table.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ensure_table(&self, schema: &TableSchema) -> StoreResult<()> {
        let mut db = self.db.lock().await;
        if let Some(existing) = db.tables.get(schema.name()) {
            if existing.schema() != schema {
                return Err(StoreError::TableExists(schema.name().to_string()));
            }
            return Ok(());
        }

        debug!(table = schema.name(), "creating table");
        let table = MvccTable::new(schema.clone())?;
        db.tables.insert(schema.name().to_string(), table);
        Ok(())
    }

    async fn insert_batch(&self, table: &str, rows: Vec<WriteSet>) -> StoreResult<Vec<RawRow>> {
        debug!(table, rows = rows.len(), tx = ?self.transaction_id, "insert batch");
        let mut db = self.db.lock().await;
        db.write(
            self.transaction_id,
            |target, snapshot, _| target.insert(rows, snapshot),
            table,
        )
    }

    async fn update_batch(
        &self,
        table: &str,
        updates: Vec<RowUpdate>,
    ) -> StoreResult<Vec<Vec<RawRow>>> {
        debug!(table, entries = updates.len(), tx = ?self.transaction_id, "update batch");
        let mut db = self.db.lock().await;
        db.write(
            self.transaction_id,
            |target, snapshot, transactions| {
                updates
                    .iter()
                    .map(|update| {
                        target.update(&update.predicate, &update.values, snapshot, transactions)
                    })
                    .collect()
            },
            table,
        )
    }

    async fn delete(&self, table: &str, predicate: &Predicate) -> StoreResult<u64> {
        debug!(table, %predicate, tx = ?self.transaction_id, "delete");
        let mut db = self.db.lock().await;
        db.write(
            self.transaction_id,
            |target, snapshot, transactions| target.delete(predicate, snapshot, transactions),
            table,
        )
    }

    async fn select(&self, table: &str, predicate: &Predicate) -> StoreResult<Vec<RawRow>> {
        debug!(table, %predicate, tx = ?self.transaction_id, "select");
        let mut db = self.db.lock().await;
        let snapshot = db.transactions.snapshot(self.transaction_id)?;
        let table = db.table_mut(table)?;
        table.scan(predicate, &snapshot)
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    async fn begin(&self) -> StoreResult<Self> {
        if let Some(current) = self.transaction_id {
            return Err(StoreError::TransactionError(format!(
                "Nested unit of work inside {} is not supported",
                current
            )));
        }
        let mut db = self.db.lock().await;
        let transaction_id = db.transactions.begin();
        debug!(tx = %transaction_id, "begin unit of work");
        Ok(Self {
            db: self.db.clone(),
            transaction_id: Some(transaction_id),
        })
    }

    async fn commit(&self) -> StoreResult<()> {
        let transaction_id = self.require_unit()?;
        let mut db = self.db.lock().await;
        debug!(tx = %transaction_id, "commit unit of work");
        db.transactions.commit(transaction_id)
    }

    async fn rollback(&self) -> StoreResult<()> {
        let transaction_id = self.require_unit()?;
        let mut db = self.db.lock().await;
        debug!(tx = %transaction_id, "rollback unit of work");
        db.transactions.rollback(transaction_id)
    }
}

impl MemoryStore {
    fn require_unit(&self) -> StoreResult<TransactionId> {
        self.transaction_id.ok_or_else(|| {
            StoreError::TransactionError("No unit of work in progress".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType, IdStrategy, Value};
    use crate::store::with_unit_of_work;

    fn schema() -> TableSchema {
        TableSchema::new(
            "items",
            "id",
            IdStrategy::Uuid,
            "created_at",
            "updated_at",
            vec![
                Column::new("id", DataType::Uuid).not_null(),
                Column::new("created_at", DataType::Timestamp).not_null(),
                Column::new("updated_at", DataType::Timestamp).not_null(),
                Column::new("name", DataType::Text),
            ],
        )
    }

    async fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.ensure_table(&schema()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn ensure_table_is_idempotent() {
        let store = store().await;
        store.ensure_table(&schema()).await.unwrap();
        assert_eq!(store.table_names().await, vec!["items".to_string()]);
    }

    #[tokio::test]
    async fn uuid_tables_generate_distinct_ids() {
        let store = store().await;
        let rows = store
            .insert_batch(
                "items",
                vec![WriteSet::new().with("name", "a"), WriteSet::new().with("name", "b")],
            )
            .await
            .unwrap();
        let a = rows[0].value("id").as_uuid().unwrap();
        let b = rows[1].value("id").as_uuid().unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn unit_of_work_commits_on_ok() {
        let store = store().await;
        let result: StoreResult<()> = with_unit_of_work(&store, |tx| async move {
            tx.insert_batch("items", vec![WriteSet::new().with("name", "a")])
                .await?;
            Ok(())
        })
        .await;
        result.unwrap();
        assert_eq!(store.row_count("items").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unit_of_work_rolls_back_on_err() {
        let store = store().await;
        let result: StoreResult<()> = with_unit_of_work(&store, |tx| async move {
            tx.insert_batch("items", vec![WriteSet::new().with("name", "a")])
                .await?;
            assert_eq!(tx.row_count("items").await?, 1);
            Err(StoreError::ExecutionError("boom".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(store.row_count("items").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn uncommitted_rows_are_invisible_to_other_handles() {
        let store = store().await;
        let tx = store.begin().await.unwrap();
        tx.insert_batch("items", vec![WriteSet::new().with("name", "a")])
            .await
            .unwrap();
        assert_eq!(store.row_count("items").await.unwrap(), 0);
        tx.commit().await.unwrap();
        assert_eq!(store.row_count("items").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_auto_commit_update_leaves_no_trace() {
        let store = store().await;
        store
            .insert_batch("items", vec![WriteSet::new().with("name", "a")])
            .await
            .unwrap();
        let err = store
            .update_batch(
                "items",
                vec![
                    RowUpdate::new(Predicate::True, WriteSet::new().with("name", "b")),
                    RowUpdate::new(Predicate::True, WriteSet::new().with("bogus", 1i64)),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ColumnNotFound(..)));

        let rows = store.select("items", &Predicate::True).await.unwrap();
        assert_eq!(rows[0].value("name"), &Value::from("a"));
    }

    #[tokio::test]
    async fn commit_without_unit_is_an_error() {
        let store = store().await;
        assert!(matches!(
            store.commit().await,
            Err(StoreError::TransactionError(_))
        ));
    }
}
