use super::transaction::{Snapshot, TransactionManager};
use crate::core::{IdStrategy, StoreError, StoreResult, TableSchema, Timestamp, Value};
use crate::predicate::Predicate;
use crate::store::{RawRow, WriteSet};
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct MvccRow {
    pub row: RawRow,
    pub xmin: u64,         // Transaction that created this version
    pub xmax: Option<u64>, // Transaction that deleted/superseded it
}

#[derive(Debug, Clone)]
pub struct MvccTable {
    schema: TableSchema,
    rows: BTreeMap<usize, Vec<MvccRow>>,
    next_row_id: usize,
    next_serial: i64,
}

impl MvccTable {
    pub fn new(schema: TableSchema) -> StoreResult<Self> {
        for required in [
            schema.id_column(),
            schema.created_at_column(),
            schema.updated_at_column(),
        ] {
            if schema.get_column(required).is_none() {
                return Err(StoreError::ColumnNotFound(
                    required.to_string(),
                    schema.name().to_string(),
                ));
            }
        }

        Ok(Self {
            schema,
            rows: BTreeMap::new(),
            next_row_id: 0,
            next_serial: 1,
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Inserts every row or none: all writes are validated before the first insert.
    pub fn insert(&mut self, writes: Vec<WriteSet>, snapshot: &Snapshot) -> StoreResult<Vec<RawRow>> {
        for write in &writes {
            self.check_write(write)?;
        }

        let now = Utc::now();
        let mut prepared = Vec::with_capacity(writes.len());
        for write in writes {
            let mut row: RawRow = self
                .schema
                .columns()
                .iter()
                .map(|col| (col.name.clone(), Value::Null))
                .collect();
            for (column, value) in write.iter() {
                row.insert(column.clone(), value.clone());
            }
            row.insert(self.schema.created_at_column(), now);
            row.insert(self.schema.updated_at_column(), now);
            // Placeholder so NOT NULL validation passes before the id is drawn.
            row.insert(self.schema.id_column(), self.placeholder_id());
            self.validate_row(&row)?;
            prepared.push(row);
        }

        let mut inserted = Vec::with_capacity(prepared.len());
        for mut row in prepared {
            let id = self.next_identity();
            row.insert(self.schema.id_column(), id);

            let row_id = self.next_row_id;
            self.next_row_id += 1;
            self.rows.insert(
                row_id,
                vec![MvccRow {
                    row: row.clone(),
                    xmin: snapshot.tx_id,
                    xmax: None,
                }],
            );
            inserted.push(row);
        }

        Ok(inserted)
    }

    /// Writes `write` into every visible row matching `predicate`.
    ///
    /// Returns the new versions. A matched row whose latest version is
    /// already claimed by another live transaction is a write conflict.
    pub fn update(
        &mut self,
        predicate: &Predicate,
        write: &WriteSet,
        snapshot: &Snapshot,
        transactions: &TransactionManager,
    ) -> StoreResult<Vec<RawRow>> {
        self.check_write(write)?;
        self.check_predicate(predicate)?;

        let targets = self.matching(predicate, snapshot)?;
        let mut updated = Vec::with_capacity(targets.len());

        for (row_id, version_idx) in targets {
            self.check_conflict(row_id, version_idx, snapshot, transactions)?;

            let Some(versions) = self.rows.get_mut(&row_id) else {
                continue;
            };
            let Some(current) = versions.get_mut(version_idx) else {
                continue;
            };

            let mut row = current.row.clone();
            for (column, value) in write.iter() {
                row.insert(column.clone(), value.clone());
            }
            let previous = row.value(self.schema.updated_at_column()).as_timestamp();
            row.insert(self.schema.updated_at_column(), advance(previous));

            current.xmax = Some(snapshot.tx_id);
            versions.push(MvccRow {
                row: row.clone(),
                xmin: snapshot.tx_id,
                xmax: None,
            });
            updated.push(row);
        }

        Ok(updated)
    }

    pub fn delete(
        &mut self,
        predicate: &Predicate,
        snapshot: &Snapshot,
        transactions: &TransactionManager,
    ) -> StoreResult<u64> {
        self.check_predicate(predicate)?;

        let targets = self.matching(predicate, snapshot)?;
        for &(row_id, version_idx) in &targets {
            self.check_conflict(row_id, version_idx, snapshot, transactions)?;
        }

        let mut deleted = 0;
        for (row_id, version_idx) in targets {
            if let Some(version) = self
                .rows
                .get_mut(&row_id)
                .and_then(|versions| versions.get_mut(version_idx))
            {
                version.xmax = Some(snapshot.tx_id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub fn scan(&self, predicate: &Predicate, snapshot: &Snapshot) -> StoreResult<Vec<RawRow>> {
        self.check_predicate(predicate)?;

        let mut results = Vec::new();
        for (row_id, version_idx) in self.matching(predicate, snapshot)? {
            if let Some(version) = self.rows.get(&row_id).and_then(|v| v.get(version_idx)) {
                results.push(version.row.clone());
            }
        }
        Ok(results)
    }

    /// Number of rows visible to `snapshot`.
    pub fn row_count(&self, snapshot: &Snapshot) -> usize {
        self.rows
            .values()
            .filter(|versions| versions.iter().any(|v| is_visible(v, snapshot)))
            .count()
    }

    fn matching(&self, predicate: &Predicate, snapshot: &Snapshot) -> StoreResult<Vec<(usize, usize)>> {
        let mut out = Vec::new();
        for (row_id, versions) in &self.rows {
            let newest_visible = versions
                .iter()
                .enumerate()
                .rev()
                .find(|(_, version)| is_visible(version, snapshot));

            if let Some((idx, version)) = newest_visible
                && predicate.matches(&version.row)?
            {
                out.push((*row_id, idx));
            }
        }
        Ok(out)
    }

    fn check_conflict(
        &self,
        row_id: usize,
        version_idx: usize,
        snapshot: &Snapshot,
        transactions: &TransactionManager,
    ) -> StoreResult<()> {
        let claimed_by = self
            .rows
            .get(&row_id)
            .and_then(|versions| versions.get(version_idx))
            .and_then(|version| version.xmax);

        if let Some(xmax) = claimed_by
            && xmax != snapshot.tx_id
            && !transactions.is_aborted(xmax)
        {
            return Err(StoreError::WriteConflict {
                table: self.schema.name().to_string(),
                row: row_id,
            });
        }
        Ok(())
    }

    fn check_write(&self, write: &WriteSet) -> StoreResult<()> {
        for (column, value) in write.iter() {
            if self.schema.is_store_assigned(column) {
                return Err(StoreError::ConstraintViolation(format!(
                    "Column '{}' is assigned by the store",
                    column
                )));
            }
            let definition = self.schema.get_column(column).ok_or_else(|| {
                StoreError::ColumnNotFound(column.clone(), self.schema.name().to_string())
            })?;
            definition.validate(value)?;
        }
        Ok(())
    }

    fn check_predicate(&self, predicate: &Predicate) -> StoreResult<()> {
        for column in predicate.columns() {
            if self.schema.get_column(column).is_none() {
                return Err(StoreError::ColumnNotFound(
                    column.to_string(),
                    self.schema.name().to_string(),
                ));
            }
        }
        Ok(())
    }

    fn validate_row(&self, row: &RawRow) -> StoreResult<()> {
        for column in self.schema.columns() {
            column.validate(row.value(&column.name))?;
        }
        Ok(())
    }

    fn placeholder_id(&self) -> Value {
        match self.schema.id_strategy() {
            IdStrategy::Serial => Value::Integer(0),
            IdStrategy::Uuid => Value::Uuid(Uuid::nil()),
        }
    }

    fn next_identity(&mut self) -> Value {
        match self.schema.id_strategy() {
            IdStrategy::Serial => {
                let id = self.next_serial;
                self.next_serial += 1;
                Value::Integer(id)
            }
            IdStrategy::Uuid => Value::Uuid(Uuid::new_v4()),
        }
    }
}

fn is_visible(row: &MvccRow, snapshot: &Snapshot) -> bool {
    if row.xmin == snapshot.tx_id {
        return row.xmax != Some(snapshot.tx_id);
    }

    if !snapshot.is_committed(row.xmin) {
        return false;
    }

    if let Some(xmax) = row.xmax {
        if xmax == snapshot.tx_id {
            return false;
        }
        if snapshot.is_committed(xmax) {
            return false;
        }
    }

    true
}

/// `updated_at` strictly increases per row even when the clock does not.
fn advance(previous: Option<Timestamp>) -> Timestamp {
    let now = Utc::now();
    match previous {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}
