// ============================================================================
// Record mutations
// ============================================================================
//
// Every mutation follows the same order: validate the whole batch, call the
// store, then copy the store's answer back into the records. Records are
// only touched after the store call succeeded, except for the soft-delete
// marker, which is staged in memory and restored when no row matched.
//
// ============================================================================

use super::pipeline::WriteOptions;
use super::validation::{check_batch_size, check_record_tenant};
use super::view::{ScopeView, TenantAxis};
use crate::core::{Error, Result, StoreError, TenantError};
use crate::identity::TenantId;
use crate::predicate::Predicate;
use crate::record::{Entity, SoftDeletable};
use crate::store::{RowUpdate, WriteSet};
use chrono::Utc;
use tracing::{Instrument, Span, debug, info_span, warn};

/// Per-record result of a batch update or delete, positionally matching the
/// input batch. `false` means the view's predicate matched no row, which is
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    matched: Vec<bool>,
}

impl BatchOutcome {
    pub fn new(matched: Vec<bool>) -> Self {
        Self { matched }
    }

    pub fn all_matched(&self) -> bool {
        self.matched.iter().all(|m| *m)
    }

    /// Number of records that matched a row.
    pub fn count(&self) -> usize {
        self.matched.iter().filter(|m| **m).count()
    }

    pub fn len(&self) -> usize {
        self.matched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.matched.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.matched.iter().copied()
    }

    pub fn into_inner(self) -> Vec<bool> {
        self.matched
    }
}

impl<R: Entity> ScopeView<R> {
    fn span(&self, operation: &'static str, size: usize) -> Span {
        info_span!(
            "scopemap.mutation",
            table = R::TABLE,
            view = %self.label(),
            operation,
            size
        )
    }

    /// The tenant a mutation runs under. `None` when the view does not
    /// enforce tenant isolation.
    fn mutation_tenant(&self) -> Result<Option<TenantId>> {
        if !self.enforces_tenant() {
            return Ok(None);
        }
        match self.current_tenant() {
            Some(tenant) => Ok(Some(tenant)),
            None => {
                warn!(table = R::TABLE, view = %self.label(), "mutation without a current tenant");
                Err(TenantError::NoCurrentTenant.into())
            }
        }
    }

    fn check_tenant(&self, record: &R, tenant: Option<&TenantId>) -> Result<()> {
        match (&self.core.tenant, tenant) {
            (Some(access), Some(current)) => check_record_tenant(access, record, current),
            _ => Ok(()),
        }
    }

    /// Batch-wide tenant check for destructive operations.
    fn guard_batch(&self, records: &[R]) -> Result<Option<TenantId>> {
        let tenant = self.mutation_tenant()?;
        (self.guard)(records, tenant.as_ref())?;
        Ok(tenant)
    }

    /// Writes for `record`, with the tenant column stamped when the view
    /// runs under one. The record itself is left untouched.
    fn staged_write(&self, record: &R, tenant: Option<&TenantId>, options: &WriteOptions) -> WriteSet {
        let pipeline = &self.core.pipeline;
        match (&self.core.tenant, tenant) {
            (Some(access), Some(tenant)) if access.get(record) != Some(tenant) => {
                let mut staged = record.clone();
                access.set(&mut staged, Some(tenant.clone()));
                pipeline.record_to_write(&staged, options)
            }
            _ => pipeline.record_to_write(record, options),
        }
    }

    /// The tenant a new row is stored under. Current-tenant views use their
    /// tenant. All-tenants views keep the record's own tenant and fall back
    /// to the current one; a row is never stored without an owner.
    fn insert_owner(&self, record: &R, tenant: Option<&TenantId>) -> Result<Option<TenantId>> {
        let Some(access) = &self.core.tenant else {
            return Ok(None);
        };
        if let Some(tenant) = tenant {
            return Ok(Some(tenant.clone()));
        }
        if let Some(own) = access.get(record) {
            return Ok(Some(own.clone()));
        }
        match self.current_tenant() {
            Some(current) => Ok(Some(current)),
            None => {
                warn!(table = R::TABLE, view = %self.label(), "insert of an unowned record without a current tenant");
                Err(TenantError::NoCurrentTenant.into())
            }
        }
    }

    /// All-tenants views have no authority over the tenant column on update.
    fn update_options(&self) -> WriteOptions {
        match (&self.core.tenant, self.tenancy()) {
            (Some(_), TenantAxis::AllTenants) => {
                WriteOptions::new().skip(&self.core.config.columns.tenant_id)
            }
            _ => WriteOptions::new(),
        }
    }

    fn check_positional(&self, returned: usize, expected: usize) -> Result<()> {
        if returned != expected {
            return Err(StoreError::ExecutionError(format!(
                "store answered {} entries for a batch of {} on '{}'",
                returned,
                expected,
                R::TABLE
            ))
            .into());
        }
        Ok(())
    }

    /// Inserts every record in one store call, then fills in the identity,
    /// timestamps and tenant the store assigned.
    ///
    /// Fails before any write if a record already has an identity or, on
    /// tenant-owned tables, if there is no current tenant or a record is
    /// stamped with another tenant. All-tenants views accept records of any
    /// tenant and stamp unowned ones with the current tenant.
    pub async fn insert(&self, records: &mut [R]) -> Result<()> {
        let span = self.span("insert", records.len());
        self.insert_records(records).instrument(span).await
    }

    async fn insert_records(&self, records: &mut [R]) -> Result<()> {
        check_batch_size(R::TABLE, "insert", records.len(), self.core.config.max_batch_size)?;
        let tenant = self.mutation_tenant()?;
        let mut owners = Vec::with_capacity(records.len());
        for record in records.iter() {
            if let Some(id) = record.id() {
                return Err(Error::AlreadyPersisted {
                    table: R::TABLE.to_string(),
                    id: id.to_string(),
                });
            }
            self.check_tenant(record, tenant.as_ref())?;
            owners.push(self.insert_owner(record, tenant.as_ref())?);
        }

        let options = WriteOptions::new();
        let writes: Vec<WriteSet> = records
            .iter()
            .zip(&owners)
            .map(|(record, owner)| self.staged_write(record, owner.as_ref(), &options))
            .collect();

        debug!("insert batch");
        let rows = self.core.store.insert_batch(R::TABLE, writes).await?;
        self.check_positional(rows.len(), records.len())?;

        let stored = rows
            .iter()
            .map(|row| self.to_record(row))
            .collect::<Result<Vec<R>>>()?;
        for (record, stored) in records.iter_mut().zip(stored) {
            *record = stored;
        }
        Ok(())
    }

    /// Writes every record back, each addressed by its identity within this
    /// view. A record whose row is outside the view is left as is and
    /// reported as unmatched.
    pub async fn update(&self, records: &mut [R]) -> Result<BatchOutcome> {
        let span = self.span("update", records.len());
        self.update_records(records).instrument(span).await
    }

    async fn update_records(&self, records: &mut [R]) -> Result<BatchOutcome> {
        check_batch_size(R::TABLE, "update", records.len(), self.core.config.max_batch_size)?;
        let tenant = self.mutation_tenant()?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records.iter() {
            let id = record.id().ok_or_else(|| Error::UnpersistedUpdate {
                table: R::TABLE.to_string(),
            })?;
            self.check_tenant(record, tenant.as_ref())?;
            ids.push(self.id_predicate(id));
        }

        let scope = self.scope_predicate(tenant.as_ref());
        let options = self.update_options();
        let updates: Vec<RowUpdate> = records
            .iter()
            .zip(ids)
            .map(|(record, id)| {
                RowUpdate::new(
                    scope.clone().and(id),
                    self.staged_write(record, tenant.as_ref(), &options),
                )
            })
            .collect();

        debug!(%scope, "update batch");
        let results = self.core.store.update_batch(R::TABLE, updates).await?;
        self.check_positional(results.len(), records.len())?;

        let stored = results
            .iter()
            .map(|rows| rows.first().map(|row| self.to_record(row)).transpose())
            .collect::<Result<Vec<Option<R>>>>()?;

        let mut matched = Vec::with_capacity(stored.len());
        for (record, stored) in records.iter_mut().zip(stored) {
            matched.push(stored.is_some());
            if let Some(stored) = stored {
                *record = stored;
            }
        }
        Ok(BatchOutcome::new(matched))
    }

    /// Hard-deletes every record within this view.
    ///
    /// On current-tenant views the whole batch is checked first: one record
    /// of another tenant rejects the batch with
    /// [`TenantError::CrossTenantDestroy`] and nothing is deleted. Records
    /// without an identity are reported as unmatched.
    pub async fn delete(&self, records: &[R]) -> Result<BatchOutcome> {
        let span = self.span("delete", records.len());
        self.delete_records(records).instrument(span).await
    }

    async fn delete_records(&self, records: &[R]) -> Result<BatchOutcome> {
        check_batch_size(R::TABLE, "delete", records.len(), self.core.config.max_batch_size)?;
        let tenant = self.guard_batch(records)?;
        let scope = self.scope_predicate(tenant.as_ref());

        let mut matched = Vec::with_capacity(records.len());
        for record in records {
            let Some(id) = record.id() else {
                matched.push(false);
                continue;
            };
            let predicate = scope.clone().and(self.id_predicate(id));
            debug!(%predicate, "delete");
            let deleted = self.core.store.delete(R::TABLE, &predicate).await?;
            matched.push(deleted > 0);
        }
        Ok(BatchOutcome::new(matched))
    }

    /// Ad hoc update of every row in this view matching `filter`; returns the
    /// number of rows changed.
    pub async fn update_where(&self, filter: Predicate, values: WriteSet) -> Result<u64> {
        let tenant = self.mutation_tenant()?;
        if let Some(current) = &tenant {
            let column = &self.core.config.columns.tenant_id;
            if let Some(value) = values.get(column) {
                match TenantId::from_value(value) {
                    Some(found) if &found == current => {}
                    Some(found) => {
                        warn!(table = R::TABLE, %current, %found, "ad hoc update reassigns tenant");
                        return Err(TenantError::WrongTenant {
                            current: current.clone(),
                            found,
                        }
                        .into());
                    }
                    None => return Err(Error::mapping(column, "tenant id must be text")),
                }
            }
        }

        let predicate = self.scope_predicate(tenant.as_ref()).and(filter);
        debug!(table = R::TABLE, view = %self.label(), %predicate, "update where");
        let results = self
            .core
            .store
            .update_batch(R::TABLE, vec![RowUpdate::new(predicate, values)])
            .await?;
        Ok(results.iter().map(|rows| rows.len() as u64).sum())
    }

    /// Ad hoc hard delete of every row in this view matching `filter`.
    pub async fn delete_where(&self, filter: Predicate) -> Result<u64> {
        let tenant = self.mutation_tenant()?;
        let predicate = self.scope_predicate(tenant.as_ref()).and(filter);
        debug!(table = R::TABLE, view = %self.label(), %predicate, "delete where");
        Ok(self.core.store.delete(R::TABLE, &predicate).await?)
    }
}

impl<R: SoftDeletable> ScopeView<R> {
    /// Marks every record soft-deleted through the update path of this view.
    ///
    /// Validation is batch-wide, as for [`ScopeView::delete`]. Records whose
    /// row is outside the view get their in-memory marker restored and are
    /// reported as unmatched. A record that is already soft-deleted keeps its
    /// original timestamp.
    pub async fn soft_delete(&self, records: &mut [R]) -> Result<BatchOutcome> {
        if self.core.soft_delete.is_none() {
            return Err(Error::MissingCapability {
                table: R::TABLE.to_string(),
                capability: "soft delete",
            });
        }
        check_batch_size(
            R::TABLE,
            "soft_delete",
            records.len(),
            self.core.config.max_batch_size,
        )?;
        self.guard_batch(records)?;

        let now = Utc::now();
        let previous: Vec<_> = records.iter().map(|r| r.soft_deleted_at()).collect();
        for record in records.iter_mut() {
            if !record.is_soft_deleted() {
                record.set_soft_deleted_at(Some(now));
            }
        }

        let outcome = match self.update(records).await {
            Ok(outcome) => outcome,
            Err(err) => {
                for (record, previous) in records.iter_mut().zip(&previous) {
                    record.set_soft_deleted_at(*previous);
                }
                return Err(err);
            }
        };

        for ((record, previous), matched) in records.iter_mut().zip(previous).zip(outcome.iter()) {
            if !matched {
                warn!(
                    table = R::TABLE,
                    view = %self.label(),
                    id = ?record.id(),
                    "no row matched soft delete, restoring record"
                );
                record.set_soft_deleted_at(previous);
            }
        }
        Ok(outcome)
    }
}
