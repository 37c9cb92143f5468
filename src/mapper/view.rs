use super::access::{SoftDeleteAccess, TenantAccess};
use super::pipeline::FieldPipeline;
use super::validation::BatchGuard;
use crate::config::MapperConfig;
use crate::core::{Result, TableSchema};
use crate::identity::{Identity, TenantId};
use crate::predicate::Predicate;
use crate::record::Entity;
use crate::store::{RawRow, Store};
use crate::tenant::TenantContext;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which rows a view sees along the soft-delete axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Live,
    SoftDeleted,
    LiveAndSoftDeleted,
}

impl Lifecycle {
    pub fn label(&self) -> &'static str {
        match self {
            Lifecycle::Live => "live",
            Lifecycle::SoftDeleted => "deleted",
            Lifecycle::LiveAndSoftDeleted => "live_and_deleted",
        }
    }
}

/// Which rows a view sees along the tenant axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantAxis {
    CurrentTenant,
    AllTenants,
}

/// State shared by every view of one table: the store handle, the column
/// layout and the field pipeline. Views only add a predicate on top.
pub(crate) struct TableCore<R> {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) config: MapperConfig,
    pub(crate) pipeline: FieldPipeline<R>,
    pub(crate) tenant: Option<TenantAccess<R>>,
    pub(crate) soft_delete: Option<SoftDeleteAccess<R>>,
}

impl<R: Entity> TableCore<R> {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        config: MapperConfig,
        tenant: Option<TenantAccess<R>>,
        soft_delete: Option<SoftDeleteAccess<R>>,
    ) -> Result<Self> {
        config.validate()?;
        let pipeline = FieldPipeline::assemble(&config.columns, tenant, soft_delete)?;
        Ok(Self {
            store,
            config,
            pipeline,
            tenant,
            soft_delete,
        })
    }
}

/// A lens over one physical table: a lifecycle predicate ANDed with a
/// tenant predicate, sharing the table's mapping with every sibling view.
///
/// Views are cheap to clone and hold no rows of their own. They are obtained
/// from the table types ([`Table`](super::Table),
/// [`TenantSoftDeleteTable`](super::TenantSoftDeleteTable), ...) through
/// their view selectors, or through `Deref` for the default view.
pub struct ScopeView<R: Entity> {
    pub(crate) core: Arc<TableCore<R>>,
    lifecycle: Lifecycle,
    tenancy: TenantAxis,
    tenant_override: Option<TenantId>,
    pub(crate) guard: BatchGuard<R>,
}

impl<R: Entity> Clone for ScopeView<R> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            lifecycle: self.lifecycle,
            tenancy: self.tenancy,
            tenant_override: self.tenant_override.clone(),
            guard: self.guard.clone(),
        }
    }
}

impl<R: Entity> fmt::Debug for ScopeView<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeView")
            .field("table", &R::TABLE)
            .field("view", &self.label())
            .field("tenant_override", &self.tenant_override)
            .field("pipeline", &self.core.pipeline)
            .finish()
    }
}

impl<R: Entity> ScopeView<R> {
    pub(crate) fn new(
        core: Arc<TableCore<R>>,
        lifecycle: Lifecycle,
        tenancy: TenantAxis,
        guard: BatchGuard<R>,
    ) -> Self {
        Self {
            core,
            lifecycle,
            tenancy,
            tenant_override: None,
            guard,
        }
    }

    /// The same view bound to an explicit tenant instead of the ambient one.
    pub fn with_tenant(&self, tenant: impl Into<TenantId>) -> Self {
        Self {
            tenant_override: Some(tenant.into()),
            ..self.clone()
        }
    }

    /// The same view running against another handle of the store, typically
    /// one bound to a caller's unit of work.
    pub fn with_store(&self, store: Arc<dyn Store>) -> Self {
        let core = TableCore {
            store,
            config: self.core.config.clone(),
            pipeline: self.core.pipeline.clone(),
            tenant: self.core.tenant,
            soft_delete: self.core.soft_delete,
        };
        Self {
            core: Arc::new(core),
            ..self.clone()
        }
    }

    pub fn table_name(&self) -> &'static str {
        R::TABLE
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn tenancy(&self) -> TenantAxis {
        self.tenancy
    }

    pub fn config(&self) -> &MapperConfig {
        &self.core.config
    }

    pub fn pipeline(&self) -> &FieldPipeline<R> {
        &self.core.pipeline
    }

    /// Name of this view as it appears in logs, e.g. `deleted_for_all_tenants`.
    pub fn label(&self) -> String {
        let tenant_owned = self.core.tenant.is_some();
        match (self.core.soft_delete.is_some(), tenant_owned, self.tenancy) {
            (true, true, TenantAxis::AllTenants) => {
                format!("{}_for_all_tenants", self.lifecycle.label())
            }
            (true, _, _) => self.lifecycle.label().to_string(),
            (false, true, TenantAxis::CurrentTenant) => "current_tenant".to_string(),
            (false, true, TenantAxis::AllTenants) => "all_tenants".to_string(),
            (false, false, _) => "default".to_string(),
        }
    }

    /// Whether mutations through this view are subject to tenant isolation.
    pub fn enforces_tenant(&self) -> bool {
        self.core.tenant.is_some() && self.tenancy == TenantAxis::CurrentTenant
    }

    /// The tenant this view is bound to: the explicit override if any,
    /// otherwise the ambient tenant.
    pub fn current_tenant(&self) -> Option<TenantId> {
        self.tenant_override.clone().or_else(TenantContext::current)
    }

    /// The view's own filter, resolved against the current tenant.
    pub fn predicate(&self) -> Predicate {
        self.scope_predicate(self.current_tenant().as_ref())
    }

    pub(crate) fn scope_predicate(&self, tenant: Option<&TenantId>) -> Predicate {
        let columns = &self.core.config.columns;
        let mut predicate = Predicate::True;

        if self.core.soft_delete.is_some() {
            let lifecycle = match self.lifecycle {
                Lifecycle::Live => Predicate::is_null(&columns.soft_deleted_at),
                Lifecycle::SoftDeleted => Predicate::is_not_null(&columns.soft_deleted_at),
                Lifecycle::LiveAndSoftDeleted => Predicate::True,
            };
            predicate = predicate.and(lifecycle);
        }

        if self.enforces_tenant() {
            // Without a tenant the view sees nothing rather than everything.
            let tenancy = match tenant {
                Some(tenant) => Predicate::eq(&columns.tenant_id, tenant.to_value()),
                None => Predicate::False,
            };
            predicate = predicate.and(tenancy);
        }

        predicate
    }

    pub(crate) fn id_predicate(&self, id: &R::Id) -> Predicate {
        Predicate::eq(&self.core.config.columns.id, id.to_value())
    }

    pub fn schema(&self) -> TableSchema {
        let columns = &self.core.config.columns;
        TableSchema::new(
            R::TABLE,
            &columns.id,
            <R::Id as Identity>::STRATEGY,
            &columns.created_at,
            &columns.updated_at,
            self.core.pipeline.columns(),
        )
    }

    /// Registers the backing table with the store.
    pub async fn ensure_table(&self) -> Result<()> {
        debug!(table = R::TABLE, "ensuring table");
        self.core.store.ensure_table(&self.schema()).await?;
        Ok(())
    }

    /// Maps a raw row, e.g. from an ad hoc query, into a record.
    pub fn to_record(&self, row: &RawRow) -> Result<R> {
        self.core.pipeline.row_to_record(row)
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub async fn select(&self) -> Result<Vec<R>> {
        self.select_where(Predicate::True).await
    }

    pub async fn select_where(&self, filter: Predicate) -> Result<Vec<R>> {
        let rows = self.select_rows(filter).await?;
        rows.iter().map(|row| self.to_record(row)).collect()
    }

    /// Unmapped rows visible through this view.
    pub async fn select_rows(&self, filter: Predicate) -> Result<Vec<RawRow>> {
        let predicate = self.predicate().and(filter);
        debug!(table = R::TABLE, view = %self.label(), %predicate, "select");
        Ok(self.core.store.select(R::TABLE, &predicate).await?)
    }

    pub async fn find(&self, id: &R::Id) -> Result<Option<R>> {
        let mut found = self.select_where(self.id_predicate(id)).await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    pub async fn count(&self) -> Result<usize> {
        self.count_where(Predicate::True).await
    }

    pub async fn count_where(&self, filter: Predicate) -> Result<usize> {
        Ok(self.select_rows(filter).await?.len())
    }
}
