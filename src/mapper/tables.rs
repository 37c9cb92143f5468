// ============================================================================
// Table types, one per capability combination
// ============================================================================
//
//   Table                  -> one view
//   SoftDeleteTable        -> lifecycle axis (3 views)
//   TenantTable            -> tenant axis (2 views)
//   TenantSoftDeleteTable  -> both axes (6 views)
//
// Each table derefs to its default view (live rows of the current tenant,
// where those axes exist). All views of a table share one TableCore.
//
// ============================================================================

use super::access::{SoftDeleteAccess, TenantAccess};
use super::validation::{current_tenant_guard, pass_through};
use super::view::{Lifecycle, ScopeView, TableCore, TenantAxis};
use crate::config::MapperConfig;
use crate::core::Result;
use crate::record::{Entity, SoftDeletable, TenantScoped};
use crate::store::Store;
use std::ops::Deref;
use std::sync::Arc;

macro_rules! deref_to_default_view {
    ($table:ident, $($bound:tt)+) => {
        impl<R: $($bound)+> Deref for $table<R> {
            type Target = ScopeView<R>;

            fn deref(&self) -> &ScopeView<R> {
                &self.default_view
            }
        }

        impl<R: $($bound)+> Clone for $table<R> {
            fn clone(&self) -> Self {
                Self {
                    default_view: self.default_view.clone(),
                }
            }
        }

        impl<R: $($bound)+> std::fmt::Debug for $table<R> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($table))
                    .field("table", &R::TABLE)
                    .finish()
            }
        }
    };
}

/// Records with neither soft deletion nor tenant ownership.
pub struct Table<R: Entity> {
    default_view: ScopeView<R>,
}

impl<R: Entity> Table<R> {
    pub fn new(store: Arc<dyn Store>) -> Result<Self> {
        Self::with_config(store, MapperConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: MapperConfig) -> Result<Self> {
        let core = Arc::new(TableCore::new(store, config, None, None)?);
        Ok(Self {
            default_view: ScopeView::new(
                core,
                Lifecycle::Live,
                TenantAxis::AllTenants,
                pass_through(),
            ),
        })
    }

    pub fn view(&self) -> ScopeView<R> {
        self.default_view.clone()
    }
}

deref_to_default_view!(Table, Entity);

/// Soft-deletable records. The default view sees live rows only.
pub struct SoftDeleteTable<R: SoftDeletable> {
    default_view: ScopeView<R>,
}

impl<R: SoftDeletable> SoftDeleteTable<R> {
    pub fn new(store: Arc<dyn Store>) -> Result<Self> {
        Self::with_config(store, MapperConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: MapperConfig) -> Result<Self> {
        let core = TableCore::new(store, config, None, Some(SoftDeleteAccess::of()))?;
        Ok(Self {
            default_view: ScopeView::new(
                Arc::new(core),
                Lifecycle::Live,
                TenantAxis::AllTenants,
                pass_through(),
            ),
        })
    }

    fn lifecycle_view(&self, lifecycle: Lifecycle) -> ScopeView<R> {
        ScopeView::new(
            self.default_view.core.clone(),
            lifecycle,
            TenantAxis::AllTenants,
            pass_through(),
        )
    }

    pub fn live(&self) -> ScopeView<R> {
        self.default_view.clone()
    }

    pub fn deleted(&self) -> ScopeView<R> {
        self.lifecycle_view(Lifecycle::SoftDeleted)
    }

    pub fn live_and_deleted(&self) -> ScopeView<R> {
        self.lifecycle_view(Lifecycle::LiveAndSoftDeleted)
    }
}

deref_to_default_view!(SoftDeleteTable, SoftDeletable);

/// Tenant-owned records. The default view sees and mutates only rows of the
/// current tenant.
pub struct TenantTable<R: TenantScoped> {
    default_view: ScopeView<R>,
}

impl<R: TenantScoped> TenantTable<R> {
    pub fn new(store: Arc<dyn Store>) -> Result<Self> {
        Self::with_config(store, MapperConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: MapperConfig) -> Result<Self> {
        let core = TableCore::new(store, config, Some(TenantAccess::of()), None)?;
        Ok(Self {
            default_view: ScopeView::new(
                Arc::new(core),
                Lifecycle::Live,
                TenantAxis::CurrentTenant,
                current_tenant_guard(),
            ),
        })
    }

    pub fn current_tenant_view(&self) -> ScopeView<R> {
        self.default_view.clone()
    }

    /// Every tenant's rows, with tenant isolation switched off.
    pub fn for_all_tenants(&self) -> ScopeView<R> {
        ScopeView::new(
            self.default_view.core.clone(),
            Lifecycle::Live,
            TenantAxis::AllTenants,
            pass_through(),
        )
    }
}

deref_to_default_view!(TenantTable, TenantScoped);

/// Records that are both tenant-owned and soft-deletable.
pub struct TenantSoftDeleteTable<R: TenantScoped + SoftDeletable> {
    default_view: ScopeView<R>,
}

impl<R: TenantScoped + SoftDeletable> TenantSoftDeleteTable<R> {
    pub fn new(store: Arc<dyn Store>) -> Result<Self> {
        Self::with_config(store, MapperConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: MapperConfig) -> Result<Self> {
        let core = TableCore::new(
            store,
            config,
            Some(TenantAccess::of()),
            Some(SoftDeleteAccess::of()),
        )?;
        Ok(Self {
            default_view: ScopeView::new(
                Arc::new(core),
                Lifecycle::Live,
                TenantAxis::CurrentTenant,
                current_tenant_guard(),
            ),
        })
    }

    fn scoped(&self, lifecycle: Lifecycle, tenancy: TenantAxis) -> ScopeView<R> {
        let guard = match tenancy {
            TenantAxis::CurrentTenant => current_tenant_guard(),
            TenantAxis::AllTenants => pass_through(),
        };
        ScopeView::new(self.default_view.core.clone(), lifecycle, tenancy, guard)
    }

    pub fn live(&self) -> ScopeView<R> {
        self.default_view.clone()
    }

    pub fn deleted(&self) -> ScopeView<R> {
        self.scoped(Lifecycle::SoftDeleted, TenantAxis::CurrentTenant)
    }

    pub fn live_and_deleted(&self) -> ScopeView<R> {
        self.scoped(Lifecycle::LiveAndSoftDeleted, TenantAxis::CurrentTenant)
    }

    pub fn live_for_all_tenants(&self) -> ScopeView<R> {
        self.scoped(Lifecycle::Live, TenantAxis::AllTenants)
    }

    pub fn deleted_for_all_tenants(&self) -> ScopeView<R> {
        self.scoped(Lifecycle::SoftDeleted, TenantAxis::AllTenants)
    }

    pub fn live_and_deleted_for_all_tenants(&self) -> ScopeView<R> {
        self.scoped(Lifecycle::LiveAndSoftDeleted, TenantAxis::AllTenants)
    }
}

deref_to_default_view!(TenantSoftDeleteTable, TenantScoped + SoftDeletable);
