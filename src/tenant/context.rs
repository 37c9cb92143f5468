use crate::core::{Error, Result};
use crate::identity::TenantId;
use std::cell::RefCell;
use std::future::Future;

tokio::task_local! {
    static CURRENT_TENANT: RefCell<Option<TenantId>>;
}

/// The tenant attributed to the current logical unit of work.
///
/// The cell lives in task-local storage, so two tasks each running inside
/// their own scope never observe each other's tenant. Outside any scope
/// there is no current tenant and [`TenantContext::set`] fails.
///
/// ```
/// # use scopemap::{TenantContext, TenantId};
/// # tokio_test::block_on(async {
/// TenantContext::scope(async {
///     TenantContext::set("acme").unwrap();
///     assert_eq!(TenantContext::current(), Some(TenantId::from("acme")));
///     TenantContext::clear().unwrap();
///     assert_eq!(TenantContext::current(), None);
/// })
/// .await;
/// # });
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TenantContext;

impl TenantContext {
    /// Runs `fut` with a fresh, empty tenant cell.
    pub async fn scope<F: Future>(fut: F) -> F::Output {
        CURRENT_TENANT.scope(RefCell::new(None), fut).await
    }

    /// Runs `fut` with the cell already holding `tenant`.
    pub async fn with_tenant<F: Future>(tenant: impl Into<TenantId>, fut: F) -> F::Output {
        CURRENT_TENANT
            .scope(RefCell::new(Some(tenant.into())), fut)
            .await
    }

    /// Synchronous counterpart of [`TenantContext::scope`].
    pub fn sync_scope<R>(tenant: Option<TenantId>, op: impl FnOnce() -> R) -> R {
        CURRENT_TENANT.sync_scope(RefCell::new(tenant), op)
    }

    pub fn current() -> Option<TenantId> {
        CURRENT_TENANT
            .try_with(|cell| cell.borrow().clone())
            .ok()
            .flatten()
    }

    pub fn set(tenant: impl Into<TenantId>) -> Result<()> {
        let tenant = tenant.into();
        CURRENT_TENANT
            .try_with(|cell| {
                *cell.borrow_mut() = Some(tenant);
            })
            .map_err(|_| Error::ContextUnavailable)
    }

    pub fn clear() -> Result<()> {
        CURRENT_TENANT
            .try_with(|cell| {
                cell.borrow_mut().take();
            })
            .map_err(|_| Error::ContextUnavailable)
    }

    /// Whether the caller runs inside a tenant scope at all.
    pub fn is_entered() -> bool {
        CURRENT_TENANT.try_with(|_| ()).is_ok()
    }
}
