use crate::core::Timestamp;
use crate::identity::TenantId;
use crate::record::{SoftDeletable, TenantScoped};

/// Tenant accessors captured from a [`TenantScoped`] record type, so code
/// generic over plain entities can still reach the tenant field.
pub struct TenantAccess<R> {
    get: for<'a> fn(&'a R) -> Option<&'a TenantId>,
    set: fn(&mut R, Option<TenantId>),
}

impl<R> Clone for TenantAccess<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for TenantAccess<R> {}

impl<R: TenantScoped> TenantAccess<R> {
    pub fn of() -> Self {
        Self {
            get: R::tenant_id,
            set: R::set_tenant_id,
        }
    }
}

impl<R> TenantAccess<R> {
    pub fn get<'a>(&self, record: &'a R) -> Option<&'a TenantId> {
        (self.get)(record)
    }

    pub fn set(&self, record: &mut R, tenant: Option<TenantId>) {
        (self.set)(record, tenant)
    }
}

pub struct SoftDeleteAccess<R> {
    get: fn(&R) -> Option<Timestamp>,
    set: fn(&mut R, Option<Timestamp>),
}

impl<R> Clone for SoftDeleteAccess<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for SoftDeleteAccess<R> {}

impl<R: SoftDeletable> SoftDeleteAccess<R> {
    pub fn of() -> Self {
        Self {
            get: R::soft_deleted_at,
            set: R::set_soft_deleted_at,
        }
    }
}

impl<R> SoftDeleteAccess<R> {
    pub fn get(&self, record: &R) -> Option<Timestamp> {
        (self.get)(record)
    }

    pub fn set(&self, record: &mut R, at: Option<Timestamp>) {
        (self.set)(record, at)
    }
}
