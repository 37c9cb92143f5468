// ============================================================================
// Tenant validation
// ============================================================================
//
// Insert and update check every record on its own; delete and soft delete
// check the whole batch at once. Both run before the first store call, so a
// rejected batch never leaves a partial write behind.
//
// ============================================================================

use super::access::TenantAccess;
use crate::core::{Error, Result, TenantError};
use crate::identity::TenantId;
use crate::record::{Entity, TenantScoped};
use std::sync::Arc;
use tracing::warn;

/// Batch-wide check run before a destructive operation. Injected per view:
/// current-tenant views get [`current_tenant_guard`], all-tenants views and
/// tables without tenant ownership get [`pass_through`].
pub type BatchGuard<R> = Arc<dyn Fn(&[R], Option<&TenantId>) -> Result<()> + Send + Sync>;

pub fn current_tenant_guard<R: TenantScoped>() -> BatchGuard<R> {
    Arc::new(|records: &[R], current: Option<&TenantId>| -> Result<()> {
        let current = current.ok_or(TenantError::NoCurrentTenant)?;
        let foreign = records
            .iter()
            .filter_map(|record| record.tenant_id())
            .find(|tenant| *tenant != current);

        match foreign {
            Some(foreign) => {
                warn!(
                    table = R::TABLE,
                    %current,
                    %foreign,
                    size = records.len(),
                    "rejecting cross-tenant batch"
                );
                Err(TenantError::CrossTenantDestroy {
                    current: current.clone(),
                    foreign: foreign.clone(),
                }
                .into())
            }
            None => Ok(()),
        }
    })
}

pub fn pass_through<R: 'static>() -> BatchGuard<R> {
    Arc::new(|_: &[R], _: Option<&TenantId>| -> Result<()> { Ok(()) })
}

/// A record may be written when it has no tenant yet or already belongs to
/// `current`.
pub(crate) fn check_record_tenant<R: Entity>(
    access: &TenantAccess<R>,
    record: &R,
    current: &TenantId,
) -> Result<()> {
    match access.get(record) {
        Some(found) if found != current => {
            warn!(table = R::TABLE, %current, %found, "rejecting record of another tenant");
            Err(TenantError::WrongTenant {
                current: current.clone(),
                found: found.clone(),
            }
            .into())
        }
        _ => Ok(()),
    }
}

pub(crate) fn check_batch_size(
    table: &str,
    operation: &'static str,
    size: usize,
    limit: usize,
) -> Result<()> {
    if size == 0 {
        return Err(Error::EmptyBatch {
            table: table.to_string(),
            operation,
        });
    }
    if limit > 0 && size > limit {
        return Err(Error::BatchTooLarge { size, limit });
    }
    Ok(())
}
