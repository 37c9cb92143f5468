//! The mapping engine: table types, scope views and the field pipeline.

mod access;
pub mod mutation;
pub mod pipeline;
pub mod tables;
pub mod validation;
pub mod view;

pub use access::{SoftDeleteAccess, TenantAccess};
pub use mutation::BatchOutcome;
pub use pipeline::{FieldPipeline, FieldStage, WriteOptions};
pub use tables::{SoftDeleteTable, Table, TenantSoftDeleteTable, TenantTable};
pub use validation::{BatchGuard, current_tenant_guard, pass_through};
pub use view::{Lifecycle, ScopeView, TenantAxis};
