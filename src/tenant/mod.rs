pub mod context;

pub use context::TenantContext;
