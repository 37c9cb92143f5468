use crate::identity::TenantId;
use thiserror::Error;

/// Failures raised by the backing store.
///
/// The mapper never wraps or retries these; they reach the caller through
/// [`Error::Store`] unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Write-write conflict on table '{table}' row {row}")]
    WriteConflict { table: String, row: usize },

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

/// Tenant isolation violations, always raised before any store call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TenantError {
    #[error("no current tenant is set for this operation")]
    NoCurrentTenant,

    #[error("record belongs to tenant '{found}', current tenant is '{current}'")]
    WrongTenant { current: TenantId, found: TenantId },

    #[error("batch contains a record of tenant '{foreign}' while current tenant is '{current}'")]
    CrossTenantDestroy { current: TenantId, foreign: TenantId },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("cannot update an unpersisted record in table '{table}'")]
    UnpersistedUpdate { table: String },

    #[error("record in table '{table}' is already persisted with id {id}")]
    AlreadyPersisted { table: String, id: String },

    #[error("empty batch passed to {operation} on table '{table}'")]
    EmptyBatch {
        table: String,
        operation: &'static str,
    },

    #[error("batch of {size} records exceeds the configured limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("table '{table}' has no {capability} capability")]
    MissingCapability {
        table: String,
        capability: &'static str,
    },

    #[error("cannot map column '{column}': {reason}")]
    Mapping { column: String, reason: String },

    #[error("tenant context is not available outside a tenant scope")]
    ContextUnavailable,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    pub(crate) fn mapping(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Mapping {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// True for the programming-error class (misuse of the API, never retried).
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::UnpersistedUpdate { .. }
                | Self::AlreadyPersisted { .. }
                | Self::EmptyBatch { .. }
                | Self::MissingCapability { .. }
                | Self::ContextUnavailable
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
