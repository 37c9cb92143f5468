pub mod error;
pub mod types;
pub mod value;

pub use error::{Error, Result, StoreError, StoreResult, TenantError};
pub use types::{Column, IdStrategy, TableSchema};
pub use value::{DataType, Value};

/// Timestamps are always UTC; the store assigns them.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
