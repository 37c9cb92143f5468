// ============================================================================
// Record and tenant identity
// ============================================================================
//
// Two identity families are supported: store-assigned serial integers and
// store-assigned random UUIDs. Tenants are identified by an opaque string.
//
// ============================================================================

use crate::core::{IdStrategy, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use uuid::Uuid;

/// A record identity type the store knows how to generate.
pub trait Identity:
    Clone + PartialEq + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// How the store fills the identity column on insert.
    const STRATEGY: IdStrategy;

    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

impl Identity for i64 {
    const STRATEGY: IdStrategy = IdStrategy::Serial;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl Identity for Uuid {
    const STRATEGY: IdStrategy = IdStrategy::Uuid;

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uuid(id) => Some(*id),
            Value::Text(text) => Uuid::parse_str(text).ok(),
            _ => None,
        }
    }
}

/// Identity of the tenant owning a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Text(self.0.clone())
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(text) => Some(Self(text.clone())),
            Value::Uuid(id) => Some(Self(id.to_string())),
            Value::Integer(i) => Some(Self(i.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for TenantId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}
