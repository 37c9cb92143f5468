//! Record capabilities.
//!
//! Every mapped record implements [`Entity`]: a store-assigned identity, two
//! store-assigned timestamps and its own domain fields. Soft deletion and
//! tenant ownership are independent capabilities layered on top, so a
//! record type opts into any of the four combinations by implementing
//! [`SoftDeletable`], [`TenantScoped`], both or neither.

use crate::core::{Column, Error, Result, Timestamp, Value};
use crate::identity::{Identity, TenantId};
use crate::store::{RawRow, WriteSet};
use uuid::Uuid;

/// Lifecycle fields shared by all records. The mapper owns them: they are
/// filled from the store's response, never from client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta<Id> {
    pub id: Option<Id>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

impl<Id> Default for RecordMeta<Id> {
    fn default() -> Self {
        Self {
            id: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl<Id> RecordMeta<Id> {
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

pub trait Entity: Default + Clone + Send + Sync + 'static {
    type Id: Identity;

    /// Physical table backing every view of this record type.
    const TABLE: &'static str;

    fn meta(&self) -> &RecordMeta<Self::Id>;

    fn meta_mut(&mut self) -> &mut RecordMeta<Self::Id>;

    /// Domain columns only; lifecycle columns come from the pipeline.
    fn columns() -> Vec<Column>;

    fn write_fields(&self, out: &mut WriteSet);

    fn read_fields(&mut self, row: &RawRow) -> Result<()>;

    fn id(&self) -> Option<&Self::Id> {
        self.meta().id.as_ref()
    }

    fn is_persisted(&self) -> bool {
        self.meta().is_persisted()
    }
}

pub trait SoftDeletable: Entity {
    fn soft_deleted_at(&self) -> Option<Timestamp>;

    fn set_soft_deleted_at(&mut self, at: Option<Timestamp>);

    fn is_soft_deleted(&self) -> bool {
        self.soft_deleted_at().is_some()
    }
}

pub trait TenantScoped: Entity {
    fn tenant_id(&self) -> Option<&TenantId>;

    fn set_tenant_id(&mut self, tenant: Option<TenantId>);
}

/// Conversion of one raw column value into a typed domain field.
pub trait FieldValue: Sized {
    /// `value` is `None` when the row does not carry the column at all.
    fn from_field(column: &str, value: Option<&Value>) -> Result<Self>;
}

fn present<'a>(column: &str, value: Option<&'a Value>) -> Result<&'a Value> {
    match value {
        None => Err(Error::mapping(column, "column missing from row")),
        Some(Value::Null) => Err(Error::mapping(column, "unexpected NULL")),
        Some(value) => Ok(value),
    }
}

fn mismatch(column: &str, expected: &str, found: &Value) -> Error {
    Error::mapping(
        column,
        format!("expected {}, found {}", expected, found.type_name()),
    )
}

impl FieldValue for String {
    fn from_field(column: &str, value: Option<&Value>) -> Result<Self> {
        match present(column, value)? {
            Value::Text(text) => Ok(text.clone()),
            other => Err(mismatch(column, "TEXT", other)),
        }
    }
}

impl FieldValue for i64 {
    fn from_field(column: &str, value: Option<&Value>) -> Result<Self> {
        let value = present(column, value)?;
        value.as_i64().ok_or_else(|| mismatch(column, "INTEGER", value))
    }
}

impl FieldValue for f64 {
    fn from_field(column: &str, value: Option<&Value>) -> Result<Self> {
        match present(column, value)? {
            Value::Float(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            other => Err(mismatch(column, "FLOAT", other)),
        }
    }
}

impl FieldValue for bool {
    fn from_field(column: &str, value: Option<&Value>) -> Result<Self> {
        match present(column, value)? {
            Value::Boolean(b) => Ok(*b),
            other => Err(mismatch(column, "BOOLEAN", other)),
        }
    }
}

impl FieldValue for Timestamp {
    fn from_field(column: &str, value: Option<&Value>) -> Result<Self> {
        let value = present(column, value)?;
        value
            .as_timestamp()
            .ok_or_else(|| mismatch(column, "TIMESTAMP", value))
    }
}

impl FieldValue for Uuid {
    fn from_field(column: &str, value: Option<&Value>) -> Result<Self> {
        let value = present(column, value)?;
        <Uuid as Identity>::from_value(value).ok_or_else(|| mismatch(column, "UUID", value))
    }
}

impl FieldValue for TenantId {
    fn from_field(column: &str, value: Option<&Value>) -> Result<Self> {
        let value = present(column, value)?;
        TenantId::from_value(value).ok_or_else(|| mismatch(column, "tenant id", value))
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn from_field(column: &str, value: Option<&Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(_) => T::from_field(column, value).map(Some),
        }
    }
}

impl RawRow {
    /// Typed read of one column.
    ///
    /// ```
    /// # use scopemap::RawRow;
    /// let row = RawRow::from_iter([("title", "hello")]);
    /// let title: String = row.field("title").unwrap();
    /// let body: Option<String> = row.field("body").unwrap();
    /// assert_eq!(title, "hello");
    /// assert_eq!(body, None);
    /// ```
    pub fn field<T: FieldValue>(&self, column: &str) -> Result<T> {
        T::from_field(column, self.get(column))
    }

    pub(crate) fn identity<Id: Identity>(&self, column: &str) -> Result<Id> {
        let value = present(column, self.get(column))?;
        Id::from_value(value).ok_or_else(|| mismatch(column, "record identity", value))
    }
}
