use super::{DataType, StoreError, StoreResult, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn validate(&self, value: &Value) -> StoreResult<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(StoreError::ConstraintViolation(format!(
                    "Column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(StoreError::TypeMismatch(format!(
                "Column '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

/// How the store fills the identity column of a freshly inserted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdStrategy {
    /// Monotonic `i64` sequence starting at 1.
    Serial,
    /// Random v4 UUID.
    Uuid,
}

impl IdStrategy {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Serial => DataType::Integer,
            Self::Uuid => DataType::Uuid,
        }
    }
}

/// Physical description of one table: its columns plus the store-assigned ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    id_column: String,
    id_strategy: IdStrategy,
    created_at_column: String,
    updated_at_column: String,
}

impl TableSchema {
    pub fn new(
        name: impl Into<String>,
        id_column: impl Into<String>,
        id_strategy: IdStrategy,
        created_at_column: impl Into<String>,
        updated_at_column: impl Into<String>,
        columns: Vec<Column>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            id_column: id_column.into(),
            id_strategy,
            created_at_column: created_at_column.into(),
            updated_at_column: updated_at_column.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    pub fn created_at_column(&self) -> &str {
        &self.created_at_column
    }

    pub fn updated_at_column(&self) -> &str {
        &self.updated_at_column
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Columns the store fills itself and a client write must never carry.
    pub fn is_store_assigned(&self, name: &str) -> bool {
        name == self.id_column || name == self.created_at_column || name == self.updated_at_column
    }
}
