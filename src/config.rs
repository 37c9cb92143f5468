use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Names of the lifecycle columns every mapped table uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub tenant_id: String,
    pub soft_deleted_at: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            created_at: "created_at".to_string(),
            updated_at: "updated_at".to_string(),
            tenant_id: "tenant_id".to_string(),
            soft_deleted_at: "soft_deleted_at".to_string(),
        }
    }
}

impl ColumnNames {
    fn all(&self) -> [&str; 5] {
        [
            &self.id,
            &self.created_at,
            &self.updated_at,
            &self.tenant_id,
            &self.soft_deleted_at,
        ]
    }
}

/// Mapper configuration
///
/// # Examples
///
/// ```
/// use scopemap::MapperConfig;
///
/// let config = MapperConfig::new()
///     .soft_deleted_at_column("deleted_at")
///     .max_batch_size(500);
/// assert_eq!(config.columns.soft_deleted_at, "deleted_at");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub columns: ColumnNames,

    /// Upper bound on records per mutating batch; 0 means unlimited.
    pub max_batch_size: usize,
}

impl MapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON; absent keys keep their defaults.
    ///
    /// ```
    /// # use scopemap::MapperConfig;
    /// let config = MapperConfig::from_json(r#"{"columns": {"tenant_id": "org_id"}}"#).unwrap();
    /// assert_eq!(config.columns.tenant_id, "org_id");
    /// assert_eq!(config.columns.id, "id");
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn id_column(mut self, name: &str) -> Self {
        self.columns.id = name.to_string();
        self
    }

    pub fn created_at_column(mut self, name: &str) -> Self {
        self.columns.created_at = name.to_string();
        self
    }

    pub fn updated_at_column(mut self, name: &str) -> Self {
        self.columns.updated_at = name.to_string();
        self
    }

    pub fn tenant_id_column(mut self, name: &str) -> Self {
        self.columns.tenant_id = name.to_string();
        self
    }

    pub fn soft_deleted_at_column(mut self, name: &str) -> Self {
        self.columns.soft_deleted_at = name.to_string();
        self
    }

    pub fn max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Column names must be non-empty and pairwise distinct.
    pub fn validate(&self) -> Result<()> {
        let names = self.columns.all();
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(Error::Config("column names must not be empty".to_string()));
            }
            if names[..i].contains(name) {
                return Err(Error::Config(format!(
                    "column name '{}' is used for two lifecycle columns",
                    name
                )));
            }
        }
        Ok(())
    }
}
