// ============================================================================
// Field population pipeline
// ============================================================================
//
// Bidirectional mapping between a record and a raw row, built from ordered
// stages: identity -> timestamps -> tenant id -> soft-delete marker -> domain.
// Each capability contributes one stage. Stages own disjoint columns, so no
// stage ever reads what another wrote in the same pass; the pipeline refuses
// to assemble stages that overlap.
//
// ============================================================================

use super::access::{SoftDeleteAccess, TenantAccess};
use crate::config::ColumnNames;
use crate::core::{Column, DataType, Error, Result, Timestamp};
use crate::identity::{Identity, TenantId};
use crate::record::Entity;
use crate::store::{RawRow, WriteSet};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Per-call instructions for the write half of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    skip: BTreeSet<String>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, column: impl Into<String>) -> Self {
        self.skip.insert(column.into());
        self
    }

    pub fn skips(&self, column: &str) -> bool {
        self.skip.contains(column)
    }
}

pub trait FieldStage<R>: Send + Sync {
    fn name(&self) -> &'static str;

    fn columns(&self) -> Vec<Column>;

    fn read(&self, row: &RawRow, record: &mut R) -> Result<()>;

    fn write(&self, record: &R, out: &mut WriteSet, options: &WriteOptions);
}

/// Reads the store-assigned identity. Never writes it: rows are addressed
/// by predicate, and new identities come from the store.
pub struct IdentityStage {
    column: String,
}

impl<R: Entity> FieldStage<R> for IdentityStage {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn columns(&self) -> Vec<Column> {
        vec![Column::new(&self.column, <R::Id as Identity>::STRATEGY.data_type()).not_null()]
    }

    fn read(&self, row: &RawRow, record: &mut R) -> Result<()> {
        record.meta_mut().id = Some(row.identity(&self.column)?);
        Ok(())
    }

    fn write(&self, _record: &R, _out: &mut WriteSet, _options: &WriteOptions) {}
}

/// Store-assigned `created_at` / `updated_at`, read-only from the client side.
pub struct TimestampStage {
    created_at: String,
    updated_at: String,
}

impl<R: Entity> FieldStage<R> for TimestampStage {
    fn name(&self) -> &'static str {
        "timestamps"
    }

    fn columns(&self) -> Vec<Column> {
        vec![
            Column::new(&self.created_at, DataType::Timestamp).not_null(),
            Column::new(&self.updated_at, DataType::Timestamp).not_null(),
        ]
    }

    fn read(&self, row: &RawRow, record: &mut R) -> Result<()> {
        let meta = record.meta_mut();
        meta.created_at = Some(row.field(&self.created_at)?);
        meta.updated_at = Some(row.field(&self.updated_at)?);
        Ok(())
    }

    fn write(&self, _record: &R, _out: &mut WriteSet, _options: &WriteOptions) {}
}

pub struct TenantStage<R> {
    column: String,
    access: TenantAccess<R>,
}

impl<R: Entity> FieldStage<R> for TenantStage<R> {
    fn name(&self) -> &'static str {
        "tenant"
    }

    fn columns(&self) -> Vec<Column> {
        vec![Column::new(&self.column, DataType::Text).not_null()]
    }

    fn read(&self, row: &RawRow, record: &mut R) -> Result<()> {
        let tenant: Option<TenantId> = row.field(&self.column)?;
        self.access.set(record, tenant);
        Ok(())
    }

    fn write(&self, record: &R, out: &mut WriteSet, options: &WriteOptions) {
        if options.skips(&self.column) {
            return;
        }
        if let Some(tenant) = self.access.get(record) {
            out.set(&self.column, tenant.to_value());
        }
    }
}

/// Writes the marker only when it is set, so no write ever clears it.
pub struct SoftDeleteStage<R> {
    column: String,
    access: SoftDeleteAccess<R>,
}

impl<R: Entity> FieldStage<R> for SoftDeleteStage<R> {
    fn name(&self) -> &'static str {
        "soft_delete"
    }

    fn columns(&self) -> Vec<Column> {
        vec![Column::new(&self.column, DataType::Timestamp)]
    }

    fn read(&self, row: &RawRow, record: &mut R) -> Result<()> {
        let at: Option<Timestamp> = row.field(&self.column)?;
        self.access.set(record, at);
        Ok(())
    }

    fn write(&self, record: &R, out: &mut WriteSet, options: &WriteOptions) {
        if options.skips(&self.column) {
            return;
        }
        if let Some(at) = self.access.get(record) {
            out.set(&self.column, at);
        }
    }
}

/// The record's own fields. Writes are limited to the columns the record
/// declares, so domain code cannot overwrite a lifecycle column.
pub struct DomainStage {
    declared: BTreeSet<String>,
}

impl DomainStage {
    fn of<R: Entity>() -> Self {
        Self {
            declared: R::columns().into_iter().map(|c| c.name).collect(),
        }
    }
}

impl<R: Entity> FieldStage<R> for DomainStage {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn columns(&self) -> Vec<Column> {
        R::columns()
    }

    fn read(&self, row: &RawRow, record: &mut R) -> Result<()> {
        record.read_fields(row)
    }

    fn write(&self, record: &R, out: &mut WriteSet, options: &WriteOptions) {
        let mut fields = WriteSet::new();
        record.write_fields(&mut fields);
        for (column, value) in fields.iter() {
            if !self.declared.contains(column) {
                warn!(table = R::TABLE, %column, "dropping write to undeclared column");
                continue;
            }
            if !options.skips(column) {
                out.set(column.clone(), value.clone());
            }
        }
    }
}

pub struct FieldPipeline<R> {
    stages: Vec<Arc<dyn FieldStage<R>>>,
}

impl<R> Clone for FieldPipeline<R> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<R> std::fmt::Debug for FieldPipeline<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|stage| stage.name()))
            .finish()
    }
}

impl<R: Entity> FieldPipeline<R> {
    /// Stages in their fixed order; capability stages only when provided.
    pub(crate) fn assemble(
        columns: &ColumnNames,
        tenant: Option<TenantAccess<R>>,
        soft_delete: Option<SoftDeleteAccess<R>>,
    ) -> Result<Self> {
        let mut pipeline = Self { stages: Vec::new() };
        pipeline.push(IdentityStage {
            column: columns.id.clone(),
        })?;
        pipeline.push(TimestampStage {
            created_at: columns.created_at.clone(),
            updated_at: columns.updated_at.clone(),
        })?;
        if let Some(access) = tenant {
            pipeline.push(TenantStage {
                column: columns.tenant_id.clone(),
                access,
            })?;
        }
        if let Some(access) = soft_delete {
            pipeline.push(SoftDeleteStage {
                column: columns.soft_deleted_at.clone(),
                access,
            })?;
        }
        pipeline.push(DomainStage::of::<R>())?;
        Ok(pipeline)
    }

    fn push(&mut self, stage: impl FieldStage<R> + 'static) -> Result<()> {
        let taken: BTreeSet<String> = self.columns().into_iter().map(|c| c.name).collect();
        for column in stage.columns() {
            if taken.contains(&column.name) {
                return Err(Error::Config(format!(
                    "column '{}' of stage '{}' is already owned by another stage",
                    column.name,
                    stage.name()
                )));
            }
        }
        self.stages.push(Arc::new(stage));
        Ok(())
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn columns(&self) -> Vec<Column> {
        self.stages.iter().flat_map(|stage| stage.columns()).collect()
    }

    pub fn row_to_record(&self, row: &RawRow) -> Result<R> {
        let mut record = R::default();
        for stage in &self.stages {
            stage.read(row, &mut record)?;
        }
        Ok(record)
    }

    pub fn record_to_write(&self, record: &R, options: &WriteOptions) -> WriteSet {
        let mut out = WriteSet::new();
        for stage in &self.stages {
            stage.write(record, &mut out, options);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::record::{RecordMeta, SoftDeletable, TenantScoped};
    use chrono::Utc;

    #[derive(Debug, Clone, Default)]
    struct Ticket {
        meta: RecordMeta<i64>,
        tenant: Option<TenantId>,
        closed_at: Option<Timestamp>,
        subject: String,
        priority: Option<i64>,
        rogue: bool,
        saw_identity: bool,
    }

    impl Entity for Ticket {
        type Id = i64;
        const TABLE: &'static str = "tickets";

        fn meta(&self) -> &RecordMeta<i64> {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut RecordMeta<i64> {
            &mut self.meta
        }

        fn columns() -> Vec<Column> {
            vec![
                Column::new("subject", DataType::Text).not_null(),
                Column::new("priority", DataType::Integer),
            ]
        }

        fn write_fields(&self, out: &mut WriteSet) {
            out.set("subject", self.subject.as_str());
            if let Some(priority) = self.priority {
                out.set("priority", priority);
            }
            if self.rogue {
                out.set("tenant_id", "intruder");
                out.set("soft_deleted_at", Value::Null);
            }
        }

        fn read_fields(&mut self, row: &RawRow) -> Result<()> {
            self.saw_identity = self.meta.id.is_some();
            self.subject = row.field("subject")?;
            self.priority = row.field("priority")?;
            Ok(())
        }
    }

    impl TenantScoped for Ticket {
        fn tenant_id(&self) -> Option<&TenantId> {
            self.tenant.as_ref()
        }

        fn set_tenant_id(&mut self, tenant: Option<TenantId>) {
            self.tenant = tenant;
        }
    }

    impl SoftDeletable for Ticket {
        fn soft_deleted_at(&self) -> Option<Timestamp> {
            self.closed_at
        }

        fn set_soft_deleted_at(&mut self, at: Option<Timestamp>) {
            self.closed_at = at;
        }
    }

    fn pipeline() -> FieldPipeline<Ticket> {
        FieldPipeline::assemble(
            &ColumnNames::default(),
            Some(TenantAccess::of()),
            Some(SoftDeleteAccess::of()),
        )
        .unwrap()
    }

    fn ticket(subject: &str) -> Ticket {
        Ticket {
            subject: subject.to_string(),
            tenant: Some(TenantId::from("acme")),
            ..Ticket::default()
        }
    }

    fn stored_row() -> RawRow {
        let now = Utc::now();
        RawRow::from_iter([
            ("id", Value::Integer(7)),
            ("created_at", Value::from(now)),
            ("updated_at", Value::from(now)),
            ("tenant_id", Value::from("acme")),
            ("soft_deleted_at", Value::Null),
            ("subject", Value::from("printer on fire")),
            ("priority", Value::Integer(1)),
        ])
    }

    #[test]
    fn write_omits_null_marker_and_store_owned_columns() {
        let out = pipeline().record_to_write(&ticket("hello"), &WriteOptions::new());
        let columns: Vec<&str> = out.columns().collect();
        assert_eq!(columns, vec!["subject", "tenant_id"]);
    }

    #[test]
    fn write_includes_a_set_marker() {
        let mut closed = ticket("done");
        let at = Utc::now();
        closed.closed_at = Some(at);
        let out = pipeline().record_to_write(&closed, &WriteOptions::new());
        assert_eq!(out.get("soft_deleted_at"), Some(&Value::from(at)));
    }

    #[test]
    fn skipped_columns_are_not_written() {
        let mut record = ticket("quiet");
        record.priority = Some(3);
        let options = WriteOptions::new().skip("tenant_id").skip("priority");
        let out = pipeline().record_to_write(&record, &options);
        assert!(!out.contains("tenant_id"));
        assert!(!out.contains("priority"));
        assert_eq!(out.get("subject"), Some(&Value::from("quiet")));
    }

    #[test]
    fn domain_writes_cannot_reach_lifecycle_columns() {
        let mut record = ticket("sneaky");
        record.rogue = true;
        let at = Utc::now();
        record.closed_at = Some(at);
        let out = pipeline().record_to_write(&record, &WriteOptions::new());
        assert_eq!(out.get("tenant_id"), Some(&Value::from("acme")));
        assert_eq!(out.get("soft_deleted_at"), Some(&Value::from(at)));
    }

    #[test]
    fn read_runs_stages_in_order() {
        let record = pipeline().row_to_record(&stored_row()).unwrap();
        assert_eq!(record.meta.id, Some(7));
        assert!(record.meta.created_at.is_some());
        assert_eq!(record.tenant, Some(TenantId::from("acme")));
        assert_eq!(record.closed_at, None);
        assert_eq!(record.subject, "printer on fire");
        assert_eq!(record.priority, Some(1));
        // The domain stage runs after identity.
        assert!(record.saw_identity);
    }

    #[test]
    fn read_reports_missing_domain_column() {
        let row: RawRow = stored_row()
            .iter()
            .filter(|(column, _)| column.as_str() != "subject")
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();
        let err = pipeline().row_to_record(&row).unwrap_err();
        assert!(matches!(err, Error::Mapping { ref column, .. } if column == "subject"));
    }

    #[test]
    fn read_reports_mistyped_identity() {
        let mut row = stored_row();
        row.insert("id", "seven");
        let err = pipeline().row_to_record(&row).unwrap_err();
        assert!(matches!(err, Error::Mapping { ref column, .. } if column == "id"));
    }

    #[test]
    fn tenant_column_is_required_by_the_schema() {
        let columns = pipeline().columns();
        let tenant = columns.iter().find(|c| c.name == "tenant_id").unwrap();
        assert!(!tenant.nullable);
    }
}
