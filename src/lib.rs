// ============================================================================
// scopemap Library
// ============================================================================

//! Tenant-isolated, soft-deletable record mapping over a pluggable store.
//!
//! A record type implements [`Entity`] and optionally [`SoftDeletable`] and
//! [`TenantScoped`]. The matching table type decides which rows an operation
//! may see or touch through composable [`ScopeView`]s, and keeps identity,
//! timestamps, tenant ownership and the soft-delete marker consistent with
//! what the [`Store`] reports.
//!
//! # Examples
//!
//! ```
//! use scopemap::{
//!     Column, DataType, Entity, MemoryStore, RawRow, RecordMeta, Result, SoftDeletable,
//!     TenantContext, TenantScoped, TenantId, TenantSoftDeleteTable, Timestamp, WriteSet,
//! };
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Default)]
//! struct Post {
//!     meta: RecordMeta<i64>,
//!     tenant_id: Option<TenantId>,
//!     soft_deleted_at: Option<Timestamp>,
//!     title: String,
//! }
//!
//! impl Entity for Post {
//!     type Id = i64;
//!     const TABLE: &'static str = "posts";
//!
//!     fn meta(&self) -> &RecordMeta<i64> { &self.meta }
//!     fn meta_mut(&mut self) -> &mut RecordMeta<i64> { &mut self.meta }
//!
//!     fn columns() -> Vec<Column> {
//!         vec![Column::new("title", DataType::Text).not_null()]
//!     }
//!
//!     fn write_fields(&self, out: &mut WriteSet) {
//!         out.set("title", self.title.as_str());
//!     }
//!
//!     fn read_fields(&mut self, row: &RawRow) -> Result<()> {
//!         self.title = row.field("title")?;
//!         Ok(())
//!     }
//! }
//!
//! impl TenantScoped for Post {
//!     fn tenant_id(&self) -> Option<&TenantId> { self.tenant_id.as_ref() }
//!     fn set_tenant_id(&mut self, tenant: Option<TenantId>) { self.tenant_id = tenant; }
//! }
//!
//! impl SoftDeletable for Post {
//!     fn soft_deleted_at(&self) -> Option<Timestamp> { self.soft_deleted_at }
//!     fn set_soft_deleted_at(&mut self, at: Option<Timestamp>) { self.soft_deleted_at = at; }
//! }
//!
//! # tokio_test::block_on(async {
//! let posts = TenantSoftDeleteTable::<Post>::new(Arc::new(MemoryStore::new()))?;
//! posts.ensure_table().await?;
//!
//! TenantContext::with_tenant("acme", async {
//!     let mut batch = vec![Post { title: "hello".into(), ..Post::default() }];
//!     posts.insert(&mut batch).await?;
//!     assert_eq!(batch[0].tenant_id, Some(TenantId::from("acme")));
//!
//!     assert!(posts.soft_delete(&mut batch).await?.all_matched());
//!     assert!(posts.select().await?.is_empty());
//!     assert_eq!(posts.deleted().select().await?.len(), 1);
//!     Ok::<_, scopemap::Error>(())
//! })
//! .await?;
//! # Ok::<_, scopemap::Error>(())
//! # }).unwrap();
//! ```

pub mod config;
pub mod core;
pub mod identity;
pub mod mapper;
pub mod predicate;
pub mod record;
pub mod store;
pub mod tenant;

pub use config::{ColumnNames, MapperConfig};
pub use core::{
    Column, DataType, Error, IdStrategy, Result, StoreError, StoreResult, TableSchema,
    TenantError, Timestamp, Value,
};
pub use identity::{Identity, TenantId};
pub use mapper::{
    BatchOutcome, FieldPipeline, Lifecycle, ScopeView, SoftDeleteTable, Table, TenantAxis,
    TenantSoftDeleteTable, TenantTable,
};
pub use predicate::{CompareOp, Predicate};
pub use record::{Entity, FieldValue, RecordMeta, SoftDeletable, TenantScoped};
pub use store::{MemoryStore, RawRow, RowUpdate, Store, UnitOfWork, WriteSet, with_unit_of_work};
pub use tenant::TenantContext;
