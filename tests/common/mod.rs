#![allow(dead_code)]

use scopemap::{
    Column, DataType, Entity, MemoryStore, RawRow, RecordMeta, Result, SoftDeletable,
    SoftDeleteTable, Store, Table, TenantId, TenantScoped, TenantSoftDeleteTable, TenantTable,
    Timestamp, WriteSet,
};
use std::sync::Arc;
use uuid::Uuid;

/// Bare record, serial identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Note {
    pub meta: RecordMeta<i64>,
    pub title: String,
    pub pinned: bool,
}

impl Note {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Note {
    type Id = i64;
    const TABLE: &'static str = "notes";

    fn meta(&self) -> &RecordMeta<i64> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta<i64> {
        &mut self.meta
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::new("title", DataType::Text).not_null(),
            Column::new("pinned", DataType::Boolean).not_null(),
        ]
    }

    fn write_fields(&self, out: &mut WriteSet) {
        out.set("title", self.title.as_str())
            .set("pinned", self.pinned);
    }

    fn read_fields(&mut self, row: &RawRow) -> Result<()> {
        self.title = row.field("title")?;
        self.pinned = row.field("pinned")?;
        Ok(())
    }
}

/// Soft-deletable record, uuid identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub meta: RecordMeta<Uuid>,
    pub soft_deleted_at: Option<Timestamp>,
    pub body: String,
}

impl Draft {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Draft {
    type Id = Uuid;
    const TABLE: &'static str = "drafts";

    fn meta(&self) -> &RecordMeta<Uuid> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta<Uuid> {
        &mut self.meta
    }

    fn columns() -> Vec<Column> {
        vec![Column::new("body", DataType::Text).not_null()]
    }

    fn write_fields(&self, out: &mut WriteSet) {
        out.set("body", self.body.as_str());
    }

    fn read_fields(&mut self, row: &RawRow) -> Result<()> {
        self.body = row.field("body")?;
        Ok(())
    }
}

impl SoftDeletable for Draft {
    fn soft_deleted_at(&self) -> Option<Timestamp> {
        self.soft_deleted_at
    }

    fn set_soft_deleted_at(&mut self, at: Option<Timestamp>) {
        self.soft_deleted_at = at;
    }
}

/// Tenant-owned record, uuid identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invoice {
    pub meta: RecordMeta<Uuid>,
    pub tenant_id: Option<TenantId>,
    pub amount: i64,
    pub memo: Option<String>,
}

impl Invoice {
    pub fn new(amount: i64) -> Self {
        Self {
            amount,
            ..Self::default()
        }
    }
}

impl Entity for Invoice {
    type Id = Uuid;
    const TABLE: &'static str = "invoices";

    fn meta(&self) -> &RecordMeta<Uuid> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta<Uuid> {
        &mut self.meta
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::new("amount", DataType::Integer).not_null(),
            Column::new("memo", DataType::Text),
        ]
    }

    fn write_fields(&self, out: &mut WriteSet) {
        out.set("amount", self.amount)
            .set("memo", self.memo.clone());
    }

    fn read_fields(&mut self, row: &RawRow) -> Result<()> {
        self.amount = row.field("amount")?;
        self.memo = row.field("memo")?;
        Ok(())
    }
}

impl TenantScoped for Invoice {
    fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    fn set_tenant_id(&mut self, tenant: Option<TenantId>) {
        self.tenant_id = tenant;
    }
}

/// Tenant-owned and soft-deletable record, serial identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub meta: RecordMeta<i64>,
    pub tenant_id: Option<TenantId>,
    pub soft_deleted_at: Option<Timestamp>,
    pub title: String,
}

impl Post {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Post {
    type Id = i64;
    const TABLE: &'static str = "posts";

    fn meta(&self) -> &RecordMeta<i64> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta<i64> {
        &mut self.meta
    }

    fn columns() -> Vec<Column> {
        vec![Column::new("title", DataType::Text).not_null()]
    }

    fn write_fields(&self, out: &mut WriteSet) {
        out.set("title", self.title.as_str());
    }

    fn read_fields(&mut self, row: &RawRow) -> Result<()> {
        self.title = row.field("title")?;
        Ok(())
    }
}

impl TenantScoped for Post {
    fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    fn set_tenant_id(&mut self, tenant: Option<TenantId>) {
        self.tenant_id = tenant;
    }
}

impl SoftDeletable for Post {
    fn soft_deleted_at(&self) -> Option<Timestamp> {
        self.soft_deleted_at
    }

    fn set_soft_deleted_at(&mut self, at: Option<Timestamp>) {
        self.soft_deleted_at = at;
    }
}

pub fn shared(store: &MemoryStore) -> Arc<dyn Store> {
    Arc::new(store.clone())
}

pub async fn notes(store: &MemoryStore) -> Table<Note> {
    let table = Table::new(shared(store)).unwrap();
    table.ensure_table().await.unwrap();
    table
}

pub async fn drafts(store: &MemoryStore) -> SoftDeleteTable<Draft> {
    let table = SoftDeleteTable::new(shared(store)).unwrap();
    table.ensure_table().await.unwrap();
    table
}

pub async fn invoices(store: &MemoryStore) -> TenantTable<Invoice> {
    let table = TenantTable::new(shared(store)).unwrap();
    table.ensure_table().await.unwrap();
    table
}

pub async fn posts(store: &MemoryStore) -> TenantSoftDeleteTable<Post> {
    let table = TenantSoftDeleteTable::new(shared(store)).unwrap();
    table.ensure_table().await.unwrap();
    table
}

/// Inserts one post per title under `tenant`.
pub async fn seed_posts(
    posts: &TenantSoftDeleteTable<Post>,
    tenant: &str,
    titles: &[&str],
) -> Vec<Post> {
    let mut batch: Vec<Post> = titles.iter().map(|title| Post::new(title)).collect();
    posts
        .with_tenant(tenant)
        .insert(&mut batch)
        .await
        .unwrap();
    batch
}

pub fn titles(posts: &[Post]) -> Vec<String> {
    let mut titles: Vec<String> = posts.iter().map(|p| p.title.clone()).collect();
    titles.sort();
    titles
}
