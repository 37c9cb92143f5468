mod common;

use common::{Draft, Note, Post, drafts, notes, posts, seed_posts, shared};
use scopemap::{
    Entity, Error, MapperConfig, MemoryStore, SoftDeleteTable, StoreError, TenantContext,
    TenantError, TenantId,
};
use std::collections::HashSet;
use uuid::Uuid;

#[tokio::test]
async fn test_empty_batches_are_rejected() {
    let store = MemoryStore::new();
    let posts = posts(&store).await;
    let mut empty: Vec<Post> = Vec::new();

    TenantContext::with_tenant("a", async {
        let errors = vec![
            posts.insert(&mut empty).await.unwrap_err(),
            posts.update(&mut empty).await.unwrap_err(),
            posts.delete(&empty).await.unwrap_err(),
            posts.soft_delete(&mut empty).await.unwrap_err(),
        ];
        let operations: Vec<&str> = errors
            .iter()
            .map(|err| match err {
                Error::EmptyBatch { operation, .. } => *operation,
                other => panic!("unexpected error: {other}"),
            })
            .collect();
        assert_eq!(operations, vec!["insert", "update", "delete", "soft_delete"]);
    })
    .await;
}

#[tokio::test]
async fn test_batch_limit_comes_from_config() {
    let store = MemoryStore::new();
    let config = MapperConfig::from_json(r#"{"max_batch_size": 2}"#).unwrap();
    let drafts = SoftDeleteTable::<Draft>::with_config(shared(&store), config).unwrap();
    drafts.ensure_table().await.unwrap();

    let mut batch = vec![Draft::new("1"), Draft::new("2"), Draft::new("3")];
    let err = drafts.insert(&mut batch).await.unwrap_err();
    assert_eq!(err, Error::BatchTooLarge { size: 3, limit: 2 });
    assert_eq!(drafts.count().await.unwrap(), 0);

    drafts.insert(&mut batch[..2]).await.unwrap();
    assert_eq!(drafts.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_update_requires_identity_for_every_record() {
    let store = MemoryStore::new();
    let notes = notes(&store).await;
    let mut persisted = vec![Note::new("saved")];
    notes.insert(&mut persisted).await.unwrap();

    let mut batch = vec![persisted[0].clone(), Note::new("never saved")];
    batch[0].title = "changed".to_string();
    let err = notes.update(&mut batch).await.unwrap_err();
    assert_eq!(
        err,
        Error::UnpersistedUpdate {
            table: Note::TABLE.to_string()
        }
    );
    assert!(err.is_programming_error());

    // Validation failed before the store saw the first record.
    let stored = notes.find(persisted[0].id().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.title, "saved");
}

#[tokio::test]
async fn test_insert_batch_is_validated_as_a_whole() {
    let store = MemoryStore::new();
    let posts = posts(&store).await;

    let mut batch = vec![Post::new("fine"), Post::new("foreign")];
    batch[1].tenant_id = Some(TenantId::from("b"));
    let err = TenantContext::with_tenant("a", posts.insert(&mut batch))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Tenant(TenantError::WrongTenant { .. })));
    assert!(batch.iter().all(|post| post.id().is_none()));
    assert_eq!(posts.live_and_deleted_for_all_tenants().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_store_errors_propagate_unchanged() {
    let store = MemoryStore::new();
    let notes = notes(&store).await;
    store.drop_table(Note::TABLE).await.unwrap();

    let mut batch = vec![Note::new("lost")];
    let err = notes.insert(&mut batch).await.unwrap_err();
    assert_eq!(
        err,
        Error::Store(StoreError::TableNotFound(Note::TABLE.to_string()))
    );
    assert!(batch[0].id().is_none());
    assert!(batch[0].meta.created_at.is_none());
}

#[tokio::test]
async fn test_uuid_identities_are_distinct() {
    let store = MemoryStore::new();
    let drafts = drafts(&store).await;

    let mut batch: Vec<Draft> = (0..5).map(|i| Draft::new(&i.to_string())).collect();
    drafts.insert(&mut batch).await.unwrap();

    let ids: HashSet<Uuid> = batch.iter().map(|d| *d.id().unwrap()).collect();
    assert_eq!(ids.len(), 5);
    assert!(!ids.contains(&Uuid::nil()));
}

#[tokio::test]
async fn test_update_refreshes_updated_at_only() {
    let store = MemoryStore::new();
    let posts = posts(&store).await;
    let mut batch = seed_posts(&posts, "a", &["x"]).await;
    let created_at = batch[0].meta.created_at.unwrap();
    let first_update = batch[0].meta.updated_at.unwrap();
    assert_eq!(created_at, first_update);

    batch[0].title = "y".to_string();
    posts.with_tenant("a").update(&mut batch).await.unwrap();
    assert_eq!(batch[0].meta.created_at, Some(created_at));
    assert!(batch[0].meta.updated_at.unwrap() > first_update);
}

#[tokio::test]
async fn test_delete_reports_unpersisted_records_as_unmatched() {
    let store = MemoryStore::new();
    let notes = notes(&store).await;
    let mut saved = vec![Note::new("saved")];
    notes.insert(&mut saved).await.unwrap();

    let batch = vec![Note::new("draft"), saved[0].clone()];
    let outcome = notes.delete(&batch).await.unwrap();
    assert_eq!(outcome.into_inner(), vec![false, true]);

    let again = notes.delete(&batch[1..]).await.unwrap();
    assert_eq!(again.count(), 0);
}

#[tokio::test]
async fn test_delete_without_tenant_touches_nothing() {
    let store = MemoryStore::new();
    let posts = posts(&store).await;
    let mut batch = seed_posts(&posts, "a", &["x"]).await;

    let err = posts.delete(&batch).await.unwrap_err();
    assert_eq!(err, Error::Tenant(TenantError::NoCurrentTenant));
    let err = posts.soft_delete(&mut batch).await.unwrap_err();
    assert_eq!(err, Error::Tenant(TenantError::NoCurrentTenant));
    assert!(batch[0].soft_deleted_at.is_none());
    assert_eq!(posts.live_for_all_tenants().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_soft_delete_rejects_a_mixed_tenant_batch_as_a_whole() {
    let store = MemoryStore::new();
    let posts = posts(&store).await;
    let own = seed_posts(&posts, "a", &["mine"]).await;
    let foreign = seed_posts(&posts, "b", &["theirs"]).await;
    let mut batch = vec![own[0].clone(), foreign[0].clone()];

    let err = TenantContext::with_tenant("a", posts.soft_delete(&mut batch))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::Tenant(TenantError::CrossTenantDestroy {
            current: TenantId::from("a"),
            foreign: TenantId::from("b"),
        })
    );

    assert!(batch.iter().all(|post| post.soft_deleted_at.is_none()));
    assert_eq!(posts.live_for_all_tenants().count().await.unwrap(), 2);
    assert_eq!(posts.deleted_for_all_tenants().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_soft_delete_without_tenant_leaves_every_marker_alone() {
    let store = MemoryStore::new();
    let posts = posts(&store).await;
    let mut batch = seed_posts(&posts, "a", &["one", "two", "three"]).await;

    let err = posts.soft_delete(&mut batch).await.unwrap_err();
    assert_eq!(err, Error::Tenant(TenantError::NoCurrentTenant));

    assert!(batch.iter().all(|post| post.soft_deleted_at.is_none()));
    assert_eq!(posts.live_for_all_tenants().count().await.unwrap(), 3);
    assert_eq!(posts.deleted_for_all_tenants().count().await.unwrap(), 0);
}
