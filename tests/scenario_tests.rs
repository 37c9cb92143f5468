mod common;

use common::{Post, posts, seed_posts};
use scopemap::{Entity, Error, MemoryStore, TenantContext, TenantError, TenantId};

// Insert under an ambient tenant, then read back as that tenant and another.
#[tokio::test]
async fn test_scenario_a_insert_is_visible_only_to_its_tenant() {
    let store = MemoryStore::new();
    let posts = posts(&store).await;

    let mut batch = vec![Post::new("quarterly report")];
    TenantContext::with_tenant("t1", async {
        posts.insert(&mut batch).await.unwrap();
    })
    .await;

    let post = &batch[0];
    assert!(post.id().is_some());
    assert_eq!(post.tenant_id, Some(TenantId::from("t1")));

    let seen_by_t1 = TenantContext::with_tenant("t1", posts.select()).await.unwrap();
    assert_eq!(seen_by_t1, vec![post.clone()]);

    let seen_by_t2 = TenantContext::with_tenant("t2", posts.select()).await.unwrap();
    assert!(seen_by_t2.is_empty());
}

#[tokio::test]
async fn test_scenario_b_soft_delete_moves_record_between_views() {
    let store = MemoryStore::new();
    let posts = posts(&store).await;
    let mut batch = seed_posts(&posts, "t1", &["draft"]).await;

    TenantContext::with_tenant("t1", async {
        let outcome = posts.soft_delete(&mut batch).await.unwrap();
        assert!(outcome.all_matched());
        assert!(batch[0].soft_deleted_at.is_some());

        assert!(posts.select().await.unwrap().is_empty());

        let deleted = posts.deleted().select().await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id(), batch[0].id());
        assert_eq!(deleted[0].soft_deleted_at, batch[0].soft_deleted_at);
    })
    .await;
}

#[tokio::test]
async fn test_scenario_c_update_after_soft_delete_depends_on_view() {
    let store = MemoryStore::new();
    let posts = posts(&store).await;
    let mut batch = seed_posts(&posts, "t1", &["original"]).await;

    TenantContext::with_tenant("t1", async {
        posts.soft_delete(&mut batch).await.unwrap();

        batch[0].title = "through deleted view".to_string();
        let outcome = posts.deleted().update(&mut batch).await.unwrap();
        assert!(outcome.all_matched());
        assert_eq!(outcome.count(), 1);

        batch[0].title = "through live view".to_string();
        let outcome = posts.update(&mut batch).await.unwrap();
        assert!(!outcome.all_matched());
        assert_eq!(outcome.count(), 0);
        assert_eq!(outcome.get(0), Some(false));

        let id = batch[0].id().copied().unwrap();
        let stored = posts.live_and_deleted().find(&id).await.unwrap().unwrap();
        assert_eq!(stored.title, "through deleted view");
        // The rejected change stays in memory only.
        assert_eq!(batch[0].title, "through live view");
    })
    .await;
}

#[tokio::test]
async fn test_scenario_d_mixed_tenant_delete_touches_nothing() {
    let store = MemoryStore::new();
    let posts = posts(&store).await;
    let ours = seed_posts(&posts, "a", &["ours"]).await;
    let theirs = seed_posts(&posts, "b", &["theirs"]).await;
    let batch = vec![ours[0].clone(), theirs[0].clone()];

    let err = TenantContext::with_tenant("a", posts.delete(&batch))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::Tenant(TenantError::CrossTenantDestroy {
            current: "a".into(),
            foreign: "b".into(),
        })
    );

    let everything = posts.live_and_deleted_for_all_tenants();
    assert_eq!(everything.count().await.unwrap(), 2);
    assert_eq!(store.row_count(Post::TABLE).await.unwrap(), 2);
}

#[tokio::test]
async fn test_scenario_e_insert_without_tenant_is_rejected() {
    let store = MemoryStore::new();
    let posts = posts(&store).await;
    let mut batch = vec![Post::new("orphan")];

    let err = TenantContext::scope(posts.insert(&mut batch)).await.unwrap_err();
    assert_eq!(err, Error::Tenant(TenantError::NoCurrentTenant));
    assert!(batch[0].id().is_none());
    assert!(batch[0].tenant_id.is_none());

    // Outside any tenant scope at all.
    let err = posts.insert(&mut batch).await.unwrap_err();
    assert_eq!(err, Error::Tenant(TenantError::NoCurrentTenant));
    assert!(batch[0].id().is_none());

    assert_eq!(store.row_count(Post::TABLE).await.unwrap(), 0);
}
