//! Soft deletes: `deleted_at` marking, read filtering and overrides.

mod common;

use common::{last_request, model, row, store};
use oxide_record::{Condition, DeleteOptions, FetchOptions, Model, ModelOptions, DELETED_AT};
use oxide_rest::Action;
use serde_json::json;

fn seed(store: &oxide_rest::MemoryStore) {
    store.seed(
        "posts",
        vec![
            json!({"title": "kept", "views": 1}),
            json!({"title": "doomed", "views": 2}),
        ],
    );
}

#[tokio::test]
async fn test_delete_marks_row_and_hides_it() {
    model!(Post, "Post", ModelOptions::new().soft_deletes(true));
    let store = store();
    seed(&store);
    Post::objects().connect(store.clone());

    let doomed = Post::objects().find(2).await.unwrap();
    let deleted = doomed.delete(DeleteOptions::default()).await.unwrap();
    assert!(deleted.get(DELETED_AT).unwrap().is_string());
    assert!(matches!(last_request(&store).action, Action::Update { .. }));

    let rows = store.rows("posts");
    assert_eq!(rows.len(), 2);
    assert!(rows[1][DELETED_AT].is_string());

    let visible = Post::objects().all(FetchOptions::new()).await.unwrap();
    assert_eq!(visible.vertical("title").to_vec(), vec![json!("kept")]);

    let filtered = Post::objects()
        .filter(vec![Condition::op("views", ">=", 0)])
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);

    assert_eq!(Post::objects().only("title", "doomed").await.unwrap().len(), 0);
    assert_eq!(
        Post::objects()
            .but("title", "kept", FetchOptions::new())
            .await
            .unwrap()
            .len(),
        0
    );
    assert_eq!(
        Post::objects()
            .select("title", FetchOptions::new())
            .await
            .unwrap()
            .len(),
        1
    );

    let everything = Post::objects()
        .all(FetchOptions::new().with_trashed())
        .await
        .unwrap();
    assert_eq!(everything.len(), 2);
}

#[tokio::test]
async fn test_static_delete_is_soft() {
    model!(Post, "Post", ModelOptions::new().soft_deletes(true));
    let store = store();
    seed(&store);
    Post::objects().connect(store.clone());

    Post::objects().delete(1).await.unwrap();
    assert_eq!(store.rows("posts").len(), 2);
    assert!(store.rows("posts")[0][DELETED_AT].is_string());
}

#[tokio::test]
async fn test_hard_mode_overrides_policy() {
    model!(Post, "Post", ModelOptions::new().soft_deletes(true));
    let store = store();
    seed(&store);
    Post::objects().connect(store.clone());

    let post = Post::objects().find(1).await.unwrap();
    post.delete(DeleteOptions::hard()).await.unwrap();
    assert!(matches!(last_request(&store).action, Action::Delete));
    assert_eq!(store.rows("posts").len(), 1);
}

#[tokio::test]
async fn test_soft_mode_without_policy() {
    model!(Post, "Post");
    let store = store();
    seed(&store);
    Post::objects().connect(store.clone());

    let post = Post::objects().find(1).await.unwrap();
    post.delete(DeleteOptions::soft()).await.unwrap();
    assert_eq!(store.rows("posts").len(), 2);

    // Without the policy, reads do not filter on deleted_at.
    let all = Post::objects().all(FetchOptions::new()).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_soft_deleted_row_is_not_updated() {
    model!(Post, "Post", ModelOptions::new().soft_deletes(true));
    let store = store();
    seed(&store);
    Post::objects().connect(store.clone());

    let mut post = Post::objects().find(1).await.unwrap();
    post.delete(DeleteOptions::default()).await.unwrap();
    post.update(row(json!({"title": "ghost"}))).await.unwrap();

    assert_eq!(store.rows("posts")[0]["title"], json!("kept"));
    assert_eq!(post.get("title"), Some(&json!("kept")));
    let request = last_request(&store);
    assert!(request
        .filters
        .iter()
        .any(|f| f.column == DELETED_AT && f.operator == "is"));
}

#[tokio::test]
async fn test_disable_soft_deletes_at_runtime() {
    model!(Post, "Post", ModelOptions::new().soft_deletes(true));
    let store = store();
    seed(&store);
    Post::objects().connect(store.clone());

    Post::objects().disable_soft_deletes();
    Post::objects().delete(1).await.unwrap();
    assert_eq!(store.rows("posts").len(), 1);
}
