//! Create, read, update and delete through `Manager` and `Record`,
//! against an in-memory store.

mod common;

use std::time::Duration;

use common::{last_request, model, row, store};
use oxide_record::cast::casters;
use oxide_record::{
    Condition, Direction, DuplicateOptions, FetchOptions, Key, Model, ModelOptions, RecordError,
};
use oxide_rest::{Action, Cardinality};
use serde_json::{json, Value};

// ===================================================================
// create / find
// ===================================================================

#[tokio::test]
async fn test_create_stamps_equal_timestamps() {
    model!(Post, "Post");
    let store = store();
    Post::objects().connect(store.clone());

    let post = Post::objects()
        .create(row(json!({"title": "Hello", "views": 1})))
        .await
        .unwrap();

    assert!(post.is_persisted());
    assert_eq!(post.response().unwrap().status, 201);
    assert_eq!(post.get("id"), Some(&json!(1)));
    let created = post.get("created_at").unwrap();
    assert!(created.is_string());
    assert_eq!(post.get("updated_at"), Some(created));

    let request = last_request(&store);
    assert_eq!(request.table, "posts");
    assert_eq!(request.cardinality, Cardinality::Single);
    assert!(matches!(request.action, Action::Insert { .. }));
}

#[tokio::test]
async fn test_create_without_timestamps() {
    model!(Post, "Post", ModelOptions::new().timestamps(false));
    let store = store();
    Post::objects().connect(store.clone());

    let post = Post::objects()
        .create(row(json!({"title": "Plain"})))
        .await
        .unwrap();
    assert_eq!(post.get("created_at"), Some(&Value::Null));
    assert_eq!(post.get("updated_at"), Some(&Value::Null));
}

#[tokio::test]
async fn test_find_applies_casts() {
    model!(
        Post,
        "Post",
        ModelOptions::new().cast("views", casters::text())
    );
    let store = store();
    store.seed("posts", vec![json!({"title": "Cast", "views": 7})]);
    Post::objects().connect(store.clone());

    let post = Post::objects().find(1).await.unwrap();
    assert_eq!(post.get("views"), Some(&json!("7")));
    assert_eq!(post.response().unwrap().status, 200);
    assert_eq!(last_request(&store).filter_value("id", "eq"), Some(&json!(1)));
}

#[tokio::test]
async fn test_find_missing_row_is_in_band() {
    model!(Post, "Post");
    let store = store();
    Post::objects().connect(store.clone());

    let post = Post::objects().find(404).await.unwrap();
    let response = post.response().unwrap();
    assert!(!response.is_success());
    assert_eq!(response.status, 406);
    assert!(post.attributes().is_empty());
    assert!(!post.is_persisted());
}

#[tokio::test]
async fn test_find_uses_select_query() {
    model!(Post, "Post", ModelOptions::new().select("id, title"));
    let store = store();
    store.seed("posts", vec![json!({"title": "Narrow", "views": 3})]);
    Post::objects().connect(store.clone());

    let post = Post::objects().find(1).await.unwrap();
    assert_eq!(post.attributes().len(), 2);
    assert!(post.get("views").is_none());
}

#[tokio::test]
async fn test_typed_model_conversion() {
    #[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Author {
        id: i64,
        name: String,
    }
    impl Model for Author {
        const NAME: &'static str = "Author";
    }

    let store = store();
    store.seed("authors", vec![json!({"name": "Ada"})]);
    Author::objects().connect(store.clone());

    let author = Author::objects().find(1).await.unwrap();
    assert_eq!(
        author.model().unwrap(),
        Author {
            id: 1,
            name: "Ada".into()
        }
    );
}

// ===================================================================
// Reads
// ===================================================================

fn seed_posts(store: &oxide_rest::MemoryStore) {
    store.seed(
        "posts",
        vec![
            json!({"title": "alpha", "views": 10, "author_id": 1}),
            json!({"title": "beta", "views": 50, "author_id": 2}),
            json!({"title": "gamma", "views": 150, "author_id": 1}),
        ],
    );
}

#[tokio::test]
async fn test_all_with_order_and_limit() {
    model!(Post, "Post");
    let store = store();
    seed_posts(&store);
    Post::objects().connect(store.clone());

    let posts = Post::objects()
        .all(FetchOptions::new().order_by("views", Direction::Desc).limit(2))
        .await
        .unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].get("title"), Some(&json!("gamma")));
    assert_eq!(posts[1].get("title"), Some(&json!("beta")));
    assert_eq!(posts.response().unwrap().count, Some(2));

    let plain = Post::objects().all_plain(FetchOptions::new()).await.unwrap();
    assert_eq!(plain.len(), 3);
}

#[tokio::test]
async fn test_filter_resolves_operators() {
    model!(Post, "Post");
    let store = store();
    seed_posts(&store);
    Post::objects().connect(store.clone());

    let popular = Post::objects()
        .filter(vec![Condition::op("views", "greater than", 20)])
        .await
        .unwrap();
    assert_eq!(popular.vertical("title").to_vec(), vec![json!("beta"), json!("gamma")]);

    let not_alpha = Post::objects()
        .filter(vec![Condition::op("title", "!=", "alpha")])
        .await
        .unwrap();
    assert_eq!(not_alpha.len(), 2);
    let request = last_request(&store);
    assert!(request.filters[0].negated);
    assert_eq!(request.filters[0].operator, "eq");

    let listed = Post::objects()
        .filter(vec![
            Condition::op("id", "within", json!([1, 3])),
            ("author_id", 1).into(),
        ])
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn test_unknown_operator_passes_through() {
    model!(Post, "Post");
    let store = store();
    seed_posts(&store);
    Post::objects().connect(store.clone());

    let result = Post::objects()
        .filter(vec![Condition::op("title", "ilike", "A%")])
        .await
        .unwrap();
    assert_eq!(result.len(), 1);

    let rejected = Post::objects()
        .filter(vec![Condition::op("title", "resembles", "alpha")])
        .await
        .unwrap();
    assert!(rejected.is_empty());
    assert_eq!(rejected.response().unwrap().status, 400);
}

#[tokio::test]
async fn test_first_but_only_select() {
    model!(Post, "Post");
    let store = store();
    seed_posts(&store);
    Post::objects().connect(store.clone());

    let first = Post::objects()
        .first(vec![Condition::eq("author_id", 1)])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.get("title"), Some(&json!("alpha")));
    assert!(Post::objects()
        .first(vec![Condition::eq("author_id", 99)])
        .await
        .unwrap()
        .is_none());

    let others = Post::objects()
        .but("title", "alpha", FetchOptions::new())
        .await
        .unwrap();
    assert_eq!(others.len(), 2);

    let only = Post::objects().only("author_id", 2).await.unwrap();
    assert_eq!(only.len(), 1);

    let titles = Post::objects().select("title", FetchOptions::new()).await.unwrap();
    assert_eq!(titles[0], json!({"title": "alpha"}));
}

// ===================================================================
// Updates
// ===================================================================

#[tokio::test]
async fn test_update_advances_only_updated_at() {
    model!(Post, "Post");
    let store = store();
    Post::objects().connect(store.clone());

    let mut post = Post::objects()
        .create(row(json!({"title": "Draft"})))
        .await
        .unwrap();
    let created = post.get("created_at").cloned().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    post.update(row(json!({"title": "Final", "updated_at": null})))
        .await
        .unwrap();
    assert!(post.response().unwrap().is_success());

    let stored = &store.rows("posts")[0];
    assert_eq!(stored["title"], json!("Final"));
    assert_eq!(stored["created_at"], created);
    assert!(stored["updated_at"].is_string());
    assert_ne!(stored["updated_at"], created);
    assert_eq!(post.get("updated_at"), Some(&stored["updated_at"]));
}

#[tokio::test]
async fn test_update_without_updated_at_leaves_it() {
    model!(Post, "Post");
    let store = store();
    Post::objects().connect(store.clone());

    let mut post = Post::objects()
        .create(row(json!({"title": "Draft"})))
        .await
        .unwrap();
    let before = post.get("updated_at").cloned().unwrap();
    post.persist("title", "Renamed").await.unwrap();

    let stored = &store.rows("posts")[0];
    assert_eq!(stored["title"], json!("Renamed"));
    assert_eq!(stored["updated_at"], before);
}

#[tokio::test]
async fn test_update_reads_back_cast_row() {
    model!(
        Post,
        "Post",
        ModelOptions::new().cast("views", casters::integer())
    );
    let store = store();
    store.seed("posts", vec![json!({"title": "Draft", "views": 1})]);
    Post::objects().connect(store.clone());

    let mut post = Post::objects().find(1).await.unwrap();
    post.update(row(json!({"views": "12"}))).await.unwrap();
    assert_eq!(store.rows("posts")[0]["views"], json!("12"));
    assert_eq!(post.get("views"), Some(&json!(12)));
}

#[tokio::test]
async fn test_rejected_update_leaves_attributes() {
    model!(Post, "Post");
    let store = store();
    store.seed("posts", vec![json!({"title": "Draft"})]);
    Post::objects().connect(store.clone());

    let mut post = Post::objects().find(1).await.unwrap();
    post.update(row(json!({"missing_column": 1}))).await.unwrap();
    assert!(!post.response().unwrap().is_success());
    assert_eq!(post.get("title"), Some(&json!("Draft")));
    assert!(post.get("missing_column").is_none());
}

#[tokio::test]
async fn test_update_rejects_identifier_change() {
    model!(Post, "Post");
    let store = store();
    store.seed("posts", vec![json!({"title": "Fixed"})]);
    Post::objects().connect(store.clone());

    let mut post = Post::objects().find(1).await.unwrap();
    store.clear_calls();
    let err = post.update(row(json!({"id": 2}))).await.unwrap_err();
    assert!(matches!(err, RecordError::ImmutableIdentifier(column) if column == "id"));
    assert!(store.requests().is_empty());
    assert_eq!(post.get("id"), Some(&json!(1)));
}

#[tokio::test]
async fn test_static_update() {
    model!(Post, "Post");
    let store = store();
    store.seed("posts", vec![json!({"title": "Before", "updated_at": "2020-01-01T00:00:00Z"})]);
    Post::objects().connect(store.clone());

    let post = Post::objects()
        .update(1, row(json!({"title": "After", "updated_at": null})))
        .await
        .unwrap();
    assert_eq!(post.get("title"), Some(&json!("After")));
    assert_ne!(post.get("updated_at"), Some(&json!("2020-01-01T00:00:00Z")));
    assert!(post.get("updated_at").unwrap().is_string());
}

#[tokio::test]
async fn test_refresh_and_fetch() {
    model!(Post, "Post");
    let store = store();
    store.seed("posts", vec![json!({"title": "Old"})]);
    Post::objects().connect(store.clone());

    let mut post = Post::objects().find(1).await.unwrap();
    store.apply(
        oxide_rest::RequestBuilder::from("posts")
            .update(row(json!({"title": "New"})))
            .eq("id", 1)
            .build(),
    );
    assert_eq!(post.get("title"), Some(&json!("Old")));
    assert_eq!(post.fetch("title").await.unwrap(), Some(json!("New")));
}

// ===================================================================
// Delete / duplicate / save
// ===================================================================

#[tokio::test]
async fn test_hard_delete() {
    model!(Post, "Post");
    let store = store();
    seed_posts(&store);
    Post::objects().connect(store.clone());

    let deleted = Post::objects().delete(2).await.unwrap();
    assert_eq!(deleted.get("title"), Some(&json!("beta")));
    assert_eq!(store.rows("posts").len(), 2);
    assert!(matches!(last_request(&store).action, Action::Delete));
}

#[tokio::test]
async fn test_composite_delete_filters_each_column() {
    model!(
        PostTag,
        "PostTag",
        ModelOptions::new().composite_id(&["post_id", "tag_id"]).timestamps(false)
    );
    let store = store();
    store.seed(
        "post_tags",
        vec![
            json!({"post_id": 1, "tag_id": 10}),
            json!({"post_id": 1, "tag_id": 11}),
        ],
    );
    PostTag::objects().connect(store.clone());

    PostTag::objects()
        .delete(Key::composite([("post_id", 1), ("tag_id", 11)]))
        .await
        .unwrap();
    let request = last_request(&store);
    assert_eq!(request.filter_value("post_id", "eq"), Some(&json!(1)));
    assert_eq!(request.filter_value("tag_id", "eq"), Some(&json!(11)));
    assert_eq!(store.rows("post_tags").len(), 1);
}

#[tokio::test]
async fn test_key_arity_is_checked_before_any_request() {
    model!(
        PostTag,
        "PostTag",
        ModelOptions::new().composite_id(&["post_id", "tag_id"])
    );
    model!(Post, "Post");
    let store = store();
    PostTag::objects().connect(store.clone());
    Post::objects().connect(store.clone());

    let err = PostTag::objects().delete(1).await.unwrap_err();
    assert!(matches!(err, RecordError::IdentifierArity { .. }));
    let err = PostTag::objects()
        .update(1, row(json!({"pinned": true})))
        .await
        .unwrap_err();
    assert!(matches!(err, RecordError::IdentifierArity { .. }));
    let err = Post::objects()
        .delete(Key::composite([("id", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, RecordError::IdentifierArity { .. }));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_duplicate_drops_identifier_and_restamps() {
    model!(Post, "Post");
    let store = store();
    store.seed(
        "posts",
        vec![json!({
            "title": "Original",
            "views": 9,
            "created_at": "2020-01-01T00:00:00Z",
            "updated_at": "2020-01-01T00:00:00Z"
        })],
    );
    Post::objects().connect(store.clone());

    let copy = Post::objects()
        .duplicate(1, DuplicateOptions::except(&["views"]))
        .await
        .unwrap();
    assert_eq!(copy.get("id"), Some(&json!(2)));
    assert_eq!(copy.get("title"), Some(&json!("Original")));
    assert_eq!(copy.get("views"), Some(&Value::Null));
    assert_ne!(copy.get("created_at"), Some(&json!("2020-01-01T00:00:00Z")));

    let only = Post::objects()
        .find(1)
        .await
        .unwrap()
        .duplicate(DuplicateOptions::only(&["title"]))
        .await
        .unwrap();
    assert_eq!(only.get("id"), Some(&json!(3)));
    assert_eq!(only.get("created_at"), Some(&Value::Null));
}

#[tokio::test]
async fn test_save_merges_additional_data() {
    model!(Post, "Post");
    let store = store();
    Post::objects().connect(store.clone());

    let mut draft = Post::objects().blank().await.unwrap();
    draft.set("title", "Saved").unwrap();
    let saved = draft
        .save(Some(row(json!({"views": 4}))))
        .await
        .unwrap();
    assert!(saved.is_persisted());
    assert_eq!(saved.get("views"), Some(&json!(4)));
    assert!(saved.get("created_at").unwrap().is_string());
    assert!(!draft.is_persisted());
}

// ===================================================================
// Construction
// ===================================================================

#[tokio::test]
async fn test_make_separates_envelope() {
    model!(Post, "Post");
    let store = store();
    Post::objects().connect(store.clone());

    let post = Post::objects()
        .make(
            json!({"data": {"id": 5, "title": "Wrapped"}, "error": null, "status": 200, "count": 1}),
            None,
        )
        .await
        .unwrap();
    assert_eq!(post.get("title"), Some(&json!("Wrapped")));
    assert_eq!(post.response().unwrap().count, Some(1));
    assert!(post.get("status").is_none());

    let collected = Post::objects().collect(vec![json!({"id": 1}), json!({"id": 2})]);
    assert_eq!(collected.len(), 2);
    assert!(collected.every(oxide_record::Record::is_persisted));
}
