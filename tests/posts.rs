//! Post CRUD, pinning and view counting.

mod common;

use axum::http::StatusCode;
use common::app;
use serde_json::json;
use uuid::Uuid;

// ===========================================================================
// Post creation
// ===========================================================================

#[tokio::test]
async fn create_post_starts_private_and_unapproved() {
    let app = app().await;
    let user = app.create_user("post_create").await;

    let resp = app
        .post_json(
            "/v1/posts",
            json!({ "title": "First post", "content": "hello" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert!(body["id"].is_string());
    assert_eq!(body["title"].as_str().unwrap(), "First post");
    assert_eq!(body["visibility"].as_str().unwrap(), "private");
    assert_eq!(body["is_create_approved"].as_bool().unwrap(), false);
    assert_eq!(body["author"]["id"].as_str().unwrap(), user.id.to_string());
}

#[tokio::test]
async fn create_post_requires_auth() {
    let app = app().await;

    let resp = app
        .post_json("/v1/posts", json!({ "title": "anon", "content": "x" }), None)
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_post_title_too_long() {
    let app = app().await;
    let user = app.create_user("post_longtitle").await;

    let resp = app
        .post_json(
            "/v1/posts",
            json!({ "title": "a".repeat(101), "content": "x" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "title must be at most 100 characters");
}

#[tokio::test]
async fn posted_as_alias_requires_staff() {
    let app = app().await;
    let user = app.create_user("post_alias_user").await;
    let auditor = app.create_auditor("post_alias_aud").await;

    let resp = app
        .post_json(
            "/v1/posts",
            json!({ "title": "alias", "content": "x", "posted_as": "Announcements" }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .post_json(
            "/v1/posts",
            json!({ "title": "alias", "content": "x", "posted_as": "Announcements" }),
            Some(&auditor.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["posted_as"].as_str().unwrap(), "Announcements");
}

// ===========================================================================
// Detail fetch & view counting
// ===========================================================================

#[tokio::test]
async fn get_nonexistent_post() {
    let app = app().await;

    let resp = app.get(&format!("/v1/posts/{}", Uuid::new_v4()), None).await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "post not found");
}

#[tokio::test]
async fn approved_post_visible_to_anonymous() {
    let app = app().await;
    let user = app.create_user("post_pub_u").await;
    let auditor = app.create_auditor("post_pub_a").await;
    let post_id = app.create_approved_post_for(&user, &auditor, "Public post").await;

    let resp = app.get(&format!("/v1/posts/{}", post_id), None).await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["visibility"].as_str().unwrap(), "public");
    assert_eq!(body["is_create_approved"].as_bool().unwrap(), true);
}

#[tokio::test]
async fn detail_fetch_increments_view_count() {
    let app = app().await;
    let user = app.create_user("post_views_u").await;
    let auditor = app.create_auditor("post_views_a").await;
    let post_id = app.create_approved_post_for(&user, &auditor, "Counted").await;

    let first = app.get(&format!("/v1/posts/{}", post_id), None).await;
    let second = app.get(&format!("/v1/posts/{}", post_id), None).await;

    assert_eq!(first.json()["view_count"].as_i64().unwrap(), 1);
    assert_eq!(second.json()["view_count"].as_i64().unwrap(), 2);
}

#[tokio::test]
async fn concurrent_views_never_lose_an_increment() {
    let app = app().await;
    let user = app.create_user("post_race_u").await;
    let auditor = app.create_auditor("post_race_a").await;
    let post_id = app.create_approved_post_for(&user, &auditor, "Raced").await;

    sqlx::query("UPDATE posts SET view_count = 5 WHERE id = $1")
        .bind(post_id)
        .execute(app.state.db.pool())
        .await
        .unwrap();

    let path = format!("/v1/posts/{}", post_id);
    let (a, b) = tokio::join!(app.get(&path, None), app.get(&path, None));
    assert_eq!(a.status, StatusCode::OK);
    assert_eq!(b.status, StatusCode::OK);

    let count: i64 = sqlx::query_scalar("SELECT view_count FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_one(app.state.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 7);
}

// ===========================================================================
// Listing
// ===========================================================================

#[tokio::test]
async fn pinned_posts_list_first() {
    let app = app().await;
    let user = app.create_user("post_pin_u").await;
    let auditor = app.create_auditor("post_pin_a").await;

    let first = app.create_approved_post_for(&user, &auditor, "pin-old").await;
    let _second = app.create_approved_post_for(&user, &auditor, "pin-new").await;

    // Pin the older post; it should now lead the listing.
    let resp = app
        .post_json(
            &format!("/v1/posts/{}/pin", first),
            json!({}),
            Some(&auditor.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["is_pinned"].as_bool().unwrap(), true);

    let resp = app.get("/v1/posts?limit=200", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    let items = body["items"].as_array().unwrap();
    let titles: Vec<String> = items
        .iter()
        .map(|item| item["title"].as_str().unwrap().to_string())
        .collect();
    let old_pos = titles.iter().position(|t| t == "pin-old").unwrap();
    let new_pos = titles.iter().position(|t| t == "pin-new").unwrap();
    assert!(old_pos < new_pos, "pinned post should sort first: {:?}", titles);
}

#[tokio::test]
async fn pin_requires_staff() {
    let app = app().await;
    let user = app.create_user("post_pinperm_u").await;
    let post_id = app.create_post_for(&user, "no pin").await;

    let resp = app
        .post_json(
            &format!("/v1/posts/{}/pin", post_id),
            json!({}),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

// ===========================================================================
// Soft delete
// ===========================================================================

#[tokio::test]
async fn delete_post_soft_disables() {
    let app = app().await;
    let user = app.create_user("post_del_u").await;
    let auditor = app.create_auditor("post_del_a").await;
    let post_id = app.create_approved_post_for(&user, &auditor, "Doomed").await;

    let resp = app
        .delete(&format!("/v1/posts/{}", post_id), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    // Hidden from the author and staff as well.
    let resp = app.get(&format!("/v1/posts/{}", post_id), None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    let resp = app
        .get(&format!("/v1/posts/{}", post_id), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    let resp = app
        .get(&format!("/v1/posts/{}", post_id), Some(&auditor.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    // The row itself still exists.
    let is_able: bool = sqlx::query_scalar("SELECT is_able FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_one(app.state.db.pool())
        .await
        .unwrap();
    assert!(!is_able);
}

#[tokio::test]
async fn delete_post_wrong_user_forbidden() {
    let app = app().await;
    let user_a = app.create_user("post_delperm_a").await;
    let user_b = app.create_user("post_delperm_b").await;
    let auditor = app.create_auditor("post_delperm_m").await;
    let post_id = app.create_approved_post_for(&user_a, &auditor, "Keep").await;

    let resp = app
        .delete(&format!("/v1/posts/{}", post_id), Some(&user_b.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app.get(&format!("/v1/posts/{}", post_id), None).await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn staff_can_delete_any_post() {
    let app = app().await;
    let user = app.create_user("post_delstaff_u").await;
    let auditor = app.create_auditor("post_delstaff_a").await;
    let post_id = app.create_post_for(&user, "Staff removes").await;

    let resp = app
        .delete(&format!("/v1/posts/{}", post_id), Some(&auditor.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
}
