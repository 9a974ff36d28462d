//! Auditor review flows: create approval flips visibility in lockstep, edit
//! staging is promoted or turned down without touching canonical content.

mod common;

use axum::http::StatusCode;
use common::app;
use serde_json::json;

#[tokio::test]
async fn approve_create_flips_both_fields_together() {
    let app = app().await;
    let user = app.create_user("mod_appr_u").await;
    let auditor = app.create_auditor("mod_appr_a").await;
    let post_id = app.create_post_for(&user, "mod approve").await;

    let resp = app
        .post_json(
            &format!("/v1/moderation/posts/{}/approve", post_id),
            json!({}),
            Some(&auditor.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let body = app
        .get(&format!("/v1/posts/{}", post_id), Some(&auditor.access_token))
        .await
        .json();
    assert_eq!(body["is_create_approved"].as_bool().unwrap(), true);
    assert_eq!(body["visibility"].as_str().unwrap(), "public");

    // Rejection pulls both back down.
    let resp = app
        .post_json(
            &format!("/v1/moderation/posts/{}/reject", post_id),
            json!({}),
            Some(&auditor.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let body = app
        .get(&format!("/v1/posts/{}", post_id), Some(&auditor.access_token))
        .await
        .json();
    assert_eq!(body["is_create_approved"].as_bool().unwrap(), false);
    assert_eq!(body["visibility"].as_str().unwrap(), "private");
}

#[tokio::test]
async fn moderation_requires_staff() {
    let app = app().await;
    let user = app.create_user("mod_perm_u").await;
    let post_id = app.create_post_for(&user, "mod perm").await;

    let resp = app
        .post_json(
            &format!("/v1/moderation/posts/{}/approve", post_id),
            json!({}),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn edit_stages_without_touching_canonical_content() {
    let app = app().await;
    let user = app.create_user("mod_stage_u").await;
    let auditor = app.create_auditor("mod_stage_a").await;
    let post_id = app
        .create_approved_post_for(&user, &auditor, "Original title")
        .await;

    let resp = app
        .patch_json(
            &format!("/v1/posts/{}", post_id),
            json!({ "title": "Edited title", "content": "edited body" }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    // The author is shown the staged values.
    let body = resp.json();
    assert_eq!(body["title"].as_str().unwrap(), "Edited title");
    assert_eq!(body["is_edit_approved"].as_bool().unwrap(), false);
    assert_eq!(body["has_pending_edit"].as_bool().unwrap(), true);

    // Anonymous readers keep seeing the canonical title.
    let body = app.get(&format!("/v1/posts/{}", post_id), None).await.json();
    assert_eq!(body["title"].as_str().unwrap(), "Original title");
    assert_eq!(body["content"].as_str().unwrap(), "test content");
}

#[tokio::test]
async fn approve_edit_promotes_staged_values() {
    let app = app().await;
    let user = app.create_user("mod_promote_u").await;
    let auditor = app.create_auditor("mod_promote_a").await;
    let post_id = app
        .create_approved_post_for(&user, &auditor, "Before edit")
        .await;

    app.patch_json(
        &format!("/v1/posts/{}", post_id),
        json!({ "title": "After edit", "content": "new body" }),
        Some(&user.access_token),
    )
    .await;

    let resp = app
        .post_json(
            &format!("/v1/moderation/posts/{}/approve-edit", post_id),
            json!({}),
            Some(&auditor.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    // Canonical content now carries the edit, staging is cleared.
    let body = app.get(&format!("/v1/posts/{}", post_id), None).await.json();
    assert_eq!(body["title"].as_str().unwrap(), "After edit");
    assert_eq!(body["content"].as_str().unwrap(), "new body");
    assert_eq!(body["is_edit_approved"].as_bool().unwrap(), true);
    assert_eq!(body["has_pending_edit"].as_bool().unwrap(), false);
}

#[tokio::test]
async fn approve_edit_with_title_only_leaves_content_alone() {
    let app = app().await;
    let user = app.create_user("mod_titleonly_u").await;
    let auditor = app.create_auditor("mod_titleonly_a").await;
    let post_id = app
        .create_approved_post_for(&user, &auditor, "Title v1")
        .await;

    app.patch_json(
        &format!("/v1/posts/{}", post_id),
        json!({ "title": "Title v2" }),
        Some(&user.access_token),
    )
    .await;

    let resp = app
        .post_json(
            &format!("/v1/moderation/posts/{}/approve-edit", post_id),
            json!({}),
            Some(&auditor.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let body = app.get(&format!("/v1/posts/{}", post_id), None).await.json();
    assert_eq!(body["title"].as_str().unwrap(), "Title v2");
    assert_eq!(body["content"].as_str().unwrap(), "test content");

    let (edited_title, edited_content): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT edited_title, edited_content FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_one(app.state.db.pool())
            .await
            .unwrap();
    assert!(edited_title.is_none());
    assert!(edited_content.is_none());
}

#[tokio::test]
async fn approve_edit_without_pending_edit_fails() {
    let app = app().await;
    let user = app.create_user("mod_nopending_u").await;
    let auditor = app.create_auditor("mod_nopending_a").await;
    let post_id = app
        .create_approved_post_for(&user, &auditor, "Untouched")
        .await;

    let resp = app
        .post_json(
            &format!("/v1/moderation/posts/{}/approve-edit", post_id),
            json!({}),
            Some(&auditor.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "no pending edit to review");

    let resp = app
        .post_json(
            &format!("/v1/moderation/posts/{}/reject-edit", post_id),
            json!({}),
            Some(&auditor.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    // Nothing changed.
    let body = app.get(&format!("/v1/posts/{}", post_id), None).await.json();
    assert_eq!(body["title"].as_str().unwrap(), "Untouched");
    assert_eq!(body["is_edit_approved"].as_bool().unwrap(), true);
}

#[tokio::test]
async fn reject_edit_keeps_staging_for_the_author() {
    let app = app().await;
    let user = app.create_user("mod_rejedit_u").await;
    let auditor = app.create_auditor("mod_rejedit_a").await;
    let post_id = app
        .create_approved_post_for(&user, &auditor, "Kept title")
        .await;

    app.patch_json(
        &format!("/v1/posts/{}", post_id),
        json!({ "title": "Rejected title" }),
        Some(&user.access_token),
    )
    .await;

    let resp = app
        .post_json(
            &format!("/v1/moderation/posts/{}/reject-edit", post_id),
            json!({}),
            Some(&auditor.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    // The author still sees what was rejected; outsiders see the canonical
    // title.
    let body = app
        .get(&format!("/v1/posts/{}", post_id), Some(&user.access_token))
        .await
        .json();
    assert_eq!(body["title"].as_str().unwrap(), "Rejected title");
    assert_eq!(body["is_edit_approved"].as_bool().unwrap(), false);

    let body = app.get(&format!("/v1/posts/{}", post_id), None).await.json();
    assert_eq!(body["title"].as_str().unwrap(), "Kept title");
}

#[tokio::test]
async fn comment_edit_review_roundtrip() {
    let app = app().await;
    let user = app.create_user("mod_cmt_u").await;
    let auditor = app.create_auditor("mod_cmt_a").await;
    let post_id = app
        .create_approved_post_for(&user, &auditor, "mod cmt post")
        .await;

    let resp = app
        .post_json(
            &format!("/v1/posts/{}/comments", post_id),
            json!({ "content": "first wording" }),
            Some(&user.access_token),
        )
        .await;
    let comment_id = resp.json()["id"].as_str().unwrap().to_string();
    app.post_json(
        &format!("/v1/moderation/comments/{}/approve", comment_id),
        json!({}),
        Some(&auditor.access_token),
    )
    .await;

    let resp = app
        .patch_json(
            &format!("/v1/comments/{}", comment_id),
            json!({ "content": "second wording" }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app
        .post_json(
            &format!("/v1/moderation/comments/{}/approve-edit", comment_id),
            json!({}),
            Some(&auditor.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let body = app
        .get(&format!("/v1/posts/{}/comments?limit=200", post_id), None)
        .await
        .json();
    let items = body["items"].as_array().unwrap();
    let comment = items
        .iter()
        .find(|item| item["id"].as_str().unwrap() == comment_id)
        .expect("approved comment should be listed");
    assert_eq!(comment["content"].as_str().unwrap(), "second wording");
}
