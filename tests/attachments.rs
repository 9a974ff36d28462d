//! Attachment upload intents and listing. The presigned URLs are generated
//! locally, so these tests need no live object store.

mod common;

use axum::http::StatusCode;
use common::app;
use serde_json::json;

#[tokio::test]
async fn upload_flow_reaches_listing_after_completion() {
    let app = app().await;
    let user = app.create_user("att_flow_u").await;
    let auditor = app.create_auditor("att_flow_a").await;
    let post_id = app
        .create_approved_post_for(&user, &auditor, "att post")
        .await;

    let resp = app
        .post_json(
            &format!("/v1/posts/{}/attachments", post_id),
            json!({ "file_name": "notes.pdf", "content_type": "application/pdf", "bytes": 1024 }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    let attachment_id = body["attachment_id"].as_str().unwrap().to_string();
    assert!(body["upload_url"].as_str().unwrap().contains("notes.pdf"));

    // Pending uploads are not listed yet.
    let resp = app
        .get(&format!("/v1/posts/{}/attachments", post_id), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json().as_array().unwrap().len(), 0);

    let resp = app
        .post_json(
            &format!("/v1/posts/{}/attachments/{}/complete", post_id, attachment_id),
            json!({}),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app
        .get(&format!("/v1/posts/{}/attachments", post_id), None)
        .await;
    let body = resp.json();
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["file_name"].as_str().unwrap(), "notes.pdf");
    assert_eq!(items[0]["status"].as_str().unwrap(), "uploaded");
    assert!(items[0]["download_url"].is_string());
}

#[tokio::test]
async fn completing_twice_is_not_found() {
    let app = app().await;
    let user = app.create_user("att_twice_u").await;
    let auditor = app.create_auditor("att_twice_a").await;
    let post_id = app
        .create_approved_post_for(&user, &auditor, "att twice")
        .await;

    let resp = app
        .post_json(
            &format!("/v1/posts/{}/attachments", post_id),
            json!({ "file_name": "a.txt", "content_type": "text/plain", "bytes": 10 }),
            Some(&user.access_token),
        )
        .await;
    let attachment_id = resp.json()["attachment_id"].as_str().unwrap().to_string();

    let path = format!("/v1/posts/{}/attachments/{}/complete", post_id, attachment_id);
    let resp = app.post_json(&path, json!({}), Some(&user.access_token)).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    let resp = app.post_json(&path, json!({}), Some(&user.access_token)).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_author_or_staff_may_attach() {
    let app = app().await;
    let user = app.create_user("att_perm_u").await;
    let stranger = app.create_user("att_perm_s").await;
    let auditor = app.create_auditor("att_perm_a").await;
    let post_id = app
        .create_approved_post_for(&user, &auditor, "att perm")
        .await;

    let resp = app
        .post_json(
            &format!("/v1/posts/{}/attachments", post_id),
            json!({ "file_name": "b.txt", "content_type": "text/plain", "bytes": 10 }),
            Some(&stranger.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let app = app().await;
    let user = app.create_user("att_size_u").await;
    let auditor = app.create_auditor("att_size_a").await;
    let post_id = app
        .create_approved_post_for(&user, &auditor, "att size")
        .await;

    let resp = app
        .post_json(
            &format!("/v1/posts/{}/attachments", post_id),
            json!({
                "file_name": "huge.bin",
                "content_type": "application/octet-stream",
                "bytes": app.state.upload_max_bytes + 1
            }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "file exceeds the upload size limit");
}
