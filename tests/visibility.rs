//! The visibility filter, branch by branch: soft-disabled rows hidden from
//! everyone, anonymous viewers limited to approved public content, authors
//! seeing their own pending items, staff seeing everything able.

mod common;

use axum::http::StatusCode;
use common::app;
use serde_json::{json, Value};
use uuid::Uuid;

fn ids_of(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn anonymous_sees_only_approved_public_posts() {
    let app = app().await;
    let user = app.create_user("vis_anon_u").await;
    let auditor = app.create_auditor("vis_anon_a").await;

    let pending = app.create_post_for(&user, "vis-anon pending").await;
    let approved = app
        .create_approved_post_for(&user, &auditor, "vis-anon approved")
        .await;

    let resp = app.get("/v1/posts?limit=200", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    let ids = ids_of(&body);
    assert!(ids.contains(&approved.to_string()));
    assert!(!ids.contains(&pending.to_string()));

    // Detail fetch agrees with the listing.
    let resp = app.get(&format!("/v1/posts/{}", pending), None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn author_sees_own_pending_post() {
    let app = app().await;
    let author = app.create_user("vis_own_author").await;
    let stranger = app.create_user("vis_own_stranger").await;

    let pending = app.create_post_for(&author, "vis-own pending").await;

    let resp = app.get("/v1/posts?limit=200", Some(&author.access_token)).await;
    let body = resp.json();
    assert!(ids_of(&body).contains(&pending.to_string()));

    let resp = app
        .get(&format!("/v1/posts/{}", pending), Some(&author.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    // Another regular user gets neither the listing entry nor the detail.
    let resp = app
        .get("/v1/posts?limit=200", Some(&stranger.access_token))
        .await;
    let body = resp.json();
    assert!(!ids_of(&body).contains(&pending.to_string()));

    let resp = app
        .get(&format!("/v1/posts/{}", pending), Some(&stranger.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn staff_see_pending_posts() {
    let app = app().await;
    let user = app.create_user("vis_staff_u").await;
    let auditor = app.create_auditor("vis_staff_a").await;

    let pending = app.create_post_for(&user, "vis-staff pending").await;

    let resp = app
        .get("/v1/posts?limit=200", Some(&auditor.access_token))
        .await;
    let body = resp.json();
    assert!(ids_of(&body).contains(&pending.to_string()));

    let resp = app
        .get(&format!("/v1/posts/{}", pending), Some(&auditor.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn disabled_posts_hidden_from_staff_too() {
    let app = app().await;
    let user = app.create_user("vis_dis_u").await;
    let auditor = app.create_auditor("vis_dis_a").await;

    let post_id = app
        .create_approved_post_for(&user, &auditor, "vis-disabled")
        .await;
    let resp = app
        .delete(&format!("/v1/posts/{}", post_id), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    for token in [
        None,
        Some(user.access_token.as_str()),
        Some(auditor.access_token.as_str()),
    ] {
        let resp = app.get("/v1/posts?limit=200", token).await;
        let body = resp.json();
        assert!(
            !ids_of(&body).contains(&post_id.to_string()),
            "disabled post leaked for token {:?}",
            token.map(|_| "set")
        );
    }
}

#[tokio::test]
async fn comment_visibility_follows_the_same_precedence() {
    let app = app().await;
    let author = app.create_user("vis_cmt_author").await;
    let stranger = app.create_user("vis_cmt_stranger").await;
    let auditor = app.create_auditor("vis_cmt_aud").await;
    let post_id = app
        .create_approved_post_for(&author, &auditor, "vis-cmt post")
        .await;

    // A pending comment from the author and an approved one.
    let resp = app
        .post_json(
            &format!("/v1/posts/{}/comments", post_id),
            json!({ "content": "pending comment" }),
            Some(&author.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let pending_id = resp.json()["id"].as_str().unwrap().to_string();

    let resp = app
        .post_json(
            &format!("/v1/posts/{}/comments", post_id),
            json!({ "content": "approved comment" }),
            Some(&author.access_token),
        )
        .await;
    let approved_id = resp.json()["id"].as_str().unwrap().to_string();
    let resp = app
        .post_json(
            &format!("/v1/moderation/comments/{}/approve", approved_id),
            json!({}),
            Some(&auditor.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let path = format!("/v1/posts/{}/comments?limit=200", post_id);

    // Anonymous: approved only.
    let body = app.get(&path, None).await.json();
    let ids = ids_of(&body);
    assert!(ids.contains(&approved_id));
    assert!(!ids.contains(&pending_id));

    // Stranger: approved only.
    let body = app.get(&path, Some(&stranger.access_token)).await.json();
    let ids = ids_of(&body);
    assert!(ids.contains(&approved_id));
    assert!(!ids.contains(&pending_id));

    // Author: both.
    let body = app.get(&path, Some(&author.access_token)).await.json();
    let ids = ids_of(&body);
    assert!(ids.contains(&approved_id));
    assert!(ids.contains(&pending_id));

    // Staff: both.
    let body = app.get(&path, Some(&auditor.access_token)).await.json();
    let ids = ids_of(&body);
    assert!(ids.contains(&approved_id));
    assert!(ids.contains(&pending_id));
}

#[tokio::test]
async fn disabled_comment_hidden_from_staff_too() {
    let app = app().await;
    let author = app.create_user("vis_cmtdis_author").await;
    let auditor = app.create_auditor("vis_cmtdis_aud").await;
    let post_id = app
        .create_approved_post_for(&author, &auditor, "vis-cmtdis post")
        .await;

    let resp = app
        .post_json(
            &format!("/v1/posts/{}/comments", post_id),
            json!({ "content": "soon gone" }),
            Some(&author.access_token),
        )
        .await;
    let comment_id = Uuid::parse_str(resp.json()["id"].as_str().unwrap()).unwrap();

    let resp = app
        .delete(&format!("/v1/comments/{}", comment_id), Some(&author.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let body = app
        .get(
            &format!("/v1/posts/{}/comments?limit=200", post_id),
            Some(&auditor.access_token),
        )
        .await
        .json();
    assert!(!ids_of(&body).contains(&comment_id.to_string()));
}
