use axum::{routing::delete, routing::get, routing::patch, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh_token))
        .route("/auth/revoke", post(handlers::revoke_token))
        .route("/auth/me", get(handlers::get_current_user))
}

pub fn users() -> Router<AppState> {
    Router::new()
        .route("/users", post(handlers::register_user))
        .route("/users/:id", get(handlers::get_user))
        .route("/users/:id", patch(handlers::update_profile))
        .route("/users/:id/role", patch(handlers::set_user_role))
}

pub fn categories() -> Router<AppState> {
    Router::new()
        .route("/categories", get(handlers::list_categories))
        .route("/categories", post(handlers::create_category))
        .route("/categories/:id", patch(handlers::update_category))
        .route("/categories/:id", delete(handlers::delete_category))
        .route("/tags", get(handlers::list_tags))
        .route("/tags", post(handlers::create_tag))
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route("/posts", post(handlers::create_post))
        .route("/posts", get(handlers::list_posts))
        .route("/posts/:id", get(handlers::get_post))
        .route("/posts/:id", patch(handlers::edit_post))
        .route("/posts/:id", delete(handlers::delete_post))
        .route("/posts/:id/pin", post(handlers::pin_post))
        .route("/posts/:id/comments", post(handlers::create_comment))
        .route("/posts/:id/comments", get(handlers::list_post_comments))
        .route("/posts/:id/attachments", post(handlers::create_attachment_upload))
        .route("/posts/:id/attachments", get(handlers::list_post_attachments))
        .route(
            "/posts/:id/attachments/:attachment_id/complete",
            post(handlers::complete_attachment_upload),
        )
        .route(
            "/posts/:id/attachments/:attachment_id",
            delete(handlers::delete_attachment),
        )
        .route("/comments/:id", patch(handlers::edit_comment))
        .route("/comments/:id", delete(handlers::delete_comment))
}

pub fn moderation() -> Router<AppState> {
    Router::new()
        .route(
            "/moderation/posts/:id/approve",
            post(handlers::approve_post_create),
        )
        .route(
            "/moderation/posts/:id/reject",
            post(handlers::reject_post_create),
        )
        .route(
            "/moderation/posts/:id/approve-edit",
            post(handlers::approve_post_edit),
        )
        .route(
            "/moderation/posts/:id/reject-edit",
            post(handlers::reject_post_edit),
        )
        .route(
            "/moderation/comments/:id/approve",
            post(handlers::approve_comment_create),
        )
        .route(
            "/moderation/comments/:id/reject",
            post(handlers::reject_comment_create),
        )
        .route(
            "/moderation/comments/:id/approve-edit",
            post(handlers::approve_comment_edit),
        )
        .route(
            "/moderation/comments/:id/reject-edit",
            post(handlers::reject_comment_edit),
        )
}

pub fn demands() -> Router<AppState> {
    Router::new()
        .route("/demands", post(handlers::create_demand))
        .route("/demands", get(handlers::list_demands))
        .route("/demands/unreplied", get(handlers::list_unreplied_demands))
        .route("/demands/:id", get(handlers::get_demand))
        .route("/demands/:id", delete(handlers::delete_demand))
        .route("/demands/:id/status", post(handlers::change_demand_status))
        .route("/demands/:id/history", get(handlers::demand_status_history))
        .route("/demands/:id/comments", post(handlers::create_demand_comment))
        .route("/demands/:id/comments", get(handlers::list_demand_comments))
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
}
