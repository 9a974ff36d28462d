use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::attachments::{AttachmentService, UploadIntent};
use crate::app::auth::AuthService;
use crate::app::categories::CategoryService;
use crate::app::comments::CommentService;
use crate::app::demands::DemandService;
use crate::app::moderation::ModerationService;
use crate::app::notifications::NotificationService;
use crate::app::posts::{PostCursor, PostFilter, PostService};
use crate::app::users::UserService;
use crate::domain::access;
use crate::domain::category::{Category, Tag};
use crate::domain::demand::{Demand, DemandComment, DemandStatus, DemandStatusChange};
use crate::domain::notification::Notification;
use crate::domain::post::{CommentView, PostView};
use crate::domain::user::{User, UserRole};
use crate::http::auth::actor_of;
use crate::http::{AdminToken, AppError, AuthUser};
use crate::AppState;

const MAX_TITLE_LEN: usize = 100;
const MAX_CONTENT_LEN: usize = 20_000;
const MAX_COMMENT_LEN: usize = 10_000;
const MAX_DEMAND_TITLE_LEN: usize = 200;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn check_limit(limit: Option<i64>) -> Result<i64, AppError> {
    let limit = limit.unwrap_or(30);
    if !(1..=200).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 200"));
    }
    Ok(limit)
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(2, '/');
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

// Post listings sort pinned-first, so their cursor carries the pinned flag
// of the last row as well.
fn parse_post_cursor(cursor: Option<String>) -> Result<Option<PostCursor>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(3, '/');
    let pinned = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let pinned = match pinned {
        "0" => false,
        "1" => true,
        _ => return Err(AppError::bad_request("invalid cursor")),
    };
    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((pinned, timestamp, id)))
}

fn encode_post_cursor(cursor: Option<PostCursor>) -> Option<String> {
    let (pinned, timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}/{}", if pinned { "1" } else { "0" }, timestamp, id))
}

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(
        state.db.clone(),
        state.paseto_access_key,
        state.paseto_refresh_key,
        state.access_ttl_minutes,
        state.refresh_ttl_days,
    )
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_expires_at: OffsetDateTime,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    const MAX_PASSWORD_LEN: usize = 128;

    if payload.username.trim().is_empty() || payload.password.trim().is_empty() {
        return Err(AppError::bad_request("username and password are required"));
    }
    if payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let service = auth_service(&state);
    let tokens = service
        .login(&payload.username, &payload.password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to login");
            AppError::internal("failed to login")
        })?;

    match tokens {
        Some(tokens) => Ok(Json(AuthTokenResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
        })),
        None => Err(AppError::unauthorized("invalid credentials")),
    }
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::bad_request("refresh_token is required"));
    }

    let service = auth_service(&state);
    let tokens = service.refresh(&payload.refresh_token).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to refresh token");
        AppError::internal("failed to refresh token")
    })?;

    match tokens {
        Some(tokens) => Ok(Json(AuthTokenResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
        })),
        None => Err(AppError::unauthorized("invalid refresh token")),
    }
}

#[derive(Deserialize)]
pub struct RevokeRequest {
    pub refresh_token: String,
}

pub async fn revoke_token(
    State(state): State<AppState>,
    Json(payload): Json<RevokeRequest>,
) -> Result<StatusCode, AppError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::bad_request("refresh_token is required"));
    }

    let service = auth_service(&state);
    let revoked = service
        .revoke_refresh_token(&payload.refresh_token)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to revoke token");
            AppError::internal("failed to revoke token")
        })?;

    let _ = revoked;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_current_user(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    let service = auth_service(&state);
    let user = service.get_current_user(auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to fetch current user");
        AppError::internal("failed to fetch current user")
    })?;

    match user {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::not_found("user not found")),
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
}

pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<User>, AppError> {
    const MAX_PASSWORD_LEN: usize = 128;

    if payload.username.trim().is_empty() {
        return Err(AppError::bad_request("username cannot be empty"));
    }
    if payload.email.trim().is_empty() {
        return Err(AppError::bad_request("email cannot be empty"));
    }
    if payload.display_name.trim().is_empty() {
        return Err(AppError::bad_request("display_name cannot be empty"));
    }
    if payload.password.trim().len() < 8 {
        return Err(AppError::bad_request("password must be at least 8 characters"));
    }
    if payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let service = auth_service(&state);
    let user = service
        .signup(
            payload.username,
            payload.email,
            payload.display_name,
            payload.password,
        )
        .await
        .map_err(|err| {
            if let Some(sqlx_err) = err.downcast_ref::<sqlx::Error>() {
                if let Some(db_err) = sqlx_err.as_database_error() {
                    if let Some(code) = db_err.code() {
                        if code == "23505" {
                            let constraint = db_err.constraint().unwrap_or_default();
                            if constraint.contains("users_username_key") {
                                return AppError::conflict("Username already taken");
                            }
                            if constraint.contains("users_email_key") {
                                return AppError::conflict("Email already taken");
                            }
                        }
                    }
                }
            }
            tracing::error!(error = ?err, "failed to register user");
            AppError::internal("failed to register user")
        })?;

    Ok(Json(user))
}

pub async fn get_user(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    let service = UserService::new(state.db.clone());
    let user = service.get_user(id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %id, "failed to fetch user");
        AppError::internal("failed to fetch user")
    })?;

    match user {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::not_found("user not found")),
    }
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

pub async fn update_profile(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<User>, AppError> {
    if auth.user_id != id {
        return Err(AppError::forbidden("cannot update other users"));
    }

    if let Some(display_name) = &payload.display_name {
        if display_name.trim().is_empty() {
            return Err(AppError::bad_request("display_name cannot be empty"));
        }
    }

    let service = UserService::new(state.db.clone());
    let user = service
        .update_profile(id, payload.display_name, payload.email)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %id, "failed to update profile");
            AppError::internal("failed to update profile")
        })?;

    match user {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::not_found("user not found")),
    }
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

/// Guarded by the operator token rather than an in-band admin session; this
/// is how the first auditor/admin gets minted.
pub async fn set_user_role(
    Path(id): Path<Uuid>,
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<User>, AppError> {
    let role = UserRole::from_db(&payload.role)
        .ok_or_else(|| AppError::bad_request("role must be one of user, auditor, admin"))?;

    let service = UserService::new(state.db.clone());
    let user = service.set_role(id, role).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %id, "failed to set user role");
        AppError::internal("failed to set user role")
    })?;

    match user {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::not_found("user not found")),
    }
}

// ---------------------------------------------------------------------------
// Categories & tags
// ---------------------------------------------------------------------------

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    let service = CategoryService::new(state.db.clone());
    let categories = service.list_categories().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list categories");
        AppError::internal("failed to list categories")
    })?;

    Ok(Json(categories))
}

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parent_id: Option<Uuid>,
}

pub async fn create_category(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<Json<Category>, AppError> {
    if !auth.role.is_staff() {
        return Err(AppError::forbidden("auditor role required"));
    }
    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name cannot be empty"));
    }

    let service = CategoryService::new(state.db.clone());
    let category = service
        .create_category(payload.name, payload.description, payload.parent_id)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                return AppError::conflict("category name already exists");
            }
            tracing::error!(error = ?err, "failed to create category");
            AppError::internal("failed to create category")
        })?;

    Ok(Json(category))
}

#[derive(Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

pub async fn update_category(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, AppError> {
    if !auth.role.is_staff() {
        return Err(AppError::forbidden("auditor role required"));
    }

    let service = CategoryService::new(state.db.clone());
    let category = service
        .update_category(id, payload.name, payload.description, payload.parent_id)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                return AppError::conflict("category name already exists");
            }
            tracing::error!(error = ?err, category_id = %id, "failed to update category");
            AppError::internal("failed to update category")
        })?;

    match category {
        Some(category) => Ok(Json(category)),
        None => Err(AppError::not_found("category not found")),
    }
}

pub async fn delete_category(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    if !auth.role.is_staff() {
        return Err(AppError::forbidden("auditor role required"));
    }

    let service = CategoryService::new(state.db.clone());
    let deleted = service.delete_category(id).await.map_err(|err| {
        tracing::error!(error = ?err, category_id = %id, "failed to delete category");
        AppError::internal("failed to delete category")
    })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("category not found"))
    }
}

pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, AppError> {
    let service = CategoryService::new(state.db.clone());
    let tags = service.list_tags().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list tags");
        AppError::internal("failed to list tags")
    })?;

    Ok(Json(tags))
}

#[derive(Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

pub async fn create_tag(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateTagRequest>,
) -> Result<Json<Tag>, AppError> {
    if !auth.role.is_staff() {
        return Err(AppError::forbidden("auditor role required"));
    }
    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name cannot be empty"));
    }

    let service = CategoryService::new(state.db.clone());
    let tag = service.create_tag(payload.name).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to create tag");
        AppError::internal("failed to create tag")
    })?;

    Ok(Json(tag))
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    pub posted_as: Option<String>,
}

pub async fn create_post(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<Json<PostView>, AppError> {
    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("title cannot be empty"));
    }
    if payload.title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::bad_request("title must be at most 100 characters"));
    }
    if payload.content.chars().count() > MAX_CONTENT_LEN {
        return Err(AppError::bad_request("content must be at most 20000 characters"));
    }
    if payload.posted_as.is_some() && !auth.role.is_staff() {
        return Err(AppError::forbidden("only auditors may post under an alias"));
    }

    let service = PostService::new(state.db.clone());
    let post = service
        .create_post(
            auth.user_id,
            payload.category_id,
            payload.title,
            payload.content,
            payload.tag_ids,
            payload.posted_as,
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to create post");
            AppError::internal("failed to create post")
        })?;

    Ok(Json(post.into_view(&auth.actor())))
}

#[derive(Deserialize)]
pub struct ListPostsQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    pub category_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
}

pub async fn list_posts(
    auth: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<ListResponse<PostView>>, AppError> {
    let limit = check_limit(query.limit)?;
    let cursor = parse_post_cursor(query.cursor)?;
    let actor = actor_of(&auth);

    let filter = PostFilter {
        category_id: query.category_id,
        tag_id: query.tag_id,
    };

    let service = PostService::new(state.db.clone());
    let posts = service
        .list_posts(&actor, &filter, cursor, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list posts");
            AppError::internal("failed to list posts")
        })?;

    let next_cursor = if posts.len() as i64 == limit {
        encode_post_cursor(
            posts
                .last()
                .map(|post| (post.is_pinned, post.created_at, post.id)),
        )
    } else {
        None
    };

    let items = posts
        .into_iter()
        .map(|post| post.into_view(&actor))
        .collect();

    Ok(Json(ListResponse { items, next_cursor }))
}

pub async fn get_post(
    Path(id): Path<Uuid>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<PostView>, AppError> {
    let actor = actor_of(&auth);
    let service = PostService::new(state.db.clone());
    let post = service.get_post(id, &actor).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;

    match post {
        Some(post) => Ok(Json(post.into_view(&actor))),
        None => Err(AppError::not_found("post not found")),
    }
}

#[derive(Deserialize)]
pub struct EditPostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Owner or staff stage an edit; the canonical post stays live until an
/// auditor approves.
pub async fn edit_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<EditPostRequest>,
) -> Result<Json<PostView>, AppError> {
    if payload.title.is_none() && payload.content.is_none() {
        return Err(AppError::bad_request("nothing to edit"));
    }
    if let Some(title) = &payload.title {
        if title.trim().is_empty() {
            return Err(AppError::bad_request("title cannot be empty"));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::bad_request("title must be at most 100 characters"));
        }
    }
    if let Some(content) = &payload.content {
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(AppError::bad_request("content must be at most 20000 characters"));
        }
    }

    let actor = auth.actor();
    let service = PostService::new(state.db.clone());
    let post = service
        .submit_edit(id, &actor, payload.title, payload.content)
        .await
        .map_err(|err| AppError::from_service(err, "failed to edit post"))?;

    match post {
        Some(post) => Ok(Json(post.into_view(&actor))),
        None => Err(AppError::not_found("post not found")),
    }
}

pub async fn delete_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = PostService::new(state.db.clone());
    let disabled = service
        .disable_post(id, &auth.actor())
        .await
        .map_err(|err| AppError::from_service(err, "failed to delete post"))?;

    if disabled {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("post not found"))
    }
}

#[derive(Serialize)]
pub struct PinResponse {
    pub is_pinned: bool,
}

pub async fn pin_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<PinResponse>, AppError> {
    if !auth.role.is_staff() {
        return Err(AppError::forbidden("auditor role required"));
    }

    let service = PostService::new(state.db.clone());
    let pinned = service.toggle_pin(id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %id, "failed to toggle pin");
        AppError::internal("failed to toggle pin")
    })?;

    match pinned {
        Some(is_pinned) => Ok(Json(PinResponse { is_pinned })),
        None => Err(AppError::not_found("post not found")),
    }
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
}

pub async fn create_comment(
    Path(post_id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<Json<CommentView>, AppError> {
    if payload.content.trim().is_empty() {
        return Err(AppError::bad_request("content cannot be empty"));
    }
    if payload.content.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::bad_request("content must be at most 10000 characters"));
    }

    let actor = auth.actor();

    // Commenting requires the post itself to be visible to the commenter.
    let posts = PostService::new(state.db.clone());
    let post = posts.fetch_post(post_id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %post_id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;
    let visible = post
        .as_ref()
        .map(|post| access::visible(&actor, post.author_id(), &post.moderation))
        .unwrap_or(false);
    if !visible {
        return Err(AppError::not_found("post not found"));
    }

    let service = CommentService::new(state.db.clone());
    let comment = service
        .create_comment(post_id, auth.user_id, payload.content, payload.parent_comment_id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to create comment"))?;

    Ok(Json(comment.into_view(&actor)))
}

pub async fn list_post_comments(
    Path(post_id): Path<Uuid>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<CommentView>>, AppError> {
    let limit = check_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;
    let actor = actor_of(&auth);

    let service = CommentService::new(state.db.clone());
    let comments = service
        .list_by_post(post_id, &actor, cursor, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %post_id, "failed to list comments");
            AppError::internal("failed to list comments")
        })?;

    let next_cursor = if comments.len() as i64 == limit {
        encode_cursor(comments.last().map(|comment| (comment.created_at, comment.id)))
    } else {
        None
    };

    let items = comments
        .into_iter()
        .map(|comment| comment.into_view(&actor))
        .collect();

    Ok(Json(ListResponse { items, next_cursor }))
}

#[derive(Deserialize)]
pub struct EditCommentRequest {
    pub content: String,
}

pub async fn edit_comment(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<EditCommentRequest>,
) -> Result<Json<CommentView>, AppError> {
    if payload.content.trim().is_empty() {
        return Err(AppError::bad_request("content cannot be empty"));
    }
    if payload.content.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::bad_request("content must be at most 10000 characters"));
    }

    let actor = auth.actor();
    let service = CommentService::new(state.db.clone());
    let comment = service
        .submit_edit(id, &actor, payload.content)
        .await
        .map_err(|err| AppError::from_service(err, "failed to edit comment"))?;

    match comment {
        Some(comment) => Ok(Json(comment.into_view(&actor))),
        None => Err(AppError::not_found("comment not found")),
    }
}

pub async fn delete_comment(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = CommentService::new(state.db.clone());
    let disabled = service
        .disable_comment(id, &auth.actor())
        .await
        .map_err(|err| AppError::from_service(err, "failed to delete comment"))?;

    if disabled {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("comment not found"))
    }
}

// ---------------------------------------------------------------------------
// Moderation review
// ---------------------------------------------------------------------------

fn require_staff(auth: &AuthUser) -> Result<(), AppError> {
    if auth.role.is_staff() {
        Ok(())
    } else {
        Err(AppError::forbidden("auditor role required"))
    }
}

pub async fn approve_post_create(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    require_staff(&auth)?;

    let service = ModerationService::new(state.db.clone());
    let found = service
        .approve_post_create(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to approve post"))?;

    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("post not found"))
    }
}

pub async fn reject_post_create(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    require_staff(&auth)?;

    let service = ModerationService::new(state.db.clone());
    let found = service
        .reject_post_create(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to reject post"))?;

    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("post not found"))
    }
}

pub async fn approve_post_edit(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    require_staff(&auth)?;

    let service = ModerationService::new(state.db.clone());
    let found = service
        .approve_post_edit(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to approve post edit"))?;

    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("post not found"))
    }
}

pub async fn reject_post_edit(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    require_staff(&auth)?;

    let service = ModerationService::new(state.db.clone());
    let found = service
        .reject_post_edit(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to reject post edit"))?;

    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("post not found"))
    }
}

pub async fn approve_comment_create(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    require_staff(&auth)?;

    let service = ModerationService::new(state.db.clone());
    let found = service
        .approve_comment_create(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to approve comment"))?;

    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("comment not found"))
    }
}

pub async fn reject_comment_create(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    require_staff(&auth)?;

    let service = ModerationService::new(state.db.clone());
    let found = service
        .reject_comment_create(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to reject comment"))?;

    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("comment not found"))
    }
}

pub async fn approve_comment_edit(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    require_staff(&auth)?;

    let service = ModerationService::new(state.db.clone());
    let found = service
        .approve_comment_edit(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to approve comment edit"))?;

    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("comment not found"))
    }
}

pub async fn reject_comment_edit(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    require_staff(&auth)?;

    let service = ModerationService::new(state.db.clone());
    let found = service
        .reject_comment_edit(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to reject comment edit"))?;

    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("comment not found"))
    }
}

// ---------------------------------------------------------------------------
// Demands
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateDemandRequest {
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
}

pub async fn create_demand(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateDemandRequest>,
) -> Result<Json<Demand>, AppError> {
    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("title cannot be empty"));
    }
    if payload.title.chars().count() > MAX_DEMAND_TITLE_LEN {
        return Err(AppError::bad_request("title must be at most 200 characters"));
    }
    if payload.description.trim().is_empty() {
        return Err(AppError::bad_request("description cannot be empty"));
    }

    let service = DemandService::new(state.db.clone());
    let demand = service
        .create_demand(auth.user_id, payload.category_id, payload.title, payload.description)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to create demand");
            AppError::internal("failed to create demand")
        })?;

    Ok(Json(demand))
}

#[derive(Deserialize)]
pub struct ListDemandsQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    pub q: Option<String>,
}

pub async fn list_demands(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListDemandsQuery>,
) -> Result<Json<ListResponse<Demand>>, AppError> {
    let limit = check_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;
    let actor = auth.actor();

    let service = DemandService::new(state.db.clone());
    let demands = service
        .list_demands(&actor, query.q.as_deref(), cursor, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list demands");
            AppError::internal("failed to list demands")
        })?;

    let next_cursor = if demands.len() as i64 == limit {
        encode_cursor(demands.last().map(|demand| (demand.created_at, demand.id)))
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: demands,
        next_cursor,
    }))
}

pub async fn list_unreplied_demands(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Demand>>, AppError> {
    require_staff(&auth)?;
    let limit = check_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = DemandService::new(state.db.clone());
    let demands = service.list_unreplied(cursor, limit).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list unreplied demands");
        AppError::internal("failed to list unreplied demands")
    })?;

    let next_cursor = if demands.len() as i64 == limit {
        encode_cursor(demands.last().map(|demand| (demand.created_at, demand.id)))
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: demands,
        next_cursor,
    }))
}

pub async fn get_demand(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Demand>, AppError> {
    let service = DemandService::new(state.db.clone());
    let demand = service.get_demand(id, &auth.actor()).await.map_err(|err| {
        tracing::error!(error = ?err, demand_id = %id, "failed to fetch demand");
        AppError::internal("failed to fetch demand")
    })?;

    match demand {
        Some(demand) => Ok(Json(demand)),
        None => Err(AppError::not_found("demand not found")),
    }
}

pub async fn delete_demand(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = DemandService::new(state.db.clone());
    let disabled = service
        .disable_demand(id, &auth.actor())
        .await
        .map_err(|err| AppError::from_service(err, "failed to delete demand"))?;

    if disabled {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("demand not found"))
    }
}

#[derive(Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
    pub reason: Option<String>,
}

pub async fn change_demand_status(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ChangeStatusRequest>,
) -> Result<Json<Demand>, AppError> {
    let new_status = DemandStatus::from_db(&payload.status)
        .ok_or_else(|| AppError::bad_request("unknown status"))?;

    let service = DemandService::new(state.db.clone());
    let demand = service
        .change_status(id, new_status, &auth.actor(), payload.reason)
        .await
        .map_err(|err| AppError::from_service(err, "failed to change demand status"))?;

    Ok(Json(demand))
}

pub async fn demand_status_history(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<DemandStatusChange>>, AppError> {
    let service = DemandService::new(state.db.clone());
    let history = service
        .status_history(id, &auth.actor())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, demand_id = %id, "failed to fetch status history");
            AppError::internal("failed to fetch status history")
        })?;

    match history {
        Some(history) => Ok(Json(history)),
        None => Err(AppError::not_found("demand not found")),
    }
}

#[derive(Deserialize)]
pub struct CreateDemandCommentRequest {
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
}

pub async fn create_demand_comment(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateDemandCommentRequest>,
) -> Result<Json<DemandComment>, AppError> {
    if payload.content.trim().is_empty() {
        return Err(AppError::bad_request("content cannot be empty"));
    }
    if payload.content.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::bad_request("content must be at most 10000 characters"));
    }

    let service = DemandService::new(state.db.clone());
    let comment = service
        .create_comment(id, &auth.actor(), payload.content, payload.parent_comment_id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to create demand comment"))?;

    Ok(Json(comment))
}

pub async fn list_demand_comments(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<DemandComment>>, AppError> {
    let limit = check_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = DemandService::new(state.db.clone());
    let comments = service
        .list_comments(id, &auth.actor(), cursor, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, demand_id = %id, "failed to list demand comments");
            AppError::internal("failed to list demand comments")
        })?;

    let comments = match comments {
        Some(comments) => comments,
        None => return Err(AppError::not_found("demand not found")),
    };

    let next_cursor = if comments.len() as i64 == limit {
        encode_cursor(comments.last().map(|comment| (comment.created_at, comment.id)))
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: comments,
        next_cursor,
    }))
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateAttachmentRequest {
    pub file_name: String,
    pub content_type: String,
    pub bytes: i64,
}

pub async fn create_attachment_upload(
    Path(post_id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateAttachmentRequest>,
) -> Result<Json<UploadIntent>, AppError> {
    if payload.file_name.trim().is_empty() {
        return Err(AppError::bad_request("file_name cannot be empty"));
    }
    if payload.bytes <= 0 {
        return Err(AppError::bad_request("bytes must be positive"));
    }
    if payload.bytes > state.upload_max_bytes {
        return Err(AppError::bad_request("file exceeds the upload size limit"));
    }

    let actor = auth.actor();
    let posts = PostService::new(state.db.clone());
    let post = posts.fetch_post(post_id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %post_id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;
    let post = match post {
        Some(post) if post.moderation.is_able => post,
        _ => return Err(AppError::not_found("post not found")),
    };
    if !actor.is_staff() && !actor.owns(post.author_id()) {
        return Err(AppError::forbidden("only the author may attach files"));
    }

    let service = AttachmentService::new(
        state.db.clone(),
        state.storage.clone(),
        state.s3_public_endpoint.clone(),
    );
    let intent = service
        .create_upload(
            post_id,
            payload.file_name,
            payload.content_type,
            payload.bytes,
            state.upload_url_ttl_seconds,
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %post_id, "failed to create attachment upload");
            AppError::internal("failed to create attachment upload")
        })?;

    Ok(Json(intent))
}

pub async fn complete_attachment_upload(
    Path((post_id, attachment_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let actor = auth.actor();
    let posts = PostService::new(state.db.clone());
    let post = posts.fetch_post(post_id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %post_id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;
    let post = match post {
        Some(post) => post,
        None => return Err(AppError::not_found("post not found")),
    };
    if !actor.is_staff() && !actor.owns(post.author_id()) {
        return Err(AppError::forbidden("only the author may attach files"));
    }

    let service = AttachmentService::new(
        state.db.clone(),
        state.storage.clone(),
        state.s3_public_endpoint.clone(),
    );
    let completed = service
        .complete_upload(attachment_id, post_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, attachment_id = %attachment_id, "failed to complete upload");
            AppError::internal("failed to complete upload")
        })?;

    if completed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("upload not found"))
    }
}

pub async fn list_post_attachments(
    Path(post_id): Path<Uuid>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::domain::attachment::PostAttachment>>, AppError> {
    let actor = actor_of(&auth);
    let posts = PostService::new(state.db.clone());
    let post = posts.fetch_post(post_id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %post_id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;
    let visible = post
        .as_ref()
        .map(|post| access::visible(&actor, post.author_id(), &post.moderation))
        .unwrap_or(false);
    if !visible {
        return Err(AppError::not_found("post not found"));
    }

    let service = AttachmentService::new(
        state.db.clone(),
        state.storage.clone(),
        state.s3_public_endpoint.clone(),
    );
    let attachments = service
        .list_by_post(post_id, state.upload_url_ttl_seconds)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %post_id, "failed to list attachments");
            AppError::internal("failed to list attachments")
        })?;

    Ok(Json(attachments))
}

pub async fn delete_attachment(
    Path((post_id, attachment_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let actor = auth.actor();
    let posts = PostService::new(state.db.clone());
    let post = posts.fetch_post(post_id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %post_id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;
    let post = match post {
        Some(post) => post,
        None => return Err(AppError::not_found("post not found")),
    };
    if !actor.is_staff() && !actor.owns(post.author_id()) {
        return Err(AppError::forbidden("only the author may remove attachments"));
    }

    let service = AttachmentService::new(
        state.db.clone(),
        state.storage.clone(),
        state.s3_public_endpoint.clone(),
    );
    let deleted = service
        .delete_attachment(attachment_id, post_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, attachment_id = %attachment_id, "failed to delete attachment");
            AppError::internal("failed to delete attachment")
        })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("attachment not found"))
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Notification>>, AppError> {
    let limit = check_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = NotificationService::new(state.db.clone());
    let notifications = service
        .list(auth.user_id, cursor, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list notifications");
            AppError::internal("failed to list notifications")
        })?;

    let next_cursor = if notifications.len() as i64 == limit {
        encode_cursor(
            notifications
                .last()
                .map(|notification| (notification.created_at, notification.id)),
        )
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: notifications,
        next_cursor,
    }))
}

pub async fn mark_notification_read(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = NotificationService::new(state.db.clone());
    let marked = service.mark_read(id, auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, notification_id = %id, "failed to mark notification read");
        AppError::internal("failed to mark notification read")
    })?;

    if marked {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("notification not found"))
    }
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|sqlx_err| sqlx_err.as_database_error().map(|db_err| db_err.code()))
        .flatten()
        .map(|code| code == "23505")
        .unwrap_or(false)
}
