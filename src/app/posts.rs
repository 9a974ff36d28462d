use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::access::{self, AccessKind};
use crate::domain::category::Tag;
use crate::domain::content::{ContentVisibility, ModerationState};
use crate::domain::error::DomainError;
use crate::domain::post::Post;
use crate::domain::user::{Actor, AuthorRef, UserRole};
use crate::infra::db::Db;

/// Pagination cursor for post listings: pinned posts sort before the rest,
/// then newest first.
pub type PostCursor = (bool, OffsetDateTime, Uuid);

const POST_COLUMNS: &str = "p.id, p.category_id, p.title, p.content, p.edited_title, \
     p.edited_content, p.visibility::text AS visibility, p.is_create_approved, \
     p.is_edit_approved, p.is_able, p.is_pinned, p.view_count, p.posted_as, p.created_by, \
     p.last_edited_at, p.created_at, p.updated_at, \
     u.id AS author_id, u.username AS author_username, \
     u.display_name AS author_display_name, u.role::text AS author_role";

// The SQL twin of domain::access::visible, with the same precedence:
// disabled rows are out for everyone; staff ($1) see the rest; others see
// approved public rows plus their own ($2).
const VISIBLE_PREDICATE: &str = "p.is_able \
     AND ($1 OR (p.is_create_approved AND p.visibility = 'public') OR p.author_id = $2)";

#[derive(Clone)]
pub struct PostService {
    db: Db,
}

#[derive(Debug, Default)]
pub struct PostFilter {
    pub category_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
}

impl PostService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_post(
        &self,
        author_id: Uuid,
        category_id: Option<Uuid>,
        title: String,
        content: String,
        tag_ids: Vec<Uuid>,
        posted_as: Option<String>,
    ) -> Result<Post> {
        let mut tx = self.db.pool().begin().await?;

        let post_id: Uuid = sqlx::query_scalar(
            "INSERT INTO posts (author_id, created_by, category_id, title, content, posted_as) \
             VALUES ($1, $1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(author_id)
        .bind(category_id)
        .bind(title)
        .bind(content)
        .bind(posted_as)
        .fetch_one(&mut *tx)
        .await?;

        for tag_id in &tag_ids {
            sqlx::query(
                "INSERT INTO post_tags (post_id, tag_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.fetch_post(post_id)
            .await?
            .ok_or_else(|| anyhow!("post vanished after insert"))
    }

    /// Load a post without any visibility check. Callers decide what the
    /// requester may see.
    pub async fn fetch_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} \
             FROM posts p \
             LEFT JOIN users u ON p.author_id = u.id \
             WHERE p.id = $1",
        ))
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?;

        let mut post = match row {
            Some(row) => post_from_row(&row)?,
            None => return Ok(None),
        };
        post.tags = self.load_tags(&[post_id]).await?.remove(&post_id).unwrap_or_default();

        Ok(Some(post))
    }

    /// Visibility-checked detail fetch. Bumps the view counter in place
    /// (`view_count = view_count + 1`) so concurrent reads never lose an
    /// increment.
    pub async fn get_post(&self, post_id: Uuid, actor: &Actor) -> Result<Option<Post>> {
        let post = match self.fetch_post(post_id).await? {
            Some(post) => post,
            None => return Ok(None),
        };

        if !access::visible(actor, post.author_id(), &post.moderation) {
            return Ok(None);
        }

        let view_count: i64 =
            sqlx::query_scalar("UPDATE posts SET view_count = view_count + 1 WHERE id = $1 RETURNING view_count")
                .bind(post_id)
                .fetch_one(self.db.pool())
                .await?;

        let mut post = post;
        post.view_count = view_count;
        Ok(Some(post))
    }

    pub async fn list_posts(
        &self,
        actor: &Actor,
        filter: &PostFilter,
        cursor: Option<PostCursor>,
        limit: i64,
    ) -> Result<Vec<Post>> {
        let rows = match cursor {
            Some((pinned, created_at, post_id)) => {
                sqlx::query(&format!(
                    "SELECT {POST_COLUMNS} \
                     FROM posts p \
                     LEFT JOIN users u ON p.author_id = u.id \
                     WHERE {VISIBLE_PREDICATE} \
                       AND ($3::uuid IS NULL OR p.category_id = $3) \
                       AND ($4::uuid IS NULL OR EXISTS ( \
                           SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag_id = $4 \
                       )) \
                       AND (p.is_pinned, p.created_at, p.id) < ($5, $6, $7) \
                     ORDER BY p.is_pinned DESC, p.created_at DESC, p.id DESC \
                     LIMIT $8",
                ))
                .bind(actor.is_staff())
                .bind(actor.user_id())
                .bind(filter.category_id)
                .bind(filter.tag_id)
                .bind(pinned)
                .bind(created_at)
                .bind(post_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {POST_COLUMNS} \
                     FROM posts p \
                     LEFT JOIN users u ON p.author_id = u.id \
                     WHERE {VISIBLE_PREDICATE} \
                       AND ($3::uuid IS NULL OR p.category_id = $3) \
                       AND ($4::uuid IS NULL OR EXISTS ( \
                           SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag_id = $4 \
                       )) \
                     ORDER BY p.is_pinned DESC, p.created_at DESC, p.id DESC \
                     LIMIT $5",
                ))
                .bind(actor.is_staff())
                .bind(actor.user_id())
                .bind(filter.category_id)
                .bind(filter.tag_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            posts.push(post_from_row(&row)?);
        }

        let ids: Vec<Uuid> = posts.iter().map(|post| post.id).collect();
        let mut tags = self.load_tags(&ids).await?;
        for post in &mut posts {
            post.tags = tags.remove(&post.id).unwrap_or_default();
        }

        Ok(posts)
    }

    /// Stage an edit for review. The canonical title/content stay in place
    /// until an auditor approves.
    pub async fn submit_edit(
        &self,
        post_id: Uuid,
        actor: &Actor,
        new_title: Option<String>,
        new_content: Option<String>,
    ) -> Result<Option<Post>> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT author_id, edited_title, edited_content, visibility::text AS visibility, \
                    is_create_approved, is_edit_approved, is_able, last_edited_at \
             FROM posts WHERE id = $1 FOR UPDATE",
        )
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let author_id: Option<Uuid> = row.get("author_id");
        let mut moderation = moderation_from_row(&row)?;
        if !moderation.is_able {
            return Ok(None);
        }
        if !access::permitted(actor, author_id, moderation.is_create_approved, AccessKind::Write) {
            return Err(DomainError::PermissionDenied.into());
        }

        moderation.submit_edit(new_title, new_content, OffsetDateTime::now_utc());

        sqlx::query(
            "UPDATE posts \
             SET edited_title = $2, edited_content = $3, is_edit_approved = $4, \
                 last_edited_at = $5, updated_at = now() \
             WHERE id = $1",
        )
        .bind(post_id)
        .bind(&moderation.edited_title)
        .bind(&moderation.edited_content)
        .bind(moderation.is_edit_approved)
        .bind(moderation.last_edited_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.fetch_post(post_id).await
    }

    /// Soft delete. The row stays put but drops out of every listing.
    pub async fn disable_post(&self, post_id: Uuid, actor: &Actor) -> Result<bool> {
        let row = sqlx::query(
            "SELECT author_id, is_create_approved, is_able FROM posts WHERE id = $1",
        )
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(false),
        };
        let is_able: bool = row.get("is_able");
        if !is_able {
            return Ok(false);
        }
        let author_id: Option<Uuid> = row.get("author_id");
        let is_create_approved: bool = row.get("is_create_approved");
        if !access::permitted(actor, author_id, is_create_approved, AccessKind::Write) {
            return Err(DomainError::PermissionDenied.into());
        }

        let result = sqlx::query("UPDATE posts SET is_able = FALSE, updated_at = now() WHERE id = $1")
            .bind(post_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Staff-only pin toggle; returns the new pinned state.
    pub async fn toggle_pin(&self, post_id: Uuid) -> Result<Option<bool>> {
        let pinned: Option<bool> = sqlx::query_scalar(
            "UPDATE posts SET is_pinned = NOT is_pinned, updated_at = now() \
             WHERE id = $1 AND is_able \
             RETURNING is_pinned",
        )
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(pinned)
    }

    async fn load_tags(&self, post_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Tag>>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            "SELECT pt.post_id, t.id, t.name \
             FROM post_tags pt \
             JOIN tags t ON pt.tag_id = t.id \
             WHERE pt.post_id = ANY($1) \
             ORDER BY t.name",
        )
        .bind(post_ids)
        .fetch_all(self.db.pool())
        .await?;

        let mut by_post: HashMap<Uuid, Vec<Tag>> = HashMap::new();
        for row in rows {
            let post_id: Uuid = row.get("post_id");
            by_post.entry(post_id).or_default().push(Tag {
                id: row.get("id"),
                name: row.get("name"),
            });
        }

        Ok(by_post)
    }
}

pub(crate) fn author_from_row(row: &PgRow) -> Result<Option<AuthorRef>> {
    let author_id: Option<Uuid> = row.get("author_id");
    let id = match author_id {
        Some(id) => id,
        None => return Ok(None),
    };
    let role: String = row.get("author_role");
    let role = UserRole::from_db(&role).ok_or_else(|| anyhow!("unknown user role: {}", role))?;
    Ok(Some(AuthorRef {
        id,
        username: row.get("author_username"),
        display_name: row.get("author_display_name"),
        role,
    }))
}

pub(crate) fn moderation_from_row(row: &PgRow) -> Result<ModerationState> {
    let visibility: String = row.get("visibility");
    let visibility = ContentVisibility::from_db(&visibility)
        .ok_or_else(|| anyhow!("unknown content visibility: {}", visibility))?;
    Ok(ModerationState {
        visibility,
        is_create_approved: row.get("is_create_approved"),
        is_edit_approved: row.get("is_edit_approved"),
        is_able: row.get("is_able"),
        edited_title: row.try_get("edited_title").unwrap_or(None),
        edited_content: row.try_get("edited_content").unwrap_or(None),
        last_edited_at: row.get("last_edited_at"),
    })
}

fn post_from_row(row: &PgRow) -> Result<Post> {
    Ok(Post {
        id: row.get("id"),
        category_id: row.get("category_id"),
        author: author_from_row(row)?,
        title: row.get("title"),
        content: row.get("content"),
        moderation: moderation_from_row(row)?,
        is_pinned: row.get("is_pinned"),
        view_count: row.get("view_count"),
        posted_as: row.get("posted_as"),
        created_by: row.get("created_by"),
        tags: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
