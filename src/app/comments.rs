use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::posts::{author_from_row, moderation_from_row};
use crate::domain::access::{self, AccessKind};
use crate::domain::error::DomainError;
use crate::domain::post::Comment;
use crate::domain::user::Actor;
use crate::infra::db::Db;

const COMMENT_COLUMNS: &str = "c.id, c.post_id, c.parent_comment_id, c.content, \
     c.edited_content, c.visibility::text AS visibility, c.is_create_approved, \
     c.is_edit_approved, c.is_able, c.last_edited_at, c.created_at, \
     u.id AS author_id, u.username AS author_username, \
     u.display_name AS author_display_name, u.role::text AS author_role";

// Same precedence as the post listing predicate; comments share the
// moderation model wholesale.
const VISIBLE_PREDICATE: &str = "c.is_able \
     AND ($2 OR (c.is_create_approved AND c.visibility = 'public') OR c.author_id = $3)";

#[derive(Clone)]
pub struct CommentService {
    db: Db,
}

impl CommentService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create a comment under a post the actor can see. Replies must target
    /// a parent on the same post.
    pub async fn create_comment(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        content: String,
        parent_comment_id: Option<Uuid>,
    ) -> Result<Comment> {
        if let Some(parent_id) = parent_comment_id {
            let parent_post: Option<Uuid> =
                sqlx::query_scalar("SELECT post_id FROM comments WHERE id = $1 AND is_able")
                    .bind(parent_id)
                    .fetch_optional(self.db.pool())
                    .await?;
            match parent_post {
                Some(parent_post) if parent_post == post_id => {}
                _ => return Err(DomainError::NotFound.into()),
            }
        }

        let comment_id: Uuid = sqlx::query_scalar(
            "INSERT INTO comments (post_id, author_id, content, parent_comment_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(content)
        .bind(parent_comment_id)
        .fetch_one(self.db.pool())
        .await?;

        self.fetch_comment(comment_id)
            .await?
            .ok_or_else(|| anyhow!("comment vanished after insert"))
    }

    pub async fn fetch_comment(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} \
             FROM comments c \
             LEFT JOIN users u ON c.author_id = u.id \
             WHERE c.id = $1",
        ))
        .bind(comment_id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(comment_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_by_post(
        &self,
        post_id: Uuid,
        actor: &Actor,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Comment>> {
        let rows = match cursor {
            Some((created_at, comment_id)) => {
                sqlx::query(&format!(
                    "SELECT {COMMENT_COLUMNS} \
                     FROM comments c \
                     LEFT JOIN users u ON c.author_id = u.id \
                     WHERE c.post_id = $1 \
                       AND {VISIBLE_PREDICATE} \
                       AND (c.created_at < $4 OR (c.created_at = $4 AND c.id < $5)) \
                     ORDER BY c.created_at DESC, c.id DESC \
                     LIMIT $6",
                ))
                .bind(post_id)
                .bind(actor.is_staff())
                .bind(actor.user_id())
                .bind(created_at)
                .bind(comment_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {COMMENT_COLUMNS} \
                     FROM comments c \
                     LEFT JOIN users u ON c.author_id = u.id \
                     WHERE c.post_id = $1 \
                       AND {VISIBLE_PREDICATE} \
                     ORDER BY c.created_at DESC, c.id DESC \
                     LIMIT $4",
                ))
                .bind(post_id)
                .bind(actor.is_staff())
                .bind(actor.user_id())
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        let mut comments = Vec::with_capacity(rows.len());
        for row in rows {
            comments.push(comment_from_row(&row)?);
        }

        Ok(comments)
    }

    /// Stage a content edit for review, same flow as posts minus the title.
    pub async fn submit_edit(
        &self,
        comment_id: Uuid,
        actor: &Actor,
        new_content: String,
    ) -> Result<Option<Comment>> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT author_id, edited_content, visibility::text AS visibility, \
                    is_create_approved, is_edit_approved, is_able, last_edited_at \
             FROM comments WHERE id = $1 FOR UPDATE",
        )
        .bind(comment_id)
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

        moderation.submit_edit(None, Some(new_content), OffsetDateTime::now_utc());

        sqlx::query(
            "UPDATE comments \
             SET edited_content = $2, is_edit_approved = $3, last_edited_at = $4 \
             WHERE id = $1",
        )
        .bind(comment_id)
        .bind(&moderation.edited_content)
        .bind(moderation.is_edit_approved)
        .bind(moderation.last_edited_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.fetch_comment(comment_id).await
    }

    pub async fn disable_comment(&self, comment_id: Uuid, actor: &Actor) -> Result<bool> {
        let row = sqlx::query(
            "SELECT author_id, is_create_approved, is_able FROM comments WHERE id = $1",
        )
        .bind(comment_id)
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

        let result = sqlx::query("UPDATE comments SET is_able = FALSE WHERE id = $1")
            .bind(comment_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn comment_from_row(row: &PgRow) -> Result<Comment> {
    Ok(Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author: author_from_row(row)?,
        parent_comment_id: row.get("parent_comment_id"),
        content: row.get("content"),
        moderation: moderation_from_row(row)?,
        created_at: row.get("created_at"),
    })
}
