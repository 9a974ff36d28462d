use anyhow::Result;
use uuid::Uuid;

use crate::app::posts::moderation_from_row;
use crate::infra::db::Db;

/// Auditor review actions over posts and comments. Everything here funnels
/// through the `ModerationState` operations so the create-approval flag and
/// the visibility enum always move together.
#[derive(Clone)]
pub struct ModerationService {
    db: Db,
}

impl ModerationService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn approve_post_create(&self, post_id: Uuid) -> Result<bool> {
        self.review_post_create(post_id, true).await
    }

    pub async fn reject_post_create(&self, post_id: Uuid) -> Result<bool> {
        self.review_post_create(post_id, false).await
    }

    pub async fn approve_comment_create(&self, comment_id: Uuid) -> Result<bool> {
        self.review_comment_create(comment_id, true).await
    }

    pub async fn reject_comment_create(&self, comment_id: Uuid) -> Result<bool> {
        self.review_comment_create(comment_id, false).await
    }

    /// Promote a staged post edit into the canonical fields.
    /// `NoPendingEdit` if nothing is staged; `Ok(false)` if the post is
    /// missing or disabled.
    pub async fn approve_post_edit(&self, post_id: Uuid) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT edited_title, edited_content, visibility::text AS visibility, \
                    is_create_approved, is_edit_approved, is_able, last_edited_at \
             FROM posts WHERE id = $1 AND is_able FOR UPDATE",
        )
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(false),
        };
        let mut moderation = moderation_from_row(&row)?;
        let edit = moderation.approve_edit()?;

        sqlx::query(
            "UPDATE posts \
             SET title = COALESCE($2, title), content = COALESCE($3, content), \
                 edited_title = NULL, edited_content = NULL, is_edit_approved = TRUE, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(post_id)
        .bind(edit.title)
        .bind(edit.content)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Turn down a staged post edit. Staging is kept so the author can see
    /// what was rejected.
    pub async fn reject_post_edit(&self, post_id: Uuid) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT edited_title, edited_content, visibility::text AS visibility, \
                    is_create_approved, is_edit_approved, is_able, last_edited_at \
             FROM posts WHERE id = $1 AND is_able FOR UPDATE",
        )
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(false),
        };
        let mut moderation = moderation_from_row(&row)?;
        moderation.reject_edit()?;

        sqlx::query("UPDATE posts SET is_edit_approved = FALSE, updated_at = now() WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn approve_comment_edit(&self, comment_id: Uuid) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT edited_content, visibility::text AS visibility, \
                    is_create_approved, is_edit_approved, is_able, last_edited_at \
             FROM comments WHERE id = $1 AND is_able FOR UPDATE",
        )
        .bind(comment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(false),
        };
        let mut moderation = moderation_from_row(&row)?;
        let edit = moderation.approve_edit()?;

        sqlx::query(
            "UPDATE comments \
             SET content = COALESCE($2, content), edited_content = NULL, \
                 is_edit_approved = TRUE \
             WHERE id = $1",
        )
        .bind(comment_id)
        .bind(edit.content)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn reject_comment_edit(&self, comment_id: Uuid) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT edited_content, visibility::text AS visibility, \
                    is_create_approved, is_edit_approved, is_able, last_edited_at \
             FROM comments WHERE id = $1 AND is_able FOR UPDATE",
        )
        .bind(comment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(false),
        };
        let mut moderation = moderation_from_row(&row)?;
        moderation.reject_edit()?;

        sqlx::query("UPDATE comments SET is_edit_approved = FALSE WHERE id = $1")
            .bind(comment_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn review_post_create(&self, post_id: Uuid, approve: bool) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT edited_title, edited_content, visibility::text AS visibility, \
                    is_create_approved, is_edit_approved, is_able, last_edited_at \
             FROM posts WHERE id = $1 AND is_able FOR UPDATE",
        )
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(false),
        };
        let mut moderation = moderation_from_row(&row)?;
        if approve {
            moderation.approve_create();
        } else {
            moderation.reject_create();
        }

        sqlx::query(
            "UPDATE posts \
             SET is_create_approved = $2, visibility = $3::content_visibility, updated_at = now() \
             WHERE id = $1",
        )
        .bind(post_id)
        .bind(moderation.is_create_approved)
        .bind(moderation.visibility.as_db())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn review_comment_create(&self, comment_id: Uuid, approve: bool) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT edited_content, visibility::text AS visibility, \
                    is_create_approved, is_edit_approved, is_able, last_edited_at \
             FROM comments WHERE id = $1 AND is_able FOR UPDATE",
        )
        .bind(comment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(false),
        };
        let mut moderation = moderation_from_row(&row)?;
        if approve {
            moderation.approve_create();
        } else {
            moderation.reject_create();
        }

        sqlx::query(
            "UPDATE comments \
             SET is_create_approved = $2, visibility = $3::content_visibility \
             WHERE id = $1",
        )
        .bind(comment_id)
        .bind(moderation.is_create_approved)
        .bind(moderation.visibility.as_db())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
