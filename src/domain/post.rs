use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::access;
use crate::domain::category::Tag;
use crate::domain::content::{ContentVisibility, ModerationState};
use crate::domain::user::{Actor, AuthorRef};

/// A forum post as loaded from storage: canonical fields plus the shared
/// moderation state. Never serialized directly; responses go through
/// [`PostView`] so the staged-edit projection is applied per viewer.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub author: Option<AuthorRef>,
    pub title: String,
    pub content: String,
    pub moderation: ModerationState,
    pub is_pinned: bool,
    pub view_count: i64,
    /// Display alias used when staff post on behalf of someone else.
    pub posted_as: Option<String>,
    pub created_by: Option<Uuid>,
    pub tags: Vec<Tag>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Post {
    pub fn author_id(&self) -> Option<Uuid> {
        self.author.as_ref().map(|author| author.id)
    }

    /// Project this post for a viewer: pending edits are substituted into
    /// title/content only for the owner and staff.
    pub fn into_view(self, actor: &Actor) -> PostView {
        let sees_pending = access::sees_pending_edit(actor, self.author_id());
        let title = self
            .moderation
            .display_title(&self.title, sees_pending)
            .to_owned();
        let content = self
            .moderation
            .display_content(&self.content, sees_pending)
            .to_owned();

        PostView {
            id: self.id,
            category_id: self.category_id,
            author: self.author,
            title,
            content,
            visibility: self.moderation.visibility,
            is_create_approved: self.moderation.is_create_approved,
            is_edit_approved: self.moderation.is_edit_approved,
            has_pending_edit: self.moderation.has_pending_edit(),
            is_pinned: self.is_pinned,
            view_count: self.view_count,
            posted_as: self.posted_as,
            tags: self.tags,
            last_edited_at: self.moderation.last_edited_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub author: Option<AuthorRef>,
    pub title: String,
    pub content: String,
    pub visibility: ContentVisibility,
    pub is_create_approved: bool,
    pub is_edit_approved: bool,
    pub has_pending_edit: bool,
    pub is_pinned: bool,
    pub view_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posted_as: Option<String>,
    pub tags: Vec<Tag>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_edited_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A threaded comment under a post. Moderation-wise identical to a post,
/// minus the title.
#[derive(Debug, Clone)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author: Option<AuthorRef>,
    pub parent_comment_id: Option<Uuid>,
    pub content: String,
    pub moderation: ModerationState,
    pub created_at: OffsetDateTime,
}

impl Comment {
    pub fn author_id(&self) -> Option<Uuid> {
        self.author.as_ref().map(|author| author.id)
    }

    pub fn into_view(self, actor: &Actor) -> CommentView {
        let sees_pending = access::sees_pending_edit(actor, self.author_id());
        let content = self
            .moderation
            .display_content(&self.content, sees_pending)
            .to_owned();

        CommentView {
            id: self.id,
            post_id: self.post_id,
            author: self.author,
            parent_comment_id: self.parent_comment_id,
            content,
            visibility: self.moderation.visibility,
            is_create_approved: self.moderation.is_create_approved,
            is_edit_approved: self.moderation.is_edit_approved,
            has_pending_edit: self.moderation.has_pending_edit(),
            last_edited_at: self.moderation.last_edited_at,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author: Option<AuthorRef>,
    pub parent_comment_id: Option<Uuid>,
    pub content: String,
    pub visibility: ContentVisibility,
    pub is_create_approved: bool,
    pub is_edit_approved: bool,
    pub has_pending_edit: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_edited_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
