use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentVisibility {
    Private,
    Public,
}

impl ContentVisibility {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "private" => Some(Self::Private),
            "public" => Some(Self::Public),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

/// Moderation fields shared by posts and comments.
///
/// `visibility` and `is_create_approved` are stored redundantly and always
/// flipped together by [`approve_create`](Self::approve_create) /
/// [`reject_create`](Self::reject_create); neither is derived from the
/// other. `edited_title`/`edited_content` hold a staged edit awaiting
/// review; canonical values live on the owning row and are only touched
/// when an edit is approved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationState {
    pub visibility: ContentVisibility,
    pub is_create_approved: bool,
    pub is_edit_approved: bool,
    pub is_able: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_content: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_edited_at: Option<OffsetDateTime>,
}

/// Staged values promoted into the canonical fields by an approved edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedEdit {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl ModerationState {
    /// State of freshly created content: hidden until an auditor approves it.
    pub fn new_unapproved() -> Self {
        Self {
            visibility: ContentVisibility::Private,
            is_create_approved: false,
            is_edit_approved: true,
            is_able: true,
            edited_title: None,
            edited_content: None,
            last_edited_at: None,
        }
    }

    pub fn has_pending_edit(&self) -> bool {
        self.edited_title.is_some() || self.edited_content.is_some()
    }

    /// Stage an edit for review. Canonical fields are not touched until an
    /// auditor approves.
    pub fn submit_edit(
        &mut self,
        title: Option<String>,
        content: Option<String>,
        now: OffsetDateTime,
    ) {
        if let Some(title) = title {
            self.edited_title = Some(title);
        }
        if let Some(content) = content {
            self.edited_content = Some(content);
        }
        self.is_edit_approved = false;
        self.last_edited_at = Some(now);
    }

    /// Promote the staged edit. Returns the staged values so the caller can
    /// write them into the canonical columns; staging is cleared.
    pub fn approve_edit(&mut self) -> Result<ApprovedEdit, DomainError> {
        if !self.has_pending_edit() {
            return Err(DomainError::NoPendingEdit);
        }
        let edit = ApprovedEdit {
            title: self.edited_title.take(),
            content: self.edited_content.take(),
        };
        self.is_edit_approved = true;
        Ok(edit)
    }

    /// Reject the staged edit. Staging is kept so the author can see what
    /// was rejected; canonical content is unaffected.
    pub fn reject_edit(&mut self) -> Result<(), DomainError> {
        if !self.has_pending_edit() {
            return Err(DomainError::NoPendingEdit);
        }
        self.is_edit_approved = false;
        Ok(())
    }

    pub fn approve_create(&mut self) {
        self.is_create_approved = true;
        self.visibility = ContentVisibility::Public;
    }

    pub fn reject_create(&mut self) {
        self.is_create_approved = false;
        self.visibility = ContentVisibility::Private;
    }

    /// Soft delete. Disabled rows are excluded from every listing, for
    /// every viewer class.
    pub fn disable(&mut self) {
        self.is_able = false;
    }

    /// Read-time projection of the title: the staged value when the edit is
    /// approved or the viewer may see pending edits, the canonical value
    /// otherwise. Side-effect free.
    pub fn display_title<'a>(&'a self, canonical: &'a str, viewer_sees_pending: bool) -> &'a str {
        if self.is_edit_approved || viewer_sees_pending {
            return self.edited_title.as_deref().unwrap_or(canonical);
        }
        canonical
    }

    /// Read-time projection of the content; same rule as `display_title`.
    pub fn display_content<'a>(&'a self, canonical: &'a str, viewer_sees_pending: bool) -> &'a str {
        if self.is_edit_approved || viewer_sees_pending {
            return self.edited_content.as_deref().unwrap_or(canonical);
        }
        canonical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn new_content_is_private_and_unapproved() {
        let state = ModerationState::new_unapproved();
        assert_eq!(state.visibility, ContentVisibility::Private);
        assert!(!state.is_create_approved);
        assert!(state.is_edit_approved);
        assert!(state.is_able);
        assert!(!state.has_pending_edit());
    }

    #[test]
    fn approve_create_sets_both_fields_together() {
        let mut state = ModerationState::new_unapproved();
        state.approve_create();
        assert!(state.is_create_approved);
        assert_eq!(state.visibility, ContentVisibility::Public);

        state.reject_create();
        assert!(!state.is_create_approved);
        assert_eq!(state.visibility, ContentVisibility::Private);
    }

    #[test]
    fn submit_edit_stages_without_touching_canonical() {
        let mut state = ModerationState::new_unapproved();
        state.submit_edit(Some("new title".into()), None, now());
        assert_eq!(state.edited_title.as_deref(), Some("new title"));
        assert!(state.edited_content.is_none());
        assert!(!state.is_edit_approved);
        assert_eq!(state.last_edited_at, Some(now()));
    }

    #[test]
    fn approve_edit_without_staged_edit_fails_and_mutates_nothing() {
        let mut state = ModerationState::new_unapproved();
        let before = state.clone();
        assert_eq!(state.approve_edit(), Err(DomainError::NoPendingEdit));
        assert_eq!(state.is_edit_approved, before.is_edit_approved);
        assert_eq!(state.reject_edit(), Err(DomainError::NoPendingEdit));
    }

    #[test]
    fn approve_edit_with_title_only_promotes_title_alone() {
        let mut state = ModerationState::new_unapproved();
        state.submit_edit(Some("edited".into()), None, now());

        let edit = state.approve_edit().unwrap();
        assert_eq!(edit.title.as_deref(), Some("edited"));
        assert!(edit.content.is_none());
        assert!(state.edited_title.is_none());
        assert!(state.edited_content.is_none());
        assert!(state.is_edit_approved);
    }

    #[test]
    fn reject_edit_keeps_staging_intact() {
        let mut state = ModerationState::new_unapproved();
        state.submit_edit(None, Some("draft body".into()), now());

        state.reject_edit().unwrap();
        assert!(!state.is_edit_approved);
        assert_eq!(state.edited_content.as_deref(), Some("draft body"));
    }

    #[test]
    fn display_projection_hides_pending_edit_from_outsiders() {
        let mut state = ModerationState::new_unapproved();
        state.submit_edit(Some("staged".into()), Some("staged body".into()), now());

        // Pending and viewer is not owner/staff: canonical wins.
        assert_eq!(state.display_title("original", false), "original");
        assert_eq!(state.display_content("body", false), "body");

        // Owner/staff see the staged values.
        assert_eq!(state.display_title("original", true), "staged");
        assert_eq!(state.display_content("body", true), "staged body");
    }

    #[test]
    fn display_projection_after_rejection_still_shows_staged_to_owner() {
        let mut state = ModerationState::new_unapproved();
        state.submit_edit(Some("rejected title".into()), None, now());
        state.reject_edit().unwrap();

        assert_eq!(state.display_title("original", true), "rejected title");
        assert_eq!(state.display_title("original", false), "original");
    }
}
