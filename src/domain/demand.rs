use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::user::AuthorRef;

/// Workflow states of a demand ticket.
///
/// `Completed`, `Rejected` and `Cancelled` are terminal; every other state
/// has an explicit allowed-target set and no mutation may bypass it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandStatus {
    Draft,
    Submitted,
    Accepted,
    InProgress,
    PendingReview,
    Completed,
    Rejected,
    OnHold,
    Cancelled,
}

impl DemandStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "accepted" => Some(Self::Accepted),
            "in_progress" => Some(Self::InProgress),
            "pending_review" => Some(Self::PendingReview),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            "on_hold" => Some(Self::OnHold),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::PendingReview => "pending_review",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::OnHold => "on_hold",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn allowed_transitions(&self) -> &'static [DemandStatus] {
        use DemandStatus::*;
        match self {
            Draft => &[Submitted, Cancelled],
            Submitted => &[Accepted, Rejected, Cancelled],
            Accepted => &[InProgress, Cancelled],
            InProgress => &[PendingReview, OnHold, Cancelled],
            PendingReview => &[InProgress, Completed],
            OnHold => &[InProgress, Cancelled],
            Completed | Rejected | Cancelled => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Validate a transition against the table, without applying it.
    pub fn check_transition(&self, to: DemandStatus) -> Result<(), DomainError> {
        if self.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition { from: *self, to })
        }
    }
}

impl fmt::Display for DemandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Demand {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub author: Option<AuthorRef>,
    pub handler_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub status: DemandStatus,
    pub is_able: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One row per accepted status change, append-only.
#[derive(Debug, Clone, Serialize)]
pub struct DemandStatusChange {
    pub id: Uuid,
    pub demand_id: Uuid,
    pub from_status: DemandStatus,
    pub to_status: DemandStatus,
    pub changed_by: Option<Uuid>,
    pub change_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub changed_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemandComment {
    pub id: Uuid,
    pub demand_id: Uuid,
    pub author: Option<AuthorRef>,
    pub parent_comment_id: Option<Uuid>,
    pub content: String,
    pub is_able: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::DemandStatus::*;
    use super::*;

    #[test]
    fn transition_table_matches_workflow() {
        assert_eq!(Draft.allowed_transitions(), &[Submitted, Cancelled]);
        assert_eq!(
            Submitted.allowed_transitions(),
            &[Accepted, Rejected, Cancelled]
        );
        assert_eq!(Accepted.allowed_transitions(), &[InProgress, Cancelled]);
        assert_eq!(
            InProgress.allowed_transitions(),
            &[PendingReview, OnHold, Cancelled]
        );
        assert_eq!(
            PendingReview.allowed_transitions(),
            &[InProgress, Completed]
        );
        assert_eq!(OnHold.allowed_transitions(), &[InProgress, Cancelled]);
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for status in [Completed, Rejected, Cancelled] {
            assert!(status.is_terminal());
            assert_eq!(
                status.check_transition(InProgress),
                Err(DomainError::InvalidTransition {
                    from: status,
                    to: InProgress
                })
            );
        }
    }

    #[test]
    fn shortcut_transitions_are_rejected() {
        assert!(Submitted.check_transition(Completed).is_err());
        assert!(Draft.check_transition(Accepted).is_err());
        assert!(Accepted.check_transition(PendingReview).is_err());
    }

    #[test]
    fn happy_path_chain_is_valid() {
        let chain = [Draft, Submitted, Accepted, InProgress, PendingReview, Completed];
        for pair in chain.windows(2) {
            assert!(pair[0].check_transition(pair[1]).is_ok());
        }
    }

    #[test]
    fn pending_review_can_bounce_back_to_in_progress() {
        assert!(PendingReview.check_transition(InProgress).is_ok());
        assert!(OnHold.check_transition(InProgress).is_ok());
    }

    #[test]
    fn db_round_trip_covers_all_states() {
        for status in [
            Draft,
            Submitted,
            Accepted,
            InProgress,
            PendingReview,
            Completed,
            Rejected,
            OnHold,
            Cancelled,
        ] {
            assert_eq!(DemandStatus::from_db(status.as_db()), Some(status));
        }
        assert_eq!(DemandStatus::from_db("new"), None);
    }
}
