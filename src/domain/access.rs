//! Object-level authorization shared by all content types.
//!
//! Listings and detail fetches both go through [`visible`]; single-item
//! mutations go through [`permitted`]. The SQL listings in `app::posts` and
//! `app::comments` must agree with these predicates exactly.

use uuid::Uuid;

use crate::domain::content::{ContentVisibility, ModerationState};
use crate::domain::user::Actor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// Whether a content item appears at all for the given viewer.
///
/// Precedence, in order:
/// 1. disabled rows are hidden from everyone, staff included;
/// 2. anonymous viewers see approved public items only;
/// 3. authenticated viewers additionally see their own items;
/// 4. staff see everything that survives rule 1.
pub fn visible(actor: &Actor, owner: Option<Uuid>, moderation: &ModerationState) -> bool {
    if !moderation.is_able {
        return false;
    }
    if actor.is_staff() {
        return true;
    }
    if moderation.is_create_approved && moderation.visibility == ContentVisibility::Public {
        return true;
    }
    actor.owns(owner)
}

/// Object-level permission for a single read or write.
///
/// Staff may do anything; anyone may read approved content; everything else
/// requires ownership, which anonymous actors never have.
pub fn permitted(
    actor: &Actor,
    owner: Option<Uuid>,
    is_create_approved: bool,
    action: AccessKind,
) -> bool {
    if actor.is_staff() {
        return true;
    }
    if action == AccessKind::Read && is_create_approved {
        return true;
    }
    actor.owns(owner)
}

/// Whether the viewer may see a not-yet-approved staged edit, used by the
/// display projections.
pub fn sees_pending_edit(actor: &Actor, owner: Option<Uuid>) -> bool {
    actor.is_staff() || actor.owns(owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::content::ModerationState;
    use crate::domain::user::UserRole;

    fn approved_public() -> ModerationState {
        let mut state = ModerationState::new_unapproved();
        state.approve_create();
        state
    }

    fn user(id: Uuid) -> Actor {
        Actor::User {
            id,
            role: UserRole::User,
        }
    }

    fn auditor() -> Actor {
        Actor::User {
            id: Uuid::new_v4(),
            role: UserRole::Auditor,
        }
    }

    #[test]
    fn disabled_items_are_hidden_from_everyone() {
        let owner = Uuid::new_v4();
        let mut state = approved_public();
        state.disable();

        assert!(!visible(&Actor::Anonymous, Some(owner), &state));
        assert!(!visible(&user(owner), Some(owner), &state));
        assert!(!visible(&auditor(), Some(owner), &state));
    }

    #[test]
    fn anonymous_sees_only_approved_public() {
        let owner = Uuid::new_v4();
        assert!(visible(&Actor::Anonymous, Some(owner), &approved_public()));
        assert!(!visible(
            &Actor::Anonymous,
            Some(owner),
            &ModerationState::new_unapproved()
        ));
    }

    #[test]
    fn author_sees_own_unapproved_item() {
        let owner = Uuid::new_v4();
        let state = ModerationState::new_unapproved();
        assert!(visible(&user(owner), Some(owner), &state));
        assert!(!visible(&user(Uuid::new_v4()), Some(owner), &state));
    }

    #[test]
    fn staff_see_everything_able() {
        let state = ModerationState::new_unapproved();
        assert!(visible(&auditor(), Some(Uuid::new_v4()), &state));
        assert!(visible(&auditor(), None, &state));
    }

    #[test]
    fn anonymous_may_read_approved_but_never_write() {
        let owner = Some(Uuid::new_v4());
        assert!(permitted(&Actor::Anonymous, owner, true, AccessKind::Read));
        assert!(!permitted(&Actor::Anonymous, owner, true, AccessKind::Write));
        assert!(!permitted(&Actor::Anonymous, owner, false, AccessKind::Read));
    }

    #[test]
    fn owner_may_read_and_write_unapproved_item() {
        let owner = Uuid::new_v4();
        assert!(permitted(&user(owner), Some(owner), false, AccessKind::Read));
        assert!(permitted(&user(owner), Some(owner), false, AccessKind::Write));

        let stranger = user(Uuid::new_v4());
        assert!(!permitted(&stranger, Some(owner), false, AccessKind::Read));
        assert!(!permitted(&stranger, Some(owner), true, AccessKind::Write));
    }

    #[test]
    fn staff_always_permitted() {
        assert!(permitted(&auditor(), None, false, AccessKind::Write));
    }
}
