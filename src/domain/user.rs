use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Auditor,
    Admin,
}

impl UserRole {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "auditor" => Some(Self::Auditor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Auditor => "auditor",
            Self::Admin => "admin",
        }
    }

    /// Auditors and admins are interchangeable for moderation purposes.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Auditor | Self::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Author info embedded in post/comment/demand responses. Nullable end to
/// end: the author row may have been removed.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorRef {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: UserRole,
}

/// The requesting identity, as resolved by the auth extractor. Everything
/// downstream of the HTTP layer reasons about access in terms of this.
#[derive(Debug, Clone, Copy)]
pub enum Actor {
    Anonymous,
    User { id: Uuid, role: UserRole },
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::Anonymous => None,
            Self::User { id, .. } => Some(*id),
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Self::User { role, .. } if role.is_staff())
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::User { role, .. } if role.is_admin())
    }

    /// True when this actor is the (non-null) owner of the given row.
    pub fn owns(&self, owner: Option<Uuid>) -> bool {
        match (self.user_id(), owner) {
            (Some(actor), Some(owner)) => actor == owner,
            _ => false,
        }
    }
}
