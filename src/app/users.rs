use anyhow::Result;
use uuid::Uuid;

use crate::app::auth::user_from_row;
use crate::domain::user::{User, UserRole};
use crate::infra::db::Db;

#[derive(Clone)]
pub struct UserService {
    db: Db,
}

impl UserService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, display_name, role::text AS role, created_at \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        display_name: Option<String>,
        email: Option<String>,
    ) -> Result<Option<User>> {
        let row = sqlx::query(
            "UPDATE users \
             SET display_name = COALESCE($2, display_name), \
                 email = COALESCE($3, email) \
             WHERE id = $1 \
             RETURNING id, username, email, display_name, role::text AS role, created_at",
        )
        .bind(user_id)
        .bind(display_name)
        .bind(email)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Operator-level role assignment; this is how the first auditor/admin
    /// is minted.
    pub async fn set_role(&self, user_id: Uuid, role: UserRole) -> Result<Option<User>> {
        let row = sqlx::query(
            "UPDATE users SET role = $2::user_role WHERE id = $1 \
             RETURNING id, username, email, display_name, role::text AS role, created_at",
        )
        .bind(user_id)
        .bind(role.as_db())
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }
}
