use anyhow::{anyhow, Result};
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::notifications::NotificationService;
use crate::app::posts::author_from_row;
use crate::domain::demand::{Demand, DemandComment, DemandStatus, DemandStatusChange};
use crate::domain::error::DomainError;
use crate::domain::user::Actor;
use crate::infra::db::Db;

const DEMAND_COLUMNS: &str = "d.id, d.category_id, d.handler_id, d.title, d.description, \
     d.status::text AS status, d.is_able, d.completed_at, d.created_at, d.updated_at, \
     u.id AS author_id, u.username AS author_username, \
     u.display_name AS author_display_name, u.role::text AS author_role";

#[derive(Clone)]
pub struct DemandService {
    db: Db,
}

impl DemandService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// New demands always start as drafts; every later move goes through
    /// [`change_status`](Self::change_status).
    pub async fn create_demand(
        &self,
        author_id: Uuid,
        category_id: Option<Uuid>,
        title: String,
        description: String,
    ) -> Result<Demand> {
        let demand_id: Uuid = sqlx::query_scalar(
            "INSERT INTO demands (author_id, category_id, title, description) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(author_id)
        .bind(category_id)
        .bind(title)
        .bind(description)
        .fetch_one(self.db.pool())
        .await?;

        self.fetch_demand(demand_id)
            .await?
            .ok_or_else(|| anyhow!("demand vanished after insert"))
    }

    async fn fetch_demand(&self, demand_id: Uuid) -> Result<Option<Demand>> {
        let row = sqlx::query(&format!(
            "SELECT {DEMAND_COLUMNS} \
             FROM demands d \
             LEFT JOIN users u ON d.author_id = u.id \
             WHERE d.id = $1",
        ))
        .bind(demand_id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(demand_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Demands are only ever visible to their author and to staff; disabled
    /// rows are gone for both.
    pub async fn get_demand(&self, demand_id: Uuid, actor: &Actor) -> Result<Option<Demand>> {
        let demand = match self.fetch_demand(demand_id).await? {
            Some(demand) => demand,
            None => return Ok(None),
        };

        if !demand.is_able {
            return Ok(None);
        }
        if !actor.is_staff() && !actor.owns(demand.author.as_ref().map(|author| author.id)) {
            return Ok(None);
        }

        Ok(Some(demand))
    }

    pub async fn list_demands(
        &self,
        actor: &Actor,
        search: Option<&str>,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Demand>> {
        let pattern = search.map(|term| format!("%{}%", term));

        let rows = match cursor {
            Some((created_at, demand_id)) => {
                sqlx::query(&format!(
                    "SELECT {DEMAND_COLUMNS} \
                     FROM demands d \
                     LEFT JOIN users u ON d.author_id = u.id \
                     WHERE d.is_able \
                       AND ($1 OR d.author_id = $2) \
                       AND ($3::text IS NULL OR d.title ILIKE $3 OR d.description ILIKE $3) \
                       AND (d.created_at < $4 OR (d.created_at = $4 AND d.id < $5)) \
                     ORDER BY d.created_at DESC, d.id DESC \
                     LIMIT $6",
                ))
                .bind(actor.is_staff())
                .bind(actor.user_id())
                .bind(&pattern)
                .bind(created_at)
                .bind(demand_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {DEMAND_COLUMNS} \
                     FROM demands d \
                     LEFT JOIN users u ON d.author_id = u.id \
                     WHERE d.is_able \
                       AND ($1 OR d.author_id = $2) \
                       AND ($3::text IS NULL OR d.title ILIKE $3 OR d.description ILIKE $3) \
                     ORDER BY d.created_at DESC, d.id DESC \
                     LIMIT $4",
                ))
                .bind(actor.is_staff())
                .bind(actor.user_id())
                .bind(&pattern)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        let mut demands = Vec::with_capacity(rows.len());
        for row in rows {
            demands.push(demand_from_row(&row)?);
        }

        Ok(demands)
    }

    /// The single funnel for status mutation. Validates the transition
    /// table, stamps `completed_at`, assigns a handler on first acceptance
    /// and appends the audit row, all in one transaction. The author is
    /// notified after commit; a notification failure never rolls anything
    /// back.
    pub async fn change_status(
        &self,
        demand_id: Uuid,
        new_status: DemandStatus,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<Demand> {
        let actor_id = actor.user_id().ok_or(DomainError::PermissionDenied)?;

        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "SELECT author_id, handler_id, status::text AS status, is_able \
             FROM demands WHERE id = $1 FOR UPDATE",
        )
        .bind(demand_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Err(DomainError::NotFound.into()),
        };
        let is_able: bool = row.get("is_able");
        if !is_able {
            return Err(DomainError::NotFound.into());
        }

        let author_id: Option<Uuid> = row.get("author_id");
        let handler_id: Option<Uuid> = row.get("handler_id");
        let status: String = row.get("status");
        let current = DemandStatus::from_db(&status)
            .ok_or_else(|| anyhow!("unknown demand status: {}", status))?;

        // Authors may submit or cancel their own demand; every other move
        // is staff-only.
        let author_allowed = actor.owns(author_id)
            && matches!(new_status, DemandStatus::Submitted | DemandStatus::Cancelled);
        if !actor.is_staff() && !author_allowed {
            return Err(DomainError::PermissionDenied.into());
        }

        current.check_transition(new_status)?;

        let completed_at = if new_status == DemandStatus::Completed {
            Some(OffsetDateTime::now_utc())
        } else {
            None
        };
        let new_handler = if new_status == DemandStatus::Accepted && handler_id.is_none() {
            Some(actor_id)
        } else {
            handler_id
        };

        sqlx::query(
            "UPDATE demands \
             SET status = $2::demand_status, handler_id = $3, \
                 completed_at = COALESCE($4, completed_at), updated_at = now() \
             WHERE id = $1",
        )
        .bind(demand_id)
        .bind(new_status.as_db())
        .bind(new_handler)
        .bind(completed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO demand_status_changes \
                 (demand_id, from_status, to_status, changed_by, change_reason) \
             VALUES ($1, $2::demand_status, $3::demand_status, $4, $5)",
        )
        .bind(demand_id)
        .bind(current.as_db())
        .bind(new_status.as_db())
        .bind(actor_id)
        .bind(&reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if let Some(author_id) = author_id {
            let notifications = NotificationService::new(self.db.clone());
            let payload = json!({
                "demand_id": demand_id,
                "from_status": current.as_db(),
                "to_status": new_status.as_db(),
                "changed_by": actor_id,
            });
            notifications
                .notify(author_id, "demand_status_changed", payload)
                .await;
        }

        self.fetch_demand(demand_id)
            .await?
            .ok_or_else(|| anyhow!("demand vanished after status change"))
    }

    /// Append-only audit trail, newest change first.
    pub async fn status_history(
        &self,
        demand_id: Uuid,
        actor: &Actor,
    ) -> Result<Option<Vec<DemandStatusChange>>> {
        if self.get_demand(demand_id, actor).await?.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query(
            "SELECT id, demand_id, from_status::text AS from_status, \
                    to_status::text AS to_status, changed_by, change_reason, changed_at \
             FROM demand_status_changes \
             WHERE demand_id = $1 \
             ORDER BY changed_at DESC, id DESC",
        )
        .bind(demand_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut changes = Vec::with_capacity(rows.len());
        for row in rows {
            changes.push(status_change_from_row(&row)?);
        }

        Ok(Some(changes))
    }

    /// Staff worklist: demands from regular users that no staff member has
    /// commented on yet.
    pub async fn list_unreplied(
        &self,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Demand>> {
        let rows = match cursor {
            Some((created_at, demand_id)) => {
                sqlx::query(&format!(
                    "SELECT {DEMAND_COLUMNS} \
                     FROM demands d \
                     JOIN users u ON d.author_id = u.id \
                     WHERE d.is_able \
                       AND u.role = 'user' \
                       AND NOT EXISTS ( \
                           SELECT 1 FROM demand_comments dc \
                           JOIN users cu ON dc.author_id = cu.id \
                           WHERE dc.demand_id = d.id \
                             AND dc.is_able \
                             AND cu.role IN ('auditor', 'admin') \
                       ) \
                       AND (d.created_at < $1 OR (d.created_at = $1 AND d.id < $2)) \
                     ORDER BY d.created_at DESC, d.id DESC \
                     LIMIT $3",
                ))
                .bind(created_at)
                .bind(demand_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {DEMAND_COLUMNS} \
                     FROM demands d \
                     JOIN users u ON d.author_id = u.id \
                     WHERE d.is_able \
                       AND u.role = 'user' \
                       AND NOT EXISTS ( \
                           SELECT 1 FROM demand_comments dc \
                           JOIN users cu ON dc.author_id = cu.id \
                           WHERE dc.demand_id = d.id \
                             AND dc.is_able \
                             AND cu.role IN ('auditor', 'admin') \
                       ) \
                     ORDER BY d.created_at DESC, d.id DESC \
                     LIMIT $1",
                ))
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        let mut demands = Vec::with_capacity(rows.len());
        for row in rows {
            demands.push(demand_from_row(&row)?);
        }

        Ok(demands)
    }

    pub async fn create_comment(
        &self,
        demand_id: Uuid,
        actor: &Actor,
        content: String,
        parent_comment_id: Option<Uuid>,
    ) -> Result<DemandComment> {
        let author_id = actor.user_id().ok_or(DomainError::PermissionDenied)?;
        if self.get_demand(demand_id, actor).await?.is_none() {
            return Err(DomainError::NotFound.into());
        }

        if let Some(parent_id) = parent_comment_id {
            let parent_demand: Option<Uuid> =
                sqlx::query_scalar("SELECT demand_id FROM demand_comments WHERE id = $1 AND is_able")
                    .bind(parent_id)
                    .fetch_optional(self.db.pool())
                    .await?;
            match parent_demand {
                Some(parent_demand) if parent_demand == demand_id => {}
                _ => return Err(DomainError::NotFound.into()),
            }
        }

        let row = sqlx::query(
            "WITH inserted AS ( \
                INSERT INTO demand_comments (demand_id, author_id, content, parent_comment_id) \
                VALUES ($1, $2, $3, $4) \
                RETURNING id, demand_id, parent_comment_id, content, is_able, created_at \
             ) \
             SELECT c.id, c.demand_id, c.parent_comment_id, c.content, c.is_able, c.created_at, \
                    u.id AS author_id, u.username AS author_username, \
                    u.display_name AS author_display_name, u.role::text AS author_role \
             FROM inserted c \
             JOIN users u ON u.id = $2",
        )
        .bind(demand_id)
        .bind(author_id)
        .bind(content)
        .bind(parent_comment_id)
        .fetch_one(self.db.pool())
        .await?;

        demand_comment_from_row(&row)
    }

    pub async fn list_comments(
        &self,
        demand_id: Uuid,
        actor: &Actor,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Option<Vec<DemandComment>>> {
        if self.get_demand(demand_id, actor).await?.is_none() {
            return Ok(None);
        }

        let rows = match cursor {
            Some((created_at, comment_id)) => {
                sqlx::query(
                    "SELECT c.id, c.demand_id, c.parent_comment_id, c.content, c.is_able, \
                            c.created_at, u.id AS author_id, u.username AS author_username, \
                            u.display_name AS author_display_name, u.role::text AS author_role \
                     FROM demand_comments c \
                     LEFT JOIN users u ON c.author_id = u.id \
                     WHERE c.demand_id = $1 \
                       AND c.is_able \
                       AND (c.created_at < $2 OR (c.created_at = $2 AND c.id < $3)) \
                     ORDER BY c.created_at DESC, c.id DESC \
                     LIMIT $4",
                )
                .bind(demand_id)
                .bind(created_at)
                .bind(comment_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT c.id, c.demand_id, c.parent_comment_id, c.content, c.is_able, \
                            c.created_at, u.id AS author_id, u.username AS author_username, \
                            u.display_name AS author_display_name, u.role::text AS author_role \
                     FROM demand_comments c \
                     LEFT JOIN users u ON c.author_id = u.id \
                     WHERE c.demand_id = $1 AND c.is_able \
                     ORDER BY c.created_at DESC, c.id DESC \
                     LIMIT $2",
                )
                .bind(demand_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        let mut comments = Vec::with_capacity(rows.len());
        for row in rows {
            comments.push(demand_comment_from_row(&row)?);
        }

        Ok(Some(comments))
    }

    pub async fn disable_demand(&self, demand_id: Uuid, actor: &Actor) -> Result<bool> {
        let row = sqlx::query("SELECT author_id, is_able FROM demands WHERE id = $1")
            .bind(demand_id)
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
        if !actor.is_staff() && !actor.owns(author_id) {
            return Err(DomainError::PermissionDenied.into());
        }

        let result =
            sqlx::query("UPDATE demands SET is_able = FALSE, updated_at = now() WHERE id = $1")
                .bind(demand_id)
                .execute(self.db.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn demand_from_row(row: &PgRow) -> Result<Demand> {
    let status: String = row.get("status");
    let status = DemandStatus::from_db(&status)
        .ok_or_else(|| anyhow!("unknown demand status: {}", status))?;
    Ok(Demand {
        id: row.get("id"),
        category_id: row.get("category_id"),
        author: author_from_row(row)?,
        handler_id: row.get("handler_id"),
        title: row.get("title"),
        description: row.get("description"),
        status,
        is_able: row.get("is_able"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn status_change_from_row(row: &PgRow) -> Result<DemandStatusChange> {
    let from_status: String = row.get("from_status");
    let from_status = DemandStatus::from_db(&from_status)
        .ok_or_else(|| anyhow!("unknown demand status: {}", from_status))?;
    let to_status: String = row.get("to_status");
    let to_status = DemandStatus::from_db(&to_status)
        .ok_or_else(|| anyhow!("unknown demand status: {}", to_status))?;
    Ok(DemandStatusChange {
        id: row.get("id"),
        demand_id: row.get("demand_id"),
        from_status,
        to_status,
        changed_by: row.get("changed_by"),
        change_reason: row.get("change_reason"),
        changed_at: row.get("changed_at"),
    })
}

fn demand_comment_from_row(row: &PgRow) -> Result<DemandComment> {
    Ok(DemandComment {
        id: row.get("id"),
        demand_id: row.get("demand_id"),
        author: author_from_row(row)?,
        parent_comment_id: row.get("parent_comment_id"),
        content: row.get("content"),
        is_able: row.get("is_able"),
        created_at: row.get("created_at"),
    })
}
