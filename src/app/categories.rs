use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::category::{Category, Tag};
use crate::infra::db::Db;

#[derive(Clone)]
pub struct CategoryService {
    db: Db,
}

impl CategoryService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT c.id, c.name, c.description, c.parent_id, c.created_at, \
                    COUNT(p.id) FILTER (WHERE p.is_able) AS post_count \
             FROM categories c \
             LEFT JOIN posts p ON p.category_id = c.id \
             GROUP BY c.id \
             ORDER BY c.name",
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut categories = Vec::with_capacity(rows.len());
        for row in rows {
            categories.push(Category {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
                parent_id: row.get("parent_id"),
                post_count: row.get("post_count"),
                created_at: row.get("created_at"),
            });
        }

        Ok(categories)
    }

    pub async fn create_category(
        &self,
        name: String,
        description: String,
        parent_id: Option<Uuid>,
    ) -> Result<Category> {
        let row = sqlx::query(
            "INSERT INTO categories (name, description, parent_id) \
             VALUES ($1, $2, $3) \
             RETURNING id, name, description, parent_id, created_at",
        )
        .bind(name)
        .bind(description)
        .bind(parent_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(Category {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            parent_id: row.get("parent_id"),
            post_count: 0,
            created_at: row.get("created_at"),
        })
    }

    pub async fn update_category(
        &self,
        category_id: Uuid,
        name: Option<String>,
        description: Option<String>,
        parent_id: Option<Uuid>,
    ) -> Result<Option<Category>> {
        let row = sqlx::query(
            "UPDATE categories \
             SET name = COALESCE($2, name), \
                 description = COALESCE($3, description), \
                 parent_id = COALESCE($4, parent_id) \
             WHERE id = $1 \
             RETURNING id, name, description, parent_id, created_at",
        )
        .bind(category_id)
        .bind(name)
        .bind(description)
        .bind(parent_id)
        .fetch_optional(self.db.pool())
        .await?;

        let category = match row {
            Some(row) => {
                let post_count: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM posts WHERE category_id = $1 AND is_able",
                )
                .bind(category_id)
                .fetch_one(self.db.pool())
                .await?;
                Some(Category {
                    id: row.get("id"),
                    name: row.get("name"),
                    description: row.get("description"),
                    parent_id: row.get("parent_id"),
                    post_count,
                    created_at: row.get("created_at"),
                })
            }
            None => None,
        };

        Ok(category)
    }

    /// Hard delete; posts filed under the category fall back to NULL via
    /// the foreign key.
    pub async fn delete_category(&self, category_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, name FROM tags ORDER BY name")
            .fetch_all(self.db.pool())
            .await?;

        let mut tags = Vec::with_capacity(rows.len());
        for row in rows {
            tags.push(Tag {
                id: row.get("id"),
                name: row.get("name"),
            });
        }

        Ok(tags)
    }

    /// Idempotent by name: creating an existing tag returns the existing row.
    pub async fn create_tag(&self, name: String) -> Result<Tag> {
        let row = sqlx::query(
            "INSERT INTO tags (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id, name",
        )
        .bind(name)
        .fetch_one(self.db.pool())
        .await?;

        Ok(Tag {
            id: row.get("id"),
            name: row.get("name"),
        })
    }
}
