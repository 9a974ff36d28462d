use anyhow::{anyhow, Result};
use aws_sdk_s3::presigning::PresigningConfig;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::domain::attachment::PostAttachment;
use crate::infra::{db::Db, storage::ObjectStorage};

#[derive(Clone)]
pub struct AttachmentService {
    db: Db,
    storage: ObjectStorage,
    s3_public_endpoint: Option<String>,
}

/// Everything the client needs to PUT the file bytes directly to object
/// storage.
#[derive(Debug, Serialize)]
pub struct UploadIntent {
    pub attachment_id: Uuid,
    pub object_key: String,
    pub upload_url: String,
    pub expires_in_seconds: u64,
    pub headers: Vec<UploadHeader>,
}

#[derive(Debug, Serialize)]
pub struct UploadHeader {
    pub name: String,
    pub value: String,
}

impl AttachmentService {
    pub fn new(db: Db, storage: ObjectStorage, s3_public_endpoint: Option<String>) -> Self {
        Self {
            db,
            storage,
            s3_public_endpoint,
        }
    }

    pub async fn create_upload(
        &self,
        post_id: Uuid,
        file_name: String,
        content_type: String,
        bytes: i64,
        expires_in_seconds: u64,
    ) -> Result<UploadIntent> {
        let attachment_id = Uuid::new_v4();
        let object_key = format!("post_attachments/{}/{}/{}", post_id, attachment_id, file_name);

        sqlx::query(
            "INSERT INTO post_attachments (id, post_id, object_key, file_name, content_type, bytes) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(attachment_id)
        .bind(post_id)
        .bind(&object_key)
        .bind(&file_name)
        .bind(&content_type)
        .bind(bytes)
        .execute(self.db.pool())
        .await?;

        let presign_config = PresigningConfig::expires_in(Duration::from_secs(expires_in_seconds))?;
        let presigned = self
            .storage
            .client()
            .put_object()
            .bucket(self.storage.bucket())
            .key(&object_key)
            .content_type(content_type)
            .content_length(bytes)
            .presigned(presign_config)
            .await?;

        let headers = presigned
            .headers()
            .map(|(name, value)| UploadHeader {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect();

        let mut upload_url = presigned.uri().to_string();
        if let Some(ref public_endpoint) = self.s3_public_endpoint {
            match rewrite_presigned_url(&upload_url, public_endpoint) {
                Ok(rewritten) => upload_url = rewritten,
                Err(err) => tracing::warn!(error = ?err, "failed to rewrite presigned upload URL"),
            }
        }

        Ok(UploadIntent {
            attachment_id,
            object_key,
            upload_url,
            expires_in_seconds,
            headers,
        })
    }

    /// Client confirmation that the presigned PUT finished. Pending rows
    /// never show up in listings.
    pub async fn complete_upload(&self, attachment_id: Uuid, post_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE post_attachments \
             SET status = 'uploaded', uploaded_at = now() \
             WHERE id = $1 AND post_id = $2 AND status = 'pending'",
        )
        .bind(attachment_id)
        .bind(post_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_by_post(
        &self,
        post_id: Uuid,
        download_ttl_seconds: u64,
    ) -> Result<Vec<PostAttachment>> {
        let rows = sqlx::query(
            "SELECT id, post_id, object_key, file_name, content_type, bytes, status, \
                    uploaded_at, created_at \
             FROM post_attachments \
             WHERE post_id = $1 AND status = 'uploaded' \
             ORDER BY created_at",
        )
        .bind(post_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut attachments = Vec::with_capacity(rows.len());
        for row in rows {
            let mut attachment = attachment_from_row(&row);
            attachment.download_url = self
                .presigned_get_url(&attachment.object_key, download_ttl_seconds)
                .await;
            attachments.push(attachment);
        }

        Ok(attachments)
    }

    pub async fn delete_attachment(&self, attachment_id: Uuid, post_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            "DELETE FROM post_attachments WHERE id = $1 AND post_id = $2 RETURNING object_key",
        )
        .bind(attachment_id)
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?;

        let object_key: String = match row {
            Some(row) => row.get("object_key"),
            None => return Ok(false),
        };

        self.storage
            .client()
            .delete_object()
            .bucket(self.storage.bucket())
            .key(object_key)
            .send()
            .await?;

        Ok(true)
    }

    async fn presigned_get_url(&self, object_key: &str, expires_in_seconds: u64) -> Option<String> {
        let presign_config =
            PresigningConfig::expires_in(Duration::from_secs(expires_in_seconds)).ok()?;

        let presigned = self
            .storage
            .client()
            .get_object()
            .bucket(self.storage.bucket())
            .key(object_key)
            .presigned(presign_config)
            .await
            .ok()?;

        let mut url = presigned.uri().to_string();
        if let Some(ref public_endpoint) = self.s3_public_endpoint {
            if let Ok(rewritten) = rewrite_presigned_url(&url, public_endpoint) {
                url = rewritten;
            }
        }

        Some(url)
    }
}

fn attachment_from_row(row: &PgRow) -> PostAttachment {
    PostAttachment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        object_key: row.get("object_key"),
        file_name: row.get("file_name"),
        content_type: row.get("content_type"),
        bytes: row.get("bytes"),
        status: row.get("status"),
        download_url: None,
        uploaded_at: row.get("uploaded_at"),
        created_at: row.get("created_at"),
    }
}

fn rewrite_presigned_url(original: &str, public_endpoint: &str) -> Result<String> {
    let mut original_url = Url::parse(original)?;
    let public_url = if public_endpoint.contains("://") {
        Url::parse(public_endpoint)?
    } else {
        Url::parse(&format!("http://{}", public_endpoint))?
    };

    original_url
        .set_scheme(public_url.scheme())
        .map_err(|_| anyhow!("invalid scheme for public endpoint"))?;
    original_url
        .set_host(public_url.host_str())
        .map_err(|_| anyhow!("invalid host for public endpoint"))?;
    original_url.set_port(public_url.port()).ok();

    Ok(original_url.to_string())
}
