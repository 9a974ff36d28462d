use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// A file attached to a post. The binary lives in object storage; the row
/// tracks the key and upload lifecycle (`pending` until the client confirms
/// its presigned PUT).
#[derive(Debug, Clone, Serialize)]
pub struct PostAttachment {
    pub id: Uuid,
    pub post_id: Uuid,
    #[serde(skip_serializing)]
    pub object_key: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: i64,
    pub status: String,
    /// Presigned GET URL, populated at response time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub uploaded_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
