use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A thumbnail materialized into `results` by ingestion of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeneratedImage {
    pub id: Uuid,
    pub request_id: String,
    pub user_id: Option<Uuid>,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}
