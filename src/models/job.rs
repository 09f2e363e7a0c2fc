use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Training,
    Generation,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Training => "training",
            JobKind::Generation => "generation",
        }
    }
}

/// Remote job status. The job service is inconsistent about casing, so parsing
/// is case-insensitive and anything unrecognised is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Other(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Other(trimmed.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Upper-case form kept in `training_requests.status`.
    pub fn db_value(&self) -> String {
        match self {
            JobStatus::Other(raw) => raw.to_ascii_uppercase(),
            known => known.as_str().to_ascii_uppercase(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Other(raw) => raw,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        JobStatus::parse(&raw)
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Uniform view of a `GET /status/{id}` response, produced once at the client boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// `None` when the service answered with a bare message.
    pub status: Option<JobStatus>,
    pub completion_percentage: Option<u8>,
    pub message: Option<String>,
}

impl StatusReport {
    /// Absent status counts as pending.
    pub fn effective_status(&self) -> JobStatus {
        self.status.clone().unwrap_or(JobStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Gender {
    Male,
    Female,
}

impl FromStr for Gender {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "" => Err(AppError::Validation("Gender is required".to_string())),
            other => Err(AppError::Validation(format!("Unknown gender: {}", other))),
        }
    }
}

/// A face archive as received from the browser.
#[derive(Debug, Clone)]
pub struct TrainingUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
    pub trigger_phrase: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The completed training job whose model renders the thumbnail.
    pub source_request_id: String,
    pub prompt: String,
    pub gender: Gender,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerationForm {
    pub request_id: String,
    pub prompt: String,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrainingRequest {
    pub request_id: String,
    pub user_id: Uuid,
    pub trigger_phrase: String,
    #[schema(value_type = String)]
    pub status: JobStatus,
    pub completion_percentage: u8,
    pub created_at: DateTime<Utc>,
}

impl TrainingRequest {
    pub fn pending(request_id: String, user_id: Uuid, trigger_phrase: String) -> Self {
        Self {
            request_id,
            user_id,
            trigger_phrase,
            status: JobStatus::Pending,
            completion_percentage: 0,
            created_at: Utc::now(),
        }
    }
}

/// Owner record of a submitted generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub request_id: String,
    pub user_id: Uuid,
    pub source_request_id: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(request_id: String, user_id: Uuid, request: &GenerationRequest) -> Self {
        Self {
            request_id,
            user_id,
            source_request_id: request.source_request_id.trim().to_string(),
            prompt: request.prompt.trim().to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrainingRequestQuery {
    pub status: Option<String>,
}
