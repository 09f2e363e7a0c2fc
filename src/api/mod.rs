//! Typed access to the remote face-training / thumbnail-generation service.

use async_trait::async_trait;

use crate::{
    errors::{AppError, Result},
    models::{GenerationRequest, StatusReport, TrainingUpload},
};

pub mod client;
pub mod status;

pub use client::JobApiClient;
pub use status::normalize_status_body;

const ZIP_SIGNATURES: [&[u8]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];
const ZIP_MIME_TYPES: [&str; 3] = [
    "application/zip",
    "application/x-zip-compressed",
    "application/x-zip",
];

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobApi: Send + Sync {
    /// `POST /train`; returns the request id assigned by the service.
    async fn submit_training(&self, upload: &TrainingUpload, user_email: &str) -> Result<String>;

    /// `POST /generate_image`; returns the request id of the generation job.
    async fn submit_generation(&self, request: &GenerationRequest, user_email: &str) -> Result<String>;

    /// `GET /status/{request_id}`, normalized.
    async fn get_status(&self, request_id: &str) -> Result<StatusReport>;

    /// `GET /insert_generated_images/{request_id}`. Safe to repeat.
    async fn ingest_completed_results(&self, request_id: &str) -> Result<()>;
}

pub fn validate_training(upload: &TrainingUpload) -> Result<()> {
    if upload.data.is_empty() {
        return Err(AppError::Validation(
            "Please provide both a ZIP file and a trigger phrase".to_string(),
        ));
    }

    if upload.trigger_phrase.trim().is_empty() {
        return Err(AppError::Validation(
            "Please provide both a ZIP file and a trigger phrase".to_string(),
        ));
    }

    let declared = upload
        .content_type
        .as_deref()
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .or_else(|| mime_guess::from_path(&upload.file_name).first());

    if let Some(declared) = declared {
        let essence = declared.essence_str();
        if essence != mime::APPLICATION_OCTET_STREAM.essence_str()
            && !ZIP_MIME_TYPES.contains(&essence)
        {
            return Err(AppError::Validation("Please upload a ZIP file only".to_string()));
        }
    }

    if !ZIP_SIGNATURES.iter().any(|sig| upload.data.starts_with(sig)) {
        return Err(AppError::Validation("Please upload a ZIP file only".to_string()));
    }

    Ok(())
}

/// Request ids travel as a single URL path segment to the job service.
pub fn validate_request_id(request_id: &str) -> Result<()> {
    let valid = !request_id.is_empty()
        && request_id.len() <= 128
        && !request_id.chars().all(|c| c == '.')
        && !request_id
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control());

    if !valid {
        return Err(AppError::Validation(format!("Invalid request id: {:?}", request_id)));
    }
    Ok(())
}

pub fn validate_generation(request: &GenerationRequest) -> Result<()> {
    if request.source_request_id.trim().is_empty() {
        return Err(AppError::Validation(
            "A completed training request is required".to_string(),
        ));
    }
    validate_request_id(request.source_request_id.trim())?;
    if request.prompt.trim().is_empty() {
        return Err(AppError::Validation("Please fill in all fields".to_string()));
    }
    Ok(())
}
