use async_trait::async_trait;
use reqwest::{header, multipart, Client, Response, Url};
use serde::Serialize;
use std::time::Duration;

use crate::{
    api::{
        status::{error_message, extract_request_id, normalize_status_body},
        validate_generation, validate_request_id, validate_training, JobApi,
    },
    config::Config,
    errors::{AppError, Result},
    models::{Gender, GenerationRequest, StatusReport, TrainingUpload},
};

#[derive(Debug, Serialize)]
struct GenerateImageBody<'a> {
    request_id: &'a str,
    prompt: &'a str,
    gender: Gender,
    email: &'a str,
}

/// reqwest-backed client for the job service. Stateless between calls.
#[derive(Clone)]
pub struct JobApiClient {
    client: Client,
    base_url: Url,
}

impl JobApiClient {
    pub fn new(base_url: &str, origin: &str, timeout: Duration) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ORIGIN,
            header::HeaderValue::from_str(origin)
                .map_err(|e| AppError::Config(format!("Invalid page origin {}: {}", origin, e)))?,
        );

        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| AppError::Config(format!("Invalid job API URL: {}", base_url)))?;

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.job_api_url, &config.page_origin, config.job_api_timeout())
    }

    /// Base URL plus `segments`, each percent-encoded as one path segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("Invalid job API URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Body text of a 2xx response, or `AppError::Remote` carrying the service's message.
    async fn read_body(response: Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AppError::remote(
                Some(status.as_u16()),
                error_message(status.as_u16(), &body),
            ));
        }

        Ok(body)
    }
}

#[async_trait]
impl JobApi for JobApiClient {
    async fn submit_training(&self, upload: &TrainingUpload, user_email: &str) -> Result<String> {
        validate_training(upload)?;

        let file = multipart::Part::bytes(upload.data.clone())
            .file_name(upload.file_name.clone())
            .mime_str("application/zip")?;

        let form = multipart::Form::new()
            .part("file", file)
            .text("trigger_phrase", upload.trigger_phrase.trim().to_string())
            .text("email", user_email.to_string());

        let response = self
            .client
            .post(self.url(&["train"])?)
            .multipart(form)
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        let request_id = extract_request_id(&body)?;

        tracing::info!(request_id = %request_id, "Training job submitted");
        Ok(request_id)
    }

    async fn submit_generation(&self, request: &GenerationRequest, user_email: &str) -> Result<String> {
        validate_generation(request)?;

        let body = GenerateImageBody {
            request_id: request.source_request_id.trim(),
            prompt: request.prompt.trim(),
            gender: request.gender,
            email: user_email,
        };

        let response = self
            .client
            .post(self.url(&["generate_image"])?)
            .json(&body)
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        let request_id = extract_request_id(&body)?;

        tracing::info!(
            request_id = %request_id,
            source_request_id = %request.source_request_id,
            "Generation job submitted"
        );
        Ok(request_id)
    }

    async fn get_status(&self, request_id: &str) -> Result<StatusReport> {
        validate_request_id(request_id)?;
        let response = self
            .client
            .get(self.url(&["status", request_id])?)
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        normalize_status_body(&body)
    }

    async fn ingest_completed_results(&self, request_id: &str) -> Result<()> {
        validate_request_id(request_id)?;
        let response = self
            .client
            .get(self.url(&["insert_generated_images", request_id])?)
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        // Body is informational only.
        Self::read_body(response).await?;
        tracing::debug!(request_id = %request_id, "Ingestion requested");
        Ok(())
    }
}
