use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::{stream, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    models::{
        GeneratedImage, GenerationForm, GenerationRequest, JobKind, JobStatus, Session, TrainingRequest,
        TrainingRequestQuery, TrainingUpload,
    },
    services::poller::{JobSnapshot, PollEvent, PollPhase},
};

/// Upload a face archive and start training
#[utoipa::path(
    post,
    path = "/api/v1/jobs/training",
    responses(
        (status = 201, description = "Training submitted", body = JobSnapshot),
        (status = 400, description = "Not a ZIP archive or missing trigger phrase"),
        (status = 402, description = "Face training limit reached")
    ),
    tag = "jobs"
)]
pub async fn create_training(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JobSnapshot>)> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut trigger_phrase = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid upload: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.zip").to_string();
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid upload: {}", e)))?;
                file = Some((file_name, content_type, data.to_vec()));
            }
            "trigger_phrase" => {
                trigger_phrase = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid upload: {}", e)))?;
            }
            _ => {}
        }
    }

    let (file_name, content_type, data) = file.ok_or_else(|| {
        AppError::Validation("Please provide both a ZIP file and a trigger phrase".to_string())
    })?;

    if data.len() > state.config.max_upload_size {
        return Err(AppError::Validation(format!(
            "File too large. Maximum size is {} bytes",
            state.config.max_upload_size
        )));
    }

    let upload = TrainingUpload {
        file_name,
        content_type,
        data,
        trigger_phrase,
    };

    let mut handle = state.registry.poller().prepare(JobKind::Training);
    handle
        .submit(state.submitter.submit_training(&session, upload))
        .await?;
    let handle = state.registry.track(session.user_id, handle).await?;

    Ok((StatusCode::CREATED, Json(handle.snapshot())))
}

/// Generate a thumbnail from a completed training
#[utoipa::path(
    post,
    path = "/api/v1/jobs/generation",
    request_body = GenerationForm,
    responses(
        (status = 201, description = "Generation submitted", body = JobSnapshot),
        (status = 402, description = "Image generation limit reached")
    ),
    tag = "jobs"
)]
pub async fn create_generation(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<GenerationForm>,
) -> Result<(StatusCode, Json<JobSnapshot>)> {
    let request = GenerationRequest {
        source_request_id: form.request_id,
        prompt: form.prompt,
        gender: form.gender.parse()?,
    };

    let mut handle = state.registry.poller().prepare(JobKind::Generation);
    handle
        .submit(state.submitter.submit_generation(&session, request))
        .await?;
    let handle = state.registry.track(session.user_id, handle).await?;

    Ok((StatusCode::CREATED, Json(handle.snapshot())))
}

/// Latest known state of a tracked job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    params(("id" = String, Path, description = "Request id")),
    responses(
        (status = 200, description = "Job snapshot", body = JobSnapshot),
        (status = 404, description = "Job is not tracked for this user")
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    session: Session,
    Path(request_id): Path<String>,
) -> Result<Json<JobSnapshot>> {
    let handle = state.registry.get(session.user_id, &request_id).await?;
    Ok(Json(handle.snapshot()))
}

/// Check status now
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/refresh",
    params(("id" = String, Path, description = "Request id")),
    responses(
        (status = 200, description = "Job snapshot after the check", body = JobSnapshot),
        (status = 502, description = "Job service kept failing")
    ),
    tag = "jobs"
)]
pub async fn refresh_job(
    State(state): State<AppState>,
    session: Session,
    Path(request_id): Path<String>,
) -> Result<Json<JobSnapshot>> {
    let snapshot = state.registry.refresh(session.user_id, &request_id).await?;
    Ok(Json(snapshot))
}

pub async fn stop_job(
    State(state): State<AppState>,
    session: Session,
    Path(request_id): Path<String>,
) -> Result<StatusCode> {
    state.registry.stop(session.user_id, &request_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Server-sent events: a `snapshot` first, then every poll event until the job ends.
pub async fn job_events(
    State(state): State<AppState>,
    session: Session,
    Path(request_id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let handle = state.registry.get(session.user_id, &request_id).await?;
    let receiver = handle.subscribe();
    let initial = handle.snapshot();
    let finished = matches!(initial.phase, PollPhase::Completed | PollPhase::Failed);

    let first = stream::once(async move { Event::default().event("snapshot").json_data(&initial) });
    let updates = stream::unfold((receiver, finished), |(mut receiver, finished)| async move {
        if finished {
            return None;
        }
        let event = next_event(&mut receiver).await?;
        let done = matches!(event, PollEvent::Completed { .. } | PollEvent::Failed { .. });
        Some((Event::default().event(event_name(&event)).json_data(&event), (receiver, done)))
    });

    Ok(Sse::new(first.chain(updates)).keep_alive(KeepAlive::default()))
}

async fn next_event(receiver: &mut broadcast::Receiver<PollEvent>) -> Option<PollEvent> {
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event stream lagged");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

fn event_name(event: &PollEvent) -> &'static str {
    match event {
        PollEvent::Phase { .. } => "phase",
        PollEvent::Progress { .. } => "progress",
        PollEvent::Retrying { .. } => "retrying",
        PollEvent::Completed { .. } => "completed",
        PollEvent::Failed { .. } => "failed",
        PollEvent::Errored { .. } => "errored",
    }
}

/// Thumbnails produced by one job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/images",
    params(("id" = String, Path, description = "Request id")),
    responses(
        (status = 200, description = "Generated images", body = [GeneratedImage]),
        (status = 404, description = "Not a job of this user")
    ),
    tag = "jobs"
)]
pub async fn job_images(
    State(state): State<AppState>,
    session: Session,
    Path(request_id): Path<String>,
) -> Result<Json<Vec<GeneratedImage>>> {
    if state.registry.get(session.user_id, &request_id).await.is_err() {
        state.registry.owned_kind(session.user_id, &request_id).await?;
    }

    let images = state.artifacts.load_for_job(&request_id).await?;
    Ok(Json(images))
}

/// The caller's face trainings, newest first
#[utoipa::path(
    get,
    path = "/api/v1/training-requests",
    params(("status" = Option<String>, Query, description = "Filter by status, e.g. completed")),
    responses((status = 200, description = "Training requests", body = [TrainingRequest])),
    tag = "jobs"
)]
pub async fn list_training_requests(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<TrainingRequestQuery>,
) -> Result<Json<Vec<TrainingRequest>>> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(JobStatus::parse);

    let requests = state
        .store
        .list_training_requests(session.user_id, status.as_ref())
        .await?;
    Ok(Json(requests))
}
