//! Status polling for remote jobs.
//!
//! A [`PollHandle`] is bound to exactly one job. It owns a cancellable
//! interval task (or none, for manual-only observation), publishes
//! [`PollEvent`]s on a broadcast channel and the latest [`JobSnapshot`] on a
//! watch channel. Interval ticks and manual refreshes run the same tick
//! logic, serialized per job, so a completed job is ingested once per
//! transition into `completed`. Dropping the handle cancels its timer.

use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use utoipa::ToSchema;

use crate::{
    api::JobApi,
    config::Config,
    database::RecordStore,
    errors::{AppError, Result},
    models::{GeneratedImage, JobKind, JobStatus, StatusReport},
    services::{artifacts::ArtifactFetcher, metrics::MetricsService},
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub retry_backoff: Duration,
    pub max_retries: u32,
    /// Pause between ingestion and loading artifacts.
    pub settle_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(2),
            max_retries: 3,
            settle_delay: Duration::from_secs(1),
        }
    }
}

impl PollConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            retry_backoff: Duration::from_secs(config.poll_retry_backoff_secs),
            max_retries: config.poll_max_retries.max(1),
            settle_delay: Duration::from_millis(config.poll_settle_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PollPhase {
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
    /// The current poll chain gave up; the job itself may still be running.
    Error,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobSnapshot {
    pub request_id: Option<String>,
    pub kind: JobKind,
    pub phase: PollPhase,
    #[schema(value_type = Option<String>)]
    pub status: Option<JobStatus>,
    pub completion_percentage: u8,
    pub message: Option<String>,
    pub retries: u32,
    pub error: Option<String>,
    pub images: Vec<GeneratedImage>,
}

impl JobSnapshot {
    fn new(kind: JobKind, request_id: Option<String>, phase: PollPhase) -> Self {
        Self {
            request_id,
            kind,
            phase,
            status: None,
            completion_percentage: 0,
            message: None,
            retries: 0,
            error: None,
            images: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollEvent {
    Phase {
        phase: PollPhase,
    },
    Progress {
        status: JobStatus,
        completion_percentage: u8,
        message: Option<String>,
    },
    Retrying {
        attempt: u32,
        error: String,
    },
    Completed {
        images: Vec<GeneratedImage>,
    },
    Failed {
        message: String,
    },
    Errored {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed,
    Errored,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestState {
    NotAttempted,
    Succeeded,
    Failed,
}

struct TickState {
    retries: u32,
    ingest: IngestState,
}

enum Tick {
    Continue,
    Retry,
    Done(PollOutcome),
}

/// Factory for [`PollHandle`]s sharing one job API, record store and config.
#[derive(Clone)]
pub struct JobPoller {
    api: Arc<dyn JobApi>,
    artifacts: ArtifactFetcher,
    progress: Option<Arc<dyn RecordStore>>,
    metrics: Option<Arc<MetricsService>>,
    config: PollConfig,
}

impl JobPoller {
    pub fn new(api: Arc<dyn JobApi>, artifacts: ArtifactFetcher, config: PollConfig) -> Self {
        Self {
            api,
            artifacts,
            progress: None,
            metrics: None,
            config,
        }
    }

    /// Write each observed status back to `training_requests`.
    pub fn with_progress_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.progress = Some(store);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsService>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// A handle awaiting [`PollHandle::submit`].
    pub fn prepare(&self, kind: JobKind) -> PollHandle {
        PollHandle::new(self.clone(), kind, None, PollPhase::Idle)
    }

    /// Interval polling of an already submitted job.
    pub fn watch(&self, kind: JobKind, request_id: String) -> PollHandle {
        let handle = PollHandle::new(self.clone(), kind, Some(request_id), PollPhase::Polling);
        handle.spawn_interval();
        handle
    }

    /// Manual-refresh-only observation; no timer is started.
    pub fn attach(&self, kind: JobKind, request_id: String) -> PollHandle {
        PollHandle::new(self.clone(), kind, Some(request_id), PollPhase::Polling)
    }

    fn record_poll(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_poll(outcome);
        }
    }

    fn record_ingestion(&self, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_ingestion(success);
        }
    }
}

struct TrackedJob {
    poller: JobPoller,
    kind: JobKind,
    request_id: OnceLock<String>,
    state: Mutex<TickState>,
    snapshot: watch::Sender<JobSnapshot>,
    events: broadcast::Sender<PollEvent>,
}

impl TrackedJob {
    fn update(&self, f: impl FnOnce(&mut JobSnapshot)) {
        self.snapshot.send_modify(f);
    }

    fn emit(&self, event: PollEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn phase(&self) -> PollPhase {
        self.snapshot.borrow().phase
    }

    fn set_phase(&self, phase: PollPhase) {
        if self.phase() != phase {
            self.update(|s| s.phase = phase);
            self.emit(PollEvent::Phase { phase });
        }
    }

    async fn reset_retries(&self) {
        self.state.lock().await.retries = 0;
        self.update(|s| {
            s.retries = 0;
            s.error = None;
        });
    }

    async fn tick(&self) -> Tick {
        let Some(request_id) = self.request_id.get() else {
            return Tick::Done(PollOutcome::Errored);
        };

        let mut state = self.state.lock().await;
        match self.poller.api.get_status(request_id).await {
            Ok(report) => {
                state.retries = 0;
                self.on_report(request_id, &mut state, report).await
            }
            Err(e) => {
                state.retries += 1;
                self.poller.record_poll("error");
                self.on_poll_error(request_id, state.retries, e)
            }
        }
    }

    fn on_poll_error(&self, request_id: &str, attempt: u32, error: AppError) -> Tick {
        let message = error.to_string();

        if error.is_retryable() && attempt < self.poller.config.max_retries {
            tracing::warn!(
                request_id = %request_id,
                attempt,
                error = %error,
                "Status check failed, retrying"
            );
            self.update(|s| s.retries = attempt);
            self.emit(PollEvent::Retrying {
                attempt,
                error: message,
            });
            return Tick::Retry;
        }

        tracing::error!(
            request_id = %request_id,
            attempt,
            error = %error,
            "Status check failed, giving up"
        );
        let surfaced = format!("Failed to check status: {}", message);
        self.update(|s| {
            s.retries = attempt;
            s.error = Some(surfaced.clone());
        });
        self.set_phase(PollPhase::Error);
        self.emit(PollEvent::Errored { message: surfaced });
        Tick::Done(PollOutcome::Errored)
    }

    async fn on_report(&self, request_id: &str, state: &mut TickState, report: StatusReport) -> Tick {
        let status = report.effective_status();

        match status {
            JobStatus::Completed => {
                self.poller.record_poll("completed");
                // Reported percentage is not trusted once terminal.
                self.observe(request_id, &status, 100, report.message).await;

                if state.ingest != IngestState::Succeeded {
                    match self.poller.api.ingest_completed_results(request_id).await {
                        Ok(()) => {
                            state.ingest = IngestState::Succeeded;
                            self.poller.record_ingestion(true);
                        }
                        Err(e) => {
                            tracing::warn!(
                                request_id = %request_id,
                                error = %e,
                                "Ingestion failed; a later refresh will retry it"
                            );
                            state.ingest = IngestState::Failed;
                            self.poller.record_ingestion(false);
                        }
                    }
                    tokio::time::sleep(self.poller.config.settle_delay).await;
                }

                let images = match self.poller.artifacts.load_for_job(request_id).await {
                    Ok(images) => images,
                    Err(e) => {
                        tracing::error!(request_id = %request_id, error = %e, "Failed to load results");
                        Vec::new()
                    }
                };

                tracing::info!(request_id = %request_id, images = images.len(), "Job completed");
                self.update(|s| {
                    s.images = images.clone();
                    s.error = None;
                });
                self.set_phase(PollPhase::Completed);
                self.emit(PollEvent::Completed { images });
                Tick::Done(PollOutcome::Completed)
            }
            JobStatus::Failed => {
                self.poller.record_poll("failed");
                let completion = self.snapshot.borrow().completion_percentage;
                let message = report
                    .message
                    .clone()
                    .unwrap_or_else(|| failure_message(self.kind).to_string());
                self.observe(request_id, &status, completion, report.message).await;

                tracing::warn!(request_id = %request_id, message = %message, "Job failed");
                self.update(|s| s.error = Some(message.clone()));
                self.set_phase(PollPhase::Failed);
                self.emit(PollEvent::Failed { message });
                Tick::Done(PollOutcome::Failed)
            }
            _ => {
                self.poller.record_poll("pending");
                let completion = report.completion_percentage.unwrap_or(0);
                self.observe(request_id, &status, completion, report.message).await;
                self.set_phase(PollPhase::Polling);
                Tick::Continue
            }
        }
    }

    async fn observe(&self, request_id: &str, status: &JobStatus, completion: u8, message: Option<String>) {
        tracing::debug!(
            request_id = %request_id,
            status = %status,
            completion,
            "Job status observed"
        );
        self.update(|s| {
            s.status = Some(status.clone());
            s.completion_percentage = completion;
            s.message = message.clone();
            s.retries = 0;
            s.error = None;
        });
        self.emit(PollEvent::Progress {
            status: status.clone(),
            completion_percentage: completion,
            message,
        });

        if let Some(store) = &self.poller.progress {
            if let Err(e) = store.update_job_progress(request_id, status, completion).await {
                tracing::warn!(request_id = %request_id, error = %e, "Failed to record job progress");
            }
        }
    }
}

fn failure_message(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Training => "Training failed. Please try again.",
        JobKind::Generation => "Image generation failed. Please try again.",
    }
}

async fn run_interval(job: Arc<TrackedJob>, cancel: CancellationToken) -> PollOutcome {
    let config = job.poller.config.clone();
    let mut delay = config.interval;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }

        // A manual refresh may have finished the job while we slept.
        match job.phase() {
            PollPhase::Completed => return PollOutcome::Completed,
            PollPhase::Failed => return PollOutcome::Failed,
            _ => {}
        }

        let tick = tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            tick = job.tick() => tick,
        };

        match tick {
            Tick::Continue => delay = config.interval,
            Tick::Retry => delay = config.retry_backoff,
            Tick::Done(outcome) => return outcome,
        }
    }
}

/// Observation of one job. Cancels its timer when dropped.
pub struct PollHandle {
    job: Arc<TrackedJob>,
    cancel: CancellationToken,
    task: StdMutex<Option<JoinHandle<PollOutcome>>>,
    _guard: DropGuard,
}

impl PollHandle {
    fn new(poller: JobPoller, kind: JobKind, request_id: Option<String>, phase: PollPhase) -> Self {
        let (snapshot, _) = watch::channel(JobSnapshot::new(kind, request_id.clone(), phase));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let id = OnceLock::new();
        if let Some(request_id) = request_id {
            let _ = id.set(request_id);
        }

        let cancel = CancellationToken::new();
        Self {
            job: Arc::new(TrackedJob {
                poller,
                kind,
                request_id: id,
                state: Mutex::new(TickState {
                    retries: 0,
                    ingest: IngestState::NotAttempted,
                }),
                snapshot,
                events,
            }),
            _guard: cancel.clone().drop_guard(),
            cancel,
            task: StdMutex::new(None),
        }
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<JoinHandle<PollOutcome>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_interval(&self) {
        let job = self.job.clone();
        let cancel = self.cancel.clone();
        *self.task_slot() = Some(tokio::spawn(run_interval(job, cancel)));
    }

    pub fn kind(&self) -> JobKind {
        self.job.kind
    }

    pub fn request_id(&self) -> Option<&str> {
        self.job.request_id.get().map(String::as_str)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.job.snapshot.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<JobSnapshot> {
        self.job.snapshot.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.job.events.subscribe()
    }

    /// Whether the interval task is still running.
    pub fn is_polling(&self) -> bool {
        self.task_slot()
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs `submission` and, once it yields a request id, starts interval polling.
    pub async fn submit<F>(&mut self, submission: F) -> Result<String>
    where
        F: Future<Output = Result<String>>,
    {
        if self.job.phase() != PollPhase::Idle {
            return Err(AppError::Validation("Job has already been submitted".to_string()));
        }

        self.job.set_phase(PollPhase::Submitting);
        match submission.await {
            Ok(request_id) => {
                let _ = self.job.request_id.set(request_id.clone());
                self.job.update(|s| {
                    s.request_id = Some(request_id.clone());
                    s.status = Some(JobStatus::Pending);
                    s.completion_percentage = 0;
                });
                self.job.set_phase(PollPhase::Polling);
                self.spawn_interval();
                Ok(request_id)
            }
            Err(e) => {
                let message = e.to_string();
                self.job.update(|s| s.error = Some(message.clone()));
                self.job.set_phase(PollPhase::Error);
                self.job.emit(PollEvent::Errored { message });
                Err(e)
            }
        }
    }

    /// One on-demand status check with a fresh retry budget.
    pub async fn refresh(&self) -> Result<JobSnapshot> {
        if self.job.request_id.get().is_none() {
            return Err(AppError::Validation("Job has not been submitted yet".to_string()));
        }

        self.job.reset_retries().await;
        loop {
            let tick = tokio::select! {
                _ = self.cancel.cancelled() => break,
                tick = self.job.tick() => tick,
            };

            match tick {
                Tick::Retry => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.job.poller.config.retry_backoff) => {}
                    }
                }
                Tick::Continue | Tick::Done(_) => break,
            }
        }

        let snapshot = self.snapshot();
        match (snapshot.phase, &snapshot.error) {
            (PollPhase::Error, Some(message)) => Err(AppError::remote(None, message.clone())),
            _ => Ok(snapshot),
        }
    }

    /// Restart interval polling after the previous chain stopped on errors.
    pub fn resume(&self) -> bool {
        if self.is_cancelled() || self.is_polling() || self.request_id().is_none() {
            return false;
        }
        if matches!(self.job.phase(), PollPhase::Completed | PollPhase::Failed) {
            return false;
        }
        self.spawn_interval();
        true
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the interval task. `None` if there is none or it panicked.
    pub async fn join(self) -> Option<PollOutcome> {
        let task = self.task_slot().take();
        match task {
            Some(task) => task.await.ok(),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockJobApi;
    use crate::database::MemoryStore;
    use crate::models::TrainingRequest;
    use chrono::Utc;
    use mockall::Sequence;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn report(status: &str, completion: Option<u8>) -> Result<StatusReport> {
        Ok(StatusReport {
            status: Some(JobStatus::parse(status)),
            completion_percentage: completion,
            message: None,
        })
    }

    fn unavailable() -> Result<StatusReport> {
        Err(AppError::remote(Some(503), "Service unavailable"))
    }

    fn poller(api: MockJobApi, store: Arc<MemoryStore>) -> JobPoller {
        JobPoller::new(Arc::new(api), ArtifactFetcher::new(store.clone()), PollConfig::default())
            .with_progress_store(store)
    }

    fn result_for(request_id: &str) -> GeneratedImage {
        GeneratedImage {
            id: Uuid::new_v4(),
            request_id: request_id.to_string(),
            user_id: None,
            image_url: "https://cdn.example.com/thumb.png".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_after_pending_and_ingests_once() {
        let store = Arc::new(MemoryStore::new());
        store.insert_result(result_for("job-1")).await;

        let mut api = MockJobApi::new();
        let mut seq = Sequence::new();
        api.expect_get_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| report("processing", Some(35)));
        api.expect_get_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| report("COMPLETED", Some(40)));
        api.expect_ingest_completed_results()
            .times(1)
            .returning(|_| Ok(()));

        let handle = poller(api, store).watch(JobKind::Generation, "job-1".to_string());
        let mut events = handle.subscribe();
        let snapshots = handle.watch_snapshot();

        assert_eq!(handle.join().await, Some(PollOutcome::Completed));

        let snapshot = snapshots.borrow().clone();
        assert_eq!(snapshot.phase, PollPhase::Completed);
        assert_eq!(snapshot.completion_percentage, 100);
        assert_eq!(snapshot.images.len(), 1);

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert!(matches!(last, Some(PollEvent::Completed { ref images }) if images.len() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_recorded_in_store() {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        store
            .upsert_training_request(&TrainingRequest::pending("train-1".into(), user_id, "mystyle".into()))
            .await
            .unwrap();

        let mut api = MockJobApi::new();
        api.expect_get_status()
            .times(1)
            .returning(|_| report("Completed", Some(12)));
        api.expect_ingest_completed_results()
            .times(1)
            .returning(|_| Ok(()));

        let handle = poller(api, store.clone()).watch(JobKind::Training, "train-1".to_string());
        assert_eq!(handle.join().await, Some(PollOutcome::Completed));

        let stored = store.find_training_request("train-1").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.completion_percentage, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_consecutive_failures_surface_error() {
        let mut api = MockJobApi::new();
        api.expect_get_status().times(3).returning(|_| unavailable());
        api.expect_ingest_completed_results().never();

        let handle = poller(api, Arc::new(MemoryStore::new())).watch(JobKind::Training, "job-2".into());
        let snapshots = handle.watch_snapshot();

        assert_eq!(handle.join().await, Some(PollOutcome::Errored));

        let snapshot = snapshots.borrow().clone();
        assert_eq!(snapshot.phase, PollPhase::Error);
        assert_eq!(snapshot.retries, 3);
        assert!(snapshot.error.unwrap().contains("Service unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_between_failures_clears_retry_counter() {
        let mut api = MockJobApi::new();
        let mut seq = Sequence::new();
        for step in 0..6 {
            let expectation = api.expect_get_status().times(1).in_sequence(&mut seq);
            match step {
                2 => expectation.returning(|_| report("pending", Some(50))),
                5 => expectation.returning(|_| report("completed", None)),
                _ => expectation.returning(|_| unavailable()),
            };
        }
        api.expect_ingest_completed_results()
            .times(1)
            .returning(|_| Ok(()));

        let handle = poller(api, Arc::new(MemoryStore::new())).watch(JobKind::Generation, "job-3".into());
        assert_eq!(handle.join().await, Some(PollOutcome::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_stops_without_ingestion() {
        let mut api = MockJobApi::new();
        api.expect_get_status().times(1).returning(|_| report("FAILED", None));
        api.expect_ingest_completed_results().never();

        let handle = poller(api, Arc::new(MemoryStore::new())).watch(JobKind::Training, "job-4".into());
        let snapshots = handle.watch_snapshot();

        assert_eq!(handle.join().await, Some(PollOutcome::Failed));
        let snapshot = snapshots.borrow().clone();
        assert_eq!(snapshot.phase, PollPhase::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("Training failed. Please try again."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_completed_refreshes_ingest_once() {
        let mut api = MockJobApi::new();
        let mut seq = Sequence::new();
        for status in ["COMPLETED", "completed", "Completed"] {
            api.expect_get_status()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| report(status, Some(10)));
        }
        api.expect_ingest_completed_results()
            .times(1)
            .returning(|_| Ok(()));

        let handle = poller(api, Arc::new(MemoryStore::new())).attach(JobKind::Generation, "job-5".into());
        for _ in 0..3 {
            let snapshot = handle.refresh().await.unwrap();
            assert_eq!(snapshot.phase, PollPhase::Completed);
            assert_eq!(snapshot.completion_percentage, 100);
        }
        assert!(!handle.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ingestion_is_retried_by_refresh() {
        let mut api = MockJobApi::new();
        api.expect_get_status()
            .times(2)
            .returning(|_| report("completed", None));
        let mut seq = Sequence::new();
        api.expect_ingest_completed_results()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(AppError::remote(Some(500), "ingest down")));
        api.expect_ingest_completed_results()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let handle = poller(api, Arc::new(MemoryStore::new())).attach(JobKind::Generation, "job-6".into());
        let first = handle.refresh().await.unwrap();
        assert_eq!(first.phase, PollPhase::Completed);
        handle.refresh().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut api = MockJobApi::new();
        api.expect_get_status().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            report("processing", Some(20))
        });

        let handle = poller(api, Arc::new(MemoryStore::new())).watch(JobKind::Training, "job-7".into());
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_after_error_resets_counter_and_resumes() {
        let mut api = MockJobApi::new();
        let mut seq = Sequence::new();
        api.expect_get_status()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_| unavailable());
        api.expect_get_status()
            .in_sequence(&mut seq)
            .returning(|_| report("processing", Some(55)));

        let handle = poller(api, Arc::new(MemoryStore::new())).watch(JobKind::Training, "job-8".into());
        // 5s interval, then two 2s backoffs.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.snapshot().phase, PollPhase::Error);
        assert!(!handle.is_polling());

        let snapshot = handle.refresh().await.unwrap();
        assert_eq!(snapshot.phase, PollPhase::Polling);
        assert_eq!(snapshot.completion_percentage, 55);
        assert_eq!(snapshot.retries, 0);

        assert!(handle.resume());
        assert!(handle.is_polling());
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_starts_polling() {
        let mut api = MockJobApi::new();
        api.expect_get_status().returning(|_| report("pending", None));

        let mut handle = poller(api, Arc::new(MemoryStore::new())).prepare(JobKind::Training);
        assert_eq!(handle.snapshot().phase, PollPhase::Idle);

        let request_id = handle.submit(async { Ok("job-9".to_string()) }).await.unwrap();
        assert_eq!(request_id, "job-9");
        assert_eq!(handle.request_id(), Some("job-9"));
        assert_eq!(handle.snapshot().phase, PollPhase::Polling);
        assert!(handle.is_polling());

        assert!(handle.submit(async { Ok("again".to_string()) }).await.is_err());
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission_never_polls() {
        let mut api = MockJobApi::new();
        api.expect_get_status().never();

        let mut handle = poller(api, Arc::new(MemoryStore::new())).prepare(JobKind::Generation);
        let err = handle
            .submit(async { Err(AppError::QuotaExceeded("limit reached".into())) })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::QuotaExceeded(_)));
        assert_eq!(handle.snapshot().phase, PollPhase::Error);
        assert!(!handle.is_polling());
        tokio::time::sleep(Duration::from_secs(30)).await;
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = Config {
            database_url: None,
            port: 0,
            job_api_url: "http://localhost:8000".into(),
            page_origin: "http://localhost:5173".into(),
            jwt_secret: "secret".into(),
            jwt_audience: "authenticated".into(),
            max_upload_size: 1024,
            job_api_timeout_secs: 5,
            poll_interval_secs: 0,
            poll_retry_backoff_secs: 0,
            poll_max_retries: 0,
            poll_settle_delay_ms: 0,
        };

        let poll = PollConfig::from_config(&config);
        assert_eq!(poll.interval, Duration::from_secs(1));
        assert_eq!(poll.max_retries, 1);
        assert_eq!(poll.retry_backoff, Duration::ZERO);
    }
}
