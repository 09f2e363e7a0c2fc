use std::sync::Arc;

use crate::{
    api::{validate_generation, validate_training, JobApi},
    database::RecordStore,
    errors::{AppError, Result},
    models::{
        GenerationJob, GenerationRequest, JobKind, JobStatus, Session, TrainingRequest, TrainingUpload,
    },
    services::{metrics::MetricsService, quota_gate::QuotaGate},
};

/// Validates, gates on quota, submits to the job service and keeps records.
#[derive(Clone)]
pub struct JobSubmitter {
    api: Arc<dyn JobApi>,
    quota: QuotaGate,
    store: Arc<dyn RecordStore>,
    metrics: Option<Arc<MetricsService>>,
}

impl JobSubmitter {
    pub fn new(api: Arc<dyn JobApi>, quota: QuotaGate, store: Arc<dyn RecordStore>) -> Self {
        Self {
            api,
            quota,
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsService>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn submit_training(&self, session: &Session, upload: TrainingUpload) -> Result<String> {
        validate_training(&upload)?;
        self.reserve(session, JobKind::Training).await?;

        let request_id = match self.api.submit_training(&upload, &session.email).await {
            Ok(request_id) => request_id,
            Err(e) => return Err(self.refund(session, JobKind::Training, e).await),
        };

        let record = TrainingRequest::pending(
            request_id.clone(),
            session.user_id,
            upload.trigger_phrase.trim().to_string(),
        );
        if let Err(e) = self.store.upsert_training_request(&record).await {
            tracing::error!(request_id = %request_id, error = %e, "Failed to record training request");
        }

        self.accepted(session, JobKind::Training, &request_id);
        Ok(request_id)
    }

    pub async fn submit_generation(&self, session: &Session, request: GenerationRequest) -> Result<String> {
        validate_generation(&request)?;

        if let Some(source) = self.store.find_training_request(request.source_request_id.trim()).await? {
            if source.user_id != session.user_id {
                return Err(AppError::NotFound);
            }
            if source.status != JobStatus::Completed {
                return Err(AppError::Validation(
                    "The selected face training has not completed yet".to_string(),
                ));
            }
        }

        self.reserve(session, JobKind::Generation).await?;

        let request_id = match self.api.submit_generation(&request, &session.email).await {
            Ok(request_id) => request_id,
            Err(e) => return Err(self.refund(session, JobKind::Generation, e).await),
        };

        let record = GenerationJob::new(request_id.clone(), session.user_id, &request);
        if let Err(e) = self.store.insert_generation_job(&record).await {
            tracing::error!(request_id = %request_id, error = %e, "Failed to record generation request");
        }

        self.accepted(session, JobKind::Generation, &request_id);
        Ok(request_id)
    }

    async fn reserve(&self, session: &Session, kind: JobKind) -> Result<()> {
        let reserved = self.quota.reserve(session.user_id, kind).await;

        if let Err(AppError::QuotaExceeded(_)) = &reserved {
            if let Some(metrics) = &self.metrics {
                metrics.record_quota_rejection(kind);
            }
        }
        reserved.map(|_| ())
    }

    /// Gives the reserved unit back and hands `error` on to the caller.
    async fn refund(&self, session: &Session, kind: JobKind, error: AppError) -> AppError {
        if let Err(e) = self.quota.release(session.user_id, kind).await {
            tracing::error!(
                user_id = %session.user_id,
                kind = kind.as_str(),
                error = %e,
                "Failed to refund quota"
            );
        }
        error
    }

    fn accepted(&self, session: &Session, kind: JobKind, request_id: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_submission(kind);
        }
        tracing::info!(
            request_id = %request_id,
            user_id = %session.user_id,
            kind = kind.as_str(),
            "Job submitted"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockJobApi;
    use crate::database::MemoryStore;
    use crate::models::{Gender, PlanType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            user_id: Uuid::new_v4(),
            email: "creator@example.com".to_string(),
            display_name: None,
        }
    }

    fn zip_upload() -> TrainingUpload {
        TrainingUpload {
            file_name: "faces.zip".into(),
            content_type: Some("application/zip".into()),
            data: b"PK\x03\x04archive".to_vec(),
            trigger_phrase: "  mystyle ".into(),
        }
    }

    fn submitter(api: MockJobApi, store: Arc<MemoryStore>) -> JobSubmitter {
        JobSubmitter::new(Arc::new(api), QuotaGate::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_training_submission_records_and_debits() {
        let store = Arc::new(MemoryStore::new());
        let session = session();
        QuotaGate::new(store.clone())
            .subscribe(session.user_id, PlanType::Creator)
            .await
            .unwrap();

        let mut api = MockJobApi::new();
        api.expect_submit_training()
            .times(1)
            .returning(|_, _| Ok("train-1".to_string()));

        let id = submitter(api, store.clone())
            .submit_training(&session, zip_upload())
            .await
            .unwrap();
        assert_eq!(id, "train-1");

        let record = store.find_training_request("train-1").await.unwrap().unwrap();
        assert_eq!(record.trigger_phrase, "mystyle");
        assert_eq!(record.status, JobStatus::Pending);

        let plan = store.find_plan(session.user_id).await.unwrap().unwrap();
        assert_eq!(plan.face_training_used, 1);
    }

    #[tokio::test]
    async fn test_quota_exhausted_never_calls_service() {
        let store = Arc::new(MemoryStore::new());
        let session = session();
        let gate = QuotaGate::new(store.clone());
        gate.subscribe(session.user_id, PlanType::Starter).await.unwrap();
        gate.reserve(session.user_id, JobKind::Training).await.unwrap();

        let mut api = MockJobApi::new();
        api.expect_submit_training().never();

        let err = submitter(api, store)
            .submit_training(&session, zip_upload())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded(ref msg) if msg.contains("face training limit")));
    }

    #[tokio::test]
    async fn test_generation_records_owner() {
        let store = Arc::new(MemoryStore::new());
        let session = session();
        QuotaGate::new(store.clone())
            .subscribe(session.user_id, PlanType::Creator)
            .await
            .unwrap();

        let mut api = MockJobApi::new();
        api.expect_submit_generation()
            .times(1)
            .returning(|_, _| Ok("gen-4".to_string()));

        let request = GenerationRequest {
            source_request_id: "train-1".into(),
            prompt: " wide grin ".into(),
            gender: Gender::Male,
        };
        submitter(api, store.clone())
            .submit_generation(&session, request)
            .await
            .unwrap();

        let record = store.find_generation_job("gen-4").await.unwrap().unwrap();
        assert_eq!(record.user_id, session.user_id);
        assert_eq!(record.prompt, "wide grin");
        assert_eq!(store.find_plan(session.user_id).await.unwrap().unwrap().images_generated, 1);
    }

    /// Takes a while to accept each job, so two submissions overlap.
    struct SlowJobApi {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl JobApi for SlowJobApi {
        async fn submit_training(&self, _upload: &TrainingUpload, _email: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(format!("train-{}", n))
        }

        async fn submit_generation(&self, _request: &GenerationRequest, _email: &str) -> Result<String> {
            Err(AppError::remote(Some(500), "not used"))
        }

        async fn get_status(&self, _request_id: &str) -> Result<crate::models::StatusReport> {
            Err(AppError::remote(Some(500), "not used"))
        }

        async fn ingest_completed_results(&self, _request_id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrent_submissions_cannot_overdraw() {
        let store = Arc::new(MemoryStore::new());
        let session = session();
        QuotaGate::new(store.clone())
            .subscribe(session.user_id, PlanType::Starter)
            .await
            .unwrap();

        let api = Arc::new(SlowJobApi {
            calls: AtomicUsize::new(0),
        });
        let submitter = JobSubmitter::new(api.clone(), QuotaGate::new(store.clone()), store.clone());

        let (a, b) = tokio::join!(
            submitter.submit_training(&session, zip_upload()),
            submitter.submit_training(&session, zip_upload())
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert!(matches!(a.err().or(b.err()), Some(AppError::QuotaExceeded(_))));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        let plan = store.find_plan(session.user_id).await.unwrap().unwrap();
        assert_eq!(plan.face_training_used, 1);
        assert_eq!(plan.face_training_limit, 1);
    }

    #[tokio::test]
    async fn test_remote_failure_does_not_debit() {
        let store = Arc::new(MemoryStore::new());
        let session = session();
        QuotaGate::new(store.clone())
            .subscribe(session.user_id, PlanType::Pro)
            .await
            .unwrap();

        let mut api = MockJobApi::new();
        api.expect_submit_generation()
            .times(1)
            .returning(|_, _| Err(AppError::remote(Some(500), "GPU queue full")));

        let request = GenerationRequest {
            source_request_id: "train-1".into(),
            prompt: "surprised face, neon".into(),
            gender: Gender::Female,
        };
        assert!(submitter(api, store.clone())
            .submit_generation(&session, request)
            .await
            .is_err());

        let plan = store.find_plan(session.user_id).await.unwrap().unwrap();
        assert_eq!(plan.images_generated, 0);
    }

    #[tokio::test]
    async fn test_generation_requires_completed_training() {
        let store = Arc::new(MemoryStore::new());
        let session = session();
        QuotaGate::new(store.clone())
            .subscribe(session.user_id, PlanType::Pro)
            .await
            .unwrap();
        store
            .upsert_training_request(&TrainingRequest::pending("train-2".into(), session.user_id, "me".into()))
            .await
            .unwrap();

        let mut api = MockJobApi::new();
        api.expect_submit_generation().never();

        let request = GenerationRequest {
            source_request_id: "train-2".into(),
            prompt: "shocked".into(),
            gender: Gender::Male,
        };
        assert!(matches!(
            submitter(api, store).submit_generation(&session, request).await,
            Err(AppError::Validation(_))
        ));
    }
}
