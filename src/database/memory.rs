use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::RecordStore;
use crate::errors::Result;
use crate::models::{GeneratedImage, GenerationJob, JobStatus, TrainingRequest, UsageCounter, UserPlan};

/// In-process [`RecordStore`] for local runs without a database, and for tests.
#[derive(Default)]
pub struct MemoryStore {
    plans: RwLock<HashMap<Uuid, UserPlan>>,
    training_requests: RwLock<HashMap<String, TrainingRequest>>,
    generation_jobs: RwLock<HashMap<String, GenerationJob>>,
    results: RwLock<Vec<GeneratedImage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stands in for the job service writing into `results` during ingestion.
    pub async fn insert_result(&self, image: GeneratedImage) {
        self.results.write().await.push(image);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_plan(&self, user_id: Uuid) -> Result<Option<UserPlan>> {
        Ok(self.plans.read().await.get(&user_id).cloned())
    }

    async fn upsert_plan(&self, plan: &UserPlan) -> Result<UserPlan> {
        let mut plans = self.plans.write().await;
        let mut stored = plan.clone();
        if let Some(existing) = plans.get(&plan.user_id) {
            stored.id = existing.id;
            stored.created_at = existing.created_at;
            stored.is_admin = existing.is_admin;
        }
        plans.insert(plan.user_id, stored.clone());
        Ok(stored)
    }

    async fn list_plans(&self) -> Result<Vec<UserPlan>> {
        let mut plans: Vec<UserPlan> = self.plans.read().await.values().cloned().collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(plans)
    }

    async fn set_admin(&self, user_id: Uuid, is_admin: bool) -> Result<bool> {
        match self.plans.write().await.get_mut(&user_id) {
            Some(plan) => {
                plan.is_admin = is_admin;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reserve_usage(&self, user_id: Uuid, counter: UsageCounter) -> Result<Option<UserPlan>> {
        let mut plans = self.plans.write().await;
        let Some(plan) = plans.get_mut(&user_id) else {
            return Ok(None);
        };

        let is_admin = plan.is_admin;
        let (used, limit) = match counter {
            UsageCounter::FaceTraining => (&mut plan.face_training_used, plan.face_training_limit),
            UsageCounter::ImagesGenerated => (&mut plan.images_generated, plan.image_limit),
        };
        if !is_admin && *used >= limit {
            return Ok(None);
        }
        *used += 1;
        Ok(Some(plan.clone()))
    }

    async fn release_usage(&self, user_id: Uuid, counter: UsageCounter) -> Result<()> {
        if let Some(plan) = self.plans.write().await.get_mut(&user_id) {
            let used = match counter {
                UsageCounter::FaceTraining => &mut plan.face_training_used,
                UsageCounter::ImagesGenerated => &mut plan.images_generated,
            };
            *used = (*used - 1).max(0);
        }
        Ok(())
    }

    async fn upsert_training_request(&self, request: &TrainingRequest) -> Result<()> {
        let mut requests = self.training_requests.write().await;
        match requests.get_mut(&request.request_id) {
            Some(existing) => {
                existing.status = request.status.clone();
                existing.completion_percentage = request.completion_percentage;
            }
            None => {
                requests.insert(request.request_id.clone(), request.clone());
            }
        }
        Ok(())
    }

    async fn find_training_request(&self, request_id: &str) -> Result<Option<TrainingRequest>> {
        Ok(self.training_requests.read().await.get(request_id).cloned())
    }

    async fn insert_generation_job(&self, job: &GenerationJob) -> Result<()> {
        self.generation_jobs
            .write()
            .await
            .entry(job.request_id.clone())
            .or_insert_with(|| job.clone());
        Ok(())
    }

    async fn find_generation_job(&self, request_id: &str) -> Result<Option<GenerationJob>> {
        Ok(self.generation_jobs.read().await.get(request_id).cloned())
    }

    async fn list_training_requests(
        &self,
        user_id: Uuid,
        status: Option<&JobStatus>,
    ) -> Result<Vec<TrainingRequest>> {
        let mut requests: Vec<TrainingRequest> = self
            .training_requests
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .filter(|r| status.map_or(true, |s| r.status.db_value() == s.db_value()))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn update_job_progress(
        &self,
        request_id: &str,
        status: &JobStatus,
        completion_percentage: u8,
    ) -> Result<()> {
        if let Some(request) = self.training_requests.write().await.get_mut(request_id) {
            request.status = status.clone();
            request.completion_percentage = completion_percentage;
        }
        Ok(())
    }

    async fn results_for_request(&self, request_id: &str) -> Result<Vec<GeneratedImage>> {
        Ok(self
            .results
            .read()
            .await
            .iter()
            .filter(|image| image.request_id == request_id)
            .cloned()
            .collect())
    }

    async fn results_for_user(&self, user_id: Uuid) -> Result<Vec<GeneratedImage>> {
        let mut images: Vec<GeneratedImage> = self
            .results
            .read()
            .await
            .iter()
            .filter(|image| image.user_id == Some(user_id))
            .cloned()
            .collect();
        images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(images)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
