use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{GeneratedImage, GenerationJob, JobStatus, TrainingRequest, UsageCounter, UserPlan};

pub mod memory;
pub mod queries;

pub use memory::MemoryStore;
pub use queries::PgRecordStore;

/// The tables the service reads and writes: `user_plans`, `training_requests`,
/// `generation_requests`, `results`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_plan(&self, user_id: Uuid) -> Result<Option<UserPlan>>;

    /// Insert or replace the plan keyed by `user_id`. `is_admin` and `created_at`
    /// of an existing row survive.
    async fn upsert_plan(&self, plan: &UserPlan) -> Result<UserPlan>;

    /// All plans, newest first.
    async fn list_plans(&self) -> Result<Vec<UserPlan>>;

    /// Returns false when the user has no plan row.
    async fn set_admin(&self, user_id: Uuid, is_admin: bool) -> Result<bool>;

    /// Takes one unit of `counter` if the plan still has room (or is an admin's),
    /// as a single check-and-increment. `None` when refused or no plan exists.
    async fn reserve_usage(&self, user_id: Uuid, counter: UsageCounter) -> Result<Option<UserPlan>>;

    /// Gives back a reserved unit; never goes below zero.
    async fn release_usage(&self, user_id: Uuid, counter: UsageCounter) -> Result<()>;

    async fn upsert_training_request(&self, request: &TrainingRequest) -> Result<()>;

    async fn find_training_request(&self, request_id: &str) -> Result<Option<TrainingRequest>>;

    async fn insert_generation_job(&self, job: &GenerationJob) -> Result<()>;

    async fn find_generation_job(&self, request_id: &str) -> Result<Option<GenerationJob>>;

    /// The user's training requests, newest first, optionally filtered by status.
    async fn list_training_requests(
        &self,
        user_id: Uuid,
        status: Option<&JobStatus>,
    ) -> Result<Vec<TrainingRequest>>;

    /// Writes status and completion of a tracked job. Unknown ids are ignored.
    async fn update_job_progress(
        &self,
        request_id: &str,
        status: &JobStatus,
        completion_percentage: u8,
    ) -> Result<()>;

    async fn results_for_request(&self, request_id: &str) -> Result<Vec<GeneratedImage>>;

    /// The user's results, newest first.
    async fn results_for_user(&self, user_id: Uuid) -> Result<Vec<GeneratedImage>>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::errors::AppError::Database(e.into()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
