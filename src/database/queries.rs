use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::{Database, RecordStore};
use crate::errors::{AppError, Result};
use crate::models::*;

#[derive(Debug, FromRow)]
struct PlanRow {
    id: Uuid,
    user_id: Uuid,
    plan_type: String,
    face_training_limit: i32,
    face_training_used: i32,
    image_limit: i32,
    images_generated: i32,
    subscription_start: DateTime<Utc>,
    subscription_end: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    is_admin: bool,
}

impl TryFrom<PlanRow> for UserPlan {
    type Error = AppError;

    fn try_from(row: PlanRow) -> Result<Self> {
        Ok(UserPlan {
            id: row.id,
            user_id: row.user_id,
            plan_type: row.plan_type.parse()?,
            face_training_limit: row.face_training_limit,
            face_training_used: row.face_training_used,
            image_limit: row.image_limit,
            images_generated: row.images_generated,
            subscription_start: row.subscription_start,
            subscription_end: row.subscription_end,
            created_at: row.created_at,
            is_admin: row.is_admin,
        })
    }
}

#[derive(Debug, FromRow)]
struct TrainingRequestRow {
    request_id: String,
    user_id: Uuid,
    trigger_phrase: String,
    status: String,
    completion_percentage: i32,
    created_at: DateTime<Utc>,
}

impl From<TrainingRequestRow> for TrainingRequest {
    fn from(row: TrainingRequestRow) -> Self {
        TrainingRequest {
            request_id: row.request_id,
            user_id: row.user_id,
            trigger_phrase: row.trigger_phrase,
            status: JobStatus::parse(&row.status),
            completion_percentage: row.completion_percentage.clamp(0, 100) as u8,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct GenerationJobRow {
    request_id: String,
    user_id: Uuid,
    source_request_id: String,
    prompt: String,
    created_at: DateTime<Utc>,
}

impl From<GenerationJobRow> for GenerationJob {
    fn from(row: GenerationJobRow) -> Self {
        GenerationJob {
            request_id: row.request_id,
            user_id: row.user_id,
            source_request_id: row.source_request_id,
            prompt: row.prompt,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ResultRow {
    id: Uuid,
    request_id: String,
    user_id: Option<Uuid>,
    image_url: String,
    created_at: DateTime<Utc>,
}

impl From<ResultRow> for GeneratedImage {
    fn from(row: ResultRow) -> Self {
        GeneratedImage {
            id: row.id,
            request_id: row.request_id,
            user_id: row.user_id,
            image_url: row.image_url,
            created_at: row.created_at,
        }
    }
}

const PLAN_COLUMNS: &str = "id, user_id, plan_type, face_training_limit, face_training_used, \
     image_limit, images_generated, subscription_start, subscription_end, created_at, is_admin";

const TRAINING_COLUMNS: &str =
    "request_id, user_id, trigger_phrase, status, completion_percentage, created_at";

/// PostgreSQL-backed [`RecordStore`].
#[derive(Clone)]
pub struct PgRecordStore {
    database: Database,
}

impl PgRecordStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_plan(&self, user_id: Uuid) -> Result<Option<UserPlan>> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {} FROM user_plans WHERE user_id = $1",
            PLAN_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(self.database.pool())
        .await?;

        row.map(UserPlan::try_from).transpose()
    }

    async fn upsert_plan(&self, plan: &UserPlan) -> Result<UserPlan> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            INSERT INTO user_plans (id, user_id, plan_type, face_training_limit, face_training_used,
                                    image_limit, images_generated, subscription_start, subscription_end,
                                    created_at, is_admin)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (user_id) DO UPDATE SET
                plan_type = EXCLUDED.plan_type,
                face_training_limit = EXCLUDED.face_training_limit,
                face_training_used = EXCLUDED.face_training_used,
                image_limit = EXCLUDED.image_limit,
                images_generated = EXCLUDED.images_generated,
                subscription_start = EXCLUDED.subscription_start,
                subscription_end = EXCLUDED.subscription_end
            RETURNING {}
            "#,
            PLAN_COLUMNS
        ))
        .bind(plan.id)
        .bind(plan.user_id)
        .bind(plan.plan_type.as_str())
        .bind(plan.face_training_limit)
        .bind(plan.face_training_used)
        .bind(plan.image_limit)
        .bind(plan.images_generated)
        .bind(plan.subscription_start)
        .bind(plan.subscription_end)
        .bind(plan.created_at)
        .bind(plan.is_admin)
        .fetch_one(self.database.pool())
        .await?;

        row.try_into()
    }

    async fn list_plans(&self) -> Result<Vec<UserPlan>> {
        let rows = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {} FROM user_plans ORDER BY created_at DESC",
            PLAN_COLUMNS
        ))
        .fetch_all(self.database.pool())
        .await?;

        rows.into_iter().map(UserPlan::try_from).collect()
    }

    async fn set_admin(&self, user_id: Uuid, is_admin: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE user_plans SET is_admin = $1 WHERE user_id = $2")
            .bind(is_admin)
            .bind(user_id)
            .execute(self.database.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reserve_usage(&self, user_id: Uuid, counter: UsageCounter) -> Result<Option<UserPlan>> {
        // column() and limit_column() only yield fixed identifiers
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            UPDATE user_plans SET {used} = {used} + 1
            WHERE user_id = $1 AND (is_admin OR {used} < {limit})
            RETURNING {}
            "#,
            PLAN_COLUMNS,
            used = counter.column(),
            limit = counter.limit_column(),
        ))
        .bind(user_id)
        .fetch_optional(self.database.pool())
        .await?;

        row.map(UserPlan::try_from).transpose()
    }

    async fn release_usage(&self, user_id: Uuid, counter: UsageCounter) -> Result<()> {
        let column = counter.column();
        sqlx::query(&format!(
            "UPDATE user_plans SET {} = GREATEST({} - 1, 0) WHERE user_id = $1",
            column, column
        ))
        .bind(user_id)
        .execute(self.database.pool())
        .await?;

        Ok(())
    }

    async fn upsert_training_request(&self, request: &TrainingRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO training_requests (request_id, user_id, trigger_phrase, status,
                                           completion_percentage, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (request_id) DO UPDATE SET
                status = EXCLUDED.status,
                completion_percentage = EXCLUDED.completion_percentage
            "#,
        )
        .bind(&request.request_id)
        .bind(request.user_id)
        .bind(&request.trigger_phrase)
        .bind(request.status.db_value())
        .bind(request.completion_percentage as i32)
        .bind(request.created_at)
        .execute(self.database.pool())
        .await?;

        Ok(())
    }

    async fn find_training_request(&self, request_id: &str) -> Result<Option<TrainingRequest>> {
        let row = sqlx::query_as::<_, TrainingRequestRow>(&format!(
            "SELECT {} FROM training_requests WHERE request_id = $1",
            TRAINING_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(self.database.pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert_generation_job(&self, job: &GenerationJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO generation_requests (request_id, user_id, source_request_id, prompt, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (request_id) DO NOTHING
            "#,
        )
        .bind(&job.request_id)
        .bind(job.user_id)
        .bind(&job.source_request_id)
        .bind(&job.prompt)
        .bind(job.created_at)
        .execute(self.database.pool())
        .await?;

        Ok(())
    }

    async fn find_generation_job(&self, request_id: &str) -> Result<Option<GenerationJob>> {
        let row = sqlx::query_as::<_, GenerationJobRow>(
            "SELECT request_id, user_id, source_request_id, prompt, created_at \
             FROM generation_requests WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_optional(self.database.pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_training_requests(
        &self,
        user_id: Uuid,
        status: Option<&JobStatus>,
    ) -> Result<Vec<TrainingRequest>> {
        let rows = sqlx::query_as::<_, TrainingRequestRow>(&format!(
            r#"
            SELECT {} FROM training_requests
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
            TRAINING_COLUMNS
        ))
        .bind(user_id)
        .bind(status.map(JobStatus::db_value))
        .fetch_all(self.database.pool())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_job_progress(
        &self,
        request_id: &str,
        status: &JobStatus,
        completion_percentage: u8,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE training_requests SET status = $1, completion_percentage = $2 WHERE request_id = $3",
        )
        .bind(status.db_value())
        .bind(completion_percentage as i32)
        .bind(request_id)
        .execute(self.database.pool())
        .await?;

        Ok(())
    }

    async fn results_for_request(&self, request_id: &str) -> Result<Vec<GeneratedImage>> {
        let rows = sqlx::query_as::<_, ResultRow>(
            "SELECT id, request_id, user_id, image_url, created_at FROM results WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_all(self.database.pool())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn results_for_user(&self, user_id: Uuid) -> Result<Vec<GeneratedImage>> {
        let rows = sqlx::query_as::<_, ResultRow>(
            r#"
            SELECT id, request_id, user_id, image_url, created_at
            FROM results
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.database.pool())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.database.pool()).await?;
        Ok(())
    }
}
