use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    database::RecordStore,
    errors::{AppError, Result},
    models::{JobKind, PlanType, PlanUsage, QuotaMetric, UsageCounter, UserPlan},
};

/// Compares a user's usage against their plan before a job may be submitted.
#[derive(Clone)]
pub struct QuotaGate {
    store: Arc<dyn RecordStore>,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn can_submit_training(plan: &UserPlan) -> bool {
        plan.is_admin || plan.face_training_used < plan.face_training_limit
    }

    pub fn can_submit_generation(plan: &UserPlan) -> bool {
        plan.is_admin || plan.images_generated < plan.image_limit
    }

    /// Read-only check; a submission must still go through [`QuotaGate::reserve`].
    pub async fn check(&self, user_id: Uuid, kind: JobKind) -> Result<UserPlan> {
        let plan = self.store.find_plan(user_id).await?.ok_or_else(|| {
            AppError::QuotaExceeded(
                "No active plan found. Please choose a plan to start creating.".to_string(),
            )
        })?;

        let allowed = match kind {
            JobKind::Training => Self::can_submit_training(&plan),
            JobKind::Generation => Self::can_submit_generation(&plan),
        };

        if !allowed {
            tracing::info!(
                user_id = %user_id,
                kind = kind.as_str(),
                plan = %plan.plan_type,
                "Submission refused by quota"
            );
            return Err(AppError::QuotaExceeded(limit_message(kind).to_string()));
        }

        Ok(plan)
    }

    /// Takes one unit of the plan's allowance in a single store update, so
    /// concurrent submissions cannot both pass on the last unit.
    pub async fn reserve(&self, user_id: Uuid, kind: JobKind) -> Result<UserPlan> {
        if let Some(plan) = self.store.reserve_usage(user_id, usage_counter(kind)).await? {
            return Ok(plan);
        }

        // Refused: re-read the plan for the right message.
        self.check(user_id, kind).await?;
        Err(AppError::QuotaExceeded(limit_message(kind).to_string()))
    }

    /// Returns a reserved unit when the job service did not take the job.
    pub async fn release(&self, user_id: Uuid, kind: JobKind) -> Result<()> {
        self.store.release_usage(user_id, usage_counter(kind)).await
    }

    pub async fn subscribe(&self, user_id: Uuid, plan_type: PlanType) -> Result<UserPlan> {
        self.subscribe_at(user_id, plan_type, Utc::now()).await
    }

    /// Replaces any existing plan: limits from the plan table, usage back to zero.
    pub async fn subscribe_at(
        &self,
        user_id: Uuid,
        plan_type: PlanType,
        now: DateTime<Utc>,
    ) -> Result<UserPlan> {
        let plan = UserPlan::new_subscription(user_id, plan_type, now);
        let stored = self.store.upsert_plan(&plan).await?;

        tracing::info!(user_id = %user_id, plan = %plan_type, "Subscribed to plan");
        Ok(stored)
    }

    pub fn usage(plan: &UserPlan) -> PlanUsage {
        PlanUsage {
            face_training: metric(plan.face_training_used, plan.face_training_limit, plan.is_admin),
            images: metric(plan.images_generated, plan.image_limit, plan.is_admin),
            can_train: Self::can_submit_training(plan),
            can_generate: Self::can_submit_generation(plan),
        }
    }
}

fn usage_counter(kind: JobKind) -> UsageCounter {
    match kind {
        JobKind::Training => UsageCounter::FaceTraining,
        JobKind::Generation => UsageCounter::ImagesGenerated,
    }
}

fn limit_message(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Training => {
            "You have reached your face training limit. Please upgrade your plan to train more faces."
        }
        JobKind::Generation => {
            "You have reached your image generation limit. Please upgrade your plan to generate more images."
        }
    }
}

fn metric(used: i32, limit: i32, unlimited: bool) -> QuotaMetric {
    let percentage = if limit > 0 {
        ((used.max(0) as i64 * 100) / limit as i64) as u32
    } else {
        0
    };

    QuotaMetric {
        used,
        limit,
        remaining: (!unlimited).then(|| (limit - used).max(0)),
        percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn plan(plan_type: PlanType) -> UserPlan {
        UserPlan::new_subscription(Uuid::new_v4(), plan_type, Utc::now())
    }

    #[test]
    fn test_admin_bypasses_limits() {
        let mut admin = plan(PlanType::Starter);
        admin.is_admin = true;

        for used in [0, 1, 10, 50] {
            admin.face_training_used = used;
            admin.images_generated = used * 10;
            assert!(QuotaGate::can_submit_training(&admin));
            assert!(QuotaGate::can_submit_generation(&admin));
        }
    }

    #[test]
    fn test_limits_apply_to_regular_users() {
        let mut starter = plan(PlanType::Starter);
        assert!(QuotaGate::can_submit_training(&starter));

        starter.face_training_used = 1;
        starter.images_generated = 10;
        assert!(!QuotaGate::can_submit_training(&starter));
        assert!(!QuotaGate::can_submit_generation(&starter));
    }

    #[tokio::test]
    async fn test_subscribe_sets_table_limits_and_zero_usage() {
        let store = Arc::new(MemoryStore::new());
        let gate = QuotaGate::new(store.clone());
        let user_id = Uuid::new_v4();

        for plan_type in [PlanType::Starter, PlanType::Creator, PlanType::Pro] {
            gate.reserve(user_id, JobKind::Generation).await.ok();
            let plan = gate.subscribe(user_id, plan_type).await.unwrap();
            let limits = plan_type.limits();

            assert_eq!(plan.plan_type, plan_type);
            assert_eq!(plan.face_training_used, 0);
            assert_eq!(plan.images_generated, 0);
            assert_eq!(plan.face_training_limit, limits.face_training);
            assert_eq!(plan.image_limit, limits.images);
            assert_eq!(plan.subscription_end.is_none(), plan_type == PlanType::Starter);
        }
    }

    #[tokio::test]
    async fn test_exhausted_generation_quota_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let gate = QuotaGate::new(store.clone());
        let mut exhausted = plan(PlanType::Starter);
        exhausted.images_generated = 10;
        store.upsert_plan(&exhausted).await.unwrap();

        let err = gate.check(exhausted.user_id, JobKind::Generation).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded(ref msg) if msg.contains("upgrade")));
    }

    #[tokio::test]
    async fn test_missing_plan_is_quota_error() {
        let gate = QuotaGate::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            gate.check(Uuid::new_v4(), JobKind::Training).await,
            Err(AppError::QuotaExceeded(_))
        ));
    }

    #[tokio::test]
    async fn test_reserve_debits_until_limit_then_release_refunds() {
        let store = Arc::new(MemoryStore::new());
        let gate = QuotaGate::new(store.clone());
        let user_id = Uuid::new_v4();
        gate.subscribe(user_id, PlanType::Pro).await.unwrap();

        for _ in 0..3 {
            gate.reserve(user_id, JobKind::Training).await.unwrap();
        }
        let err = gate.reserve(user_id, JobKind::Training).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded(ref msg) if msg.contains("face training limit")));

        gate.release(user_id, JobKind::Training).await.unwrap();
        let plan = store.find_plan(user_id).await.unwrap().unwrap();
        assert_eq!(plan.face_training_used, 2);
        assert_eq!(plan.images_generated, 0);
    }

    #[tokio::test]
    async fn test_reserve_without_plan_asks_to_choose_one() {
        let gate = QuotaGate::new(Arc::new(MemoryStore::new()));
        let err = gate.reserve(Uuid::new_v4(), JobKind::Generation).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded(ref msg) if msg.contains("No active plan")));
    }

    #[test]
    fn test_usage_report() {
        let mut creator = plan(PlanType::Creator);
        creator.images_generated = 5;
        let usage = QuotaGate::usage(&creator);

        assert_eq!(usage.images.remaining, Some(20));
        assert_eq!(usage.images.percentage, 20);
        assert!(usage.can_generate);
    }
}
