use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Length of a paid billing period.
pub const PAID_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Starter,
    Creator,
    Pro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub face_training: i32,
    pub images: i32,
}

impl PlanType {
    pub fn limits(self) -> PlanLimits {
        match self {
            PlanType::Starter => PlanLimits { face_training: 1, images: 10 },
            PlanType::Creator => PlanLimits { face_training: 1, images: 25 },
            PlanType::Pro => PlanLimits { face_training: 3, images: 100 },
        }
    }

    /// Starter never expires; paid plans run for one period.
    pub fn subscription_end(self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            PlanType::Starter => None,
            PlanType::Creator | PlanType::Pro => Some(start + Duration::days(PAID_PERIOD_DAYS)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanType::Starter => "starter",
            PlanType::Creator => "creator",
            PlanType::Pro => "pro",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starter" => Ok(PlanType::Starter),
            "creator" => Ok(PlanType::Creator),
            "pro" => Ok(PlanType::Pro),
            other => Err(AppError::Validation(format!("Unknown plan type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserPlan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_type: PlanType,
    pub face_training_limit: i32,
    pub face_training_used: i32,
    pub image_limit: i32,
    pub images_generated: i32,
    pub subscription_start: DateTime<Utc>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub is_admin: bool,
}

impl UserPlan {
    /// A fresh plan row: limits from the plan table, usage reset to zero.
    pub fn new_subscription(user_id: Uuid, plan_type: PlanType, now: DateTime<Utc>) -> Self {
        let limits = plan_type.limits();
        Self {
            id: Uuid::new_v4(),
            user_id,
            plan_type,
            face_training_limit: limits.face_training,
            face_training_used: 0,
            image_limit: limits.images,
            images_generated: 0,
            subscription_start: now,
            subscription_end: plan_type.subscription_end(now),
            created_at: now,
            is_admin: false,
        }
    }
}

/// Which usage counter a submission debits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageCounter {
    FaceTraining,
    ImagesGenerated,
}

impl UsageCounter {
    pub fn column(self) -> &'static str {
        match self {
            UsageCounter::FaceTraining => "face_training_used",
            UsageCounter::ImagesGenerated => "images_generated",
        }
    }

    pub fn limit_column(self) -> &'static str {
        match self {
            UsageCounter::FaceTraining => "face_training_limit",
            UsageCounter::ImagesGenerated => "image_limit",
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    pub plan_type: PlanType,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuotaMetric {
    pub used: i32,
    pub limit: i32,
    /// `None` when the plan is not bound by this limit (admins).
    pub remaining: Option<i32>,
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlanUsage {
    pub face_training: QuotaMetric,
    pub images: QuotaMetric,
    pub can_train: bool,
    pub can_generate: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlanResponse {
    pub plan: UserPlan,
    pub usage: PlanUsage,
}
