use axum::{extract::State, response::Json};

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    models::{PlanResponse, Session, SubscribeRequest, UserPlan},
    services::quota_gate::QuotaGate,
};

/// Subscribe to a plan, replacing any existing one
#[utoipa::path(
    post,
    path = "/api/v1/plans/subscribe",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Plan activated", body = UserPlan),
        (status = 401, description = "Authentication required")
    ),
    tag = "plans"
)]
pub async fn subscribe(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<UserPlan>> {
    let plan = state.quota.subscribe(session.user_id, request.plan_type).await?;
    Ok(Json(plan))
}

/// Current plan and usage
#[utoipa::path(
    get,
    path = "/api/v1/plans/me",
    responses(
        (status = 200, description = "Plan and usage", body = PlanResponse),
        (status = 404, description = "No plan yet")
    ),
    tag = "plans"
)]
pub async fn current_plan(State(state): State<AppState>, session: Session) -> Result<Json<PlanResponse>> {
    let plan = state
        .store
        .find_plan(session.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let usage = QuotaGate::usage(&plan);
    Ok(Json(PlanResponse { plan, usage }))
}
