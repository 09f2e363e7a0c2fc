use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    models::{Session, SetAdminRequest, UserPlan},
};

async fn require_admin(state: &AppState, session: &Session) -> Result<()> {
    match state.store.find_plan(session.user_id).await? {
        Some(plan) if plan.is_admin => Ok(()),
        _ => {
            tracing::warn!(user_id = %session.user_id, "Non-admin attempted admin access");
            Err(AppError::Forbidden)
        }
    }
}

pub async fn list_plans(State(state): State<AppState>, session: Session) -> Result<Json<Vec<UserPlan>>> {
    require_admin(&state, &session).await?;
    Ok(Json(state.store.list_plans().await?))
}

pub async fn set_admin(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SetAdminRequest>,
) -> Result<Json<UserPlan>> {
    require_admin(&state, &session).await?;

    if !state.store.set_admin(user_id, request.is_admin).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(
        user_id = %user_id,
        is_admin = request.is_admin,
        changed_by = %session.user_id,
        "Admin flag updated"
    );

    let plan = state.store.find_plan(user_id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(plan))
}
