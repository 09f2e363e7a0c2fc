use axum::{extract::State, http::StatusCode};

use crate::{errors::Result, handlers::AppState, models::Session};

/// Tears down every job watch of the caller. Token revocation is the identity provider's job.
pub async fn sign_out(State(state): State<AppState>, session: Session) -> Result<StatusCode> {
    let stopped = state.registry.stop_all_for(session.user_id).await;
    tracing::info!(user_id = %session.user_id, stopped, "Signed out");
    Ok(StatusCode::NO_CONTENT)
}
