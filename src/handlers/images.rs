use axum::{extract::State, response::Json};

use crate::{
    errors::Result,
    handlers::AppState,
    models::{GeneratedImage, Session},
};

/// The caller's generated thumbnails, newest first
#[utoipa::path(
    get,
    path = "/api/v1/images",
    responses((status = 200, description = "Generated images", body = [GeneratedImage])),
    tag = "images"
)]
pub async fn list_images(State(state): State<AppState>, session: Session) -> Result<Json<Vec<GeneratedImage>>> {
    let images = state.artifacts.load_for_user(session.user_id).await?;
    Ok(Json(images))
}
