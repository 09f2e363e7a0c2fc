use std::sync::Arc;
use uuid::Uuid;

use crate::{
    database::RecordStore,
    errors::{AppError, Result},
    models::GeneratedImage,
};

/// Reads generated thumbnails back out of the record store.
#[derive(Clone)]
pub struct ArtifactFetcher {
    store: Arc<dyn RecordStore>,
}

impl ArtifactFetcher {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Images produced by one job. Each call re-queries.
    pub async fn load_for_job(&self, request_id: &str) -> Result<Vec<GeneratedImage>> {
        empty_if_missing(self.store.results_for_request(request_id).await)
    }

    /// All of a user's images, newest first.
    pub async fn load_for_user(&self, user_id: Uuid) -> Result<Vec<GeneratedImage>> {
        empty_if_missing(self.store.results_for_user(user_id).await)
    }
}

// No results yet is a normal state.
fn empty_if_missing(result: Result<Vec<GeneratedImage>>) -> Result<Vec<GeneratedImage>> {
    match result {
        Err(AppError::NotFound) | Err(AppError::Database(sqlx::Error::RowNotFound)) => Ok(Vec::new()),
        other => other,
    }
}
