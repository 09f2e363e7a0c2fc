pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{admin, docs, health, images, jobs, metrics, plans, session};

pub use crate::handlers::AppState;

pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/plans/subscribe", post(plans::subscribe))
        .route("/plans/me", get(plans::current_plan))
        .route(
            "/jobs/training",
            post(jobs::create_training)
                // Multipart framing on top of the archive itself.
                .layer(DefaultBodyLimit::max(state.config.max_upload_size + 64 * 1024)),
        )
        .route("/jobs/generation", post(jobs::create_generation))
        .route("/jobs/:id", get(jobs::get_job).delete(jobs::stop_job))
        .route("/jobs/:id/refresh", post(jobs::refresh_job))
        .route("/jobs/:id/events", get(jobs::job_events))
        .route("/jobs/:id/images", get(jobs::job_images))
        .route("/images", get(images::list_images))
        .route("/training-requests", get(jobs::list_training_requests))
        .route("/admin/plans", get(admin::list_plans))
        .route("/admin/plans/:user_id/admin", put(admin::set_admin))
        .route("/session/sign-out", post(session::sign_out));

    Router::new()
        .route("/health", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api/v1", api)
        .merge(docs::create_docs_router())
        .layer(from_fn_with_state(state.clone(), crate::middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.page_origin))
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin = %origin, "Invalid PAGE_ORIGIN; cross-origin requests disabled");
            layer
        }
    }
}
