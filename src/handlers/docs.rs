use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::liveness,
        crate::handlers::plans::subscribe,
        crate::handlers::plans::current_plan,
        crate::handlers::jobs::create_training,
        crate::handlers::jobs::create_generation,
        crate::handlers::jobs::get_job,
        crate::handlers::jobs::refresh_job,
        crate::handlers::jobs::job_images,
        crate::handlers::jobs::list_training_requests,
        crate::handlers::images::list_images,
    ),
    components(
        schemas(
            crate::models::PlanType,
            crate::models::UserPlan,
            crate::models::SubscribeRequest,
            crate::models::SetAdminRequest,
            crate::models::QuotaMetric,
            crate::models::PlanUsage,
            crate::models::PlanResponse,
            crate::models::JobKind,
            crate::models::Gender,
            crate::models::GenerationForm,
            crate::models::GeneratedImage,
            crate::models::TrainingRequest,
            crate::services::poller::JobSnapshot,
            crate::services::poller::PollPhase,
        )
    ),
    tags(
        (name = "plans", description = "Subscription plans and usage"),
        (name = "jobs", description = "Face training and thumbnail generation jobs"),
        (name = "images", description = "Generated thumbnails"),
        (name = "health", description = "Health check endpoints")
    ),
    info(
        title = "Thumbnail Studio API",
        version = "0.1.0",
        description = "Quota-gated face training and thumbnail generation with job status tracking"
    )
)]
pub struct ApiDoc;

pub fn create_docs_router() -> Router<AppState> {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
