pub mod janitor;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use janitor::spawn_janitor;
pub use middleware::{identify_client, ClientKey};
pub use rest::{generate_quiz_handler, history_handler, quiz_handler, root_handler, ApiDoc};
pub use state::AppState;

/// Builds the application router, with the Swagger UI merged in.
///
/// Cross-cutting layers that depend on deployment (CORS, tracing) are added by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/", get(root_handler))
        .route("/generate_quiz", post(generate_quiz_handler))
        .route("/history", get(history_handler))
        .route("/quiz/{id}", get(quiz_handler))
        .layer(axum_middleware::from_fn(identify_client))
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
