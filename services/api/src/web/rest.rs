//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{ApiError, ErrorBody};
use crate::web::{middleware::ClientKey, state::AppState};
use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use url::Url;
use utoipa::{OpenApi, ToSchema};
use wiki_quiz_core::domain::{
    Difficulty, Flashcard, HistorySummary, QuizArtifact, QuizQuestion, ResolvedQuiz,
};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        root_handler,
        generate_quiz_handler,
        history_handler,
        quiz_handler,
    ),
    components(
        schemas(
            WelcomeResponse,
            GenerateQuizRequest,
            ResolvedQuiz,
            QuizArtifact,
            QuizQuestion,
            Flashcard,
            Difficulty,
            HistorySummary,
            ErrorBody,
        )
    ),
    tags(
        (name = "AI Wiki Quiz Generator API", description = "Turns Wikipedia articles into cached quizzes.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema)]
pub struct WelcomeResponse {
    pub message: String,
}

/// The request payload for generating (or fetching the cached) quiz for an article.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct GenerateQuizRequest {
    /// Absolute http(s) URL of the article.
    pub url: String,
}

/// Accepts only absolute http(s) URLs with a host.
fn validate_article_url(raw: &str) -> Result<(), ApiError> {
    let parsed = Url::parse(raw)
        .map_err(|e| ApiError::BadRequest(format!("Invalid URL '{}': {}", raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ApiError::BadRequest(format!(
            "Invalid URL '{}': expected an http or https address",
            raw
        )));
    }
    Ok(())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Health check.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "The service is up", body = WelcomeResponse)
    )
)]
pub async fn root_handler() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the AI Wiki Quiz Generator API".to_string(),
    })
}

/// Generate a quiz for an article, or return the cached one.
///
/// A URL that was already processed is served from the cache and does not
/// count against the caller's quota.
#[utoipa::path(
    post,
    path = "/generate_quiz",
    request_body = GenerateQuizRequest,
    responses(
        (status = 200, description = "The quiz for the article", body = ResolvedQuiz),
        (status = 400, description = "Invalid URL or the article could not be extracted", body = ErrorBody),
        (status = 429, description = "Quota exhausted; see the Retry-After header", body = ErrorBody),
        (status = 500, description = "Generation or storage failed", body = ErrorBody)
    ),
    params(
        ("x-forwarded-for" = Option<String>, Header, description = "Client address when behind a proxy.")
    )
)]
pub async fn generate_quiz_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(client): Extension<ClientKey>,
    Json(request): Json<GenerateQuizRequest>,
) -> Result<Json<ResolvedQuiz>, ApiError> {
    validate_article_url(&request.url)?;
    info!(url = %request.url, client = %client.0, "Quiz requested.");

    let quiz = app_state.resolver.resolve(&client.0, &request.url).await?;
    Ok(Json(quiz))
}

/// List every cached quiz, newest first.
#[utoipa::path(
    get,
    path = "/history",
    responses(
        (status = 200, description = "Cached quizzes", body = [HistorySummary]),
        (status = 500, description = "Storage failed", body = ErrorBody)
    )
)]
pub async fn history_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<HistorySummary>>, ApiError> {
    Ok(Json(app_state.resolver.history().await?))
}

/// Fetch one cached quiz by its id.
#[utoipa::path(
    get,
    path = "/quiz/{id}",
    responses(
        (status = 200, description = "The cached quiz", body = ResolvedQuiz),
        (status = 404, description = "No quiz with that id", body = ErrorBody),
        (status = 500, description = "Storage failed", body = ErrorBody)
    ),
    params(
        ("id" = i64, Path, description = "The quiz id.")
    )
)]
pub async fn quiz_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ResolvedQuiz>, ApiError> {
    app_state
        .resolver
        .quiz(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Quiz not found".to_string()))
}
