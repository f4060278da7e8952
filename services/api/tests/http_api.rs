//! Integration tests for the quiz API, driven through the real router and a
//! SQLite database, with the network-facing ports faked.

use api_lib::{
    adapters::db::DbAdapter,
    error::ErrorBody,
    web::{self, rest::WelcomeResponse, AppState},
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tower::ServiceExt; // for oneshot
use wiki_quiz_core::{
    DocumentExtractor, ExtractedDocument, GenerationClient, HistorySummary, ModelFailure,
    PortError, PortResult, QuizModel, QuizResolver, RateLimitPolicy, RateLimiter, ResolvedQuiz,
    RetryPolicy, SystemClock,
};

//=========================================================================================
// Fakes
//=========================================================================================

/// Serves a fixed article for every URL except those naming a missing page.
#[derive(Default)]
struct FakeExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl DocumentExtractor for FakeExtractor {
    async fn extract(&self, url: &str) -> PortResult<ExtractedDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.contains("Missing") {
            return Err(PortError::NotFound(format!("No article at {}", url)));
        }
        Ok(ExtractedDocument {
            title: "Alan Turing".to_string(),
            text: format!("Article Title: Alan Turing\n\nFetched from {}.\n\n", url),
        })
    }
}

/// Answers with a valid artifact, or with junk when the article asks for it.
struct FakeModel;

#[async_trait]
impl QuizModel for FakeModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelFailure> {
        if prompt.contains("Garbage") {
            return Ok("I would rather not.".to_string());
        }
        let artifact = json!({
            "title": "Alan Turing",
            "summary": "Alan Turing was a mathematician. He founded computer science.",
            "key_entities": { "people": ["Alan Turing"], "locations": ["Bletchley Park"] },
            "sections": ["Early life", "Career"],
            "quiz": [{
                "question": "Where did Turing work during the war?",
                "options": ["Bletchley Park", "Oxford", "Paris", "Berlin"],
                "answer": "Bletchley Park",
                "difficulty": "Easy",
                "explanation": "He worked on codebreaking there."
            }],
            "related_topics": ["Enigma machine"],
            "flashcards": [{ "term": "Turing machine", "definition": "An abstract model of computation." }]
        });
        Ok(format!("Here is your quiz:\n{}", artifact))
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

async fn test_app() -> (Router, Arc<FakeExtractor>) {
    // A single long-lived connection keeps the in-memory database alive.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = Arc::new(DbAdapter::new(pool));
    db.run_migrations().await.unwrap();

    let extractor = Arc::new(FakeExtractor::default());
    let limiter = Arc::new(RateLimiter::new(
        db.clone(),
        Arc::new(SystemClock),
        RateLimitPolicy::default(),
    ));
    let resolver = Arc::new(QuizResolver::new(
        db,
        limiter,
        extractor.clone(),
        GenerationClient::new(Arc::new(FakeModel), RetryPolicy::default()),
    ));

    (web::router(Arc::new(AppState { resolver })), extractor)
}

fn generate(url: &str, client: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate_quiz")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(json!({ "url": url }).to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

const TURING: &str = "https://en.wikipedia.org/wiki/Alan_Turing";

//=========================================================================================
// Tests
//=========================================================================================

#[tokio::test]
async fn root_reports_the_service() {
    let (app, _) = test_app().await;

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let welcome: WelcomeResponse = json_body(response).await;
    assert_eq!(welcome.message, "Welcome to the AI Wiki Quiz Generator API");
}

#[tokio::test]
async fn generated_quiz_is_stored_and_served_from_cache() {
    let (app, extractor) = test_app().await;

    let response = app.clone().oneshot(generate(TURING, "203.0.113.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first: ResolvedQuiz = json_body(response).await;
    assert_eq!(first.url, TURING);
    assert_eq!(first.artifact.title, "Alan Turing");
    assert_eq!(first.artifact.quiz.len(), 1);

    let response = app.clone().oneshot(generate(TURING, "203.0.113.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second: ResolvedQuiz = json_body(response).await;

    assert_eq!(second, first);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn history_and_lookup_by_id() {
    let (app, _) = test_app().await;
    let created: ResolvedQuiz =
        json_body(app.clone().oneshot(generate(TURING, "203.0.113.1")).await.unwrap()).await;

    let response = app.clone().oneshot(get("/history")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history: Vec<HistorySummary> = json_body(response).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, created.id);
    assert_eq!(history[0].title, "Alan Turing");

    let response = app
        .clone()
        .oneshot(get(&format!("/quiz/{}", created.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched: ResolvedQuiz = json_body(response).await;
    assert_eq!(fetched, created);

    let response = app
        .oneshot(get(&format!("/quiz/{}", created.id + 100)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ErrorBody = json_body(response).await;
    assert_eq!(error.detail, "Quiz not found");
}

#[tokio::test]
async fn invalid_urls_are_rejected_before_any_work() {
    let (app, extractor) = test_app().await;

    for bad in ["not a url", "ftp://example.org/file"] {
        let response = app.clone().oneshot(generate(bad, "203.0.113.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{bad:?}");
    }
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn extraction_failure_is_a_bad_request() {
    let (app, _) = test_app().await;

    let response = app
        .clone()
        .oneshot(generate("https://en.wikipedia.org/wiki/Missing", "203.0.113.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorBody = json_body(response).await;
    assert!(error.detail.contains("Could not extract"), "{}", error.detail);

    let history: Vec<HistorySummary> = json_body(app.oneshot(get("/history")).await.unwrap()).await;
    assert!(history.is_empty());
}

#[tokio::test]
async fn malformed_generation_is_a_short_server_error() {
    let (app, _) = test_app().await;

    let response = app
        .oneshot(generate("https://en.wikipedia.org/wiki/Garbage", "203.0.113.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorBody = json_body(response).await;
    assert_eq!(error.detail, "Quiz generation failed.");
}

#[tokio::test]
async fn third_fresh_url_in_a_window_is_throttled() {
    let (app, _) = test_app().await;
    let client = "198.51.100.7";

    for topic in ["Ada_Lovelace", "Charles_Babbage"] {
        let url = format!("https://en.wikipedia.org/wiki/{}", topic);
        let response = app.clone().oneshot(generate(&url, client)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(generate("https://en.wikipedia.org/wiki/Grace_Hopper", client))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get(header::RETRY_AFTER).unwrap(),
        "3600"
    );
    let error: ErrorBody = json_body(response).await;
    assert_eq!(error.retry_after_minutes, Some(60));
    assert!(error.detail.contains("60 minute"), "{}", error.detail);

    // Cached URLs stay available to a throttled client.
    let response = app
        .clone()
        .oneshot(generate("https://en.wikipedia.org/wiki/Ada_Lovelace", client))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Other clients have their own quota.
    let response = app
        .oneshot(generate("https://en.wikipedia.org/wiki/Grace_Hopper", "198.51.100.8"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn concurrent_requests_for_one_url_share_a_record() {
    let (app, _) = test_app().await;

    let responses = futures::future::join_all(
        ["203.0.113.1", "203.0.113.2", "203.0.113.3"]
            .into_iter()
            .map(|client| app.clone().oneshot(generate(TURING, client))),
    )
    .await;

    let mut ids = Vec::new();
    for response in responses {
        let response = response.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let quiz: ResolvedQuiz = json_body(response).await;
        ids.push(quiz.id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);

    let history: Vec<HistorySummary> = json_body(app.oneshot(get("/history")).await.unwrap()).await;
    assert_eq!(history.len(), 1);
}
