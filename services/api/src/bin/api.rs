//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, quiz_llm::OpenAiQuizAdapter, wikipedia::WikipediaExtractor},
    config::Config,
    error::ApiError,
    web::{self, spawn_janitor, AppState},
};
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wiki_quiz_core::{
    GenerationClient, QuizResolver, RateLimitPolicy, RateLimiter, RetryPolicy, SystemClock,
};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect_with(connect_options)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_client = OpenAiQuizAdapter::client_for(
        &config.generation_api_key,
        config.generation_api_base.as_deref(),
    );
    let quiz_model = Arc::new(OpenAiQuizAdapter::new(
        openai_client,
        config.generation_model.clone(),
    ));
    let generator = GenerationClient::new(
        quiz_model,
        RetryPolicy {
            attempt_timeout: config.generation_timeout,
            ..RetryPolicy::default()
        },
    );

    let window = chrono::Duration::from_std(config.rate_limit_window)
        .map_err(|e| ApiError::Internal(format!("RATE_LIMIT_WINDOW_SECS is out of range: {}", e)))?;
    let limiter = Arc::new(RateLimiter::new(
        db_adapter.clone(),
        Arc::new(SystemClock),
        RateLimitPolicy {
            max_requests: config.rate_limit_max_requests,
            window,
        },
    ));

    let extractor = Arc::new(WikipediaExtractor::new(config.max_article_chars)?);

    // --- 4. Build the Shared AppState ---
    let resolver = Arc::new(QuizResolver::new(
        db_adapter.clone(),
        limiter.clone(),
        extractor,
        generator,
    ));
    let app_state = Arc::new(AppState { resolver });

    // --- 5. Start Background Tasks ---
    let shutdown_token = CancellationToken::new();
    let janitor = spawn_janitor(limiter, config.rate_limit_window, shutdown_token.clone());

    // --- 6. Create the Web Router ---
    let origins = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect::<Vec<_>>();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let app = web::router(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // --- 8. Tear Down ---
    info!("Shutting down...");
    shutdown_token.cancel();
    if let Err(e) = janitor.await {
        warn!("Janitor task ended abnormally: {}", e);
    }
    db_adapter.close().await;
    info!("Shutdown complete.");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
