//! crates/wiki_quiz_core/src/resolver.rs
//!
//! The request-resolution pipeline: cache lookup, quota check, extraction,
//! generation and persistence, with every collaborator failure translated
//! into `ResolveError`.

use crate::domain::{HistorySummary, ResolvedQuiz};
use crate::generation::{GenerationClient, GenerationError};
use crate::ports::{ArtifactStore, DocumentExtractor, PortError};
use crate::rate_limit::{RateDecision, RateLimiter};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Rate limit exceeded. Try again in {retry_after_minutes} minute(s).")]
    RateLimited { retry_after_minutes: i64 },
    #[error("Could not extract content from {url}: {reason}")]
    ExtractionFailed { url: String, reason: String },
    #[error("Quiz generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Maps an unexpected port failure to `ResolveError::Internal`, logging the detail.
fn internal(action: &'static str) -> impl FnOnce(PortError) -> ResolveError {
    move |e| {
        error!(error = %e, action, "Unexpected store failure.");
        ResolveError::Internal(format!("Failed to {}", action))
    }
}

pub struct QuizResolver {
    store: Arc<dyn ArtifactStore>,
    limiter: Arc<RateLimiter>,
    extractor: Arc<dyn DocumentExtractor>,
    generator: GenerationClient,
}

impl QuizResolver {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        limiter: Arc<RateLimiter>,
        extractor: Arc<dyn DocumentExtractor>,
        generator: GenerationClient,
    ) -> Self {
        Self {
            store,
            limiter,
            extractor,
            generator,
        }
    }

    /// Returns the quiz for `url`, generating and caching it on first request.
    ///
    /// Cache hits are served without touching the client's quota.
    pub async fn resolve(&self, client_key: &str, url: &str) -> Result<ResolvedQuiz, ResolveError> {
        if let Some(record) = self
            .store
            .find_by_url(url)
            .await
            .map_err(internal("look up cached quiz"))?
        {
            info!(url, id = record.id, "Cache hit; returning stored quiz.");
            return Ok(record.into());
        }
        info!(url, client_key, "Cache miss; starting fresh generation.");

        let decision = self
            .limiter
            .check(client_key)
            .await
            .map_err(internal("check rate limit"))?;
        if let RateDecision::Reject { retry_after_minutes } = decision {
            return Err(ResolveError::RateLimited { retry_after_minutes });
        }

        let document = self.extractor.extract(url).await.map_err(|e| {
            warn!(url, error = %e, "Extraction failed.");
            ResolveError::ExtractionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        if document.text.trim().is_empty() {
            return Err(ResolveError::ExtractionFailed {
                url: url.to_string(),
                reason: "document has no usable text".to_string(),
            });
        }

        let artifact = self.generator.generate(&document.text).await?;

        match self.store.create(url, &artifact.title, &artifact).await {
            Ok(record) => {
                info!(url, id = record.id, "Quiz generated and cached.");
                Ok(record.into())
            }
            Err(PortError::Conflict(_)) => {
                warn!(url, "Quiz was cached concurrently; returning the stored copy.");
                self.store
                    .find_by_url(url)
                    .await
                    .map_err(internal("re-read cached quiz"))?
                    .map(ResolvedQuiz::from)
                    .ok_or_else(|| {
                        error!(url, "Conflicting record vanished before it could be re-read.");
                        ResolveError::Internal("Failed to re-read cached quiz".to_string())
                    })
            }
            Err(e) => Err(internal("save generated quiz")(e)),
        }
    }

    /// All cached quizzes, newest first.
    pub async fn history(&self) -> Result<Vec<HistorySummary>, ResolveError> {
        self.store.list_all().await.map_err(internal("list quiz history"))
    }

    pub async fn quiz(&self, id: i64) -> Result<Option<ResolvedQuiz>, ResolveError> {
        Ok(self
            .store
            .find_by_id(id)
            .await
            .map_err(internal("load quiz"))?
            .map(ResolvedQuiz::from))
    }
}
