//! crates/wiki_quiz_core/src/generation.rs
//!
//! Turns document text into a validated `QuizArtifact` by calling the
//! `QuizModel` port. Each call is one attempt with its own timeout; the
//! attempt result is classified and a bounded loop decides whether to back
//! off and try again. Only provider throttling is retried.

use crate::domain::QuizArtifact;
use crate::ports::{ModelFailureKind, QuizModel};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(5);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

const PROMPT_TEMPLATE: &str = r#"You are an expert quizmaster and content analyst.
Build a single JSON object from the article text below. The object must match the JSON Schema given after the article exactly.

ARTICLE TEXT:
---
{article_text}
---

Instructions:
1. title: the official title of the article.
2. summary: 2-3 sentences covering what the article is about.
3. key_entities: group the important people, organizations, locations and other notable names by category.
4. sections: the main section headings, in article order.
5. quiz: 5-10 multiple-choice questions of mixed difficulty (easy, medium, hard). Every question has exactly 4 options, the answer is copied verbatim from one of the options, and the explanation is one or two sentences grounded in the article.
6. related_topics: 3-5 related articles worth reading next.
7. flashcards: 5-10 term/definition pairs for the key concepts.

JSON SCHEMA:
{schema}

Respond with the JSON object only, without commentary or Markdown."#;

//=========================================================================================
// Policy and Errors
//=========================================================================================

/// Retry policy for the generation call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts in total, including the first.
    pub max_attempts: u32,
    /// The wait before retry `n` is `backoff_step * n`.
    pub backoff_step: Duration,
    /// A timed-out attempt is fatal.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Upstream,
    Timeout,
    Malformed,
}

impl FailureKind {
    /// Only throttling is worth waiting out.
    fn is_retryable(self) -> bool {
        matches!(self, FailureKind::RateLimited)
    }
}

/// The result of a single model invocation.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(QuizArtifact),
    Failure(FailureKind, String),
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Model is still rate limited after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },
    #[error("Model call failed: {0}")]
    Upstream(String),
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Model returned malformed output: {0}")]
    MalformedOutput(String),
}

//=========================================================================================
// The Client
//=========================================================================================

/// Resilient wrapper around the `QuizModel` port.
pub struct GenerationClient {
    model: Arc<dyn QuizModel>,
    policy: RetryPolicy,
    schema: String,
}

impl GenerationClient {
    pub fn new(model: Arc<dyn QuizModel>, policy: RetryPolicy) -> Self {
        Self {
            model,
            policy,
            schema: artifact_schema(),
        }
    }

    /// Builds the single prompt sent for `document_text`.
    pub fn prompt(&self, document_text: &str) -> String {
        PROMPT_TEMPLATE
            .replace("{schema}", &self.schema)
            .replace("{article_text}", document_text)
    }

    /// Generates an artifact, retrying only while the provider throttles us.
    pub async fn generate(&self, document_text: &str) -> Result<QuizArtifact, GenerationError> {
        let prompt = self.prompt(document_text);
        let mut attempt = 1;

        loop {
            info!(attempt, "Requesting quiz generation.");
            let (kind, detail) = match self.attempt(&prompt).await {
                AttemptOutcome::Success(artifact) => {
                    info!(attempt, title = %artifact.title, "Quiz generation succeeded.");
                    return Ok(artifact);
                }
                AttemptOutcome::Failure(kind, detail) => (kind, detail),
            };

            if !kind.is_retryable() {
                warn!(attempt, ?kind, %detail, "Quiz generation failed; not retrying.");
                return Err(self.terminal_error(kind, detail, attempt));
            }
            if attempt >= self.policy.max_attempts {
                warn!(attempt, ?kind, %detail, "Quiz generation retries exhausted.");
                return Err(self.terminal_error(kind, detail, attempt));
            }

            let delay = self.policy.backoff(attempt);
            warn!(attempt, ?kind, ?delay, "Quiz generation throttled; backing off.");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, prompt: &str) -> AttemptOutcome {
        let reply =
            match tokio::time::timeout(self.policy.attempt_timeout, self.model.complete(prompt))
                .await
            {
                Err(_) => {
                    return AttemptOutcome::Failure(
                        FailureKind::Timeout,
                        format!("no reply within {:?}", self.policy.attempt_timeout),
                    )
                }
                Ok(Err(failure)) => {
                    let kind = match failure.kind {
                        ModelFailureKind::RateLimited => FailureKind::RateLimited,
                        ModelFailureKind::Other => FailureKind::Upstream,
                    };
                    return AttemptOutcome::Failure(kind, failure.message);
                }
                Ok(Ok(reply)) => reply,
            };

        debug!(bytes = reply.len(), "Model reply received.");
        match parse_artifact(&reply) {
            Ok(artifact) => AttemptOutcome::Success(artifact),
            Err(detail) => AttemptOutcome::Failure(FailureKind::Malformed, detail),
        }
    }

    fn terminal_error(&self, kind: FailureKind, detail: String, attempts: u32) -> GenerationError {
        match kind {
            FailureKind::RateLimited => GenerationError::RateLimitExhausted { attempts },
            FailureKind::Upstream => GenerationError::Upstream(detail),
            FailureKind::Timeout => GenerationError::Timeout(self.policy.attempt_timeout),
            FailureKind::Malformed => GenerationError::MalformedOutput(detail),
        }
    }
}

/// The JSON Schema of `QuizArtifact`, pretty-printed for the prompt.
pub fn artifact_schema() -> String {
    let schema = schemars::schema_for!(QuizArtifact);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

/// Parses and validates a raw model reply.
///
/// Replies wrapped in Markdown code fences or surrounded by prose are
/// narrowed to the outermost JSON object first.
pub fn parse_artifact(raw: &str) -> Result<QuizArtifact, String> {
    let body = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => return Err("reply contains no JSON object".to_string()),
    };

    let artifact: QuizArtifact =
        serde_json::from_str(body).map_err(|e| format!("invalid JSON: {}", e))?;
    artifact
        .validate()
        .map_err(|e| format!("schema violation: {}", e))?;
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::artifact;
    use crate::ports::ModelFailure;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays a fixed list of replies and records when each call happened.
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, ModelFailure>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, ModelFailure>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QuizModel for ScriptedModel {
        async fn complete(&self, _prompt: &str) -> Result<String, ModelFailure> {
            self.calls.lock().unwrap().push(Instant::now());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelFailure::other("script exhausted")))
        }
    }

    struct HangingModel;

    #[async_trait]
    impl QuizModel for HangingModel {
        async fn complete(&self, _prompt: &str) -> Result<String, ModelFailure> {
            std::future::pending().await
        }
    }

    fn good_reply() -> Result<String, ModelFailure> {
        Ok(serde_json::to_string(&artifact("Coffee")).unwrap())
    }

    fn throttled() -> Result<String, ModelFailure> {
        Err(ModelFailure::rate_limited("429 RESOURCE_EXHAUSTED"))
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_attempts_back_off_then_succeed() {
        let model = ScriptedModel::new(vec![throttled(), throttled(), good_reply()]);
        let client = GenerationClient::new(model.clone(), RetryPolicy::default());

        let result = client.generate("Coffee is a drink.").await.unwrap();

        assert_eq!(result, artifact("Coffee"));
        let calls = model.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1] - calls[0] >= Duration::from_secs(5));
        assert!(calls[2] - calls[1] >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_throttling_exhausts_after_three_attempts() {
        let model = ScriptedModel::new(vec![throttled(), throttled(), throttled(), good_reply()]);
        let client = GenerationClient::new(model.clone(), RetryPolicy::default());
        let started = Instant::now();

        let err = client.generate("text").await.unwrap_err();

        assert!(matches!(err, GenerationError::RateLimitExhausted { attempts: 3 }));
        assert_eq!(model.calls().len(), 3);
        // 5s + 10s of backoff, no sleep after the final attempt.
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(started.elapsed() < Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_is_not_retried() {
        let model = ScriptedModel::new(vec![
            Err(ModelFailure::other("401 invalid api key")),
            good_reply(),
        ]);
        let client = GenerationClient::new(model.clone(), RetryPolicy::default());

        let err = client.generate("text").await.unwrap_err();

        match err {
            GenerationError::Upstream(detail) => assert!(detail.contains("invalid api key")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(model.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_reply_is_fatal() {
        let model = ScriptedModel::new(vec![Ok("I cannot help with that.".to_string()), good_reply()]);
        let client = GenerationClient::new(model.clone(), RetryPolicy::default());

        let err = client.generate("text").await.unwrap_err();

        assert!(matches!(err, GenerationError::MalformedOutput(_)));
        assert_eq!(model.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_times_out_without_retry() {
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_secs(30),
            ..RetryPolicy::default()
        };
        let client = GenerationClient::new(Arc::new(HangingModel), policy);
        let started = Instant::now();

        let err = client.generate("text").await.unwrap_err();

        assert!(matches!(err, GenerationError::Timeout(d) if d == Duration::from_secs(30)));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
    }

    #[test]
    fn fenced_reply_is_unwrapped() {
        let json = serde_json::to_string_pretty(&artifact("Coffee")).unwrap();
        let reply = format!("Here you go:\n```json\n{}\n```\n", json);
        assert_eq!(parse_artifact(&reply).unwrap(), artifact("Coffee"));
    }

    #[test]
    fn schema_violation_is_reported() {
        let mut bad = artifact("Coffee");
        bad.quiz[0].answer = "Mars".to_string();
        let err = parse_artifact(&serde_json::to_string(&bad).unwrap()).unwrap_err();
        assert!(err.starts_with("schema violation"), "{err}");
    }

    #[test]
    fn prompt_embeds_document_and_schema() {
        let client = GenerationClient::new(Arc::new(HangingModel), RetryPolicy::default());
        let prompt = client.prompt("Coffee is a brewed drink.");
        assert!(prompt.contains("Coffee is a brewed drink."));
        assert!(prompt.contains("\"related_topics\""));
        assert!(prompt.contains("\"flashcards\""));
        assert!(!prompt.contains("{schema}"));
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(10));
        assert_eq!(policy.backoff(3), Duration::from_secs(15));
    }
}
