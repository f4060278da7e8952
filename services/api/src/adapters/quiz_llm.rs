//! services/api/src/adapters/quiz_llm.rs
//!
//! This module contains the adapter for the quiz-generating LLM.
//! It implements the `QuizModel` port from the `core` crate against any
//! OpenAI-compatible chat completions endpoint.
//!
//! The SDK's own retry loop is switched off: one `complete()` call is exactly
//! one upstream request, and the `GenerationClient` in `core` owns retries.

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::time::Duration;
use wiki_quiz_core::ports::{ModelFailure, ModelFailureKind, QuizModel};

const SYSTEM_INSTRUCTIONS: &str = "You are an expert quizmaster. You reply with a single JSON object that follows the schema you are given, and nothing else.";

// Billing exhaustion, not throttling.
const INSUFFICIENT_QUOTA: &str = "insufficient_quota";

const RATE_LIMIT_CODES: &[&str] = &["rate_limit_exceeded"];
// OpenAI reports which limit was hit in the error type.
const RATE_LIMIT_TYPES: &[&str] = &["rate_limit_exceeded", "requests", "tokens"];

// Providers whose error bodies do not fit OpenAI's shape surface as raw text.
const RAW_BODY_MARKERS: &[&str] = &["rate_limit_exceeded", "resource_exhausted", "too many requests"];

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `QuizModel` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiQuizAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiQuizAdapter {
    /// Creates a new `OpenAiQuizAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Builds the client for `api_key`, optionally against a non-default endpoint.
    pub fn client_for(api_key: &str, api_base: Option<&str>) -> Client<OpenAIConfig> {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }
        Client::with_config(config).with_backoff(single_attempt())
    }
}

/// A backoff that gives up before the first retry.
fn single_attempt() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

/// Decides whether a structured provider error signals throttling.
pub fn classify_api_error(error: &ApiError) -> ModelFailureKind {
    let code = error.code.as_deref();
    let kind = error.r#type.as_deref();
    if code == Some(INSUFFICIENT_QUOTA) || kind == Some(INSUFFICIENT_QUOTA) {
        return ModelFailureKind::Other;
    }
    let throttled = code.is_some_and(|c| RATE_LIMIT_CODES.contains(&c))
        || kind.is_some_and(|t| RATE_LIMIT_TYPES.contains(&t));
    if throttled {
        ModelFailureKind::RateLimited
    } else {
        ModelFailureKind::Other
    }
}

fn classify_raw_body(body: &str) -> ModelFailureKind {
    let lowered = body.to_lowercase();
    if lowered.contains(INSUFFICIENT_QUOTA) {
        return ModelFailureKind::Other;
    }
    if RAW_BODY_MARKERS.iter().any(|m| lowered.contains(m)) {
        ModelFailureKind::RateLimited
    } else {
        ModelFailureKind::Other
    }
}

fn to_failure(e: OpenAIError) -> ModelFailure {
    let kind = match &e {
        OpenAIError::ApiError(api) => classify_api_error(api),
        OpenAIError::JSONDeserialize(_, body) => classify_raw_body(body),
        _ => ModelFailureKind::Other,
    };
    ModelFailure {
        kind,
        message: e.to_string(),
    }
}

//=========================================================================================
// `QuizModel` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuizModel for OpenAiQuizAdapter {
    async fn complete(&self, prompt: &str) -> Result<String, ModelFailure> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(to_failure)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()
                .map_err(to_failure)?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.7)
            .n(1)
            .build()
            .map_err(to_failure)?;

        let response = self.client.chat().create(request).await.map_err(to_failure)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ModelFailure::other("Quiz generation LLM response contained no text content.")
            })
    }
}
