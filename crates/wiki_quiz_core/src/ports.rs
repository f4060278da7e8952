//! crates/wiki_quiz_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use crate::domain::{ExtractedDocument, HistoryRecord, HistorySummary, QuizArtifact, UsageWindow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected the write.
    #[error("Conflicting record: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports
//=========================================================================================

/// Persistence for generated artifacts, one record per source URL.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Exact-match lookup by source URL.
    async fn find_by_url(&self, url: &str) -> PortResult<Option<HistoryRecord>>;

    /// Persists a new record, assigning its id and creation time.
    ///
    /// Returns `PortError::Conflict` when a record for `url` already exists.
    async fn create(
        &self,
        url: &str,
        title: &str,
        artifact: &QuizArtifact,
    ) -> PortResult<HistoryRecord>;

    /// All records, newest first.
    async fn list_all(&self) -> PortResult<Vec<HistorySummary>>;

    async fn find_by_id(&self, id: i64) -> PortResult<Option<HistoryRecord>>;
}

/// Persistence for per-client rate-limit windows.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn get_window(&self, client_key: &str) -> PortResult<Option<UsageWindow>>;

    /// Inserts or replaces the window for `window.client_key`.
    async fn put_window(&self, window: &UsageWindow) -> PortResult<()>;

    /// Deletes windows that started before `older_than`, returning how many were removed.
    async fn prune_windows(&self, older_than: DateTime<Utc>) -> PortResult<u64>;
}

//=========================================================================================
// Collaborator Ports
//=========================================================================================

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Fetches `url` and returns its title and cleaned plain-text body.
    async fn extract(&self, url: &str) -> PortResult<ExtractedDocument>;
}

/// How a single model invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFailureKind {
    /// The provider signalled throttling or resource exhaustion.
    RateLimited,
    /// Network, authentication or any other provider failure.
    Other,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ModelFailure {
    pub kind: ModelFailureKind,
    pub message: String,
}

impl ModelFailure {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: ModelFailureKind::RateLimited,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: ModelFailureKind::Other,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait QuizModel: Send + Sync {
    /// Sends one prompt to the generative model and returns its raw text reply.
    async fn complete(&self, prompt: &str) -> Result<String, ModelFailure>;
}

//=========================================================================================
// Time
//=========================================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
