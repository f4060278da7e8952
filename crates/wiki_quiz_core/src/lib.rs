pub mod domain;
pub mod generation;
pub mod memory;
pub mod ports;
pub mod rate_limit;
pub mod resolver;

pub use domain::{
    Difficulty, ExtractedDocument, Flashcard, HistoryRecord, HistorySummary, QuizArtifact,
    QuizQuestion, ResolvedQuiz, SchemaViolation, UsageWindow,
};
pub use generation::{GenerationClient, GenerationError, RetryPolicy};
pub use ports::{
    ArtifactStore, Clock, DocumentExtractor, ModelFailure, ModelFailureKind, PortError,
    PortResult, QuizModel, SystemClock, UsageStore,
};
pub use rate_limit::{RateDecision, RateLimitPolicy, RateLimiter};
pub use resolver::{QuizResolver, ResolveError};
