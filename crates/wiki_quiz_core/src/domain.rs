//! crates/wiki_quiz_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! The quiz types double as the structured-output contract for the model,
//! so they carry `serde` and `schemars` derives but no storage details.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of answer options every quiz question must carry.
pub const OPTIONS_PER_QUESTION: usize = 4;

//=========================================================================================
// Generation Output
//=========================================================================================

/// How hard a quiz question is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[serde(alias = "Easy", alias = "EASY")]
    Easy,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "Hard", alias = "HARD")]
    Hard,
}

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QuizQuestion {
    /// The question text.
    pub question: String,
    /// Exactly four answer options.
    pub options: Vec<String>,
    /// The correct answer; must be the exact text of one of the options.
    pub answer: String,
    /// Difficulty level (easy, medium or hard).
    pub difficulty: Difficulty,
    /// A short explanation of why the answer is correct.
    pub explanation: String,
}

/// A term and its definition, for spaced-repetition review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Flashcard {
    pub term: String,
    pub definition: String,
}

/// The full structured artifact generated for one source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QuizArtifact {
    /// The official title of the article.
    pub title: String,
    /// A 2-3 sentence summary of the article.
    pub summary: String,
    /// Entity category (people, organizations, locations, ...) to entity names.
    #[serde(default)]
    pub key_entities: BTreeMap<String, Vec<String>>,
    /// The main section headings of the article.
    #[serde(default)]
    pub sections: Vec<String>,
    /// 5-10 quiz questions.
    pub quiz: Vec<QuizQuestion>,
    /// 3-5 related topics for further reading.
    #[serde(default)]
    pub related_topics: Vec<String>,
    /// 5-10 flashcards.
    #[serde(default)]
    pub flashcards: Vec<Flashcard>,
}

/// Reasons a parsed artifact does not satisfy the output contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    #[error("artifact title is empty")]
    EmptyTitle,
    #[error("artifact contains no quiz questions")]
    EmptyQuiz,
    #[error("question {index} has {found} options, expected 4")]
    WrongOptionCount { index: usize, found: usize },
    #[error("question {index} answer '{answer}' is not one of its options")]
    AnswerNotInOptions { index: usize, answer: String },
}

impl QuizQuestion {
    fn validate(&self, index: usize) -> Result<(), SchemaViolation> {
        if self.options.len() != OPTIONS_PER_QUESTION {
            return Err(SchemaViolation::WrongOptionCount {
                index,
                found: self.options.len(),
            });
        }
        if !self.options.iter().any(|o| o == &self.answer) {
            return Err(SchemaViolation::AnswerNotInOptions {
                index,
                answer: self.answer.clone(),
            });
        }
        Ok(())
    }
}

impl QuizArtifact {
    /// Checks the invariants serde cannot express on its own.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        if self.title.trim().is_empty() {
            return Err(SchemaViolation::EmptyTitle);
        }
        if self.quiz.is_empty() {
            return Err(SchemaViolation::EmptyQuiz);
        }
        self.quiz
            .iter()
            .enumerate()
            .try_for_each(|(index, q)| q.validate(index))
    }

    /// Serializes the artifact into the blob form kept by the stores.
    pub fn to_blob(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Restores an artifact from its stored blob form.
    pub fn from_blob(blob: &str) -> serde_json::Result<Self> {
        serde_json::from_str(blob)
    }
}

//=========================================================================================
// Persisted Records
//=========================================================================================

/// One cached generation, keyed uniquely by its source URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub artifact: QuizArtifact,
}

/// The listing view of a `HistoryRecord`, without the artifact payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HistorySummary {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl From<&HistoryRecord> for HistorySummary {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            id: record.id,
            url: record.url.clone(),
            title: record.title.clone(),
            created_at: record.created_at,
        }
    }
}

/// What callers receive for a quiz: the artifact plus its record metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ResolvedQuiz {
    pub id: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub artifact: QuizArtifact,
}

impl From<HistoryRecord> for ResolvedQuiz {
    fn from(record: HistoryRecord) -> Self {
        Self {
            id: record.id,
            url: record.url,
            created_at: record.created_at,
            artifact: record.artifact,
        }
    }
}

/// Per-client request accounting for the fixed-window rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageWindow {
    pub client_key: String,
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// Title and cleaned body text of a fetched source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub title: String,
    pub text: String,
}


#[cfg(test)]
mod tests {
    use super::fixtures::{artifact, question};
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_artifact_passes_validation() {
        assert_eq!(artifact("Coffee").validate(), Ok(()));
    }

    #[test]
    fn answer_outside_options_is_rejected() {
        let mut a = artifact("Coffee");
        a.quiz.push(question("Ethiopia"));
        assert_eq!(
            a.validate(),
            Err(SchemaViolation::AnswerNotInOptions {
                index: 1,
                answer: "Ethiopia".to_string()
            })
        );
    }

    #[test]
    fn wrong_option_count_is_rejected() {
        let mut a = artifact("Coffee");
        a.quiz[0].options.pop();
        assert_eq!(
            a.validate(),
            Err(SchemaViolation::WrongOptionCount { index: 0, found: 3 })
        );
    }

    #[test]
    fn blank_title_and_empty_quiz_are_rejected() {
        let mut a = artifact("  ");
        assert_eq!(a.validate(), Err(SchemaViolation::EmptyTitle));
        a.title = "Coffee".to_string();
        a.quiz.clear();
        assert_eq!(a.validate(), Err(SchemaViolation::EmptyQuiz));
    }

    #[test]
    fn optional_collections_default_when_missing() {
        let json = r#"{
            "title": "Coffee",
            "summary": "A drink.",
            "quiz": [{
                "question": "q?",
                "options": ["a", "b", "c", "d"],
                "answer": "c",
                "difficulty": "Hard",
                "explanation": "because"
            }]
        }"#;
        let a: QuizArtifact = serde_json::from_str(json).unwrap();
        assert!(a.key_entities.is_empty());
        assert!(a.flashcards.is_empty());
        assert_eq!(a.quiz[0].difficulty, Difficulty::Hard);
        assert_eq!(a.validate(), Ok(()));
    }

    #[test]
    fn resolved_quiz_flattens_artifact_fields() {
        let record = HistoryRecord {
            id: 7,
            url: "https://example.org/Coffee".to_string(),
            title: "Coffee".to_string(),
            created_at: Utc::now(),
            artifact: artifact("Coffee"),
        };
        let value = serde_json::to_value(ResolvedQuiz::from(record)).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["title"], "Coffee");
        assert_eq!(value["quiz"][0]["difficulty"], "medium");
        assert!(value.get("artifact").is_none());
    }

    fn text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 ,.'\"\\\\?-]{0,24}"
    }

    fn difficulty() -> impl Strategy<Value = Difficulty> {
        prop_oneof![
            Just(Difficulty::Easy),
            Just(Difficulty::Medium),
            Just(Difficulty::Hard)
        ]
    }

    fn quiz_question() -> impl Strategy<Value = QuizQuestion> {
        (
            text(),
            prop::collection::vec(text(), OPTIONS_PER_QUESTION),
            0..OPTIONS_PER_QUESTION,
            difficulty(),
            text(),
        )
            .prop_map(|(question, options, pick, difficulty, explanation)| QuizQuestion {
                question,
                answer: options[pick].clone(),
                options,
                difficulty,
                explanation,
            })
    }

    fn quiz_artifact() -> impl Strategy<Value = QuizArtifact> {
        (
            "[A-Za-z][A-Za-z ]{0,16}",
            text(),
            prop::collection::btree_map(text(), prop::collection::vec(text(), 0..4), 0..4),
            prop::collection::vec(text(), 0..5),
            prop::collection::vec(quiz_question(), 1..6),
            prop::collection::vec(text(), 0..5),
            prop::collection::vec(
                (text(), text()).prop_map(|(term, definition)| Flashcard { term, definition }),
                0..5,
            ),
        )
            .prop_map(
                |(title, summary, key_entities, sections, quiz, related_topics, flashcards)| {
                    QuizArtifact {
                        title,
                        summary,
                        key_entities,
                        sections,
                        quiz,
                        related_topics,
                        flashcards,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn blob_round_trip_is_lossless(a in quiz_artifact()) {
            prop_assert_eq!(a.validate(), Ok(()));
            let blob = a.to_blob().unwrap();
            prop_assert_eq!(QuizArtifact::from_blob(&blob).unwrap(), a);
        }
    }
}
