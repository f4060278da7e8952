pub mod db;
pub mod quiz_llm;
pub mod wikipedia;

pub use db::DbAdapter;
pub use quiz_llm::OpenAiQuizAdapter;
pub use wikipedia::WikipediaExtractor;
