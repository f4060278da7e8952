//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;
use wiki_quiz_core::QuizResolver;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<QuizResolver>,
}
