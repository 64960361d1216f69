//! Error types shared by the extraction and evaluation pipelines

use std::path::PathBuf;

/// Result type for rubric-coach operations
pub type Result<T> = std::result::Result<T, CoachError>;

/// Error types for rubric-coach operations
#[derive(thiserror::Error, Debug)]
pub enum CoachError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid JSON in LLM response: {source}\nContent preview: {preview}")]
    InvalidLlmJson {
        #[source]
        source: serde_json::Error,
        preview: String,
    },

    #[error("LLM response is not a rubric: {0}")]
    InvalidRubric(String),

    #[error("Rubric not found: {0}")]
    RubricNotFound(String),

    #[error("Could not extract video ID from URL: {0}")]
    InvalidUrl(String),

    #[error("Downloader error: {0}")]
    Downloader(String),

    #[error("No transcript available for {0}")]
    NoTranscript(String),

    #[error("Failed to extract rubric from any chunk")]
    ExtractionFailed,

    #[error("LLM not configured. Set OPENAI_API_KEY or ZAI_API_KEY")]
    LlmUnavailable,

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("API fetch not implemented. Export the game first:\n  curl http://localhost:8000/api/game/{profile_id}/{game_id} > game.json")]
    GameFetchUnavailable { profile_id: String, game_id: String },
}

/// First `max_chars` characters of `content`, used in error messages
pub fn preview(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}
