//! Recommendation engine: rule scoring over lab metrics, an optional LLM
//! narrative, and cross-report insights.

pub mod engine;
pub mod helpers;
pub mod insights;
pub mod narrative;
pub mod ollama;
pub mod rules;
pub mod types;

pub use engine::RecommendationEngine;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntelligenceError {
    #[error("Ollama is not running at {0}")]
    OllamaConnection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    OllamaError { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Narrative generation timed out after {0}s")]
    Timeout(u64),

    #[error("Narrative task failed: {0}")]
    Task(String),
}
