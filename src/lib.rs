//! Rubric Coach
//!
//! Turns AoE IV tutorial videos into structured coaching rubrics and grades
//! exported games against them with an LLM.

pub mod chunking;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod extraction;
pub mod library;
pub mod llm;
pub mod rubric;
pub mod youtube;

// Re-export main types for easy access
pub use crate::config::Config;
pub use crate::error::{CoachError, Result};
pub use crate::evaluation::{EvaluationOutcome, EvaluationRecord, GameData, GameEvaluator};
pub use crate::extraction::{ExtractionSettings, RubricExtractor};
pub use crate::library::{RubricLibrary, StoredRubric};
pub use crate::llm::{create_llm, LLMConfig, LLMProvider, LLM};
pub use crate::rubric::{format_rubric_for_display, generate_rubric_id, Rubric};
pub use crate::youtube::{TranscriptSource, VideoMetadata, YtDlpSource};
