use crate::chunking::chunk_transcript;
use crate::config::Config;
use crate::error::{CoachError, Result};
use crate::llm::{complete_with_retry, CompletionOptions, LLM};
use crate::rubric::{merge_rubrics, parse_rubric_json, Rubric};
use crate::youtube::{extract_video_id, TranscriptSource};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are an expert AoE IV coach extracting structured rubrics from tutorials.";

/// Knobs for one extraction run
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub chunk_size: usize,
    pub overlap: usize,
    pub options: CompletionOptions,
    pub retries: u32,
    pub retry_backoff: Duration,
}

impl ExtractionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.extraction.chunk_size,
            overlap: config.extraction.overlap,
            options: CompletionOptions {
                temperature: config.extraction.temperature,
                max_tokens: config.llm.max_tokens,
                json_mode: true,
            },
            retries: config.llm.retries,
            retry_backoff: config.llm.retry_backoff(),
        }
    }
}

/// Transcript → chunks → LLM → merged rubric
pub struct RubricExtractor {
    source: Box<dyn TranscriptSource>,
    llm: Box<dyn LLM>,
    prompt: String,
    settings: ExtractionSettings,
}

impl RubricExtractor {
    pub fn new(
        source: Box<dyn TranscriptSource>,
        llm: Box<dyn LLM>,
        prompt: String,
        settings: ExtractionSettings,
    ) -> Self {
        Self {
            source,
            llm,
            prompt,
            settings,
        }
    }

    /// Load the extraction prompt, using the built-in one when the file is missing
    pub async fn load_prompt(path: &Path) -> String {
        if !path.exists() {
            debug!("Prompt file {} not found, using default prompt", path.display());
            return default_prompt().to_string();
        }

        match tokio::fs::read_to_string(path).await {
            Ok(content) if !content.trim().is_empty() => content,
            Ok(_) => {
                warn!("Prompt file {} is empty, using default prompt", path.display());
                default_prompt().to_string()
            }
            Err(e) => {
                warn!("Failed to read prompt file {}: {}, using default prompt", path.display(), e);
                default_prompt().to_string()
            }
        }
    }

    /// Run the full pipeline for one video
    pub async fn extract(&self, url: &str, custom_title: Option<&str>) -> Result<Rubric> {
        extract_video_id(url)?;
        info!("📥 Downloading transcript from: {}", url);

        let metadata = self.source.metadata(url).await;
        info!("📹 Title: {}", metadata.title);
        info!("👤 Author: {}", metadata.author);
        info!("⏱️  Duration: {}", metadata.duration_label());

        let transcript = self
            .source
            .transcript(url)
            .await?
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CoachError::NoTranscript(url.to_string()))?;

        info!("📝 Transcript length: {} characters", transcript.chars().count());

        let chunks = chunk_transcript(&transcript, self.settings.chunk_size, self.settings.overlap);
        info!("🔄 Processing {} chunk(s)...", chunks.len());

        let mut rubrics = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            info!("  Processing chunk {}/{}...", i + 1, chunks.len());
            if let Some(rubric) = self.extract_from_chunk(chunk).await {
                rubrics.push(rubric);
            }
        }

        if rubrics.is_empty() {
            return Err(CoachError::ExtractionFailed);
        }

        if rubrics.len() > 1 {
            info!("🔄 Merging {} chunks...", rubrics.len());
        }
        let mut rubric = merge_rubrics(rubrics);

        rubric.source_url = Some(url.to_string());
        rubric.video_title = Some(metadata.title);
        rubric.video_author = Some(metadata.author);
        rubric.video_duration = Some(Value::from(metadata.duration));

        if let Some(title) = custom_title.filter(|t| !t.is_empty()) {
            rubric.title = title.to_string();
        }

        Ok(rubric)
    }

    /// Extract a rubric from one chunk; failures are logged and yield `None`
    pub async fn extract_from_chunk(&self, chunk: &str) -> Option<Rubric> {
        let prompt = build_chunk_prompt(&self.prompt, chunk);

        let response = match complete_with_retry(
            self.llm.as_ref(),
            &prompt,
            Some(EXTRACTION_SYSTEM_PROMPT),
            &self.settings.options,
            self.settings.retries,
            self.settings.retry_backoff,
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Error: {}", e);
                return None;
            }
        };

        match parse_rubric_json(&response.content) {
            Ok(rubric) => Some(rubric),
            Err(e) => {
                error!("Parse error: {}", e);
                None
            }
        }
    }
}

/// User message for one chunk
pub fn build_chunk_prompt(prompt: &str, chunk: &str) -> String {
    format!("{}\n\n## Transcript\n\n{}\n\n## Extracted Rubric (JSON):", prompt, chunk)
}

fn default_prompt() -> &'static str {
    r#"Extract a structured coaching rubric from this AoE IV tutorial transcript.
Return as JSON with: title, difficulty, archetype, phases (with key_actions, success_criteria, common_mistakes), benchmarks (timings), and decision_points."#
}
