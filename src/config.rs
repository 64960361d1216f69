use crate::error::{CoachError, Result};
use crate::llm::{LLMConfig, LLMProvider, ProviderPreference};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const ZAI_BASE_URL: &str = "https://api.z.ai/api/paas/v4/";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const ZAI_DEFAULT_MODEL: &str = "glm-4.6";

/// Configuration for rubric-coach
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider selection and request settings
    pub llm: LLMSettings,

    /// Transcript chunking and rubric extraction
    pub extraction: ExtractionConfig,

    /// Game evaluation
    pub evaluation: EvaluationConfig,

    /// yt-dlp invocation
    pub downloader: DownloaderConfig,

    /// Rubric library location
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMSettings {
    /// Preferred provider (`auto`, `zai`, `openai`)
    pub provider: ProviderPreference,

    /// Model override; provider default when unset
    pub model: Option<String>,

    /// OpenAI API key (usually from `OPENAI_API_KEY`)
    pub openai_api_key: Option<String>,

    /// z.ai API key (usually from `ZAI_API_KEY`)
    pub zai_api_key: Option<String>,

    /// OpenAI chat completions endpoint
    pub openai_endpoint: String,

    /// z.ai API base URL
    pub zai_base_url: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Extra attempts after a failed request
    pub retries: u32,

    /// Pause between attempts in milliseconds
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    pub overlap: usize,

    /// Sampling temperature for extraction
    pub temperature: f32,

    /// Extraction prompt file
    pub prompt_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Sampling temperature for evaluation
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// yt-dlp executable
    pub binary: String,

    /// Subtitle languages in order of preference
    pub languages: Vec<String>,

    /// Timeout for a single subtitle download (seconds)
    pub subtitle_timeout_seconds: u64,

    /// Timeout for metadata and fallback queries (seconds)
    pub metadata_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directory holding `<id>.json` rubric files
    pub dir: PathBuf,
}

impl Default for LLMSettings {
    fn default() -> Self {
        Self {
            provider: ProviderPreference::Auto,
            model: None,
            openai_api_key: None,
            zai_api_key: None,
            openai_endpoint: OPENAI_ENDPOINT.to_string(),
            zai_base_url: ZAI_BASE_URL.to_string(),
            max_tokens: 4000,
            timeout_seconds: 120,
            retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4000,
            overlap: 500,
            temperature: 0.3,
            prompt_file: PathBuf::from("config/prompts/extract_rubric.txt"),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { temperature: 0.4 }
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            languages: vec!["en".to_string(), "en-US".to_string(), "en-GB".to_string()],
            subtitle_timeout_seconds: 60,
            metadata_timeout_seconds: 30,
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("rubric_library"),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl LLMSettings {
    /// Resolve the provider to use: z.ai when preferred (or auto) and keyed,
    /// otherwise OpenAI when keyed, otherwise nothing.
    pub fn resolve(&self) -> Option<LLMConfig> {
        if matches!(self.provider, ProviderPreference::Zai | ProviderPreference::Auto) {
            if let Some(key) = non_empty(&self.zai_api_key) {
                let model = non_empty(&self.model).unwrap_or(ZAI_DEFAULT_MODEL).to_string();
                info!("Using z.ai ({})", model);
                return Some(LLMConfig {
                    provider: LLMProvider::Zai,
                    endpoint: format!("{}/chat/completions", self.zai_base_url.trim_end_matches('/')),
                    api_key: key.to_string(),
                    model,
                    timeout_seconds: self.timeout_seconds,
                });
            }
        }

        if let Some(key) = non_empty(&self.openai_api_key) {
            let model = non_empty(&self.model).unwrap_or(OPENAI_DEFAULT_MODEL).to_string();
            info!("Using OpenAI ({})", model);
            return Some(LLMConfig {
                provider: LLMProvider::OpenAI,
                endpoint: self.openai_endpoint.clone(),
                api_key: key.to_string(),
                model,
                timeout_seconds: self.timeout_seconds,
            });
        }

        warn!("No LLM client configured. Set OPENAI_API_KEY or ZAI_API_KEY.");
        None
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Config {
    /// Load configuration from an explicit path or the default locations,
    /// then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::load_from(explicit, &Self::default_locations(std::env::var("HOME").ok()))?;
        config.apply_env();
        Ok(config)
    }

    /// `rubric-coach.toml`, `config/rubric-coach.toml`, then the per-user file
    pub fn default_locations(home: Option<String>) -> Vec<PathBuf> {
        let mut config_paths = vec![
            PathBuf::from("rubric-coach.toml"),
            PathBuf::from("config/rubric-coach.toml"),
        ];
        if let Some(home) = home {
            config_paths.push(PathBuf::from(home).join(".config/rubric-coach/config.toml"));
        }
        config_paths
    }

    /// An explicit path must load; otherwise the first candidate that parses
    /// wins and broken files are skipped. Falls back to defaults.
    fn load_from(explicit: Option<&Path>, candidates: &[PathBuf]) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Failed to load config file {}: {}", path.display(), e),
            }
        }
        Ok(Self::default())
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path).map_err(|source| CoachError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&config_str)?;
        info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).map_err(|e| CoachError::Configuration(e.to_string()))
    }

    /// Override settings from environment variables
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(key) = var("ZAI_API_KEY") {
            self.llm.zai_api_key = Some(key);
        }
        if let Some(provider) = var("AI_PROVIDER") {
            self.llm.provider = ProviderPreference::parse(&provider);
        }
        if let Some(model) = var("AI_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(base_url) = var("ZAI_BASE_URL") {
            self.llm.zai_base_url = base_url;
        }
        if let Some(dir) = var("RUBRIC_COACH_LIBRARY_DIR") {
            self.library.dir = PathBuf::from(dir);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.extraction.chunk_size == 0 {
            return Err(CoachError::Configuration("chunk_size must be greater than 0".to_string()));
        }
        if self.extraction.overlap >= self.extraction.chunk_size {
            return Err(CoachError::Configuration("overlap must be smaller than chunk_size".to_string()));
        }
        if self.downloader.languages.is_empty() {
            return Err(CoachError::Configuration("at least one subtitle language is required".to_string()));
        }
        for (name, temperature) in [
            ("extraction", self.extraction.temperature),
            ("evaluation", self.evaluation.temperature),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(CoachError::Configuration(format!(
                    "{} temperature must be within 0.0..=2.0",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Rubric Coach Configuration:\n\
            - Provider preference: {:?}\n\
            - Chunk size: {} (overlap {})\n\
            - Retries: {}\n\
            - Subtitle languages: {}\n\
            - Library: {}",
            self.llm.provider,
            self.extraction.chunk_size,
            self.extraction.overlap,
            self.llm.retries,
            self.downloader.languages.join(", "),
            self.library.dir.display()
        )
    }
}
