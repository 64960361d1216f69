use super::{ChatMessage, CompletionOptions, LLMConfig, LLMProvider, LLMResponse, Usage, LLM};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<Thinking>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct Thinking {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn build_request(
    provider: LLMProvider,
    model: &str,
    messages: Vec<ChatMessage>,
    options: &CompletionOptions,
) -> ChatCompletionRequest {
    let response_format = match provider {
        LLMProvider::OpenAI if options.json_mode => Some(ResponseFormat { kind: "json_object" }),
        _ => None,
    };
    let thinking = match provider {
        LLMProvider::Zai => Some(Thinking { kind: "disabled" }),
        LLMProvider::OpenAI => None,
    };

    ChatCompletionRequest {
        model: model.to_string(),
        messages,
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        response_format,
        thinking,
    }
}

fn into_llm_response(response: ChatCompletionResponse, provider: LLMProvider) -> Result<LLMResponse> {
    let message = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No response from {:?}", provider))?
        .message;

    // z.ai may leave content empty and put the answer in reasoning_content
    let content = match message.content {
        Some(content) if !content.is_empty() => content,
        _ => message.reasoning_content.unwrap_or_default(),
    };

    let usage = response
        .usage
        .map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(LLMResponse { content, usage })
}

fn build_client(config: &LLMConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?)
}

/// Chat-completions client for any OpenAI-compatible provider (OpenAI, z.ai).
/// Per-provider request differences live in `build_request`.
pub struct ChatCompletionsProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

impl ChatCompletionsProvider {
    pub fn new(config: LLMConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            let name = match config.provider {
                LLMProvider::OpenAI => "OpenAI",
                LLMProvider::Zai => "z.ai",
            };
            return Err(anyhow!("{} API key required", name));
        }

        let client = build_client(&config)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl LLM for ChatCompletionsProvider {
    async fn chat(&self, messages: Vec<ChatMessage>, options: &CompletionOptions) -> Result<LLMResponse> {
        let config = &self.config;
        let request = build_request(config.provider, &config.model, messages, options);

        debug!("Sending request to {:?} at {}", config.provider, config.endpoint);

        let response = self
            .client
            .post(&config.endpoint)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{:?} API error {}: {}", config.provider, status, text));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let llm_response = into_llm_response(completion, config.provider)?;

        debug!(
            "{:?} completion: {} prompt tokens, {} completion tokens",
            config.provider, llm_response.usage.prompt_tokens, llm_response.usage.completion_tokens
        );

        Ok(llm_response)
    }

    async fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn provider_type(&self) -> LLMProvider {
        self.config.provider
    }
}
