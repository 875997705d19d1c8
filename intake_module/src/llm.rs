//! Text-generation backends used by the delegated extractor.
//!
//! Configuration:
//! - `OPENAI_API_KEY` / `OPENAI_API_URL`: OpenAI chat completions
//! - `GEMINI_API_KEY` / `GEMINI_API_URL`: Google Gemini `generateContent`
//! - `LLM_MODEL`: model override (default: `gpt-4o-mini` / `gemini-1.5-flash`)
//! - `LLM_TIMEOUT_SECS`: request timeout (default: 30)

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default OpenAI API URL
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default Gemini API host
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_COMPLETION_TOKENS: u32 = 512;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("failed to parse response: {0}")]
    Decode(String),
    #[error("{0} returned no content")]
    EmptyContent(&'static str),
}

/// Something that turns a prompt into text.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
    fn provider(&self) -> &'static str;
}

/// Connection settings shared by both backends.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub timeout: Duration,
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn check_status(
    provider: &'static str,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, LlmError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    Err(LlmError::Status {
        provider,
        status,
        body,
    })
}

// ============================================================================
// OpenAI
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    config: LlmConfig,
    client: Client,
}

impl OpenAiGenerator {
    pub fn new(config: LlmConfig) -> Self {
        let client = build_client(config.timeout);
        Self { config, client }
    }
}

impl TextGenerator for OpenAiGenerator {
    fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));
        let request = OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                OpenAIChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                OpenAIChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_completion_tokens: MAX_COMPLETION_TOKENS,
        };

        debug!("Calling OpenAI: {} with model {}", url, self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let parsed: OpenAIChatResponse = check_status(self.provider(), response)?
            .json()
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyContent(self.provider()));
        }
        Ok(content)
    }

    fn provider(&self) -> &'static str {
        "openai"
    }
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIChatMessage>,
    max_completion_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIChatResponse {
    #[serde(default)]
    choices: Vec<OpenAIChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIChatChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// Gemini
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    config: LlmConfig,
    client: Client,
}

impl GeminiGenerator {
    pub fn new(config: LlmConfig) -> Self {
        let client = build_client(config.timeout);
        Self { config, client }
    }
}

impl TextGenerator for GeminiGenerator {
    fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_url.trim_end_matches('/'),
            self.config.model
        );
        let request = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: system.to_string(),
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        debug!("Calling Gemini: {}", url);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let parsed: GeminiResponse = check_status(self.provider(), response)?
            .json()
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let content: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyContent(self.provider()));
        }
        Ok(content)
    }

    fn provider(&self) -> &'static str {
        "gemini"
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}
