use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// A single completion request: one user message, optional system prompt
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub user: String,
    /// Pinned to 0.0 by the pipeline for reproducible output
    pub temperature: f64,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            user: user.into(),
            temperature: 0.0,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Anything that turns a prompt into free-form text.
///
/// Implementations report network and HTTP failures as
/// [`PipelineError::TransientCall`] and blank responses as
/// [`PipelineError::EmptyResponse`]; both are retried by the caller.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Supported completion backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions
    #[default]
    Openai,
    /// Anthropic messages API
    Anthropic,
}

impl ProviderKind {
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Build a client for this provider from environment credentials
    pub fn client_from_env(&self) -> Result<Box<dyn CompletionService>> {
        let api_key = std::env::var(self.env_var()).map_err(|_| {
            PipelineError::Config(format!("{} environment variable not set", self.env_var()))
        })?;

        Ok(match self {
            ProviderKind::Openai => {
                let base_url = std::env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| OpenAiClient::DEFAULT_BASE_URL.to_string());
                Box::new(OpenAiClient::new(api_key, base_url))
            }
            ProviderKind::Anthropic => Box::new(AnthropicClient::new(api_key)),
        })
    }
}

/// OpenAI-compatible chat completions client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(Message {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: request.user.clone(),
        });

        let body = ChatRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::TransientCall(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::TransientCall(format!(
                "API error: {} - {}",
                status, body
            )));
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::TransientCall(format!("unreadable response: {}", e)))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        non_empty(content)
    }
}

/// Anthropic messages API client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            max_tokens: 8192,
        }
    }
}

#[async_trait]
impl CompletionService for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = AnthropicRequest {
            model: request.model.clone(),
            max_tokens: self.max_tokens,
            temperature: Some(request.temperature),
            system: request.system.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.user.clone(),
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::TransientCall(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::TransientCall(format!(
                "Anthropic API error: {} - {}",
                status, body
            )));
        }

        let response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::TransientCall(format!("unreadable response: {}", e)))?;

        let text = response
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        non_empty(text)
    }
}

fn non_empty(text: String) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(PipelineError::EmptyResponse)
    } else {
        Ok(trimmed.to_string())
    }
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}
