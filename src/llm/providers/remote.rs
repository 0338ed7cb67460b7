use crate::config::LlmConfig;
use crate::llm::providers::{TEMPERATURE, http_client, send_json};
use crate::llm::{LlmError, TextGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_TOKENS: usize = 2000;

/// OpenAI-compatible chat completions endpoint.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let required = |value: &Option<String>, what: &str| {
            value.clone().filter(|v| !v.is_empty()).ok_or_else(|| {
                LlmError::ConfigError(format!("{} is required for remote LLM provider", what))
            })
        };

        Ok(Self {
            client: http_client()?,
            api_url: required(&config.api_url, "API URL")?,
            api_key: required(&config.api_key, "API key")?,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for RemoteLlmProvider {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        debug!("Sending chat completion request to {}", self.api_url);

        let request = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body);
        let reply: ChatResponse = send_json("Chat completion", request).await?;

        reply
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))
    }
}
