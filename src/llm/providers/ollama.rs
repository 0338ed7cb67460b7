use crate::config::LlmConfig;
use crate::llm::providers::{TEMPERATURE, http_client, send_json};
use crate::llm::{LlmError, TextGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DEFAULT_URL: &str = "http://localhost:11434/api/generate";

/// Local Ollama server, non-streaming `/api/generate`.
pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    /// Constrains the completion to a JSON value.
    format: &'static str,
    options: Options,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client()?,
            api_url: config.api_url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaProvider {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        info!("Sending request to Ollama with model: {}", self.model);

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: Options {
                temperature: TEMPERATURE,
            },
        };

        let reply: GenerateResponse =
            send_json("Ollama", self.client.post(&self.api_url).json(&body)).await?;

        if !reply.done {
            debug!("Ollama reported an unfinished generation");
        }
        Ok(reply.response)
    }
}
