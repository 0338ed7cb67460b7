pub mod models;
pub mod protocol;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

/// The generative text service: a prompt in, raw completion text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

pub struct LlmManager {
    generator: Box<dyn TextGenerator>,
    backend: String,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let generator: Box<dyn TextGenerator> = match config.backend.as_str() {
            "gemini" => Box::new(providers::gemini::GeminiProvider::new(config)?),
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self {
            generator,
            backend: config.backend.clone(),
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn into_shared(self) -> Arc<dyn TextGenerator> {
        Arc::new(self)
    }
}

#[async_trait]
impl TextGenerator for LlmManager {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.generator.complete(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: &str) -> LlmConfig {
        LlmConfig {
            backend: backend.to_string(),
            model: "test-model".to_string(),
            api_key: Some("key".to_string()),
            api_url: Some("http://127.0.0.1:9/v1/chat/completions".to_string()),
        }
    }

    #[test]
    fn test_known_backends_build() {
        for backend in ["gemini", "remote", "ollama"] {
            let manager = LlmManager::new(&config(backend)).unwrap();
            assert_eq!(manager.backend(), backend);
        }
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let err = LlmManager::new(&config("local")).err().unwrap();
        assert!(matches!(err, LlmError::ConfigError(_)));
        assert!(err.to_string().contains("Unsupported LLM backend: local"));
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let mut cfg = config("gemini");
        cfg.api_key = None;
        assert!(matches!(
            LlmManager::new(&cfg).err(),
            Some(LlmError::ConfigError(_))
        ));
    }
}
