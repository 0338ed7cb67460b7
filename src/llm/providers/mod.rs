pub mod gemini;
pub mod ollama;
pub mod remote;

use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

use crate::llm::LlmError;

/// Sampling temperature shared by every backend.
pub(crate) const TEMPERATURE: f32 = 0.1;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn http_client() -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| LlmError::ConnectionError(e.to_string()))
}

/// Sends a prepared request and decodes the JSON body. Non-success statuses
/// and undecodable bodies are `ResponseError`s carrying the body text.
pub(crate) async fn send_json<T: DeserializeOwned>(
    backend: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, LlmError> {
    let response = request
        .send()
        .await
        .map_err(|e| LlmError::ConnectionError(format!("{} request failed: {}", backend, e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| LlmError::ResponseError(format!("Failed to read {} response body: {}", backend, e)))?;

    if !status.is_success() {
        error!("{} API responded with status code: {} - {}", backend, status, body);
        return Err(LlmError::ResponseError(format!(
            "{} API responded with status code: {}",
            backend, status
        )));
    }

    debug!("Raw {} response: {}", backend, body);
    serde_json::from_str(&body).map_err(|e| {
        error!("Failed to parse {} response: {} - Response was: {}", backend, e, body);
        LlmError::ResponseError(format!("Failed to parse {} response: {}", backend, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::llm::TextGenerator;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    async fn fake_generate(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["stream"], json!(false));
        assert_eq!(body["format"], json!("json"));
        let temperature = body["options"]["temperature"].as_f64().unwrap_or_default();
        assert!((temperature - 0.1).abs() < 1e-6);
        Json(json!({"response": format!("model={}", body["model"].as_str().unwrap_or_default()), "done": true}))
    }

    async fn fake_chat(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Json(json!({"choices": [{"message": {"role": "assistant", "content": format!("{}|{}", auth, body["messages"][0]["content"].as_str().unwrap_or_default())}}]}))
    }

    async fn empty_chat() -> Json<Value> {
        Json(json!({"choices": []}))
    }

    async fn broken() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "boom")
    }

    async fn serve() -> String {
        let app = Router::new()
            .route("/api/generate", post(fake_generate))
            .route("/v1/chat", post(fake_chat))
            .route("/v1/empty", post(empty_chat))
            .route("/broken", post(broken));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(url: String) -> LlmConfig {
        LlmConfig {
            backend: "test".to_string(),
            model: "sqlcoder".to_string(),
            api_key: Some("secret".to_string()),
            api_url: Some(url),
        }
    }

    #[tokio::test]
    async fn test_ollama_sends_options_and_returns_response_text() {
        let base = serve().await;
        let provider = ollama::OllamaProvider::new(&config(format!("{}/api/generate", base))).unwrap();
        assert_eq!(provider.complete("hi").await.unwrap(), "model=sqlcoder");
    }

    #[tokio::test]
    async fn test_chat_completion_uses_bearer_auth() {
        let base = serve().await;
        let provider = remote::RemoteLlmProvider::new(&config(format!("{}/v1/chat", base))).unwrap();
        assert_eq!(provider.complete("hello").await.unwrap(), "Bearer secret|hello");
    }

    #[tokio::test]
    async fn test_chat_completion_without_choices_is_response_error() {
        let base = serve().await;
        let provider = remote::RemoteLlmProvider::new(&config(format!("{}/v1/empty", base))).unwrap();
        let err = provider.complete("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseError(ref m) if m == "No choices in response"));
    }

    #[tokio::test]
    async fn test_error_status_is_response_error() {
        let base = serve().await;
        let provider = ollama::OllamaProvider::new(&config(format!("{}/broken", base))).unwrap();
        let err = provider.complete("hi").await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseError(ref m) if m.contains("500")));
    }

    #[test]
    fn test_remote_provider_requires_url_and_key() {
        let mut cfg = config("http://127.0.0.1:9".to_string());
        cfg.api_key = Some(String::new());
        assert!(matches!(
            remote::RemoteLlmProvider::new(&cfg).err(),
            Some(LlmError::ConfigError(_))
        ));
        cfg.api_key = Some("k".to_string());
        cfg.api_url = None;
        assert!(matches!(
            remote::RemoteLlmProvider::new(&cfg).err(),
            Some(LlmError::ConfigError(_))
        ));
    }
}
