use crate::config::RemoteConfig;
use crate::remote::{RemoteError, ToolChannel};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error};

/// JSON-RPC 2.0 over HTTP: each method is POSTed to `{server_url}/{method}`.
pub struct HttpToolChannel {
    client: reqwest::Client,
    server_url: String,
    next_id: AtomicU64,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

impl HttpToolChannel {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            server_url: config.server_url.trim_end_matches('/').to_string(),
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl ToolChannel for HttpToolChannel {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        let url = format!("{}/{}", self.server_url, method);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        debug!("Sending remote request {} (id {})", method, body.id);

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            error!("Remote server responded to {} with status {}", method, response.status());
            return Err(RemoteError::Status {
                method: method.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}
