//! Out-of-process execution backend reached through request/response
//! messages keyed by method name (`initialize`, `resources/list`,
//! `resources/read`, `tools/call`).

pub mod http;

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::llm::models::Row;
use crate::schema::SchemaDescriptor;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote handshake failed: {0}")]
    Handshake(String),
    #[error("remote transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote server returned status {status} for {method}")]
    Status { method: String, status: u16 },
    #[error("remote protocol error: {0}")]
    Protocol(String),
    #[error("remote reply to {0} carries no result")]
    MissingResult(String),
}

/// A request/response channel. Returns the reply body; unwrapping the
/// `result` envelope is left to [`RemoteSession`].
#[async_trait]
pub trait ToolChannel: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RemoteError>;
}

/// One logical connection to a remote tool server. The `initialize`
/// handshake runs before the first call and is retried on the next call
/// when it fails.
pub struct RemoteSession {
    channel: Arc<dyn ToolChannel>,
    server_name: String,
    initialized: OnceCell<()>,
}

impl RemoteSession {
    pub fn new(channel: Arc<dyn ToolChannel>, server_name: impl Into<String>) -> Self {
        Self {
            channel,
            server_name: server_name.into(),
            initialized: OnceCell::new(),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    pub async fn ensure_initialized(&self) -> Result<(), RemoteError> {
        self.initialized
            .get_or_try_init(|| async {
                let params = json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {
                        "roots": { "listChanged": true },
                        "sampling": {}
                    },
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                });
                match self.channel.request("initialize", params).await {
                    Ok(_) => {
                        info!("Remote server '{}' initialized", self.server_name);
                        Ok(())
                    }
                    Err(e) => {
                        error!("Failed to initialize remote server '{}': {}", self.server_name, e);
                        Err(RemoteError::Handshake(e.to_string()))
                    }
                }
            })
            .await
            .map(|_| ())
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        self.ensure_initialized().await?;
        let reply = self.channel.request(method, params).await?;
        unwrap_result(method, reply)
    }

    pub async fn list_resources(&self) -> Result<Vec<Value>, RemoteError> {
        let result = self.call("resources/list", json!({})).await?;
        Ok(result
            .get("resources")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Text of the first content block, if the resource has any.
    pub async fn read_resource(&self, uri: &str) -> Result<Option<String>, RemoteError> {
        let result = self.call("resources/read", json!({ "uri": uri })).await?;
        Ok(result
            .get("contents")
            .and_then(Value::as_array)
            .and_then(|contents| contents.first())
            .map(|first| {
                first
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            }))
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, RemoteError> {
        self.call("tools/call", json!({ "name": name, "arguments": arguments }))
            .await
    }

    pub async fn fetch_schema(&self) -> Result<SchemaDescriptor, RemoteError> {
        let result = self.call_tool("get_schema", json!({})).await?;
        SchemaDescriptor::from_json(&result)
            .ok_or_else(|| RemoteError::Protocol("unrecognised schema payload".to_string()))
    }

    /// Rows from `result.data`; a result without `data` is an empty row set.
    pub async fn execute_query(&self, sql: &str) -> Result<Vec<Row>, RemoteError> {
        let result = self.call_tool("execute_query", json!({ "query": sql })).await?;
        match result.get("data") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row.clone()),
                    other => Err(RemoteError::Protocol(format!(
                        "row is not an object: {}",
                        other
                    ))),
                })
                .collect(),
            Some(other) => Err(RemoteError::Protocol(format!(
                "data is not an array: {}",
                other
            ))),
        }
    }
}

fn unwrap_result(method: &str, mut reply: Value) -> Result<Value, RemoteError> {
    if let Some(err) = reply.get("error").filter(|e| !e.is_null()) {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(RemoteError::Protocol(message));
    }
    match reply.get_mut("result").map(Value::take) {
        Some(Value::Null) | None => Err(RemoteError::MissingResult(method.to_string())),
        Some(result) => Ok(result),
    }
}
