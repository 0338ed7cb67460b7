mod common;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use common::{ScriptedLlm, orders_store, reply};
use nl_sql::config::{RemoteConfig, SchemaConfig};
use nl_sql::execution::ExecutionMode;
use nl_sql::llm::models::{FailureReason, GenerationRequest};
use nl_sql::pipeline::QueryGenerator;
use nl_sql::remote::http::HttpToolChannel;
use nl_sql::remote::{RemoteError, RemoteSession};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

type Calls = Arc<Mutex<Vec<Value>>>;

async fn initialize(State(calls): State<Calls>, Json(body): Json<Value>) -> Json<Value> {
    calls.lock().unwrap().push(body.clone());
    Json(json!({"jsonrpc": "2.0", "id": body["id"], "result": {"serverInfo": {"name": "fake"}}}))
}

async fn refuse(State(calls): State<Calls>, Json(body): Json<Value>) -> StatusCode {
    calls.lock().unwrap().push(body);
    StatusCode::SERVICE_UNAVAILABLE
}

async fn tools_call(State(calls): State<Calls>, Json(body): Json<Value>) -> Json<Value> {
    calls.lock().unwrap().push(body.clone());
    let result = match body["params"]["name"].as_str() {
        Some("execute_query") => json!({"data": [
            {"id": 7, "total": 12.5},
            {"id": 8, "total": 3.0}
        ]}),
        Some("get_schema") => json!({"schema": {"remote_orders": [
            {"column_name": "id", "data_type": "integer", "is_nullable": "NO"},
            {"column_name": "total", "data_type": "numeric", "is_nullable": "YES"}
        ]}}),
        _ => return Json(json!({"jsonrpc": "2.0", "id": body["id"], "error": {"code": -32601, "message": "unknown tool"}})),
    };
    Json(json!({"jsonrpc": "2.0", "id": body["id"], "result": result}))
}

async fn serve(healthy: bool) -> (String, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let router = if healthy {
        Router::new().route("/initialize", post(initialize))
    } else {
        Router::new().route("/initialize", post(refuse))
    };
    let app = router
        .route("/tools/call", post(tools_call))
        .with_state(calls.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), calls)
}

fn session(url: &str) -> Arc<RemoteSession> {
    let config = RemoteConfig {
        server_url: url.to_string(),
        server_name: "fake".to_string(),
        timeout_secs: 5,
    };
    let channel = HttpToolChannel::new(&config).unwrap();
    Arc::new(RemoteSession::new(Arc::new(channel), "fake"))
}

#[tokio::test]
async fn execute_query_round_trip() {
    let (url, calls) = serve(true).await;
    let session = session(&url);

    let rows = session.execute_query("SELECT id, total FROM orders").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], json!(7));

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0]["method"], json!("initialize"));
    assert_eq!(calls[0]["jsonrpc"], json!("2.0"));
    assert_eq!(calls[0]["params"]["protocolVersion"], json!("2024-11-05"));
    assert_eq!(calls[1]["params"]["arguments"]["query"], json!("SELECT id, total FROM orders"));
    assert_ne!(calls[0]["id"], calls[1]["id"]);
}

#[tokio::test]
async fn unknown_tool_is_a_protocol_error() {
    let (url, _calls) = serve(true).await;
    let err = session(&url).call_tool("nope", json!({})).await.unwrap_err();
    assert!(matches!(err, RemoteError::Protocol(ref m) if m == "unknown tool"));
}

#[tokio::test]
async fn failed_initialize_is_typed_and_blocks_tool_calls() {
    let (url, calls) = serve(false).await;
    let session = session(&url);

    let err = session.execute_query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, RemoteError::Handshake(_)));

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["method"], json!("initialize"));
}

#[tokio::test]
async fn remote_pipeline_uses_remote_schema_and_rows() {
    let (url, _calls) = serve(true).await;
    let llm = ScriptedLlm::new([reply(
        "select id, total from remote_orders",
        "Remote orders",
        &["remote_orders"],
    )]);
    let generator = QueryGenerator::new(
        ExecutionMode::RemoteProtocol,
        orders_store().await,
        llm.clone(),
        Some(session(&url)),
        SchemaConfig::default(),
    );

    let result = generator
        .generate(&GenerationRequest::select("remote orders"))
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.row_count, Some(2));
    assert!(llm.prompts()[0].contains("Table: remote_orders"));
    assert!(llm.prompts()[0].contains("  - id (integer, nullable: NO)"));
}

#[tokio::test]
async fn remote_pipeline_reports_handshake_failure_without_switching_modes() {
    let (url, calls) = serve(false).await;
    let llm = ScriptedLlm::new([reply("select * from orders", "Orders", &["orders"])]);
    let generator = QueryGenerator::new(
        ExecutionMode::RemoteProtocol,
        orders_store().await,
        llm.clone(),
        Some(session(&url)),
        SchemaConfig::default(),
    );

    let result = generator.generate(&GenerationRequest::select("orders")).await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureReason::ExecutionFailed));
    assert!(result.data.is_none());
    assert!(result.execution_time.is_some());
    assert!(llm.prompts()[0].contains("Table: orders"));
    assert_eq!(generator.execution_mode(), ExecutionMode::RemoteProtocol);
    assert_eq!(calls.lock().unwrap().len(), 2);
}
