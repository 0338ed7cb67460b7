#![allow(dead_code)]

use async_trait::async_trait;
use nl_sql::config::SchemaConfig;
use nl_sql::db::RelationalStore;
use nl_sql::db::duckdb_store::DuckDbStore;
use nl_sql::execution::ExecutionMode;
use nl_sql::llm::{LlmError, TextGenerator};
use nl_sql::pipeline::QueryGenerator;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Generative service double: replays queued replies, records prompts.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::ConnectionError("no scripted reply left".to_string()))
    }
}

pub async fn store_with(statements: &[&str]) -> Arc<dyn RelationalStore> {
    let store = DuckDbStore::in_memory().unwrap();
    for sql in statements {
        store.execute(sql, &[]).await.unwrap();
    }
    Arc::new(store)
}

pub async fn orders_store() -> Arc<dyn RelationalStore> {
    store_with(&[
        "CREATE TABLE orders (id INTEGER NOT NULL, total DOUBLE, customer VARCHAR)",
        "INSERT INTO orders VALUES (1, 10.5, 'ada'), (2, 99.0, 'grace'), (3, 42.0, 'ada')",
    ])
    .await
}

pub fn generator(
    mode: ExecutionMode,
    store: Arc<dyn RelationalStore>,
    llm: Arc<ScriptedLlm>,
) -> QueryGenerator {
    QueryGenerator::new(mode, store, llm, None, SchemaConfig::default())
}

pub fn reply(sql: &str, explanation: &str, tables: &[&str]) -> String {
    serde_json::json!({
        "sql_query": sql,
        "explanation": explanation,
        "confidence": 0.92,
        "tables_used": tables,
    })
    .to_string()
}
