//! Prompt construction and defensive reply parsing for the generative service.
//!
//! Every reply is classified into a [`ServiceReply`]: a JSON object
//! (`Structured`), a single SQL-looking line salvaged from prose
//! (`Fallback`), or nothing usable (`Unparseable`). Callers match on all three.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::models::{GeneratedSql, ImprovedSql, StatementKind};
use super::{LlmError, TextGenerator};

pub const FALLBACK_CONFIDENCE: f64 = 0.5;
pub const FALLBACK_EXPLANATION: &str = "Parsed from non-JSON response";

/// Keys of every reply shape the prompts ask for.
const REPLY_KEYS: &[&str] = &[
    "sql_query",
    "improved_sql",
    "selected_tables",
    "tables_used",
    "changes_made",
];

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?```$").expect("valid fence regex")
});

// Whole words only: "reselect" or "updates_table" in prose is not SQL.
static SQL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(SELECT|INSERT|UPDATE|DELETE)\b").expect("valid keyword regex")
});

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceReply<T> {
    Structured(T),
    /// Raw SQL guess salvaged by line scanning.
    Fallback(String),
    /// Neither JSON nor any SQL-looking line; carries the raw reply.
    Unparseable(String),
}

impl<T> ServiceReply<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> ServiceReply<U> {
        match self {
            ServiceReply::Structured(t) => ServiceReply::Structured(f(t)),
            ServiceReply::Fallback(sql) => ServiceReply::Fallback(sql),
            ServiceReply::Unparseable(raw) => ServiceReply::Unparseable(raw),
        }
    }
}

/// Removes one surrounding Markdown code fence, with or without a language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Parses a raw completion into a JSON object, a salvaged SQL line, or neither.
pub fn parse_reply(text: &str) -> ServiceReply<Map<String, Value>> {
    let body = strip_code_fence(text);

    if let Some(object) = parse_object(body) {
        return ServiceReply::Structured(object);
    }

    warn!("Generative service reply is not a JSON object, scanning lines for SQL");
    match body.lines().find(|line| SQL_LINE.is_match(line)) {
        Some(line) => ServiceReply::Fallback(line.trim().to_string()),
        None => ServiceReply::Unparseable(text.to_string()),
    }
}

fn parse_object(body: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body) {
        return Some(object);
    }
    // Prose around a single JSON object. The object must look like a reply,
    // otherwise a brace literal inside a SQL line would shadow the line scan.
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&body[start..=end]) {
        Ok(Value::Object(object)) if REPLY_KEYS.iter().any(|k| object.contains_key(*k)) => {
            Some(object)
        }
        _ => None,
    }
}

pub(crate) fn text_field(object: &Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub(crate) fn list_field(object: &Map<String, Value>, key: &str) -> Vec<String> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Confidence as a number or numeric string, clamped to [0, 1].
pub(crate) fn confidence_field(object: &Map<String, Value>, key: &str) -> f64 {
    let raw = match object.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

impl GeneratedSql {
    fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            sql_query: text_field(object, "sql_query"),
            explanation: text_field(object, "explanation"),
            confidence: confidence_field(object, "confidence"),
            tables_used: list_field(object, "tables_used"),
        }
    }

    pub fn from_fallback(sql: impl Into<String>) -> Self {
        Self {
            sql_query: sql.into(),
            explanation: FALLBACK_EXPLANATION.to_string(),
            confidence: FALLBACK_CONFIDENCE,
            tables_used: Vec::new(),
        }
    }
}

impl ImprovedSql {
    // A reply without `improved_sql` means "keep the current statement".
    fn from_object(object: &Map<String, Value>, current_sql: &str) -> Self {
        let improved = text_field(object, "improved_sql");
        Self {
            improved_sql: if improved.trim().is_empty() {
                current_sql.to_string()
            } else {
                improved
            },
            changes_made: text_field(object, "changes_made"),
            explanation: text_field(object, "explanation"),
            confidence: confidence_field(object, "confidence"),
            context_understood: text_field(object, "context_understood"),
        }
    }

    pub fn from_fallback(sql: impl Into<String>) -> Self {
        Self {
            improved_sql: sql.into(),
            changes_made: String::new(),
            explanation: FALLBACK_EXPLANATION.to_string(),
            confidence: FALLBACK_CONFIDENCE,
            context_understood: String::new(),
        }
    }
}

pub fn generation_prompt(
    dialect: &str,
    user_query: &str,
    schema_context: &str,
    kind: StatementKind,
) -> String {
    format!(
        r#"
You are an expert SQL query generator. Your task is to convert natural language requests into accurate {dialect} queries.

{schema_context}

User Request: "{user_query}"
Expected Query Type: {kind}

Instructions:
1. Generate a {dialect}-compatible SQL query that fulfills the user's request
2. Use only the tables and columns from the provided schema
3. Follow {dialect} syntax and best practices
4. Include appropriate WHERE clauses, JOINs, and other necessary SQL constructs
5. For SELECT queries, choose appropriate columns based on the request
6. Ensure the query is safe and doesn't include any harmful operations

Please respond with a JSON object containing:
{{
    "sql_query": "The generated SQL query",
    "explanation": "Brief explanation of what the query does",
    "confidence": 0.95,
    "tables_used": ["list", "of", "table", "names", "used"]
}}

Only return the JSON object, no additional text.
"#
    )
}

pub fn improvement_prompt(
    current_sql: &str,
    improvement_request: &str,
    schema_context: &str,
    conversation_context: &str,
) -> String {
    format!(
        r#"
You are an expert SQL developer. The user has an existing SQL query and wants to improve it. You have access to the conversation history to understand the context better.

CONVERSATION HISTORY:
{conversation_context}

CURRENT SQL:
{current_sql}

USER REQUEST FOR IMPROVEMENT:
"{improvement_request}"

AVAILABLE SCHEMA:
{schema_context}

Please analyze the conversation history, current SQL, and the user's improvement request, then provide an improved version of the SQL query.

Consider:
1. The original intent from the conversation history
2. Previous modifications that were made
3. The specific improvement request
4. How this fits into the overall conversation flow

Respond with a JSON object containing:
{{
    "improved_sql": "The improved SQL query",
    "changes_made": "Description of what changes were made",
    "explanation": "Why these changes improve the query and how they relate to the conversation",
    "confidence": 0.95,
    "context_understood": "Brief summary of what you understood from the conversation history"
}}

Only return the JSON object, no additional text.
"#
    )
}

/// Builds prompts, calls the generative service, and classifies its replies.
pub struct SqlProtocol {
    generator: Arc<dyn TextGenerator>,
    dialect: String,
}

impl SqlProtocol {
    pub fn new(generator: Arc<dyn TextGenerator>, dialect: impl Into<String>) -> Self {
        Self {
            generator,
            dialect: dialect.into(),
        }
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    pub async fn generate(
        &self,
        user_query: &str,
        schema_context: &str,
        kind: StatementKind,
    ) -> Result<ServiceReply<GeneratedSql>, LlmError> {
        let prompt = generation_prompt(&self.dialect, user_query, schema_context, kind);
        info!("Requesting {} generation ({} prompt chars)", kind, prompt.len());

        let raw = self.generator.complete(&prompt).await?;
        debug!("Generation reply: {}", raw);

        Ok(parse_reply(&raw).map(|object| GeneratedSql::from_object(&object)))
    }

    pub async fn improve(
        &self,
        current_sql: &str,
        improvement_request: &str,
        schema_context: &str,
        conversation_context: &str,
    ) -> Result<ServiceReply<ImprovedSql>, LlmError> {
        let prompt = improvement_prompt(
            current_sql,
            improvement_request,
            schema_context,
            conversation_context,
        );
        info!("Requesting SQL improvement ({} prompt chars)", prompt.len());

        let raw = self.generator.complete(&prompt).await?;
        debug!("Improvement reply: {}", raw);

        Ok(parse_reply(&raw).map(|object| ImprovedSql::from_object(&object, current_sql)))
    }
}
