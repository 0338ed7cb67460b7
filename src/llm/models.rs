use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One row of a result set, keyed by column name in result order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Statement kind the caller asks the generative service to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    #[value(name = "SELECT")]
    Select,
    #[value(name = "INSERT")]
    Insert,
    #[value(name = "UPDATE")]
    Update,
    #[value(name = "DELETE")]
    Delete,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        }
    }

    pub fn returns_rows(&self) -> bool {
        matches!(self, StatementKind::Select)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// A single natural-language request to the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub text: String,
    pub kind: StatementKind,
    pub execute: bool,
}

impl GenerationRequest {
    pub fn select(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: StatementKind::Select,
            execute: true,
        }
    }

    pub fn with_execute(mut self, execute: bool) -> Self {
        self.execute = execute;
        self
    }

    pub fn with_kind(mut self, kind: StatementKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Why a pipeline invocation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    SchemaUnavailable,
    GenerationFailed,
    EmptyQuery,
    PolicyRejected,
    ExecutionFailed,
}

// Final outcome of generate (and optionally execute)
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub success: bool,
    pub sql_query: String,
    pub explanation: String,
    pub data: Option<Vec<Row>>,
    pub error: Option<String>,
    pub failure: Option<FailureReason>,
    #[serde(with = "duration_secs")]
    pub execution_time: Option<Duration>,
    pub row_count: Option<usize>,
    pub confidence: f64,
    pub tables_used: Vec<String>,
}

impl GenerationResult {
    pub fn failed(
        reason: FailureReason,
        sql_query: impl Into<String>,
        explanation: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            sql_query: sql_query.into(),
            explanation: explanation.into(),
            data: None,
            error: Some(error.into()),
            failure: Some(reason),
            execution_time: None,
            row_count: None,
            confidence: 0.0,
            tables_used: Vec::new(),
        }
    }
}

/// Structured fields of a `generate` reply from the generative service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSql {
    pub sql_query: String,
    pub explanation: String,
    pub confidence: f64,
    pub tables_used: Vec<String>,
}

/// Structured fields of an `improve` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovedSql {
    pub improved_sql: String,
    pub changes_made: String,
    pub explanation: String,
    pub confidence: f64,
    pub context_understood: String,
}

// Outcome of the refinement path
#[derive(Debug, Clone, Serialize)]
pub struct ImprovementResult {
    pub success: bool,
    pub sql_query: String,
    pub changes_made: String,
    pub explanation: String,
    pub confidence: f64,
    pub context_understood: String,
    pub error: Option<String>,
    pub failure: Option<FailureReason>,
}

impl ImprovementResult {
    pub fn failed(
        reason: FailureReason,
        current_sql: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            sql_query: current_sql.into(),
            changes_made: String::new(),
            explanation: String::new(),
            confidence: 0.0,
            context_understood: String::new(),
            error: Some(error.into()),
            failure: Some(reason),
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }
}
