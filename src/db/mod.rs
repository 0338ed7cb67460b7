pub mod db_pool;
pub mod duckdb_store;
pub mod schema_provider;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::models::Row;
use crate::schema::ColumnDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("result conversion error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("result decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("database task failed: {0}")]
    Task(String),
}

/// The relational store as seen by the pipeline. Every call acquires and
/// releases its own connection.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Table names in the configured schema, lexically ordered.
    async fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    /// Column metadata for all of `tables` in one round trip, ordered by
    /// table name then ordinal position.
    async fn describe_tables(
        &self,
        tables: &[String],
    ) -> Result<Vec<(String, ColumnDescriptor)>, StoreError>;

    /// Runs a row-returning statement.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;

    /// Runs a write and returns the affected-row count.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
