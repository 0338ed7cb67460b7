use arrow::json::WriterBuilder;
use arrow::json::writer::JsonArray;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use duckdb::{Connection, params_from_iter, types::Value as DuckValue};
use r2d2::Pool;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

use super::db_pool::DuckDBConnectionManager;
use super::{RelationalStore, StoreError};
use crate::config::DatabaseConfig;
use crate::llm::models::Row;
use crate::schema::ColumnDescriptor;

/// [`RelationalStore`] over a pooled DuckDB database. Each call runs on the
/// blocking pool with a connection checked out for that call only.
#[derive(Clone)]
pub struct DuckDbStore {
    pool: Pool<DuckDBConnectionManager>,
    schema: String,
}

impl DuckDbStore {
    pub fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let manager = DuckDBConnectionManager::open(&config.connection_string)?;
        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .build(manager)?;
        info!(
            "Opened DuckDB store '{}' (pool size {}, schema '{}')",
            config.connection_string, config.pool_size, config.schema
        );
        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(&DatabaseConfig {
            connection_string: ":memory:".to_string(),
            ..DatabaseConfig::default()
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Runs `f` on a blocking thread with a pooled connection. The connection
    /// goes back to the pool when `f` returns, on success or error.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn bind(params: &[Value]) -> Vec<DuckValue> {
    params
        .iter()
        .map(|value| match value {
            Value::Null => DuckValue::Null,
            Value::Bool(b) => DuckValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => DuckValue::BigInt(i),
                None => DuckValue::Double(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => DuckValue::Text(s.clone()),
            other => DuckValue::Text(other.to_string()),
        })
        .collect()
}

/// Renders record batches as JSON objects keyed by column name, nulls kept.
fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Row>, StoreError> {
    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer.write_batches(&refs)?;
    writer.finish()?;

    let buffer = writer.into_inner();
    if buffer.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(&buffer)?)
}

#[async_trait]
impl RelationalStore for DuckDbStore {
    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let schema = self.schema.clone();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = ? ORDER BY table_name",
            )?;
            let names = stmt
                .query_map([&schema], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn describe_tables(
        &self,
        tables: &[String],
    ) -> Result<Vec<(String, ColumnDescriptor)>, StoreError> {
        if tables.is_empty() {
            return Ok(Vec::new());
        }

        let schema = self.schema.clone();
        let tables = tables.to_vec();
        self.with_connection(move |conn| {
            let placeholders = vec!["?"; tables.len()].join(", ");
            let sql = format!(
                "SELECT table_name, column_name, data_type, is_nullable, \
                        column_default, character_maximum_length \
                 FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name IN ({}) \
                 ORDER BY table_name, ordinal_position",
                placeholders
            );

            let mut stmt = conn.prepare(&sql)?;
            let params = std::iter::once(&schema).chain(tables.iter());
            let columns = stmt
                .query_map(params_from_iter(params), |row| {
                    let table: String = row.get(0)?;
                    let nullable: String = row.get(3)?;
                    let max_length: Option<i64> = row.get(5)?;
                    Ok((
                        table,
                        ColumnDescriptor {
                            name: row.get(1)?,
                            data_type: row.get(2)?,
                            nullable: !nullable.eq_ignore_ascii_case("NO"),
                            default: row.get(4)?,
                            max_length: max_length.and_then(|n| u32::try_from(n).ok()),
                        },
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            debug!("Described {} columns across {} tables", columns.len(), tables.len());
            Ok(columns)
        })
        .await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let sql = sql.to_string();
        let params = bind(params);
        self.with_connection(move |conn| {
            let start = Instant::now();
            let mut stmt = conn.prepare(&sql)?;
            let batches: Vec<RecordBatch> = stmt.query_arrow(params_from_iter(params))?.collect();
            let rows = batches_to_rows(&batches)?;
            debug!("Query returned {} rows in {:?}", rows.len(), start.elapsed());
            Ok(rows)
        })
        .await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, StoreError> {
        let sql = sql.to_string();
        let params = bind(params);
        self.with_connection(move |conn| Ok(conn.execute(&sql, params_from_iter(params))?))
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))?;
            Ok(())
        })
        .await
    }
}
