use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::db::RelationalStore;
use crate::llm::models::{Row, StatementKind};
use crate::remote::RemoteSession;

/// Where a validated statement is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Against the relational store through the connection pool.
    #[value(name = "direct")]
    Direct,
    /// Through the remote tool channel.
    #[serde(rename = "remote")]
    #[value(name = "remote")]
    RemoteProtocol,
    /// Never executed.
    #[value(name = "dry-run")]
    DryRun,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Direct => "direct",
            ExecutionMode::RemoteProtocol => "remote",
            ExecutionMode::DryRun => "dry-run",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub rows: Option<Vec<Row>>,
    pub row_count: Option<usize>,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    fn failed(elapsed: Duration, error: String) -> Self {
        Self {
            elapsed,
            error: Some(error),
            ..Self::default()
        }
    }
}

pub struct ExecutionDispatcher {
    store: Arc<dyn RelationalStore>,
    remote: Option<Arc<RemoteSession>>,
}

impl ExecutionDispatcher {
    pub fn new(store: Arc<dyn RelationalStore>, remote: Option<Arc<RemoteSession>>) -> Self {
        Self { store, remote }
    }

    /// Runs `sql` in `mode`. `None` for dry runs; otherwise elapsed time is
    /// always recorded and failures land in `error`.
    pub async fn dispatch(
        &self,
        mode: ExecutionMode,
        sql: &str,
        kind: StatementKind,
    ) -> Option<ExecutionOutcome> {
        let start = Instant::now();
        let outcome = match mode {
            ExecutionMode::DryRun => return None,
            ExecutionMode::Direct => self.run_direct(sql, kind).await,
            ExecutionMode::RemoteProtocol => self.run_remote(sql).await,
        };

        let elapsed = start.elapsed();
        Some(match outcome {
            Ok((rows, row_count)) => {
                info!("Query executed in {:?} ({} mode, {} rows)", elapsed, mode, row_count);
                ExecutionOutcome {
                    rows,
                    row_count: Some(row_count),
                    elapsed,
                    error: None,
                }
            }
            Err(e) => {
                error!("Query execution error after {:?}: {}", elapsed, e);
                ExecutionOutcome::failed(elapsed, e)
            }
        })
    }

    async fn run_direct(
        &self,
        sql: &str,
        kind: StatementKind,
    ) -> Result<(Option<Vec<Row>>, usize), String> {
        if kind.returns_rows() {
            let rows = self.store.query(sql, &[]).await.map_err(|e| e.to_string())?;
            let count = rows.len();
            Ok((Some(rows), count))
        } else {
            let affected = self.store.execute(sql, &[]).await.map_err(|e| e.to_string())?;
            Ok((None, affected))
        }
    }

    async fn run_remote(&self, sql: &str) -> Result<(Option<Vec<Row>>, usize), String> {
        let session = self
            .remote
            .as_ref()
            .ok_or_else(|| "remote execution is not configured".to_string())?;
        let rows = session.execute_query(sql).await.map_err(|e| e.to_string())?;
        let count = rows.len();
        Ok((Some(rows), count))
    }
}
