//! The query generation pipeline: schema retrieval (cached), generation
//! through the prompt/response protocol, safety validation, display
//! formatting and mode-dependent execution. Every stage failure becomes a
//! failed result; nothing here returns a Rust error to the caller.

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::{AppConfig, SchemaConfig};
use crate::db::RelationalStore;
use crate::db::schema_provider::SchemaProvider;
use crate::execution::{ExecutionDispatcher, ExecutionMode};
use crate::llm::TextGenerator;
use crate::llm::models::{
    FailureReason, GeneratedSql, GenerationRequest, GenerationResult, ImprovedSql,
    ImprovementResult,
};
use crate::llm::protocol::{ServiceReply, SqlProtocol};
use crate::remote::RemoteSession;
use crate::remote::http::HttpToolChannel;
use crate::safety::SafetyValidator;
use crate::schema::SchemaDescriptor;
use crate::schema::cache::SchemaCache;
use crate::schema::relevance::RelevanceSelector;
use crate::util::sql_format::format_sql;

const UNPARSEABLE_REPLY: &str = "Failed to parse a SQL query from the generative service reply";

fn dialect_for(mode: ExecutionMode) -> &'static str {
    match mode {
        ExecutionMode::RemoteProtocol => "PostgreSQL",
        ExecutionMode::Direct | ExecutionMode::DryRun => "DuckDB",
    }
}

pub struct QueryGenerator {
    mode: ExecutionMode,
    generator: Arc<dyn TextGenerator>,
    provider: SchemaProvider,
    cache: SchemaCache,
    protocol: SqlProtocol,
    validator: SafetyValidator,
    dispatcher: ExecutionDispatcher,
    remote: Option<Arc<RemoteSession>>,
    settings: SchemaConfig,
}

impl QueryGenerator {
    pub fn new(
        mode: ExecutionMode,
        store: Arc<dyn RelationalStore>,
        generator: Arc<dyn TextGenerator>,
        remote: Option<Arc<RemoteSession>>,
        settings: SchemaConfig,
    ) -> Self {
        let selector = RelevanceSelector::new(Arc::clone(&generator));
        Self {
            mode,
            provider: SchemaProvider::new(Arc::clone(&store), selector),
            cache: SchemaCache::new(settings.cache_ttl()),
            protocol: SqlProtocol::new(Arc::clone(&generator), dialect_for(mode)),
            validator: SafetyValidator,
            dispatcher: ExecutionDispatcher::new(store, remote.clone()),
            generator,
            remote,
            settings,
        }
    }

    /// Wires the remote session from `config.remote`. The handshake is lazy,
    /// so an unreachable server only matters once remote mode is used.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn RelationalStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, crate::remote::RemoteError> {
        let channel = HttpToolChannel::new(&config.remote)?;
        let remote = RemoteSession::new(Arc::new(channel), config.remote.server_name.clone());
        Ok(Self::new(
            config.execution.mode,
            store,
            generator,
            Some(Arc::new(remote)),
            config.schema.clone(),
        ))
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn set_execution_mode(&mut self, mode: ExecutionMode) {
        self.mode = mode;
        self.protocol = SqlProtocol::new(Arc::clone(&self.generator), dialect_for(mode));
        info!("Execution mode set to: {}", mode);
    }

    pub async fn clear_schema_cache(&self) {
        self.cache.clear().await;
    }

    fn cache_key(&self) -> String {
        let source = match self.mode {
            ExecutionMode::RemoteProtocol => "remote",
            ExecutionMode::Direct | ExecutionMode::DryRun => "store",
        };
        format!(
            "{}:{}:{}",
            source, self.settings.table_prefix, self.settings.max_tables
        )
    }

    /// Schema for `query`, served from the cache while it is fresh.
    pub async fn schema(&self, query: &str) -> Result<Arc<SchemaDescriptor>, String> {
        let key = self.cache_key();
        self.cache
            .get_or_try_fetch(&key, || self.fetch_schema(query))
            .await
    }

    /// Prompt rendering of the current schema.
    pub async fn schema_context(&self, query: &str) -> Result<String, String> {
        Ok(self.schema(query).await?.to_prompt_text())
    }

    async fn fetch_schema(&self, query: &str) -> Result<SchemaDescriptor, String> {
        if self.mode == ExecutionMode::RemoteProtocol {
            if let Some(remote) = &self.remote {
                let start = Instant::now();
                info!("Attempting schema retrieval via remote server");
                match remote.fetch_schema().await {
                    Ok(schema) => {
                        info!("Remote schema retrieved in {:?}", start.elapsed());
                        return Ok(schema);
                    }
                    Err(e) => warn!(
                        "Remote schema retrieval failed after {:?}: {}. Falling back to the store",
                        start.elapsed(),
                        e
                    ),
                }
            }
        }

        let schema = self
            .provider
            .fetch_filtered_schema(
                query,
                &self.settings.table_prefix,
                self.settings.max_tables,
            )
            .await
            .map_err(|e| e.to_string())?;

        if schema.is_empty() {
            return Err(format!(
                "no tables found with prefix '{}'",
                self.settings.table_prefix
            ));
        }
        Ok(schema)
    }

    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let start = Instant::now();
        info!("Starting query generation pipeline for: '{}'", request.text);

        let schema = match self.schema(&request.text).await {
            Ok(schema) => schema,
            Err(e) => {
                error!("Schema retrieval failed after {:?}: {}", start.elapsed(), e);
                return GenerationResult::failed(
                    FailureReason::SchemaUnavailable,
                    "",
                    "Failed to retrieve database schema",
                    format!("Schema retrieval failed: {}", e),
                );
            }
        };
        info!("Schema ready ({} tables)", schema.len());

        let generated = match self
            .protocol
            .generate(&request.text, &schema.to_prompt_text(), request.kind)
            .await
        {
            Ok(ServiceReply::Structured(generated)) => generated,
            Ok(ServiceReply::Fallback(sql)) => GeneratedSql::from_fallback(sql),
            Ok(ServiceReply::Unparseable(_)) => {
                error!("Generation reply could not be parsed");
                return GenerationResult::failed(
                    FailureReason::GenerationFailed,
                    "",
                    "Failed to generate query",
                    UNPARSEABLE_REPLY,
                );
            }
            Err(e) => {
                error!("Generation failed: {}", e);
                return GenerationResult::failed(
                    FailureReason::GenerationFailed,
                    "",
                    "Failed to generate query",
                    e.to_string(),
                );
            }
        };

        let sql = generated.sql_query.trim();
        if sql.is_empty() {
            return GenerationResult::failed(
                FailureReason::EmptyQuery,
                "",
                generated.explanation,
                "The generative service returned no SQL",
            );
        }

        if let Err(unsafe_sql) = self.validator.check(sql) {
            return GenerationResult::failed(
                FailureReason::PolicyRejected,
                sql,
                "Query failed safety validation",
                format!("Query failed safety validation: {}", unsafe_sql),
            );
        }

        let formatted = format_sql(sql);
        let mut result = GenerationResult {
            success: true,
            sql_query: formatted,
            explanation: generated.explanation,
            data: None,
            error: None,
            failure: None,
            execution_time: None,
            row_count: None,
            confidence: generated.confidence,
            tables_used: generated.tables_used,
        };

        if request.execute {
            if let Some(outcome) = self
                .dispatcher
                .dispatch(self.mode, &result.sql_query, request.kind)
                .await
            {
                result.data = outcome.rows;
                result.execution_time = Some(outcome.elapsed);
                result.row_count = outcome.row_count;
                if let Some(e) = outcome.error {
                    result.success = false;
                    result.error = Some(e);
                    result.failure = Some(FailureReason::ExecutionFailed);
                }
            }
        }

        info!("Pipeline finished in {:?}", start.elapsed());
        result
    }

    /// Refines `current_sql`. The result is validated and formatted but
    /// never executed.
    pub async fn improve(
        &self,
        current_sql: &str,
        improvement_request: &str,
        conversation_context: &str,
    ) -> ImprovementResult {
        let start = Instant::now();
        info!("Starting SQL improvement for: '{}'", improvement_request);

        let schema_context = match self.schema_context(improvement_request).await {
            Ok(context) => context,
            Err(e) => {
                error!("Schema retrieval failed: {}", e);
                return ImprovementResult::failed(
                    FailureReason::SchemaUnavailable,
                    current_sql,
                    format!("Schema retrieval failed: {}", e),
                );
            }
        };

        let improved = match self
            .protocol
            .improve(
                current_sql,
                improvement_request,
                &schema_context,
                conversation_context,
            )
            .await
        {
            Ok(ServiceReply::Structured(improved)) => improved,
            Ok(ServiceReply::Fallback(sql)) => ImprovedSql::from_fallback(sql),
            Ok(ServiceReply::Unparseable(_)) => {
                return ImprovementResult::failed(
                    FailureReason::GenerationFailed,
                    current_sql,
                    UNPARSEABLE_REPLY,
                );
            }
            Err(e) => {
                error!("Improvement failed: {}", e);
                return ImprovementResult::failed(
                    FailureReason::GenerationFailed,
                    current_sql,
                    e.to_string(),
                );
            }
        };

        let sql = improved.improved_sql.trim();
        if sql.is_empty() {
            return ImprovementResult::failed(
                FailureReason::EmptyQuery,
                current_sql,
                "The generative service returned no SQL",
            );
        }
        if let Err(unsafe_sql) = self.validator.check(sql) {
            return ImprovementResult::failed(
                FailureReason::PolicyRejected,
                current_sql,
                format!("Query failed safety validation: {}", unsafe_sql),
            );
        }

        info!("Improvement finished in {:?}", start.elapsed());
        ImprovementResult {
            success: true,
            sql_query: format_sql(sql),
            changes_made: improved.changes_made,
            explanation: improved.explanation,
            confidence: improved.confidence,
            context_understood: improved.context_understood,
            error: None,
            failure: None,
        }
    }
}
