use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use nl_sql::config::{AppConfig, CliArgs};
use nl_sql::db::RelationalStore;
use nl_sql::db::duckdb_store::DuckDbStore;
use nl_sql::llm::LlmManager;
use nl_sql::llm::models::GenerationRequest;
use nl_sql::pipeline::QueryGenerator;
use nl_sql::util::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_tracing(args.json_logs);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Opening DuckDB store at {} (pool size {})",
        config.database.connection_string, config.database.pool_size
    );
    let store: Arc<dyn RelationalStore> = Arc::new(DuckDbStore::open(&config.database)?);

    match store.ping().await {
        Ok(()) => info!("Database connection successful"),
        Err(e) => warn!("Database connection test failed: {}", e),
    }

    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm = LlmManager::new(&config.llm)?.into_shared();

    let generator = QueryGenerator::from_config(&config, store, llm)?;
    info!("Execution mode: {}", generator.execution_mode());

    let request = GenerationRequest::select(args.question.as_str())
        .with_kind(args.kind)
        .with_execute(!args.no_execute);
    let result = generator.generate(&request).await;

    if !result.success {
        error!(
            "Query generation failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
