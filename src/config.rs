use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::execution::ExecutionMode;
use crate::llm::models::StatementKind;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// DuckDB file path, or ":memory:".
    pub connection_string: String,
    pub pool_size: u32,
    /// Catalog schema whose tables are described to the generative service.
    pub schema: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: String, // "gemini", "remote", or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub server_url: String,
    pub server_name: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchemaConfig {
    pub cache_ttl_secs: u64,
    pub max_tables: usize,
    pub table_prefix: String,
}

impl SchemaConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub remote: RemoteConfig,
    pub schema: SchemaConfig,
    pub execution: ExecutionConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Translate a natural-language request into SQL", long_about = None)]
pub struct CliArgs {
    /// Natural-language request
    pub question: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Execution mode: direct, remote or dry-run
    #[arg(short, long)]
    pub mode: Option<ExecutionMode>,

    /// Statement kind to generate
    #[arg(short, long, default_value = "SELECT", ignore_case = true)]
    pub kind: StatementKind,

    /// Generate without executing
    #[arg(short = 'n', long)]
    pub no_execute: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = [
                "nl-sql.toml",
                "config/nl-sql.toml",
                "/etc/nl-sql/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // NLSQL__LLM__API_KEY, NLSQL__SCHEMA__MAX_TABLES, ...
        config_builder = config_builder.add_source(
            Environment::with_prefix("NLSQL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Some(mode) = args.mode {
            config.execution.mode = mode;
        }

        Ok(config)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: "nl-sql.duckdb".to_string(),
            pool_size: 4,
            schema: "main".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            api_url: None,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            server_name: "postgres-mcp-server".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            max_tables: 50,
            table_prefix: String::new(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_for(path: &Path) -> CliArgs {
        CliArgs {
            question: "show orders".to_string(),
            config: Some(path.to_path_buf()),
            mode: None,
            kind: StatementKind::Select,
            no_execute: false,
            json_logs: false,
        }
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.schema.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.schema.max_tables, 50);
        assert_eq!(config.database.schema, "main");
        assert_eq!(config.execution.mode, ExecutionMode::Direct);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[schema]\nmax_tables = 20\n\n[execution]\nmode = \"dry-run\"").unwrap();

        let config = AppConfig::new(&args_for(file.path())).unwrap();
        assert_eq!(config.schema.max_tables, 20);
        assert_eq!(config.schema.cache_ttl_secs, 300);
        assert_eq!(config.execution.mode, ExecutionMode::DryRun);
        assert_eq!(config.llm.backend, "gemini");
    }

    #[test]
    fn test_cli_mode_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[execution]\nmode = \"direct\"").unwrap();

        let mut args = args_for(file.path());
        args.mode = Some(ExecutionMode::RemoteProtocol);
        let config = AppConfig::new(&args).unwrap();
        assert_eq!(config.execution.mode, ExecutionMode::RemoteProtocol);
    }
}
