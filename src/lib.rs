pub mod config;
pub mod conversation;
pub mod db;
pub mod execution;
pub mod llm;
pub mod pipeline;
pub mod remote;
pub mod safety;
pub mod schema;
pub mod util;

pub use execution::ExecutionMode;
pub use llm::models::{FailureReason, GenerationRequest, GenerationResult, StatementKind};
pub use pipeline::QueryGenerator;
