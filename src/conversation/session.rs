use tracing::info;

use super::{ContextWindow, Conversation, Intent, IntentPolicy, KeywordIntentPolicy, TurnMetadata};
use crate::llm::models::{GenerationRequest, GenerationResult, ImprovementResult};
use crate::pipeline::QueryGenerator;

/// What one submitted chat message produced.
#[derive(Debug, Clone)]
pub enum ChatReply {
    Generated(GenerationResult),
    Improved(ImprovementResult),
}

impl ChatReply {
    pub fn success(&self) -> bool {
        match self {
            ChatReply::Generated(r) => r.success,
            ChatReply::Improved(r) => r.success,
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            ChatReply::Generated(r) => &r.sql_query,
            ChatReply::Improved(r) => &r.sql_query,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ChatReply::Generated(r) => r.error.as_deref(),
            ChatReply::Improved(r) => r.error.as_deref(),
        }
    }
}

/// A conversation bound to one generator. Each message either generates a
/// fresh statement or refines the current one, as decided by the intent
/// policy.
pub struct ChatSession {
    conversation: Conversation,
    generator: QueryGenerator,
    policy: Box<dyn IntentPolicy>,
    window: ContextWindow,
    execute: bool,
}

impl ChatSession {
    pub fn new(generator: QueryGenerator) -> Self {
        Self {
            conversation: Conversation::new(),
            generator,
            policy: Box::new(KeywordIntentPolicy::default()),
            window: ContextWindow::default(),
            execute: true,
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn IntentPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_window(mut self, window: ContextWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_execute(mut self, execute: bool) -> Self {
        self.execute = execute;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn generator(&self) -> &QueryGenerator {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut QueryGenerator {
        &mut self.generator
    }

    /// Starts a new conversation; the generator and its schema cache stay.
    pub fn reset(&mut self) {
        self.conversation = Conversation::new();
        info!("Conversation reset");
    }

    pub async fn submit(&mut self, text: &str) -> ChatReply {
        self.conversation.add_user_turn(text);

        let intent = self.policy.classify(text, self.conversation.current_sql());
        info!("Classified message as {:?}", intent);

        let current = self.conversation.current_sql().map(str::to_string);
        match (intent, current) {
            (Intent::Refinement, Some(current)) => {
                ChatReply::Improved(self.refine(&current, text).await)
            }
            _ => ChatReply::Generated(self.generate(text).await),
        }
    }

    async fn generate(&mut self, text: &str) -> GenerationResult {
        let request = GenerationRequest::select(text).with_execute(self.execute);
        let result = self.generator.generate(&request).await;

        if result.success {
            self.conversation.add_assistant_turn(
                format!("Query generated successfully.\n\nExplanation: {}", result.explanation),
                Some(TurnMetadata {
                    sql: result.sql_query.clone(),
                    explanation: result.explanation.clone(),
                    confidence: result.confidence,
                    ..TurnMetadata::default()
                }),
            );
        } else {
            self.conversation.add_assistant_turn(
                format!(
                    "Query generation failed.\n\nError: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                ),
                None,
            );
        }
        result
    }

    async fn refine(&mut self, current_sql: &str, text: &str) -> ImprovementResult {
        let context = self.conversation.render_context(self.window);
        let result = self.generator.improve(current_sql, text, &context).await;

        if result.success {
            let mut reply = format!(
                "SQL improved.\n\nChanges made: {}\n\nExplanation: {}",
                result.changes_made, result.explanation
            );
            if !result.context_understood.is_empty() {
                reply.push_str(&format!(
                    "\n\nContext understanding: {}",
                    result.context_understood
                ));
            }
            self.conversation.add_assistant_turn(
                reply,
                Some(TurnMetadata {
                    sql: result.sql_query.clone(),
                    explanation: result.explanation.clone(),
                    confidence: result.confidence,
                    changes_made: result.changes_made.clone(),
                    context_understood: result.context_understood.clone(),
                }),
            );
        } else {
            self.conversation.add_assistant_turn(
                format!(
                    "Failed to improve SQL: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                ),
                None,
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::db::RelationalStore;
    use crate::db::duckdb_store::DuckDbStore;
    use crate::execution::ExecutionMode;
    use crate::llm::testing::ScriptedLlm;
    use std::sync::Arc;

    async fn session(llm: Arc<ScriptedLlm>) -> ChatSession {
        let store = DuckDbStore::in_memory().unwrap();
        store
            .execute("CREATE TABLE orders (id INTEGER, total DOUBLE)", &[])
            .await
            .unwrap();
        let store: Arc<dyn RelationalStore> = Arc::new(store);
        let generator =
            QueryGenerator::new(ExecutionMode::DryRun, store, llm, None, SchemaConfig::default());
        ChatSession::new(generator)
    }

    #[tokio::test]
    async fn test_failed_generation_leaves_no_revision() {
        let llm = ScriptedLlm::new([r#"{"sql_query": "DROP TABLE orders"}"#]);
        let mut chat = session(llm).await;

        let reply = chat.submit("drop everything").await;
        assert!(!reply.success());
        assert!(chat.conversation().current_sql().is_none());
        assert!(chat.conversation().revisions().is_empty());
        assert_eq!(chat.conversation().turns().len(), 2);
        assert!(chat.conversation().turns()[1].text.contains("safety validation"));
    }

    #[tokio::test]
    async fn test_failed_refinement_keeps_current_sql() {
        let llm = ScriptedLlm::new([
            r#"{"sql_query": "SELECT * FROM orders"}"#,
            "no idea",
        ]);
        let mut chat = session(llm).await;

        chat.submit("show orders").await;
        let reply = chat.submit("fix it").await;
        assert!(matches!(reply, ChatReply::Improved(_)));
        assert!(!reply.success());
        assert_eq!(chat.conversation().current_sql(), Some("SELECT *\nFROM orders"));
        assert_eq!(chat.conversation().revisions().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let llm = ScriptedLlm::new([r#"{"sql_query": "SELECT * FROM orders"}"#]);
        let mut chat = session(llm).await;
        chat.submit("show orders").await;
        chat.reset();
        assert!(chat.conversation().turns().is_empty());
        assert!(chat.conversation().current_sql().is_none());
    }
}
