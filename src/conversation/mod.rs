pub mod context;
pub mod intent;
pub mod session;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use context::{ContextWindow, render_context};
pub use intent::{Intent, IntentPolicy, KeywordIntentPolicy};
pub use session::{ChatReply, ChatSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

/// SQL attached to an assistant turn. Adding a turn that carries one
/// records a new revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub sql: String,
    pub explanation: String,
    pub confidence: f64,
    pub changes_made: String,
    pub context_understood: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<TurnMetadata>,
}

/// One version of the SQL under discussion. Its version number is its
/// position in the revision history, starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlRevision {
    pub timestamp: DateTime<Utc>,
    pub sql: String,
    pub explanation: String,
    pub confidence: f64,
    pub user_request: String,
    pub changes_made: String,
}

/// Append-only turn and revision history of one chat session.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
    revisions: Vec<SqlRevision>,
    current_sql: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn revisions(&self) -> &[SqlRevision] {
        &self.revisions
    }

    pub fn current_sql(&self) -> Option<&str> {
        self.current_sql.as_deref()
    }

    pub fn add_user_turn(&mut self, text: impl Into<String>) {
        self.add_turn(Role::User, text, None);
    }

    pub fn add_assistant_turn(&mut self, text: impl Into<String>, metadata: Option<TurnMetadata>) {
        self.add_turn(Role::Assistant, text, metadata);
    }

    /// Appends a turn. Metadata with SQL also appends a revision attributed
    /// to the latest user turn and makes that SQL current.
    pub fn add_turn(&mut self, role: Role, text: impl Into<String>, metadata: Option<TurnMetadata>) {
        let now = Utc::now();
        if let Some(meta) = metadata.as_ref().filter(|m| !m.sql.is_empty()) {
            let user_request = self.last_user_message().unwrap_or_default().to_string();
            self.revisions.push(SqlRevision {
                timestamp: now,
                sql: meta.sql.clone(),
                explanation: meta.explanation.clone(),
                confidence: meta.confidence,
                user_request,
                changes_made: meta.changes_made.clone(),
            });
            self.current_sql = Some(meta.sql.clone());
        }

        self.turns.push(ConversationTurn {
            role,
            text: text.into(),
            created_at: now,
            metadata,
        });
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
    }

    pub fn render_context(&self, window: ContextWindow) -> String {
        render_context(
            &self.turns,
            &self.revisions,
            self.current_sql.as_deref(),
            window,
        )
    }

    pub fn evolution_summary(&self) -> String {
        if self.revisions.is_empty() {
            return "No SQL queries generated yet.".to_string();
        }

        let mut summary = format!("SQL Evolution ({} versions):\n", self.revisions.len());
        for (i, revision) in self.revisions.iter().enumerate() {
            summary.push_str(&format!(
                "  {}. {}\n",
                i + 1,
                context::truncate(&revision.user_request, 50)
            ));
            if !revision.changes_made.is_empty() {
                summary.push_str(&format!(
                    "     Changes: {}\n",
                    context::truncate(&revision.changes_made, 60)
                ));
            }
        }
        summary
    }
}
