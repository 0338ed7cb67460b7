use super::{ConversationTurn, SqlRevision};

/// How much history a rendered context carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    pub turns: usize,
    pub revisions: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            turns: 10,
            revisions: 5,
        }
    }
}

const SQL_PREVIEW_CHARS: usize = 100;

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn percent(confidence: f64) -> String {
    format!("{:.1}%", confidence * 100.0)
}

fn tail<T>(items: &[T], n: usize) -> impl Iterator<Item = (usize, &T)> {
    let skip = items.len().saturating_sub(n);
    items.iter().enumerate().skip(skip)
}

/// Serializes the most recent turns and revisions plus a summary of the
/// current state. Deterministic for the same inputs; totals always count the
/// full history, not just the window.
pub fn render_context(
    turns: &[ConversationTurn],
    revisions: &[SqlRevision],
    current_sql: Option<&str>,
    window: ContextWindow,
) -> String {
    let mut out = String::from("=== CONVERSATION HISTORY ===\n\n");

    for (_, turn) in tail(turns, window.turns) {
        out.push_str(&format!(
            "[{}] {}: {}\n",
            turn.created_at.format("%H:%M:%S"),
            turn.role.label(),
            turn.text
        ));
        if let Some(meta) = turn.metadata.as_ref().filter(|m| !m.sql.is_empty()) {
            out.push_str(&format!(
                "    SQL Generated: {}\n",
                truncate(&meta.sql, SQL_PREVIEW_CHARS)
            ));
            if meta.confidence > 0.0 {
                out.push_str(&format!("    Confidence: {}\n", percent(meta.confidence)));
            }
        }
        out.push('\n');
    }

    if !revisions.is_empty() {
        out.push_str("\n=== SQL EVOLUTION HISTORY ===\n\n");
        for (index, revision) in tail(revisions, window.revisions) {
            let changes = if revision.changes_made.is_empty() {
                "Initial generation"
            } else {
                revision.changes_made.as_str()
            };
            out.push_str(&format!(
                "Version {} [{}]:\n",
                index + 1,
                revision.timestamp.format("%H:%M:%S")
            ));
            out.push_str(&format!("  User Request: {}\n", revision.user_request));
            out.push_str(&format!("  Changes Made: {}\n", changes));
            out.push_str(&format!("  SQL: {}\n", revision.sql));
            out.push_str(&format!("  Explanation: {}\n", revision.explanation));
            out.push_str(&format!("  Confidence: {}\n\n", percent(revision.confidence)));
        }
    }

    out.push_str("\n=== CURRENT STATE ===\n");
    out.push_str(&format!("Current SQL: {}\n", current_sql.unwrap_or("None")));
    out.push_str(&format!("Total messages in conversation: {}\n", turns.len()));
    out.push_str(&format!("SQL versions created: {}\n", revisions.len()));
    out
}
