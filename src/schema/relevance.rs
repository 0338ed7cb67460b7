use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::llm::protocol::{ServiceReply, confidence_field, list_field, parse_reply};
use crate::llm::{LlmError, TextGenerator};

fn selection_prompt(user_query: &str, candidates: &[String], max_tables: usize) -> String {
    let tables_list = candidates
        .iter()
        .map(|t| format!("- {}", t))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"
You are a database expert helping to select the most relevant tables for a SQL query.

USER QUERY: "{user_query}"

AVAILABLE TABLES:
{tables_list}

Please analyze the user's request and select the {max_tables} most relevant tables that would be needed to fulfill this query.

Consider:
1. What data entities are mentioned in the query (customers, orders, payments, etc.)
2. What operations are requested (joins, aggregations, filtering)
3. Which tables likely contain the required columns
4. Primary tables vs supporting/lookup tables

Respond with a JSON object containing:
{{
    "selected_tables": ["table1", "table2", "table3"],
    "reasoning": {{
        "table1": "Why this table is essential",
        "table2": "Why this table is needed",
        "table3": "Why this table is relevant"
    }},
    "confidence": 0.95
}}

Only return the JSON object, no additional text.
"#
    )
}

#[derive(Debug, thiserror::Error)]
enum SelectionError {
    #[error(transparent)]
    Service(#[from] LlmError),
    #[error("reply is not a JSON object")]
    NotStructured,
}

/// Narrows a large candidate set to the tables a request plausibly needs.
/// Never fails: any service or parse problem degrades to the first
/// `max_tables` candidates.
pub struct RelevanceSelector {
    generator: Arc<dyn TextGenerator>,
}

impl RelevanceSelector {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn select_relevant_tables(
        &self,
        user_query: &str,
        candidates: &[String],
        max_tables: usize,
    ) -> Vec<String> {
        if candidates.len() <= max_tables {
            return candidates.to_vec();
        }

        info!(
            "Selecting {} most relevant tables from {} candidates",
            max_tables,
            candidates.len()
        );
        let start = Instant::now();

        match self.ask(user_query, candidates, max_tables).await {
            Ok(reply) => {
                let chosen = reconcile(&reply, candidates, max_tables);
                let reasoning = reply.get("reasoning").and_then(Value::as_object);
                info!(
                    "Table selection completed in {:?} (confidence {:.1}%)",
                    start.elapsed(),
                    confidence_field(&reply, "confidence") * 100.0
                );
                for (i, table) in chosen.iter().enumerate() {
                    let reason = reasoning
                        .and_then(|r| r.get(table))
                        .and_then(Value::as_str)
                        .unwrap_or("Selected by relevance");
                    info!("  {}. {} - {}", i + 1, table, reason);
                }
                chosen
            }
            Err(e) => {
                error!("Table selection failed: {}", e);
                warn!("Falling back to first {} tables", max_tables);
                candidates.iter().take(max_tables).cloned().collect()
            }
        }
    }

    async fn ask(
        &self,
        user_query: &str,
        candidates: &[String],
        max_tables: usize,
    ) -> Result<Map<String, Value>, SelectionError> {
        let prompt = selection_prompt(user_query, candidates, max_tables);
        let raw = self.generator.complete(&prompt).await?;
        match parse_reply(&raw) {
            ServiceReply::Structured(object) => Ok(object),
            ServiceReply::Fallback(_) | ServiceReply::Unparseable(_) => {
                Err(SelectionError::NotStructured)
            }
        }
    }
}

/// Keeps the valid, distinct selections in reply order, then pads from the
/// candidates in their original order.
fn reconcile(reply: &Map<String, Value>, candidates: &[String], max_tables: usize) -> Vec<String> {
    let mut chosen: Vec<String> = Vec::with_capacity(max_tables);
    for name in list_field(reply, "selected_tables") {
        if chosen.len() == max_tables {
            break;
        }
        if candidates.contains(&name) && !chosen.contains(&name) {
            chosen.push(name);
        }
    }

    if chosen.len() < max_tables {
        let needed = max_tables - chosen.len();
        let padding: Vec<String> = candidates
            .iter()
            .filter(|c| !chosen.contains(c))
            .take(needed)
            .cloned()
            .collect();
        if !padding.is_empty() {
            info!("Added {} additional tables to reach the limit", padding.len());
        }
        chosen.extend(padding);
    }
    chosen
}
