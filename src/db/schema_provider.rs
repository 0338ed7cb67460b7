use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{RelationalStore, StoreError};
use crate::schema::SchemaDescriptor;
use crate::schema::relevance::RelevanceSelector;

/// Retrieves table and column metadata from the relational store. Every
/// retrieval issues one listing query and at most one batched column query.
pub struct SchemaProvider {
    store: Arc<dyn RelationalStore>,
    selector: RelevanceSelector,
}

impl SchemaProvider {
    pub fn new(store: Arc<dyn RelationalStore>, selector: RelevanceSelector) -> Self {
        Self { store, selector }
    }

    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    /// Every table in the schema, truncated to the first `max_tables` in
    /// lexical order.
    pub async fn fetch_full_schema(&self, max_tables: usize) -> Result<SchemaDescriptor, StoreError> {
        let start = Instant::now();
        info!("Starting schema retrieval (max {} tables)", max_tables);

        let mut tables = self.store.list_tables().await?;
        info!("Found {} total tables", tables.len());
        truncate_tables(&mut tables, max_tables);

        let schema = self.describe(&tables).await?;
        info!(
            "Schema retrieval completed: {} tables in {:?}",
            schema.len(),
            start.elapsed()
        );
        Ok(schema)
    }

    /// Tables whose names start with `prefix`, narrowed to those relevant to
    /// `query` when there are more than `max_tables`. No match is an empty
    /// descriptor, not an error.
    pub async fn fetch_filtered_schema(
        &self,
        query: &str,
        prefix: &str,
        max_tables: usize,
    ) -> Result<SchemaDescriptor, StoreError> {
        let start = Instant::now();
        info!("Starting filtered schema retrieval with prefix '{}'", prefix);

        let all_tables = self.store.list_tables().await?;
        let candidates: Vec<String> = all_tables
            .iter()
            .filter(|t| t.starts_with(prefix))
            .cloned()
            .collect();
        info!(
            "Found {} tables with prefix '{}' (out of {} total)",
            candidates.len(),
            prefix,
            all_tables.len()
        );

        if candidates.is_empty() {
            warn!("No tables found with prefix '{}'", prefix);
            return Ok(SchemaDescriptor::new());
        }

        let tables = if query.trim().is_empty() {
            let mut tables = candidates;
            truncate_tables(&mut tables, max_tables);
            tables
        } else {
            self.selector
                .select_relevant_tables(query, &candidates, max_tables)
                .await
        };

        let schema = self.describe(&tables).await?;
        info!(
            "Filtered schema retrieval completed: {} tables in {:?}",
            schema.len(),
            start.elapsed()
        );
        Ok(schema)
    }

    /// One batched metadata query. Every requested table gets a key, in the
    /// requested order, even when it reports no columns.
    async fn describe(&self, tables: &[String]) -> Result<SchemaDescriptor, StoreError> {
        let mut schema = SchemaDescriptor::with_tables(tables);
        if tables.is_empty() {
            return Ok(schema);
        }

        for (table, column) in self.store.describe_tables(tables).await? {
            if schema.contains(&table) {
                schema.push_column(&table, column);
            } else {
                debug!("Ignoring column '{}' of unrequested table '{}'", column.name, table);
            }
        }
        Ok(schema)
    }
}

fn truncate_tables(tables: &mut Vec<String>, max_tables: usize) {
    if tables.len() > max_tables {
        warn!(
            "Large database detected ({} tables). Limiting to {} tables",
            tables.len(),
            max_tables
        );
        tables.truncate(max_tables);
    }
}
