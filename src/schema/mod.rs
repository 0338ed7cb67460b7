pub mod cache;
pub mod relevance;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub max_length: Option<u32>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            max_length: None,
        }
    }

    // e.g. "  - email (VARCHAR(255), nullable: NO, default: '')"
    pub fn to_prompt_line(&self) -> String {
        let mut line = format!("  - {} ({}", self.name, self.data_type);
        if let Some(len) = self.max_length {
            line.push_str(&format!("({})", len));
        }
        line.push_str(if self.nullable {
            ", nullable: YES"
        } else {
            ", nullable: NO"
        });
        if let Some(default) = self.default.as_deref().filter(|d| !d.is_empty()) {
            line.push_str(&format!(", default: {}", default));
        }
        line.push(')');
        line
    }

    /// Reads an `information_schema.columns`-shaped JSON object.
    fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let name = obj
            .get("column_name")
            .or_else(|| obj.get("name"))
            .and_then(Value::as_str)?;
        let data_type = obj
            .get("data_type")
            .or_else(|| obj.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN");
        let nullable = match obj.get("is_nullable").or_else(|| obj.get("nullable")) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.eq_ignore_ascii_case("NO"),
            _ => true,
        };
        let default = obj
            .get("column_default")
            .or_else(|| obj.get("default"))
            .and_then(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            });
        let max_length = obj
            .get("character_maximum_length")
            .or_else(|| obj.get("max_length"))
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());

        Some(Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            default,
            max_length,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    /// Physical ordinal order.
    pub columns: Vec<ColumnDescriptor>,
}

/// Table name to ordered column metadata. Table names are unique and keep
/// insertion order, so a truncated or relevance-selected subset renders in
/// the order it was chosen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    tables: Vec<TableSchema>,
}

impl SchemaDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// One empty entry per name, in the given order.
    pub fn with_tables<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut descriptor = Self::new();
        for name in names {
            descriptor.ensure_table(name.into());
        }
        descriptor
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.get(table).is_some()
    }

    pub fn get(&self, table: &str) -> Option<&[ColumnDescriptor]> {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.columns.as_slice())
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn push_column(&mut self, table: &str, column: ColumnDescriptor) {
        let idx = self.ensure_table(table.to_string());
        self.tables[idx].columns.push(column);
    }

    fn ensure_table(&mut self, name: String) -> usize {
        match self.tables.iter().position(|t| t.name == name) {
            Some(idx) => idx,
            None => {
                self.tables.push(TableSchema {
                    name,
                    columns: Vec::new(),
                });
                self.tables.len() - 1
            }
        }
    }

    /// Textual rendering embedded into generation prompts.
    pub fn to_prompt_text(&self) -> String {
        let mut text = String::from("Database Schema:\n");
        for table in &self.tables {
            text.push_str(&format!("\nTable: {}\nColumns:\n", table.name));
            for column in &table.columns {
                text.push_str(&column.to_prompt_line());
                text.push('\n');
            }
        }
        text
    }

    /// Decodes a schema payload returned by a remote tool: either
    /// `{"schema": {...}}` or a bare `{"table": [column, ...]}` object.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let tables = match obj.get("schema") {
            Some(Value::Object(inner)) => inner,
            _ => obj,
        };

        let mut descriptor = Self::new();
        for (table, columns) in tables {
            let columns = columns.as_array()?;
            descriptor.ensure_table(table.clone());
            for column in columns {
                descriptor.push_column(table, ColumnDescriptor::from_json(column)?);
            }
        }

        if descriptor.is_empty() {
            None
        } else {
            Some(descriptor)
        }
    }
}
