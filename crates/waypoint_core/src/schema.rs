//! Table declarations and secondary indexes.
//!
//! Every table gets a primary key on `id` and an index on `sync_status`.
//! Further indexes (foreign keys such as `trip_id`, or compound keys such as
//! `trip_id+date`) are declared here so UI queries don't have to scan.

use crate::record::CachedRecord;
use serde_json::Value;
use std::collections::HashMap;

/// A secondary index over one or more fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    name: String,
    fields: Vec<String>,
}

impl IndexDef {
    /// Creates an index over `fields`. The name is the fields joined by `+`.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        Self {
            name: fields.join("+"),
            fields,
        }
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the indexed fields in key order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Computes the key for a record, or `None` if any indexed field is
    /// missing or null.
    #[must_use]
    pub fn key_for(&self, record: &CachedRecord) -> Option<IndexKey> {
        self.fields
            .iter()
            .map(|field| match record.field(field) {
                None | Some(Value::Null) => None,
                Some(value) => Some(render_key_part(value)),
            })
            .collect::<Option<Vec<_>>>()
            .map(IndexKey)
    }

    /// Builds a lookup key from query values.
    #[must_use]
    pub fn key_from_values(values: &[Value]) -> IndexKey {
        IndexKey(values.iter().map(render_key_part).collect())
    }
}

/// Rendered index key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(Vec<String>);

fn render_key_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Declaration of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    indexes: Vec<IndexDef>,
}

impl TableSchema {
    /// Declares a table with no secondary indexes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    /// Adds a single-field index.
    #[must_use]
    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.indexes.push(IndexDef::new([field.into()]));
        self
    }

    /// Adds a compound index.
    #[must_use]
    pub fn compound_index<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(IndexDef::new(fields));
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared indexes.
    #[must_use]
    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }
}

/// The set of declared tables.
///
/// Tables missing from the schema are still accepted by the store; they
/// just have no secondary indexes.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: HashMap<String, TableSchema>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a table declaration.
    #[must_use]
    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Looks up a table declaration.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Iterates over declared table names.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}
