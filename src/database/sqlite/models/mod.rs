#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use thiserror::Error;

/// Flat JSON metadata attached to documents and chunks
pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: String,
    pub source: String,
    pub metadata: String,
    pub chunk_count: i64,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub id: String,
    pub source: String,
    pub metadata: Metadata,
    pub chunk_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub content: String,
    pub metadata: String,
    pub created_date: NaiveDateTime,
}

impl Chunk {
    /// Parsed metadata; malformed JSON yields an empty map
    #[inline]
    pub fn metadata_map(&self) -> Metadata {
        serde_json::from_str(&self.metadata).unwrap_or_default()
    }

    /// `source` from the metadata, or `"unknown"`
    #[inline]
    pub fn source(&self) -> String {
        self.metadata_map()
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub content: String,
    pub metadata: Metadata,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter must be a JSON object")]
    NotAnObject,
    #[error("invalid filter key '{0}' (only letters, digits and '_' are allowed)")]
    InvalidKey(String),
    #[error("unsupported value for filter key '{0}' (expected string, number or bool)")]
    UnsupportedValue(String),
}

/// Equality filter over chunk metadata fields, ANDed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: Metadata,
}

impl MetadataFilter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn from_value(value: &Value) -> Result<Self, FilterError> {
        let object = value.as_object().ok_or(FilterError::NotAnObject)?;
        let mut filter = Self::new();
        for (key, value) in object {
            filter.insert(key, value.clone())?;
        }
        Ok(filter)
    }

    #[inline]
    pub fn insert(&mut self, key: &str, value: Value) -> Result<(), FilterError> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FilterError::InvalidKey(key.to_string()));
        }
        if !matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
            return Err(FilterError::UnsupportedValue(key.to_string()));
        }
        self.conditions.insert(key.to_string(), value);
        Ok(())
    }

    #[inline]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Result<Self, FilterError> {
        self.insert(key, value.into())?;
        Ok(self)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    #[inline]
    pub fn conditions(&self) -> &Metadata {
        &self.conditions
    }

    /// Append ` WHERE json_extract(metadata, '$.key') = ? AND ...` with bound
    /// values. Nothing is appended for an empty filter.
    #[inline]
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        for (i, (key, value)) in self.conditions.iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            // Keys are restricted to [A-Za-z0-9_] on insert
            builder.push(format!("json_extract(metadata, '$.{}') = ", key));
            match value {
                Value::Bool(b) => builder.push_bind(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => builder.push_bind(i),
                    None => builder.push_bind(n.as_f64().unwrap_or_default()),
                },
                Value::String(s) => builder.push_bind(s.clone()),
                other => builder.push_bind(other.to_string()),
            };
        }
    }
}

impl std::fmt::Display for MetadataFilter {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Value::Object(self.conditions.clone()))
    }
}
