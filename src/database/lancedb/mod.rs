// LanceDB vector database module
// Stores one vector per text chunk; metadata stays in SQLite


pub mod vector_store;

pub use vector_store::{VectorHit, VectorStore};

use serde::{Deserialize, Serialize};

/// Vector row stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Chunk id, shared with the SQLite `chunks` row
    pub id: String,
    pub vector: Vec<f32>,
    pub document_id: String,
    pub content: String,
}

/// Quote a string literal for a LanceDB SQL predicate
#[inline]
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `id IN ('a', 'b', ...)`
#[inline]
pub fn id_predicate(ids: &[String]) -> String {
    let list = ids
        .iter()
        .map(|id| sql_literal(id))
        .collect::<Vec<_>>()
        .join(", ");
    format!("id IN ({})", list)
}
