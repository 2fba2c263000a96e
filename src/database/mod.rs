// Dual storage: SQLite for documents, chunks and metadata; LanceDB for vectors

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::{ChunkRecord, VectorHit, VectorStore};
pub use self::sqlite::Database;
pub use self::sqlite::models::{Chunk, Document, FilterError, Metadata, MetadataFilter, NewChunk, NewDocument};
