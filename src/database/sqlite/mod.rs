use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{Chunk, Document, MetadataFilter, NewChunk, NewDocument};
use crate::database::sqlite::queries::{ChunkQueries, DocumentQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

pub const DATABASE_FILE: &str = "knowledge.db";

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Open (creating if needed) `knowledge.db` under `data_dir`
    #[inline]
    pub async fn initialize_in(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).with_context(|| {
            format!("Failed to create data directory: {}", data_dir.display())
        })?;

        Self::new(data_dir.join(DATABASE_FILE)).await
    }

    /// Store a document row together with its chunks; nothing is kept when
    /// any insert fails
    #[inline]
    pub async fn insert_document(
        &self,
        document: NewDocument,
        chunks: &[NewChunk],
    ) -> Result<Document> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        DocumentQueries::insert(&mut *tx, &document).await?;
        ChunkQueries::insert_all(&mut *tx, chunks).await?;
        tx.commit().await.context("Failed to commit document")?;
        debug!("Stored document {} with {} chunks", document.id, chunks.len());

        DocumentQueries::get_by_id(&self.pool, &document.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve stored document {}", document.id))
    }

    #[inline]
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        DocumentQueries::list(&self.pool).await
    }

    #[inline]
    pub async fn list_chunks(
        &self,
        limit: Option<i64>,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Chunk>> {
        ChunkQueries::list(&self.pool, limit, filter).await
    }

    #[inline]
    pub async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        ChunkQueries::all(&self.pool).await
    }

    #[inline]
    pub async fn get_chunks(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        ChunkQueries::get_many(&self.pool, ids).await
    }

    #[inline]
    pub async fn find_chunk_ids(&self, filter: &MetadataFilter) -> Result<Vec<String>> {
        ChunkQueries::find_ids(&self.pool, filter).await
    }

    #[inline]
    pub async fn count_chunks(&self) -> Result<i64> {
        ChunkQueries::count(&self.pool).await
    }

    /// Delete chunks and prune the documents they leave empty, as one
    /// transaction. Returns `(chunks deleted, documents removed)`.
    #[inline]
    pub async fn remove_chunks(&self, ids: &[String]) -> Result<(u64, u64)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        let deleted = ChunkQueries::delete_on(&mut *tx, ids).await?;
        let pruned = DocumentQueries::prune_empty(&mut *tx).await?;
        tx.commit().await.context("Failed to commit chunk removal")?;
        debug!("Removed {} chunks and {} empty documents", deleted, pruned);
        Ok((deleted, pruned))
    }
}
