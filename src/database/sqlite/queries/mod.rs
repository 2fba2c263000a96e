
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

/// SQLite caps bound parameters per statement; stay well below it.
const MAX_BINDS_PER_STATEMENT: usize = 500;

const CHUNK_COLUMNS: &str =
    "SELECT id, document_id, chunk_index, total_chunks, content, metadata, created_date FROM chunks";

fn to_json(metadata: &Metadata) -> Result<String> {
    serde_json::to_string(metadata).context("Failed to serialize metadata")
}

pub struct DocumentQueries;

impl DocumentQueries {
    /// Insert the row on `conn`, which may be an open transaction
    #[inline]
    pub async fn insert(conn: &mut SqliteConnection, new_document: &NewDocument) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO documents (id, source, metadata, chunk_count, created_date) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&new_document.id)
        .bind(&new_document.source)
        .bind(to_json(&new_document.metadata)?)
        .bind(new_document.chunk_count)
        .bind(now)
        .execute(&mut *conn)
        .await
        .context("Failed to create document")?;
        Ok(())
    }

    #[inline]
    pub async fn create(pool: &SqlitePool, new_document: NewDocument) -> Result<Document> {
        {
            let mut conn = pool.acquire().await.context("Failed to acquire connection")?;
            Self::insert(&mut *conn, &new_document).await?;
        }

        Self::get_by_id(pool, &new_document.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(
            "SELECT id, source, metadata, chunk_count, created_date FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get document by id")?;

        Ok(document)
    }

    #[inline]
    pub async fn list(pool: &SqlitePool) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(
            "SELECT id, source, metadata, chunk_count, created_date FROM documents ORDER BY created_date ASC, id ASC",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list documents")?;

        Ok(documents)
    }

    /// Refresh per-document chunk counts and drop documents left without
    /// chunks. Returns the number of documents removed.
    #[inline]
    pub async fn prune_empty(conn: &mut SqliteConnection) -> Result<u64> {
        sqlx::query(
            "UPDATE documents SET chunk_count = (SELECT COUNT(*) FROM chunks WHERE chunks.document_id = documents.id)",
        )
        .execute(&mut *conn)
        .await
        .context("Failed to refresh document chunk counts")?;

        let removed = sqlx::query("DELETE FROM documents WHERE chunk_count = 0")
            .execute(&mut *conn)
            .await
            .context("Failed to prune empty documents")?
            .rows_affected();
        Ok(removed)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(pool)
            .await
            .context("Failed to count documents")?;
        Ok(count)
    }
}

pub struct ChunkQueries;

impl ChunkQueries {
    /// Insert chunks in one transaction
    #[inline]
    pub async fn create_many(pool: &SqlitePool, chunks: &[NewChunk]) -> Result<u64> {
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;
        Self::insert_all(&mut *tx, chunks).await?;
        tx.commit().await.context("Failed to commit chunks")?;
        debug!("Inserted {} chunks", chunks.len());
        Ok(chunks.len() as u64)
    }

    /// Insert chunks on `conn` without committing
    #[inline]
    pub async fn insert_all(conn: &mut SqliteConnection, chunks: &[NewChunk]) -> Result<()> {
        let now = Utc::now().naive_utc();
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, total_chunks, content, metadata, created_date) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(chunk.total_chunks)
            .bind(&chunk.content)
            .bind(to_json(&chunk.metadata)?)
            .bind(now)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to insert chunk {}", chunk.id))?;
        }
        Ok(())
    }

    /// Chunks in insertion order, optionally filtered and limited
    #[inline]
    pub async fn list(
        pool: &SqlitePool,
        limit: Option<i64>,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Chunk>> {
        let mut builder = QueryBuilder::<Sqlite>::new(CHUNK_COLUMNS);
        if let Some(filter) = filter {
            filter.push_where(&mut builder);
        }
        builder.push(" ORDER BY created_date ASC, document_id ASC, chunk_index ASC");
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let chunks = builder
            .build_query_as::<Chunk>()
            .fetch_all(pool)
            .await
            .context("Failed to list chunks")?;

        Ok(chunks)
    }

    #[inline]
    pub async fn all(pool: &SqlitePool) -> Result<Vec<Chunk>> {
        Self::list(pool, None, None).await
    }

    #[inline]
    pub async fn find_ids(pool: &SqlitePool, filter: &MetadataFilter) -> Result<Vec<String>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM chunks");
        filter.push_where(&mut builder);

        let ids = builder
            .build_query_scalar::<String>()
            .fetch_all(pool)
            .await
            .context("Failed to find chunk ids")?;

        Ok(ids)
    }

    /// Fetch chunks by id; missing ids are skipped and order is unspecified
    #[inline]
    pub async fn get_many(pool: &SqlitePool, ids: &[String]) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::with_capacity(ids.len());

        for batch in ids.chunks(MAX_BINDS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Sqlite>::new(CHUNK_COLUMNS);
            builder.push(" WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in batch {
                separated.push_bind(id.clone());
            }
            separated.push_unseparated(")");

            let found = builder
                .build_query_as::<Chunk>()
                .fetch_all(pool)
                .await
                .context("Failed to fetch chunks by id")?;
            chunks.extend(found);
        }

        Ok(chunks)
    }

    #[inline]
    pub async fn delete_by_ids(pool: &SqlitePool, ids: &[String]) -> Result<u64> {
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;
        let deleted = Self::delete_on(&mut *tx, ids).await?;
        tx.commit().await.context("Failed to commit chunk deletion")?;
        Ok(deleted)
    }

    /// Delete by id on `conn` without committing
    #[inline]
    pub async fn delete_on(conn: &mut SqliteConnection, ids: &[String]) -> Result<u64> {
        let mut deleted = 0;

        for batch in ids.chunks(MAX_BINDS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM chunks WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in batch {
                separated.push_bind(id.clone());
            }
            separated.push_unseparated(")");

            deleted += builder
                .build()
                .execute(&mut *conn)
                .await
                .context("Failed to delete chunks")?
                .rows_affected();
        }

        debug!("Deleted {} chunks", deleted);
        Ok(deleted)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(pool)
            .await
            .context("Failed to count chunks")?;
        Ok(count)
    }
}
