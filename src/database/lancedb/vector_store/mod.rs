
use super::{ChunkRecord, id_predicate};
use crate::LabError;
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const TABLE_NAME: &str = "chunks";
/// Ids per delete / filter predicate
const MAX_IDS_PER_PREDICATE: usize = 500;

type Result<T> = std::result::Result<T, LabError>;

fn db_error(context: &str, e: impl std::fmt::Display) -> LabError {
    LabError::Database(format!("{}: {}", context, e))
}

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    dimension: usize,
}

/// One nearest-neighbour match
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    /// Cosine distance
    pub distance: f32,
    /// `1 - distance`
    pub similarity: f32,
}

impl VectorStore {
    /// Open or create the store at `path` for vectors of `dimension` floats.
    ///
    /// An existing table with a different vector width is rejected rather
    /// than rebuilt, since SQLite still references its rows.
    #[inline]
    pub async fn new(path: &Path, dimension: usize) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| db_error("Failed to create vector database directory", e))?;
        }

        let uri = path.to_string_lossy().to_string();

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(path)?;

                    lancedb::connect(&uri)
                        .execute()
                        .await
                        .map_err(|e| db_error("Failed to connect to LanceDB after recovery", e))?
                } else {
                    return Err(db_error("Failed to connect to LanceDB", e));
                }
            }
        };

        let store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            dimension,
        };
        store.initialize_table().await?;

        info!("Vector store initialized successfully");
        Ok(store)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_error("Failed to list tables", e))?;

        if table_names.contains(&self.table_name) {
            let existing = self.detect_existing_vector_dimension().await?;
            if existing != self.dimension {
                return Err(LabError::Database(format!(
                    "Vector table has dimension {} but the embedding model produces {}; remove the vectors directory to rebuild",
                    existing, self.dimension
                )));
            }
            debug!("Chunks table already exists with {} dimensions", existing);
            return Ok(());
        }

        self.connection
            .create_empty_table(&self.table_name, self.create_schema())
            .execute()
            .await
            .map_err(|e| db_error("Failed to create table", e))?;

        info!("Chunks table created with {} dimensions", self.dimension);
        Ok(())
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| db_error("Failed to get table schema", e))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                LabError::Database("Could not find vector column or determine dimension".to_string())
            })
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
        ]))
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| db_error("Failed to open table", e))
    }

    /// Store multiple chunk vectors in one write
    #[inline]
    pub async fn store_batch(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No vectors to store");
            return Ok(());
        }

        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimension) {
            return Err(LabError::Database(format!(
                "Vector for chunk {} has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                self.dimension
            )));
        }

        debug!("Storing batch of {} vectors", records.len());

        let record_batch = self.create_record_batch(records)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| db_error("Failed to insert vectors", e))?;

        info!("Stored {} vectors", records.len());
        Ok(())
    }

    fn create_record_batch(&self, records: &[ChunkRecord]) -> Result<RecordBatch> {
        let mut flat_values = Vec::with_capacity(records.len() * self.dimension);
        for record in records {
            flat_values.extend_from_slice(&record.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| db_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()))),
            Arc::new(vector_array),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.document_id.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.content.as_str()),
            )),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| db_error("Failed to create record batch", e))
    }

    /// Nearest chunks to `query_vector`, closest first.
    ///
    /// `only_ids` restricts candidates to the given chunk ids; an empty
    /// restriction matches nothing.
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        only_ids: Option<&[String]>,
    ) -> Result<Vec<VectorHit>> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if limit == 0 || only_ids.is_some_and(<[String]>::is_empty) {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| db_error("Failed to create vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        if let Some(ids) = only_ids {
            query = query.only_if(id_predicate(ids));
        }

        let mut results = query
            .execute()
            .await
            .map_err(|e| db_error("Failed to execute search", e))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| db_error("Failed to read result stream", e))?
        {
            hits.extend(Self::parse_search_batch(&batch)?);
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        debug!("Vector search returned {} hits", hits.len());
        Ok(hits)
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .ok_or_else(|| LabError::Database(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| LabError::Database(format!("Invalid {} column type", name)))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<VectorHit>> {
        let ids = Self::string_column(batch, "id")?;
        let document_ids = Self::string_column(batch, "document_id")?;
        let contents = Self::string_column(batch, "content")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        Ok((0..batch.num_rows())
            .map(|row| {
                let distance =
                    distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });
                VectorHit {
                    chunk_id: ids.value(row).to_string(),
                    document_id: document_ids.value(row).to_string(),
                    content: contents.value(row).to_string(),
                    distance,
                    similarity: 1.0 - distance,
                }
            })
            .collect())
    }

    /// Delete vectors by chunk id
    #[inline]
    pub async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let table = self.open_table().await?;
        for batch in ids.chunks(MAX_IDS_PER_PREDICATE) {
            table
                .delete(&id_predicate(batch))
                .await
                .map_err(|e| db_error("Failed to delete vectors", e))?;
        }

        info!("Deleted {} vectors", ids.len());
        Ok(())
    }

    /// Get the total number of vectors stored
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| db_error("Failed to count rows", e))
    }

    /// Move a database that cannot be opened out of the way
    fn attempt_corruption_recovery(db_path: &Path) -> Result<()> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path: PathBuf = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path)
                .map_err(|e| db_error("Failed to remove corrupted database", e))?;
        }

        info!("Database corruption recovery completed");
        Ok(())
    }
}
