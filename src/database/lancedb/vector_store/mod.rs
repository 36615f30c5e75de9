
use super::{ChunkMetadata, EmbeddingRecord};
use crate::{RagError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::{
    Connection, Table,
    query::{ExecutableQuery, QueryBase},
};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File naming the active table, replaced atomically on rebuild
pub const MANIFEST_FILE: &str = "manifest.json";
/// Present while a build is running
pub const LOCK_FILE: &str = ".build.lock";

const TABLE_PREFIX: &str = "chunks_";

/// Describes the active table of an index directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub table: String,
    pub chunk_count: usize,
    pub dimension: usize,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
}

impl IndexManifest {
    /// Read the manifest of `index_dir`, or `None` when no index has been built there
    #[inline]
    pub fn read(index_dir: &Path) -> crate::Result<Option<Self>> {
        let path = index_dir.join(MANIFEST_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(corrupt(
                    index_dir,
                    format!("failed to read {}: {}", MANIFEST_FILE, e),
                ));
            }
        };

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| corrupt(index_dir, format!("invalid {}: {}", MANIFEST_FILE, e)))
    }

    /// Write to a temporary file and rename it over the current manifest
    fn write(&self, index_dir: &Path) -> crate::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RagError::Index(format!("Failed to serialize manifest: {}", e)))?;
        let temp_path = index_dir.join(format!("{}.tmp", MANIFEST_FILE));
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, index_dir.join(MANIFEST_FILE))?;
        Ok(())
    }
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub chunk_metadata: ChunkMetadata,
    /// Distance to the query vector, lower is closer
    pub distance: f32,
}

/// Read-only handle on the active table of an index directory
pub struct VectorIndex {
    path: PathBuf,
    table: Table,
    manifest: IndexManifest,
}

impl std::fmt::Debug for VectorIndex {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("path", &self.path)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Open the index configured in `config`
    #[inline]
    pub async fn open(config: &Config) -> crate::Result<Option<Self>> {
        Self::open_at(&config.index_path(), &config.ollama.embedding_model).await
    }

    /// Open the index in `index_dir`.
    ///
    /// Returns `Ok(None)` when nothing has been built yet. A manifest that cannot be
    /// read or that names a missing table is reported as [`RagError::IndexCorrupt`].
    #[inline]
    pub async fn open_at(index_dir: &Path, embedding_model: &str) -> crate::Result<Option<Self>> {
        let Some(manifest) = IndexManifest::read(index_dir)? else {
            debug!("No index manifest in {}", index_dir.display());
            return Ok(None);
        };

        if manifest.embedding_model != embedding_model {
            return Err(RagError::Index(format!(
                "Index was built with embedding model '{}' but '{}' is configured; rebuild the index",
                manifest.embedding_model, embedding_model
            )));
        }

        let connection = connect(index_dir).await?;
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Index(format!("Failed to list tables: {}", e)))?;

        if !table_names.contains(&manifest.table) {
            return Err(corrupt(
                index_dir,
                format!("table '{}' named by the manifest is missing", manifest.table),
            ));
        }

        let table = connection
            .open_table(&manifest.table)
            .execute()
            .await
            .map_err(|e| corrupt(index_dir, format!("failed to open table: {}", e)))?;

        info!(
            "Opened index {} ({} chunks, {} dimensions)",
            manifest.table, manifest.chunk_count, manifest.dimension
        );

        Ok(Some(Self {
            path: index_dir.to_path_buf(),
            table,
            manifest,
        }))
    }

    /// Write `records` into a new table and make it the active one.
    ///
    /// The previous table stays active until the manifest is swapped, and is dropped
    /// afterwards. Fails fast when another build holds the lock.
    #[inline]
    pub async fn build(
        index_dir: &Path,
        records: &[EmbeddingRecord],
        dimension: usize,
        embedding_model: &str,
    ) -> crate::Result<Self> {
        if let Some(record) = records.iter().find(|r| r.vector.len() != dimension) {
            return Err(RagError::Index(format!(
                "Record {} has {} dimensions, expected {}",
                record.id,
                record.vector.len(),
                dimension
            )));
        }

        fs::create_dir_all(index_dir)?;
        let _lock = BuildLock::acquire(index_dir)?;

        if let Err(e) = IndexManifest::read(index_dir) {
            warn!("Replacing unreadable index: {}", e);
        }

        let connection = connect(index_dir).await?;
        let table_name = format!("{}{}", TABLE_PREFIX, Uuid::new_v4().simple());
        let schema = create_schema(dimension)?;

        debug!("Creating staging table {}", table_name);
        let table = connection
            .create_empty_table(&table_name, Arc::clone(&schema))
            .execute()
            .await
            .map_err(|e| RagError::Index(format!("Failed to create table: {}", e)))?;

        if !records.is_empty() {
            let record_batch = create_record_batch(records, dimension, Arc::clone(&schema))?;
            let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
            table
                .add(reader)
                .execute()
                .await
                .map_err(|e| RagError::Index(format!("Failed to insert embeddings: {}", e)))?;
        }

        let manifest = IndexManifest {
            table: table_name,
            chunk_count: records.len(),
            dimension,
            embedding_model: embedding_model.to_string(),
            created_at: Utc::now(),
        };
        manifest.write(index_dir)?;
        info!(
            "Activated index table {} with {} chunks",
            manifest.table, manifest.chunk_count
        );

        drop_inactive_tables(&connection, &manifest.table).await;

        Ok(Self {
            path: index_dir.to_path_buf(),
            table,
            manifest,
        })
    }

    #[inline]
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.manifest.chunk_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.manifest.chunk_count == 0
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.manifest.dimension
    }

    /// Count rows in the active table
    #[inline]
    pub async fn count_rows(&self) -> crate::Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Index(format!("Failed to count rows: {}", e)))
    }

    /// Search for the `limit` nearest chunks, closest first
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> crate::Result<Vec<SearchResult>> {
        if self.is_empty() || limit == 0 {
            debug!("Skipping search on empty index");
            return Ok(Vec::new());
        }

        if query_vector.len() != self.manifest.dimension {
            return Err(RagError::Index(format!(
                "Query vector has {} dimensions, index expects {}",
                query_vector.len(),
                self.manifest.dimension
            )));
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| RagError::Index(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Index(format!("Failed to execute search: {}", e)))?;

        parse_search_results_stream(results).await
    }
}

/// Exclusive marker for a running build, removed on drop
#[derive(Debug)]
struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    fn acquire(index_dir: &Path) -> crate::Result<Self> {
        let path = index_dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(RagError::Index(format!(
                "Another index build is in progress (remove {} if it is stale)",
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove build lock {}: {}", self.path.display(), e);
        }
    }
}

fn corrupt(index_dir: &Path, reason: String) -> RagError {
    RagError::IndexCorrupt {
        path: index_dir.display().to_string(),
        reason,
    }
}

async fn connect(index_dir: &Path) -> crate::Result<Connection> {
    let uri = index_dir.to_string_lossy();
    lancedb::connect(&uri).execute().await.map_err(|e| {
        RagError::Index(format!(
            "Failed to connect to LanceDB at {}: {}",
            index_dir.display(),
            e
        ))
    })
}

/// Drop every chunk table except the active one, including orphans of interrupted builds
async fn drop_inactive_tables(connection: &Connection, active: &str) {
    let table_names = match connection.table_names().execute().await {
        Ok(names) => names,
        Err(e) => {
            warn!("Failed to list tables for cleanup: {}", e);
            return;
        }
    };

    for name in table_names {
        if name == active || !name.starts_with(TABLE_PREFIX) {
            continue;
        }
        match connection.drop_table(&name).await {
            Ok(()) => debug!("Dropped inactive table {}", name),
            Err(e) => warn!("Failed to drop inactive table {}: {}", name, e),
        }
    }
}

fn create_schema(dimension: usize) -> crate::Result<Arc<Schema>> {
    let size = i32::try_from(dimension)
        .map_err(|_| RagError::Index(format!("Unsupported vector dimension {}", dimension)))?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                size,
            ),
            false,
        ),
        Field::new("content", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("file_type", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, true),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("start_index", DataType::UInt64, false),
        Field::new("created_at", DataType::Utf8, false),
    ])))
}

/// Create a RecordBatch from embedding records
fn create_record_batch(
    records: &[EmbeddingRecord],
    dimension: usize,
    schema: Arc<Schema>,
) -> crate::Result<RecordBatch> {
    let len = records.len();
    let size = i32::try_from(dimension)
        .map_err(|_| RagError::Index(format!("Unsupported vector dimension {}", dimension)))?;

    let mut ids = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * dimension);
    let mut contents = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut file_types = Vec::with_capacity(len);
    let mut pages = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut start_indices = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);

    for record in records {
        ids.push(record.id.as_str());
        flat_values.extend_from_slice(&record.vector);
        contents.push(record.metadata.content.as_str());
        sources.push(record.metadata.source.as_str());
        file_types.push(record.metadata.file_type.as_str());
        pages.push(record.metadata.page);
        chunk_indices.push(record.metadata.chunk_index);
        start_indices.push(record.metadata.start_index);
        created_ats.push(record.metadata.created_at.as_str());
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        size,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::Index(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(contents)),
        Arc::new(StringArray::from(sources)),
        Arc::new(StringArray::from(file_types)),
        Arc::new(UInt32Array::from(pages)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(UInt64Array::from(start_indices)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| RagError::Index(format!("Failed to create record batch: {}", e)))
}

/// Parse search results from LanceDB stream into SearchResult structs
async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> crate::Result<Vec<SearchResult>> {
    let mut search_results = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| RagError::Index(format!("Failed to read result stream: {}", e)))?
    {
        search_results.extend(parse_search_batch(&batch)?);
    }

    debug!("Parsed {} search results from stream", search_results.len());
    Ok(search_results)
}

fn typed_column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> crate::Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Index(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Index(format!("Invalid {} column type", name)))
}

/// Parse a single record batch from search results
fn parse_search_batch(batch: &RecordBatch) -> crate::Result<Vec<SearchResult>> {
    let ids = typed_column::<StringArray>(batch, "id")?;
    let contents = typed_column::<StringArray>(batch, "content")?;
    let sources = typed_column::<StringArray>(batch, "source")?;
    let file_types = typed_column::<StringArray>(batch, "file_type")?;
    let pages = typed_column::<UInt32Array>(batch, "page")?;
    let chunk_indices = typed_column::<UInt32Array>(batch, "chunk_index")?;
    let start_indices = typed_column::<UInt64Array>(batch, "start_index")?;
    let created_ats = typed_column::<StringArray>(batch, "created_at")?;
    let distances = typed_column::<Float32Array>(batch, "_distance").ok();

    let results = (0..batch.num_rows())
        .map(|row| SearchResult {
            id: ids.value(row).to_string(),
            chunk_metadata: ChunkMetadata {
                content: contents.value(row).to_string(),
                source: sources.value(row).to_string(),
                file_type: file_types.value(row).to_string(),
                page: (!pages.is_null(row)).then(|| pages.value(row)),
                chunk_index: chunk_indices.value(row),
                start_index: start_indices.value(row),
                created_at: created_ats.value(row).to_string(),
            },
            distance: distances
                .filter(|d| !d.is_null(row))
                .map_or(0.0, |d| d.value(row)),
        })
        .collect();

    Ok(results)
}
