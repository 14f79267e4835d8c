//! JSON-file-backed vector store.
//!
//! [`FileVectorStore`] keeps the same snapshot-swap discipline as
//! [`InMemoryVectorStore`](crate::InMemoryVectorStore) and persists every new
//! snapshot before publishing it. The file is written to a temporary sibling
//! and renamed over the index, so a reader (or a crash) never sees a
//! half-written index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::document::{EmbeddingRecord, SearchResult};
use crate::error::{RagError, Result};
use crate::inmemory::IndexSnapshot;
use crate::vectorstore::{DistanceMetric, VectorStore};

const BACKEND: &str = "file";

/// Bumped whenever the on-disk layout changes.
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    #[serde(flatten)]
    snapshot: IndexSnapshot,
}

/// A [`VectorStore`] persisted as a single JSON file.
///
/// # Example
///
/// ```rust,ignore
/// use chessie_rag::{DistanceMetric, FileVectorStore, VectorStore};
///
/// let store = FileVectorStore::open("data/index.json", 384, DistanceMetric::Cosine).await?;
/// println!("{} records", store.len().await);
/// ```
#[derive(Debug)]
pub struct FileVectorStore {
    path: PathBuf,
    dimensions: usize,
    metric: DistanceMetric,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    write_lock: Mutex<()>,
}

impl FileVectorStore {
    /// Open the index at `path`, expecting `dimensions` and `metric`.
    ///
    /// A missing file yields an empty index; nothing is written until the
    /// first [`rebuild`](VectorStore::rebuild) or
    /// [`upsert_sources`](VectorStore::upsert_sources).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the file is corrupt or was built
    /// with a different dimensionality or metric.
    pub async fn open(
        path: impl Into<PathBuf>,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Result<Self> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => load_snapshot(&path, &bytes, dimensions, metric)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no index file yet, starting empty");
                IndexSnapshot::empty(dimensions, metric)
            }
            Err(e) => {
                return Err(RagError::ConfigError(format!(
                    "cannot read index '{}': {e}",
                    path.display()
                )));
            }
        };

        info!(
            path = %path.display(),
            records = snapshot.records.len(),
            dimensions,
            %metric,
            "index opened"
        );
        Ok(Self::with_snapshot(path, snapshot))
    }

    /// An empty index at `path` that ignores any existing file.
    ///
    /// The existing file is replaced by the first write, which makes this the
    /// entry point for a full rebuild after changing dimensions or metric.
    pub fn create(path: impl Into<PathBuf>, dimensions: usize, metric: DistanceMetric) -> Self {
        Self::with_snapshot(path.into(), IndexSnapshot::empty(dimensions, metric))
    }

    fn with_snapshot(path: PathBuf, snapshot: IndexSnapshot) -> Self {
        Self {
            path,
            dimensions: snapshot.dimensions,
            metric: snapshot.metric,
            snapshot: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn current(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Write `snapshot` to a temporary sibling, then rename it over the index.
    async fn persist(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let file = IndexFile { version: FORMAT_VERSION, snapshot: snapshot.clone() };
        let bytes = serde_json::to_vec(&file)?;

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            tokio::fs::create_dir_all(dir).await.map_err(|e| self.write_error(e))?;
        }
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index.json".to_string());
        let tmp = self.path.with_file_name(format!(".{file_name}.tmp"));

        tokio::fs::write(&tmp, &bytes).await.map_err(|e| self.write_error(e))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| self.write_error(e))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "index persisted");
        Ok(())
    }

    fn write_error(&self, e: std::io::Error) -> RagError {
        error!(path = %self.path.display(), error = %e, "failed to write index");
        RagError::VectorStoreError {
            backend: BACKEND.to_string(),
            message: format!("cannot write index '{}': {e}", self.path.display()),
        }
    }

    async fn publish(&self, next: IndexSnapshot) -> Result<()> {
        self.persist(&next).await?;
        *self.snapshot.write().await = Arc::new(next);
        Ok(())
    }
}

fn load_snapshot(
    path: &Path,
    bytes: &[u8],
    dimensions: usize,
    metric: DistanceMetric,
) -> Result<IndexSnapshot> {
    let file: IndexFile = serde_json::from_slice(bytes).map_err(|e| {
        RagError::ConfigError(format!("index '{}' is corrupt: {e}", path.display()))
    })?;
    if file.version != FORMAT_VERSION {
        return Err(RagError::ConfigError(format!(
            "index '{}' has format version {}, expected {FORMAT_VERSION}; rebuild it",
            path.display(),
            file.version
        )));
    }

    let snapshot = file.snapshot;
    if snapshot.dimensions != dimensions {
        return Err(RagError::ConfigError(format!(
            "index '{}' was built with {} dimensions but the embedder produces {dimensions}; rebuild it",
            path.display(),
            snapshot.dimensions
        )));
    }
    if snapshot.metric != metric {
        return Err(RagError::ConfigError(format!(
            "index '{}' was built with the {} metric but {metric} is configured; rebuild it",
            path.display(),
            snapshot.metric
        )));
    }
    // Re-check record widths so a hand-edited file cannot poison searches.
    IndexSnapshot::with_records(dimensions, metric, snapshot.records, BACKEND)
        .map_err(|e| RagError::ConfigError(format!("index '{}' is corrupt: {e}", path.display())))
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn rebuild(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let next = IndexSnapshot::with_records(self.dimensions, self.metric, records, BACKEND)?;
        self.publish(next).await
    }

    async fn upsert_sources(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let next = self.current().await.with_sources_replaced(records, BACKEND)?;
        self.publish(next).await
    }

    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.current().await.search(embedding, k, BACKEND)
    }

    async fn len(&self) -> usize {
        self.current().await.records.len()
    }

    async fn source_counts(&self) -> BTreeMap<String, usize> {
        self.current().await.source_counts()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn name(&self) -> &str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn record(source: &str, index: usize, embedding: Vec<f32>) -> EmbeddingRecord {
        let chunk = Chunk {
            text: format!("{source} chunk {index}"),
            source_id: source.to_string(),
            chunk_index: index,
            start: 0,
            end: 1,
        };
        EmbeddingRecord::new(chunk, embedding)
    }

    #[tokio::test]
    async fn missing_file_opens_empty_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let store = FileVectorStore::open(&path, 2, DistanceMetric::Cosine).await.unwrap();
        assert!(store.is_empty().await);
        assert!(store.search(&[1.0, 0.0], 3).await.unwrap().is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");
        let store = FileVectorStore::open(&path, 2, DistanceMetric::Cosine).await.unwrap();
        store
            .rebuild(vec![record("a.txt", 0, vec![1.0, 0.0]), record("b.txt", 0, vec![0.0, 1.0])])
            .await
            .unwrap();

        let reopened = FileVectorStore::open(&path, 2, DistanceMetric::Cosine).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        let results = reopened.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].record.id, "a.txt#0");
        assert!(!dir.path().join("nested").join(".index.json.tmp").exists());
    }

    #[tokio::test]
    async fn dimension_mismatch_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let store = FileVectorStore::open(&path, 2, DistanceMetric::Cosine).await.unwrap();
        store.rebuild(vec![record("a.txt", 0, vec![1.0, 0.0])]).await.unwrap();

        let err = FileVectorStore::open(&path, 3, DistanceMetric::Cosine).await.unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[tokio::test]
    async fn metric_mismatch_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let store = FileVectorStore::open(&path, 2, DistanceMetric::Cosine).await.unwrap();
        store.rebuild(vec![record("a.txt", 0, vec![1.0, 0.0])]).await.unwrap();

        let err = FileVectorStore::open(&path, 2, DistanceMetric::Euclidean).await.unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[tokio::test]
    async fn corrupt_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let err = FileVectorStore::open(&path, 2, DistanceMetric::Cosine).await.unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[tokio::test]
    async fn create_replaces_an_incompatible_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let old = FileVectorStore::open(&path, 2, DistanceMetric::Cosine).await.unwrap();
        old.rebuild(vec![record("a.txt", 0, vec![1.0, 0.0])]).await.unwrap();

        let fresh = FileVectorStore::create(&path, 3, DistanceMetric::Euclidean);
        fresh.rebuild(vec![record("b.txt", 0, vec![0.0, 0.0, 1.0])]).await.unwrap();

        let reopened = FileVectorStore::open(&path, 3, DistanceMetric::Euclidean).await.unwrap();
        assert_eq!(reopened.source_counts().await.keys().collect::<Vec<_>>(), vec!["b.txt"]);
    }

    #[tokio::test]
    async fn upsert_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let store = FileVectorStore::open(&path, 2, DistanceMetric::Cosine).await.unwrap();
        store.rebuild(vec![record("a.txt", 0, vec![1.0, 0.0])]).await.unwrap();
        store.upsert_sources(vec![record("b.txt", 0, vec![0.0, 1.0])]).await.unwrap();

        let reopened = FileVectorStore::open(&path, 2, DistanceMetric::Cosine).await.unwrap();
        assert_eq!(reopened.len().await, 2);
    }
}
