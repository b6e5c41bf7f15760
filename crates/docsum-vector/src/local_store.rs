//! Persistent local vector store
//!
//! Each collection lives in `<root>/<name>.json` and is rewritten through a
//! temporary file and rename after every mutation, so a crash leaves either
//! the previous or the new state on disk. Search is exhaustive.
//!
//! Every collection has its own lock. An insert holds that collection's
//! write lock from the duplicate check until the file is replaced, so two
//! writers racing on the same id see exactly one success. A failed write
//! leaves the in-memory state as it was before the insert.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use docsum_core::{DocsumError, Metadata, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{rank, validate_collection_name, Collection, ScoredRecord, VectorRecord, VectorStore};

const FILE_EXTENSION: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    id: String,
    text: String,
    vector: Vec<f32>,
    #[serde(default)]
    metadata: Metadata,
    seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionFile {
    collection: Collection,
    next_seq: u64,
    entries: Vec<StoredEntry>,
}

#[derive(Debug)]
struct CollectionState {
    file: CollectionFile,
    ids: HashSet<String>,
}

impl CollectionState {
    fn new(file: CollectionFile) -> Self {
        let ids = file.entries.iter().map(|e| e.id.clone()).collect();
        Self { file, ids }
    }
}

type CollectionHandle = Arc<RwLock<CollectionState>>;

/// Vector store persisted as JSON files in a directory
pub struct LocalVectorStore {
    root: PathBuf,
    collections: RwLock<BTreeMap<String, CollectionHandle>>,
}

impl LocalVectorStore {
    /// Open (or create) a store rooted at `root`, loading every collection file
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| storage_error(&root, "create store directory", e))?;

        let mut collections = BTreeMap::new();
        let mut dir = tokio::fs::read_dir(&root)
            .await
            .map_err(|e| storage_error(&root, "read store directory", e))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| storage_error(&root, "read store directory", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }

            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| storage_error(&path, "read collection", e))?;
            let file: CollectionFile = serde_json::from_slice(&bytes).map_err(|e| {
                DocsumError::Storage(format!("corrupt collection file {}: {e}", path.display()))
            })?;

            tracing::debug!(
                collection = %file.collection.name,
                entries = file.entries.len(),
                "loaded collection"
            );
            collections.insert(
                file.collection.name.clone(),
                Arc::new(RwLock::new(CollectionState::new(file))),
            );
        }

        tracing::info!(root = %root.display(), collections = collections.len(), "local vector store opened");

        Ok(Self {
            root,
            collections: RwLock::new(collections),
        })
    }

    /// Directory holding the collection files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write every collection to disk and release the store
    pub async fn close(self) -> Result<()> {
        let collections = self.collections.read().await;
        for handle in collections.values() {
            let state = handle.read().await;
            persist(&self.root, &state.file).await?;
        }
        tracing::debug!(root = %self.root.display(), "local vector store closed");
        Ok(())
    }

    async fn handle(&self, name: &str) -> Result<CollectionHandle> {
        self.collections
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| DocsumError::CollectionNotFound(name.to_string()))
    }
}

fn collection_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{name}.{FILE_EXTENSION}"))
}

fn storage_error(path: &Path, action: &str, err: std::io::Error) -> DocsumError {
    DocsumError::Storage(format!("failed to {action} {}: {err}", path.display()))
}

async fn persist(root: &Path, file: &CollectionFile) -> Result<()> {
    let path = collection_path(root, &file.collection.name);
    let tmp = path.with_extension(format!("{FILE_EXTENSION}.tmp"));

    let bytes = serde_json::to_vec(file)
        .map_err(|e| DocsumError::Storage(format!("failed to serialize collection: {e}")))?;

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| storage_error(&tmp, "write", e))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .map_err(|e| storage_error(&path, "replace", e))?;
    Ok(())
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn create_collection(&self, collection: &Collection) -> Result<()> {
        validate_collection_name(&collection.name)?;

        let mut collections = self.collections.write().await;
        if collections.contains_key(&collection.name) {
            return Err(DocsumError::CollectionExists(collection.name.clone()));
        }

        let file = CollectionFile {
            collection: collection.clone(),
            next_seq: 0,
            entries: Vec::new(),
        };
        persist(&self.root, &file).await?;
        collections.insert(
            collection.name.clone(),
            Arc::new(RwLock::new(CollectionState::new(file))),
        );

        tracing::info!(
            collection = %collection.name,
            dimension = collection.dimension,
            "collection created"
        );
        Ok(())
    }

    async fn get_collection(&self, name: &str) -> Result<Collection> {
        let handle = self.handle(name).await?;
        let state = handle.read().await;
        Ok(state.file.collection.clone())
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let collections = self.collections.read().await;
        let mut result = Vec::with_capacity(collections.len());
        for handle in collections.values() {
            result.push(handle.read().await.file.collection.clone());
        }
        Ok(result)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.remove(name).is_none() {
            return Err(DocsumError::CollectionNotFound(name.to_string()));
        }

        let path = collection_path(&self.root, name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(storage_error(&path, "remove", e)),
        }

        tracing::info!(collection = %name, "collection deleted");
        Ok(())
    }

    async fn insert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<usize> {
        let handle = self.handle(collection).await?;
        let mut state = handle.write().await;
        let rollback_len = state.file.entries.len();
        let rollback_seq = state.file.next_seq;

        let mut inserted = 0;
        let mut failure = None;
        for record in records {
            if let Err(err) = state.file.collection.check_dimension(&record.vector.values) {
                failure = Some(err);
                break;
            }
            if !state.ids.insert(record.id.clone()) {
                failure = Some(DocsumError::DuplicateId {
                    collection: collection.to_string(),
                    id: record.id,
                });
                break;
            }

            let seq = state.file.next_seq;
            state.file.next_seq += 1;
            state.file.entries.push(StoredEntry {
                id: record.id,
                text: record.text,
                vector: record.vector.values,
                metadata: record.metadata,
                seq,
            });
            inserted += 1;
        }

        if inserted > 0 {
            let written = persist(&self.root, &state.file).await;
            if let Err(err) = written {
                let state = &mut *state;
                for entry in state.file.entries.drain(rollback_len..) {
                    state.ids.remove(&entry.id);
                }
                state.file.next_seq = rollback_seq;
                tracing::warn!(collection = %collection, error = %err, "insert rolled back");
                return Err(err);
            }
        }

        tracing::debug!(collection = %collection, inserted, "records inserted");
        match failure {
            Some(err) => Err(err),
            None => Ok(inserted),
        }
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        let handle = self.handle(collection).await?;
        let state = handle.read().await;
        let meta = &state.file.collection;

        meta.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let hits = state
            .file
            .entries
            .iter()
            .map(|entry| ScoredRecord {
                id: entry.id.clone(),
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                distance: meta.metric.distance(query, &entry.vector),
                seq: entry.seq,
            })
            .collect();

        Ok(rank(hits, k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let handle = self.handle(collection).await?;
        let state = handle.read().await;
        Ok(state.file.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmbeddingVector;
    use tempfile::TempDir;

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            text: format!("text of {id}"),
            vector: EmbeddingVector {
                owner_id: id.to_string(),
                values,
            },
            metadata: Metadata::new(),
        }
    }

    async fn store_with_collection() -> (TempDir, LocalVectorStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        store
            .create_collection(&Collection::new("papers", 2, "fake"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_collection_twice_fails() {
        let (_dir, store) = store_with_collection().await;
        let err = store
            .create_collection(&Collection::new("papers", 2, "fake"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocsumError::CollectionExists(name) if name == "papers"));
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let dir = TempDir::new().unwrap();
        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        let err = store
            .create_collection(&Collection::new("../escape", 2, "fake"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocsumError::InvalidCollectionName(_)));
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let (_dir, store) = store_with_collection().await;
        assert!(matches!(
            store.count("missing").await,
            Err(DocsumError::CollectionNotFound(_))
        ));
        assert!(matches!(
            store.insert("missing", vec![record("a", vec![1.0, 0.0])]).await,
            Err(DocsumError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_keeps_earlier_records_only() {
        let (_dir, store) = store_with_collection().await;
        store.insert("papers", vec![record("a", vec![1.0, 0.0])]).await.unwrap();

        let err = store
            .insert(
                "papers",
                vec![
                    record("b", vec![0.0, 1.0]),
                    record("a", vec![0.5, 0.5]),
                    record("c", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DocsumError::DuplicateId { ref id, .. } if id == "a"));
        assert_eq!(store.count("papers").await.unwrap(), 2);

        let hits = store.search("papers", &[1.0, 0.0], 10).await.unwrap();
        let a = hits.iter().find(|h| h.id == "a").unwrap();
        assert!(a.distance.abs() < 1e-6, "first occurrence of 'a' must survive");
        assert!(hits.iter().all(|h| h.id != "c"));
    }

    #[tokio::test]
    async fn test_duplicate_within_one_batch() {
        let (_dir, store) = store_with_collection().await;
        let result = store
            .insert("papers", vec![record("x", vec![1.0, 0.0]), record("x", vec![0.0, 1.0])])
            .await;
        assert!(matches!(result, Err(DocsumError::DuplicateId { .. })));
        assert_eq!(store.count("papers").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dimension_checked_on_insert_and_search() {
        let (_dir, store) = store_with_collection().await;
        assert!(matches!(
            store.insert("papers", vec![record("a", vec![1.0, 0.0, 0.0])]).await,
            Err(DocsumError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            store.search("papers", &[1.0], 1).await,
            Err(DocsumError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[tokio::test]
    async fn test_search_ordering_and_limits() {
        let (_dir, store) = store_with_collection().await;
        store
            .insert(
                "papers",
                vec![
                    record("orthogonal", vec![0.0, 1.0]),
                    record("same", vec![2.0, 0.0]),
                    record("tie-first", vec![1.0, 1.0]),
                    record("tie-second", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("papers", &[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["same", "tie-first", "tie-second"]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

        assert_eq!(store.search("papers", &[1.0, 0.0], 50).await.unwrap().len(), 4);
        assert!(store.search("papers", &[1.0, 0.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collections_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalVectorStore::open(dir.path()).await.unwrap();
            store
                .create_collection(&Collection::new("LLM-Test-Instadeep", 2, "fake"))
                .await
                .unwrap();
            store
                .insert("LLM-Test-Instadeep", vec![record("a", vec![1.0, 0.0])])
                .await
                .unwrap();
            store.close().await.unwrap();
        }

        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        let collections = store.list_collections().await.unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].embedding_model, "fake");
        assert_eq!(store.count("LLM-Test-Instadeep").await.unwrap(), 1);

        // Sequence numbers continue after reopen
        store
            .insert("LLM-Test-Instadeep", vec![record("b", vec![1.0, 0.0])])
            .await
            .unwrap();
        let hits = store.search("LLM-Test-Instadeep", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].seq, 1);
    }

    #[tokio::test]
    async fn test_delete_collection_removes_file() {
        let (dir, store) = store_with_collection().await;
        assert!(dir.path().join("papers.json").exists());

        store.delete_collection("papers").await.unwrap();
        assert!(!dir.path().join("papers.json").exists());
        assert!(matches!(
            store.delete_collection("papers").await,
            Err(DocsumError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_insert() {
        let (dir, store) = store_with_collection().await;
        store.insert("papers", vec![record("a", vec![1.0, 0.0])]).await.unwrap();

        let blocker = dir.path().join("papers.json.tmp");
        std::fs::create_dir(&blocker).unwrap();
        let err = store
            .insert("papers", vec![record("b", vec![0.0, 1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, DocsumError::Storage(_)));
        assert_eq!(store.count("papers").await.unwrap(), 1);
        let hits = store.search("papers", &[0.0, 1.0], 10).await.unwrap();
        assert!(hits.iter().all(|h| h.id != "b"));

        std::fs::remove_dir(&blocker).unwrap();
        assert_eq!(
            store.insert("papers", vec![record("b", vec![0.0, 1.0])]).await.unwrap(),
            1
        );
        let hits = store.search("papers", &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[0].seq, 1);
    }

    #[tokio::test]
    async fn test_concurrent_insert_of_same_id_admits_one() {
        let (_dir, store) = store_with_collection().await;
        let (first, second) = tokio::join!(
            store.insert("papers", vec![record("same", vec![1.0, 0.0])]),
            store.insert("papers", vec![record("same", vec![0.0, 1.0])]),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(DocsumError::DuplicateId { .. })))
                .count(),
            1
        );
        assert_eq!(store.count("papers").await.unwrap(), 1);
    }
}
