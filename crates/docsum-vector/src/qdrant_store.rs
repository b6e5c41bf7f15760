//! Qdrant implementation for vector storage
//!
//! Document ids are arbitrary strings, so each one is mapped to a UUID v5
//! point id. The original id, its insertion sequence, the text and the
//! metadata travel in the point payload.
//!
//! Inserts into one collection are serialized within the process by a lock
//! held from the id lookup until the upsert returns. Collections do not
//! share locks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use docsum_core::{DocsumError, Metadata, Result, StoreConfig};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    vectors_config, CountPointsBuilder, CreateCollectionBuilder, Distance, GetPointsBuilder,
    PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    rank, validate_collection_name, Collection, DistanceMetric, ScoredRecord, VectorRecord,
    VectorStore,
};

const ID_FIELD: &str = "doc_id";
const TEXT_FIELD: &str = "text";
const SEQ_FIELD: &str = "seq";
const METADATA_FIELD: &str = "metadata";

/// Qdrant vector store implementation
pub struct QdrantStore {
    client: Qdrant,
    insert_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl QdrantStore {
    /// Connect to a Qdrant server
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| DocsumError::Storage(format!("Qdrant connection failed: {e}")))?;

        Ok(Self {
            client,
            insert_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Connect using the store configuration
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::new(&config.qdrant_url)
    }

    async fn ensure_exists(&self, name: &str) -> Result<()> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| storage_error("check collection", e))?;
        if exists {
            Ok(())
        } else {
            Err(DocsumError::CollectionNotFound(name.to_string()))
        }
    }

    /// Lock guarding id checks and sequence numbers of one collection
    async fn collection_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.insert_locks
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    async fn existing_ids(&self, collection: &str, records: &[VectorRecord]) -> Result<Vec<String>> {
        let ids: Vec<PointId> = records.iter().map(|r| point_id(&r.id)).collect();
        let response = self
            .client
            .get_points(GetPointsBuilder::new(collection, ids).with_payload(true))
            .await
            .map_err(|e| storage_error("look up points", e))?;

        Ok(response
            .result
            .iter()
            .filter_map(|point| point.payload.get(ID_FIELD).and_then(extract_string))
            .collect())
    }
}

fn storage_error(action: &str, err: qdrant_client::QdrantError) -> DocsumError {
    DocsumError::Storage(format!("Qdrant failed to {action}: {err}"))
}

/// Stable point id for a document id
fn point_id(id: &str) -> PointId {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, id.as_bytes())
        .to_string()
        .into()
}

fn extract_string(value: &QdrantValue) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn extract_metadata(value: &QdrantValue) -> Metadata {
    match &value.kind {
        Some(Kind::StructValue(s)) => s
            .fields
            .iter()
            .filter_map(|(k, v)| extract_string(v).map(|s| (k.clone(), s)))
            .collect(),
        _ => Metadata::new(),
    }
}

fn payload_json(record: &VectorRecord, seq: u64) -> serde_json::Value {
    let metadata: serde_json::Map<String, serde_json::Value> = record
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();

    serde_json::json!({
        ID_FIELD: record.id,
        TEXT_FIELD: record.text,
        SEQ_FIELD: seq,
        METADATA_FIELD: metadata,
    })
}

fn payload(record: &VectorRecord, seq: u64) -> Result<Payload> {
    Payload::try_from(payload_json(record, seq))
        .map_err(|e| DocsumError::Storage(format!("invalid payload: {e}")))
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn create_collection(&self, collection: &Collection) -> Result<()> {
        validate_collection_name(&collection.name)?;

        let exists = self
            .client
            .collection_exists(collection.name.as_str())
            .await
            .map_err(|e| storage_error("check collection", e))?;
        if exists {
            return Err(DocsumError::CollectionExists(collection.name.clone()));
        }

        let distance = match collection.metric {
            DistanceMetric::Cosine => Distance::Cosine,
        };
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection.name.as_str())
                    .vectors_config(VectorParamsBuilder::new(collection.dimension as u64, distance)),
            )
            .await
            .map_err(|e| storage_error("create collection", e))?;

        tracing::info!(collection = %collection.name, dimension = collection.dimension, "qdrant collection created");
        Ok(())
    }

    async fn get_collection(&self, name: &str) -> Result<Collection> {
        self.ensure_exists(name).await?;

        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| storage_error("read collection info", e))?;

        let dimension = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|config| match config {
                vectors_config::Config::Params(params) => Some(params.size as usize),
                vectors_config::Config::ParamsMap(_) => None,
            })
            .ok_or_else(|| {
                DocsumError::Storage(format!("collection {name} has no single vector config"))
            })?;

        // Qdrant keeps no model name; callers treat an empty one as unknown.
        Ok(Collection::new(name, dimension, ""))
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|e| storage_error("list collections", e))?;

        let mut names: Vec<String> = response.collections.into_iter().map(|c| c.name).collect();
        names.sort();

        let mut collections = Vec::with_capacity(names.len());
        for name in names {
            collections.push(self.get_collection(&name).await?);
        }
        Ok(collections)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.ensure_exists(name).await?;
        self.client
            .delete_collection(name)
            .await
            .map_err(|e| storage_error("delete collection", e))?;
        self.insert_locks.lock().await.remove(name);
        tracing::info!(collection = %name, "qdrant collection deleted");
        Ok(())
    }

    async fn insert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<usize> {
        let meta = self.get_collection(collection).await?;
        if records.is_empty() {
            return Ok(0);
        }

        let lock = self.collection_lock(collection).await;
        let _guard = lock.lock().await;
        let existing = self.existing_ids(collection, &records).await?;
        let mut seq = self.count(collection).await? as u64;

        let mut seen: HashSet<String> = existing.into_iter().collect();
        let mut points = Vec::with_capacity(records.len());
        let mut failure = None;

        for record in &records {
            if let Err(err) = meta.check_dimension(&record.vector.values) {
                failure = Some(err);
                break;
            }
            if !seen.insert(record.id.clone()) {
                failure = Some(DocsumError::DuplicateId {
                    collection: collection.to_string(),
                    id: record.id.clone(),
                });
                break;
            }

            points.push(PointStruct::new(
                point_id(&record.id),
                record.vector.values.clone(),
                payload(record, seq)?,
            ));
            seq += 1;
        }

        let inserted = points.len();
        if inserted > 0 {
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
                .await
                .map_err(|e| storage_error("upsert points", e))?;
        }

        tracing::debug!(collection = %collection, inserted, "qdrant points inserted");
        match failure {
            Some(err) => Err(err),
            None => Ok(inserted),
        }
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        self.get_collection(collection).await?.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, query.to_vec(), k as u64).with_payload(true),
            )
            .await
            .map_err(|e| storage_error("search", e))?;

        let hits = response
            .result
            .into_iter()
            .map(|point| {
                let payload: HashMap<String, QdrantValue> = point.payload;
                let seq = payload
                    .get(SEQ_FIELD)
                    .and_then(|v| match &v.kind {
                        Some(Kind::IntegerValue(n)) => u64::try_from(*n).ok(),
                        _ => None,
                    })
                    .unwrap_or(u64::MAX);

                ScoredRecord {
                    id: payload.get(ID_FIELD).and_then(extract_string).unwrap_or_default(),
                    text: payload.get(TEXT_FIELD).and_then(extract_string).unwrap_or_default(),
                    metadata: payload.get(METADATA_FIELD).map(extract_metadata).unwrap_or_default(),
                    distance: 1.0 - point.score,
                    seq,
                }
            })
            .collect();

        Ok(rank(hits, k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(|e| storage_error("count points", e))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}
