//! Retriever backed by a [`VectorIndex`] collection

use std::sync::Arc;

use async_trait::async_trait;
use docsum_core::{Document, Result, Retriever};

use crate::index::VectorIndex;

/// Returns the documents nearest to a query, without scores
pub struct VectorRetriever {
    index: Arc<VectorIndex>,
    collection: String,
}

impl VectorRetriever {
    pub fn new(index: Arc<VectorIndex>, collection: impl Into<String>) -> Self {
        Self {
            index,
            collection: collection.into(),
        }
    }

    /// Collection queried by this retriever
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let hits = self.index.query(&self.collection, query, k).await?;
        Ok(hits.into_iter().map(|hit| hit.document).collect())
    }

    fn name(&self) -> &str {
        "vector"
    }
}
