//! In-memory vector store
//!
//! Keeps every node in a `RwLock<Vec<Node>>`. Nothing survives a restart,
//! which is exactly what unit tests and throwaway sessions want.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{EngineError, InsertOutcome, MetadataFilter, Node, QueryMatch, VectorStore};

use super::rank_by_overlap;

#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    nodes: RwLock<Vec<Node>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, nodes: Vec<Node>) -> Result<InsertOutcome, EngineError> {
        let mut stored = self.nodes.write().await;
        let mut outcome = InsertOutcome::default();
        for node in nodes {
            if let Some(existing) = stored.iter_mut().find(|n| n.id == node.id) {
                *existing = node;
                outcome.replaced += 1;
            } else {
                stored.push(node);
                outcome.added += 1;
            }
        }
        Ok(outcome)
    }

    async fn delete_where(&self, filter: &MetadataFilter) -> Result<usize, EngineError> {
        let mut stored = self.nodes.write().await;
        let before = stored.len();
        stored.retain(|n| !filter.matches(&n.metadata));
        Ok(before - stored.len())
    }

    async fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<Node>, EngineError> {
        let stored = self.nodes.read().await;
        Ok(stored
            .iter()
            .filter(|n| filter.matches(&n.metadata))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, EngineError> {
        Ok(self.nodes.read().await.len())
    }

    async fn count_where(&self, filter: &MetadataFilter) -> Result<usize, EngineError> {
        let stored = self.nodes.read().await;
        Ok(stored.iter().filter(|n| filter.matches(&n.metadata)).count())
    }

    async fn query(
        &self,
        text: &str,
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, EngineError> {
        let stored = self.nodes.read().await;
        Ok(rank_by_overlap(&stored, text, filter, top_k))
    }
}
