//! JSON file vector store
//!
//! Persists the node list as one pretty-printed JSON file. Every operation
//! reads the whole file, works on the in-memory list, and writes it back
//! under a single mutex, the same discipline the group catalog uses.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{EngineError, InsertOutcome, MetadataFilter, Node, QueryMatch, VectorStore};

use super::rank_by_overlap;

#[derive(Debug)]
pub struct JsonFileVectorStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileVectorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// A missing file is an empty store; a corrupt one is an error.
    async fn load(&self) -> Result<Vec<Node>, EngineError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                EngineError::vector_store(format!(
                    "failed to parse {}: {err}",
                    self.path.display()
                ))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(EngineError::vector_store(format!(
                "failed to read {}: {err}",
                self.path.display()
            ))),
        }
    }

    async fn store(&self, nodes: &[Node]) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                EngineError::vector_store(format!(
                    "failed to create {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let json = serde_json::to_vec_pretty(nodes)
            .map_err(|err| EngineError::vector_store(format!("failed to encode nodes: {err}")))?;
        tokio::fs::write(&self.path, json).await.map_err(|err| {
            EngineError::vector_store(format!("failed to write {}: {err}", self.path.display()))
        })
    }
}

#[async_trait]
impl VectorStore for JsonFileVectorStore {
    fn backend_name(&self) -> &'static str {
        "json_file"
    }

    async fn insert(&self, nodes: Vec<Node>) -> Result<InsertOutcome, EngineError> {
        let _guard = self.lock.lock().await;
        let mut stored = self.load().await?;
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
        self.store(&stored).await?;
        Ok(outcome)
    }

    async fn delete_where(&self, filter: &MetadataFilter) -> Result<usize, EngineError> {
        let _guard = self.lock.lock().await;
        let mut stored = self.load().await?;
        let before = stored.len();
        stored.retain(|n| !filter.matches(&n.metadata));
        let deleted = before - stored.len();
        if deleted > 0 {
            self.store(&stored).await?;
        }
        Ok(deleted)
    }

    async fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<Node>, EngineError> {
        let _guard = self.lock.lock().await;
        let stored = self.load().await?;
        Ok(stored
            .into_iter()
            .filter(|n| filter.matches(&n.metadata))
            .collect())
    }

    async fn count(&self) -> Result<usize, EngineError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.len())
    }

    async fn count_where(&self, filter: &MetadataFilter) -> Result<usize, EngineError> {
        let _guard = self.lock.lock().await;
        let stored = self.load().await?;
        Ok(stored.iter().filter(|n| filter.matches(&n.metadata)).count())
    }

    async fn query(
        &self,
        text: &str,
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, EngineError> {
        let _guard = self.lock.lock().await;
        let stored = self.load().await?;
        Ok(rank_by_overlap(&stored, text, filter, top_k))
    }
}
