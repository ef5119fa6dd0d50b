//! Vector store contract
//!
//! The similarity search itself lives outside this system; the engine only
//! relies on the operations below. Development backends in infrastructure
//! implement the same trait with a trivial ranker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::domain::EngineError;

use super::filter::MetadataFilter;

/// A chunk as persisted in the vector index: content-addressed id, text,
/// and the retained metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl Node {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome of an insert batch. Replacements happen when a node id already
/// exists, which is exactly the idempotent re-ingestion case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub added: usize,
    pub replaced: usize,
}

/// A ranked query hit.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub node: Node,
    pub score: f32,
}

/// The consumed vector-store capability set.
#[async_trait]
pub trait VectorStore: Send + Sync + Debug {
    /// Backend name for diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Upsert nodes keyed by id.
    async fn insert(&self, nodes: Vec<Node>) -> Result<InsertOutcome, EngineError>;

    /// Delete every node matching the predicate; returns how many went away.
    async fn delete_where(&self, filter: &MetadataFilter) -> Result<usize, EngineError>;

    /// Fetch the nodes matching the predicate.
    async fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<Node>, EngineError>;

    /// Total node count.
    async fn count(&self) -> Result<usize, EngineError>;

    /// Node count under a predicate; used to verify deletions.
    async fn count_where(&self, filter: &MetadataFilter) -> Result<usize, EngineError>;

    /// Ranked retrieval restricted by the predicate.
    async fn query(
        &self,
        text: &str,
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, EngineError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    /// Mock vector store with failure injection for protocol tests.
    #[derive(Debug, Default)]
    pub struct MockVectorStore {
        nodes: RwLock<Vec<Node>>,
        fail_delete: bool,
        fail_insert: bool,
        /// When set, deletes report success but leave matching nodes behind,
        /// so the caller's verification step must notice.
        leave_residue: bool,
        delete_calls: AtomicUsize,
    }

    impl MockVectorStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_delete() -> Self {
            Self {
                fail_delete: true,
                ..Self::default()
            }
        }

        pub fn failing_insert() -> Self {
            Self {
                fail_insert: true,
                ..Self::default()
            }
        }

        pub fn leaving_residue() -> Self {
            Self {
                leave_residue: true,
                ..Self::default()
            }
        }

        pub fn delete_calls(&self) -> usize {
            self.delete_calls.load(Ordering::SeqCst)
        }

        pub async fn seed(&self, nodes: Vec<Node>) {
            self.nodes.write().await.extend(nodes);
        }
    }

    #[async_trait]
    impl VectorStore for MockVectorStore {
        fn backend_name(&self) -> &'static str {
            "mock"
        }

        async fn insert(&self, nodes: Vec<Node>) -> Result<InsertOutcome, EngineError> {
            if self.fail_insert {
                return Err(EngineError::vector_store("mock insert failure"));
            }
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
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete {
                return Err(EngineError::vector_store("mock delete failure"));
            }
            if self.leave_residue {
                return Ok(0);
            }
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
            let query_lower = text.to_lowercase();
            let stored = self.nodes.read().await;
            Ok(stored
                .iter()
                .filter(|n| filter.matches(&n.metadata))
                .filter(|n| n.text.to_lowercase().contains(&query_lower))
                .take(top_k)
                .map(|n| QueryMatch {
                    node: n.clone(),
                    score: 1.0,
                })
                .collect())
        }
    }
}
