//! Development vector store backends
//!
//! Both backends implement the full `VectorStore` contract with a
//! deterministic term-overlap ranker standing in for similarity search; a
//! real vector database arrives by implementing the same trait.

pub mod factory;
pub mod in_memory;
pub mod json_file;

pub use factory::{VectorStoreBackend, VectorStoreFactory, VectorStoreSettings};
pub use in_memory::InMemoryVectorStore;
pub use json_file::JsonFileVectorStore;

use std::collections::BTreeSet;

use crate::domain::{MetadataFilter, Node, QueryMatch};

/// Scores each node by the fraction of distinct query terms its text
/// contains. Zero-overlap nodes are excluded; ties break by node id so the
/// ranking is stable across runs.
fn rank_by_overlap(
    nodes: &[Node],
    text: &str,
    filter: &MetadataFilter,
    top_k: usize,
) -> Vec<QueryMatch> {
    let query_terms: BTreeSet<String> = terms(text);
    if query_terms.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<QueryMatch> = nodes
        .iter()
        .filter(|node| filter.matches(&node.metadata))
        .filter_map(|node| {
            let node_terms = terms(&node.text);
            let overlap = query_terms.intersection(&node_terms).count();
            if overlap == 0 {
                return None;
            }
            Some(QueryMatch {
                node: node.clone(),
                score: overlap as f32 / query_terms.len() as f32,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    matches.truncate(top_k);
    matches
}

fn terms(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
