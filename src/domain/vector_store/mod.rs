//! Vector store domain contract
//!
//! `VectorStore` is the consumed capability: insert, delete-by-predicate,
//! count, and filtered query. `MetadataFilter` carries the equality
//! predicates that scope every operation to a tenant.

pub mod filter;
pub mod provider;

pub use filter::{FilterCondition, FilterConnector, MetadataFilter};
pub use provider::{InsertOutcome, Node, QueryMatch, VectorStore};

#[cfg(test)]
pub use provider::mock::MockVectorStore;
