//! Domain layer - core types, errors, and the traits at the seams

pub mod catalog;
pub mod error;
pub mod ingestion;
pub mod vector_store;

pub use catalog::{
    FileRecord, Group, GroupSummary, SourceEntry, SourceKind, SourceStatus, WebpageRecord,
};
pub use error::EngineError;
pub use ingestion::{
    count_words, meta_keys, ChunkType, DocumentChunk, DocumentFormat, DocumentMetadata,
    DocumentParser, FetchedPage, WebpageLoader,
};
pub use vector_store::{
    FilterCondition, FilterConnector, InsertOutcome, MetadataFilter, Node, QueryMatch, VectorStore,
};
