//! Ingestion domain types and traits
//!
//! This module provides:
//! - `DocumentFormat` and the format vocabulary
//! - `DocumentChunk` / `DocumentMetadata` produced by parsers
//! - `DocumentParser` trait implemented once per format
//! - `WebpageLoader` trait for the web ingestion path

pub mod chunk;
pub mod format;
pub mod parser;
pub mod web;

pub use chunk::{count_words, meta_keys, ChunkType, DocumentChunk, DocumentMetadata};
pub use format::DocumentFormat;
pub use parser::DocumentParser;
pub use web::{FetchedPage, WebpageLoader};

#[cfg(test)]
pub use parser::mock::MockDocumentParser;
#[cfg(test)]
pub use web::mock::MockWebpageLoader;
