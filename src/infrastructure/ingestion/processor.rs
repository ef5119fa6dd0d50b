//! Turns stored files and fetched webpages into content-addressed nodes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{
    meta_keys, DocumentChunk, EngineError, FetchedPage, Node, WebpageLoader,
};

use super::detector::FormatDetector;
use super::registry::ParserRegistry;
use super::text::normalize_flat;

/// A stored file queued for indexing.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
    /// Original upload name; this is what chunk metadata carries, not the
    /// on-disk name, which may have been suffixed or prefixed.
    pub file_name: String,
    pub file_id: Uuid,
    pub group_id: Uuid,
}

/// A webpage queued for indexing.
#[derive(Debug, Clone)]
pub struct WebSource {
    pub url: String,
    pub webpage_id: Uuid,
    pub group_id: Uuid,
}

/// A source the batch could not index, with the reason.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source_id: Uuid,
    pub reason: String,
}

/// What a batch produced: the nodes to insert and the sources that failed.
/// Sources absent from `failures` succeeded, even when they contributed no
/// nodes (every chunk below threshold).
#[derive(Debug, Default)]
pub struct ProcessedBatch {
    pub nodes: Vec<Node>,
    pub failures: Vec<SourceFailure>,
}

/// Normalized chunk text plus the retained metadata, pre-hash.
#[derive(Debug)]
struct RawDocument {
    text: String,
    metadata: BTreeMap<String, String>,
}

/// Runs detection, parsing, normalization, and stable id assignment.
///
/// Per-source failures are isolated: one broken file never aborts the rest
/// of the batch.
#[derive(Debug)]
pub struct DataProcessor {
    detector: FormatDetector,
    registry: Arc<ParserRegistry>,
    webpage_loader: Arc<dyn WebpageLoader>,
}

impl DataProcessor {
    pub fn new(registry: Arc<ParserRegistry>, webpage_loader: Arc<dyn WebpageLoader>) -> Self {
        Self {
            detector: FormatDetector::new(),
            registry,
            webpage_loader,
        }
    }

    /// Parses every file into nodes. Order of the returned nodes is
    /// deterministic regardless of input order.
    pub async fn process_files(&self, sources: &[FileSource]) -> ProcessedBatch {
        let mut documents = Vec::new();
        let mut failures = Vec::new();

        for source in sources {
            match self.file_chunks(source).await {
                Ok(chunks) => {
                    tracing::info!(
                        file_name = %source.file_name,
                        chunks = chunks.len(),
                        "file parsed"
                    );
                    documents.extend(chunks.into_iter().map(|c| file_document(source, c)));
                }
                Err(error) => {
                    tracing::error!(file_name = %source.file_name, %error, "file skipped");
                    failures.push(SourceFailure {
                        source_id: source.file_id,
                        reason: error.to_string(),
                    });
                }
            }
        }

        ProcessedBatch {
            nodes: assemble_nodes(documents),
            failures,
        }
    }

    /// Fetches every URL and reduces each page to a single node.
    pub async fn process_webpages(&self, sources: &[WebSource]) -> ProcessedBatch {
        let mut documents = Vec::new();
        let mut failures = Vec::new();

        for source in sources {
            match self.webpage_loader.fetch(&source.url).await {
                Ok(page) => {
                    if let Some(document) = web_document(source, &page) {
                        documents.push(document);
                    } else {
                        tracing::warn!(url = %source.url, "page stripped to empty text");
                    }
                }
                Err(error) => {
                    tracing::error!(url = %source.url, %error, "webpage skipped");
                    failures.push(SourceFailure {
                        source_id: source.webpage_id,
                        reason: error.to_string(),
                    });
                }
            }
        }

        ProcessedBatch {
            nodes: assemble_nodes(documents),
            failures,
        }
    }

    /// Detector and registry resolution for one file. Files without a
    /// registered parser, or that fail the chosen parser's validation, go
    /// through the plain-text parser instead of being dropped.
    async fn file_chunks(&self, source: &FileSource) -> Result<Vec<DocumentChunk>, EngineError> {
        let Some(format) = self.detector.detect(&source.path).await else {
            return Err(EngineError::unsupported_format(format!(
                "no format rule matched '{}'",
                source.file_name
            )));
        };

        match self.registry.parser_for(format) {
            Some(parser) => {
                if let Err(error) = parser.validate_file(&source.path).await {
                    tracing::warn!(
                        file_name = %source.file_name,
                        %error,
                        "validation failed, retrying as plain text"
                    );
                    return self
                        .registry
                        .fallback_parser()
                        .extract_chunks(&source.path)
                        .await;
                }
                parser.extract_chunks(&source.path).await
            }
            None => {
                tracing::warn!(
                    file_name = %source.file_name,
                    format = %format,
                    "no parser registered, reading as plain text"
                );
                self.registry
                    .fallback_parser()
                    .extract_chunks(&source.path)
                    .await
            }
        }
    }
}

fn file_document(source: &FileSource, chunk: DocumentChunk) -> RawDocument {
    let mut metadata = retain_stable_keys(chunk.metadata);
    metadata.insert(meta_keys::FILE_NAME.to_string(), source.file_name.clone());
    metadata.insert(meta_keys::FILE_ID.to_string(), source.file_id.to_string());
    metadata.insert(meta_keys::GROUP_ID.to_string(), source.group_id.to_string());
    RawDocument {
        text: normalize_flat(&chunk.text),
        metadata,
    }
}

/// Webpages index as one document per page; empty pages produce none.
fn web_document(source: &WebSource, page: &FetchedPage) -> Option<RawDocument> {
    let text = normalize_flat(&page.text);
    if text.is_empty() {
        return None;
    }

    let mut metadata = BTreeMap::new();
    metadata.insert(meta_keys::SOURCE_URL.to_string(), source.url.clone());
    metadata.insert(meta_keys::FILE_NAME.to_string(), source.url.clone());
    metadata.insert(
        meta_keys::WEBPAGE_ID.to_string(),
        source.webpage_id.to_string(),
    );
    metadata.insert(meta_keys::GROUP_ID.to_string(), source.group_id.to_string());
    Some(RawDocument { text, metadata })
}

/// Drops every metadata key outside the stable allow-list, so identical
/// content always hashes identically.
fn retain_stable_keys(metadata: BTreeMap<String, String>) -> BTreeMap<String, String> {
    metadata
        .into_iter()
        .filter(|(key, _)| meta_keys::STABLE.contains(&key.as_str()))
        .collect()
}

fn sort_key(metadata: &BTreeMap<String, String>) -> (&str, &str, &str) {
    let get = |key: &str| metadata.get(key).map(String::as_str).unwrap_or("");
    (
        get(meta_keys::GROUP_ID),
        get(meta_keys::FILE_NAME),
        get(meta_keys::PAGE_LABEL),
    )
}

fn assemble_nodes(mut documents: Vec<RawDocument>) -> Vec<Node> {
    documents.sort_by(|a, b| sort_key(&a.metadata).cmp(&sort_key(&b.metadata)));
    documents
        .into_iter()
        .map(|document| Node {
            id: chunk_id(&document.text, &document.metadata),
            text: document.text,
            metadata: document.metadata,
        })
        .collect()
}

/// Canonical metadata rendering for hashing: sorted `"key":"value"` pairs
/// joined with commas. `BTreeMap` iteration supplies the sort.
fn canonical_metadata(metadata: &BTreeMap<String, String>) -> String {
    metadata
        .iter()
        .map(|(key, value)| format!("\"{key}\":\"{value}\""))
        .collect::<Vec<_>>()
        .join(",")
}

/// Content address: SHA-256 over the normalized text and canonical
/// metadata, separated by a pipe.
fn chunk_id(text: &str, metadata: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"|");
    hasher.update(canonical_metadata(metadata).as_bytes());
    hex::encode(hasher.finalize())
}
