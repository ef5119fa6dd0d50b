//! Ingestion and deletion orchestration
//!
//! The service owns the protocols that keep the three stores (vector index,
//! blob directories, group catalog) consistent: adds acknowledge
//! synchronously and index in a background task; deletes run vector store
//! first, then storage, then catalog, aborting at the first failure.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    meta_keys, EngineError, FileRecord, Group, MetadataFilter, Node, QueryMatch, SourceStatus,
    VectorStore, WebpageRecord,
};
use crate::infrastructure::catalog::GroupManager;
use crate::infrastructure::ingestion::{DataProcessor, FileSource, ProcessedBatch, WebSource};

/// How uploaded blobs are named inside the group directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNaming {
    /// Original file name, with a `_<n>` suffix before the extension when
    /// the name is already taken on disk.
    #[default]
    Original,
    /// `<record-id>_<original-name>`.
    IdPrefixed,
}

/// Operational knobs from the `[storage]`, `[ingestion]`, and `[query]`
/// configuration sections.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub file_naming: FileNaming,
    pub max_file_size_mb: u64,
    pub default_top_k: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            file_naming: FileNaming::Original,
            max_file_size_mb: 100,
            default_top_k: 3,
        }
    }
}

/// An upload payload: the client-visible name and the raw bytes.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// One accepted item in an ingestion receipt.
#[derive(Debug, Clone)]
pub struct AcceptedSource {
    pub id: Uuid,
    pub name: String,
}

/// One skipped item in an ingestion receipt.
#[derive(Debug, Clone)]
pub struct SkippedSource {
    pub name: String,
    pub reason: String,
}

/// Synchronous acknowledgment for an ingestion batch. Accepted items are
/// registered with status `processing`; indexing continues in the
/// background.
#[derive(Debug, Clone, Default)]
pub struct IngestReceipt {
    pub accepted: Vec<AcceptedSource>,
    pub skipped: Vec<SkippedSource>,
}

/// Orchestrates ingestion, deletion, and query across the catalog, blob
/// storage, and the vector store.
#[derive(Debug)]
pub struct PipelineService {
    groups: Arc<GroupManager>,
    vector_store: Arc<dyn VectorStore>,
    processor: Arc<DataProcessor>,
    options: PipelineOptions,
}

impl PipelineService {
    pub fn new(
        groups: Arc<GroupManager>,
        vector_store: Arc<dyn VectorStore>,
        processor: Arc<DataProcessor>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            groups,
            vector_store,
            processor,
            options,
        }
    }

    /// Persists uploads into the group directory, registers their records,
    /// and dispatches one background indexing task for the batch.
    /// Oversized, duplicate, and unwritable uploads are skipped with a
    /// reason in the receipt.
    pub async fn ingest_files(
        &self,
        group_id: Uuid,
        uploads: Vec<FileUpload>,
    ) -> Result<IngestReceipt, EngineError> {
        let group = self.groups.get_group(group_id).await?;
        let max_bytes = self.options.max_file_size_mb * 1024 * 1024;

        let mut receipt = IngestReceipt::default();
        let mut batch = Vec::new();
        for upload in uploads {
            if upload.bytes.len() as u64 > max_bytes {
                tracing::warn!(
                    group_id = %group_id,
                    file_name = %upload.file_name,
                    size = upload.bytes.len(),
                    "upload exceeds the size cap, skipped"
                );
                receipt.skipped.push(SkippedSource {
                    name: upload.file_name,
                    reason: format!("exceeds the {} MB size cap", self.options.max_file_size_mb),
                });
                continue;
            }

            match self.persist_upload(&group, &upload).await {
                Ok(source) => {
                    receipt.accepted.push(AcceptedSource {
                        id: source.file_id,
                        name: upload.file_name,
                    });
                    batch.push(source);
                }
                Err(EngineError::DuplicateSource { message })
                | Err(EngineError::Storage { message }) => {
                    tracing::warn!(
                        group_id = %group_id,
                        file_name = %upload.file_name,
                        reason = %message,
                        "upload skipped"
                    );
                    receipt.skipped.push(SkippedSource {
                        name: upload.file_name,
                        reason: message,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        tracing::info!(
            group_id = %group_id,
            accepted = receipt.accepted.len(),
            skipped = receipt.skipped.len(),
            "file batch accepted"
        );
        if !batch.is_empty() {
            self.spawn_file_indexing(group_id, batch);
        }
        Ok(receipt)
    }

    /// Registers webpage records and dispatches one background task that
    /// fetches and indexes them. Duplicate URLs are skipped.
    pub async fn ingest_webpages(
        &self,
        group_id: Uuid,
        urls: Vec<String>,
    ) -> Result<IngestReceipt, EngineError> {
        self.groups.get_group(group_id).await?;

        let mut receipt = IngestReceipt::default();
        let mut batch = Vec::new();
        for url in urls {
            let record = WebpageRecord::new(&url);
            match self.groups.add_webpage_meta(group_id, record.clone()).await {
                Ok(()) => {
                    receipt.accepted.push(AcceptedSource {
                        id: record.id,
                        name: url.clone(),
                    });
                    batch.push(WebSource {
                        url,
                        webpage_id: record.id,
                        group_id,
                    });
                }
                Err(EngineError::DuplicateSource { message }) => {
                    tracing::warn!(group_id = %group_id, url = %url, "duplicate webpage skipped");
                    receipt.skipped.push(SkippedSource {
                        name: url,
                        reason: message,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        tracing::info!(
            group_id = %group_id,
            accepted = receipt.accepted.len(),
            skipped = receipt.skipped.len(),
            "webpage batch accepted"
        );
        if !batch.is_empty() {
            self.spawn_webpage_indexing(group_id, batch);
        }
        Ok(receipt)
    }

    /// Deletes a group and everything derived from it, in an order that
    /// never leaves vectors pointing at a removed directory: vector entries
    /// (verified by recount), then the directory tree, then the catalog
    /// entry. Any failure aborts before the next step. Deleting an absent
    /// group is a no-op.
    pub async fn delete_group(&self, group_id: Uuid) -> Result<(), EngineError> {
        let group = match self.groups.get_group(group_id).await {
            Ok(group) => group,
            Err(EngineError::NotFound { .. }) => {
                tracing::info!(group_id = %group_id, "group already absent, delete is a no-op");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let filter = MetadataFilter::eq(meta_keys::GROUP_ID, group_id.to_string());
        let deleted = self.vector_store.delete_where(&filter).await?;
        let residue = self.vector_store.count_where(&filter).await?;
        if residue > 0 {
            return Err(EngineError::store_inconsistency(format!(
                "{residue} vector entries remain for group {group_id} after delete"
            )));
        }
        tracing::info!(group_id = %group_id, deleted, "vector entries removed");

        match tokio::fs::remove_dir_all(&group.directory).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(EngineError::storage(format!(
                    "remove {}: {err}",
                    group.directory
                )));
            }
        }

        self.groups.remove_group(group_id).await?;
        tracing::info!(group_id = %group_id, name = %group.name, "group deleted");
        Ok(())
    }

    /// Deletes individual sources from a group: vector entries first, then
    /// the physical file (files only), then the catalog record. A failing
    /// item is logged and skipped; the returned flag is `true` only when
    /// every requested id was fully deleted.
    pub async fn delete_sources(
        &self,
        group_id: Uuid,
        source_ids: &[Uuid],
    ) -> Result<bool, EngineError> {
        let group = self.groups.get_group(group_id).await?;

        let mut all_ok = true;
        for &source_id in source_ids {
            let result = if group.files.iter().any(|f| f.id == source_id) {
                self.delete_file_source(&group, source_id).await
            } else if group.webpages.iter().any(|w| w.id == source_id) {
                self.delete_webpage_source(group_id, source_id).await
            } else {
                Err(EngineError::not_found(format!(
                    "source {source_id} in group {group_id}"
                )))
            };

            if let Err(err) = result {
                tracing::error!(
                    group_id = %group_id,
                    source_id = %source_id,
                    error = %err,
                    "source delete failed"
                );
                all_ok = false;
            }
        }
        Ok(all_ok)
    }

    /// Ranked retrieval scoped to the given groups.
    pub async fn query(
        &self,
        text: &str,
        group_ids: &[Uuid],
        top_k: Option<usize>,
    ) -> Result<Vec<QueryMatch>, EngineError> {
        if group_ids.is_empty() {
            return Err(EngineError::validation("query requires at least one group id"));
        }

        let filter = MetadataFilter::any_of(
            meta_keys::GROUP_ID,
            group_ids.iter().map(|id| id.to_string()),
        );
        let top_k = top_k.unwrap_or(self.options.default_top_k);
        self.vector_store.query(text, &filter, top_k).await
    }

    /// Writes the blob and registers the record. The blob is removed again
    /// if the record cannot be added, so a rejected duplicate leaves no
    /// stray file behind.
    async fn persist_upload(
        &self,
        group: &Group,
        upload: &FileUpload,
    ) -> Result<FileSource, EngineError> {
        let directory = Path::new(&group.directory);
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|e| EngineError::storage(format!("create {}: {e}", directory.display())))?;

        let mut record = FileRecord::new(
            &upload.file_name,
            &upload.file_name,
            upload.bytes.len() as u64,
        );
        let stored_name = match self.options.file_naming {
            FileNaming::Original => collision_free_name(directory, &upload.file_name).await,
            FileNaming::IdPrefixed => format!("{}_{}", record.id, upload.file_name),
        };
        record.stored_path = stored_name.clone();

        let path = directory.join(&stored_name);
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| EngineError::storage(format!("write {}: {e}", path.display())))?;

        let file_id = record.id;
        if let Err(err) = self.groups.add_file_meta(group.id, record).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(err);
        }

        Ok(FileSource {
            path,
            file_name: upload.file_name.clone(),
            file_id,
            group_id: group.id,
        })
    }

    fn spawn_file_indexing(&self, group_id: Uuid, sources: Vec<FileSource>) {
        let groups = Arc::clone(&self.groups);
        let vector_store = Arc::clone(&self.vector_store);
        let processor = Arc::clone(&self.processor);
        tokio::spawn(async move {
            index_file_batch(groups, vector_store, processor, group_id, sources).await;
        });
    }

    fn spawn_webpage_indexing(&self, group_id: Uuid, sources: Vec<WebSource>) {
        let groups = Arc::clone(&self.groups);
        let vector_store = Arc::clone(&self.vector_store);
        let processor = Arc::clone(&self.processor);
        tokio::spawn(async move {
            index_webpage_batch(groups, vector_store, processor, group_id, sources).await;
        });
    }

    async fn delete_file_source(&self, group: &Group, file_id: Uuid) -> Result<(), EngineError> {
        let filter = MetadataFilter::eq(meta_keys::FILE_ID, file_id.to_string());
        self.vector_store.delete_where(&filter).await?;

        let record = group
            .files
            .iter()
            .find(|f| f.id == file_id)
            .ok_or_else(|| EngineError::not_found(format!("file {file_id}")))?;
        let path = Path::new(&group.directory).join(&record.stored_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(EngineError::storage(format!(
                    "remove {}: {err}",
                    path.display()
                )));
            }
        }

        self.groups.remove_file_meta(group.id, file_id).await?;
        tracing::info!(group_id = %group.id, file_id = %file_id, "file deleted");
        Ok(())
    }

    async fn delete_webpage_source(
        &self,
        group_id: Uuid,
        webpage_id: Uuid,
    ) -> Result<(), EngineError> {
        let filter = MetadataFilter::eq(meta_keys::WEBPAGE_ID, webpage_id.to_string());
        self.vector_store.delete_where(&filter).await?;

        self.groups.remove_webpage_meta(group_id, webpage_id).await?;
        tracing::info!(group_id = %group_id, webpage_id = %webpage_id, "webpage deleted");
        Ok(())
    }
}

/// First free name in the directory: the original, then `stem_1.ext`,
/// `stem_2.ext`, and so on. Names stay Unicode as uploaded.
async fn collision_free_name(directory: &Path, original: &str) -> String {
    if !tokio::fs::try_exists(directory.join(original))
        .await
        .unwrap_or(false)
    {
        return original.to_string();
    }

    let name = Path::new(original);
    let stem = name
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original);
    let extension = name.extension().and_then(|e| e.to_str());

    let mut n = 1;
    loop {
        let candidate = match extension {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        if !tokio::fs::try_exists(directory.join(&candidate))
            .await
            .unwrap_or(false)
        {
            return candidate;
        }
        n += 1;
    }
}

/// Runs one accepted file batch to completion: parse, insert, then flip
/// each record to `completed` or `failed`. A vector-store insert failure
/// fails every record in the batch, since none of its nodes landed.
async fn index_file_batch(
    groups: Arc<GroupManager>,
    vector_store: Arc<dyn VectorStore>,
    processor: Arc<DataProcessor>,
    group_id: Uuid,
    sources: Vec<FileSource>,
) {
    let ProcessedBatch { nodes, failures } = processor.process_files(&sources).await;
    let insert_failed = insert_nodes(&vector_store, group_id, nodes).await;

    for source in &sources {
        let failed = insert_failed || failures.iter().any(|f| f.source_id == source.file_id);
        let status = if failed {
            SourceStatus::Failed
        } else {
            SourceStatus::Completed
        };
        if let Err(err) = groups.update_file_status(group_id, source.file_id, status).await {
            tracing::error!(
                group_id = %group_id,
                file_id = %source.file_id,
                error = %err,
                "status update failed"
            );
        }
    }
}

async fn index_webpage_batch(
    groups: Arc<GroupManager>,
    vector_store: Arc<dyn VectorStore>,
    processor: Arc<DataProcessor>,
    group_id: Uuid,
    sources: Vec<WebSource>,
) {
    let ProcessedBatch { nodes, failures } = processor.process_webpages(&sources).await;
    let insert_failed = insert_nodes(&vector_store, group_id, nodes).await;

    for source in &sources {
        let failed = insert_failed || failures.iter().any(|f| f.source_id == source.webpage_id);
        let status = if failed {
            SourceStatus::Failed
        } else {
            SourceStatus::Completed
        };
        if let Err(err) = groups
            .update_webpage_status(group_id, source.webpage_id, status)
            .await
        {
            tracing::error!(
                group_id = %group_id,
                webpage_id = %source.webpage_id,
                error = %err,
                "status update failed"
            );
        }
    }
}

async fn insert_nodes(
    vector_store: &Arc<dyn VectorStore>,
    group_id: Uuid,
    nodes: Vec<Node>,
) -> bool {
    match vector_store.insert(nodes).await {
        Ok(outcome) => {
            tracing::info!(
                group_id = %group_id,
                added = outcome.added,
                replaced = outcome.replaced,
                "batch indexed"
            );
            false
        }
        Err(err) => {
            tracing::error!(group_id = %group_id, error = %err, "vector insert failed");
            true
        }
    }
}
