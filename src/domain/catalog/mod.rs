//! Catalog domain model: groups and their source records
//!
//! A group is a tenant-scoped knowledge base partition owning one physical
//! directory. Its file and webpage records track per-source indexing
//! lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a file or webpage record.
///
/// Transitions: `Processing -> Completed` on successful indexing,
/// `Processing -> Failed` on parse failure or missing blob. A failed record
/// is not retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Processing,
    Completed,
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file uploaded into a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub original_name: String,
    /// Path relative to the group directory.
    pub stored_path: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub status: SourceStatus,
}

impl FileRecord {
    pub fn new(
        original_name: impl Into<String>,
        stored_path: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_name: original_name.into(),
            stored_path: stored_path.into(),
            size,
            created_at: Utc::now(),
            status: SourceStatus::Processing,
        }
    }
}

/// A webpage registered in a group, keyed by URL uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebpageRecord {
    pub id: Uuid,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub status: SourceStatus,
}

impl WebpageRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            created_at: Utc::now(),
            status: SourceStatus::Processing,
        }
    }
}

/// A tenant partition: unique name, one physical directory, and the
/// records of everything ingested into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub directory: String,
    pub files: Vec<FileRecord>,
    pub webpages: Vec<WebpageRecord>,
}

impl Group {
    pub fn new(
        id: Uuid,
        name: impl Into<String>,
        description: impl Into<String>,
        directory: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            directory: directory.into(),
            files: Vec::new(),
            webpages: Vec::new(),
        }
    }

    pub fn file_by_name(&self, name: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.original_name == name)
    }

    pub fn webpage_by_url(&self, url: &str) -> Option<&WebpageRecord> {
        self.webpages.iter().find(|w| w.url == url)
    }

    /// Merged file + webpage listing, newest first.
    pub fn sources(&self) -> Vec<SourceEntry> {
        let mut entries: Vec<SourceEntry> = self
            .files
            .iter()
            .map(|f| SourceEntry {
                id: f.id,
                name: f.original_name.clone(),
                kind: SourceKind::File,
                status: f.status,
                created_at: f.created_at,
            })
            .chain(self.webpages.iter().map(|w| SourceEntry {
                id: w.id,
                name: w.url.clone(),
                kind: SourceKind::Webpage,
                status: w.status,
                created_at: w.created_at,
            }))
            .collect();

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            file_count: self.files.len(),
            webpage_count: self.webpages.len(),
        }
    }
}

/// What kind of source a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Webpage,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Webpage => "webpage",
        }
    }
}

/// One row of a group's merged source listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub id: Uuid,
    pub name: String,
    pub kind: SourceKind,
    pub status: SourceStatus,
    pub created_at: DateTime<Utc>,
}

/// Lightweight group view for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub file_count: usize,
    pub webpage_count: usize,
}
