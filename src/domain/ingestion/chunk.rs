//! Chunk and document metadata types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::format::DocumentFormat;

/// Metadata keys with stable meaning across the pipeline.
///
/// The data processor retains only the keys in [`meta_keys::STABLE`] before
/// hashing, so anything else a parser attaches is advisory and never part of
/// a chunk's identity.
pub mod meta_keys {
    pub const GROUP_ID: &str = "group_id";
    pub const FILE_NAME: &str = "file_name";
    pub const PAGE_LABEL: &str = "page_label";
    pub const FILE_ID: &str = "file_id";
    pub const WEBPAGE_ID: &str = "webpage_id";
    pub const SOURCE_URL: &str = "source_url";
    pub const FORMAT_TYPE: &str = "format_type";
    pub const CHUNK_TYPE: &str = "chunk_type";
    pub const SECTION_TITLE: &str = "section_title";

    /// Keys that survive normalization and feed the content-address hash.
    pub const STABLE: &[&str] = &[
        FILE_NAME, PAGE_LABEL, FILE_ID, WEBPAGE_ID, SOURCE_URL, GROUP_ID,
    ];
}

/// The splitting policy that produced a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Page,
    Section,
    Paragraph,
    Table,
    Slide,
    Sheet,
    Chapter,
    Block,
    Window,
    Webpage,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Section => "section",
            Self::Paragraph => "paragraph",
            Self::Table => "table",
            Self::Slide => "slide",
            Self::Sheet => "sheet",
            Self::Chapter => "chapter",
            Self::Block => "block",
            Self::Window => "window",
            Self::Webpage => "webpage",
        }
    }
}

/// A retrieval-sized unit of text produced by a parser.
///
/// The persisted identifier is not set here; the data processor derives it
/// from the normalized text and retained metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub page_number: Option<u32>,
    pub section_title: Option<String>,
    pub chunk_type: ChunkType,
}

impl DocumentChunk {
    pub fn new(text: impl Into<String>, chunk_type: ChunkType) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(meta_keys::CHUNK_TYPE.to_string(), chunk_type.as_str().to_string());
        Self {
            text: text.into(),
            metadata,
            page_number: None,
            section_title: None,
            chunk_type,
        }
    }

    /// Attach a metadata key/value pair.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Record the 1-based page (or slide/sheet) number. Also mirrors the
    /// value into the `page_label` metadata key so sorting and hashing see
    /// the same label the chunk reports.
    pub fn with_page_number(mut self, page: u32) -> Self {
        self.page_number = Some(page);
        self.metadata
            .insert(meta_keys::PAGE_LABEL.to_string(), page.to_string());
        self
    }

    /// Record the section (heading/chapter/slide) title, mirrored into
    /// metadata.
    pub fn with_section_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.metadata
            .insert(meta_keys::SECTION_TITLE.to_string(), title.clone());
        self.section_title = Some(title);
        self
    }

    /// Attach the file name and format the chunk came from.
    pub fn with_source_file(mut self, file_name: impl Into<String>, format: DocumentFormat) -> Self {
        self.metadata
            .insert(meta_keys::FILE_NAME.to_string(), file_name.into());
        self.metadata
            .insert(meta_keys::FORMAT_TYPE.to_string(), format.as_str().to_string());
        self
    }
}

/// Metadata extracted from a whole document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    /// Page, slide, sheet, or chapter count depending on the format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<DocumentFormat>,
    /// Format-specific extras (frontmatter keys, sheet names, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl DocumentMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_page_count(mut self, count: usize) -> Self {
        self.page_count = Some(count);
        self
    }

    pub fn with_word_count(mut self, count: usize) -> Self {
        self.word_count = Some(count);
        self
    }

    pub fn with_file_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }

    pub fn with_format(mut self, format: DocumentFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Whitespace-delimited word count used by `extract_metadata` impls.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
