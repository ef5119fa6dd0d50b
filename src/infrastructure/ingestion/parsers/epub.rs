//! EPUB parser emitting one chunk per spine chapter.
//!
//! The container manifest points at the OPF package, whose spine gives
//! reading order. Chapter titles come from the NCX table of contents when
//! present, falling back to the chapter's own markup.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{
    count_words, ChunkType, DocumentChunk, DocumentFormat, DocumentMetadata, DocumentParser,
    EngineError,
};
use crate::infrastructure::ingestion::ooxml::{attr_value, open_archive, read_entry};
use crate::infrastructure::ingestion::parsers::html::{element_text, select_first_text};
use crate::infrastructure::ingestion::text::clean_text;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpubParserSettings {
    /// Resolve chapter titles through the NCX table of contents.
    pub extract_toc: bool,
    /// One chunk per spine chapter; when off, chapters are still the unit
    /// but carry document numbering and no title lookup.
    pub chunk_by_chapter: bool,
    /// Chapters with less text than this are dropped.
    pub min_chapter_length: usize,
}

impl Default for EpubParserSettings {
    fn default() -> Self {
        Self {
            extract_toc: true,
            chunk_by_chapter: true,
            min_chapter_length: 100,
        }
    }
}

#[derive(Debug, Default)]
pub struct EpubParser {
    settings: EpubParserSettings,
}

/// Book content pulled out of the archive in one pass: Dublin Core
/// metadata, the TOC map, and each spine chapter's href and raw markup.
#[derive(Debug)]
struct BookParts {
    metadata: BTreeMap<String, String>,
    toc: BTreeMap<String, String>,
    chapters: Vec<(String, String)>,
    file_size: u64,
}

impl EpubParser {
    pub fn new(settings: EpubParserSettings) -> Self {
        Self { settings }
    }

    async fn load(&self, path: &Path) -> Result<BookParts, EngineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::storage(format!("read {}: {e}", path.display())))?;
        let mut archive = open_archive(DocumentFormat::Epub, &bytes)?;

        let container = read_entry(DocumentFormat::Epub, &mut archive, "META-INF/container.xml")?
            .ok_or_else(|| EngineError::parse("epub", "META-INF/container.xml not found"))?;
        let opf_path = rootfile_path(&container)?
            .ok_or_else(|| EngineError::parse("epub", "container has no rootfile"))?;
        let opf = read_entry(DocumentFormat::Epub, &mut archive, &opf_path)?
            .ok_or_else(|| EngineError::parse("epub", format!("package {opf_path} not found")))?;
        let package = parse_package(&opf)?;
        let opf_dir = match opf_path.rfind('/') {
            Some(idx) => &opf_path[..=idx],
            None => "",
        };

        let mut toc = BTreeMap::new();
        if self.settings.extract_toc {
            if let Some(href) = &package.ncx_href {
                let name = format!("{opf_dir}{href}");
                if let Some(ncx) = read_entry(DocumentFormat::Epub, &mut archive, &name)? {
                    toc = toc_map(&ncx)?;
                }
            }
        }

        let mut chapters = Vec::new();
        for idref in &package.spine {
            let Some(href) = package.manifest.get(idref) else {
                continue;
            };
            let name = format!("{opf_dir}{href}");
            match read_entry(DocumentFormat::Epub, &mut archive, &name)? {
                Some(markup) => chapters.push((href.clone(), markup)),
                None => warn!(entry = %name, "spine chapter missing from archive"),
            }
        }

        Ok(BookParts {
            metadata: package.metadata,
            toc,
            chapters,
            file_size: bytes.len() as u64,
        })
    }
}

/// `full-path` of the first rootfile in `META-INF/container.xml`.
fn rootfile_path(xml: &str) -> Result<Option<String>, EngineError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"rootfile" =>
            {
                return Ok(attr_value(&e, b"full-path"));
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(EngineError::parse("epub", e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}

#[derive(Debug, Default)]
struct Package {
    metadata: BTreeMap<String, String>,
    manifest: BTreeMap<String, String>,
    spine: Vec<String>,
    ncx_href: Option<String>,
}

const DC_FIELDS: [&str; 7] = [
    "title",
    "creator",
    "subject",
    "language",
    "publisher",
    "date",
    "identifier",
];

/// Parses the OPF package: Dublin Core metadata (first occurrence of each
/// field wins), the manifest id to href map, and spine order.
fn parse_package(xml: &str) -> Result<Package, EngineError> {
    let mut package = Package::default();
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut dc_field: Option<&str> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                if let Some(field) = DC_FIELDS
                    .iter()
                    .copied()
                    .find(|f| local.as_ref() == f.as_bytes())
                {
                    dc_field = Some(field);
                } else if local.as_ref() == b"item" {
                    register_item(&mut package, &e);
                } else if local.as_ref() == b"itemref" {
                    if let Some(idref) = attr_value(&e, b"idref") {
                        package.spine.push(idref);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"item" {
                    register_item(&mut package, &e);
                } else if e.local_name().as_ref() == b"itemref" {
                    if let Some(idref) = attr_value(&e, b"idref") {
                        package.spine.push(idref);
                    }
                }
            }
            Ok(Event::Text(te)) => {
                if let Some(field) = dc_field.take() {
                    let value = te.unescape().unwrap_or_default().trim().to_string();
                    if !value.is_empty() {
                        package.metadata.entry(field.to_string()).or_insert(value);
                    }
                }
            }
            Ok(Event::End(_)) => dc_field = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::parse("epub", e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(package)
}

fn register_item(package: &mut Package, e: &quick_xml::events::BytesStart<'_>) {
    let id = attr_value(e, b"id");
    let href = attr_value(e, b"href");
    let media_type = attr_value(e, b"media-type");
    if let (Some(id), Some(href)) = (id, href) {
        if media_type.as_deref() == Some("application/x-dtbncx+xml") {
            package.ncx_href = Some(href.clone());
        }
        package.manifest.insert(id, href);
    }
}

/// NCX navMap as an href-to-title map. Fragments are stripped so a
/// `chapter1.xhtml#start` target still matches its spine entry.
fn toc_map(xml: &str) -> Result<BTreeMap<String, String>, EngineError> {
    let mut map = BTreeMap::new();
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_label = false;
    let mut label = String::new();
    let mut last_label: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"navLabel" => {
                    in_label = true;
                    label.clear();
                }
                b"content" => {
                    if let (Some(src), Some(title)) = (attr_value(&e, b"src"), last_label.take()) {
                        let src = src.split('#').next().unwrap_or_default().to_string();
                        map.entry(src).or_insert(title);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"content" => {
                if let (Some(src), Some(title)) = (attr_value(&e, b"src"), last_label.take()) {
                    let src = src.split('#').next().unwrap_or_default().to_string();
                    map.entry(src).or_insert(title);
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"navLabel" => {
                in_label = false;
                let title = label.trim().to_string();
                if !title.is_empty() {
                    last_label = Some(title);
                }
            }
            Ok(Event::Text(te)) if in_label => {
                label.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::parse("epub", e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(map)
}

fn chapter_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let removed = ["script".to_string(), "style".to_string()];
    let root = body_or_root(&document);
    element_text(&root, &removed)
}

fn body_or_root(document: &Html) -> scraper::ElementRef<'_> {
    scraper::Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element())
}

fn chapter_title(markup: &str) -> Option<String> {
    let document = Html::parse_document(markup);
    for selector in ["title", "h1", "h2"] {
        if let Some(title) = select_first_text(&document, selector, &[]) {
            return Some(title);
        }
    }
    None
}

#[async_trait]
impl DocumentParser for EpubParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Epub
    }

    fn parser_name(&self) -> &'static str {
        "EpubParser"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["epub"]
    }

    async fn extract_text(&self, path: &Path) -> Result<String, EngineError> {
        let parts = self.load(path).await?;
        let mut sections = Vec::new();
        for (_, markup) in &parts.chapters {
            let text = chapter_text(markup);
            if text.trim().chars().count() >= self.settings.min_chapter_length {
                sections.push(text);
            }
        }
        Ok(clean_text(&sections.join("\n\n")))
    }

    async fn extract_metadata(&self, path: &Path) -> Result<DocumentMetadata, EngineError> {
        let parts = self.load(path).await?;

        let mut meta = DocumentMetadata::new()
            .with_format(DocumentFormat::Epub)
            .with_file_size(parts.file_size)
            .with_extra("chapter_count", parts.chapters.len().to_string());

        if let Some(title) = parts.metadata.get("title") {
            meta = meta.with_title(title);
        }
        if let Some(creator) = parts.metadata.get("creator") {
            meta = meta.with_author(creator);
        }
        for key in ["subject", "language", "publisher", "identifier"] {
            if let Some(value) = parts.metadata.get(key) {
                meta = meta.with_extra(key, value);
            }
        }
        if let Some(date) = parts.metadata.get("date") {
            meta = meta.with_extra("publication_date", date);
        }

        let words: usize = parts
            .chapters
            .iter()
            .map(|(_, markup)| count_words(&chapter_text(markup)))
            .sum();
        Ok(meta.with_word_count(words))
    }

    async fn extract_chunks(&self, path: &Path) -> Result<Vec<DocumentChunk>, EngineError> {
        let parts = self.load(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut chunks = Vec::new();
        let mut counter = 0usize;
        for (href, markup) in &parts.chapters {
            let text = chapter_text(markup);
            if text.trim().chars().count() < self.settings.min_chapter_length {
                continue;
            }
            counter += 1;
            let mut chunk = DocumentChunk::new(clean_text(&text), ChunkType::Chapter);
            if self.settings.chunk_by_chapter {
                chunk = chunk.with_metadata("chapter_number", counter.to_string());
                chunk = chunk.with_metadata("chapter_id", href.clone());
                let title = parts
                    .toc
                    .get(href)
                    .cloned()
                    .or_else(|| chapter_title(markup));
                if let Some(title) = title {
                    chunk = chunk.with_section_title(title);
                }
            } else {
                chunk = chunk.with_metadata("document_number", counter.to_string());
                chunk = chunk.with_metadata("document_id", href.clone());
            }
            chunks.push(chunk.with_source_file(file_name.clone(), DocumentFormat::Epub));
        }
        Ok(chunks)
    }
}
