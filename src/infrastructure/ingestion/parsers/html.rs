//! HTML parser with heading-based sectioning.

use std::path::Path;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::domain::{
    count_words, ChunkType, DocumentChunk, DocumentFormat, DocumentMetadata, DocumentParser,
    EngineError,
};
use crate::infrastructure::ingestion::text::{clean_text, normalize_flat};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlParserSettings {
    /// Tags whose content never reaches the index.
    pub remove_tags: Vec<String>,
    /// Chunk by headings when the document has any; otherwise fall back to
    /// block elements.
    pub chunk_by_sections: bool,
    /// Content fragments shorter than this are dropped.
    pub min_section_length: usize,
}

impl Default for HtmlParserSettings {
    fn default() -> Self {
        Self {
            remove_tags: ["script", "style", "nav", "footer", "header"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            chunk_by_sections: true,
            min_section_length: 50,
        }
    }
}

#[derive(Debug, Default)]
pub struct HtmlParser {
    settings: HtmlParserSettings,
}

impl HtmlParser {
    pub fn new(settings: HtmlParserSettings) -> Self {
        Self { settings }
    }

    async fn read_lossy(&self, path: &Path) -> Result<String, EngineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::storage(format!("read {}: {e}", path.display())))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

struct HtmlSection {
    title: String,
    level: usize,
    contents: Vec<String>,
}

fn heading_level(tag: &str) -> Option<usize> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Recursive text walk in the manner of a browser's innerText: removed tags
/// contribute nothing, block boundaries become newlines.
pub(super) fn element_text(element: &ElementRef<'_>, removed: &[String]) -> String {
    let mut text = String::new();

    for node in element.children() {
        if let Some(el) = ElementRef::wrap(node) {
            let tag_name = el.value().name();

            if matches!(tag_name, "noscript" | "head")
                || removed.iter().any(|t| t == tag_name)
            {
                continue;
            }

            if matches!(
                tag_name,
                "p" | "div"
                    | "h1"
                    | "h2"
                    | "h3"
                    | "h4"
                    | "h5"
                    | "h6"
                    | "br"
                    | "li"
                    | "tr"
                    | "td"
                    | "th"
            ) && !text.is_empty()
                && !text.ends_with('\n')
            {
                text.push('\n');
            }

            text.push_str(&element_text(&el, removed));

            if matches!(tag_name, "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
                text.push('\n');
            }
        } else if let Some(txt) = node.value().as_text() {
            text.push_str(txt);
        }
    }

    text
}

fn inside_removed(element: &ElementRef<'_>, removed: &[String]) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| removed.iter().any(|t| t == a.value().name()))
}

pub(super) fn select_first_text(document: &Html, selector: &str, removed: &[String]) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .find(|el| !inside_removed(el, removed))
        .map(|el| normalize_flat(&element_text(&el, removed)))
        .filter(|s| !s.is_empty())
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    let sel = Selector::parse(&format!(r#"meta[name="{name}"]"#)).ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn count_elements(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|sel| document.select(&sel).count())
        .unwrap_or(0)
}

/// Walks headings and content blocks in document order. Content before the
/// first heading is dropped; a heading directly followed by another heading
/// yields no section.
fn split_into_sections(document: &Html, settings: &HtmlParserSettings) -> Vec<HtmlSection> {
    let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6, p, div") else {
        return Vec::new();
    };

    let mut sections = Vec::new();
    let mut current: Option<HtmlSection> = None;

    for el in document.select(&selector) {
        if inside_removed(&el, &settings.remove_tags) {
            continue;
        }
        let tag = el.value().name();
        if let Some(level) = heading_level(tag) {
            if let Some(section) = current.take() {
                if !section.contents.is_empty() {
                    sections.push(section);
                }
            }
            current = Some(HtmlSection {
                title: normalize_flat(&element_text(&el, &settings.remove_tags)),
                level,
                contents: Vec::new(),
            });
        } else if let Some(section) = current.as_mut() {
            let text = clean_text(&element_text(&el, &settings.remove_tags));
            if text.chars().count() >= settings.min_section_length {
                section.contents.push(text);
            }
        }
    }
    if let Some(section) = current.take() {
        if !section.contents.is_empty() {
            sections.push(section);
        }
    }
    sections
}

fn has_headings(document: &Html, settings: &HtmlParserSettings) -> bool {
    let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6") else {
        return false;
    };
    document
        .select(&selector)
        .any(|el| !inside_removed(&el, &settings.remove_tags))
}

fn chunk_html(raw: &str, settings: &HtmlParserSettings) -> Vec<DocumentChunk> {
    let document = Html::parse_document(raw);
    let mut chunks = Vec::new();

    if settings.chunk_by_sections && has_headings(&document, settings) {
        for (idx, section) in split_into_sections(&document, settings).iter().enumerate() {
            let mut text = section.title.clone();
            for content in &section.contents {
                text.push_str("\n\n");
                text.push_str(content);
            }
            chunks.push(
                DocumentChunk::new(clean_text(&text), ChunkType::Section)
                    .with_section_title(section.title.clone())
                    .with_metadata("section_level", section.level.to_string())
                    .with_metadata("section_number", (idx + 1).to_string()),
            );
        }
        return chunks;
    }

    let Ok(selector) = Selector::parse("p, div, article, section") else {
        return chunks;
    };
    let mut number = 0usize;
    for el in document.select(&selector) {
        if inside_removed(&el, &settings.remove_tags) {
            continue;
        }
        let text = clean_text(&element_text(&el, &settings.remove_tags));
        if text.chars().count() < settings.min_section_length {
            continue;
        }
        number += 1;
        chunks.push(
            DocumentChunk::new(text, ChunkType::Block)
                .with_metadata("element_number", number.to_string())
                .with_metadata("element_tag", el.value().name().to_string()),
        );
    }
    chunks
}

/// Title and whole-document text, shared with the webpage loader.
pub(crate) fn page_title_and_text(raw: &str, removed: &[String]) -> (Option<String>, String) {
    let document = Html::parse_document(raw);
    let title = select_first_text(&document, "title", &[]);
    let body = Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next());
    let text = match body {
        Some(body) => element_text(&body, removed),
        None => element_text(&document.root_element(), removed),
    };
    (title, clean_text(&text))
}

fn full_text(raw: &str, settings: &HtmlParserSettings) -> String {
    page_title_and_text(raw, &settings.remove_tags).1
}

fn document_metadata(raw: &str, settings: &HtmlParserSettings) -> DocumentMetadata {
    let document = Html::parse_document(raw);
    let mut meta = DocumentMetadata::new().with_format(DocumentFormat::Html);

    if let Some(title) = select_first_text(&document, "title", &[]) {
        meta = meta.with_title(title);
    }
    if let Some(author) = meta_content(&document, "author") {
        meta = meta.with_author(author);
    }
    for name in ["description", "keywords"] {
        if let Some(value) = meta_content(&document, name) {
            meta = meta.with_extra(name, value);
        }
    }

    let text = {
        let body = Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next());
        match body {
            Some(body) => element_text(&body, &settings.remove_tags),
            None => String::new(),
        }
    };
    meta.with_word_count(count_words(&text))
        .with_extra("heading_count", count_elements(&document, "h1, h2, h3, h4, h5, h6").to_string())
        .with_extra("paragraph_count", count_elements(&document, "p").to_string())
        .with_extra("link_count", count_elements(&document, "a").to_string())
        .with_extra("image_count", count_elements(&document, "img").to_string())
}

#[async_trait]
impl DocumentParser for HtmlParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Html
    }

    fn parser_name(&self) -> &'static str {
        "HtmlParser"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["html", "htm"]
    }

    async fn extract_text(&self, path: &Path) -> Result<String, EngineError> {
        let raw = self.read_lossy(path).await?;
        Ok(full_text(&raw, &self.settings))
    }

    async fn extract_metadata(&self, path: &Path) -> Result<DocumentMetadata, EngineError> {
        let raw = self.read_lossy(path).await?;
        let file_size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        Ok(document_metadata(&raw, &self.settings).with_file_size(file_size))
    }

    async fn extract_chunks(&self, path: &Path) -> Result<Vec<DocumentChunk>, EngineError> {
        let raw = self.read_lossy(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(chunk_html(&raw, &self.settings)
            .into_iter()
            .map(|c| c.with_source_file(file_name.clone(), DocumentFormat::Html))
            .collect())
    }
}
