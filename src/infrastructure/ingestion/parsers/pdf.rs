//! PDF parser producing one chunk per page.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    count_words, ChunkType, DocumentChunk, DocumentFormat, DocumentMetadata, DocumentParser,
    EngineError,
};
use crate::infrastructure::ingestion::text::clean_text;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfParserSettings {
    /// Pages with less extracted text than this are dropped.
    pub min_page_text_length: usize,
}

impl Default for PdfParserSettings {
    fn default() -> Self {
        Self {
            min_page_text_length: 50,
        }
    }
}

#[derive(Debug, Default)]
pub struct PdfParser {
    settings: PdfParserSettings,
}

impl PdfParser {
    pub fn new(settings: PdfParserSettings) -> Self {
        Self { settings }
    }

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, EngineError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::storage(format!("read {}: {e}", path.display())))
    }
}

fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, EngineError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| EngineError::parse("pdf", e.to_string()))
}

/// One chunk per page carrying a 1-based `page_label`. Pages below the
/// length threshold vanish, so labels are not necessarily contiguous.
fn page_chunks(pages: &[String], min_page_text_length: usize) -> Vec<DocumentChunk> {
    pages
        .iter()
        .enumerate()
        .filter_map(|(idx, page)| {
            let text = clean_text(page);
            if text.chars().count() < min_page_text_length {
                return None;
            }
            Some(
                DocumentChunk::new(text, ChunkType::Page).with_page_number(idx as u32 + 1),
            )
        })
        .collect()
}

/// PDF text strings are either UTF-16BE with a BOM or a byte encoding close
/// enough to Latin-1 for titles and author names.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let [0xFE, 0xFF, rest @ ..] = bytes {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Parses `D:YYYYMMDDHHMMSS...` date values, ignoring the timezone suffix.
fn parse_pdf_date(value: &str) -> Option<DateTime<Utc>> {
    let digits: String = value
        .trim_start_matches("D:")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.len() < 14 {
        return None;
    }
    NaiveDateTime::parse_from_str(&digits[..14], "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

fn info_string(doc: &lopdf::Document, key: &[u8]) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let dict = match info {
        lopdf::Object::Reference(id) => doc.get_dictionary(*id).ok()?,
        lopdf::Object::Dictionary(dict) => dict,
        _ => return None,
    };
    match dict.get(key).ok()? {
        lopdf::Object::String(bytes, _) => {
            let text = decode_pdf_string(bytes);
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        _ => None,
    }
}

fn document_metadata(bytes: &[u8]) -> DocumentMetadata {
    let mut meta = DocumentMetadata::new().with_format(DocumentFormat::Pdf);

    if let Ok(doc) = lopdf::Document::load_mem(bytes) {
        meta = meta.with_page_count(doc.get_pages().len());
        if let Some(title) = info_string(&doc, b"Title") {
            meta = meta.with_title(title);
        }
        if let Some(author) = info_string(&doc, b"Author") {
            meta = meta.with_author(author);
        }
        for key in ["Creator", "Producer", "Subject", "Keywords"] {
            if let Some(value) = info_string(&doc, key.as_bytes()) {
                meta = meta.with_extra(key.to_ascii_lowercase(), value);
            }
        }
        if let Some(created) = info_string(&doc, b"CreationDate").as_deref().and_then(parse_pdf_date) {
            meta.created_at = Some(created);
        }
        if let Some(modified) = info_string(&doc, b"ModDate").as_deref().and_then(parse_pdf_date) {
            meta.modified_at = Some(modified);
        }
    }

    if let Ok(pages) = extract_pages(bytes) {
        let text = pages.join("\n");
        meta = meta.with_word_count(count_words(&text));
        if meta.page_count.is_none() {
            meta = meta.with_page_count(pages.len());
        }
    }
    meta
}

#[async_trait]
impl DocumentParser for PdfParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn parser_name(&self) -> &'static str {
        "PdfParser"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    async fn extract_text(&self, path: &Path) -> Result<String, EngineError> {
        let bytes = self.read_bytes(path).await?;
        let pages = extract_pages(&bytes)?;
        Ok(clean_text(&pages.join("\n")))
    }

    async fn extract_metadata(&self, path: &Path) -> Result<DocumentMetadata, EngineError> {
        let bytes = self.read_bytes(path).await?;
        let file_size = bytes.len() as u64;
        Ok(document_metadata(&bytes).with_file_size(file_size))
    }

    async fn extract_chunks(&self, path: &Path) -> Result<Vec<DocumentChunk>, EngineError> {
        let bytes = self.read_bytes(path).await?;
        let pages = extract_pages(&bytes)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(page_chunks(&pages, self.settings.min_page_text_length)
            .into_iter()
            .map(|c| c.with_source_file(file_name.clone(), DocumentFormat::Pdf))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::meta_keys;

    fn page(text: &str) -> String {
        text.to_string()
    }

    #[test]
    fn short_pages_are_dropped_and_labels_keep_position() {
        let pages = vec![
            page("The first page carries plenty of text to clear the fifty character bar."),
            page("stub"),
            page("The third page likewise carries enough text to survive the length filter."),
        ];
        let chunks = page_chunks(&pages, 50);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page_number, Some(1));
        assert_eq!(chunks[1].page_number, Some(3));
        assert_eq!(
            chunks[1].metadata.get(meta_keys::PAGE_LABEL).map(String::as_str),
            Some("3")
        );
        assert_eq!(chunks[0].chunk_type, ChunkType::Page);
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(page_chunks(&[], 50).is_empty());
        assert!(page_chunks(&[page("   \n  ")], 1).is_empty());
    }

    #[test]
    fn pdf_dates_parse_with_timezone_suffix() {
        let parsed = parse_pdf_date("D:20240117093015+02'00'").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-17T09:30:15+00:00");
        assert!(parse_pdf_date("D:2024").is_none());
    }

    #[test]
    fn pdf_strings_decode_utf16be() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "Å r b o k".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_pdf_string(&bytes), "Å r b o k");
        assert_eq!(decode_pdf_string(b"plain title"), "plain title");
    }

    #[tokio::test]
    async fn extract_metadata_reads_info_dictionary() {
        use lopdf::{dictionary, Object, Stream};

        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content = Stream::new(dictionary! {}, Vec::new());
        let content_id = doc.add_object(content);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Harbor Almanac"),
            "Author" => Object::string_literal("Port Authority"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("almanac.pdf");
        doc.save(&path).unwrap();

        let parser = PdfParser::default();
        let meta = parser.extract_metadata(&path).await.unwrap();
        assert_eq!(meta.title.as_deref(), Some("Harbor Almanac"));
        assert_eq!(meta.author.as_deref(), Some("Port Authority"));
        assert_eq!(meta.page_count, Some(1));
    }
}
