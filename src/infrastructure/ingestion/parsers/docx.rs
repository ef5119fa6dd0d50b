//! DOCX parser chunking by heading styles, with tables as separate chunks.

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{
    count_words, ChunkType, DocumentChunk, DocumentFormat, DocumentMetadata, DocumentParser,
    EngineError,
};
use crate::infrastructure::ingestion::ooxml::{attr_value, core_properties, open_archive, read_entry};
use crate::infrastructure::ingestion::text::clean_text;

static HEADING_STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)heading\s*(\d+)").expect("heading style regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocxParserSettings {
    /// Emit one chunk per table in addition to text chunks.
    pub extract_tables: bool,
    /// Body paragraphs shorter than this are dropped.
    pub min_paragraph_length: usize,
    /// Group paragraphs into sections keyed off heading styles; when off,
    /// every paragraph becomes its own chunk.
    pub chunk_by_heading: bool,
}

impl Default for DocxParserSettings {
    fn default() -> Self {
        Self {
            extract_tables: true,
            min_paragraph_length: 10,
            chunk_by_heading: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct DocxParser {
    settings: DocxParserSettings,
}

impl DocxParser {
    pub fn new(settings: DocxParserSettings) -> Self {
        Self { settings }
    }

    async fn read_document_xml(&self, path: &Path) -> Result<(String, Option<String>), EngineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::storage(format!("read {}: {e}", path.display())))?;
        let mut archive = open_archive(DocumentFormat::Docx, &bytes)?;
        let document = read_entry(DocumentFormat::Docx, &mut archive, "word/document.xml")?
            .ok_or_else(|| EngineError::parse("docx", "word/document.xml not found"))?;
        let core = read_entry(DocumentFormat::Docx, &mut archive, "docProps/core.xml")?;
        Ok((document, core))
    }
}

/// Body-level content of a document: paragraphs with their style id, and
/// tables as cell grids.
#[derive(Debug)]
enum Block {
    Paragraph { style: Option<String>, text: String },
    Table { rows: Vec<Vec<String>> },
}

/// Walks `word/document.xml` into an ordered block list. Only top-level
/// tables get structure; anything nested deeper just feeds text into the
/// enclosing cell.
fn parse_blocks(xml: &str) -> Result<Vec<Block>, EngineError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut blocks = Vec::new();
    let mut table_depth = 0usize;
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<String> = None;
    let mut paragraph: Option<(Option<String>, String)> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        rows = Vec::new();
                    }
                }
                b"tr" if table_depth == 1 => row = Vec::new(),
                b"tc" if table_depth == 1 => cell = Some(String::new()),
                b"p" if table_depth == 0 => paragraph = Some((None, String::new())),
                b"pStyle" if table_depth == 0 => {
                    if let Some((style, _)) = paragraph.as_mut() {
                        *style = attr_value(&e, b"val");
                    }
                }
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"pStyle" if table_depth == 0 => {
                    if let Some((style, _)) = paragraph.as_mut() {
                        *style = attr_value(&e, b"val");
                    }
                }
                b"tab" => push_run(&mut paragraph, &mut cell, table_depth, " "),
                b"br" => push_run(&mut paragraph, &mut cell, table_depth, "\n"),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if table_depth == 0 {
                        if let Some((style, text)) = paragraph.take() {
                            blocks.push(Block::Paragraph {
                                style,
                                text: text.trim().to_string(),
                            });
                        }
                    } else if let Some(c) = cell.as_mut() {
                        if !c.is_empty() && !c.ends_with(' ') {
                            c.push(' ');
                        }
                    }
                }
                b"tc" if table_depth == 1 => {
                    if let Some(c) = cell.take() {
                        row.push(c.trim().to_string());
                    }
                }
                b"tr" if table_depth == 1 => rows.push(std::mem::take(&mut row)),
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 {
                        blocks.push(Block::Table {
                            rows: std::mem::take(&mut rows),
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().unwrap_or_default();
                push_run(&mut paragraph, &mut cell, table_depth, &text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::parse("docx", e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(blocks)
}

fn push_run(
    paragraph: &mut Option<(Option<String>, String)>,
    cell: &mut Option<String>,
    table_depth: usize,
    text: &str,
) {
    if table_depth > 0 {
        if let Some(c) = cell.as_mut() {
            c.push_str(text);
        }
    } else if let Some((_, p)) = paragraph.as_mut() {
        p.push_str(text);
    }
}

/// Level for heading styles like `Heading1` or `heading 2`; zero for body
/// styles. A style that says "heading" without a number counts as level 1.
fn heading_level(style: Option<&str>) -> usize {
    let Some(style) = style else { return 0 };
    if !style.to_ascii_lowercase().contains("heading") {
        return 0;
    }
    HEADING_STYLE_RE
        .captures(style)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(1)
}

/// Rows render as ` | ` joined cells, skipping empty cells and rows, so a
/// sparse grid still reads as compact lines.
fn table_text(rows: &[Vec<String>]) -> String {
    rows.iter()
        .filter_map(|row| {
            let cells: Vec<&str> = row
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .collect();
            (!cells.is_empty()).then(|| cells.join(" | "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

struct DocxSection {
    title: Option<String>,
    level: usize,
    content: Vec<String>,
}

fn section_chunks(blocks: &[Block], settings: &DocxParserSettings) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    let mut current = DocxSection {
        title: None,
        level: 0,
        content: Vec::new(),
    };

    let flush = |section: &mut DocxSection, chunks: &mut Vec<DocumentChunk>| {
        if section.content.is_empty() {
            return;
        }
        let mut parts = Vec::new();
        if let Some(title) = &section.title {
            parts.push(title.clone());
        }
        parts.extend(section.content.drain(..));
        let text = clean_text(&parts.join("\n\n"));
        let mut chunk = DocumentChunk::new(text, ChunkType::Section)
            .with_metadata("section_level", section.level.to_string())
            .with_metadata("section_number", (chunks.len() + 1).to_string());
        if let Some(title) = &section.title {
            chunk = chunk.with_section_title(title.clone());
        }
        chunks.push(chunk);
    };

    for block in blocks {
        let Block::Paragraph { style, text } = block else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        let level = heading_level(style.as_deref());
        if level > 0 {
            flush(&mut current, &mut chunks);
            current = DocxSection {
                title: Some(text.clone()),
                level,
                content: Vec::new(),
            };
        } else if text.chars().count() >= settings.min_paragraph_length {
            current.content.push(text.clone());
        }
    }
    flush(&mut current, &mut chunks);

    chunks
}

fn paragraph_chunks(blocks: &[Block], settings: &DocxParserSettings) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    let mut number = 0usize;
    for block in blocks {
        let Block::Paragraph { text, .. } = block else {
            continue;
        };
        if text.is_empty() || text.chars().count() < settings.min_paragraph_length {
            continue;
        }
        number += 1;
        chunks.push(
            DocumentChunk::new(clean_text(text), ChunkType::Paragraph)
                .with_metadata("paragraph_number", number.to_string()),
        );
    }
    chunks
}

fn table_chunks(blocks: &[Block]) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    let mut number = 0usize;
    for block in blocks {
        let Block::Table { rows } = block else {
            continue;
        };
        let text = table_text(rows);
        if text.is_empty() {
            continue;
        }
        number += 1;
        chunks.push(
            DocumentChunk::new(clean_text(&text), ChunkType::Table)
                .with_metadata("table_number", number.to_string()),
        );
    }
    chunks
}

#[async_trait]
impl DocumentParser for DocxParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn parser_name(&self) -> &'static str {
        "DocxParser"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["docx"]
    }

    async fn extract_text(&self, path: &Path) -> Result<String, EngineError> {
        let (document, _) = self.read_document_xml(path).await?;
        let blocks = parse_blocks(&document)?;
        let mut parts = Vec::new();
        for block in &blocks {
            match block {
                Block::Paragraph { text, .. } => {
                    if !text.is_empty() && text.chars().count() >= self.settings.min_paragraph_length
                    {
                        parts.push(text.clone());
                    }
                }
                Block::Table { rows } => {
                    if self.settings.extract_tables {
                        let text = table_text(rows);
                        if !text.is_empty() {
                            parts.push(text);
                        }
                    }
                }
            }
        }
        Ok(clean_text(&parts.join("\n")))
    }

    async fn extract_metadata(&self, path: &Path) -> Result<DocumentMetadata, EngineError> {
        let (document, core) = self.read_document_xml(path).await?;
        let file_size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        let blocks = parse_blocks(&document)?;

        let mut meta = DocumentMetadata::new()
            .with_format(DocumentFormat::Docx)
            .with_file_size(file_size);

        if let Some(core) = core {
            let props = core_properties(&core);
            if let Some(title) = props.get("title") {
                meta = meta.with_title(title);
            }
            if let Some(creator) = props.get("creator") {
                meta = meta.with_author(creator);
            }
            for key in ["subject", "keywords", "description"] {
                if let Some(value) = props.get(key) {
                    meta = meta.with_extra(key, value);
                }
            }
            if let Some(created) = props.get("created").and_then(|v| DateTime::parse_from_rfc3339(v).ok()) {
                meta.created_at = Some(created.to_utc());
            }
            if let Some(modified) = props.get("modified").and_then(|v| DateTime::parse_from_rfc3339(v).ok()) {
                meta.modified_at = Some(modified.to_utc());
            }
        }

        let mut paragraph_count = 0usize;
        let mut table_count = 0usize;
        let mut words = 0usize;
        for block in &blocks {
            match block {
                Block::Paragraph { text, .. } => {
                    if !text.is_empty() {
                        paragraph_count += 1;
                        words += count_words(text);
                    }
                }
                Block::Table { rows } => {
                    table_count += 1;
                    words += count_words(&table_text(rows));
                }
            }
        }
        Ok(meta
            .with_word_count(words)
            .with_extra("paragraph_count", paragraph_count.to_string())
            .with_extra("table_count", table_count.to_string()))
    }

    async fn extract_chunks(&self, path: &Path) -> Result<Vec<DocumentChunk>, EngineError> {
        let (document, _) = self.read_document_xml(path).await?;
        let blocks = parse_blocks(&document)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut chunks = if self.settings.chunk_by_heading {
            section_chunks(&blocks, &self.settings)
        } else {
            paragraph_chunks(&blocks, &self.settings)
        };
        if self.settings.extract_tables {
            chunks.extend(table_chunks(&blocks));
        }

        Ok(chunks
            .into_iter()
            .map(|c| c.with_source_file(file_name.clone(), DocumentFormat::Docx))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Orbit Basics</w:t></w:r></w:p>
<w:p><w:r><w:t>Bodies in orbit trade altitude for speed along an ellipse.</w:t></w:r></w:p>
<w:p><w:r><w:t>tiny</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Transfer Windows</w:t></w:r></w:p>
<w:p><w:r><w:t>Launch windows recur when planetary alignment repeats.</w:t></w:r></w:p>
<w:tbl>
<w:tr><w:tc><w:p><w:r><w:t>Planet</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Period</w:t></w:r></w:p></w:tc></w:tr>
<w:tr><w:tc><w:p><w:r><w:t>Mars</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>687 days</w:t></w:r></w:p></w:tc></w:tr>
</w:tbl>
</w:body></w:document>"#;

    const CORE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/">
<dc:title>Mission Notes</dc:title>
<dc:creator>Flight Dynamics</dc:creator>
<dcterms:created>2024-02-05T10:00:00Z</dcterms:created>
</cp:coreProperties>"#;

    fn docx_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("mission.docx");
        let mut writer = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("word/document.xml", options).unwrap();
        writer.write_all(DOCUMENT_XML.as_bytes()).unwrap();
        writer.start_file("docProps/core.xml", options).unwrap();
        writer.write_all(CORE_XML.as_bytes()).unwrap();
        writer.finish().unwrap();
        path
    }

    #[test]
    fn blocks_parse_styles_and_tables() {
        let blocks = parse_blocks(DOCUMENT_XML).unwrap();
        assert_eq!(blocks.len(), 6);
        match &blocks[0] {
            Block::Paragraph { style, text } => {
                assert_eq!(style.as_deref(), Some("Heading1"));
                assert_eq!(text, "Orbit Basics");
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
        match &blocks[5] {
            Block::Table { rows } => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[1], vec!["Mars".to_string(), "687 days".to_string()]);
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn heading_levels_parse_from_style_names() {
        assert_eq!(heading_level(Some("Heading1")), 1);
        assert_eq!(heading_level(Some("heading 3")), 3);
        assert_eq!(heading_level(Some("HeadingX")), 1);
        assert_eq!(heading_level(Some("BodyText")), 0);
        assert_eq!(heading_level(None), 0);
    }

    #[test]
    fn table_text_skips_empty_cells_and_rows() {
        let rows = vec![
            vec!["a".to_string(), String::new(), "b".to_string()],
            vec![String::new()],
            vec!["c".to_string()],
        ];
        assert_eq!(table_text(&rows), "a | b\nc");
    }

    #[tokio::test]
    async fn chunks_by_heading_with_separate_table_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = docx_file(&dir);

        let parser = DocxParser::default();
        let chunks = parser.extract_chunks(&path).await.unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chunk_type, ChunkType::Section);
        assert_eq!(chunks[0].section_title.as_deref(), Some("Orbit Basics"));
        assert!(chunks[0].text.starts_with("Orbit Basics"));
        // "tiny" is below the paragraph minimum and never appears.
        assert!(!chunks[0].text.contains("tiny"));
        assert_eq!(
            chunks[1].metadata.get("section_level").map(String::as_str),
            Some("2")
        );
        assert_eq!(chunks[2].chunk_type, ChunkType::Table);
        assert_eq!(chunks[2].text, "Planet | Period\nMars | 687 days");
    }

    #[tokio::test]
    async fn paragraph_mode_emits_individual_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let path = docx_file(&dir);

        let parser = DocxParser::new(DocxParserSettings {
            chunk_by_heading: false,
            ..DocxParserSettings::default()
        });
        let chunks = parser.extract_chunks(&path).await.unwrap();

        let paragraphs: Vec<_> = chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkType::Paragraph)
            .collect();
        // Two body paragraphs plus both headings clear the 10 char bar.
        assert_eq!(paragraphs.len(), 4);
        assert!(chunks.iter().any(|c| c.chunk_type == ChunkType::Table));
    }

    #[tokio::test]
    async fn metadata_reads_core_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = docx_file(&dir);

        let parser = DocxParser::default();
        let meta = parser.extract_metadata(&path).await.unwrap();
        assert_eq!(meta.title.as_deref(), Some("Mission Notes"));
        assert_eq!(meta.author.as_deref(), Some("Flight Dynamics"));
        assert_eq!(meta.created_at.map(|d| d.to_rfc3339()), Some("2024-02-05T10:00:00+00:00".to_string()));
        assert_eq!(meta.extra.get("table_count").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn missing_document_xml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hollow.docx");
        let mut writer = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        writer
            .start_file("unrelated.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"nothing").unwrap();
        writer.finish().unwrap();

        let parser = DocxParser::default();
        let err = parser.extract_chunks(&path).await.unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));
    }
}
