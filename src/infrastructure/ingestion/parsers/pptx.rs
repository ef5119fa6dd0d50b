//! PPTX parser emitting one chunk per slide, with speaker notes folded in.

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::domain::{
    count_words, ChunkType, DocumentChunk, DocumentFormat, DocumentMetadata, DocumentParser,
    EngineError,
};
use crate::infrastructure::ingestion::ooxml::{
    attr_value, core_properties, numbered_entries, open_archive, read_entry, Archive,
};
use crate::infrastructure::ingestion::text::clean_text;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PptxParserSettings {
    /// Append speaker notes to the slide text, prefixed with `Notes:`.
    pub extract_notes: bool,
    /// Guess a slide title from its shapes for `section_title`.
    pub extract_slide_titles: bool,
    /// Shape and notes texts shorter than this are dropped.
    pub min_text_length: usize,
}

impl Default for PptxParserSettings {
    fn default() -> Self {
        Self {
            extract_notes: true,
            extract_slide_titles: true,
            min_text_length: 5,
        }
    }
}

#[derive(Debug, Default)]
pub struct PptxParser {
    settings: PptxParserSettings,
}

impl PptxParser {
    pub fn new(settings: PptxParserSettings) -> Self {
        Self { settings }
    }

    /// Assembles the text of one slide: qualifying shape texts, then
    /// tables, then notes. Empty slides collapse to an empty string.
    fn slide_text(&self, content: &SlideContent, notes: Option<&str>) -> String {
        let mut parts: Vec<String> = content
            .shapes
            .iter()
            .filter(|t| t.chars().count() >= self.settings.min_text_length)
            .cloned()
            .collect();
        parts.extend(content.tables.iter().filter(|t| !t.is_empty()).cloned());
        if let Some(notes) = notes {
            let notes = notes.trim();
            if notes.chars().count() >= self.settings.min_text_length {
                parts.push(format!("Notes: {notes}"));
            }
        }
        clean_text(&parts.join("\n\n"))
    }

    fn notes_for(
        &self,
        archive: &mut Archive<'_>,
        slide_entry: &str,
    ) -> Result<Option<String>, EngineError> {
        if !self.settings.extract_notes {
            return Ok(None);
        }
        let number = slide_entry
            .trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml");
        let name = format!("ppt/notesSlides/notesSlide{number}.xml");
        match read_entry(DocumentFormat::Pptx, archive, &name)? {
            Some(xml) => Ok(Some(notes_text(&xml)?)),
            None => Ok(None),
        }
    }
}

/// Text content of one slide: per-shape strings in document order, and
/// rendered tables.
#[derive(Debug, Default)]
struct SlideContent {
    shapes: Vec<String>,
    tables: Vec<String>,
}

/// Walks a `slideN.xml` part. Shape paragraphs keep their line structure
/// so the title heuristic can tell single-line shapes apart.
fn slide_content(xml: &str) -> Result<SlideContent, EngineError> {
    let mut content = SlideContent::default();
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut shape: Option<String> = None;
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<String> = None;
    let mut in_table = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sp" if !in_table => shape = Some(String::new()),
                b"tbl" => {
                    in_table = true;
                    rows = Vec::new();
                }
                b"tr" if in_table => row = Vec::new(),
                b"tc" if in_table => cell = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(c) = cell.as_mut() {
                        if !c.is_empty() && !c.ends_with(' ') {
                            c.push(' ');
                        }
                    } else if let Some(s) = shape.as_mut() {
                        s.push('\n');
                    }
                }
                b"tc" => {
                    if let Some(c) = cell.take() {
                        row.push(c.trim().to_string());
                    }
                }
                b"tr" if in_table => rows.push(std::mem::take(&mut row)),
                b"tbl" => {
                    in_table = false;
                    let text = table_text(&rows);
                    if !text.is_empty() {
                        content.tables.push(text);
                    }
                    rows = Vec::new();
                }
                b"sp" => {
                    if let Some(s) = shape.take() {
                        let s = s.trim().to_string();
                        if !s.is_empty() {
                            content.shapes.push(s);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().unwrap_or_default();
                if let Some(c) = cell.as_mut() {
                    c.push_str(&text);
                } else if let Some(s) = shape.as_mut() {
                    s.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::parse("pptx", e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(content)
}

/// Text of the notes body placeholder in a `notesSlideN.xml` part. Slide
/// image and slide number placeholders are skipped.
fn notes_text(xml: &str) -> Result<String, EngineError> {
    let mut out: Vec<String> = Vec::new();
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut shape: Option<String> = None;
    let mut placeholder: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"ph" && shape.is_some() =>
            {
                placeholder = attr_value(&e, b"type");
            }
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sp" => {
                    shape = Some(String::new());
                    placeholder = None;
                }
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(s) = shape.as_mut() {
                        s.push('\n');
                    }
                }
                b"sp" => {
                    if let Some(s) = shape.take() {
                        if placeholder.as_deref() == Some("body") {
                            let s = s.trim().to_string();
                            if !s.is_empty() {
                                out.push(s);
                            }
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                if let Some(s) = shape.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::parse("pptx", e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.join("\n"))
}

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

/// Title heuristic: the first short single-line shape wins, otherwise the
/// first line of the first shape when it stays under 100 characters.
fn slide_title(shapes: &[String]) -> Option<String> {
    for text in shapes {
        if text.chars().count() < 100 && !text.contains('\n') {
            return Some(text.clone());
        }
    }
    for text in shapes {
        let first_line = text.lines().next().unwrap_or_default().trim();
        if !first_line.is_empty() && first_line.chars().count() < 100 {
            return Some(first_line.to_string());
        }
    }
    None
}

#[async_trait]
impl DocumentParser for PptxParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pptx
    }

    fn parser_name(&self) -> &'static str {
        "PptxParser"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["pptx"]
    }

    async fn extract_text(&self, path: &Path) -> Result<String, EngineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::storage(format!("read {}: {e}", path.display())))?;
        let mut archive = open_archive(DocumentFormat::Pptx, &bytes)?;
        let mut parts = Vec::new();
        for entry in numbered_entries(&archive, "ppt/slides/slide", ".xml") {
            let Some(xml) = read_entry(DocumentFormat::Pptx, &mut archive, &entry)? else {
                continue;
            };
            let content = slide_content(&xml)?;
            let notes = self.notes_for(&mut archive, &entry)?;
            let text = self.slide_text(&content, notes.as_deref());
            if !text.is_empty() {
                parts.push(text);
            }
        }
        Ok(parts.join("\n\n"))
    }

    async fn extract_metadata(&self, path: &Path) -> Result<DocumentMetadata, EngineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::storage(format!("read {}: {e}", path.display())))?;
        let mut archive = open_archive(DocumentFormat::Pptx, &bytes)?;
        let entries = numbered_entries(&archive, "ppt/slides/slide", ".xml");

        let mut meta = DocumentMetadata::new()
            .with_format(DocumentFormat::Pptx)
            .with_file_size(bytes.len() as u64)
            .with_page_count(entries.len())
            .with_extra("slide_count", entries.len().to_string());

        if let Some(core) = read_entry(DocumentFormat::Pptx, &mut archive, "docProps/core.xml")? {
            let props = core_properties(&core);
            if let Some(title) = props.get("title") {
                meta = meta.with_title(title);
            }
            if let Some(creator) = props.get("creator") {
                meta = meta.with_author(creator);
            }
            for key in ["subject", "keywords"] {
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

        let mut text_shapes = 0usize;
        let mut tables = 0usize;
        let mut words = 0usize;
        for entry in &entries {
            let Some(xml) = read_entry(DocumentFormat::Pptx, &mut archive, entry)? else {
                continue;
            };
            let content = slide_content(&xml)?;
            text_shapes += content.shapes.len();
            tables += content.tables.len();
            words += content.shapes.iter().map(|s| count_words(s)).sum::<usize>();
            words += content.tables.iter().map(|t| count_words(t)).sum::<usize>();
        }
        Ok(meta
            .with_word_count(words)
            .with_extra("text_shapes", text_shapes.to_string())
            .with_extra("tables", tables.to_string()))
    }

    async fn extract_chunks(&self, path: &Path) -> Result<Vec<DocumentChunk>, EngineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::storage(format!("read {}: {e}", path.display())))?;
        let mut archive = open_archive(DocumentFormat::Pptx, &bytes)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut chunks = Vec::new();
        for (idx, entry) in numbered_entries(&archive, "ppt/slides/slide", ".xml")
            .iter()
            .enumerate()
        {
            let Some(xml) = read_entry(DocumentFormat::Pptx, &mut archive, entry)? else {
                continue;
            };
            let content = slide_content(&xml)?;
            let notes = self.notes_for(&mut archive, entry)?;
            let text = self.slide_text(&content, notes.as_deref());
            if text.is_empty() {
                continue;
            }
            let number = (idx + 1) as u32;
            let mut chunk = DocumentChunk::new(text, ChunkType::Slide)
                .with_page_number(number)
                .with_metadata("slide_number", number.to_string());
            if self.settings.extract_slide_titles {
                if let Some(title) = slide_title(&content.shapes) {
                    chunk = chunk.with_section_title(title);
                }
            }
            chunks.push(chunk.with_source_file(file_name.clone(), DocumentFormat::Pptx));
        }
        Ok(chunks)
    }
}
