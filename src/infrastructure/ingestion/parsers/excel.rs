//! XLSX parser emitting one chunk per worksheet.
//!
//! Worksheets render as pipe-separated rows. Sheet order comes from
//! `xl/workbook.xml`; worksheet parts are matched to it by their numeric
//! file order, which is how the standard writers lay them out.

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::domain::{
    ChunkType, DocumentChunk, DocumentFormat, DocumentMetadata, DocumentParser, EngineError,
};
use crate::infrastructure::ingestion::ooxml::{
    attr_value, collect_grouped_text, core_properties, numbered_entries, open_archive, read_entry,
};
use crate::infrastructure::ingestion::text::{clean_text, truncate_chars};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcelParserSettings {
    /// Rows beyond this never make it into a sheet chunk.
    pub max_rows_per_chunk: usize,
    /// Cell values longer than this are cut and suffixed with `...`.
    pub max_cell_length: usize,
    /// Leave empty cells out of the rendered row instead of keeping a
    /// blank column.
    pub skip_empty_cells: bool,
}

impl Default for ExcelParserSettings {
    fn default() -> Self {
        Self {
            max_rows_per_chunk: 100,
            max_cell_length: 1000,
            skip_empty_cells: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ExcelParser {
    settings: ExcelParserSettings,
}

/// Workbook content pulled out of the archive in one pass.
#[derive(Debug)]
struct WorkbookParts {
    sheets: Vec<(String, Vec<Vec<String>>)>,
    core: Option<String>,
    file_size: u64,
}

impl ExcelParser {
    pub fn new(settings: ExcelParserSettings) -> Self {
        Self { settings }
    }

    async fn load(&self, path: &Path) -> Result<WorkbookParts, EngineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::storage(format!("read {}: {e}", path.display())))?;
        let mut archive = open_archive(DocumentFormat::Xlsx, &bytes)?;

        let workbook = read_entry(DocumentFormat::Xlsx, &mut archive, "xl/workbook.xml")?
            .ok_or_else(|| EngineError::parse("xlsx", "xl/workbook.xml not found"))?;
        let names = sheet_names(&workbook)?;

        let shared = match read_entry(DocumentFormat::Xlsx, &mut archive, "xl/sharedStrings.xml")? {
            Some(xml) => collect_grouped_text(DocumentFormat::Xlsx, &xml, b"si", b"t")?,
            None => Vec::new(),
        };

        let entries = numbered_entries(&archive, "xl/worksheets/sheet", ".xml");
        let mut sheets = Vec::new();
        for (name, entry) in names.iter().zip(entries.iter()) {
            let Some(xml) = read_entry(DocumentFormat::Xlsx, &mut archive, entry)? else {
                continue;
            };
            sheets.push((name.clone(), sheet_rows(&xml, &shared)?));
        }

        let core = read_entry(DocumentFormat::Xlsx, &mut archive, "docProps/core.xml")?;
        Ok(WorkbookParts {
            sheets,
            core,
            file_size: bytes.len() as u64,
        })
    }

    fn sheet_text(&self, rows: &[Vec<String>]) -> String {
        let mut lines = Vec::new();
        for row in rows.iter().take(self.settings.max_rows_per_chunk) {
            let mut cells = Vec::new();
            for cell in row {
                if cell.is_empty() {
                    if !self.settings.skip_empty_cells {
                        cells.push(String::new());
                    }
                    continue;
                }
                cells.push(truncate_chars(cell, self.settings.max_cell_length));
            }
            if !cells.is_empty() {
                lines.push(cells.join(" | "));
            }
        }
        lines.join("\n")
    }
}

/// Sheet names from `xl/workbook.xml`, in workbook order.
fn sheet_names(xml: &str) -> Result<Vec<String>, EngineError> {
    let mut names = Vec::new();
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                if let Some(name) = attr_value(&e, b"name") {
                    names.push(name);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::parse("xlsx", e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

/// Cell grid of one worksheet. Shared-string cells (`t="s"`) resolve
/// through the string table; inline strings and raw values pass through.
/// Cells present in the XML but holding no value become empty strings.
fn sheet_rows(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, EngineError> {
    let mut rows = Vec::new();
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut row: Option<Vec<String>> = None;
    let mut cell_type: Option<String> = None;
    let mut in_cell = false;
    let mut in_value = false;
    let mut value = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row = Some(Vec::new()),
                b"c" => {
                    in_cell = true;
                    cell_type = attr_value(&e, b"t");
                    value.clear();
                }
                b"v" | b"t" if in_cell => in_value = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"row" => rows.push(Vec::new()),
                b"c" => {
                    if let Some(r) = row.as_mut() {
                        r.push(String::new());
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    in_cell = false;
                    let resolved = resolve_cell(cell_type.take().as_deref(), &value, shared);
                    if let Some(r) = row.as_mut() {
                        r.push(resolved);
                    }
                }
                b"row" => {
                    if let Some(r) = row.take() {
                        rows.push(r);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                value.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::parse("xlsx", e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn resolve_cell(cell_type: Option<&str>, raw: &str, shared: &[String]) -> String {
    match cell_type {
        Some("s") => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i))
            .cloned()
            .unwrap_or_default(),
        _ => raw.trim().to_string(),
    }
}

#[async_trait]
impl DocumentParser for ExcelParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Xlsx
    }

    fn parser_name(&self) -> &'static str {
        "ExcelParser"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["xlsx", "xls"]
    }

    async fn extract_text(&self, path: &Path) -> Result<String, EngineError> {
        let parts = self.load(path).await?;
        let mut sections = Vec::new();
        for (name, rows) in &parts.sheets {
            let text = self.sheet_text(rows);
            if !text.is_empty() {
                sections.push(format!("Sheet: {name}\n{text}"));
            }
        }
        Ok(clean_text(&sections.join("\n\n")))
    }

    async fn extract_metadata(&self, path: &Path) -> Result<DocumentMetadata, EngineError> {
        let parts = self.load(path).await?;

        let mut meta = DocumentMetadata::new()
            .with_format(DocumentFormat::Xlsx)
            .with_file_size(parts.file_size);

        if let Some(core) = &parts.core {
            let props = core_properties(core);
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

        let sheet_names: Vec<&str> = parts.sheets.iter().map(|(n, _)| n.as_str()).collect();
        let total_rows: usize = parts.sheets.iter().map(|(_, rows)| rows.len()).sum();
        let max_columns = parts
            .sheets
            .iter()
            .flat_map(|(_, rows)| rows.iter().map(Vec::len))
            .max()
            .unwrap_or(0);

        Ok(meta
            .with_extra("sheet_count", parts.sheets.len().to_string())
            .with_extra("sheet_names", sheet_names.join(", "))
            .with_extra("total_rows", total_rows.to_string())
            .with_extra("max_columns", max_columns.to_string()))
    }

    async fn extract_chunks(&self, path: &Path) -> Result<Vec<DocumentChunk>, EngineError> {
        let parts = self.load(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut chunks = Vec::new();
        for (idx, (name, rows)) in parts.sheets.iter().enumerate() {
            let text = self.sheet_text(rows);
            if text.is_empty() {
                continue;
            }
            let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
            chunks.push(
                DocumentChunk::new(text, ChunkType::Sheet)
                    .with_section_title(name.clone())
                    .with_metadata("sheet_name", name.clone())
                    .with_metadata("sheet_number", (idx + 1).to_string())
                    .with_metadata("row_count", rows.len().to_string())
                    .with_metadata("column_count", column_count.to_string())
                    .with_source_file(file_name.clone(), DocumentFormat::Xlsx),
            );
        }
        Ok(chunks)
    }
}
