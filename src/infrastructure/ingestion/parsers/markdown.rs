//! Markdown parser with frontmatter handling and heading-based sections.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use pulldown_cmark::{Event, Parser, Tag};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{
    count_words, ChunkType, DocumentChunk, DocumentFormat, DocumentMetadata, DocumentParser,
    EngineError,
};
use crate::infrastructure::ingestion::text::clean_text;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(#+)\s+(.+)$").expect("header regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownParserSettings {
    /// Parse a leading YAML frontmatter block for document metadata.
    pub extract_frontmatter: bool,
    /// Chunk by `#` headings instead of blank-line paragraphs.
    pub chunk_by_headers: bool,
    /// Sections or paragraphs shorter than this are dropped.
    pub min_section_length: usize,
    /// Keep fenced and inline code in the extracted text.
    pub preserve_code_blocks: bool,
}

impl Default for MarkdownParserSettings {
    fn default() -> Self {
        Self {
            extract_frontmatter: true,
            chunk_by_headers: true,
            min_section_length: 50,
            preserve_code_blocks: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct MarkdownParser {
    settings: MarkdownParserSettings,
}

struct Section {
    title: Option<String>,
    level: usize,
    content: String,
}

impl MarkdownParser {
    pub fn new(settings: MarkdownParserSettings) -> Self {
        Self { settings }
    }

    async fn read_body(&self, path: &Path) -> Result<String, EngineError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::storage(format!("read {}: {e}", path.display())))?;
        if self.settings.extract_frontmatter {
            Ok(strip_frontmatter(&raw).to_string())
        } else {
            Ok(raw)
        }
    }

    fn plain_text(&self, content: &str) -> String {
        strip_markdown(content, self.settings.preserve_code_blocks)
    }
}

/// Renders markdown down to plain text by walking parser events, so link
/// targets, emphasis markers, and heading hashes never reach the index.
fn strip_markdown(content: &str, keep_code: bool) -> String {
    let mut out = String::new();
    let mut in_code_block = false;
    for event in Parser::new(content) {
        match event {
            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(Tag::CodeBlock(_)) => {
                in_code_block = false;
                out.push('\n');
            }
            Event::Text(t) => {
                if !in_code_block || keep_code {
                    out.push_str(&t);
                }
            }
            Event::Code(t) => {
                if keep_code {
                    out.push_str(&t);
                }
            }
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(Tag::Paragraph)
            | Event::End(Tag::Heading(..))
            | Event::End(Tag::Item)
            | Event::End(Tag::BlockQuote)
            | Event::End(Tag::TableRow) => out.push('\n'),
            Event::End(Tag::TableCell) => out.push(' '),
            _ => {}
        }
    }
    out
}

/// Parses a `---` delimited frontmatter block into flat key/value pairs.
/// Only simple `key: value` lines are understood.
fn parse_frontmatter(content: &str) -> Option<BTreeMap<String, String>> {
    let body = content.strip_prefix("---\n")?;
    let end = body.find("\n---\n")?;
    let mut map = BTreeMap::new();
    for line in body[..end].lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            if !key.is_empty() {
                map.insert(key.to_string(), value.to_string());
            }
        }
    }
    Some(map)
}

fn strip_frontmatter(content: &str) -> &str {
    if let Some(body) = content.strip_prefix("---\n") {
        if let Some(end) = body.find("\n---\n") {
            return &body[end + 5..];
        }
    }
    content
}

/// Splits on `#` heading lines. Text before the first heading becomes an
/// untitled section. A heading immediately followed by another heading
/// produces no section of its own.
fn split_by_headers(content: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section {
        title: None,
        level: 0,
        content: String::new(),
    };

    for line in content.lines() {
        if let Some(caps) = HEADER_RE.captures(line) {
            if !current.content.is_empty() {
                sections.push(current);
            }
            current = Section {
                title: Some(caps[2].trim().to_string()),
                level: caps[1].len(),
                content: String::new(),
            };
        } else {
            if !current.content.is_empty() {
                current.content.push('\n');
            }
            current.content.push_str(line);
        }
    }
    if !current.content.is_empty() {
        sections.push(current);
    }
    sections
}

#[async_trait]
impl DocumentParser for MarkdownParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Markdown
    }

    fn parser_name(&self) -> &'static str {
        "MarkdownParser"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["md", "markdown"]
    }

    async fn extract_text(&self, path: &Path) -> Result<String, EngineError> {
        let body = self.read_body(path).await?;
        Ok(clean_text(&self.plain_text(&body)))
    }

    async fn extract_metadata(&self, path: &Path) -> Result<DocumentMetadata, EngineError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::storage(format!("read {}: {e}", path.display())))?;
        let file_size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);

        let mut meta = DocumentMetadata::new()
            .with_format(DocumentFormat::Markdown)
            .with_file_size(file_size);

        if self.settings.extract_frontmatter {
            if let Some(front) = parse_frontmatter(&raw) {
                if let Some(title) = front.get("title") {
                    meta = meta.with_title(title);
                }
                if let Some(author) = front.get("author") {
                    meta = meta.with_author(author);
                }
                for key in ["description", "tags", "date"] {
                    if let Some(value) = front.get(key) {
                        meta = meta.with_extra(key, value);
                    }
                }
            }
        }

        let body = strip_frontmatter(&raw);
        if meta.title.is_none() {
            if let Some(caps) = HEADER_RE.captures(body) {
                meta = meta.with_title(caps[2].trim());
            }
        }

        let text = self.plain_text(body);
        meta = meta
            .with_word_count(count_words(&text))
            .with_extra("header_count", HEADER_RE.find_iter(body).count().to_string())
            .with_extra(
                "code_block_count",
                (body.matches("```").count() / 2).to_string(),
            )
            .with_extra("line_count", body.lines().count().to_string());
        Ok(meta)
    }

    async fn extract_chunks(&self, path: &Path) -> Result<Vec<DocumentChunk>, EngineError> {
        let body = self.read_body(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut chunks = Vec::new();
        if self.settings.chunk_by_headers {
            for (idx, section) in split_by_headers(&body).iter().enumerate() {
                let content = section.content.trim();
                if content.is_empty() || content.chars().count() < self.settings.min_section_length
                {
                    continue;
                }
                let combined = match &section.title {
                    Some(title) => format!("{title}\n\n{content}"),
                    None => content.to_string(),
                };
                let text = clean_text(&self.plain_text(&combined));
                let mut chunk = DocumentChunk::new(text, ChunkType::Section)
                    .with_metadata("section_level", section.level.to_string())
                    .with_metadata("section_number", (idx + 1).to_string());
                if let Some(title) = &section.title {
                    chunk = chunk.with_section_title(title.clone());
                }
                chunks.push(chunk);
            }
        } else {
            let mut number = 0usize;
            for paragraph in body.split("\n\n") {
                let paragraph = paragraph.trim();
                if paragraph.is_empty()
                    || paragraph.chars().count() < self.settings.min_section_length
                {
                    continue;
                }
                number += 1;
                let text = clean_text(&self.plain_text(paragraph));
                chunks.push(
                    DocumentChunk::new(text, ChunkType::Paragraph)
                        .with_metadata("paragraph_number", number.to_string()),
                );
            }
        }

        Ok(chunks
            .into_iter()
            .map(|c| c.with_source_file(file_name.clone(), DocumentFormat::Markdown))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "---\ntitle: Field Guide\nauthor: R. Ortiz\ndate: 2024-03-01\n---\n\
# Introduction\n\nThis opening section runs well past the fifty character minimum for sections.\n\n\
# Methods\n\nshort\n\n\
## Sampling\n\nThe sampling section also clears the minimum length requirement comfortably.\n";

    #[test]
    fn frontmatter_parses_and_strips() {
        let front = parse_frontmatter(DOC).unwrap();
        assert_eq!(front.get("title").map(String::as_str), Some("Field Guide"));
        assert!(strip_frontmatter(DOC).starts_with("# Introduction"));
    }

    #[test]
    fn missing_frontmatter_is_none() {
        assert!(parse_frontmatter("# Just a heading\n").is_none());
        assert_eq!(strip_frontmatter("plain"), "plain");
    }

    #[test]
    fn sections_split_on_any_heading_level() {
        let sections = split_by_headers(strip_frontmatter(DOC));
        let titles: Vec<_> = sections.iter().map(|s| s.title.clone()).collect();
        assert_eq!(
            titles,
            vec![
                Some("Introduction".to_string()),
                Some("Methods".to_string()),
                Some("Sampling".to_string()),
            ]
        );
        assert_eq!(sections[2].level, 2);
    }

    #[test]
    fn preamble_before_first_heading_keeps_no_title() {
        let sections = split_by_headers("leading prose\n\n# First\n\nbody");
        assert_eq!(sections[0].title, None);
        assert!(sections[0].content.contains("leading prose"));
    }

    #[test]
    fn strip_markdown_drops_syntax_keeps_words() {
        let text = strip_markdown("# Title\n\nSome **bold** and a [link](https://example.com).", true);
        assert!(text.contains("Some bold and a link."));
        assert!(!text.contains('*'));
        assert!(!text.contains("https://example.com"));
    }

    #[test]
    fn strip_markdown_can_drop_code() {
        let md = "intro\n\n```rust\nlet x = 1;\n```\n\nafter";
        assert!(strip_markdown(md, true).contains("let x = 1;"));
        assert!(!strip_markdown(md, false).contains("let x = 1;"));
    }

    #[tokio::test]
    async fn chunks_skip_short_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.md");
        std::fs::write(&path, DOC).unwrap();

        let parser = MarkdownParser::default();
        let chunks = parser.extract_chunks(&path).await.unwrap();
        // "Methods" holds only the word "short" and is dropped.
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section_title.as_deref(), Some("Introduction"));
        assert_eq!(chunks[1].section_title.as_deref(), Some("Sampling"));
        assert_eq!(chunks[0].chunk_type, ChunkType::Section);
        assert!(chunks[0].text.starts_with("Introduction"));
    }

    #[tokio::test]
    async fn metadata_prefers_frontmatter_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.md");
        std::fs::write(&path, DOC).unwrap();

        let parser = MarkdownParser::default();
        let meta = parser.extract_metadata(&path).await.unwrap();
        assert_eq!(meta.title.as_deref(), Some("Field Guide"));
        assert_eq!(meta.author.as_deref(), Some("R. Ortiz"));
        assert_eq!(meta.extra.get("header_count").map(String::as_str), Some("3"));
    }

    #[tokio::test]
    async fn metadata_falls_back_to_first_heading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.md");
        std::fs::write(&path, "# Fallback Title\n\nbody text\n").unwrap();

        let parser = MarkdownParser::default();
        let meta = parser.extract_metadata(&path).await.unwrap();
        assert_eq!(meta.title.as_deref(), Some("Fallback Title"));
    }
}
