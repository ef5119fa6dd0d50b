//! Plain text parser. Chunks by paragraph when the content has blank-line
//! boundaries, by fixed character window otherwise.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
    count_words, ChunkType, DocumentChunk, DocumentFormat, DocumentMetadata, DocumentParser,
    EngineError,
};
use crate::infrastructure::ingestion::text::clean_text;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextParserSettings {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters carried over between adjacent window chunks.
    pub chunk_overlap: usize,
    /// Chunks shorter than this are dropped.
    pub min_chunk_length: usize,
}

impl Default for TextParserSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            min_chunk_length: 50,
        }
    }
}

#[derive(Debug, Default)]
pub struct TextParser {
    settings: TextParserSettings,
}

impl TextParser {
    pub fn new(settings: TextParserSettings) -> Self {
        Self { settings }
    }

    async fn read_decoded(&self, path: &Path) -> Result<(String, &'static str), EngineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::storage(format!("read {}: {e}", path.display())))?;
        Ok(decode_bytes(&bytes))
    }
}

/// Decodes file content trying UTF-8 first, then UTF-16 when a byte order
/// mark announces it, and finally Latin-1, which accepts any byte sequence.
/// Returns the text and the encoding label that produced it.
fn decode_bytes(bytes: &[u8]) -> (String, &'static str) {
    let without_bom = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(without_bom) {
        return (text.to_string(), "utf-8");
    }
    if let Some(text) = decode_utf16_with_bom(bytes) {
        return (text, "utf-16");
    }
    (bytes.iter().map(|&b| b as char).collect(), "latin-1")
}

fn decode_utf16_with_bom(bytes: &[u8]) -> Option<String> {
    let (little_endian, data) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (true, rest),
        [0xFE, 0xFF, rest @ ..] => (false, rest),
        _ => return None,
    };
    if data.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).ok()
}

/// Greedy paragraph packing: paragraphs accumulate until the next one would
/// push the chunk past `chunk_size`, then the chunk flushes. When overlap is
/// enabled the last paragraph carries into the next chunk if it fits the
/// overlap budget.
fn chunks_by_paragraphs(content: &str, settings: &TextParserSettings) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    let mut flush = |parts: &[&str], chunks: &mut Vec<DocumentChunk>| {
        let text = parts.join("\n\n");
        if text.chars().count() >= settings.min_chunk_length {
            chunks.push(make_text_chunk(&text, ChunkType::Paragraph, chunks.len() + 1));
        }
    };

    for paragraph in content.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let paragraph_len = paragraph.chars().count();

        if current_len + paragraph_len > settings.chunk_size && !current.is_empty() {
            flush(&current, &mut chunks);
            if settings.chunk_overlap > 0 {
                if let Some(&last) = current.last() {
                    if last.chars().count() <= settings.chunk_overlap {
                        current = vec![last];
                        current_len = last.chars().count();
                    } else {
                        current.clear();
                        current_len = 0;
                    }
                }
            } else {
                current.clear();
                current_len = 0;
            }
        }

        current.push(paragraph);
        current_len += paragraph_len;
    }

    if !current.is_empty() {
        flush(&current, &mut chunks);
    }

    chunks
}

/// Fixed windows of `chunk_size` characters. The cut point slides forward
/// up to 100 characters to land on whitespace, and consecutive windows
/// overlap by `chunk_overlap` characters.
fn chunks_by_window(content: &str, settings: &TextParserSettings) -> Vec<DocumentChunk> {
    let chars: Vec<char> = content.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let mut end = (start + settings.chunk_size).min(chars.len());
        if end < chars.len() {
            for i in end..(end + 100).min(chars.len()) {
                if chars[i] == ' ' || chars[i] == '\n' || chars[i] == '\t' {
                    end = i;
                    break;
                }
            }
        }

        let window: String = chars[start..end].iter().collect();
        let window = window.trim();
        if window.chars().count() >= settings.min_chunk_length {
            chunks.push(make_text_chunk(window, ChunkType::Window, chunks.len() + 1));
        }

        if end >= chars.len() {
            break;
        }
        start = (start + 1).max(end.saturating_sub(settings.chunk_overlap));
    }

    chunks
}

fn make_text_chunk(text: &str, chunk_type: ChunkType, number: usize) -> DocumentChunk {
    DocumentChunk::new(clean_text(text), chunk_type)
        .with_metadata("chunk_number", number.to_string())
        .with_metadata("character_count", text.chars().count().to_string())
        .with_metadata("word_count", count_words(text).to_string())
}

#[async_trait]
impl DocumentParser for TextParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Text
    }

    fn parser_name(&self) -> &'static str {
        "TextParser"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["txt"]
    }

    async fn extract_text(&self, path: &Path) -> Result<String, EngineError> {
        let (content, _) = self.read_decoded(path).await?;
        Ok(clean_text(&content))
    }

    async fn extract_metadata(&self, path: &Path) -> Result<DocumentMetadata, EngineError> {
        let (content, encoding) = self.read_decoded(path).await?;
        let file_size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        Ok(DocumentMetadata::new()
            .with_format(DocumentFormat::Text)
            .with_word_count(count_words(&content))
            .with_file_size(file_size)
            .with_extra("encoding", encoding)
            .with_extra("line_count", content.lines().count().to_string())
            .with_extra("character_count", content.chars().count().to_string()))
    }

    async fn extract_chunks(&self, path: &Path) -> Result<Vec<DocumentChunk>, EngineError> {
        let (content, _) = self.read_decoded(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Paragraph packing needs blank-line boundaries; a file without
        // them would otherwise collapse into one chunk of arbitrary size.
        let chunks = if content.contains("\n\n") {
            chunks_by_paragraphs(&content, &self.settings)
        } else {
            chunks_by_window(&content, &self.settings)
        };

        Ok(chunks
            .into_iter()
            .map(|c| c.with_source_file(file_name.clone(), DocumentFormat::Text))
            .collect())
    }
}
