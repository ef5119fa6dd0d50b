//! Document parser trait

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;

use crate::domain::EngineError;

use super::chunk::{DocumentChunk, DocumentMetadata};
use super::format::DocumentFormat;

/// Common capability set every format parser implements.
///
/// Parsers read the file themselves; callers hand over a path, not bytes, so
/// each implementation can choose how much of the file to materialize.
#[async_trait]
pub trait DocumentParser: Send + Sync + Debug {
    /// The format this parser handles.
    fn format(&self) -> DocumentFormat;

    /// Short human-readable parser name for diagnostics.
    fn parser_name(&self) -> &'static str;

    /// File extensions this parser accepts (without the dot).
    fn supported_extensions(&self) -> &[&'static str];

    /// Whether the path's extension belongs to this parser.
    fn can_parse(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        self.supported_extensions()
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&ext))
    }

    /// Check the file exists, is a regular file, and is non-empty.
    async fn validate_file(&self, path: &Path) -> Result<(), EngineError> {
        let meta = tokio::fs::metadata(path).await.map_err(|_| {
            EngineError::validation(format!("file does not exist: {}", path.display()))
        })?;

        if !meta.is_file() {
            return Err(EngineError::validation(format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        if meta.len() == 0 {
            return Err(EngineError::validation(format!(
                "file is empty: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Whole-document plain text, newline-normalized with collapsed
    /// whitespace.
    async fn extract_text(&self, path: &Path) -> Result<String, EngineError>;

    /// Document-level metadata (title, author, counts, extras).
    async fn extract_metadata(&self, path: &Path) -> Result<DocumentMetadata, EngineError>;

    /// Structured chunks using the format's splitting policy. The primary
    /// product consumed by the pipeline.
    async fn extract_chunks(&self, path: &Path) -> Result<Vec<DocumentChunk>, EngineError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::domain::ingestion::ChunkType;
    use std::sync::Mutex;

    /// Mock parser returning canned chunks or a canned failure.
    #[derive(Debug)]
    pub struct MockDocumentParser {
        format: DocumentFormat,
        extensions: Vec<&'static str>,
        chunks: Mutex<Option<Result<Vec<DocumentChunk>, String>>>,
    }

    impl MockDocumentParser {
        pub fn new(format: DocumentFormat) -> Self {
            Self {
                format,
                extensions: vec!["txt"],
                chunks: Mutex::new(None),
            }
        }

        pub fn with_extensions(mut self, extensions: Vec<&'static str>) -> Self {
            self.extensions = extensions;
            self
        }

        pub fn with_chunks(self, chunks: Vec<DocumentChunk>) -> Self {
            *self.chunks.lock().unwrap() = Some(Ok(chunks));
            self
        }

        pub fn with_error(self, error: impl Into<String>) -> Self {
            *self.chunks.lock().unwrap() = Some(Err(error.into()));
            self
        }
    }

    #[async_trait]
    impl DocumentParser for MockDocumentParser {
        fn format(&self) -> DocumentFormat {
            self.format
        }

        fn parser_name(&self) -> &'static str {
            "MockParser"
        }

        fn supported_extensions(&self) -> &[&'static str] {
            &self.extensions
        }

        async fn extract_text(&self, _path: &Path) -> Result<String, EngineError> {
            Ok("mock text".to_string())
        }

        async fn extract_metadata(&self, _path: &Path) -> Result<DocumentMetadata, EngineError> {
            Ok(DocumentMetadata::new().with_format(self.format))
        }

        async fn extract_chunks(&self, _path: &Path) -> Result<Vec<DocumentChunk>, EngineError> {
            if let Some(result) = self.chunks.lock().unwrap().take() {
                return result.map_err(|e| EngineError::parse(self.format.as_str(), e));
            }
            Ok(vec![DocumentChunk::new("mock chunk", ChunkType::Paragraph)])
        }
    }
}
