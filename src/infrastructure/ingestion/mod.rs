//! Document ingestion infrastructure
//!
//! Format detection, the per-format parsers, the parser registry, and the
//! processor that turns stored sources into vector-store nodes.

pub mod detector;
pub mod ooxml;
pub mod parsers;
pub mod processor;
pub mod registry;
pub mod text;
pub mod web;

pub use detector::FormatDetector;
pub use parsers::{
    DocxParser, DocxParserSettings, EpubParser, EpubParserSettings, ExcelParser,
    ExcelParserSettings, HtmlParser, HtmlParserSettings, MarkdownParser, MarkdownParserSettings,
    PdfParser, PdfParserSettings, PptxParser, PptxParserSettings, TextParser, TextParserSettings,
};
pub use processor::{DataProcessor, FileSource, ProcessedBatch, SourceFailure, WebSource};
pub use registry::{FormatSupport, ParserRegistry, ParserSettings};
pub use web::{HttpWebpageLoader, WebSettings};
