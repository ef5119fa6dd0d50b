//! Maps detected formats to configured parser instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{DocumentFormat, DocumentParser};

use super::parsers::{
    DocxParser, DocxParserSettings, EpubParser, EpubParserSettings, ExcelParser,
    ExcelParserSettings, HtmlParser, HtmlParserSettings, MarkdownParser, MarkdownParserSettings,
    PdfParser, PdfParserSettings, PptxParser, PptxParserSettings, TextParser, TextParserSettings,
};

/// Per-format parser settings, one section per parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    pub pdf: PdfParserSettings,
    pub docx: DocxParserSettings,
    pub pptx: PptxParserSettings,
    pub excel: ExcelParserSettings,
    pub epub: EpubParserSettings,
    pub html: HtmlParserSettings,
    pub markdown: MarkdownParserSettings,
    pub text: TextParserSettings,
}

/// One row of the format diagnostics table.
#[derive(Debug, Clone, Serialize)]
pub struct FormatSupport {
    pub format: DocumentFormat,
    pub parser_name: Option<&'static str>,
    pub extensions: Vec<&'static str>,
    pub available: bool,
    pub reason: Option<String>,
}

/// Registry of parser instances, one per implemented format.
///
/// Built once at startup from configuration and handed to the processor;
/// never global state. Legacy `doc`/`ppt` are detectable but carry no
/// parser here, and `format_support` reports them as unavailable with the
/// reason.
#[derive(Debug)]
pub struct ParserRegistry {
    parsers: BTreeMap<DocumentFormat, Arc<dyn DocumentParser>>,
    fallback: Arc<dyn DocumentParser>,
}

impl ParserRegistry {
    pub fn new(settings: ParserSettings) -> Self {
        let fallback: Arc<dyn DocumentParser> = Arc::new(TextParser::new(settings.text));

        let mut parsers: BTreeMap<DocumentFormat, Arc<dyn DocumentParser>> = BTreeMap::new();
        parsers.insert(DocumentFormat::Pdf, Arc::new(PdfParser::new(settings.pdf)));
        parsers.insert(DocumentFormat::Docx, Arc::new(DocxParser::new(settings.docx)));
        parsers.insert(DocumentFormat::Pptx, Arc::new(PptxParser::new(settings.pptx)));
        let excel: Arc<dyn DocumentParser> = Arc::new(ExcelParser::new(settings.excel));
        parsers.insert(DocumentFormat::Xlsx, Arc::clone(&excel));
        // Binary .xls is not a ZIP container; the shared entry fails at
        // extract time rather than leaving the extension undetectable.
        parsers.insert(DocumentFormat::Xls, excel);
        parsers.insert(DocumentFormat::Epub, Arc::new(EpubParser::new(settings.epub)));
        parsers.insert(DocumentFormat::Html, Arc::new(HtmlParser::new(settings.html)));
        parsers.insert(
            DocumentFormat::Markdown,
            Arc::new(MarkdownParser::new(settings.markdown)),
        );
        parsers.insert(DocumentFormat::Text, Arc::clone(&fallback));

        Self { parsers, fallback }
    }

    /// The parser registered for `format`, if any.
    pub fn parser_for(&self, format: DocumentFormat) -> Option<Arc<dyn DocumentParser>> {
        self.parsers.get(&format).cloned()
    }

    /// The plain-text parser used when no specialized parser fits a file.
    pub fn fallback_parser(&self) -> Arc<dyn DocumentParser> {
        Arc::clone(&self.fallback)
    }

    pub fn is_available(&self, format: DocumentFormat) -> bool {
        self.parsers.contains_key(&format)
    }

    /// Diagnostics table covering every known format, parser-less ones
    /// included.
    pub fn format_support(&self) -> Vec<FormatSupport> {
        DocumentFormat::ALL
            .iter()
            .map(|format| match self.parsers.get(format) {
                Some(parser) => FormatSupport {
                    format: *format,
                    parser_name: Some(parser.parser_name()),
                    extensions: parser.supported_extensions().to_vec(),
                    available: true,
                    reason: None,
                },
                None => FormatSupport {
                    format: *format,
                    parser_name: None,
                    extensions: format.extensions().to_vec(),
                    available: false,
                    reason: Some(unavailable_reason(*format)),
                },
            })
            .collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new(ParserSettings::default())
    }
}

fn unavailable_reason(format: DocumentFormat) -> String {
    if format.is_legacy_office() {
        let modern = match format {
            DocumentFormat::Doc => "docx",
            DocumentFormat::Ppt => "pptx",
            _ => "xlsx",
        };
        format!("legacy {format} files are not supported; convert to {modern}")
    } else {
        format!("no parser registered for {format}")
    }
}
