//! Document format identification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Document formats the engine knows about.
///
/// Legacy OLE formats are detected by extension only; `Doc` and `Ppt`
/// carry no registered parser, and `Xls` shares the Excel parser entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Doc,
    Docx,
    Ppt,
    Pptx,
    Xls,
    Xlsx,
    Epub,
    Html,
    Markdown,
    Text,
}

impl DocumentFormat {
    /// Every format, in registry order.
    pub const ALL: [DocumentFormat; 11] = [
        Self::Pdf,
        Self::Doc,
        Self::Docx,
        Self::Ppt,
        Self::Pptx,
        Self::Xls,
        Self::Xlsx,
        Self::Epub,
        Self::Html,
        Self::Markdown,
        Self::Text,
    ];

    /// Stable lowercase name, used as the `format_type` metadata value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
            Self::Ppt => "ppt",
            Self::Pptx => "pptx",
            Self::Xls => "xls",
            Self::Xlsx => "xlsx",
            Self::Epub => "epub",
            Self::Html => "html",
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }

    /// Resolve a format from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            "ppt" => Some(Self::Ppt),
            "pptx" => Some(Self::Pptx),
            "xls" => Some(Self::Xls),
            "xlsx" => Some(Self::Xlsx),
            "epub" => Some(Self::Epub),
            "html" | "htm" => Some(Self::Html),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    /// Extensions conventionally carrying this format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Pdf => &["pdf"],
            Self::Doc => &["doc"],
            Self::Docx => &["docx"],
            Self::Ppt => &["ppt"],
            Self::Pptx => &["pptx"],
            Self::Xls => &["xls"],
            Self::Xlsx => &["xlsx"],
            Self::Epub => &["epub"],
            Self::Html => &["html", "htm"],
            Self::Markdown => &["md", "markdown"],
            Self::Text => &["txt"],
        }
    }

    /// Pre-2007 Office formats stored as OLE compound files.
    pub fn is_legacy_office(&self) -> bool {
        matches!(self, Self::Doc | Self::Ppt | Self::Xls)
    }

    /// Formats stored as ZIP containers (OOXML and EPUB).
    pub fn is_zip_container(&self) -> bool {
        matches!(self, Self::Docx | Self::Pptx | Self::Xlsx | Self::Epub)
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension_case_insensitive() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("Docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("htm"), Some(DocumentFormat::Html));
        assert_eq!(DocumentFormat::from_extension("markdown"), Some(DocumentFormat::Markdown));
        assert_eq!(DocumentFormat::from_extension("exe"), None);
    }

    #[test]
    fn test_as_str_round_trip() {
        for format in [
            DocumentFormat::Pdf,
            DocumentFormat::Docx,
            DocumentFormat::Epub,
            DocumentFormat::Text,
        ] {
            assert_eq!(DocumentFormat::from_extension(format.extensions()[0]), Some(format));
        }
    }

    #[test]
    fn test_legacy_office() {
        assert!(DocumentFormat::Doc.is_legacy_office());
        assert!(DocumentFormat::Xls.is_legacy_office());
        assert!(!DocumentFormat::Docx.is_legacy_office());
    }
}
