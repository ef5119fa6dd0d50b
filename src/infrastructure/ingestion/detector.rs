//! Format detection from file names and content signatures.

use std::path::Path;

use crate::domain::DocumentFormat;

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1";
const HTML_PREFIXES: [&[u8]; 3] = [b"<!DOCTYPE html", b"<html", b"<HTML"];

/// Resolves a [`DocumentFormat`] for incoming files.
///
/// Extension wins when it is unambiguous. Office extensions are verified
/// against the container on disk, so a renamed spreadsheet lands on the
/// right parser. Files without a recognized extension fall back to content
/// signatures and finally to the MIME table for the name.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatDetector;

impl FormatDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detects the format of a file on disk, reading its content only when
    /// the name alone is not decisive. Returns `None` for unsupported input.
    pub async fn detect(&self, path: &Path) -> Option<DocumentFormat> {
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        if let Some(format) = extension_format(&file_name) {
            if !needs_content_check(format) {
                return Some(format);
            }
        }
        match tokio::fs::read(path).await {
            Ok(bytes) => self.detect_bytes(&file_name, &bytes),
            // Unreadable content leaves only the name to go on.
            Err(_) => extension_format(&file_name).or_else(|| mime_format(&file_name)),
        }
    }

    /// Pure detection over in-memory content.
    pub fn detect_bytes(&self, file_name: &str, bytes: &[u8]) -> Option<DocumentFormat> {
        if let Some(format) = extension_format(file_name) {
            if needs_content_check(format) {
                return Some(verify_office_format(file_name, bytes, format));
            }
            return Some(format);
        }
        if bytes.starts_with(PDF_MAGIC) {
            return Some(DocumentFormat::Pdf);
        }
        if bytes.starts_with(ZIP_MAGIC) {
            return zip_member_format(bytes);
        }
        if bytes.starts_with(OLE_MAGIC) {
            return legacy_format_by_name(file_name);
        }
        if HTML_PREFIXES.iter().any(|p| bytes.starts_with(p)) {
            return Some(DocumentFormat::Html);
        }
        mime_format(file_name)
    }

    pub fn is_supported(&self, file_name: &str, bytes: &[u8]) -> bool {
        self.detect_bytes(file_name, bytes).is_some()
    }

    /// Every extension any format claims, without dots.
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        DocumentFormat::ALL
            .iter()
            .flat_map(|f| f.extensions().iter().copied())
            .collect()
    }
}

fn extension_format(file_name: &str) -> Option<DocumentFormat> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(DocumentFormat::from_extension)
}

/// OOXML extensions get verified because the three containers are
/// interchangeable on disk; legacy extensions because the file may in fact
/// be a modern container that was renamed.
fn needs_content_check(format: DocumentFormat) -> bool {
    matches!(
        format,
        DocumentFormat::Docx | DocumentFormat::Pptx | DocumentFormat::Xlsx
    ) || format.is_legacy_office()
}

fn verify_office_format(file_name: &str, bytes: &[u8], expected: DocumentFormat) -> DocumentFormat {
    if bytes.starts_with(ZIP_MAGIC) {
        return zip_member_format(bytes).unwrap_or(expected);
    }
    if bytes.starts_with(&OLE_MAGIC[..4]) {
        return legacy_format_by_name(file_name).unwrap_or(expected);
    }
    expected
}

/// Peeks at the member list of a ZIP container to tell the OOXML family
/// and EPUB apart.
fn zip_member_format(bytes: &[u8]) -> Option<DocumentFormat> {
    let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).ok()?;
    let names: Vec<&str> = archive.file_names().collect();
    if names.contains(&"word/document.xml") {
        Some(DocumentFormat::Docx)
    } else if names
        .iter()
        .any(|n| *n == "ppt/presentation.xml" || n.starts_with("ppt/slides/"))
    {
        Some(DocumentFormat::Pptx)
    } else if names.contains(&"xl/workbook.xml") {
        Some(DocumentFormat::Xlsx)
    } else if names.contains(&"META-INF/container.xml") {
        Some(DocumentFormat::Epub)
    } else {
        None
    }
}

/// OLE compound files carry no member manifest worth parsing here, so the
/// extension decides between the legacy formats.
fn legacy_format_by_name(file_name: &str) -> Option<DocumentFormat> {
    extension_format(file_name).filter(DocumentFormat::is_legacy_office)
}

fn mime_format(file_name: &str) -> Option<DocumentFormat> {
    let mime = mime_guess::from_path(file_name).first()?;
    match mime.essence_str() {
        "application/pdf" => Some(DocumentFormat::Pdf),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            Some(DocumentFormat::Docx)
        }
        "application/msword" => Some(DocumentFormat::Doc),
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            Some(DocumentFormat::Pptx)
        }
        "application/vnd.ms-powerpoint" => Some(DocumentFormat::Ppt),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
            Some(DocumentFormat::Xlsx)
        }
        "application/vnd.ms-excel" => Some(DocumentFormat::Xls),
        "application/epub+zip" => Some(DocumentFormat::Epub),
        "text/html" => Some(DocumentFormat::Html),
        "text/markdown" => Some(DocumentFormat::Markdown),
        "text/plain" => Some(DocumentFormat::Text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn zip_with(names: &[&str]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for name in names {
            writer.start_file(*name, options).unwrap();
            writer.write_all(b"<x/>").unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn plain_extensions_skip_content() {
        let detector = FormatDetector::new();
        assert_eq!(
            detector.detect_bytes("notes.txt", b"\x00garbage"),
            Some(DocumentFormat::Text)
        );
        assert_eq!(
            detector.detect_bytes("readme.MD", b""),
            Some(DocumentFormat::Markdown)
        );
    }

    #[test]
    fn office_extension_verified_against_container() {
        let detector = FormatDetector::new();
        let workbook = zip_with(&["xl/workbook.xml", "xl/worksheets/sheet1.xml"]);
        // A spreadsheet renamed to .docx still lands on the Excel parser.
        assert_eq!(
            detector.detect_bytes("renamed.docx", &workbook),
            Some(DocumentFormat::Xlsx)
        );
        let document = zip_with(&["word/document.xml"]);
        assert_eq!(
            detector.detect_bytes("report.docx", &document),
            Some(DocumentFormat::Docx)
        );
    }

    #[test]
    fn office_extension_with_unrecognized_content_keeps_extension() {
        let detector = FormatDetector::new();
        assert_eq!(
            detector.detect_bytes("broken.pptx", b"not a container"),
            Some(DocumentFormat::Pptx)
        );
    }

    #[test]
    fn unknown_extension_sniffs_magic_bytes() {
        let detector = FormatDetector::new();
        assert_eq!(
            detector.detect_bytes("scan.bin", b"%PDF-1.7 rest"),
            Some(DocumentFormat::Pdf)
        );
        let epub = zip_with(&["META-INF/container.xml", "OEBPS/content.opf"]);
        assert_eq!(detector.detect_bytes("book.download", &epub), Some(DocumentFormat::Epub));
        assert_eq!(
            detector.detect_bytes("page.tmp", b"<!DOCTYPE html><html></html>"),
            Some(DocumentFormat::Html)
        );
    }

    #[test]
    fn ole_magic_resolves_by_extension() {
        let detector = FormatDetector::new();
        let mut ole = OLE_MAGIC.to_vec();
        ole.extend_from_slice(&[0u8; 16]);
        assert_eq!(detector.detect_bytes("legacy.doc", &ole), Some(DocumentFormat::Doc));
        assert_eq!(detector.detect_bytes("legacy.xls", &ole), Some(DocumentFormat::Xls));
        assert_eq!(detector.detect_bytes("unnamed", &ole), None);
    }

    #[test]
    fn unsupported_input_detects_none() {
        let detector = FormatDetector::new();
        assert_eq!(detector.detect_bytes("program.exe", b"MZ\x90\x00"), None);
        assert_eq!(detector.detect_bytes("noext", b"\x01\x02\x03"), None);
    }

    #[tokio::test]
    async fn detect_reads_ambiguous_files_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.xlsx");
        std::fs::write(&path, zip_with(&["xl/workbook.xml"])).unwrap();
        let detector = FormatDetector::new();
        assert_eq!(detector.detect(&path).await, Some(DocumentFormat::Xlsx));
    }

    #[tokio::test]
    async fn detect_missing_file_falls_back_to_name() {
        let detector = FormatDetector::new();
        let format = detector.detect(Path::new("/definitely/absent/file.pdf")).await;
        assert_eq!(format, Some(DocumentFormat::Pdf));
    }
}
