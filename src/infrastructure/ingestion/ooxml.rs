//! Zip and XML plumbing shared by the OOXML and EPUB parsers.

use std::io::Read;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::domain::{DocumentFormat, EngineError};

/// Upper bound for a single decompressed XML entry. Zip bombs inside a
/// document container fail parsing instead of exhausting memory.
pub(crate) const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub(crate) type Archive<'a> = ZipArchive<std::io::Cursor<&'a [u8]>>;

pub(crate) fn open_archive(format: DocumentFormat, bytes: &[u8]) -> Result<Archive<'_>, EngineError> {
    ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| EngineError::parse(format.as_str(), format!("invalid zip container: {e}")))
}

/// Reads a named entry as UTF-8 text. Absent entries yield `Ok(None)` so
/// callers can distinguish optional parts from corrupt ones.
pub(crate) fn read_entry(
    format: DocumentFormat,
    archive: &mut Archive<'_>,
    name: &str,
) -> Result<Option<String>, EngineError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(EngineError::parse(
                format.as_str(),
                format!("zip entry {name}: {e}"),
            ))
        }
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| EngineError::parse(format.as_str(), format!("zip entry {name}: {e}")))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(EngineError::parse(
            format.as_str(),
            format!("zip entry {name} exceeds {MAX_XML_ENTRY_BYTES} byte limit"),
        ));
    }
    Ok(Some(String::from_utf8_lossy(&out).into_owned()))
}

/// Lists entries shaped like `{prefix}{n}{suffix}` ordered by `n`, so
/// `slide10.xml` sorts after `slide2.xml`. Entries whose middle part is
/// not a number sort last.
pub(crate) fn numbered_entries(archive: &Archive<'_>, prefix: &str, suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(suffix))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(suffix)
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Concatenates the text of every element with local name `text_tag`,
/// separated by single spaces. Namespace prefixes are ignored.
pub(crate) fn collect_element_text(
    format: DocumentFormat,
    xml: &str,
    text_tag: &[u8],
) -> Result<String, EngineError> {
    let mut out = String::new();
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == text_tag => in_text = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == text_tag => in_text = false,
            Ok(Event::Text(te)) if in_text => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::parse(format.as_str(), e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Walks elements with local name `group_tag` and returns one string per
/// group: the concatenated text of its nested `text_tag` elements. Groups
/// without text contribute an empty string, keeping positions aligned for
/// index-addressed tables like `sharedStrings.xml`.
pub(crate) fn collect_grouped_text(
    format: DocumentFormat,
    xml: &str,
    group_tag: &[u8],
    text_tag: &[u8],
) -> Result<Vec<String>, EngineError> {
    let mut groups = Vec::new();
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == group_tag {
                    current = Some(String::new());
                } else if current.is_some() && e.local_name().as_ref() == text_tag {
                    in_text = true;
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == group_tag {
                    if let Some(text) = current.take() {
                        groups.push(text);
                    }
                    in_text = false;
                } else if e.local_name().as_ref() == text_tag {
                    in_text = false;
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == group_tag {
                    groups.push(String::new());
                }
            }
            Ok(Event::Text(te)) if in_text => {
                if let Some(text) = current.as_mut() {
                    text.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::parse(format.as_str(), e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(groups)
}

/// Returns the value of the attribute with the given local name.
pub(crate) fn attr_value(start: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Dublin Core fields from `docProps/core.xml`, keyed by local element
/// name (`title`, `creator`, `created`, ...). Empty values are dropped.
pub(crate) fn core_properties(xml: &str) -> std::collections::BTreeMap<String, String> {
    const FIELDS: [&str; 8] = [
        "title",
        "creator",
        "subject",
        "keywords",
        "description",
        "lastModifiedBy",
        "created",
        "modified",
    ];
    let mut props = std::collections::BTreeMap::new();
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<&str> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current = FIELDS
                    .iter()
                    .copied()
                    .find(|f| e.local_name().as_ref() == f.as_bytes());
            }
            Ok(Event::Text(te)) => {
                if let Some(field) = current.take() {
                    let value = te.unescape().unwrap_or_default().trim().to_string();
                    if !value.is_empty() {
                        props.insert(field.to_string(), value);
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    props
}
