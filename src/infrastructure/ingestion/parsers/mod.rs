//! Document parser implementations, one per supported format.

mod docx;
mod epub;
mod excel;
mod html;
mod markdown;
mod pdf;
mod pptx;
mod text;

pub use docx::{DocxParser, DocxParserSettings};
pub use epub::{EpubParser, EpubParserSettings};
pub use excel::{ExcelParser, ExcelParserSettings};
pub(crate) use html::page_title_and_text;
pub use html::{HtmlParser, HtmlParserSettings};
pub use markdown::{MarkdownParser, MarkdownParserSettings};
pub use pdf::{PdfParser, PdfParserSettings};
pub use pptx::{PptxParser, PptxParserSettings};
pub use text::{TextParser, TextParserSettings};
