//! Text extraction from stored files
//!
//! This module turns a file's raw bytes into plain text:
//! - File kind detection from the declared file name / MIME type
//! - HTML and Markdown extraction
//! - A vision-capable layout path for PDFs (tables, forms, scans),
//!   falling back to plain byte-level decoding when it fails

mod html;
mod markdown;

pub use html::*;
pub use markdown::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

/// File kinds the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PlainText,
    Markdown,
    Html,
    Csv,
    Pdf,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::PlainText => write!(f, "text"),
            FileKind::Markdown => write!(f, "markdown"),
            FileKind::Html => write!(f, "html"),
            FileKind::Csv => write!(f, "csv"),
            FileKind::Pdf => write!(f, "pdf"),
        }
    }
}

impl std::str::FromStr for FileKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(FileKind::PlainText),
            "markdown" | "md" => Ok(FileKind::Markdown),
            "html" | "htm" => Ok(FileKind::Html),
            "csv" => Ok(FileKind::Csv),
            "pdf" => Ok(FileKind::Pdf),
            other => Err(Error::Extraction(format!(
                "Unsupported file type: {}",
                other
            ))),
        }
    }
}

impl FileKind {
    /// Detect the file kind from a file name, using the extension and
    /// `mime_guess` as a backstop. Unsupported kinds are an error naming
    /// the offending type.
    pub fn from_name(name: &Path) -> Result<Self> {
        let ext = name
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("txt") | Some("text") => return Ok(FileKind::PlainText),
            Some("md") | Some("markdown") | Some("mdx") => return Ok(FileKind::Markdown),
            Some("html") | Some("htm") => return Ok(FileKind::Html),
            Some("csv") => return Ok(FileKind::Csv),
            Some("pdf") => return Ok(FileKind::Pdf),
            _ => {}
        }

        let mime = mime_guess::from_path(name).first_or_octet_stream();
        match (mime.type_().as_str(), mime.subtype().as_str()) {
            ("text", "plain") => Ok(FileKind::PlainText),
            ("text", "markdown") => Ok(FileKind::Markdown),
            ("text", "html") => Ok(FileKind::Html),
            ("text", "csv") => Ok(FileKind::Csv),
            ("application", "pdf") => Ok(FileKind::Pdf),
            _ => Err(Error::Extraction(format!(
                "Unsupported file type: {}",
                ext.as_deref().unwrap_or(mime.essence_str())
            ))),
        }
    }

    /// MIME type used when handing bytes to the vision path
    pub fn mime(&self) -> &'static str {
        match self {
            FileKind::PlainText => "text/plain",
            FileKind::Markdown => "text/markdown",
            FileKind::Html => "text/html",
            FileKind::Csv => "text/csv",
            FileKind::Pdf => "application/pdf",
        }
    }

    /// Whether visual layout materially affects meaning for this kind
    pub fn layout_sensitive(&self) -> bool {
        matches!(self, FileKind::Pdf)
    }
}

/// Vision-capable extraction path for layout-sensitive formats
#[async_trait]
pub trait LayoutReader: Send + Sync {
    /// Render a document's visual layout (tables, forms, scanned pages)
    /// to plain text
    async fn read_layout(&self, bytes: &[u8], mime: &str) -> Result<String>;
}

/// Extract plain text from raw bytes.
///
/// Layout-sensitive kinds first attempt the vision path when one is
/// supplied; its failure (or an empty result) is logged and falls back
/// to byte-level decoding rather than propagating.
pub async fn extract_text(
    bytes: &[u8],
    kind: FileKind,
    layout: Option<&dyn LayoutReader>,
) -> Result<String> {
    if kind.layout_sensitive() {
        if let Some(reader) = layout {
            match reader.read_layout(bytes, kind.mime()).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(kind = %kind, chars = text.len(), "Vision extraction succeeded");
                    return Ok(text);
                }
                Ok(_) => {
                    warn!(kind = %kind, "Vision extraction returned no content, falling back");
                }
                Err(e) => {
                    warn!(kind = %kind, "Vision extraction failed, falling back: {}", e);
                }
            }
        }
    }

    decode_bytes(bytes, kind)
}

/// Plain byte-level decoding for each file kind
fn decode_bytes(bytes: &[u8], kind: FileKind) -> Result<String> {
    match kind {
        FileKind::PlainText | FileKind::Csv => Ok(String::from_utf8_lossy(bytes).into_owned()),
        FileKind::Markdown => {
            let raw = String::from_utf8_lossy(bytes);
            Ok(extract_text_from_markdown(&raw))
        }
        FileKind::Html => {
            let raw = String::from_utf8_lossy(bytes);
            Ok(extract_text_from_html(&raw))
        }
        FileKind::Pdf => extract_pdf_text(bytes),
    }
}

#[cfg(feature = "pdf")]
fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::Extraction(format!("PDF decode failed: {}", e)))
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf_text(_bytes: &[u8]) -> Result<String> {
    Err(Error::Extraction(
        "PDF support not compiled in (enable the 'pdf' feature)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingReader;

    #[async_trait]
    impl LayoutReader for FailingReader {
        async fn read_layout(&self, _bytes: &[u8], _mime: &str) -> Result<String> {
            Err(Error::Extraction("vision backend unavailable".to_string()))
        }
    }

    struct FixedReader(String);

    #[async_trait]
    impl LayoutReader for FixedReader {
        async fn read_layout(&self, _bytes: &[u8], _mime: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(
            FileKind::from_name(Path::new("notes.txt")).unwrap(),
            FileKind::PlainText
        );
        assert_eq!(
            FileKind::from_name(Path::new("policy.PDF")).unwrap(),
            FileKind::Pdf
        );
        assert_eq!(
            FileKind::from_name(Path::new("page.htm")).unwrap(),
            FileKind::Html
        );
    }

    #[test]
    fn test_unsupported_kind_names_the_type() {
        let err = FileKind::from_name(Path::new("video.mp4")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Unsupported file type"));
        assert!(msg.contains("mp4"));
    }

    #[tokio::test]
    async fn test_plain_text_extraction() {
        let text = extract_text(b"hello world", FileKind::PlainText, None)
            .await
            .unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_vision_failure_is_non_fatal() {
        // Vision path fails; plain decoding still runs. The PDF decode
        // itself fails on garbage bytes, which IS fatal.
        let result = extract_text(b"not a pdf", FileKind::Pdf, Some(&FailingReader)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_vision_result_wins_for_pdf() {
        let reader = FixedReader("| Name | Leave days |\n| Ann | 25 |".to_string());
        let text = extract_text(b"%PDF-1.4 ...", FileKind::Pdf, Some(&reader))
            .await
            .unwrap();
        assert!(text.contains("Leave days"));
    }

    #[tokio::test]
    async fn test_empty_vision_result_falls_back() {
        let reader = FixedReader("   ".to_string());
        // Empty vision output falls through to byte decoding
        let result = extract_text(b"plain bytes", FileKind::Pdf, Some(&reader)).await;
        // Garbage PDF bytes fail in the fallback decoder
        assert!(result.is_err());
    }
}
