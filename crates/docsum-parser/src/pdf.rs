//! PDF document parser using pdf-extract
//!
//! Text comes from pdf-extract, which concatenates page text in physical
//! order. The title comes from the document's Info dictionary, read with
//! lopdf.

use std::path::Path;

use lopdf::{Dictionary, Object};

use crate::{DocumentParseMetadata, DocumentParser, FileType, ParsedDocument, ParserError, Result};

/// PDF document parser
pub struct PdfParser {
    /// Whether to read the Info dictionary
    pub read_metadata: bool,
}

impl PdfParser {
    /// Create a new PDF parser with default settings
    pub fn new() -> Self {
        Self {
            read_metadata: true,
        }
    }

    /// Enable or disable Info dictionary extraction
    pub fn with_metadata(mut self, enabled: bool) -> Self {
        self.read_metadata = enabled;
        self
    }

    fn extract_text(&self, path: &Path, bytes: &[u8]) -> Result<String> {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ParserError::PdfError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn extract_metadata(&self, path: &Path, bytes: &[u8]) -> DocumentParseMetadata {
        let doc = match lopdf::Document::load_mem(bytes) {
            Ok(doc) => doc,
            Err(e) => {
                // Metadata is optional once text extraction has succeeded.
                tracing::warn!(path = %path.display(), error = %e, "could not read PDF metadata");
                return DocumentParseMetadata::default();
            }
        };

        DocumentParseMetadata {
            title: info_string(&doc, b"Title"),
        }
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let text = self.extract_text(path, &bytes)?;
        let metadata = if self.read_metadata {
            self.extract_metadata(path, &bytes)
        } else {
            DocumentParseMetadata::default()
        };

        Ok(ParsedDocument {
            file_path: path.display().to_string(),
            file_type: FileType::Pdf,
            content: text,
            metadata,
        })
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}

/// Look up a non-empty text entry in the trailer's Info dictionary
pub(crate) fn info_string(doc: &lopdf::Document, key: &[u8]) -> Option<String> {
    let info = info_dictionary(doc)?;
    let value = resolve(doc, info.get(key).ok()?)?;

    match value {
        Object::String(bytes, _) => {
            let text = decode_text_string(bytes);
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

fn info_dictionary(doc: &lopdf::Document) -> Option<&Dictionary> {
    let info = resolve(doc, doc.trailer.get(b"Info").ok()?)?;
    match info {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a lopdf::Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Decode a PDF text string: UTF-16BE when it carries a BOM, UTF-8 with a
/// BOM, otherwise one byte per character
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}
