//! docsum Parser - Document loading and chunking
//!
//! Supports loading of:
//! - PDF documents (text via pdf-extract, title via the Info dictionary)
//! - Markdown files
//! - Plain text files
//!
//! Each parser implements the `DocumentParser` trait and produces a
//! `ParsedDocument`. The `DocumentLoader` turns parsed output into core
//! `Document`s with ids assigned relative to the corpus root, and the
//! `chunking` module splits document text for the summarizer and the
//! chunk-level index.

use docsum_core::{DocsumError, Document};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub mod chunking;
pub mod pdf;

pub use chunking::{reconstruct, ChunkConfig, ChunkError, Chunker, Chunks};
pub use pdf::PdfParser;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during document loading
#[derive(Error, Debug)]
pub enum ParserError {
    /// File format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PDF parsing error
    #[error("PDF parsing error in {path}: {message}")]
    PdfError { path: String, message: String },

    /// Text encoding error
    #[error("Text encoding error in {path}: {message}")]
    EncodingError { path: String, message: String },

    /// Corpus directory could not be walked
    #[error("Failed to scan corpus {path}: {message}")]
    ScanError { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, ParserError>;

impl ParserError {
    fn path(&self) -> Option<&str> {
        match self {
            Self::IoError { path, .. }
            | Self::PdfError { path, .. }
            | Self::EncodingError { path, .. }
            | Self::ScanError { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<ParserError> for DocsumError {
    fn from(err: ParserError) -> Self {
        DocsumError::Load {
            path: err.path().unwrap_or("<unknown>").to_string(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Parsed Document Types
// ============================================================================

/// A parsed document with extracted content
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Original file path
    pub file_path: String,

    /// Detected file type
    pub file_type: FileType,

    /// Extracted text, all pages concatenated in physical order
    pub content: String,

    /// Metadata extracted from the document
    pub metadata: DocumentParseMetadata,
}

impl ParsedDocument {
    /// Create a new parsed document
    pub fn new(file_path: impl Into<String>, file_type: FileType) -> Self {
        Self {
            file_path: file_path.into(),
            file_type,
            content: String::new(),
            metadata: DocumentParseMetadata::default(),
        }
    }

    /// Set content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Markdown,
    PlainText,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "md" | "markdown" => Self::Markdown,
            "txt" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Markdown => write!(f, "markdown"),
            Self::PlainText => write!(f, "text"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Metadata extracted during parsing
#[derive(Debug, Clone, Default)]
pub struct DocumentParseMetadata {
    /// Document title from the file's own metadata
    pub title: Option<String>,
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Trait for document parsers
pub trait DocumentParser: Send + Sync {
    /// Parse a document from a file path
    fn parse(&self, path: &Path) -> Result<ParsedDocument>;

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Check if this parser can handle a file type
    fn can_parse(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

// ============================================================================
// Parser Registry
// ============================================================================

/// Registry of available parsers
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with the PDF and plain text parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PdfParser::new());
        registry.register(PlainTextParser);
        registry
    }

    /// Register a parser
    pub fn register<P: DocumentParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    /// Find a parser for a file type
    pub fn find_parser(&self, file_type: FileType) -> Option<&dyn DocumentParser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(file_type))
            .map(|p| p.as_ref())
    }

    /// Parse a file using the appropriate parser
    pub fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let file_type = FileType::from_path(path);

        if file_type == FileType::Unknown {
            return Err(ParserError::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("none")
                    .to_string(),
            ));
        }

        let parser = self
            .find_parser(file_type)
            .ok_or_else(|| ParserError::UnsupportedFormat(file_type.to_string()))?;

        parser.parse(path)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Plain text parser
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        let content = String::from_utf8(bytes).map_err(|e| ParserError::EncodingError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(
            ParsedDocument::new(path.display().to_string(), FileType::from_path(path))
                .with_content(content),
        )
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::PlainText, FileType::Markdown]
    }
}

// ============================================================================
// Document Loader
// ============================================================================

/// Loads files into core documents
///
/// Ids are the file path relative to the corpus root (forward slashes),
/// or the bare file name when no root is set.
pub struct DocumentLoader {
    registry: ParserRegistry,
    root: Option<PathBuf>,
}

impl DocumentLoader {
    /// Loader with the default parsers and no corpus root
    pub fn new() -> Self {
        Self {
            registry: ParserRegistry::with_defaults(),
            root: None,
        }
    }

    /// Use a custom parser registry
    pub fn with_registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Assign ids relative to this corpus root
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Load a single document
    pub fn load(&self, path: &Path) -> Result<Document> {
        let parsed = self.registry.parse(path)?;
        let id = self.document_id(path);
        let title = parsed.metadata.title.unwrap_or_default();

        tracing::debug!(
            id = %id,
            chars = parsed.content.len(),
            has_title = !title.is_empty(),
            "document loaded"
        );

        Ok(Document::new(id, parsed.content)
            .with_title(title)
            .with_source_path(path.display().to_string()))
    }

    fn document_id(&self, path: &Path) -> String {
        let relative = self
            .root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .filter(|rel| !rel.as_os_str().is_empty());

        match relative {
            Some(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            None => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively find files under `root` with the given extension
///
/// Matching ignores case. The result is sorted so discovery order is stable
/// across runs.
pub fn discover_documents(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(ParserError::ScanError {
            path: root.display().to_string(),
            message: "not a directory".to_string(),
        });
    }

    let wanted = extension.trim_start_matches('.').to_lowercase();
    let mut paths = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase() == wanted)
            .unwrap_or(false);
        if matches {
            paths.push(entry.into_path());
        }
    }

    paths.sort();
    Ok(paths)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_extension("pdf"), FileType::Pdf);
        assert_eq!(FileType::from_extension("PDF"), FileType::Pdf);
        assert_eq!(FileType::from_extension("md"), FileType::Markdown);
        assert_eq!(FileType::from_extension("txt"), FileType::PlainText);
        assert_eq!(FileType::from_extension("docx"), FileType::Unknown);
    }

    #[test]
    fn test_registry_rejects_unknown_extension() {
        let registry = ParserRegistry::with_defaults();
        let err = registry.parse(Path::new("notes.docx")).unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedFormat(ext) if ext == "docx"));
    }

    #[test]
    fn test_load_plain_text_with_root_relative_id() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("papers");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("vaccines.txt");
        fs::write(&file, "mRNA vaccines instruct cells to make a protein.").unwrap();

        let loader = DocumentLoader::new().with_root(dir.path());
        let doc = loader.load(&file).unwrap();

        assert_eq!(doc.id, "papers/vaccines.txt");
        assert_eq!(doc.title, "");
        assert!(doc.text.starts_with("mRNA"));
        assert_eq!(doc.source_path.as_deref(), Some(file.display().to_string().as_str()));
    }

    #[test]
    fn test_load_without_root_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.md");
        fs::write(&file, "# Heading\n\nBody").unwrap();

        let doc = DocumentLoader::new().load(&file).unwrap();
        assert_eq!(doc.id, "a.md");
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = DocumentLoader::new()
            .load(Path::new("/definitely/not/here.txt"))
            .unwrap_err();
        assert!(matches!(err, ParserError::IoError { .. }));

        let core: DocsumError = err.into();
        assert!(
            matches!(core, DocsumError::Load { ref path, .. } if path == "/definitely/not/here.txt")
        );
    }

    #[test]
    fn test_corrupt_pdf_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.pdf");
        fs::write(&file, b"this is not a pdf").unwrap();

        let err = DocumentLoader::new().load(&file).unwrap_err();
        assert!(matches!(err, ParserError::PdfError { .. }));
        let core: DocsumError = err.into();
        assert!(matches!(core, DocsumError::Load { ref path, .. } if path.ends_with("broken.pdf")));
    }

    #[test]
    fn test_discover_documents_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/inner")).unwrap();
        fs::write(dir.path().join("z.pdf"), b"").unwrap();
        fs::write(dir.path().join("a.PDF"), b"").unwrap();
        fs::write(dir.path().join("b/inner/m.pdf"), b"").unwrap();
        fs::write(dir.path().join("b/skip.txt"), b"").unwrap();

        let found = discover_documents(dir.path(), "pdf").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert_eq!(names, vec!["a.PDF", "b/inner/m.pdf", "z.pdf"]);
    }

    #[test]
    fn test_discover_documents_requires_directory() {
        let err = discover_documents(Path::new("/no/such/corpus"), "pdf").unwrap_err();
        assert!(matches!(err, ParserError::ScanError { .. }));
    }
}
