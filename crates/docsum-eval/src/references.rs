//! Reference summaries keyed by document file name

use std::collections::BTreeMap;
use std::path::Path;

use docsum_core::{DocsumError, Result};

/// Flat `{ "file.pdf": "reference summary", ... }` mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceSummaries {
    entries: BTreeMap<String, String>,
}

impl ReferenceSummaries {
    /// Read a JSON object file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DocsumError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let references = Self::from_json(&content)?;
        tracing::info!(path = %path.display(), count = references.len(), "reference summaries loaded");
        Ok(references)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let entries: BTreeMap<String, String> = serde_json::from_str(content)
            .map_err(|e| DocsumError::Evaluation(format!("invalid reference summaries: {e}")))?;
        Ok(Self { entries })
    }

    /// Reference for `path`, matched on its file name
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&str> {
        let path = path.as_ref();
        let key = path.file_name().and_then(|n| n.to_str())?;
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, file_name: impl Into<String>, summary: impl Into<String>) {
        self.entries.insert(file_name.into(), summary.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_lookup_by_file_name() {
        let refs = ReferenceSummaries::from_json(r#"{"paper.pdf": "A short summary."}"#).unwrap();
        assert_eq!(refs.get("/data/pdfs/paper.pdf"), Some("A short summary."));
        assert_eq!(refs.get("paper.pdf"), Some("A short summary."));
        assert_eq!(refs.get("other.pdf"), None);
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"a.pdf": "alpha", "b.pdf": "beta"}}"#).unwrap();

        let refs = ReferenceSummaries::from_file(file.path()).unwrap();
        assert_eq!(refs.get("b.pdf"), Some("beta"));
    }

    #[test]
    fn test_rejects_non_string_values() {
        assert!(matches!(
            ReferenceSummaries::from_json(r#"{"a.pdf": 3}"#),
            Err(DocsumError::Evaluation(_))
        ));
        assert!(matches!(
            ReferenceSummaries::from_file("/nonexistent/refs.json"),
            Err(DocsumError::Load { .. })
        ));
    }
}
