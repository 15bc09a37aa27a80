//! File-format readers that turn a document on disk into text.
//!
//! Supported formats are plain text, PDF (per page) and CSV (flattened into
//! a pipe-separated table). Anything else is rejected with
//! [`ContextError::UnsupportedFormat`].

use crate::error::{ContextError, Result};
use std::fs;
use std::io;
use std::path::Path;

/// Extensions (without the dot) that have a reader.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "pdf", "csv"];

/// Document formats with a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Pdf,
    Csv,
}

impl DocumentFormat {
    /// Detect the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = extension_of(path);
        match extension.as_str() {
            "txt" => Ok(DocumentFormat::Text),
            "pdf" => Ok(DocumentFormat::Pdf),
            "csv" => Ok(DocumentFormat::Csv),
            _ => Err(ContextError::unsupported(extension)),
        }
    }
}

/// Lowercased extension without the dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default()
}

/// Whether `path` has one of the [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(path: &Path) -> bool {
    DocumentFormat::from_path(path).is_ok()
}

/// Read a document as a single string.
///
/// PDF pages are joined with a newline; CSV files are flattened with [`flatten_csv`].
///
/// # Errors
/// - [`ContextError::UnsupportedFormat`] for unknown extensions
/// - [`ContextError::NotFound`] when the file does not exist
pub fn read_document(path: &Path) -> Result<String> {
    match DocumentFormat::from_path(path)? {
        DocumentFormat::Text => read_to_string(path),
        DocumentFormat::Pdf => Ok(read_pdf_pages(path)?.join("\n")),
        DocumentFormat::Csv => flatten_csv(&read_to_string(path)?),
    }
}

/// Extract the text of every page of a PDF, in page order.
pub fn read_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).map_err(|e| not_found_or_io(path, e))?;
    pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| ContextError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Flatten CSV content into one line per record with cells separated by ` | `.
///
/// Quoted cells may contain commas, doubled quotes and newlines; line breaks
/// inside a cell become single spaces. Records may have differing lengths.
/// Blank records are dropped.
pub fn flatten_csv(content: &str) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let cells: Vec<String> = record.iter().map(flatten_cell).collect();
        lines.push(cells.join(" | "));
    }
    Ok(lines.join("\n"))
}

fn flatten_cell(cell: &str) -> String {
    cell.trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| not_found_or_io(path, e))
}

fn not_found_or_io(path: &Path, error: io::Error) -> ContextError {
    if error.kind() == io::ErrorKind::NotFound {
        ContextError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("notes.TXT")).unwrap(),
            DocumentFormat::Text
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/b/book.pdf")).unwrap(),
            DocumentFormat::Pdf
        );
        assert!(is_supported(Path::new("grades.csv")));
        assert!(!is_supported(Path::new("slides.pptx")));
        assert!(!is_supported(Path::new("README")));
    }

    #[test]
    fn test_unsupported_format_error() {
        let err = read_document(Path::new("deck.docx")).unwrap_err();
        assert!(matches!(err, ContextError::UnsupportedFormat { ref extension } if extension == "docx"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = read_document(&dir.path().join("missing.txt")).unwrap_err();
        assert!(matches!(err, ContextError::NotFound { .. }));
    }

    #[test]
    fn test_reads_plain_text_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sky.txt");
        fs::write(&path, "The sky is blue.\n").unwrap();
        assert_eq!(read_document(&path).unwrap(), "The sky is blue.\n");
    }

    #[test]
    fn test_flatten_csv() {
        let csv = "name,course,grade\r\nAnna,\"Computer Architecture, II\",A\n\nNikos,\"Says \"\"hi\"\"\",B\n";
        assert_eq!(
            flatten_csv(csv).unwrap(),
            "name | course | grade\nAnna | Computer Architecture, II | A\nNikos | Says \"hi\" | B"
        );
    }

    #[test]
    fn test_flatten_csv_without_trailing_newline() {
        assert_eq!(flatten_csv("a,b\n1,2").unwrap(), "a | b\n1 | 2");
        assert_eq!(flatten_csv("").unwrap(), "");
    }

    #[test]
    fn test_flatten_csv_quoted_comma_and_newline() {
        let csv = "topic,notes\nCaches,\"Write-back, write-allocate\nis the default\"\nPipelines,short\n";
        assert_eq!(
            flatten_csv(csv).unwrap(),
            "topic | notes\nCaches | Write-back, write-allocate is the default\nPipelines | short"
        );
    }

    #[test]
    fn test_flatten_csv_ragged_rows() {
        assert_eq!(flatten_csv("a,b,c\n1\n2,3").unwrap(), "a | b | c\n1\n2 | 3");
    }

    #[test]
    fn test_read_csv_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grades.csv");
        fs::write(&path, "name,grade\n\"Doe, Jane\",A\n").unwrap();
        assert_eq!(read_document(&path).unwrap(), "name | grade\nDoe, Jane | A");
    }
}
