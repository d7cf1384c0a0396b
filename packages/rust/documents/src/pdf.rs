//! PDF inspection: page counting and leading-page text sampling.

use std::path::Path;

use lopdf::Document;
use tracing::{debug, instrument};

use tenderflow_shared::{Result, TenderflowError};

/// Load a PDF from disk.
pub(crate) fn load(path: &Path) -> Result<Document> {
    Document::load(path)
        .map_err(|e| TenderflowError::pdf(format!("failed to load {}: {e}", path.display())))
}

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &Path) -> Result<u32> {
    let doc = load(path)?;
    Ok(doc.get_pages().len() as u32)
}

/// Why a document's text could not be sampled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unreadable {
    /// The file could not be parsed as a PDF.
    Error(String),
    /// The PDF parsed but carried no extractable text.
    Empty,
}

impl std::fmt::Display for Unreadable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(e) => write!(f, "error reading PDF: {e}"),
            Self::Empty => f.write_str("empty text"),
        }
    }
}

/// Extract text from at most `max_pages` leading pages, page texts joined by newlines.
///
/// Returns the trimmed text, or [`Unreadable`] when the file cannot be parsed
/// or carries no text in the sampled pages.
#[instrument(skip_all, fields(path = %path.display(), max_pages = max_pages))]
pub fn sample_text(path: &Path, max_pages: u32) -> std::result::Result<String, Unreadable> {
    let doc = Document::load(path).map_err(|e| Unreadable::Error(e.to_string()))?;
    let total = doc.get_pages().len() as u32;

    let mut text = String::new();
    for page in 1..=total.min(max_pages) {
        // A single undecodable page should not hide the text of the others.
        match doc.extract_text(&[page]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => debug!(page, error = %e, "page text extraction failed"),
        }
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Unreadable::Empty);
    }
    Ok(trimmed.to_string())
}
