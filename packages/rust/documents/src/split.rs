//! Page Splitter: copy an inclusive page range of a PDF into a new file.

use std::path::Path;

use tracing::{debug, instrument};

use tenderflow_shared::{Result, TenderflowError};

/// An inclusive, 1-indexed page range already clamped to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    /// Clamp oracle-reported bounds into `[1, total_pages]`.
    ///
    /// `start` below 1 becomes 1, `end` past the last page becomes the last
    /// page, and `end` is never allowed below `start`.
    pub fn clamp(start: i64, end: i64, total_pages: u32) -> Self {
        let last = i64::from(total_pages.max(1));
        let start = start.clamp(1, last);
        let end = end.clamp(start, last);
        Self {
            start: start as u32,
            end: end as u32,
        }
    }

    /// Number of pages covered.
    pub fn page_count(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn contains(&self, page: u32) -> bool {
        (self.start..=self.end).contains(&page)
    }
}

/// Write pages `start..=end` (after clamping) of `source` to `dest`.
///
/// Returns the range actually written.
#[instrument(skip_all, fields(source = %source.display(), dest = %dest.display(), start = start, end = end))]
pub fn split_pages(source: &Path, start: i64, end: i64, dest: &Path) -> Result<PageRange> {
    let mut doc = crate::pdf::load(source)?;
    let total = doc.get_pages().len() as u32;
    if total == 0 {
        return Err(TenderflowError::pdf(format!(
            "{} has no pages",
            source.display()
        )));
    }

    let range = PageRange::clamp(start, end, total);
    let discard: Vec<u32> = (1..=total).filter(|p| !range.contains(*p)).collect();
    if !discard.is_empty() {
        doc.delete_pages(&discard);
        doc.prune_objects();
    }
    doc.compress();

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TenderflowError::io(parent, e))?;
    }
    doc.save(dest)
        .map_err(|e| TenderflowError::pdf(format!("failed to write {}: {e}", dest.display())))?;

    debug!(start = range.start, end = range.end, pages = range.page_count(), "pages split");
    Ok(range)
}
