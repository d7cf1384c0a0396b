//! PDF handling for Tenderflow: text sampling, page splitting and
//! conversion to editable documents.

pub mod docx;
mod layout;
pub mod pdf;
pub mod split;

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;

pub use docx::{DocxConverter, FormatConverter};
pub use pdf::{Unreadable, page_count, sample_text};
pub use split::{PageRange, split_pages};
