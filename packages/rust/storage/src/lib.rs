//! File-backed persistence for Tenderflow.
//!
//! - [`DecisionCache`]: relevance decisions keyed by document filename,
//!   flushed to a JSON file on every write.
//! - [`MetadataStore`]: one `<base>_metadata.json` per extracted document.
//! - [`list_results`] / [`archive_tender`]: read-side views over the output roots.
//! - [`files_with_extension`]: recursive, sorted file listing shared with the stages.
//!
//! The pipeline is the only writer; no file locking is attempted.

mod cache;
mod files;
mod metadata;
mod results;

pub use cache::DecisionCache;
pub use files::files_with_extension;
pub use metadata::MetadataStore;
pub use results::{ResultEntry, archive_tender, list_results};
