//! Conversion stage: turn every extracted form into an editable document.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::instrument;

use tenderflow_documents::FormatConverter;
use tenderflow_shared::Stage;
use tenderflow_storage::files_with_extension;

use crate::events::Reporter;
use crate::filter::file_name;

/// Collaborators and settings for one pass of the conversion stage.
pub struct ConvertStage<'a> {
    pub extracted_root: &'a Path,
    pub output_root: &'a Path,
    pub converter: &'a dyn FormatConverter,
    pub reporter: &'a Reporter,
    pub cancel: &'a AtomicBool,
}

impl ConvertStage<'_> {
    /// Convert every PDF under the extracted root; returns the number of successes.
    ///
    /// A failed conversion is logged and does not stop the stage.
    #[instrument(skip_all, fields(extracted_root = %self.extracted_root.display()))]
    pub fn run(&self) -> usize {
        let sources = files_with_extension(self.extracted_root, "pdf");
        if sources.is_empty() {
            self.reporter.warning("No extracted PDFs found to convert");
            return 0;
        }

        let total = sources.len();
        let ext = self.converter.extension();
        self.reporter.info(format!(
            "Converting {total} PDF(s) to {}",
            ext.to_uppercase()
        ));

        let mut converted = 0;
        for (i, source) in sources.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }
            let current = i + 1;
            let pdf_name = file_name(source);
            let rel = source.strip_prefix(self.extracted_root).unwrap_or(source);
            let dest = self.output_root.join(rel).with_extension(ext);

            self.reporter.progress(
                Stage::Converting,
                current,
                total,
                format!("Converting: {pdf_name}"),
            );
            match self.converter.convert(source, &dest) {
                Ok(()) => {
                    converted += 1;
                    self.reporter
                        .success(format!("Converted ({current}/{total}): {pdf_name}"));
                }
                Err(e) => self
                    .reporter
                    .error(format!("Conversion failed for {pdf_name}: {e}")),
            }
        }

        self.reporter.success(format!(
            "Conversion complete: {converted} {} files created",
            ext.to_uppercase()
        ));
        converted
    }
}
