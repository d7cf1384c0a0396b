//! Extraction stage: detect forms in filtered documents and split them into separate PDFs.

use std::path::Path;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;
use tracing::instrument;

use tenderflow_documents::{page_count, split_pages};
use tenderflow_oracle::{ClassificationOracle, RemoteDocument};
use tenderflow_shared::{FormDetection, MetadataRecord, Stage};
use tenderflow_storage::MetadataStore;

use crate::events::Reporter;
use crate::filter::{file_name, list_pdfs, subdirectories};

const MAX_TITLE_CHARS: usize = 50;

/// Filesystem-safe fragment of a form title: punctuation dropped, whitespace to `_`, at most 50 chars.
pub fn sanitize_title(title: &str) -> String {
    static UNSAFE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));

    UNSAFE_RE
        .replace_all(title, "")
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// `FORM<idx>_<title>.pdf`, falling back to `Form_<idx>` when the title sanitizes to nothing.
pub fn form_file_name(index: usize, title: &str) -> String {
    let safe = sanitize_title(title);
    if safe.is_empty() {
        format!("FORM{index}_Form_{index}.pdf")
    } else {
        format!("FORM{index}_{safe}.pdf")
    }
}

/// Collaborators and settings for one pass of the extraction stage.
pub struct ExtractStage<'a> {
    pub filtered_root: &'a Path,
    pub extracted_root: &'a Path,
    pub metadata: &'a MetadataStore,
    pub oracle: &'a dyn ClassificationOracle,
    pub reporter: &'a Reporter,
    pub cancel: &'a AtomicBool,
}

impl ExtractStage<'_> {
    /// Extract forms from every filtered tender; returns the number of form files written.
    #[instrument(skip_all, fields(filtered_root = %self.filtered_root.display()))]
    pub fn run(&self) -> usize {
        let tenders = subdirectories(self.filtered_root).unwrap_or_default();
        if tenders.is_empty() {
            self.reporter.warning("No filtered tender folders found");
            return 0;
        }
        self.reporter
            .info(format!("Processing {} filtered tender(s)", tenders.len()));

        let mut extracted = 0;
        for dir in &tenders {
            if self.cancelled() {
                break;
            }
            extracted += self.extract_tender(dir);
        }

        self.reporter
            .success(format!("Extraction complete: {extracted} forms extracted"));
        extracted
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn extract_tender(&self, dir: &Path) -> usize {
        let tender = file_name(dir);
        let pdfs = list_pdfs(dir);
        if pdfs.is_empty() {
            return 0;
        }

        let out_dir = self.extracted_root.join(&tender);
        if let Err(e) = std::fs::create_dir_all(&out_dir) {
            self.reporter
                .error(format!("Cannot create {}: {e}", out_dir.display()));
            return 0;
        }
        self.reporter
            .info(format!("Extracting from tender: {tender}"));

        let total = pdfs.len();
        let mut extracted = 0;
        for (i, pdf) in pdfs.iter().enumerate() {
            if self.cancelled() {
                break;
            }
            let pdf_name = file_name(pdf);
            let current = i + 1;
            self.reporter.progress(
                Stage::Extracting,
                current,
                total,
                format!("Extracting forms from: {pdf_name}"),
            );
            self.reporter
                .info(format!("[{current}/{total}] Processing: {pdf_name}"));

            extracted += self.extract_document(pdf, &pdf_name, &out_dir);
        }
        extracted
    }

    fn extract_document(&self, pdf: &Path, pdf_name: &str, out_dir: &Path) -> usize {
        self.reporter.info(format!("Uploading {pdf_name} for analysis"));
        let document = match self.oracle.upload(pdf, pdf_name) {
            Ok(document) => document,
            Err(e) => {
                self.reporter
                    .error(format!("Failed to upload {pdf_name}: {e}"));
                return 0;
            }
        };

        let extracted = self.extract_uploaded(pdf, pdf_name, &document, out_dir);
        self.oracle.release(&document);
        extracted
    }

    fn extract_uploaded(
        &self,
        pdf: &Path,
        pdf_name: &str,
        document: &RemoteDocument,
        out_dir: &Path,
    ) -> usize {
        let base_name = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| pdf_name.to_string());
        let total_pages = match page_count(pdf) {
            Ok(n) => n,
            Err(e) => {
                self.reporter
                    .error(format!("Cannot read {pdf_name}: {e}"));
                return 0;
            }
        };

        let mut forms = self.oracle.detect_forms(document);
        if forms.is_empty() {
            self.reporter
                .warning("No forms detected, extracting entire document as single form");
            forms.push(FormDetection::whole_document(&base_name, total_pages));
        }
        self.reporter
            .info(format!("Found {} form(s) in {pdf_name}", forms.len()));

        let deadline_info = self.oracle.extract_deadline(document);
        if deadline_info.deadline_found {
            self.reporter.info(format!(
                "Deadline: {}",
                deadline_info.deadline_date.as_deref().unwrap_or("Not specified")
            ));
        }

        let record = MetadataRecord {
            pdf_name: pdf_name.to_string(),
            total_forms: forms.len(),
            forms,
            deadline_info,
        };
        if let Err(e) = self.metadata.write(&base_name, &record) {
            self.reporter
                .error(format!("Failed to write metadata for {pdf_name}: {e}"));
        }

        let total = record.forms.len();
        let mut extracted = 0;
        for (i, form) in record.forms.iter().enumerate() {
            if self.cancelled() {
                break;
            }
            let index = i + 1;
            self.reporter.info(format!(
                "Form {index}/{total}: {} (Pages {}-{})",
                form.form_title, form.start_page, form.end_page
            ));

            let dest = out_dir.join(form_file_name(index, &form.form_title));
            match split_pages(pdf, form.start_page, form.end_page, &dest) {
                Ok(_) => extracted += 1,
                Err(e) => self.reporter.error(format!(
                    "Failed to extract form {index} from {pdf_name}: {e}"
                )),
            }
        }
        extracted
    }
}
