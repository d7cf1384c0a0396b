//! Filter stage: decide which tenders are relevant and copy their passing documents forward.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use tracing::{debug, instrument, warn};

use tenderflow_documents::sample_text;
use tenderflow_oracle::{ClassificationOracle, RelevanceScorer};
use tenderflow_shared::{DecisionRecord, PdfStatus, Stage};
use tenderflow_storage::DecisionCache;

use crate::events::Reporter;
use crate::rate_limit::RateLimiter;

/// Minimum semantic score for acceptance (inclusive), in conjunction with the oracle's verdict.
pub const ACCEPT_THRESHOLD: f32 = 0.3;

const SKIP_REASON_CHARS: usize = 120;

/// A folder of source documents deposited by the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tender {
    pub name: String,
    pub documents: Vec<PathBuf>,
}

/// Tender folders under every input root that hold at least one PDF.
///
/// Missing roots are skipped. Tenders and their documents are sorted by name.
pub fn discover_tenders(input_folders: &[PathBuf]) -> Vec<Tender> {
    let mut tenders = Vec::new();
    for root in input_folders {
        let dirs = match subdirectories(root) {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "input folder unavailable, skipping");
                continue;
            }
        };
        for dir in dirs {
            let documents = list_pdfs(&dir);
            if documents.is_empty() {
                continue;
            }
            tenders.push(Tender {
                name: file_name(&dir),
                documents,
            });
        }
    }
    tenders
}

/// Immediate subdirectories of `root`, sorted.
pub(crate) fn subdirectories(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Files directly inside `dir` with a `.pdf` extension (any case), sorted.
pub(crate) fn list_pdfs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_pdf(p))
        .collect();
    pdfs.sort();
    pdfs
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Collaborators and settings for one pass of the filter stage.
pub struct FilterStage<'a> {
    pub filtered_root: &'a Path,
    pub max_pages: u32,
    pub cache: &'a mut DecisionCache,
    pub scorer: &'a dyn RelevanceScorer,
    pub oracle: &'a dyn ClassificationOracle,
    pub limiter: &'a mut RateLimiter,
    pub reporter: &'a Reporter,
    pub cancel: &'a AtomicBool,
}

impl FilterStage<'_> {
    /// Filter every tender; returns how many tenders kept at least one document.
    ///
    /// Stops early when cancelled. A tender interrupted mid-way is finalized
    /// from the documents decided so far.
    #[instrument(skip_all, fields(tenders = tenders.len()))]
    pub fn run(&mut self, tenders: &[Tender]) -> usize {
        self.reporter
            .info(format!("Found {} tenders to analyze", tenders.len()));

        let mut accepted = 0;
        for tender in tenders {
            if self.cancelled() {
                break;
            }
            if self.filter_tender(tender) {
                accepted += 1;
            }
        }

        self.reporter.success(format!(
            "Filtering complete: {accepted}/{} tenders passed",
            tenders.len()
        ));
        accepted
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Returns whether the tender survives.
    fn filter_tender(&mut self, tender: &Tender) -> bool {
        self.reporter.info(format!("Analyzing Tender: {}", tender.name));

        let out_dir = self.filtered_root.join(&tender.name);
        if let Err(e) = std::fs::create_dir_all(&out_dir) {
            self.reporter.error(format!(
                "Cannot create {}: {e}",
                out_dir.display()
            ));
            return false;
        }

        let total = tender.documents.len();
        let mut has_relevant = false;
        for (i, pdf) in tender.documents.iter().enumerate() {
            if self.cancelled() {
                break;
            }
            let pdf_name = file_name(pdf);
            let current = i + 1;
            self.reporter.progress(
                Stage::Filtering,
                current,
                total,
                format!("{}: {pdf_name}", tender.name),
            );
            self.reporter
                .info(format!("[{current}/{total}] Analyzing: {pdf_name}"));

            if self.filter_document(pdf, &pdf_name, &out_dir) {
                has_relevant = true;
            }
        }

        if has_relevant {
            self.reporter
                .info(format!("Tender Accepted: {}", tender.name));
        } else {
            if let Err(e) = std::fs::remove_dir_all(&out_dir) {
                debug!(dir = %out_dir.display(), error = %e, "failed to remove rejected tender output");
            }
            self.reporter
                .info(format!("Tender Rejected: {}", tender.name));
        }
        has_relevant
    }

    /// Decide one document; returns whether it was copied forward.
    fn filter_document(&mut self, pdf: &Path, pdf_name: &str, out_dir: &Path) -> bool {
        if let Some(cached) = self.cache.get(pdf_name) {
            if cached.passes_filter {
                return match self.copy_forward(pdf, pdf_name, out_dir) {
                    Ok(()) => {
                        self.reporter
                            .pdf_status(pdf_name, PdfStatus::Filtered, "CACHED PASS", None);
                        true
                    }
                    Err(reason) => {
                        self.reporter
                            .pdf_status(pdf_name, PdfStatus::Skipped, reason, None);
                        false
                    }
                };
            }
            self.reporter
                .pdf_status(pdf_name, PdfStatus::Skipped, "CACHED SKIP", None);
            return false;
        }

        let text = match sample_text(pdf, self.max_pages) {
            Ok(text) => text,
            Err(unreadable) => {
                let reason = unreadable.to_string();
                self.persist(pdf_name, DecisionRecord::unreadable(reason.clone()));
                self.reporter
                    .pdf_status(pdf_name, PdfStatus::Skipped, reason, None);
                return false;
            }
        };

        let score = match self.scorer.score(&text) {
            Ok(score) => score,
            Err(e) => {
                self.reporter
                    .error(format!("Semantic scoring failed for {pdf_name}: {e}"));
                return false;
            }
        };

        self.limiter.wait();
        let judgment = self.oracle.judge_relevance(&text);
        debug!(pdf_name, score, relevant = judgment.is_relevant, "document judged");

        if judgment.is_relevant && score >= ACCEPT_THRESHOLD {
            self.persist(
                pdf_name,
                DecisionRecord::judged(true, score, judgment.reasoning.clone()),
            );
            match self.copy_forward(pdf, pdf_name, out_dir) {
                Ok(()) => {
                    self.reporter.pdf_status(
                        pdf_name,
                        PdfStatus::Filtered,
                        format!("Relevant (score: {score:.2})"),
                        Some(json!({ "reasoning": judgment.reasoning })),
                    );
                    true
                }
                Err(reason) => {
                    self.reporter
                        .pdf_status(pdf_name, PdfStatus::Skipped, reason, None);
                    false
                }
            }
        } else {
            let reasoning = if judgment.reasoning.is_empty() {
                "Not relevant to company capabilities".to_string()
            } else {
                judgment.reasoning.clone()
            };
            self.persist(pdf_name, DecisionRecord::judged(false, score, reasoning));

            let reason = if judgment.reasoning.is_empty() {
                "Not relevant".to_string()
            } else {
                judgment.reasoning.chars().take(SKIP_REASON_CHARS).collect()
            };
            self.reporter
                .pdf_status(pdf_name, PdfStatus::Skipped, reason, None);
            false
        }
    }

    fn persist(&mut self, pdf_name: &str, record: DecisionRecord) {
        if let Err(e) = self.cache.put(pdf_name, record) {
            self.reporter
                .error(format!("Failed to save decision for {pdf_name}: {e}"));
        }
    }

    /// Copy into the filtered tree; the error is the skip reason.
    fn copy_forward(&self, pdf: &Path, pdf_name: &str, out_dir: &Path) -> Result<(), String> {
        std::fs::copy(pdf, out_dir.join(pdf_name))
            .map(|_| ())
            .map_err(|e| {
                let reason = format!("Failed to copy {pdf_name}: {e}");
                self.reporter.error(reason.clone());
                reason
            })
    }
}
