//! In-memory collaborators for stage and pipeline tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tenderflow_documents::{DocxConverter, FormatConverter};
use tenderflow_oracle::{ClassificationOracle, RelevanceJudgment, RelevanceScorer, RemoteDocument};
use tenderflow_shared::{DeadlineInfo, FormDetection, PipelineEvent, Result, TenderflowError};

use crate::events::EventSink;

/// Write a PDF with one page per entry, creating parent directories.
pub fn write_pdf(path: &Path, pages: &[&str]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, tenderflow_documents::fixtures::build_pdf(pages)).unwrap();
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn log_messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Log { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn pdf_reasons(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::PdfStatus {
                    pdf_name, reason, ..
                } => Some((pdf_name, reason)),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Completion { .. }))
            .count()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Reads the score from a `score=<f32>` token in the text (0 when absent).
///
/// Markers: `scorer=down` fails, `scorer=slow` sleeps 300ms, `scorer=panic` panics.
#[derive(Default)]
pub struct ScriptedScorer {
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RelevanceScorer for ScriptedScorer {
    fn score(&self, text: &str) -> Result<f32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("scorer=panic") {
            panic!("scorer crashed");
        }
        if text.contains("scorer=slow") {
            std::thread::sleep(std::time::Duration::from_millis(300));
        }
        if text.contains("scorer=down") {
            return Err(TenderflowError::Network("embedding server unreachable".into()));
        }
        Ok(text
            .split_whitespace()
            .find_map(|token| token.strip_prefix("score="))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0))
    }
}

// ---------------------------------------------------------------------------
// Classification oracle
// ---------------------------------------------------------------------------

/// Judges text relevant when it contains `verdict=yes`; everything else is scripted.
#[derive(Default)]
pub struct MockOracle {
    judgments: AtomicUsize,
    reasoning: Mutex<Option<String>>,
    cancel_after_judgments: Mutex<Option<(usize, Arc<AtomicBool>)>>,
    cancel_after_uploads: Mutex<Option<(usize, Arc<AtomicBool>)>>,
    forms: Mutex<HashMap<String, Vec<FormDetection>>>,
    deadline: Mutex<Option<DeadlineInfo>>,
    failing_uploads: Mutex<HashSet<String>>,
    uploads: Mutex<Vec<String>>,
    released: Mutex<Vec<String>>,
}

impl MockOracle {
    pub fn judgments(&self) -> usize {
        self.judgments.load(Ordering::SeqCst)
    }

    pub fn set_reasoning(&self, reasoning: impl Into<String>) {
        *self.reasoning.lock().unwrap() = Some(reasoning.into());
    }

    /// Raise `flag` once `n` relevance judgments have been made.
    pub fn cancel_after(&self, n: usize, flag: Arc<AtomicBool>) {
        *self.cancel_after_judgments.lock().unwrap() = Some((n, flag));
    }

    /// Raise `flag` once `n` uploads have completed.
    pub fn cancel_after_uploads(&self, n: usize, flag: Arc<AtomicBool>) {
        *self.cancel_after_uploads.lock().unwrap() = Some((n, flag));
    }

    pub fn set_forms(&self, display_name: &str, forms: Vec<FormDetection>) {
        self.forms
            .lock()
            .unwrap()
            .insert(display_name.to_string(), forms);
    }

    pub fn set_deadline(&self, deadline: DeadlineInfo) {
        *self.deadline.lock().unwrap() = Some(deadline);
    }

    pub fn fail_upload(&self, display_name: &str) {
        self.failing_uploads
            .lock()
            .unwrap()
            .insert(display_name.to_string());
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }

    fn trip(slot: &Mutex<Option<(usize, Arc<AtomicBool>)>>, count: usize) {
        if let Some((n, flag)) = slot.lock().unwrap().as_ref() {
            if count >= *n {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }
}

impl ClassificationOracle for MockOracle {
    fn judge_relevance(&self, text: &str) -> RelevanceJudgment {
        let count = self.judgments.fetch_add(1, Ordering::SeqCst) + 1;
        Self::trip(&self.cancel_after_judgments, count);
        let is_relevant = text.contains("verdict=yes");
        let reasoning = self.reasoning.lock().unwrap().clone().unwrap_or_else(|| {
            if is_relevant {
                "matches payments capability".to_string()
            } else {
                "civil works, out of scope".to_string()
            }
        });
        RelevanceJudgment {
            is_relevant,
            reasoning,
        }
    }

    fn upload(&self, _path: &Path, display_name: &str) -> Result<RemoteDocument> {
        if self.failing_uploads.lock().unwrap().contains(display_name) {
            return Err(TenderflowError::Oracle("processing failed".into()));
        }
        let count = {
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(display_name.to_string());
            uploads.len()
        };
        Self::trip(&self.cancel_after_uploads, count);
        Ok(RemoteDocument {
            name: display_name.to_string(),
            uri: format!("mock://{display_name}"),
            mime_type: "application/pdf".into(),
        })
    }

    fn detect_forms(&self, document: &RemoteDocument) -> Vec<FormDetection> {
        self.forms
            .lock()
            .unwrap()
            .get(&document.name)
            .cloned()
            .unwrap_or_default()
    }

    fn extract_deadline(&self, _document: &RemoteDocument) -> DeadlineInfo {
        self.deadline
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(DeadlineInfo::not_found)
    }

    fn release(&self, document: &RemoteDocument) {
        self.released.lock().unwrap().push(document.name.clone());
    }
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Real DOCX conversion, except for sources whose file name contains a marker.
#[derive(Default)]
pub struct FlakyConverter {
    fail_marker: Option<String>,
    attempted: Mutex<Vec<PathBuf>>,
}

impl FlakyConverter {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            attempted: Mutex::new(Vec::new()),
        }
    }

    pub fn attempted(&self) -> Vec<PathBuf> {
        self.attempted.lock().unwrap().clone()
    }
}

impl FormatConverter for FlakyConverter {
    fn extension(&self) -> &str {
        "docx"
    }

    fn convert(&self, source: &Path, dest: &Path) -> Result<()> {
        self.attempted.lock().unwrap().push(source.to_path_buf());
        let name = source.file_name().unwrap().to_string_lossy();
        if self.fail_marker.as_deref().is_some_and(|m| name.contains(m)) {
            return Err(TenderflowError::Conversion(format!("cannot convert {name}")));
        }
        DocxConverter::new().convert(source, dest)
    }
}
