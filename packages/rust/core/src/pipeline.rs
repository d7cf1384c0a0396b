//! Pipeline Orchestrator: filter → extract → convert on a single background lane.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

use tenderflow_documents::FormatConverter;
use tenderflow_oracle::{ClassificationOracle, RelevanceScorer};
use tenderflow_shared::{AppConfig, OutputFolders, Result, RunId, Stage, TenderflowError};
use tenderflow_storage::{DecisionCache, MetadataStore};

use crate::convert::ConvertStage;
use crate::events::{EventSink, Reporter};
use crate::extract::ExtractStage;
use crate::filter::{FilterStage, discover_tenders};
use crate::rate_limit::RateLimiter;

/// Observable lifecycle of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running(Stage),
    Completed,
    Stopped,
    Failed,
}

/// Counts from a run that went through all three stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub filtered: usize,
    pub extracted: usize,
    pub converted: usize,
    pub elapsed: Duration,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Cancelled; `after` is the stage that observed the stop request.
    Stopped { after: Stage },
    /// Filtering accepted no tender, so nothing else ran.
    NoRelevantTenders,
    /// Extraction produced no form files, so conversion was skipped.
    NoFormsExtracted,
}

/// The external oracles and converter a pipeline drives.
pub struct Collaborators {
    pub oracle: Arc<dyn ClassificationOracle>,
    pub scorer: Arc<dyn RelevanceScorer>,
    pub converter: Arc<dyn FormatConverter>,
    pub sink: Arc<dyn EventSink>,
}

/// Owns the stage sequence, the cancellation flag and the single-run guard.
///
/// Stage work is synchronous and runs on tokio's blocking pool, so callers on
/// the async side are never blocked by PDF or oracle work.
pub struct Pipeline {
    inner: Arc<Inner>,
    lane: Arc<Semaphore>,
}

struct Inner {
    input_folders: Vec<PathBuf>,
    folders: OutputFolders,
    max_pages: u32,
    min_call_interval: f64,
    oracle: Arc<dyn ClassificationOracle>,
    scorer: Arc<dyn RelevanceScorer>,
    converter: Arc<dyn FormatConverter>,
    reporter: Reporter,
    cache: Mutex<DecisionCache>,
    metadata: MetadataStore,
    cancel: Arc<AtomicBool>,
    state: Mutex<PipelineState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking lane must not wedge later runs.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Pipeline {
    /// Wire a pipeline from configuration; loads the decision cache.
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            oracle,
            scorer,
            converter,
            sink,
        } = collaborators;
        let folders = config.processing.output_folders.clone();

        let inner = Inner {
            input_folders: config.processing.input_folders.clone(),
            max_pages: config.filter.max_pages_to_scan,
            min_call_interval: config.filter.min_call_interval_secs,
            oracle,
            scorer,
            converter,
            reporter: Reporter::new(sink),
            cache: Mutex::new(DecisionCache::open(&config.filter.cache_file)),
            metadata: MetadataStore::new(&folders.metadata),
            cancel: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(PipelineState::Idle),
            folders,
        };
        Self {
            inner: Arc::new(inner),
            lane: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.inner.state)
    }

    #[cfg(test)]
    fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.inner.cancel)
    }

    pub fn is_running(&self) -> bool {
        self.lane.available_permits() == 0
    }

    /// Ask the active run to stop at the next unit-of-work boundary.
    ///
    /// An oracle call already in flight is not interrupted. Without an active
    /// run this does nothing.
    pub fn stop(&self) {
        if !self.is_running() {
            debug!("stop requested with no active run");
            return;
        }
        self.inner.cancel.store(true, Ordering::SeqCst);
        self.inner.reporter.warning("Stop requested");
    }

    /// Run all stages to completion (or cancellation) on the background lane.
    ///
    /// Fails fast with [`TenderflowError::AlreadyRunning`] if another run is
    /// active on this instance. A `completion` event is emitted whenever a
    /// started run ends, whatever the outcome.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run(&self) -> Result<RunOutcome> {
        let permit = Arc::clone(&self.lane)
            .try_acquire_owned()
            .map_err(|_| TenderflowError::AlreadyRunning)?;

        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(&run_id));
        self.inner.cancel.store(false, Ordering::SeqCst);
        self.inner
            .reporter
            .info("TENDER PROCESSING PIPELINE STARTED");

        let started = Instant::now();
        let inner = Arc::clone(&self.inner);
        let span = tracing::Span::current();
        let joined = tokio::task::spawn_blocking(move || {
            // Held for the lane's lifetime, even if the caller stops awaiting.
            let _permit = permit;
            let _entered = span.enter();
            inner.run_stages(started)
        })
        .await;

        let result = joined.unwrap_or_else(|e| Err(TenderflowError::Lane(e.to_string())));
        let reporter = &self.inner.reporter;
        let final_state = match &result {
            Ok(RunOutcome::Stopped { .. }) => PipelineState::Stopped,
            Ok(_) => {
                reporter.success(format!(
                    "PIPELINE COMPLETED IN {:.2}s",
                    started.elapsed().as_secs_f64()
                ));
                PipelineState::Completed
            }
            Err(e) => {
                reporter.error(format!("Pipeline failed: {e}"));
                PipelineState::Failed
            }
        };
        self.inner.set_state(final_state);
        reporter.completion();
        info!(%run_id, state = ?final_state, "run finished");
        result
    }
}

impl Inner {
    fn set_state(&self, state: PipelineState) {
        *lock(&self.state) = state;
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn enter(&self, stage: Stage, banner: &str) {
        self.set_state(PipelineState::Running(stage));
        self.reporter.info(banner);
    }

    fn stopped_after(&self, stage: Stage) -> RunOutcome {
        let label = match stage {
            Stage::Filtering => "filtering",
            Stage::Extracting => "extraction",
            Stage::Converting => "conversion",
        };
        self.reporter
            .warning(format!("Pipeline stopped by user after {label}"));
        RunOutcome::Stopped { after: stage }
    }

    /// The synchronous stage sequence executed on the lane.
    fn run_stages(&self, started: Instant) -> Result<RunOutcome> {
        self.folders.ensure_exist()?;

        self.enter(Stage::Filtering, "STAGE 1: FILTERING TENDERS");
        let filtered = {
            let tenders = discover_tenders(&self.input_folders);
            let mut cache = lock(&self.cache);
            let mut limiter = RateLimiter::from_secs_f64(self.min_call_interval);
            FilterStage {
                filtered_root: &self.folders.filtered,
                max_pages: self.max_pages,
                cache: &mut *cache,
                scorer: self.scorer.as_ref(),
                oracle: self.oracle.as_ref(),
                limiter: &mut limiter,
                reporter: &self.reporter,
                cancel: &self.cancel,
            }
            .run(&tenders)
        };
        if self.cancelled() {
            return Ok(self.stopped_after(Stage::Filtering));
        }
        if filtered == 0 {
            self.reporter
                .warning("No relevant tenders found. Pipeline terminated.");
            return Ok(RunOutcome::NoRelevantTenders);
        }

        self.enter(
            Stage::Extracting,
            "STAGE 2: EXTRACTING FORMS FROM FILTERED TENDERS",
        );
        let extracted = ExtractStage {
            filtered_root: &self.folders.filtered,
            extracted_root: &self.folders.extracted,
            metadata: &self.metadata,
            oracle: self.oracle.as_ref(),
            reporter: &self.reporter,
            cancel: &self.cancel,
        }
        .run();
        if self.cancelled() {
            return Ok(self.stopped_after(Stage::Extracting));
        }
        if extracted == 0 {
            self.reporter
                .warning("No forms extracted. Skipping DOCX conversion.");
            return Ok(RunOutcome::NoFormsExtracted);
        }

        self.enter(Stage::Converting, "STAGE 3: CONVERTING TO DOCX");
        let converted = ConvertStage {
            extracted_root: &self.folders.extracted,
            output_root: &self.folders.docx,
            converter: self.converter.as_ref(),
            reporter: &self.reporter,
            cancel: &self.cancel,
        }
        .run();
        if self.cancelled() {
            return Ok(self.stopped_after(Stage::Converting));
        }

        let summary = RunSummary {
            filtered,
            extracted,
            converted,
            elapsed: started.elapsed(),
        };
        self.reporter.success("PIPELINE SUMMARY");
        self.reporter
            .success(format!("Filtered Tenders: {}", summary.filtered));
        self.reporter
            .success(format!("Extracted Forms: {}", summary.extracted));
        self.reporter
            .success(format!("Converted DOCX: {}", summary.converted));
        self.reporter.success(format!(
            "Total Time: {:.2}s",
            summary.elapsed.as_secs_f64()
        ));
        Ok(RunOutcome::Completed(summary))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::testing::{CollectingSink, FlakyConverter, MockOracle, ScriptedScorer, write_pdf};

    struct Harness {
        dir: tempfile::TempDir,
        config: AppConfig,
        oracle: Arc<MockOracle>,
        scorer: Arc<ScriptedScorer>,
        sink: Arc<CollectingSink>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path();
            let mut config = AppConfig::default();
            config.processing.input_folders = vec![root.join("downloads")];
            config.processing.output_folders = OutputFolders {
                filtered: root.join("filtered"),
                extracted: root.join("extracted"),
                docx: root.join("docx"),
                metadata: root.join("metadata"),
            };
            config.filter.cache_file = root.join("filter_cache.json");
            config.filter.min_call_interval_secs = 0.0;
            Self {
                dir,
                config,
                oracle: Arc::new(MockOracle::default()),
                scorer: Arc::new(ScriptedScorer::default()),
                sink: Arc::new(CollectingSink::default()),
            }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn doc(&self, tender: &str, name: &str, text: &str) {
            write_pdf(
                &self.root().join("downloads").join(tender).join(name),
                &[text, "second page"],
            );
        }

        fn pipeline(&self) -> Pipeline {
            Pipeline::new(
                &self.config,
                Collaborators {
                    oracle: self.oracle.clone(),
                    scorer: self.scorer.clone(),
                    converter: Arc::new(FlakyConverter::default()),
                    sink: self.sink.clone(),
                },
            )
        }
    }

    #[tokio::test]
    async fn full_run_reports_summary() {
        let h = Harness::new();
        h.doc("T1", "rfp.pdf", "verdict=yes score=0.60");
        h.doc("T2", "roads.pdf", "verdict=no score=0.10");

        let pipeline = h.pipeline();
        let outcome = pipeline.run().await.unwrap();

        match outcome {
            RunOutcome::Completed(summary) => {
                assert_eq!(
                    (summary.filtered, summary.extracted, summary.converted),
                    (1, 1, 1)
                );
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(pipeline.state(), PipelineState::Completed);
        assert!(h
            .root()
            .join("docx/T1/FORM1_Complete_Bid_Document_-_rfp.docx")
            .exists());
        assert_eq!(h.sink.completions(), 1);

        let logs = h.sink.log_messages();
        assert!(logs.contains(&"Filtered Tenders: 1".to_string()));
        assert!(logs.contains(&"Converted DOCX: 1".to_string()));
    }

    #[tokio::test]
    async fn no_relevant_tenders_skips_later_stages() {
        let h = Harness::new();
        h.doc("T1", "roads.pdf", "verdict=no score=0.90");

        let pipeline = h.pipeline();
        assert_eq!(pipeline.run().await.unwrap(), RunOutcome::NoRelevantTenders);
        assert!(h.oracle.uploads().is_empty());
        assert!(h
            .sink
            .log_messages()
            .contains(&"No relevant tenders found. Pipeline terminated.".to_string()));
        assert_eq!(pipeline.state(), PipelineState::Completed);
        assert_eq!(h.sink.completions(), 1);
    }

    #[tokio::test]
    async fn no_forms_skips_conversion() {
        let h = Harness::new();
        h.doc("T1", "rfp.pdf", "verdict=yes score=0.90");
        h.oracle.fail_upload("rfp.pdf");

        let pipeline = h.pipeline();
        assert_eq!(pipeline.run().await.unwrap(), RunOutcome::NoFormsExtracted);
        assert!(!h.root().join("docx/T1").exists());
        assert!(h
            .sink
            .log_messages()
            .contains(&"No forms extracted. Skipping DOCX conversion.".to_string()));
    }

    #[tokio::test]
    async fn stop_during_filtering() {
        let h = Harness::new();
        for t in 1..=5 {
            h.doc(&format!("T{t}"), &format!("d{t}.pdf"), "verdict=yes score=0.80");
        }
        let pipeline = h.pipeline();
        h.oracle.cancel_after(2, pipeline.cancel_flag());

        let outcome = pipeline.run().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Stopped {
                after: Stage::Filtering
            }
        );
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(h.oracle.uploads().is_empty());
        assert_eq!(h.sink.completions(), 1);
    }

    #[tokio::test]
    async fn second_concurrent_run_is_rejected() {
        let h = Harness::new();
        h.doc("T1", "slow.pdf", "verdict=no scorer=slow");
        let pipeline = Arc::new(h.pipeline());

        let first = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.run().await })
        };
        while !pipeline.is_running() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let second = pipeline.run().await;
        assert!(matches!(second, Err(TenderflowError::AlreadyRunning)));

        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::NoRelevantTenders);
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn lane_panic_fails_the_run_and_releases_the_guard() {
        let h = Harness::new();
        h.doc("T1", "boom.pdf", "verdict=yes scorer=panic");
        let pipeline = h.pipeline();

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, TenderflowError::Lane(_)));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(h.sink.completions(), 1);

        // The guard is free again and the poisoned cache is still usable.
        std::fs::remove_dir_all(h.root().join("downloads/T1")).unwrap();
        assert_eq!(pipeline.run().await.unwrap(), RunOutcome::NoRelevantTenders);
    }

    #[tokio::test]
    async fn rerun_uses_cached_decisions() {
        let h = Harness::new();
        h.doc("T1", "rfp.pdf", "verdict=yes score=0.60");

        let pipeline = h.pipeline();
        pipeline.run().await.unwrap();
        let judged = h.oracle.judgments();

        let outcome = pipeline.run().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(h.oracle.judgments(), judged);
        assert_eq!(h.sink.completions(), 2);
    }

    #[tokio::test]
    async fn stop_without_active_run_is_a_no_op() {
        let h = Harness::new();
        h.doc("T1", "rfp.pdf", "verdict=yes score=0.60");
        let pipeline = h.pipeline();

        pipeline.stop();
        assert!(h.sink.events().is_empty());
        assert!(!pipeline.cancel_flag().load(Ordering::SeqCst));

        assert!(matches!(pipeline.run().await.unwrap(), RunOutcome::Completed(_)));
        assert!(!h.sink.log_messages().contains(&"Stop requested".to_string()));
    }

    #[tokio::test]
    async fn stop_during_a_run_is_reported() {
        let h = Harness::new();
        h.doc("T1", "slow.pdf", "verdict=yes score=0.60 scorer=slow");
        h.doc("T2", "later.pdf", "verdict=yes score=0.60");
        let pipeline = Arc::new(h.pipeline());

        let run = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.run().await })
        };
        while !pipeline.is_running() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        pipeline.stop();

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Stopped {
                after: Stage::Filtering
            }
        );
        assert!(h.sink.log_messages().contains(&"Stop requested".to_string()));
    }

    #[test]
    fn new_pipeline_is_idle() {
        let h = Harness::new();
        let pipeline = h.pipeline();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(!pipeline.is_running());
    }
}
