//! Terminal rendering of pipeline events.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tenderflow_shared::{LogLevel, PdfStatus, PipelineEvent, Stage};
use tokio::sync::broadcast::{Receiver, error::RecvError};

/// Consume events until the run's completion event (or the channel closes).
pub(crate) async fn render_events(mut events: Receiver<PipelineEvent>, json: bool) {
    let mut view = StageView::default();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                view.println(&format!("  ... {skipped} event(s) dropped"));
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let done = matches!(event, PipelineEvent::Completion { .. });

        if json {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
        } else {
            view.show(event);
        }
        if done {
            break;
        }
    }
    view.finish();
}

/// One progress bar, replaced whenever the stage changes.
#[derive(Default)]
struct StageView {
    stage: Option<Stage>,
    bar: Option<ProgressBar>,
}

impl StageView {
    fn show(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Log { level, message, .. } => {
                let tag = match level {
                    LogLevel::Info => "INFO ",
                    LogLevel::Warning => "WARN ",
                    LogLevel::Error => "ERROR",
                    LogLevel::Success => " OK  ",
                };
                self.println(&format!("[{tag}] {message}"));
            }
            PipelineEvent::Progress {
                stage,
                current,
                total,
                message,
                ..
            } => {
                let bar = self.bar_for(stage);
                bar.set_length(total as u64);
                bar.set_position(current as u64);
                bar.set_message(message);
            }
            PipelineEvent::PdfStatus {
                pdf_name,
                status,
                reason,
                ..
            } => {
                let mark = match status {
                    PdfStatus::Filtered => "+",
                    PdfStatus::Skipped => "-",
                };
                self.println(&format!("  {mark} {pdf_name}: {reason}"));
            }
            PipelineEvent::Completion { .. } => {}
        }
    }

    fn bar_for(&mut self, stage: Stage) -> &ProgressBar {
        if self.stage != Some(stage) {
            self.finish();
            self.stage = Some(stage);
        }
        self.bar.get_or_insert_with(|| make_progress_bar(stage))
    }

    fn println(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{line}"),
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

fn make_progress_bar(stage: Stage) -> ProgressBar {
    let name = stage.as_str();
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {name:<10} [{{bar:30.cyan/blue}}] {{pos}}/{{len}} {{msg}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
