//! Progress/log event emission.
//!
//! Stages talk to a [`Reporter`], which mirrors every event to `tracing` and
//! forwards it to an [`EventSink`]. Delivery is fire-and-forget.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use tenderflow_shared::{LogLevel, PdfStatus, PipelineEvent, Stage};

/// Receives pipeline events. Implementations must not block or fail.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Publish/subscribe sink; each subscriber gets its own bounded receiver.
///
/// A slow subscriber lags (and loses the oldest events) without affecting the
/// publisher or other subscribers. Publishing with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<PipelineEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: PipelineEvent) {
        // Err only means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}

/// No-op sink for headless usage.
pub struct SilentSink;

impl EventSink for SilentSink {
    fn emit(&self, _event: PipelineEvent) {}
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Typed front-end over an [`EventSink`] used by the stages.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn EventSink>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => info!(target: "tenderflow::events", ?level, "{message}"),
            LogLevel::Warning => warn!(target: "tenderflow::events", "{message}"),
            LogLevel::Error => error!(target: "tenderflow::events", "{message}"),
        }
        self.sink.emit(PipelineEvent::log(level, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(LogLevel::Success, message);
    }

    pub fn progress(&self, stage: Stage, current: usize, total: usize, message: impl Into<String>) {
        let message = message.into();
        info!(target: "tenderflow::events", %stage, current, total, "{message}");
        self.sink
            .emit(PipelineEvent::progress(stage, current, total, message));
    }

    pub fn pdf_status(
        &self,
        pdf_name: &str,
        status: PdfStatus,
        reason: impl Into<String>,
        details: Option<Value>,
    ) {
        let reason = reason.into();
        info!(target: "tenderflow::events", pdf_name, ?status, "{reason}");
        self.sink
            .emit(PipelineEvent::pdf_status(pdf_name, status, reason, details));
    }

    pub fn completion(&self) {
        info!(target: "tenderflow::events", "run finished");
        self.sink.emit(PipelineEvent::completion());
    }
}
