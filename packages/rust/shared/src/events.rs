//! Event schema posted by the pipeline to observers.
//!
//! Events serialize as JSON objects tagged by `type`, matching what the
//! notification layer relays verbatim to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// Pipeline stage, as named in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Filtering,
    Extracting,
    Converting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filtering => "filtering",
            Self::Extracting => "extracting",
            Self::Converting => "converting",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-document filter outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfStatus {
    Filtered,
    Skipped,
}

/// A structured event emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Log {
        level: LogLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Progress {
        stage: Stage,
        current: usize,
        total: usize,
        percentage: u8,
        message: String,
        timestamp: DateTime<Utc>,
    },
    PdfStatus {
        pdf_name: String,
        status: PdfStatus,
        reason: String,
        #[serde(default = "empty_details")]
        details: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    Completion {
        timestamp: DateTime<Utc>,
    },
}

fn empty_details() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl PipelineEvent {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build a progress tick; `percentage` is `floor(current / total * 100)`, 0 when `total == 0`.
    pub fn progress(stage: Stage, current: usize, total: usize, message: impl Into<String>) -> Self {
        Self::Progress {
            stage,
            current,
            total,
            percentage: percentage(current, total),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn pdf_status(
        pdf_name: impl Into<String>,
        status: PdfStatus,
        reason: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self::PdfStatus {
            pdf_name: pdf_name.into(),
            status,
            reason: reason.into(),
            details: details.unwrap_or_else(empty_details),
            timestamp: Utc::now(),
        }
    }

    pub fn completion() -> Self {
        Self::Completion {
            timestamp: Utc::now(),
        }
    }
}

fn percentage(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (current as u128 * 100) / total as u128;
    pct.min(u128::from(u8::MAX)) as u8
}
