//! Core domain types for Tenderflow runs and their persisted artifacts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// DecisionRecord
// ---------------------------------------------------------------------------

/// How a relevance decision was reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionMethod {
    /// Semantic score and oracle judgment, both required.
    #[default]
    #[serde(rename = "Gemini + Semantic")]
    OracleAndSemantic,
    /// Text could not be sampled; rejected without consulting any oracle.
    #[serde(rename = "Unreadable")]
    Unreadable,
}

/// A cached relevance decision, keyed by document filename in the cache file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Whether the document is copied forward into the filtered area.
    pub passes_filter: bool,
    /// Max cosine similarity against the capability descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f32>,
    /// Oracle reasoning, or the reason the document was unreadable.
    #[serde(default, alias = "reason")]
    pub reasoning: String,
    /// Decision path tag.
    #[serde(default)]
    pub method: DecisionMethod,
}

impl DecisionRecord {
    /// A terminal rejection for a document whose text could not be sampled.
    pub fn unreadable(reason: impl Into<String>) -> Self {
        Self {
            passes_filter: false,
            semantic_score: None,
            reasoning: reason.into(),
            method: DecisionMethod::Unreadable,
        }
    }

    /// A decision reached by the semantic score plus the oracle judgment.
    pub fn judged(passes_filter: bool, semantic_score: f32, reasoning: impl Into<String>) -> Self {
        Self {
            passes_filter,
            semantic_score: Some(semantic_score),
            reasoning: reasoning.into(),
            method: DecisionMethod::OracleAndSemantic,
        }
    }
}

// ---------------------------------------------------------------------------
// FormDetection
// ---------------------------------------------------------------------------

/// Oracle-reported confidence in a detected form boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
    #[serde(other)]
    Unknown,
}

/// One bidder-actionable section of a tender document (1-indexed, inclusive pages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDetection {
    #[serde(default)]
    pub form_title: String,
    #[serde(default = "first_page")]
    pub start_page: i64,
    #[serde(default = "first_page")]
    pub end_page: i64,
    #[serde(default)]
    pub confidence: Confidence,
}

fn first_page() -> i64 {
    1
}

impl FormDetection {
    /// The synthetic form used when detection finds nothing: the whole document.
    pub fn whole_document(base_name: &str, total_pages: u32) -> Self {
        Self {
            form_title: format!("Complete Bid Document - {base_name}"),
            start_page: 1,
            end_page: i64::from(total_pages),
            confidence: Confidence::Medium,
        }
    }
}

// ---------------------------------------------------------------------------
// DeadlineInfo
// ---------------------------------------------------------------------------

/// Submission deadline as reported by the oracle; dates are free-form strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeadlineInfo {
    #[serde(default)]
    pub deadline_found: bool,
    #[serde(default)]
    pub deadline_date: Option<String>,
    #[serde(default)]
    pub bid_opening_date: Option<String>,
    #[serde(default)]
    pub deadline_text: Option<String>,
    #[serde(default)]
    pub explanation: String,
}

impl DeadlineInfo {
    /// The safe default when the oracle call fails.
    pub fn not_found() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// MetadataRecord
// ---------------------------------------------------------------------------

/// The `<base>_metadata.json` file written per extracted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub pdf_name: String,
    pub total_forms: usize,
    pub forms: Vec<FormDetection>,
    pub deadline_info: DeadlineInfo,
}
