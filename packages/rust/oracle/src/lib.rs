//! Clients for the external oracles the pipeline consults.
//!
//! - [`ClassificationOracle`]: relevance judgment, form-boundary detection and
//!   deadline extraction, backed by the Gemini REST API ([`GeminiClient`]).
//! - [`EmbeddingOracle`]: sentence embeddings, backed by Ollama ([`OllamaEmbedder`]).
//! - [`SemanticScorer`]: max cosine similarity against capability descriptors.
//!
//! All calls are blocking; the pipeline runs them on its background lane.

mod embedding;
mod gemini;
mod prompts;
mod scorer;

use std::path::Path;

use tenderflow_shared::{DeadlineInfo, FormDetection, Result};

pub use embedding::OllamaEmbedder;
pub use gemini::GeminiClient;
pub use scorer::{SemanticScorer, cosine_similarity};

// ---------------------------------------------------------------------------
// Classification oracle
// ---------------------------------------------------------------------------

/// Outcome of a text relevance judgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevanceJudgment {
    pub is_relevant: bool,
    pub reasoning: String,
}

impl RelevanceJudgment {
    /// The degraded answer returned when the oracle cannot be consulted.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            is_relevant: false,
            reasoning: format!("Gemini error: {reason}"),
        }
    }
}

/// Handle to a document registered with the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocument {
    /// Resource name, e.g. `files/abc123`.
    pub name: String,
    pub uri: String,
    pub mime_type: String,
}

/// A generative oracle answering structured questions about tender documents.
///
/// The judgment methods never fail: oracle errors degrade to a safe default
/// (not relevant, no forms, no deadline). Only [`upload`](Self::upload)
/// reports failure, since the caller skips the document in that case.
pub trait ClassificationOracle: Send + Sync {
    fn judge_relevance(&self, text: &str) -> RelevanceJudgment;

    /// Register a local file and wait until the oracle has finished processing it.
    fn upload(&self, path: &Path, display_name: &str) -> Result<RemoteDocument>;

    fn detect_forms(&self, document: &RemoteDocument) -> Vec<FormDetection>;

    fn extract_deadline(&self, document: &RemoteDocument) -> DeadlineInfo;

    /// Best-effort release of the remote handle; failures are swallowed.
    fn release(&self, document: &RemoteDocument);
}

// ---------------------------------------------------------------------------
// Embeddings and scoring
// ---------------------------------------------------------------------------

/// Produces one embedding vector per input text.
pub trait EmbeddingOracle: Send + Sync {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Numeric relevance gate for a document's leading text.
pub trait RelevanceScorer: Send + Sync {
    /// Score in `[-1, 1]` (in practice `[0, 1]`); errors mean the oracle was unavailable.
    fn score(&self, text: &str) -> Result<f32>;
}
