//! Semantic Relevance Scorer.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use tenderflow_shared::{Result, TenderflowError};

use crate::{EmbeddingOracle, RelevanceScorer};

/// Scores text by its best cosine similarity to a fixed set of capability descriptors.
pub struct SemanticScorer {
    oracle: Arc<dyn EmbeddingOracle>,
    descriptors: Vec<Vec<f32>>,
    sample_chars: usize,
}

impl SemanticScorer {
    /// Embed `descriptors` once up front; an unreachable oracle fails construction.
    pub fn new(
        oracle: Arc<dyn EmbeddingOracle>,
        descriptors: &[String],
        sample_chars: usize,
    ) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(TenderflowError::config("no capability descriptors configured"));
        }
        let inputs: Vec<&str> = descriptors.iter().map(String::as_str).collect();
        let embedded = oracle.embed(&inputs)?;
        info!(descriptors = embedded.len(), "capability descriptors embedded");

        Ok(Self {
            oracle,
            descriptors: embedded,
            sample_chars,
        })
    }
}

impl RelevanceScorer for SemanticScorer {
    #[instrument(skip_all, fields(chars = text.len()))]
    fn score(&self, text: &str) -> Result<f32> {
        let sample: String = text.chars().take(self.sample_chars).collect();
        let embedded = self.oracle.embed(&[sample.as_str()])?;
        let query = embedded
            .first()
            .ok_or_else(|| TenderflowError::Oracle("embedding oracle returned nothing".into()))?;

        let best = self
            .descriptors
            .iter()
            .map(|d| cosine_similarity(query, d))
            .fold(f32::NEG_INFINITY, f32::max);
        debug!(score = best, "semantic score");
        Ok(best)
    }
}

/// Cosine similarity of two vectors; 0 when either has zero norm or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
