use std::sync::Arc;

use crate::{models::Candidate, services::sources::VideoSource};

/// How many candidates each source is asked for
pub const SOURCE_RESULT_LIMIT: usize = 5;

/// Once this many candidates have accumulated, lower-priority sources are
/// skipped. A cost/latency optimization, not a correctness requirement.
pub const DEFAULT_THRESHOLD: usize = 3;

/// Runs source adapters in a fixed priority order, merging their candidates.
///
/// The registration order is the priority order: most structured/reliable
/// first. The rule-based fallback's "first candidate wins" tie-break depends
/// on this ordering, so it must stay stable.
pub struct CandidateAggregator {
    sources: Vec<Arc<dyn VideoSource>>,
    threshold: usize,
}

impl CandidateAggregator {
    pub fn new(sources: Vec<Arc<dyn VideoSource>>, threshold: usize) -> Self {
        Self { sources, threshold }
    }

    /// Collects candidates in priority order, short-circuiting once the
    /// threshold is met. An empty result is a valid outcome for the fallback
    /// chain, never an error.
    pub async fn collect(&self, keywords: &str) -> Vec<Candidate> {
        let mut merged: Vec<Candidate> = Vec::new();

        for source in &self.sources {
            if merged.len() >= self.threshold {
                tracing::debug!(
                    source = source.name(),
                    collected = merged.len(),
                    "Threshold met, skipping lower-priority source"
                );
                continue;
            }

            let found = source.search(keywords, SOURCE_RESULT_LIMIT).await;
            tracing::info!(
                source = source.name(),
                results = found.len(),
                total = merged.len() + found.len(),
                "Source search completed"
            );
            merged.extend(found);
        }

        merged
    }
}
