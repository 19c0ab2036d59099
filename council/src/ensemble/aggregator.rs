//! Consensus aggregation over parallel backend responses
//!
//! Selection is "most detailed wins": the longest response (by character
//! count) is chosen. A length-consistency signal is computed alongside and
//! reported in the analysis, but it does not influence selection.
//!
//! Known limitation: the consistency signal is informational only; no
//! semantic comparison of responses is performed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RouterConfig;

/// A successful response from one consensus participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessfulResponse {
    pub backend_id: String,
    pub response: String,
    pub elapsed_ms: f64,
}

/// Statistics behind a consensus decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusAnalysis {
    /// Number of successful responses considered
    pub total_backends: usize,
    /// Mean absolute length deviation within the consistency band
    pub is_consistent: bool,
    /// Mean response length in characters
    pub avg_response_length: f64,
    /// Mean absolute deviation from `avg_response_length`
    pub mean_length_deviation: f64,
    pub selected_backend: String,
    pub reason: String,
}

/// Result of aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub final_response: String,
    pub winning_backend: String,
    pub analysis: ConsensusAnalysis,
}

/// Reconciles several responses into one
#[derive(Debug, Clone)]
pub struct ConsensusAggregator {
    consistency_band: f64,
}

impl ConsensusAggregator {
    /// Aggregator with an explicit consistency band (fraction of mean length).
    pub fn new(consistency_band: f64) -> Self {
        Self { consistency_band }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(config.consistency_band)
    }

    /// Pick the final response. Returns `None` for an empty slice.
    ///
    /// Ties on length go to the earliest response in `results`.
    pub fn aggregate(&self, results: &[SuccessfulResponse]) -> Option<ConsensusOutcome> {
        let first = results.first()?;

        if results.len() == 1 {
            let len = first.response.chars().count() as f64;
            return Some(ConsensusOutcome {
                final_response: first.response.clone(),
                winning_backend: first.backend_id.clone(),
                analysis: ConsensusAnalysis {
                    total_backends: 1,
                    is_consistent: true,
                    avg_response_length: len,
                    mean_length_deviation: 0.0,
                    selected_backend: first.backend_id.clone(),
                    reason: "Single successful response".to_string(),
                },
            });
        }

        let lengths: Vec<f64> = results
            .iter()
            .map(|r| r.response.chars().count() as f64)
            .collect();

        let mut best = 0;
        for (idx, len) in lengths.iter().enumerate() {
            if *len > lengths[best] {
                best = idx;
            }
        }

        let n = lengths.len() as f64;
        let mean = lengths.iter().sum::<f64>() / n;
        let deviation = lengths.iter().map(|l| (l - mean).abs()).sum::<f64>() / n;
        let is_consistent = deviation < mean * self.consistency_band;

        let winner = &results[best];
        debug!(
            winner = %winner.backend_id,
            mean_len = mean,
            deviation,
            is_consistent,
            "Consensus aggregated"
        );

        Some(ConsensusOutcome {
            final_response: winner.response.clone(),
            winning_backend: winner.backend_id.clone(),
            analysis: ConsensusAnalysis {
                total_backends: results.len(),
                is_consistent,
                avg_response_length: mean,
                mean_length_deviation: deviation,
                selected_backend: winner.backend_id.clone(),
                reason: if is_consistent {
                    "Consistent responses, selected most detailed".to_string()
                } else {
                    "Selected most detailed response".to_string()
                },
            },
        })
    }
}

impl Default for ConsensusAggregator {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}
