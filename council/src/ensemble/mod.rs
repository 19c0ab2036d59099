//! Multi-backend consensus
//!
//! The router fans a task out to several backends in parallel; this
//! module turns the successful responses into one answer.

pub mod aggregator;

pub use aggregator::{ConsensusAggregator, ConsensusAnalysis, ConsensusOutcome, SuccessfulResponse};
