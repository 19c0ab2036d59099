//! Routing telemetry for the CLI.
//!
//! Appends one JSON object per line to a `.jsonl` file: an `attempt` record
//! for every backend call and a `result` record for every routed task.
//! [`TelemetryReader`] turns the log back into per-backend totals.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use council_router::{AttemptEvent, CostTier, ExecutionResult, RoutingObserver, TaskCategory};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One line of the telemetry log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Attempt {
        timestamp: DateTime<Utc>,
        #[serde(flatten)]
        attempt: AttemptEvent,
    },
    Result {
        timestamp: DateTime<Utc>,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backend_id: Option<String>,
        task_category: TaskCategory,
        tier: CostTier,
        elapsed_ms: u64,
        cost: f64,
        consensus: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl TelemetryRecord {
    fn from_result(result: &ExecutionResult) -> Self {
        Self::Result {
            timestamp: Utc::now(),
            success: result.success,
            backend_id: result.backend_id.clone(),
            task_category: result.task_category,
            tier: result.tier,
            elapsed_ms: result.elapsed_ms,
            cost: result.cost,
            consensus: result.consensus,
            error: result.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// [`RoutingObserver`] that appends to a JSONL file
pub struct JsonlTelemetry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTelemetry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Failures are logged, never raised.
    pub fn append(&self, record: &TelemetryRecord) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize telemetry: {e}");
                return;
            }
        };

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{json}") {
                    warn!(path = %self.path.display(), "Failed to append telemetry: {e}");
                }
            }
            Err(e) => warn!(path = %self.path.display(), "Failed to open telemetry file: {e}"),
        }
    }
}

impl RoutingObserver for JsonlTelemetry {
    fn on_attempt(&self, event: &AttemptEvent) {
        self.append(&TelemetryRecord::Attempt {
            timestamp: Utc::now(),
            attempt: event.clone(),
        });
    }

    fn on_result(&self, result: &ExecutionResult) {
        self.append(&TelemetryRecord::from_result(result));
    }
}

/// Per-backend totals derived from attempt records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendUsage {
    pub attempts: u64,
    pub successes: u64,
    pub avg_elapsed_ms: f64,
}

/// Totals across a telemetry log
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySummary {
    pub results: u64,
    pub successful_results: u64,
    pub total_cost: f64,
    pub backends: BTreeMap<String, BackendUsage>,
}

/// Reads a JSONL telemetry log
pub struct TelemetryReader {
    records: Vec<TelemetryRecord>,
}

impl TelemetryReader {
    /// Load every parseable line; malformed lines are skipped with a warning.
    pub fn read_from_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetryRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = line_no + 1, "Skipping malformed telemetry line: {e}"),
            }
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    pub fn summarize(&self) -> TelemetrySummary {
        let mut summary = TelemetrySummary::default();
        let mut elapsed_totals: BTreeMap<String, f64> = BTreeMap::new();

        for record in &self.records {
            match record {
                TelemetryRecord::Attempt { attempt, .. } => {
                    let usage = summary
                        .backends
                        .entry(attempt.backend_id.clone())
                        .or_default();
                    usage.attempts += 1;
                    if attempt.success {
                        usage.successes += 1;
                    }
                    *elapsed_totals.entry(attempt.backend_id.clone()).or_default() +=
                        attempt.elapsed_ms;
                }
                TelemetryRecord::Result { success, cost, .. } => {
                    summary.results += 1;
                    if *success {
                        summary.successful_results += 1;
                    }
                    summary.total_cost += cost;
                }
            }
        }

        for (id, usage) in summary.backends.iter_mut() {
            if usage.attempts > 0 {
                usage.avg_elapsed_ms =
                    elapsed_totals.get(id).copied().unwrap_or(0.0) / usage.attempts as f64;
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(id: &str, success: bool, elapsed_ms: f64) -> AttemptEvent {
        AttemptEvent {
            backend_id: id.to_string(),
            category: TaskCategory::General,
            cost_tier: CostTier::Tier0,
            elapsed_ms,
            success,
            error: (!success).then(|| "boom".to_string()),
            consensus: false,
        }
    }

    fn result(success: bool, cost: f64) -> ExecutionResult {
        ExecutionResult {
            success,
            response: success.then(|| "answer".to_string()),
            backend_id: success.then(|| "a".to_string()),
            task_category: TaskCategory::General,
            elapsed_ms: 12,
            tier: CostTier::Tier0,
            cost,
            consensus: false,
            consensus_detail: None,
            error: None,
        }
    }

    #[test]
    fn test_observer_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlTelemetry::new(dir.path().join("routing.jsonl"));

        sink.on_attempt(&attempt("a", false, 10.0));
        sink.on_attempt(&attempt("b", true, 30.0));
        sink.on_result(&result(true, 0.0));

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "attempt");
        assert_eq!(first["backend_id"], "a");
        let last: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last["event"], "result");
        assert_eq!(last["task_category"], "general");
    }

    #[test]
    fn test_reader_summarizes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlTelemetry::new(dir.path().join("routing.jsonl"));
        sink.on_attempt(&attempt("a", false, 10.0));
        sink.on_attempt(&attempt("a", true, 30.0));
        sink.on_attempt(&attempt("b", true, 5.0));
        sink.on_result(&result(true, 0.25));
        sink.on_result(&result(false, 0.0));

        let summary = TelemetryReader::read_from_file(sink.path())
            .unwrap()
            .summarize();

        assert_eq!(summary.results, 2);
        assert_eq!(summary.successful_results, 1);
        assert!((summary.total_cost - 0.25).abs() < 1e-12);
        let a = &summary.backends["a"];
        assert_eq!(a.attempts, 2);
        assert_eq!(a.successes, 1);
        assert!((a.avg_elapsed_ms - 20.0).abs() < 1e-9);
        assert_eq!(summary.backends["b"].attempts, 1);
    }

    #[test]
    fn test_reader_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.jsonl");
        std::fs::write(&path, "not json\n\n").unwrap();
        let sink = JsonlTelemetry::new(&path);
        sink.on_result(&result(true, 0.0));

        let reader = TelemetryReader::read_from_file(&path).unwrap();
        assert_eq!(reader.records().len(), 1);
    }
}
