//! Result sinks - where terminal results are written.
//!
//! Exactly one [`EmittedRecord`] is written per terminal decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::error::{CritiqError, Result};
use crate::report::result::EvaluationResult;

/// A terminal result with emission metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedRecord {
    pub emitted_at: DateTime<Utc>,
    pub lineage_id: String,
    /// Digest of the evaluated candidate, absent if none was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub result: EvaluationResult,
}

impl EmittedRecord {
    pub fn new(result: EvaluationResult, digest: Option<String>) -> Self {
        Self {
            emitted_at: Utc::now(),
            lineage_id: result.lineage_id.clone(),
            digest,
            result,
        }
    }
}

/// Destination for terminal results.
pub trait ResultSink: Send + Sync {
    fn emit(&self, record: &EmittedRecord) -> Result<()>;
}

/// Appends one JSON record per line.
pub struct JsonlSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    /// Create a sink at `path`, creating parent directories.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record in the file.
    pub fn load(&self) -> Result<Vec<EmittedRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                records.push(serde_json::from_str(&line)?);
            }
        }
        Ok(records)
    }
}

impl ResultSink for JsonlSink {
    fn emit(&self, record: &EmittedRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;

        // Lineages may finish concurrently; keep lines whole
        let _guard = self.write_lock.lock().map_err(|e| CritiqError::Sink(e.to_string()))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;

        tracing::debug!(
            lineage = %record.lineage_id,
            path = %self.path.display(),
            "Result emitted"
        );
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Default)]
pub struct MemorySink {
    records: RwLock<Vec<EmittedRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Result<Vec<EmittedRecord>> {
        let records = self.records.read().map_err(|e| CritiqError::Sink(e.to_string()))?;
        Ok(records.clone())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSink for MemorySink {
    fn emit(&self, record: &EmittedRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|e| CritiqError::Sink(e.to_string()))?;
        records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Decision;
    use crate::report::result::Termination;
    use tempfile::TempDir;

    fn result(score: f64) -> EvaluationResult {
        EvaluationResult {
            lineage_id: "lin-1".into(),
            candidate_version: 2,
            iteration: 2,
            gate_results: Some(vec![]),
            dimension_results: Some(vec![]),
            overall_score: Some(score),
            overall_pass: true,
            effective_threshold: 0.85,
            decision: Decision::Accept,
            critical_issues: vec![],
            recommended_actions: vec![],
            todos: vec![],
            termination: Some(Termination::Accepted),
            failure_reason: None,
            best_effort: None,
            summary: "ACCEPT at iteration 2".into(),
        }
    }

    #[test]
    fn test_jsonl_sink_appends_and_loads() {
        let temp = TempDir::new().unwrap();
        let sink = JsonlSink::new(temp.path().join("nested").join("results.jsonl")).unwrap();

        sink.emit(&EmittedRecord::new(result(0.9165), Some("abc".into()))).unwrap();
        sink.emit(&EmittedRecord::new(result(0.87), None)).unwrap();

        let records = sink.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].digest.as_deref(), Some("abc"));
        assert_eq!(records[0].result.overall_score, Some(0.9165));
        assert_eq!(records[1].lineage_id, "lin-1");
    }

    #[test]
    fn test_jsonl_sink_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let sink = JsonlSink::new(temp.path().join("none.jsonl")).unwrap();
        assert!(sink.load().unwrap().is_empty());
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.emit(&EmittedRecord::new(result(0.9), None)).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records().unwrap()[0].result.decision, Decision::Accept);
    }
}
