//! The structured verdict emitted for every evaluation pass.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::policy::Decision;
use crate::scoring::DimensionResult;
use crate::validation::GateResult;

/// Ordering of recommended work; `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fix recommended for one dimension (or gate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub priority: Priority,
    /// Dimension name, or gate name for gate failures
    pub dimension: String,
    pub fix: String,
}

/// An instruction for the next revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub priority: Priority,
    pub dimension: String,
    pub instruction: String,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Accepted,
    Rejected,
    MaxIterationsExhausted,
    TransientFailure,
    Cancelled,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Accepted => "accepted",
            Termination::Rejected => "rejected",
            Termination::MaxIterationsExhausted => "max_iterations_exhausted",
            Termination::TransientFailure => "transient_failure",
            Termination::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The best candidate retained when a run ends without acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestEffort {
    pub version: u32,
    pub iteration: u32,
    pub score: f64,
}

/// Result of one evaluation pass, and of a whole run once `termination`
/// is set.
///
/// `dimension_results` and `overall_score` are `None` whenever a gate
/// failed; scoring never runs after a gate failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub lineage_id: String,
    pub candidate_version: u32,
    pub iteration: u32,
    pub gate_results: Option<Vec<GateResult>>,
    pub dimension_results: Option<Vec<DimensionResult>>,
    pub overall_score: Option<f64>,
    pub overall_pass: bool,
    pub effective_threshold: f64,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_issues: Vec<String>,
    pub recommended_actions: Vec<RecommendedAction>,
    pub todos: Vec<Todo>,
    /// Set on the final result of a run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
    /// Short reason for a transient failure, e.g. `timeout`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_effort: Option<BestEffort>,
    pub summary: String,
}

impl EvaluationResult {
    /// Whether any gate failed on this pass
    pub fn gate_failed(&self) -> bool {
        self.gate_results
            .as_ref()
            .is_some_and(|results| results.iter().any(|g| !g.pass))
    }

    /// The failing gate, if any
    pub fn failed_gate(&self) -> Option<&GateResult> {
        self.gate_results.as_ref()?.iter().find(|g| !g.pass)
    }

    /// Look up a dimension result by name
    pub fn dimension(&self, name: &str) -> Option<&DimensionResult> {
        self.dimension_results
            .as_ref()?
            .iter()
            .find(|d| d.dimension_name == name)
    }

    pub fn is_terminal(&self) -> bool {
        self.termination.is_some()
    }
}
