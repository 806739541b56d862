//! Gate chain.
//!
//! Runs gates strictly in declared order and stops at the first failure.
//! Gates after the failing one are absent from the outcome, not marked
//! skipped. A candidate that fails basic structural parsing is reported as
//! a synthetic `structural` gate failure before any named gate runs.

use std::sync::Arc;

use crate::candidate::Candidate;
use crate::error::TransientError;
use crate::validation::traits::{EvalContext, Gate, GateResult};

/// Ordered results of one chain evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct GateChainOutcome {
    pub results: Vec<GateResult>,
}

impl GateChainOutcome {
    /// Whether every gate that ran passed
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.pass)
    }

    /// The failing gate, if any (always the last result)
    pub fn failed_gate(&self) -> Option<&GateResult> {
        self.results.iter().find(|r| !r.pass)
    }

    /// Failed checks of a critical failing gate
    pub fn critical_issues(&self) -> Vec<String> {
        self.failed_gate()
            .filter(|g| g.critical)
            .map(|g| g.failed_checks.iter().map(|c| format!("{}: {}", g.gate_name, c)).collect())
            .unwrap_or_default()
    }
}

/// An ordered, shareable list of gates.
#[derive(Clone, Default)]
pub struct GateChain {
    gates: Vec<Arc<dyn Gate>>,
}

impl GateChain {
    pub fn new() -> Self {
        Self { gates: Vec::new() }
    }

    /// Add a gate to the end of the chain (builder pattern)
    pub fn with_gate(mut self, gate: impl Gate + 'static) -> Self {
        self.gates.push(Arc::new(gate));
        self
    }

    /// Add a shared gate to the end of the chain
    pub fn add_shared(mut self, gate: Arc<dyn Gate>) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Gate names in declared order
    pub fn gate_names(&self) -> Vec<&str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    /// Whether any gate consults reference data
    pub fn uses_reference(&self) -> bool {
        self.gates.iter().any(|g| g.uses_reference())
    }

    /// Evaluate the chain against a candidate.
    pub async fn evaluate(&self, candidate: &Candidate, ctx: &EvalContext) -> Result<GateChainOutcome, TransientError> {
        if let Err(malformed) = candidate.structure() {
            tracing::debug!(lineage = %candidate.lineage_id(), reason = %malformed.reason, "Candidate malformed");
            return Ok(GateChainOutcome {
                results: vec![GateResult::malformed(&malformed.reason)],
            });
        }

        let mut results = Vec::with_capacity(self.gates.len());

        for gate in &self.gates {
            let mut result = gate.evaluate(candidate, ctx).await?;
            let passed = result.pass;
            if !passed {
                result.critical |= gate.is_critical();
            }
            results.push(result);

            if !passed {
                // Fail fast: later gates never run
                tracing::debug!(
                    lineage = %candidate.lineage_id(),
                    version = candidate.version(),
                    gate = %gate.name(),
                    "Gate failed"
                );
                break;
            }
        }

        Ok(GateChainOutcome { results })
    }
}

impl std::fmt::Debug for GateChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateChain").field("gates", &self.gate_names()).finish()
    }
}
