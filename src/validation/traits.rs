// Gate interfaces
// A gate is a pass/fail check over a candidate that can halt the chain

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::candidate::Candidate;
use crate::error::TransientError;
use crate::reference::{Lookup, ReferenceDataProvider, lookup_with_timeout};

/// Name of the synthetic gate reported for malformed candidates.
pub const STRUCTURAL_GATE: &str = "structural";

/// Result of a single gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    /// Gate that produced this result
    pub gate_name: String,
    /// Whether the gate passed
    pub pass: bool,
    /// Every check that failed, in check order
    pub failed_checks: Vec<String>,
    /// Whether failures from this gate block acceptance outright
    #[serde(default)]
    pub critical: bool,
    /// Free-text justification, stored as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl GateResult {
    /// Create a passing result
    pub fn pass(gate_name: impl Into<String>) -> Self {
        Self {
            gate_name: gate_name.into(),
            pass: true,
            failed_checks: Vec::new(),
            critical: false,
            reasoning: None,
        }
    }

    /// Create a failing result with the given failed checks
    pub fn fail(gate_name: impl Into<String>, failed_checks: Vec<String>) -> Self {
        Self {
            gate_name: gate_name.into(),
            pass: false,
            failed_checks,
            critical: false,
            reasoning: None,
        }
    }

    /// Synthetic failure for a candidate that could not be parsed.
    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        Self::fail(STRUCTURAL_GATE, vec![format!("malformed input: {}", reason)]).critical(true)
    }

    /// Mark the result critical (builder pattern)
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Attach a free-text justification
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Record a failed check; the result no longer passes
    pub fn add_failed_check(&mut self, check: impl Into<String>) {
        self.failed_checks.push(check.into());
        self.pass = false;
    }

    pub fn failure_count(&self) -> usize {
        self.failed_checks.len()
    }
}

/// Read-only services available while evaluating one candidate.
#[derive(Clone)]
pub struct EvalContext {
    reference: Option<Arc<dyn ReferenceDataProvider>>,
    reference_timeout: Duration,
}

impl EvalContext {
    pub fn new(reference_timeout: Duration) -> Self {
        Self {
            reference: None,
            reference_timeout,
        }
    }

    /// Set the reference data provider
    pub fn with_reference(mut self, provider: Arc<dyn ReferenceDataProvider>) -> Self {
        self.reference = Some(provider);
        self
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Look up a reference value under the configured timeout.
    pub async fn lookup(&self, key: &str) -> Result<Lookup, TransientError> {
        let Some(provider) = &self.reference else {
            return Err(TransientError::Unavailable("no reference data provider configured".to_string()));
        };
        lookup_with_timeout(provider.as_ref(), key, self.reference_timeout).await
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl std::fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalContext")
            .field("has_reference", &self.reference.is_some())
            .field("reference_timeout", &self.reference_timeout)
            .finish()
    }
}

/// Trait for gates that check candidates
///
/// Gates must not mutate shared state. A transient error means the gate
/// could not reach a verdict (e.g. the reference provider timed out), not
/// that the candidate failed.
#[async_trait]
pub trait Gate: Send + Sync {
    /// Name reported on results
    fn name(&self) -> &str;

    /// Whether a failure of this gate is a blocking defect
    fn is_critical(&self) -> bool {
        false
    }

    /// Whether this gate consults the reference data provider
    fn uses_reference(&self) -> bool {
        false
    }

    /// Evaluate a candidate
    async fn evaluate(&self, candidate: &Candidate, ctx: &EvalContext) -> Result<GateResult, TransientError>;
}
