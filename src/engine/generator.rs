//! Generator collaborator.
//!
//! Produces the first candidate of a lineage and each revision. Calls may
//! suspend on an external service and always run under a timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::candidate::Candidate;
use crate::error::TransientError;
use crate::id::generate_lineage_id;
use crate::report::Feedback;

/// What the caller asked for, fixed for the whole lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub lineage_id: String,
    /// Opaque brief handed to the generator
    pub brief: Value,
}

impl GenerationRequest {
    /// A request with a fresh lineage id.
    pub fn new(brief: Value) -> Self {
        Self {
            lineage_id: generate_lineage_id(),
            brief,
        }
    }

    pub fn with_lineage_id(mut self, lineage_id: impl Into<String>) -> Self {
        self.lineage_id = lineage_id.into();
        self
    }
}

/// Produces candidates.
///
/// `previous` and `feedback` are both `None` on the first call of a
/// lineage. Revisions should come from [`Candidate::revise`] so lineage and
/// version stay consistent. Implementations may be called again with the
/// same feedback after a transient failure.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        previous: Option<&Candidate>,
        feedback: Option<&Feedback>,
    ) -> Result<Candidate, TransientError>;
}

/// Run a generator call under a caller-supplied timeout.
pub async fn generate_with_timeout(
    generator: &dyn Generator,
    request: &GenerationRequest,
    previous: Option<&Candidate>,
    feedback: Option<&Feedback>,
    timeout: Duration,
) -> Result<Candidate, TransientError> {
    tokio::time::timeout(timeout, generator.generate(request, previous, feedback))
        .await
        .map_err(|_| TransientError::Timeout(timeout))?
}
