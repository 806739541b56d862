//! Staged validation.
//!
//! The iterative loop runs against a primary pipeline; an accepted
//! candidate then passes once through each later gate chain (typically an
//! authoritative schema-only check). A later stage failing overturns the
//! acceptance.

use std::sync::Arc;

use crate::engine::controller::{IterationController, RunOutcome};
use crate::engine::generator::{GenerationRequest, Generator};
use crate::error::Result;
use crate::report::{EmittedRecord, ResultReporter, ResultSink};
use crate::validation::GateChain;

/// A named gate chain run after acceptance.
#[derive(Debug, Clone)]
pub struct GateStage {
    pub name: String,
    pub chain: GateChain,
}

/// Primary loop plus authoritative single-pass gate stages.
pub struct StagedValidation {
    primary: IterationController,
    stages: Vec<GateStage>,
    sink: Option<Arc<dyn ResultSink>>,
    reporter: ResultReporter,
}

impl StagedValidation {
    /// The primary controller's own sink is detached; records are written
    /// once, after the last stage.
    pub fn new(primary: IterationController) -> Self {
        Self {
            primary: primary.without_sink(),
            stages: Vec::new(),
            sink: None,
            reporter: ResultReporter::new(),
        }
    }

    /// Append a stage (builder pattern)
    pub fn then_gates(mut self, name: impl Into<String>, chain: GateChain) -> Self {
        self.stages.push(GateStage {
            name: name.into(),
            chain,
        });
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn stages(&self) -> &[GateStage] {
        &self.stages
    }

    pub async fn run(&self, generator: &dyn Generator, request: &GenerationRequest) -> Result<RunOutcome> {
        let mut outcome = self.primary.run(generator, request).await?;

        if outcome.result.decision.is_accepted()
            && let Some(candidate) = &outcome.candidate
        {
            let ctx = self.primary.pipeline().context();
            // Stages draw on whatever the primary loop left of the lineage budget
            let mut retries_left = self.primary.retry_budget().saturating_sub(outcome.state.retries_used);

            for stage in &self.stages {
                let evaluated = loop {
                    match stage.chain.evaluate(candidate, ctx).await {
                        Err(err) if retries_left > 0 => {
                            retries_left -= 1;
                            outcome.state.retries_used += 1;
                            tracing::warn!(
                                lineage = %request.lineage_id,
                                stage = %stage.name,
                                error = %err,
                                retries_left,
                                "Transient failure in stage, retrying"
                            );
                        }
                        other => break other,
                    }
                };

                let result = match evaluated {
                    Ok(gates) if gates.passed() => {
                        tracing::debug!(lineage = %request.lineage_id, stage = %stage.name, "Stage passed");
                        continue;
                    }
                    Ok(gates) => {
                        tracing::info!(lineage = %request.lineage_id, stage = %stage.name, "Stage overturned acceptance");
                        self.reporter.reject_at_stage(outcome.result.clone(), gates.results)
                    }
                    Err(err) => self.reporter.transient_failure(
                        &outcome.result.lineage_id,
                        candidate.version(),
                        outcome.result.iteration,
                        &stage.name,
                        &err,
                        outcome.result.effective_threshold,
                    ),
                };

                outcome.result = result;
                outcome.state.last_decision = Some(outcome.result.decision);
                break;
            }
        }

        if let Some(sink) = &self.sink {
            let digest = outcome.candidate.as_ref().map(|c| c.digest());
            sink.emit(&EmittedRecord::new(outcome.result.clone(), digest))?;
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for StagedValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedValidation")
            .field("primary", &self.primary)
            .field("stages", &self.stages)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
