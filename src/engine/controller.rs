//! Iteration controller - the generate, evaluate, revise loop.
//!
//! Each pass:
//! 1. Obtains a candidate from the generator (with the previous pass's
//!    feedback on revisions)
//! 2. Evaluates it once through the pipeline
//! 3. Terminates on ACCEPT / REJECT, or iterates on REFINE until the
//!    iteration budget is spent
//!
//! A lineage is strictly sequential. Transient collaborator failures are
//! retried against a per-run budget without advancing the iteration.

use std::sync::Arc;
use std::time::Duration;

use crate::candidate::Candidate;
use crate::config::{BestEffortPolicy, EngineSettings};
use crate::engine::cancel::CancellationToken;
use crate::engine::generator::{GenerationRequest, Generator, generate_with_timeout};
use crate::engine::pipeline::Pipeline;
use crate::error::{CritiqError, Result, TransientError};
use crate::policy::Decision;
use crate::report::{
    BestEffort, EmittedRecord, EvaluationResult, Feedback, JsonlSink, ResultReporter, ResultSink, Termination,
};

/// Progress of one lineage.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationState {
    pub lineage_id: String,
    /// Current iteration, 0 before the first pass
    pub iteration: u32,
    pub max_iterations: u32,
    /// Overall score per completed pass; `None` when gates failed
    pub score_history: Vec<Option<f64>>,
    pub last_decision: Option<Decision>,
    pub retries_used: u32,
}

impl IterationState {
    pub fn new(lineage_id: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            lineage_id: lineage_id.into(),
            iteration: 0,
            max_iterations,
            score_history: Vec::new(),
            last_decision: None,
            retries_used: 0,
        }
    }

    /// Move to the next iteration; false once the budget is spent.
    fn advance(&mut self) -> bool {
        if self.iteration >= self.max_iterations {
            return false;
        }
        self.iteration += 1;
        true
    }

    fn record(&mut self, result: &EvaluationResult) {
        self.score_history.push(result.overall_score);
        self.last_decision = Some(result.decision);
    }

    /// Completed evaluation passes
    pub fn evaluations(&self) -> usize {
        self.score_history.len()
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The terminal result (also written to the sink)
    pub result: EvaluationResult,
    pub state: IterationState,
    /// Every completed pass, in order
    pub history: Vec<EvaluationResult>,
    /// The last candidate evaluated
    pub candidate: Option<Candidate>,
    /// Highest-scoring candidate under `retain_best`, when not accepted
    pub best_candidate: Option<Candidate>,
}

/// Drives lineages through a shared pipeline.
#[derive(Clone)]
pub struct IterationController {
    pipeline: Arc<Pipeline>,
    max_iterations: u32,
    retry_budget: u32,
    generator_timeout: Duration,
    best_effort: BestEffortPolicy,
    cancellation: CancellationToken,
    sink: Option<Arc<dyn ResultSink>>,
    reporter: ResultReporter,
}

impl IterationController {
    pub fn new(pipeline: Arc<Pipeline>, max_iterations: u32) -> Result<Self> {
        if max_iterations == 0 {
            return Err(CritiqError::config("max_iterations must be > 0"));
        }
        let defaults = EngineSettings::default();
        Ok(Self {
            pipeline,
            max_iterations,
            retry_budget: defaults.engine.retry_budget,
            generator_timeout: defaults.generator_timeout(),
            best_effort: defaults.engine.best_effort,
            cancellation: CancellationToken::new(),
            sink: None,
            reporter: ResultReporter::new(),
        })
    }

    /// Build from engine settings, opening the JSONL sink if one is configured.
    pub fn from_settings(pipeline: Arc<Pipeline>, settings: &EngineSettings) -> Result<Self> {
        let mut controller = Self::new(pipeline, settings.engine.max_iterations)?
            .with_retry_budget(settings.engine.retry_budget)
            .with_generator_timeout(settings.generator_timeout())
            .with_best_effort(settings.engine.best_effort);

        if let Some(path) = &settings.report.sink_path {
            controller = controller.with_sink(Arc::new(JsonlSink::new(path)?));
        }
        Ok(controller)
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    pub fn with_generator_timeout(mut self, timeout: Duration) -> Self {
        self.generator_timeout = timeout;
        self
    }

    pub fn with_best_effort(mut self, policy: BestEffortPolicy) -> Self {
        self.best_effort = policy;
        self
    }

    /// Share a cancellation token with the caller
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Remove the sink (results are then only returned)
    pub fn without_sink(mut self) -> Self {
        self.sink = None;
        self
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Transient-failure retries allowed per lineage
    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Run one lineage to a terminal decision.
    ///
    /// Returns `Err` only when the sink fails or the generator breaks the
    /// lineage contract; every evaluation problem ends up in the result.
    pub async fn run(&self, generator: &dyn Generator, request: &GenerationRequest) -> Result<RunOutcome> {
        let mut run = Run::new(&request.lineage_id, self.max_iterations, self.retry_budget);

        while run.state.iteration < self.max_iterations {
            // Cancellation is only observed between passes
            if self.cancellation.is_cancelled()
                && let Some(last) = run.history.last().cloned()
            {
                tracing::info!(lineage = %request.lineage_id, iteration = run.state.iteration, "Run cancelled");
                return self.finish(run, last, Termination::Cancelled);
            }

            run.state.advance();
            let iteration = run.state.iteration;

            let candidate = loop {
                let attempt = generate_with_timeout(
                    generator,
                    request,
                    run.previous.as_ref(),
                    run.feedback.as_ref(),
                    self.generator_timeout,
                )
                .await;
                match attempt {
                    Ok(candidate) => break candidate,
                    Err(err) => {
                        if !run.spend_retry(&err, "generator") {
                            let version = run.previous.as_ref().map_or(0, Candidate::version);
                            return self.transient_failure(run, version, "generator", &err);
                        }
                    }
                }
            };
            check_lineage(&candidate, request, run.previous.as_ref())?;

            let result = loop {
                let attempt = self.pipeline.evaluate_once(&candidate, iteration).await;
                match attempt {
                    Ok(result) => break result,
                    Err(CritiqError::Transient(err)) => {
                        if !run.spend_retry(&err, "evaluation") {
                            let version = candidate.version();
                            run.previous = Some(candidate);
                            return self.transient_failure(run, version, "evaluation", &err);
                        }
                    }
                    Err(other) => return Err(other),
                }
            };

            run.state.record(&result);
            if self.best_effort == BestEffortPolicy::RetainBest {
                run.consider_best(&candidate, &result);
            }
            run.history.push(result.clone());

            match result.decision {
                Decision::Accept | Decision::AcceptWithNotes => {
                    run.previous = Some(candidate);
                    return self.finish(run, result, Termination::Accepted);
                }
                Decision::Reject => {
                    run.previous = Some(candidate);
                    return self.finish(run, result, Termination::Rejected);
                }
                Decision::Refine if iteration < self.max_iterations => {
                    tracing::debug!(lineage = %request.lineage_id, iteration, "Refining");
                    run.feedback = Some(Feedback::from_result(&result));
                    run.previous = Some(candidate);
                }
                Decision::Refine => {
                    // Out of iterations: never upgraded, always rejected
                    run.previous = Some(candidate);
                    let mut result = result;
                    result.decision = Decision::Reject;
                    return self.finish(run, result, Termination::MaxIterationsExhausted);
                }
            }
        }

        // Only reachable if the loop body never ran
        Err(CritiqError::config("max_iterations must be > 0"))
    }

    fn transient_failure(&self, run: Run, version: u32, stage: &str, err: &TransientError) -> Result<RunOutcome> {
        tracing::warn!(
            lineage = %run.state.lineage_id,
            iteration = run.state.iteration,
            stage,
            reason = err.reason(),
            "Retry budget exhausted"
        );
        let threshold = self.pipeline.policy().scheduled_threshold(run.state.iteration);
        let result = self.reporter.transient_failure(
            &run.state.lineage_id,
            version,
            run.state.iteration,
            stage,
            err,
            threshold,
        );
        self.finish(run, result, Termination::TransientFailure)
    }

    fn finish(&self, mut run: Run, result: EvaluationResult, termination: Termination) -> Result<RunOutcome> {
        let mut result = self.reporter.finalize(result, termination);

        let best_candidate = if termination == Termination::Accepted {
            None
        } else {
            run.best.take().map(|(candidate, best)| {
                result.best_effort = Some(best);
                candidate
            })
        };
        run.state.last_decision = Some(result.decision);

        tracing::info!(
            lineage = %result.lineage_id,
            iteration = result.iteration,
            decision = %result.decision,
            termination = %termination,
            "Run finished"
        );

        if let Some(sink) = &self.sink {
            let digest = run.previous.as_ref().map(Candidate::digest);
            sink.emit(&EmittedRecord::new(result.clone(), digest))?;
        }

        Ok(RunOutcome {
            result,
            state: run.state,
            history: run.history,
            candidate: run.previous,
            best_candidate,
        })
    }
}

impl std::fmt::Debug for IterationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterationController")
            .field("pipeline", &self.pipeline.name())
            .field("max_iterations", &self.max_iterations)
            .field("retry_budget", &self.retry_budget)
            .field("generator_timeout", &self.generator_timeout)
            .field("best_effort", &self.best_effort)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

/// Mutable state of one run.
struct Run {
    state: IterationState,
    retries_left: u32,
    history: Vec<EvaluationResult>,
    previous: Option<Candidate>,
    feedback: Option<Feedback>,
    best: Option<(Candidate, BestEffort)>,
}

impl Run {
    fn new(lineage_id: &str, max_iterations: u32, retry_budget: u32) -> Self {
        Self {
            state: IterationState::new(lineage_id, max_iterations),
            retries_left: retry_budget,
            history: Vec::new(),
            previous: None,
            feedback: None,
            best: None,
        }
    }

    /// Consume one retry; false when none are left.
    fn spend_retry(&mut self, err: &TransientError, stage: &str) -> bool {
        if self.retries_left == 0 {
            return false;
        }
        self.retries_left -= 1;
        self.state.retries_used += 1;
        tracing::warn!(
            lineage = %self.state.lineage_id,
            iteration = self.state.iteration,
            stage,
            error = %err,
            retries_left = self.retries_left,
            "Transient failure, retrying"
        );
        true
    }

    /// Keep the highest-scoring candidate; ties keep the earliest.
    fn consider_best(&mut self, candidate: &Candidate, result: &EvaluationResult) {
        let Some(score) = result.overall_score else {
            return;
        };
        if self.best.as_ref().is_none_or(|(_, best)| score > best.score) {
            self.best = Some((
                candidate.clone(),
                BestEffort {
                    version: candidate.version(),
                    iteration: result.iteration,
                    score,
                },
            ));
        }
    }
}

fn check_lineage(candidate: &Candidate, request: &GenerationRequest, previous: Option<&Candidate>) -> Result<()> {
    if candidate.lineage_id() != request.lineage_id {
        return Err(CritiqError::Generator(format!(
            "candidate lineage `{}` does not match request lineage `{}`",
            candidate.lineage_id(),
            request.lineage_id
        )));
    }
    if let Some(prev) = previous
        && candidate.version() <= prev.version()
    {
        return Err(CritiqError::Generator(format!(
            "revision version {} does not follow version {}",
            candidate.version(),
            prev.version()
        )));
    }
    Ok(())
}

/// Run one lineage with default settings and no sink.
pub async fn evaluate_and_iterate(
    request: &GenerationRequest,
    generator: &dyn Generator,
    pipeline: Arc<Pipeline>,
    max_iterations: u32,
) -> Result<EvaluationResult> {
    let outcome = IterationController::new(pipeline, max_iterations)?
        .run(generator, request)
        .await?;
    Ok(outcome.result)
}
