//! Result reporter.
//!
//! Turns the raw outputs of one pass into an [`EvaluationResult`]:
//! prioritized actions and todos, plus a one-line summary. Also renders
//! results for display with truncated lists.

use std::fmt::Write as _;

use crate::candidate::Candidate;
use crate::error::TransientError;
use crate::policy::Decision;
use crate::report::result::{EvaluationResult, Priority, RecommendedAction, Termination, Todo};
use crate::scoring::{Aggregate, DimensionResult, meets};
use crate::validation::GateResult;

/// A failing dimension this far below its threshold is high priority.
pub const HIGH_PRIORITY_GAP: f64 = 0.10;

/// Raw outputs of one evaluation pass.
#[derive(Debug, Clone)]
pub struct PassRecord<'a> {
    pub candidate: &'a Candidate,
    pub iteration: u32,
    pub gate_results: Vec<GateResult>,
    pub dimension_results: Option<Vec<DimensionResult>>,
    pub aggregate: Aggregate,
    pub effective_threshold: f64,
    pub decision: Decision,
    pub critical_issues: Vec<String>,
}

/// Assembles evaluation results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultReporter;

impl ResultReporter {
    pub fn new() -> Self {
        Self
    }

    /// Build the result for one pass.
    pub fn assemble(&self, pass: PassRecord<'_>) -> EvaluationResult {
        let (recommended_actions, todos) = prioritize(&pass.gate_results, pass.dimension_results.as_deref());

        let mut result = EvaluationResult {
            lineage_id: pass.candidate.lineage_id().to_string(),
            candidate_version: pass.candidate.version(),
            iteration: pass.iteration,
            gate_results: Some(pass.gate_results),
            dimension_results: pass.dimension_results,
            overall_score: pass.aggregate.overall_score,
            overall_pass: pass.aggregate.overall_pass,
            effective_threshold: pass.effective_threshold,
            decision: pass.decision,
            critical_issues: pass.critical_issues,
            recommended_actions,
            todos,
            termination: None,
            failure_reason: None,
            best_effort: None,
            summary: String::new(),
        };
        result.summary = summarize(&result);
        result
    }

    /// Mark a result as the end of a run.
    pub fn finalize(&self, mut result: EvaluationResult, termination: Termination) -> EvaluationResult {
        result.termination = Some(termination);
        result.summary = summarize(&result);
        result
    }

    /// Result for a run whose retry budget ran out on a transient failure.
    ///
    /// Shaped like a gate failure on the stage that failed (`generator` or
    /// `evaluation`) so consumers see the reason among the gate results.
    pub fn transient_failure(
        &self,
        lineage_id: &str,
        candidate_version: u32,
        iteration: u32,
        stage: &str,
        error: &TransientError,
        effective_threshold: f64,
    ) -> EvaluationResult {
        let gate = GateResult::fail(stage, vec![format!("{}: {}", error.reason(), error)]);
        let (recommended_actions, todos) = prioritize(std::slice::from_ref(&gate), None);

        let mut result = EvaluationResult {
            lineage_id: lineage_id.to_string(),
            candidate_version,
            iteration,
            gate_results: Some(vec![gate]),
            dimension_results: None,
            overall_score: None,
            overall_pass: false,
            effective_threshold,
            decision: Decision::Reject,
            critical_issues: Vec::new(),
            recommended_actions,
            todos,
            termination: Some(Termination::TransientFailure),
            failure_reason: Some(error.reason().to_string()),
            best_effort: None,
            summary: String::new(),
        };
        result.summary = summarize(&result);
        result
    }

    /// Overturn an accepted result after a later gate stage failed.
    ///
    /// The stage's gate results are appended and scoring is dropped, as for
    /// any gate failure.
    pub fn reject_at_stage(&self, mut result: EvaluationResult, stage_results: Vec<GateResult>) -> EvaluationResult {
        let mut gates = result.gate_results.take().unwrap_or_default();
        gates.extend(stage_results);

        let critical_issues: Vec<String> = gates
            .iter()
            .filter(|g| !g.pass && g.critical)
            .flat_map(|g| g.failed_checks.iter().map(move |c| format!("{}: {}", g.gate_name, c)))
            .collect();
        let (recommended_actions, todos) = prioritize(&gates, None);

        result.gate_results = Some(gates);
        result.dimension_results = None;
        result.overall_score = None;
        result.overall_pass = false;
        result.decision = Decision::Reject;
        result.critical_issues = critical_issues;
        result.recommended_actions = recommended_actions;
        result.todos = todos;
        self.finalize(result, Termination::Rejected)
    }
}

/// Derive actions and todos from a pass, ordered by priority then dimension.
pub fn prioritize(
    gate_results: &[GateResult],
    dimension_results: Option<&[DimensionResult]>,
) -> (Vec<RecommendedAction>, Vec<Todo>) {
    let mut items: Vec<(Priority, String, String, String)> = Vec::new();

    for gate in gate_results.iter().filter(|g| !g.pass) {
        let priority = if gate.critical { Priority::Critical } else { Priority::High };
        for check in &gate.failed_checks {
            items.push((
                priority,
                gate.gate_name.clone(),
                check.clone(),
                format!("Resolve failed `{}` check: {}", gate.gate_name, check),
            ));
        }
    }

    for dim in dimension_results.unwrap_or_default() {
        for (i, issue) in dim.issues.iter().enumerate() {
            let priority = if dim.is_critical_issue(i) {
                Priority::Critical
            } else if dim.pass {
                Priority::Low
            } else if meets(dim.gap(), HIGH_PRIORITY_GAP) {
                Priority::High
            } else {
                Priority::Medium
            };
            items.push((
                priority,
                dim.dimension_name.clone(),
                issue.clone(),
                format!("Improve {}: {}", dim.dimension_name, issue),
            ));
        }
    }

    // Stable: keeps check and criterion order within a dimension
    items.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    items
        .into_iter()
        .map(|(priority, dimension, fix, instruction)| {
            (
                RecommendedAction {
                    priority,
                    dimension: dimension.clone(),
                    fix,
                },
                Todo {
                    priority,
                    dimension,
                    instruction,
                },
            )
        })
        .unzip()
}

/// One-line human-readable summary.
pub fn summarize(result: &EvaluationResult) -> String {
    let detail = if let Some(gate) = result.failed_gate() {
        format!("gate `{}` failed {} check(s)", gate.gate_name, gate.failure_count())
    } else if let Some(score) = result.overall_score {
        format!(
            "overall score {:.2} against threshold {:.2}",
            score, result.effective_threshold
        )
    } else {
        "not scored".to_string()
    };

    let detail = if result.critical_issues.is_empty() {
        detail
    } else {
        format!("{}; {} critical issue(s)", detail, result.critical_issues.len())
    };

    match result.termination {
        Some(Termination::Cancelled) => format!(
            "cancelled after iteration {}; last decision {}: {}",
            result.iteration, result.decision, detail
        ),
        Some(Termination::TransientFailure) => format!(
            "{} at iteration {}: {} after retries were exhausted",
            result.decision,
            result.iteration,
            result.failure_reason.as_deref().unwrap_or("transient failure")
        ),
        Some(Termination::MaxIterationsExhausted) => format!(
            "{} at iteration {}: not accepted within {} iteration(s); {}",
            result.decision, result.iteration, result.iteration, detail
        ),
        _ => format!("{} at iteration {}: {}", result.decision, result.iteration, detail),
    }
}

/// Render a result for display, showing at most `limit` items per list.
pub fn render_report(result: &EvaluationResult, limit: usize) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# {} ({})", result.decision, result.lineage_id);
    let _ = writeln!(out, "{}", result.summary);
    let _ = writeln!(
        out,
        "iteration {} | version {} | overall pass: {}",
        result.iteration, result.candidate_version, result.overall_pass
    );
    if let Some(best) = &result.best_effort {
        let _ = writeln!(
            out,
            "best effort: version {} (iteration {}) scored {:.2}",
            best.version, best.iteration, best.score
        );
    }

    if let Some(gates) = &result.gate_results {
        out.push_str("\n## Gates\n");
        for gate in gates {
            let status = if gate.pass { "pass" } else { "FAIL" };
            let _ = writeln!(out, "- {} [{}]", gate.gate_name, status);
            push_limited(&mut out, &gate.failed_checks, limit, "  ");
        }
    }

    if let Some(dims) = &result.dimension_results {
        out.push_str("\n## Dimensions\n");
        for dim in dims {
            let status = if dim.pass { "pass" } else { "FAIL" };
            let _ = writeln!(
                out,
                "- {}: {:.2} / {:.2} [{}]",
                dim.dimension_name, dim.score, dim.threshold, status
            );
            push_limited(&mut out, &dim.issues, limit, "  ");
        }
    }

    if !result.recommended_actions.is_empty() {
        out.push_str("\n## Recommended actions\n");
        let lines: Vec<String> = result
            .recommended_actions
            .iter()
            .map(|a| format!("[{}] {}: {}", a.priority, a.dimension, a.fix))
            .collect();
        push_limited(&mut out, &lines, limit, "");
    }

    out
}

fn push_limited(out: &mut String, items: &[String], limit: usize, indent: &str) {
    for item in items.iter().take(limit) {
        let _ = writeln!(out, "{}- {}", indent, item);
    }
    if items.len() > limit {
        let _ = writeln!(out, "{}- ... and {} more", indent, items.len() - limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dim(name: &str, score: f64, threshold: f64, issues: &[&str]) -> DimensionResult {
        DimensionResult {
            dimension_name: name.to_string(),
            score,
            threshold,
            pass: meets(score, threshold),
            issues: issues.iter().map(|s| s.to_string()).collect(),
            successes: vec![],
            critical_indices: vec![],
        }
    }

    #[test]
    fn test_only_the_critical_copy_of_a_repeated_issue_is_critical() {
        let mut accuracy = dim(
            "accuracy",
            0.5,
            0.9,
            &["date checked (scored 0.00)", "date checked (scored 0.00)"],
        );
        accuracy.critical_indices = vec![1];
        let dims = vec![accuracy];

        let (actions, _) = prioritize(&[], Some(&dims));
        let priorities: Vec<Priority> = actions.iter().map(|a| a.priority).collect();
        assert_eq!(priorities, vec![Priority::Critical, Priority::High]);
    }

    #[test]
    fn test_prioritize_orders_by_priority_then_dimension() {
        let mut accuracy = dim("accuracy", 0.5, 0.9, &["facts wrong (scored 0.00)"]);
        accuracy.critical_indices = vec![0];

        let dims = vec![
            accuracy,
            dim("clarity", 0.95, 0.8, &["minor wording (scored 0.90)"]),
            dim("coverage", 0.75, 0.8, &["one topic missing (scored 0.50)"]),
            dim("depth", 0.6, 0.8, &["too shallow (scored 0.20)"]),
        ];

        let (actions, todos) = prioritize(&[], Some(&dims));
        let order: Vec<(Priority, &str)> = actions.iter().map(|a| (a.priority, a.dimension.as_str())).collect();
        assert_eq!(
            order,
            vec![
                (Priority::Critical, "accuracy"),
                (Priority::High, "depth"),
                (Priority::Medium, "coverage"),
                (Priority::Low, "clarity"),
            ]
        );
        assert_eq!(todos.len(), 4);
        assert_eq!(todos[1].instruction, "Improve depth: too shallow (scored 0.20)");
    }

    #[test]
    fn test_gate_failures_become_actions() {
        let gates = vec![
            GateResult::pass("format"),
            GateResult::fail("schema", vec!["required field `title` is missing".into()]),
        ];
        let (actions, _) = prioritize(&gates, None);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].priority, Priority::High);
        assert_eq!(actions[0].dimension, "schema");

        let critical = vec![GateResult::fail("facts", vec!["wrong date".into()]).critical(true)];
        let (actions, _) = prioritize(&critical, None);
        assert_eq!(actions[0].priority, Priority::Critical);
    }

    #[test]
    fn test_assemble_and_finalize() {
        let candidate = Candidate::new("lin-1", json!({"title": "x"}));
        let reporter = ResultReporter::new();
        let result = reporter.assemble(PassRecord {
            candidate: &candidate,
            iteration: 2,
            gate_results: vec![GateResult::pass("schema")],
            dimension_results: Some(vec![dim("clarity", 0.9, 0.8, &[])]),
            aggregate: Aggregate {
                overall_score: Some(0.9),
                overall_pass: true,
            },
            effective_threshold: 0.85,
            decision: Decision::Accept,
            critical_issues: vec![],
        });

        assert_eq!(result.summary, "ACCEPT at iteration 2: overall score 0.90 against threshold 0.85");
        assert!(!result.is_terminal());

        let result = reporter.finalize(result, Termination::Accepted);
        assert_eq!(result.termination, Some(Termination::Accepted));
    }

    #[test]
    fn test_transient_failure_result() {
        let err = TransientError::Timeout(std::time::Duration::from_millis(50));
        let result = ResultReporter::new().transient_failure("lin", 1, 1, "generator", &err, 0.85);

        assert_eq!(result.decision, Decision::Reject);
        assert_eq!(result.failure_reason.as_deref(), Some("timeout"));
        assert!(result.dimension_results.is_none());
        assert!(!result.overall_pass);
        assert!(result.failed_gate().unwrap().failed_checks[0].starts_with("timeout: "));
        assert!(result.summary.contains("timeout after retries were exhausted"));
    }

    #[test]
    fn test_render_report_truncates_lists() {
        let issues: Vec<String> = (0..15).map(|i| format!("issue {}", i)).collect();
        let issue_refs: Vec<&str> = issues.iter().map(|s| s.as_str()).collect();
        let candidate = Candidate::new("lin", json!({"title": "x"}));
        let result = ResultReporter::new().assemble(PassRecord {
            candidate: &candidate,
            iteration: 1,
            gate_results: vec![],
            dimension_results: Some(vec![dim("clarity", 0.5, 0.8, &issue_refs)]),
            aggregate: Aggregate {
                overall_score: Some(0.5),
                overall_pass: false,
            },
            effective_threshold: 0.85,
            decision: Decision::Reject,
            critical_issues: vec![],
        });

        // Stored lists are never truncated
        assert_eq!(result.recommended_actions.len(), 15);

        let text = render_report(&result, 10);
        assert!(text.contains("issue 9"));
        assert!(!text.contains("issue 10\n"));
        assert!(text.contains("... and 5 more"));
    }
}
