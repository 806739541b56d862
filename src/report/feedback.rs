//! Structured feedback for the generator.
//!
//! When a pass ends in REFINE, the generator gets what went wrong: failed
//! gate checks, per-dimension issues against their thresholds, and the
//! prioritized todos. [`FeedbackFormatter`] renders it as Markdown for
//! prompt-driven generators.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::config::EngineSettings;
use crate::policy::Decision;
use crate::report::result::{EvaluationResult, Todo};

/// Failed checks of one gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateFeedback {
    pub gate: String,
    pub failed_checks: Vec<String>,
}

/// Issues found in one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionFeedback {
    pub dimension: String,
    pub score: f64,
    pub threshold: f64,
    pub pass: bool,
    pub issues: Vec<String>,
}

/// Feedback from a single pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub iteration: u32,
    pub candidate_version: u32,
    pub decision: Decision,
    pub overall_score: Option<f64>,
    pub effective_threshold: f64,
    pub gates: Vec<GateFeedback>,
    pub dimensions: Vec<DimensionFeedback>,
    pub todos: Vec<Todo>,
}

impl Feedback {
    /// Extract feedback from an evaluation result.
    pub fn from_result(result: &EvaluationResult) -> Self {
        let gates = result
            .gate_results
            .iter()
            .flatten()
            .filter(|g| !g.pass)
            .map(|g| GateFeedback {
                gate: g.gate_name.clone(),
                failed_checks: g.failed_checks.clone(),
            })
            .collect();

        let dimensions = result
            .dimension_results
            .iter()
            .flatten()
            .filter(|d| !d.issues.is_empty())
            .map(|d| DimensionFeedback {
                dimension: d.dimension_name.clone(),
                score: d.score,
                threshold: d.threshold,
                pass: d.pass,
                issues: d.issues.clone(),
            })
            .collect();

        Self {
            iteration: result.iteration,
            candidate_version: result.candidate_version,
            decision: result.decision,
            overall_score: result.overall_score,
            effective_threshold: result.effective_threshold,
            gates,
            dimensions,
            todos: result.todos.clone(),
        }
    }

    /// Whether there is anything to act on
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty() && self.dimensions.is_empty() && self.todos.is_empty()
    }
}

/// Formatter for incorporating feedback into prompts.
#[derive(Debug, Clone)]
pub struct FeedbackFormatter {
    /// Maximum number of items shown per list.
    pub max_items: usize,
}

impl Default for FeedbackFormatter {
    fn default() -> Self {
        Self { max_items: 10 }
    }
}

impl FeedbackFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Formatter honouring `report.display_limit`.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            max_items: settings.report.display_limit,
        }
    }

    /// Set the maximum items per list.
    pub fn with_max_items(mut self, max: usize) -> Self {
        self.max_items = max;
        self
    }

    /// Format a single pass's feedback.
    pub fn format_single(&self, feedback: &Feedback) -> String {
        let mut output = String::new();

        let score = feedback
            .overall_score
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "not scored".to_string());
        let _ = writeln!(
            output,
            "### Iteration {} ({}, score {}, threshold {:.2})\n",
            feedback.iteration, feedback.decision, score, feedback.effective_threshold
        );

        for gate in &feedback.gates {
            let _ = writeln!(output, "**Gate `{}` failed**:", gate.gate);
            self.push_items(&mut output, gate.failed_checks.iter().map(String::as_str), "check");
            output.push('\n');
        }

        for dim in &feedback.dimensions {
            let _ = writeln!(
                output,
                "**{}** ({:.2} / {:.2}):",
                dim.dimension, dim.score, dim.threshold
            );
            self.push_items(&mut output, dim.issues.iter().map(String::as_str), "issue");
            output.push('\n');
        }

        if !feedback.todos.is_empty() {
            output.push_str("**To do, in order:**\n");
            let lines: Vec<String> = feedback
                .todos
                .iter()
                .map(|t| format!("[{}] {}", t.priority, t.instruction))
                .collect();
            self.push_items(&mut output, lines.iter().map(String::as_str), "todo");
        }

        output
    }

    /// Format a history of feedback, most recent in detail.
    pub fn format_history(&self, history: &[Feedback]) -> String {
        let Some(latest) = history.last() else {
            return String::new();
        };

        let mut output = String::new();
        output.push_str("## Previous Iteration Results\n\n");

        if history.len() > 1 {
            output.push_str("**Summary:**\n");
            for fb in history {
                let score = fb
                    .overall_score
                    .map(|s| format!("{:.2}", s))
                    .unwrap_or_else(|| "not scored".to_string());
                let _ = writeln!(output, "- Iteration {}: {} ({})", fb.iteration, fb.decision, score);
            }
            output.push('\n');
        }

        output.push_str("**Most recent result (focus on fixing this first):**\n\n");
        output.push_str(&self.format_single(latest));
        output
    }

    fn push_items<'a>(&self, output: &mut String, items: impl ExactSizeIterator<Item = &'a str>, noun: &str) {
        let total = items.len();
        for item in items.take(self.max_items) {
            let _ = writeln!(output, "- {}", item);
        }
        if total > self.max_items {
            let _ = writeln!(output, "- ... and {} more {}s", total - self.max_items, noun);
        }
    }
}
