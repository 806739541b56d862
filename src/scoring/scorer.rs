//! Dimension scorer.
//!
//! Each rubric is scored independently from the shared, immutable
//! candidate, so dimensions are evaluated concurrently. Results are joined
//! and sorted by dimension name before anyone sees them.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::error::TransientError;
use crate::scoring::meets;
use crate::scoring::rubric::Rubric;
use crate::validation::EvalContext;

/// Score and findings for one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionResult {
    pub dimension_name: String,
    pub score: f64,
    pub threshold: f64,
    pub pass: bool,
    pub issues: Vec<String>,
    pub successes: Vec<String>,
    /// Positions in `issues` raised by criteria marked critical
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_indices: Vec<usize>,
}

impl DimensionResult {
    /// Whether the issue at `index` came from a critical criterion.
    pub fn is_critical_issue(&self, index: usize) -> bool {
        self.critical_indices.contains(&index)
    }

    /// Critical issues, prefixed with the dimension name.
    pub fn critical_issues(&self) -> Vec<String> {
        self.critical_indices
            .iter()
            .filter_map(|&i| self.issues.get(i))
            .map(|issue| format!("{}: {}", self.dimension_name, issue))
            .collect()
    }

    /// Distance below the threshold (0 when passing).
    pub fn gap(&self) -> f64 {
        (self.threshold - self.score).max(0.0)
    }
}

/// Scores candidates against a rubric set.
#[derive(Debug, Clone, Default)]
pub struct DimensionScorer;

impl DimensionScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score every rubric. Output is ordered by dimension name.
    pub async fn score(
        &self,
        candidate: &Candidate,
        rubrics: &[Rubric],
        ctx: &EvalContext,
    ) -> Result<Vec<DimensionResult>, TransientError> {
        let futures = rubrics.iter().map(|rubric| score_dimension(candidate, rubric, ctx));
        let mut results = join_all(futures).await.into_iter().collect::<Result<Vec<_>, _>>()?;

        results.sort_by(|a, b| a.dimension_name.cmp(&b.dimension_name));
        Ok(results)
    }
}

/// Score a single rubric.
pub async fn score_dimension(
    candidate: &Candidate,
    rubric: &Rubric,
    ctx: &EvalContext,
) -> Result<DimensionResult, TransientError> {
    let mut score = 0.0;
    let mut issues = Vec::new();
    let mut successes = Vec::new();
    let mut critical_indices = Vec::new();

    for criterion in &rubric.criteria {
        let sub = clamp_score(criterion.evaluator.evaluate(candidate, ctx).await?);
        score += criterion.weight * sub;

        if sub < criterion.acceptable_at {
            let issue = format!("{} (scored {:.2})", criterion.description, sub);
            if criterion.critical {
                critical_indices.push(issues.len());
            }
            issues.push(issue);
        } else {
            successes.push(criterion.description.clone());
        }
    }

    let score = clamp_score(score);
    tracing::trace!(dimension = %rubric.name, score, "Dimension scored");

    Ok(DimensionResult {
        dimension_name: rubric.name.clone(),
        score,
        threshold: rubric.threshold,
        pass: meets(score, rubric.threshold),
        issues,
        successes,
        critical_indices,
    })
}

/// Clamp to [0, 1]; NaN counts as 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}
