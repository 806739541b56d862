//! Dimension scoring and aggregation.
//!
//! Rubrics score one quality dimension each from weighted criteria; the
//! aggregator folds the dimension results into one overall score.

pub mod aggregator;
pub mod evaluator;
pub mod rubric;
pub mod scorer;

pub use aggregator::{Aggregate, Aggregator, aggregate};
pub use evaluator::{BuiltinEvaluator, CriterionEvaluator, EvaluatorRegistry, EvaluatorSpec};
pub use rubric::{Criterion, CriterionSpec, Rubric, RubricSpec, WEIGHT_TOLERANCE, compile_rubrics, normalize_weights};
pub use scorer::{DimensionResult, DimensionScorer, clamp_score, score_dimension};

/// Slack applied to score comparisons to absorb floating-point noise.
pub const SCORE_EPSILON: f64 = 1e-9;

/// Whether `score` reaches `bar`.
pub fn meets(score: f64, bar: f64) -> bool {
    score + SCORE_EPSILON >= bar
}
