//! Rubrics - how one quality dimension is scored.
//!
//! A [`RubricSpec`] is the serializable form found in validation bundles.
//! [`Rubric::compile`] checks it and resolves evaluators; weights that do not
//! already sum to 1 within [`WEIGHT_TOLERANCE`] are a configuration error.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{CritiqError, Result};
use crate::scoring::evaluator::{CriterionEvaluator, EvaluatorRegistry, EvaluatorSpec};

/// Allowed deviation of a weight set from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Default per-criterion acceptability line.
pub const DEFAULT_ACCEPTABLE_AT: f64 = 1.0;

/// Serializable criterion definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionSpec {
    pub description: String,
    pub weight: f64,
    /// Scores below this line produce an issue, at or above it a success
    #[serde(default = "default_acceptable_at")]
    pub acceptable_at: f64,
    /// Falling below the line is a blocking defect
    #[serde(default)]
    pub critical: bool,
    pub evaluator: EvaluatorSpec,
}

fn default_acceptable_at() -> f64 {
    DEFAULT_ACCEPTABLE_AT
}

/// Serializable rubric definition for one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricSpec {
    pub name: String,
    pub weight: f64,
    pub threshold: f64,
    pub criteria: Vec<CriterionSpec>,
}

/// A criterion ready for evaluation.
#[derive(Clone)]
pub struct Criterion {
    pub description: String,
    /// Normalized weight within the rubric
    pub weight: f64,
    pub acceptable_at: f64,
    pub critical: bool,
    pub evaluator: Arc<dyn CriterionEvaluator>,
}

impl std::fmt::Debug for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Criterion")
            .field("description", &self.description)
            .field("weight", &self.weight)
            .field("acceptable_at", &self.acceptable_at)
            .field("critical", &self.critical)
            .finish()
    }
}

/// A compiled rubric.
#[derive(Debug, Clone)]
pub struct Rubric {
    pub name: String,
    /// Dimension weight, normalized across the rubric set
    pub weight: f64,
    pub threshold: f64,
    pub criteria: Vec<Criterion>,
}

impl Rubric {
    /// Validate a spec and resolve its evaluators.
    ///
    /// The dimension weight is range-checked here; normalization across
    /// dimensions happens in [`compile_rubrics`].
    pub fn compile(spec: &RubricSpec, registry: &EvaluatorRegistry) -> Result<Self> {
        if spec.name.trim().is_empty() {
            return Err(CritiqError::config("rubric name must not be empty"));
        }
        if !(spec.weight > 0.0 && spec.weight <= 1.0) {
            return Err(CritiqError::config(format!(
                "rubric `{}` weight {} is outside (0, 1]",
                spec.name, spec.weight
            )));
        }
        check_unit_interval(&format!("rubric `{}` threshold", spec.name), spec.threshold)?;
        if spec.criteria.is_empty() {
            return Err(CritiqError::config(format!("rubric `{}` has no criteria", spec.name)));
        }

        let raw: Vec<f64> = spec.criteria.iter().map(|c| c.weight).collect();
        let weights = normalize_weights(&raw).map_err(|e| prefix(e, &format!("rubric `{}` criteria", spec.name)))?;

        let mut criteria = Vec::with_capacity(spec.criteria.len());
        for (c, weight) in spec.criteria.iter().zip(weights) {
            check_unit_interval(
                &format!("criterion `{}` acceptable_at", c.description),
                c.acceptable_at,
            )?;
            criteria.push(Criterion {
                description: c.description.clone(),
                weight,
                acceptable_at: c.acceptable_at,
                critical: c.critical,
                evaluator: registry.build(&c.evaluator)?,
            });
        }

        Ok(Self {
            name: spec.name.clone(),
            weight: spec.weight,
            threshold: spec.threshold,
            criteria,
        })
    }

    pub fn uses_reference(&self) -> bool {
        self.criteria.iter().any(|c| c.evaluator.uses_reference())
    }
}

/// Compile a rubric set, normalizing dimension weights.
pub fn compile_rubrics(specs: &[RubricSpec], registry: &EvaluatorRegistry) -> Result<Vec<Rubric>> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.name.as_str()) {
            return Err(CritiqError::config(format!("duplicate dimension `{}`", spec.name)));
        }
    }

    let mut rubrics = specs
        .iter()
        .map(|s| Rubric::compile(s, registry))
        .collect::<Result<Vec<_>>>()?;

    if !rubrics.is_empty() {
        let raw: Vec<f64> = rubrics.iter().map(|r| r.weight).collect();
        let weights = normalize_weights(&raw).map_err(|e| prefix(e, "dimension"))?;
        for (rubric, weight) in rubrics.iter_mut().zip(weights) {
            rubric.weight = weight;
        }
    }

    Ok(rubrics)
}

/// Check that weights are positive and sum to 1 within tolerance, then
/// rescale them so the sum is exactly representable as 1.
pub fn normalize_weights(weights: &[f64]) -> Result<Vec<f64>> {
    if weights.is_empty() {
        return Err(CritiqError::config("weights must not be empty"));
    }
    if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w <= 0.0) {
        return Err(CritiqError::config(format!("weight {} must be positive", w)));
    }

    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(CritiqError::config(format!("weights sum to {}, expected 1.0", sum)));
    }

    Ok(weights.iter().map(|w| w / sum).collect())
}

/// Check a value lies in [0, 1].
pub fn check_unit_interval(what: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CritiqError::config(format!("{} {} is outside [0, 1]", what, value)))
    }
}

fn prefix(err: CritiqError, context: &str) -> CritiqError {
    match err {
        CritiqError::Config(msg) => CritiqError::Config(format!("{} {}", context, msg)),
        other => other,
    }
}
