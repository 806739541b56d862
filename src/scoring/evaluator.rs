//! Criterion evaluators.
//!
//! An evaluator turns a candidate into a sub-score in [0, 1] for one rubric
//! criterion. Built-in evaluators are declared as data ([`EvaluatorSpec`]);
//! anything else is registered in code under a name and referenced with
//! `kind: custom`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::candidate::{Candidate, collect_text, has_content, resolve};
use crate::error::{CritiqError, Result, TransientError};
use crate::reference::{Lookup, values_equal};
use crate::validation::EvalContext;

/// Scores one criterion of a rubric.
#[async_trait]
pub trait CriterionEvaluator: Send + Sync {
    /// Whether this evaluator consults the reference data provider
    fn uses_reference(&self) -> bool {
        false
    }

    /// Return a sub-score; values outside [0, 1] are clamped by the scorer.
    async fn evaluate(&self, candidate: &Candidate, ctx: &EvalContext) -> std::result::Result<f64, TransientError>;
}

/// Declarative evaluator definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluatorSpec {
    /// Fraction of the listed fields that carry content
    FieldPresent { paths: Vec<String> },
    /// `len / min`, capped at 1
    MinItems { path: String, min: usize },
    /// Fraction of keywords found (case-insensitive) anywhere under `path`
    KeywordCoverage { path: String, keywords: Vec<String> },
    /// 1 when the number at `path` lies within [min, max], else 0
    NumericRange { path: String, min: f64, max: f64 },
    /// Fraction of list items carrying content in every named field
    EachItemHas { path: String, fields: Vec<String> },
    /// 1 when the field equals the reference value under `key`, else 0
    ReferenceMatch { path: String, key: String },
    /// Evaluator registered in code under `name`
    Custom { name: String },
}

impl EvaluatorSpec {
    /// Reject specs that can never produce a meaningful score.
    pub fn validate(&self) -> Result<()> {
        match self {
            EvaluatorSpec::FieldPresent { paths } if paths.is_empty() => {
                Err(CritiqError::config("field_present evaluator needs at least one path"))
            }
            EvaluatorSpec::MinItems { min: 0, path } => {
                Err(CritiqError::config(format!("min_items evaluator for `{}` needs min > 0", path)))
            }
            EvaluatorSpec::KeywordCoverage { keywords, path } if keywords.is_empty() => Err(CritiqError::config(
                format!("keyword_coverage evaluator for `{}` needs keywords", path),
            )),
            EvaluatorSpec::NumericRange { min, max, path } if min > max => Err(CritiqError::config(format!(
                "numeric_range evaluator for `{}` has min {} > max {}",
                path, min, max
            ))),
            EvaluatorSpec::EachItemHas { fields, path } if fields.is_empty() => Err(CritiqError::config(
                format!("each_item_has evaluator for `{}` needs fields", path),
            )),
            _ => Ok(()),
        }
    }
}

/// Evaluator backed by a built-in [`EvaluatorSpec`].
#[derive(Debug, Clone)]
pub struct BuiltinEvaluator {
    spec: EvaluatorSpec,
}

impl BuiltinEvaluator {
    pub fn new(spec: EvaluatorSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl CriterionEvaluator for BuiltinEvaluator {
    fn uses_reference(&self) -> bool {
        matches!(self.spec, EvaluatorSpec::ReferenceMatch { .. })
    }

    async fn evaluate(&self, candidate: &Candidate, ctx: &EvalContext) -> std::result::Result<f64, TransientError> {
        let score = match &self.spec {
            EvaluatorSpec::FieldPresent { paths } => {
                let present = paths
                    .iter()
                    .filter(|p| candidate.lookup(p).is_some_and(has_content))
                    .count();
                ratio(present, paths.len())
            }

            EvaluatorSpec::MinItems { path, min } => match candidate.lookup(path) {
                Some(Value::Array(items)) => ratio(items.len().min(*min), *min),
                _ => 0.0,
            },

            EvaluatorSpec::KeywordCoverage { path, keywords } => match candidate.lookup(path) {
                Some(value) => {
                    let text = collect_text(value);
                    let found = keywords
                        .iter()
                        .filter(|k| text.contains(&k.to_lowercase()))
                        .count();
                    ratio(found, keywords.len())
                }
                None => 0.0,
            },

            EvaluatorSpec::NumericRange { path, min, max } => match candidate.lookup(path).and_then(Value::as_f64) {
                Some(n) if n >= *min && n <= *max => 1.0,
                _ => 0.0,
            },

            EvaluatorSpec::EachItemHas { path, fields } => match candidate.lookup(path) {
                Some(Value::Array(items)) => {
                    let complete = items
                        .iter()
                        .filter(|item| fields.iter().all(|f| resolve(item, f).is_some_and(has_content)))
                        .count();
                    ratio(complete, items.len())
                }
                _ => 0.0,
            },

            EvaluatorSpec::ReferenceMatch { path, key } => match ctx.lookup(key).await? {
                Lookup::Found(expected) if candidate.lookup(path).is_some_and(|v| values_equal(v, &expected)) => 1.0,
                _ => 0.0,
            },

            // Resolved through the registry at construction time
            EvaluatorSpec::Custom { .. } => 0.0,
        };

        Ok(score)
    }
}

fn ratio(n: usize, d: usize) -> f64 {
    if d == 0 { 0.0 } else { n as f64 / d as f64 }
}

/// Named evaluators supplied by the embedding application.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    custom: HashMap<String, Arc<dyn CriterionEvaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom evaluator (builder pattern)
    pub fn with_evaluator(mut self, name: impl Into<String>, evaluator: impl CriterionEvaluator + 'static) -> Self {
        self.custom.insert(name.into(), Arc::new(evaluator));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.custom.contains_key(name)
    }

    /// Build an evaluator for a spec.
    pub fn build(&self, spec: &EvaluatorSpec) -> Result<Arc<dyn CriterionEvaluator>> {
        spec.validate()?;
        match spec {
            EvaluatorSpec::Custom { name } => self
                .custom
                .get(name)
                .cloned()
                .ok_or_else(|| CritiqError::config(format!("unknown custom evaluator `{}`", name))),
            other => Ok(Arc::new(BuiltinEvaluator::new(other.clone()))),
        }
    }
}

impl std::fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.custom.keys().collect();
        names.sort();
        f.debug_struct("EvaluatorRegistry").field("custom", &names).finish()
    }
}
