//! Aggregator - combines dimension results into an overall verdict.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CritiqError, Result};
use crate::scoring::meets;
use crate::scoring::rubric::{Rubric, check_unit_interval, normalize_weights};
use crate::scoring::scorer::DimensionResult;

/// Overall score and pass flag.
///
/// `overall_score` is `None` when nothing was scored, which is distinct
/// from scoring zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub overall_score: Option<f64>,
    pub overall_pass: bool,
}

impl Aggregate {
    pub fn not_scored() -> Self {
        Self {
            overall_score: None,
            overall_pass: false,
        }
    }
}

/// Weighted combination of dimension scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregator {
    weights: BTreeMap<String, f64>,
    global_threshold: f64,
}

impl Aggregator {
    /// Build from explicit dimension weights.
    ///
    /// Weights must sum to 1 within tolerance.
    pub fn new(weights: BTreeMap<String, f64>, global_threshold: f64) -> Result<Self> {
        check_unit_interval("global threshold", global_threshold)?;
        let names: Vec<String> = weights.keys().cloned().collect();
        let raw: Vec<f64> = weights.values().copied().collect();
        let normalized = normalize_weights(&raw)?;

        Ok(Self {
            weights: names.into_iter().zip(normalized).collect(),
            global_threshold,
        })
    }

    /// Build from compiled rubrics (their weights are already normalized).
    pub fn from_rubrics(rubrics: &[Rubric], global_threshold: f64) -> Result<Self> {
        let weights = rubrics.iter().map(|r| (r.name.clone(), r.weight)).collect();
        Self::new(weights, global_threshold)
    }

    pub fn global_threshold(&self) -> f64 {
        self.global_threshold
    }

    pub fn weight(&self, dimension: &str) -> Option<f64> {
        self.weights.get(dimension).copied()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    /// Combine dimension results.
    pub fn aggregate(&self, results: &[DimensionResult]) -> Result<Aggregate> {
        if results.is_empty() {
            return Ok(Aggregate::not_scored());
        }

        let mut overall = 0.0;
        for result in results {
            let weight = self.weight(&result.dimension_name).ok_or_else(|| {
                CritiqError::config(format!("no weight configured for dimension `{}`", result.dimension_name))
            })?;
            overall += weight * result.score;
        }

        let all_pass = results.iter().all(|r| r.pass);
        Ok(Aggregate {
            overall_score: Some(overall),
            overall_pass: all_pass && meets(overall, self.global_threshold),
        })
    }
}

/// One-shot aggregation with explicit weights, aligned with `results`.
pub fn aggregate(results: &[DimensionResult], weights: &[f64], global_threshold: f64) -> Result<Aggregate> {
    if results.is_empty() {
        return Ok(Aggregate::not_scored());
    }
    if results.len() != weights.len() {
        return Err(CritiqError::config(format!(
            "{} dimension results but {} weights",
            results.len(),
            weights.len()
        )));
    }
    let map = results
        .iter()
        .zip(weights)
        .map(|(r, w)| (r.dimension_name.clone(), *w))
        .collect();
    Aggregator::new(map, global_threshold)?.aggregate(results)
}
