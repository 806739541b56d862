//! Threshold policy - iteration-indexed acceptance bar.
//!
//! Early iterations demand the full bar; later stages may relax it, but
//! only while their conditions hold (e.g. a critical dimension stays high).
//! When a stage's conditions fail the policy falls back to the stricter
//! stages before it. The effective threshold never drops below `floor`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CritiqError, Result};
use crate::scoring::meets;
use crate::scoring::rubric::check_unit_interval;
use crate::scoring::scorer::DimensionResult;

/// A condition a relaxed stage requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCondition {
    pub dimension: String,
    pub min_score: f64,
}

impl StageCondition {
    /// Unscored dimensions never satisfy a condition.
    pub fn holds(&self, dimensions: &[DimensionResult]) -> bool {
        dimensions
            .iter()
            .find(|d| d.dimension_name == self.dimension)
            .is_some_and(|d| meets(d.score, self.min_score))
    }
}

/// One stage of the schedule; `to: None` means open-ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdStage {
    pub from: u32,
    #[serde(default)]
    pub to: Option<u32>,
    pub threshold: f64,
    #[serde(default)]
    pub conditions: Vec<StageCondition>,
}

impl ThresholdStage {
    pub fn contains(&self, iteration: u32) -> bool {
        iteration >= self.from && self.to.is_none_or(|to| iteration <= to)
    }
}

/// Serializable policy as found in a validation bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicySpec {
    #[serde(default)]
    pub floor: f64,
    pub stages: Vec<ThresholdStage>,
}

/// Effective threshold for one iteration and how it was reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveThreshold {
    pub threshold: f64,
    /// Index of the stage whose threshold applies
    pub stage: usize,
    /// A relaxed stage was skipped because its conditions failed
    pub fell_back: bool,
}

/// Validated threshold schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdPolicy {
    floor: f64,
    stages: Vec<ThresholdStage>,
}

impl ThresholdPolicy {
    /// A single unconditional stage.
    pub fn constant(threshold: f64) -> Result<Self> {
        Self::compile(
            &ThresholdPolicySpec {
                floor: 0.0,
                stages: vec![ThresholdStage {
                    from: 1,
                    to: None,
                    threshold,
                    conditions: Vec::new(),
                }],
            },
            &[],
        )
    }

    /// Validate a spec against the configured dimension names.
    pub fn compile(spec: &ThresholdPolicySpec, dimensions: &[&str]) -> Result<Self> {
        check_unit_interval("policy floor", spec.floor)?;
        if spec.stages.is_empty() {
            return Err(CritiqError::config("threshold policy has no stages"));
        }
        if spec.stages[0].from != 1 {
            return Err(CritiqError::config(format!(
                "threshold policy must start at iteration 1, starts at {}",
                spec.stages[0].from
            )));
        }

        let known: HashSet<&str> = dimensions.iter().copied().collect();

        for (i, stage) in spec.stages.iter().enumerate() {
            check_unit_interval(&format!("stage {} threshold", i + 1), stage.threshold)?;
            if stage.threshold < spec.floor {
                return Err(CritiqError::config(format!(
                    "stage {} threshold {} is below the floor {}",
                    i + 1,
                    stage.threshold,
                    spec.floor
                )));
            }
            if let Some(to) = stage.to
                && to < stage.from
            {
                return Err(CritiqError::config(format!("stage {} ends before it starts", i + 1)));
            }

            if i > 0 {
                let prev = &spec.stages[i - 1];
                let Some(prev_to) = prev.to else {
                    return Err(CritiqError::config(format!("stage {} is open-ended but not last", i)));
                };
                if stage.from <= prev_to {
                    return Err(CritiqError::config(format!("stage {} overlaps stage {}", i + 1, i)));
                }
                if stage.threshold > prev.threshold {
                    return Err(CritiqError::config(format!(
                        "stage {} raises the threshold from {} to {}",
                        i + 1,
                        prev.threshold,
                        stage.threshold
                    )));
                }
            }

            for condition in &stage.conditions {
                if !known.contains(condition.dimension.as_str()) {
                    return Err(CritiqError::config(format!(
                        "stage {} condition references unknown dimension `{}`",
                        i + 1,
                        condition.dimension
                    )));
                }
                check_unit_interval(&format!("condition on `{}` min_score", condition.dimension), condition.min_score)?;
            }
        }

        Ok(Self {
            floor: spec.floor,
            stages: spec.stages.clone(),
        })
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    pub fn stages(&self) -> &[ThresholdStage] {
        &self.stages
    }

    /// Index of the stage covering `iteration`.
    ///
    /// Gaps and iterations past the schedule use the last stage started.
    fn stage_index(&self, iteration: u32) -> usize {
        self.stages
            .iter()
            .position(|s| s.contains(iteration))
            .or_else(|| self.stages.iter().rposition(|s| s.from <= iteration))
            .unwrap_or(0)
    }

    /// Scheduled threshold, ignoring stage conditions.
    pub fn scheduled_threshold(&self, iteration: u32) -> f64 {
        self.stages[self.stage_index(iteration)].threshold.max(self.floor)
    }

    /// Threshold for `iteration` given this pass's dimension results.
    pub fn effective_threshold(&self, iteration: u32, dimensions: &[DimensionResult]) -> EffectiveThreshold {
        let scheduled = self.stage_index(iteration);
        let mut index = scheduled;

        // Walk back to the nearest stage whose conditions hold; the first
        // stage applies unconditionally.
        while index > 0 && !self.stages[index].conditions.iter().all(|c| c.holds(dimensions)) {
            index -= 1;
        }

        EffectiveThreshold {
            threshold: self.stages[index].threshold.max(self.floor),
            stage: index,
            fell_back: index != scheduled,
        }
    }
}
