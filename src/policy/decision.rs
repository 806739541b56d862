//! Decision engine - turns a scored pass into a verdict.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::scoring::meets;
use crate::scoring::rubric::check_unit_interval;

/// Per-iteration verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Accept,
    AcceptWithNotes,
    Refine,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "ACCEPT",
            Decision::AcceptWithNotes => "ACCEPT_WITH_NOTES",
            Decision::Refine => "REFINE",
            Decision::Reject => "REJECT",
        }
    }

    /// Whether the candidate is accepted (with or without notes)
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accept | Decision::AcceptWithNotes)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the engine needs for one decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    /// `None` when gates failed and nothing was scored
    pub overall_score: Option<f64>,
    pub effective_threshold: f64,
    pub critical_issues: &'a [String],
    /// Non-blocking issues remain on an otherwise acceptable candidate
    pub has_notes: bool,
}

/// Stateless decision rules with a configurable refine margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionEngine {
    margin: f64,
}

impl DecisionEngine {
    pub fn new(margin: f64) -> Result<Self> {
        check_unit_interval("decision margin", margin)?;
        Ok(Self { margin })
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Apply the rules in order:
    /// 1. any critical issue rejects
    /// 2. at or above the bar accepts (with notes if issues remain)
    /// 3. within the margin below the bar refines
    /// 4. anything else rejects
    ///
    /// An unscored pass without critical issues (a non-critical gate
    /// failure) is refinable.
    pub fn decide(&self, input: DecisionInput<'_>) -> Decision {
        if !input.critical_issues.is_empty() {
            return Decision::Reject;
        }

        let Some(score) = input.overall_score else {
            return Decision::Refine;
        };

        if meets(score, input.effective_threshold) {
            if input.has_notes {
                Decision::AcceptWithNotes
            } else {
                Decision::Accept
            }
        } else if meets(score, input.effective_threshold - self.margin) {
            Decision::Refine
        } else {
            Decision::Reject
        }
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self { margin: 0.10 }
    }
}
