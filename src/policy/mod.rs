//! Acceptance policy: the per-iteration verdict and the threshold schedule.

pub mod decision;
pub mod threshold;

pub use decision::{Decision, DecisionEngine, DecisionInput};
pub use threshold::{EffectiveThreshold, StageCondition, ThresholdPolicy, ThresholdPolicySpec, ThresholdStage};
