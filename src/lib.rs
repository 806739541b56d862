//! critiq - iterative quality-gated validation
//!
//! A candidate passes through an ordered chain of hard gates, is scored on
//! weighted rubric dimensions, and is accepted, refined or rejected against
//! an iteration-aware threshold. Refinements feed prioritized feedback back
//! to the generator until the candidate converges or the budget runs out.

pub mod candidate;
pub mod config;
pub mod engine;
pub mod error;
pub mod id;
pub mod policy;
pub mod reference;
pub mod report;
pub mod scoring;
pub mod validation;

pub use error::{CritiqError, Result};
