//! Iteration engine
//!
//! Pipelines evaluate a candidate once; controllers drive a lineage through
//! repeated generate/evaluate passes.

pub mod batch;
pub mod cancel;
pub mod controller;
pub mod generator;
pub mod pipeline;
pub mod staged;

pub use batch::{BatchJob, BatchRunner};
pub use cancel::CancellationToken;
pub use controller::{IterationController, IterationState, RunOutcome, evaluate_and_iterate};
pub use generator::{GenerationRequest, Generator, generate_with_timeout};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use staged::{GateStage, StagedValidation};
