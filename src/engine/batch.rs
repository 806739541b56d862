//! Batch runner for independent lineages.
//!
//! Lineages share one pipeline and run concurrently, each as its own task,
//! bounded by a semaphore. Within a lineage everything stays sequential.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::EngineSettings;
use crate::engine::controller::{IterationController, RunOutcome};
use crate::engine::generator::{GenerationRequest, Generator};
use crate::engine::pipeline::Pipeline;
use crate::error::{CritiqError, Result};

/// One lineage to run.
#[derive(Clone)]
pub struct BatchJob {
    pub request: GenerationRequest,
    pub generator: Arc<dyn Generator>,
}

impl BatchJob {
    pub fn new(request: GenerationRequest, generator: Arc<dyn Generator>) -> Self {
        Self { request, generator }
    }
}

/// Runs many lineages against one controller configuration.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    controller: IterationController,
    max_lineages: usize,
}

impl BatchRunner {
    pub fn new(controller: IterationController, max_lineages: usize) -> Result<Self> {
        if max_lineages == 0 {
            return Err(CritiqError::config("max_lineages must be > 0"));
        }
        Ok(Self {
            controller,
            max_lineages,
        })
    }

    pub fn from_settings(pipeline: Arc<Pipeline>, settings: &EngineSettings) -> Result<Self> {
        let controller = IterationController::from_settings(pipeline, settings)?;
        Self::new(controller, settings.concurrency.max_lineages)
    }

    pub fn max_lineages(&self) -> usize {
        self.max_lineages
    }

    /// Run every job; outcomes come back in submission order.
    ///
    /// A failing lineage does not affect the others.
    pub async fn run(&self, jobs: Vec<BatchJob>) -> Vec<Result<RunOutcome>> {
        let permits = Arc::new(Semaphore::new(self.max_lineages));
        tracing::info!(jobs = jobs.len(), max_lineages = self.max_lineages, "Starting batch");

        let handles: Vec<(String, JoinHandle<Result<RunOutcome>>)> = jobs
            .into_iter()
            .map(|job| {
                let controller = self.controller.clone();
                let permits = Arc::clone(&permits);
                let lineage_id = job.request.lineage_id.clone();

                let handle = tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| CritiqError::Task(e.to_string()))?;
                    controller.run(job.generator.as_ref(), &job.request).await
                });
                (lineage_id, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (lineage_id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(lineage = %lineage_id, error = %e, "Lineage task failed");
                    Err(CritiqError::Task(format!("lineage {}: {}", lineage_id, e)))
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}
