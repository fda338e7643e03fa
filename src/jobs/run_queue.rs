use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::workflow::{RunOutcome, RunTrigger, WorkflowProcessor};

/// Receipt for a dispatched run. Progress is visible through the workflow values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RunTicket {
    pub run_id: Uuid,
    pub workflow_definition_id: String,
    pub trigger: RunTrigger,
}

/// Detached workflow runs, tracked so shutdown can wait for them.
#[derive(Clone)]
pub struct RunQueue {
    processor: WorkflowProcessor,
    tracker: TaskTracker,
}

impl RunQueue {
    pub fn new(processor: WorkflowProcessor) -> Self {
        Self {
            processor,
            tracker: TaskTracker::new(),
        }
    }

    pub fn processor(&self) -> &WorkflowProcessor {
        &self.processor
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Starts the run in the background and returns at once.
    pub fn submit(&self, workflow_id: &str, trigger: RunTrigger) -> AppResult<RunTicket> {
        if self.tracker.is_closed() {
            return Err(AppError::Conflict {
                message: "server is shutting down, no new runs accepted".to_string(),
            });
        }

        let ticket = RunTicket {
            run_id: Uuid::new_v4(),
            workflow_definition_id: workflow_id.to_string(),
            trigger,
        };
        let processor = self.processor.clone();
        let run_id = ticket.run_id;
        let workflow_id = ticket.workflow_definition_id.clone();
        self.tracker.spawn(async move {
            match processor.run_as(run_id, &workflow_id, trigger).await {
                Ok(RunOutcome::Completed {
                    channels_processed, ..
                }) => info!(%run_id, workflow_definition_id = %workflow_id, channels_processed, "Run finished"),
                Ok(outcome) => info!(%run_id, workflow_definition_id = %workflow_id, ?outcome, "Run finished without aggregation"),
                Err(e @ AppError::Conflict { .. }) => {
                    warn!(%run_id, workflow_definition_id = %workflow_id, error = %e, "Run skipped")
                }
                Err(e) => {
                    error!(%run_id, workflow_definition_id = %workflow_id, error = %e, "Run failed")
                }
            }
        });

        Ok(ticket)
    }

    /// Feeds schedule firings from the local scheduler into the queue.
    pub fn forward_scheduled(&self, mut fired: mpsc::UnboundedReceiver<String>) {
        let queue = self.clone();
        tokio::spawn(async move {
            while let Some(workflow_id) = fired.recv().await {
                if let Err(e) = queue.submit(&workflow_id, RunTrigger::Scheduled) {
                    warn!(workflow_definition_id = %workflow_id, error = %e, "Scheduled run not started");
                }
            }
        });
    }

    /// Stops accepting runs and waits up to `grace` for in-flight ones.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        let in_flight = self.tracker.len();
        if in_flight == 0 {
            return;
        }

        info!(in_flight, "Waiting for workflow runs to finish");
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                in_flight = self.tracker.len(),
                "Grace period elapsed with runs still in flight"
            );
        }
    }
}
