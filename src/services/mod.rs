//! Service layer for business logic operations.
//!
//! Services encapsulate business logic and coordinate between
//! stores, the model client and the schedule backend.

pub mod agent;
pub mod credit;
pub mod workflow;

use std::sync::Arc;

use crate::config::Settings;
use crate::external::{ChatModel, ScheduleAdapter};
use crate::jobs::RunQueue;
use crate::repositories::Repositories;
use agent::AgentService;
use credit::CreditLedger;
use workflow::{TempContextStore, WorkflowProcessor, WorkflowService};

/// Aggregates all services for convenient access.
///
/// Cloning is cheap since everything inside is reference counted.
#[derive(Clone)]
pub struct Services {
    pub credits: CreditLedger,
    pub workflows: WorkflowService,
    pub runs: RunQueue,
}

impl Services {
    pub fn new(
        repos: Repositories,
        settings: &Settings,
        model: Arc<dyn ChatModel>,
        schedules: Arc<dyn ScheduleAdapter>,
    ) -> Self {
        let credits = CreditLedger::new(repos.ledger.clone(), settings.credits.clone());
        let agent = AgentService::new(
            model,
            credits.clone(),
            repos.workflows.clone(),
            &settings.llm,
        );
        let processor = WorkflowProcessor::new(
            repos.workflows.clone(),
            repos.messages.clone(),
            agent,
            schedules.clone(),
            TempContextStore::new(settings.workflow.resolved_temp_dir()),
            &settings.workflow,
        );
        let workflows = WorkflowService::new(
            repos.workflows,
            repos.messages,
            schedules,
            credits.clone(),
        );

        Self {
            credits,
            workflows,
            runs: RunQueue::new(processor),
        }
    }

    pub fn processor(&self) -> &WorkflowProcessor {
        self.runs.processor()
    }
}
