use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tokio_cron_scheduler::{Job, JobScheduler as TokioCronScheduler};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::{ScheduleAdapter, interval_to_cron};
use crate::models::{WorkflowDefinition, WorkflowStatus};

/// tokio-cron-scheduler expects a leading seconds field.
pub fn with_seconds(cron: &str) -> String {
    if cron.split_whitespace().count() == 5 {
        format!("0 {cron}")
    } else {
        cron.to_string()
    }
}

#[derive(Debug, Clone)]
struct Registration {
    workflow_id: String,
    cron: String,
    /// Cron job currently installed; `None` while paused
    job_id: Option<Uuid>,
}

/// In-process schedule backend.
///
/// Handles stay stable across pause and resume; pausing only removes the cron
/// job. Firing forwards the workflow id to the run queue.
pub struct LocalScheduler {
    scheduler: Arc<Mutex<TokioCronScheduler>>,
    registrations: DashMap<String, Registration>,
    runs: mpsc::UnboundedSender<String>,
}

fn scheduler_error(e: impl std::error::Error + Send + Sync + 'static) -> AppError {
    AppError::Internal {
        source: anyhow::Error::from(e),
    }
}

impl LocalScheduler {
    pub async fn new(runs: mpsc::UnboundedSender<String>) -> AppResult<Self> {
        let scheduler = TokioCronScheduler::new().await.map_err(scheduler_error)?;

        Ok(Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            registrations: DashMap::new(),
            runs,
        })
    }

    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .lock()
            .await
            .start()
            .await
            .map_err(scheduler_error)
    }

    pub async fn stop(&self) -> AppResult<()> {
        self.scheduler
            .lock()
            .await
            .shutdown()
            .await
            .map_err(scheduler_error)
    }

    /// Re-registers stored schedules after a restart, keeping their handles.
    pub async fn restore(&self, definitions: &[WorkflowDefinition]) -> AppResult<usize> {
        let mut restored = 0;
        for definition in definitions {
            let Some(handle) = definition.schedule_handle() else {
                continue;
            };
            let cron = interval_to_cron(definition.refresh_interval_hours);
            let job_id = match definition.status {
                WorkflowStatus::Active => {
                    Some(self.install(&definition.workflow_definition_id, &cron).await?)
                }
                WorkflowStatus::Paused => None,
            };
            self.registrations.insert(
                handle.to_string(),
                Registration {
                    workflow_id: definition.workflow_definition_id.clone(),
                    cron,
                    job_id,
                },
            );
            restored += 1;
        }
        info!(restored, "Local schedules restored");
        Ok(restored)
    }

    pub fn is_active(&self, handle: &str) -> bool {
        self.registrations
            .get(handle)
            .is_some_and(|r| r.job_id.is_some())
    }

    async fn install(&self, workflow_id: &str, cron: &str) -> AppResult<Uuid> {
        let runs = self.runs.clone();
        let workflow_id = workflow_id.to_string();
        let job = Job::new_async(with_seconds(cron).as_str(), move |_uuid, _lock| {
            let runs = runs.clone();
            let workflow_id = workflow_id.clone();
            Box::pin(async move {
                debug!(workflow_definition_id = %workflow_id, "Schedule fired");
                if runs.send(workflow_id.clone()).is_err() {
                    warn!(workflow_definition_id = %workflow_id, "Run queue closed, scheduled run dropped");
                }
            })
        })
        .map_err(|e| AppError::BadRequest {
            message: format!("Invalid cron expression: {}", e),
        })?;

        self.scheduler
            .lock()
            .await
            .add(job)
            .await
            .map_err(scheduler_error)
    }

    async fn uninstall(&self, job_id: Uuid) -> AppResult<()> {
        self.scheduler
            .lock()
            .await
            .remove(&job_id)
            .await
            .map_err(scheduler_error)
    }

    fn registration(&self, handle: &str) -> AppResult<Registration> {
        self.registrations
            .get(handle)
            .map(|r| r.clone())
            .ok_or_else(|| AppError::not_found("schedule", "handle", handle))
    }
}

#[async_trait]
impl ScheduleAdapter for LocalScheduler {
    async fn create(&self, workflow_id: &str, interval_hours: i32) -> AppResult<String> {
        let cron = interval_to_cron(interval_hours);
        let job_id = self.install(workflow_id, &cron).await?;
        let handle = format!("local-{}", Uuid::new_v4());
        self.registrations.insert(
            handle.clone(),
            Registration {
                workflow_id: workflow_id.to_string(),
                cron,
                job_id: Some(job_id),
            },
        );
        info!(workflow_definition_id = workflow_id, schedule_id = %handle, "Local schedule created");
        Ok(handle)
    }

    async fn update(&self, handle: &str, workflow_id: &str, cron: &str) -> AppResult<String> {
        let mut registration = self.registration(handle)?;
        if let Some(job_id) = registration.job_id {
            self.uninstall(job_id).await?;
            registration.job_id = Some(self.install(workflow_id, cron).await?);
        }
        registration.workflow_id = workflow_id.to_string();
        registration.cron = cron.to_string();
        self.registrations.insert(handle.to_string(), registration);
        Ok(handle.to_string())
    }

    async fn pause(&self, handle: &str) -> AppResult<()> {
        let mut registration = self.registration(handle)?;
        if let Some(job_id) = registration.job_id.take() {
            self.uninstall(job_id).await?;
            self.registrations.insert(handle.to_string(), registration);
        }
        Ok(())
    }

    async fn resume(&self, handle: &str) -> AppResult<()> {
        let mut registration = self.registration(handle)?;
        if registration.job_id.is_none() {
            registration.job_id = Some(
                self.install(&registration.workflow_id, &registration.cron)
                    .await?,
            );
            self.registrations.insert(handle.to_string(), registration);
        }
        Ok(())
    }

    async fn delete(&self, handle: &str) -> AppResult<()> {
        if let Some((_, registration)) = self.registrations.remove(handle)
            && let Some(job_id) = registration.job_id
        {
            self.uninstall(job_id).await?;
        }
        Ok(())
    }
}
