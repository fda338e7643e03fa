//! Workflow definitions, channel links and channel data owned by users.
//!
//! Database changes commit first; the external schedule follows on a
//! best-effort basis except where a missing schedule would break the
//! "interval > 0 has a handle" rule, in which case the failure is returned.

use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::{MAX_INTERVAL_HOURS, ScheduleAdapter, interval_to_cron};
use crate::models::{
    Channel, ChannelMetadata, NewChannel, NewMessage, NewWorkflowDefinition,
    UpdateWorkflowDefinition, WorkflowDefinition, WorkflowStatus, WorkflowValue,
};
use crate::repositories::{MessageStore, WorkflowStore};
use crate::services::credit::CreditLedger;
use crate::services::workflow::RetrievalStrategy;

pub const MAX_VALUES_PAGE: i64 = 100;

/// Fields of a new workflow.
#[derive(Debug, Clone)]
pub struct WorkflowDraft {
    pub name: String,
    pub prompt: String,
    pub model: String,
    pub refresh_interval_hours: i32,
    pub strategy: RetrievalStrategy,
    pub is_private: bool,
    pub channel_ids: Vec<String>,
}

/// Edit of an existing workflow; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct WorkflowPatch {
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub refresh_interval_hours: Option<i32>,
    pub strategy: Option<RetrievalStrategy>,
    pub is_private: Option<bool>,
}

/// A channel as reported by the sync layer.
#[derive(Debug, Clone)]
pub struct ChannelDraft {
    pub channel_id: String,
    pub data_type: String,
    pub data_id: String,
    pub metadata: ChannelMetadata,
    pub is_public: bool,
    pub is_free: bool,
    pub subscription_fee: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SlotStats {
    pub total_workflows: i32,
    pub used_workflows: i64,
}

/// Column values of a retrieval strategy: (strategy, count, window value, window unit).
fn strategy_columns(strategy: &RetrievalStrategy) -> (String, i32, i32, String) {
    match strategy {
        RetrievalStrategy::LatestN { count } => (
            "latest_n".to_string(),
            i32::try_from(*count).unwrap_or(i32::MAX),
            24,
            "hours".to_string(),
        ),
        RetrievalStrategy::PastTime { value, unit } => (
            "past_time".to_string(),
            100,
            i32::try_from(*value).unwrap_or(i32::MAX),
            unit.as_str().to_string(),
        ),
    }
}

fn validate_interval(hours: i32) -> AppResult<()> {
    if !(0..=MAX_INTERVAL_HOURS).contains(&hours) {
        return Err(AppError::Validation {
            field: "refresh_interval_hours".to_string(),
            reason: format!("must be 0 (manual) or between 1 and {MAX_INTERVAL_HOURS} hours"),
        });
    }
    Ok(())
}

#[derive(Clone)]
pub struct WorkflowService {
    workflows: Arc<dyn WorkflowStore>,
    messages: Arc<dyn MessageStore>,
    schedules: Arc<dyn ScheduleAdapter>,
    ledger: CreditLedger,
}

impl WorkflowService {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        messages: Arc<dyn MessageStore>,
        schedules: Arc<dyn ScheduleAdapter>,
        ledger: CreditLedger,
    ) -> Self {
        Self {
            workflows,
            messages,
            schedules,
            ledger,
        }
    }

    /// Creates a workflow if the user has a free slot, registering its schedule.
    pub async fn create(&self, user_id: &str, draft: WorkflowDraft) -> AppResult<WorkflowDefinition> {
        validate_interval(draft.refresh_interval_hours)?;
        let stats = self.slot_stats(user_id).await?;
        if stats.used_workflows >= i64::from(stats.total_workflows) {
            return Err(AppError::WorkflowLimitReached {
                used: stats.used_workflows,
                allowance: stats.total_workflows,
            });
        }
        self.ensure_linkable(user_id, &draft.channel_ids).await?;

        let workflow_id = Uuid::new_v4().to_string();
        let (message_strategy, message_count, time_window_value, time_window_unit) =
            strategy_columns(&draft.strategy);
        let definition = self
            .workflows
            .insert_definition(NewWorkflowDefinition {
                workflow_definition_id: workflow_id.clone(),
                user_id: user_id.to_string(),
                name: draft.name,
                prompt: draft.prompt,
                model: draft.model,
                refresh_interval_hours: draft.refresh_interval_hours,
                schedule_id: String::new(),
                status: WorkflowStatus::Active,
                message_strategy,
                message_count,
                time_window_value,
                time_window_unit,
                is_private: draft.is_private,
            })
            .await?;

        if !draft.channel_ids.is_empty() {
            self.workflows
                .link_channels(std::slice::from_ref(&workflow_id), &draft.channel_ids)
                .await?;
        }

        if draft.refresh_interval_hours > 0 {
            let handle = match self
                .schedules
                .create(&workflow_id, draft.refresh_interval_hours)
                .await
            {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(workflow_definition_id = %workflow_id, error = %e, "Schedule registration failed, removing workflow");
                    if let Err(cleanup) = self.workflows.delete_definition(&workflow_id).await {
                        warn!(workflow_definition_id = %workflow_id, error = %cleanup, "Could not remove workflow");
                    }
                    return Err(e);
                }
            };
            self.workflows
                .set_schedule_handle(&workflow_id, &handle)
                .await?;
            info!(workflow_definition_id = %workflow_id, schedule_id = %handle, "Workflow created with schedule");
            return self.owned(user_id, &workflow_id).await;
        }

        info!(workflow_definition_id = %workflow_id, "Workflow created");
        Ok(definition)
    }

    /// Applies an edit and reconciles the schedule with the new interval.
    pub async fn update(
        &self,
        user_id: &str,
        workflow_id: &str,
        patch: WorkflowPatch,
    ) -> AppResult<WorkflowDefinition> {
        let definition = self.owned(user_id, workflow_id).await?;

        let mut changes = UpdateWorkflowDefinition {
            name: patch.name,
            prompt: patch.prompt,
            model: patch.model,
            refresh_interval_hours: patch.refresh_interval_hours,
            is_private: patch.is_private,
            ..Default::default()
        };
        if let Some(strategy) = &patch.strategy {
            let (kind, count, window_value, window_unit) = strategy_columns(strategy);
            changes.message_strategy = Some(kind);
            changes.message_count = Some(count);
            changes.time_window_value = Some(window_value);
            changes.time_window_unit = Some(window_unit);
        }

        if let Some(hours) = patch.refresh_interval_hours
            && hours != definition.refresh_interval_hours
        {
            validate_interval(hours)?;
            changes.schedule_id = self.reconcile_schedule(&definition, hours).await?;
        }

        self.workflows.update_definition(workflow_id, changes).await
    }

    /// Returns the new schedule handle column value, if it changes.
    async fn reconcile_schedule(
        &self,
        definition: &WorkflowDefinition,
        hours: i32,
    ) -> AppResult<Option<String>> {
        let workflow_id = &definition.workflow_definition_id;
        match (definition.schedule_handle(), hours > 0) {
            (Some(handle), true) => {
                let updated = self
                    .schedules
                    .update(handle, workflow_id, &interval_to_cron(hours))
                    .await?;
                Ok(Some(updated))
            }
            (None, true) => Ok(Some(self.schedules.create(workflow_id, hours).await?)),
            (Some(handle), false) => {
                if let Err(e) = self.schedules.delete(handle).await {
                    warn!(workflow_definition_id = %workflow_id, schedule_id = handle, error = %e, "Schedule delete failed");
                }
                Ok(Some(String::new()))
            }
            (None, false) => Ok(None),
        }
    }

    /// Sets the status, then pauses or resumes the schedule to match.
    pub async fn set_status(
        &self,
        user_id: &str,
        workflow_id: &str,
        status: WorkflowStatus,
    ) -> AppResult<WorkflowDefinition> {
        self.owned(user_id, workflow_id).await?;
        let definition = self
            .workflows
            .update_definition(
                workflow_id,
                UpdateWorkflowDefinition {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(handle) = definition.schedule_handle() {
            let result = match status {
                WorkflowStatus::Active => self.schedules.resume(handle).await,
                WorkflowStatus::Paused => self.schedules.pause(handle).await,
            };
            if let Err(e) = result {
                warn!(workflow_definition_id = workflow_id, schedule_id = handle, %status, error = %e, "Schedule state not updated");
            }
        }
        info!(workflow_definition_id = workflow_id, %status, "Workflow status changed");
        Ok(definition)
    }

    /// Cancels the schedule, then removes values, links and the definition together.
    pub async fn delete(&self, user_id: &str, workflow_id: &str) -> AppResult<()> {
        let definition = self.owned(user_id, workflow_id).await?;
        if let Some(handle) = definition.schedule_handle()
            && let Err(e) = self.schedules.delete(handle).await
        {
            warn!(workflow_definition_id = workflow_id, schedule_id = handle, error = %e, "Schedule delete failed");
        }
        self.workflows.delete_definition(workflow_id).await?;
        info!(workflow_definition_id = workflow_id, "Workflow deleted");
        Ok(())
    }

    /// Readable by its owner, or by anyone when public.
    pub async fn get(&self, user_id: &str, workflow_id: &str) -> AppResult<WorkflowDefinition> {
        let definition = self.find(workflow_id).await?;
        if definition.user_id != user_id && definition.is_private {
            return Err(AppError::Forbidden {
                message: format!("workflow {workflow_id} is private"),
            });
        }
        Ok(definition)
    }

    pub async fn list(&self, user_id: &str) -> AppResult<Vec<WorkflowDefinition>> {
        self.workflows.list_definitions(user_id).await
    }

    /// Aggregate values, newest version first.
    pub async fn values(
        &self,
        user_id: &str,
        workflow_id: &str,
        limit: i64,
    ) -> AppResult<Vec<WorkflowValue>> {
        self.get(user_id, workflow_id).await?;
        self.workflows
            .aggregate_values(workflow_id, limit.clamp(1, MAX_VALUES_PAGE))
            .await
    }

    pub async fn slot_stats(&self, user_id: &str) -> AppResult<SlotStats> {
        let account = self.ledger.account(user_id).await?;
        let used = self.workflows.count_definitions(user_id).await?;
        Ok(SlotStats {
            total_workflows: account.workflows,
            used_workflows: used,
        })
    }

    pub async fn link_channels(
        &self,
        user_id: &str,
        workflow_id: &str,
        channel_ids: &[String],
    ) -> AppResult<usize> {
        self.owned(user_id, workflow_id).await?;
        self.ensure_linkable(user_id, channel_ids).await?;
        self.workflows
            .link_channels(&[workflow_id.to_string()], channel_ids)
            .await
    }

    pub async fn unlink_channels(
        &self,
        user_id: &str,
        workflow_id: &str,
        channel_ids: &[String],
    ) -> AppResult<usize> {
        self.owned(user_id, workflow_id).await?;
        self.workflows.unlink_channels(workflow_id, channel_ids).await
    }

    /// Creates or refreshes a channel. A channel id belongs to whoever registered it first.
    pub async fn upsert_channel(&self, user_id: &str, draft: ChannelDraft) -> AppResult<Channel> {
        if draft.subscription_fee < BigDecimal::zero() {
            return Err(AppError::Validation {
                field: "subscription_fee".to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        if let Some(existing) = self.workflows.find_channel(&draft.channel_id).await?
            && existing.user_id != user_id
        {
            return Err(AppError::Forbidden {
                message: format!("channel {} belongs to another user", draft.channel_id),
            });
        }

        let metadata = serde_json::to_value(&draft.metadata)
            .map_err(|e| anyhow::anyhow!("failed to encode channel metadata: {e}"))?;
        self.workflows
            .upsert_channel(NewChannel {
                channel_id: draft.channel_id,
                user_id: user_id.to_string(),
                data_type: draft.data_type,
                data_id: draft.data_id,
                metadata,
                is_public: draft.is_public,
                is_free: draft.is_free,
                subscription_fee: draft.subscription_fee,
                last_synced_at: Some(Utc::now()),
            })
            .await
    }

    /// Stores messages of an owned channel, ignoring ones already present.
    pub async fn ingest_messages(
        &self,
        user_id: &str,
        channel_id: &str,
        mut batch: Vec<NewMessage>,
    ) -> AppResult<usize> {
        let channel = self
            .workflows
            .find_channel(channel_id)
            .await?
            .ok_or_else(|| AppError::not_found("channel", "channel_id", channel_id))?;
        if channel.user_id != user_id {
            return Err(AppError::Forbidden {
                message: format!("channel {channel_id} belongs to another user"),
            });
        }

        for message in &mut batch {
            message.channel_id = channel_id.to_string();
        }
        let submitted = batch.len();
        let inserted = self.messages.ingest(batch).await?;
        info!(channel_id, submitted, inserted, "Messages ingested");
        Ok(inserted)
    }

    async fn find(&self, workflow_id: &str) -> AppResult<WorkflowDefinition> {
        self.workflows
            .find_definition(workflow_id)
            .await?
            .ok_or_else(|| AppError::not_found("workflow_definition", "id", workflow_id))
    }

    /// The definition if `user_id` owns it; Forbidden otherwise.
    pub async fn owned(&self, user_id: &str, workflow_id: &str) -> AppResult<WorkflowDefinition> {
        let definition = self.find(workflow_id).await?;
        if definition.user_id != user_id {
            return Err(AppError::Forbidden {
                message: format!("workflow {workflow_id} belongs to another user"),
            });
        }
        Ok(definition)
    }

    /// Every channel must exist and be public or owned by the user.
    async fn ensure_linkable(&self, user_id: &str, channel_ids: &[String]) -> AppResult<()> {
        if channel_ids.is_empty() {
            return Ok(());
        }
        let channels = self.workflows.find_channels(channel_ids).await?;
        for channel_id in channel_ids {
            let channel = channels
                .iter()
                .find(|c| &c.channel_id == channel_id)
                .ok_or_else(|| AppError::not_found("channel", "channel_id", channel_id))?;
            if !channel.is_public && channel.user_id != user_id {
                return Err(AppError::Forbidden {
                    message: format!("channel {channel_id} is private"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::config::CreditsConfig;
    use crate::models::ValueStatus;
    use crate::repositories::memory::{MemoryStore, sample_channel, sample_message};
    use crate::services::workflow::WindowUnit;
    use crate::services::workflow::processor::testing::RecordingScheduler;

    fn service(store: &Arc<MemoryStore>, scheduler: &Arc<RecordingScheduler>) -> WorkflowService {
        let ledger = CreditLedger::new(store.clone(), CreditsConfig::default());
        WorkflowService::new(store.clone(), store.clone(), scheduler.clone(), ledger)
    }

    fn draft(interval: i32) -> WorkflowDraft {
        WorkflowDraft {
            name: "Daily digest".to_string(),
            prompt: "Summarize".to_string(),
            model: "google/gemini-2.0-flash-001".to_string(),
            refresh_interval_hours: interval,
            strategy: RetrievalStrategy::PastTime {
                value: 2,
                unit: WindowUnit::Days,
            },
            is_private: false,
            channel_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_create_registers_schedule() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service(&store, &scheduler);

        let created = service.create("u1", draft(6)).await.unwrap();

        let id = &created.workflow_definition_id;
        assert_eq!(created.schedule_id, format!("sched-{id}"));
        assert_eq!(created.message_strategy, "past_time");
        assert_eq!(created.time_window_value, 2);
        assert_eq!(created.time_window_unit, "days");
        assert_eq!(scheduler.calls(), vec![format!("create {id} 6")]);
    }

    #[tokio::test]
    async fn test_manual_workflow_has_no_schedule() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service(&store, &scheduler);

        let created = service.create("u1", draft(0)).await.unwrap();

        assert_eq!(created.schedule_handle(), None);
        assert!(scheduler.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_beyond_allowance_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service(&store, &scheduler);
        service.create("u1", draft(0)).await.unwrap();

        let result = service.create("u1", draft(0)).await;

        assert!(matches!(
            result,
            Err(AppError::WorkflowLimitReached { used: 1, allowance: 1 })
        ));
        assert_eq!(service.list("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_failure_rolls_back_creation() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::failing());
        let service = service(&store, &scheduler);

        let result = service.create("u1", draft(12)).await;

        assert!(matches!(result, Err(AppError::ExternalCall { .. })));
        assert!(service.list("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_interval_beyond_a_day_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service(&store, &scheduler);

        let result = service.create("u1", draft(48)).await;
        assert!(matches!(result, Err(AppError::Validation { .. })));

        let created = service.create("u1", draft(24)).await.unwrap();
        let result = service
            .update(
                "u1",
                &created.workflow_definition_id,
                WorkflowPatch {
                    refresh_interval_hours: Some(168),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
        assert_eq!(scheduler.calls(), vec![format!("create {} 24", created.workflow_definition_id)]);
    }

    #[tokio::test]
    async fn test_interval_changes_reconcile_schedule() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service(&store, &scheduler);
        let created = service.create("u1", draft(0)).await.unwrap();
        let id = created.workflow_definition_id.clone();

        let scheduled = service
            .update(
                "u1",
                &id,
                WorkflowPatch {
                    refresh_interval_hours: Some(4),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(scheduled.schedule_id, format!("sched-{id}"));

        service
            .update(
                "u1",
                &id,
                WorkflowPatch {
                    refresh_interval_hours: Some(8),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let manual = service
            .update(
                "u1",
                &id,
                WorkflowPatch {
                    refresh_interval_hours: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(manual.schedule_handle(), None);
        assert_eq!(
            scheduler.calls(),
            vec![
                format!("create {id} 4"),
                format!("update sched-{id} {id} 0 */8 * * *"),
                format!("delete sched-{id}"),
            ]
        );
    }

    #[tokio::test]
    async fn test_status_toggle_survives_scheduler_failure() {
        let store = Arc::new(MemoryStore::new());
        let ok = Arc::new(RecordingScheduler::default());
        let created = service(&store, &ok).create("u1", draft(6)).await.unwrap();
        let id = created.workflow_definition_id;

        let failing = Arc::new(RecordingScheduler::failing());
        let paused = service(&store, &failing)
            .set_status("u1", &id, WorkflowStatus::Paused)
            .await
            .unwrap();

        assert_eq!(paused.status, WorkflowStatus::Paused);
        assert_eq!(failing.calls(), vec![format!("pause sched-{id}")]);
    }

    #[tokio::test]
    async fn test_delete_cascades_and_cancels_schedule() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service(&store, &scheduler);
        store.upsert_channel(sample_channel("chan-a", "u1")).await.unwrap();
        let mut with_channel = draft(6);
        with_channel.channel_ids = vec!["chan-a".to_string()];
        let created = service.create("u1", with_channel).await.unwrap();
        let id = created.workflow_definition_id;
        assert_eq!(store.link_count(), 1);

        service.delete("u1", &id).await.unwrap();

        assert_eq!(store.link_count(), 0);
        assert!(store.definition(&id).is_none());
        assert!(scheduler.calls().contains(&format!("delete sched-{id}")));
        // the channel itself survives
        assert!(store.find_channel("chan-a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_foreign_workflow_is_forbidden() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service(&store, &scheduler);
        let mut private = draft(0);
        private.is_private = true;
        let id = service.create("u1", private).await.unwrap().workflow_definition_id;

        assert!(matches!(service.delete("u2", &id).await, Err(AppError::Forbidden { .. })));
        assert!(matches!(service.get("u2", &id).await, Err(AppError::Forbidden { .. })));
        assert!(service.get("u1", &id).await.is_ok());
    }

    #[tokio::test]
    async fn test_private_channel_of_another_user_cannot_be_linked() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service(&store, &scheduler);
        let mut private = sample_channel("secret", "someone-else");
        private.is_public = false;
        store.upsert_channel(private).await.unwrap();
        let id = service.create("u1", draft(0)).await.unwrap().workflow_definition_id;

        let forbidden = service
            .link_channels("u1", &id, &["secret".to_string()])
            .await;
        let missing = service
            .link_channels("u1", &id, &["nowhere".to_string()])
            .await;

        assert!(matches!(forbidden, Err(AppError::Forbidden { .. })));
        assert!(matches!(missing, Err(AppError::NotFound { .. })));
        assert_eq!(store.link_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_owner_is_fixed_by_first_registration() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service(&store, &scheduler);
        let channel = ChannelDraft {
            channel_id: "chan-a".to_string(),
            data_type: "telegram".to_string(),
            data_id: "-100123".to_string(),
            metadata: ChannelMetadata {
                name: Some("Rust news".to_string()),
                ..Default::default()
            },
            is_public: true,
            is_free: false,
            subscription_fee: BigDecimal::from_str("2.5").unwrap(),
        };

        let stored = service.upsert_channel("publisher", channel.clone()).await.unwrap();
        assert!(stored.charges_subscription());
        assert_eq!(stored.typed_metadata().name.as_deref(), Some("Rust news"));

        let stolen = service.upsert_channel("intruder", channel).await;
        assert!(matches!(stolen, Err(AppError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_ingest_binds_messages_to_the_channel() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service(&store, &scheduler);
        store.upsert_channel(sample_channel("chan-a", "u1")).await.unwrap();
        let batch = vec![
            sample_message("elsewhere", 1, 1_000),
            sample_message("elsewhere", 2, 2_000),
            sample_message("elsewhere", 2, 2_000),
        ];

        let inserted = service.ingest_messages("u1", "chan-a", batch).await.unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(store.latest("chan-a", 10).await.unwrap().len(), 2);
        assert!(store.latest("elsewhere", 10).await.unwrap().is_empty());
        let denied = service
            .ingest_messages("u2", "chan-a", vec![sample_message("chan-a", 3, 3_000)])
            .await;
        assert!(matches!(denied, Err(AppError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_values_lists_aggregates_only() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service(&store, &scheduler);
        let id = service.create("u1", draft(0)).await.unwrap().workflow_definition_id;
        for _ in 0..3 {
            store
                .insert_value(crate::models::NewWorkflowValue::aggregate_placeholder(&id))
                .await
                .unwrap();
        }

        let values = service.values("u1", &id, 2).await.unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values[0].version, 3);
        assert!(values.iter().all(|v| v.is_aggregated && v.status == ValueStatus::Processing));
    }
}
