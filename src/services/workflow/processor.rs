//! Runs one workflow: per-channel summaries, then one aggregate summary.
//!
//! ```text
//! not_started -> per_channel -> aggregating -> completed
//!                      \              \
//!                       `-> failed <---'
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use dashmap::DashMap;
use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{Instrument, error, info, info_span, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::WorkflowConfig;
use crate::error::{AppError, AppResult};
use crate::external::ScheduleAdapter;
use crate::models::{
    Channel, ChannelMetadata, NewWorkflowValue, UpdateWorkflowValue, ValueStatus,
    WorkflowDefinition, WorkflowStatus, WorkflowValue,
};
use crate::repositories::{MessageStore, WorkflowStore};
use crate::services::agent::{AgentService, CompletionPhase};
use crate::services::workflow::{
    ContextBuilder, ContextHandle, RetrievalStrategy, TempContextStore, prompt,
    retrieve_messages,
};

/// What started a run. Only used for logging and attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    Manual,
    Scheduled,
}

impl std::fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunTrigger::Manual => write!(f, "manual"),
            RunTrigger::Scheduled => write!(f, "scheduled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    PerChannel,
    Aggregating,
    Completed,
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::PerChannel => "per_channel_processing",
            RunPhase::Aggregating => "aggregating",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No channel is linked; nothing was written
    NoChannels,
    /// Every channel was empty; the aggregate holds the no-data sentinel
    NoData { aggregate: WorkflowValue },
    Completed {
        aggregate: WorkflowValue,
        channels_processed: usize,
    },
}

type ChannelTask<'a> = Pin<Box<dyn Future<Output = AppResult<Option<ContextHandle>>> + Send + 'a>>;

#[derive(Clone)]
pub struct WorkflowProcessor {
    workflows: Arc<dyn WorkflowStore>,
    messages: Arc<dyn MessageStore>,
    agent: AgentService,
    schedules: Arc<dyn ScheduleAdapter>,
    temp_store: TempContextStore,
    builder: ContextBuilder,
    channel_concurrency: usize,
    no_data_value: String,
    run_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl WorkflowProcessor {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        messages: Arc<dyn MessageStore>,
        agent: AgentService,
        schedules: Arc<dyn ScheduleAdapter>,
        temp_store: TempContextStore,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            workflows,
            messages,
            agent,
            schedules,
            temp_store,
            builder: ContextBuilder::from_config(config),
            channel_concurrency: config.channel_concurrency.max(1),
            no_data_value: config.no_data_value.clone(),
            run_locks: Arc::new(DashMap::new()),
        }
    }

    /// Runs the workflow to completion. Overlapping runs of one workflow are refused.
    pub async fn run(&self, workflow_id: &str, trigger: RunTrigger) -> AppResult<RunOutcome> {
        self.run_as(Uuid::new_v4(), workflow_id, trigger).await
    }

    /// Same as [`run`](Self::run) with a caller-chosen correlation id.
    pub async fn run_as(
        &self,
        run_id: Uuid,
        workflow_id: &str,
        trigger: RunTrigger,
    ) -> AppResult<RunOutcome> {
        let span = info_span!(
            "workflow_run",
            %run_id,
            workflow_definition_id = workflow_id,
            %trigger
        );
        self.run_exclusive(workflow_id).instrument(span).await
    }

    async fn run_exclusive(&self, workflow_id: &str) -> AppResult<RunOutcome> {
        let lock = self
            .run_locks
            .entry(workflow_id.to_string())
            .or_default()
            .clone();
        let result = match lock.try_lock() {
            Ok(_guard) => self.run_locked(workflow_id).await,
            Err(_) => {
                warn!("Run refused, another run of this workflow is in flight");
                Err(AppError::Conflict {
                    message: format!("workflow {workflow_id} is already running"),
                })
            }
        };

        // The map and this run are the only holders when nobody else is waiting
        self.run_locks
            .remove_if(workflow_id, |_, held| Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2);
        result
    }

    async fn run_locked(&self, workflow_id: &str) -> AppResult<RunOutcome> {
        let definition = self
            .workflows
            .find_definition(workflow_id)
            .await?
            .ok_or_else(|| AppError::not_found("workflow_definition", "id", workflow_id))?;

        let links = self.workflows.channel_links(workflow_id).await?;
        if links.is_empty() {
            info!("No channels linked, nothing to do");
            return Ok(RunOutcome::NoChannels);
        }

        self.ensure_credits(&definition).await?;

        let placeholder = self
            .workflows
            .insert_value(NewWorkflowValue::aggregate_placeholder(workflow_id))
            .await?;
        info!(phase = %RunPhase::PerChannel, channels = links.len(), "Run started");

        let channel_ids: Vec<String> = links.into_iter().map(|l| l.channel_id).collect();
        let result = self.process(&definition, &channel_ids, &placeholder).await;

        if let Err(e) = &result {
            error!(phase = %RunPhase::Failed, error = %e, "Run failed");
            let failed = UpdateWorkflowValue::failed(e.failure_reason());
            if let Err(mark_err) = self
                .workflows
                .update_value(&placeholder.workflow_value_id, failed)
                .await
            {
                error!(error = %mark_err, "Could not mark aggregate value failed");
            }
        }

        let cleanup = self.temp_store.cleanup_all(workflow_id).await;
        finish_run(result, cleanup)
    }

    /// A negative balance pauses the workflow and its schedule before refusing the run.
    async fn ensure_credits(&self, definition: &WorkflowDefinition) -> AppResult<()> {
        let balance = self.agent.ledger().balance(&definition.user_id).await?;
        if balance >= BigDecimal::zero() {
            return Ok(());
        }

        warn!(user_id = %definition.user_id, balance = %balance, "Negative balance, pausing workflow");
        self.workflows
            .set_status(&definition.workflow_definition_id, WorkflowStatus::Paused)
            .await?;
        if let Some(handle) = definition.schedule_handle()
            && let Err(e) = self.schedules.pause(handle).await
        {
            warn!(schedule_id = handle, error = %e, "Schedule pause failed");
        }

        Err(AppError::insufficient_credits(format!(
            "balance of {} is {balance}",
            definition.user_id
        )))
    }

    async fn process(
        &self,
        definition: &WorkflowDefinition,
        channel_ids: &[String],
        placeholder: &WorkflowValue,
    ) -> AppResult<RunOutcome> {
        let channels: HashMap<String, Channel> = self
            .workflows
            .find_channels(channel_ids)
            .await?
            .into_iter()
            .map(|c| (c.channel_id.clone(), c))
            .collect();
        let strategy = RetrievalStrategy::for_definition(definition);
        let now_ms = Utc::now().timestamp_millis();

        // Fail fast: the first channel error aborts the collection
        let tasks: Vec<ChannelTask<'_>> = channel_ids
            .iter()
            .map(|channel_id| {
                Box::pin(self.process_channel(
                    definition,
                    channel_id,
                    channels.get(channel_id),
                    &strategy,
                    now_ms,
                )) as ChannelTask<'_>
            })
            .collect();
        let handles: Vec<Option<ContextHandle>> = stream::iter(tasks)
            .buffer_unordered(self.channel_concurrency)
            .try_collect()
            .await?;
        let handles: Vec<ContextHandle> = handles.into_iter().flatten().collect();

        if handles.is_empty() {
            info!(phase = %RunPhase::Completed, "All channels empty, skipping aggregation");
            let aggregate = self
                .workflows
                .update_value(
                    &placeholder.workflow_value_id,
                    UpdateWorkflowValue::completed(
                        self.no_data_value.clone(),
                        BigDecimal::zero(),
                        String::new(),
                    ),
                )
                .await?;
            return Ok(RunOutcome::NoData { aggregate });
        }

        info!(phase = %RunPhase::Aggregating, contexts = handles.len(), "Aggregating");
        let mut contexts = Vec::with_capacity(handles.len());
        for handle in &handles {
            contexts.push(self.temp_store.read(handle).await?);
        }
        contexts.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));

        let output = self
            .agent
            .complete(
                &definition.user_id,
                prompt::aggregate_prompt(&definition.prompt, &contexts),
                &definition.model,
                &definition.workflow_definition_id,
                CompletionPhase::Aggregate,
            )
            .await?;

        let aggregate = self
            .workflows
            .update_value(
                &placeholder.workflow_value_id,
                UpdateWorkflowValue::completed(output.content, output.confidence, output.reason),
            )
            .await?;
        info!(phase = %RunPhase::Completed, channels = handles.len(), "Run completed");

        Ok(RunOutcome::Completed {
            aggregate,
            channels_processed: handles.len(),
        })
    }

    /// Summarizes one channel. `None` means the channel had nothing to contribute.
    async fn process_channel(
        &self,
        definition: &WorkflowDefinition,
        channel_id: &str,
        channel: Option<&Channel>,
        strategy: &RetrievalStrategy,
        now_ms: i64,
    ) -> AppResult<Option<ContextHandle>> {
        let workflow_id = &definition.workflow_definition_id;
        let messages =
            retrieve_messages(self.messages.as_ref(), channel_id, strategy, now_ms).await?;
        if messages.is_empty() {
            info!(channel_id, "Skipping channel without messages");
            return Ok(None);
        }
        let channel =
            channel.ok_or_else(|| AppError::not_found("channel", "channel_id", channel_id))?;

        let metadata: ChannelMetadata = channel.typed_metadata();
        let Some(context) = self.builder.build(channel_id, &metadata, messages) else {
            return Ok(None);
        };
        let handle = self.temp_store.write(workflow_id, channel_id, &context).await?;

        let output = self
            .agent
            .complete(
                &definition.user_id,
                prompt::channel_prompt(&definition.prompt, &context),
                &definition.model,
                workflow_id,
                CompletionPhase::Channel,
            )
            .await?;

        self.workflows
            .insert_value(NewWorkflowValue {
                workflow_definition_id: workflow_id.clone(),
                channel_id: channel_id.to_string(),
                value: output.content,
                confidence: output.confidence,
                reason: output.reason,
                status: ValueStatus::Completed,
                is_aggregated: false,
            })
            .await?;
        info!(channel_id, messages = context.messages.len(), cost = %output.cost, "Channel summarized");

        Ok(Some(handle))
    }
}

/// The run result wins over the cleanup result. A cleanup failure is logged;
/// the persisted values already describe the run, so it does not turn a
/// finished run into an error.
fn finish_run(
    result: AppResult<RunOutcome>,
    cleanup: AppResult<usize>,
) -> AppResult<RunOutcome> {
    if let Err(e) = &cleanup {
        warn!(error = %e, "Temp context cleanup failed");
    }
    result
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Schedule adapter that records calls and hands out sequential handles.
    #[derive(Default)]
    pub struct RecordingScheduler {
        pub calls: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingScheduler {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> AppResult<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                return Err(AppError::external("scheduler", "unavailable"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ScheduleAdapter for RecordingScheduler {
        async fn create(&self, workflow_id: &str, interval_hours: i32) -> AppResult<String> {
            self.record(format!("create {workflow_id} {interval_hours}"))?;
            Ok(format!("sched-{workflow_id}"))
        }

        async fn update(&self, handle: &str, workflow_id: &str, cron: &str) -> AppResult<String> {
            self.record(format!("update {handle} {workflow_id} {cron}"))?;
            Ok(handle.to_string())
        }

        async fn pause(&self, handle: &str) -> AppResult<()> {
            self.record(format!("pause {handle}"))
        }

        async fn resume(&self, handle: &str) -> AppResult<()> {
            self.record(format!("resume {handle}"))
        }

        async fn delete(&self, handle: &str) -> AppResult<()> {
            self.record(format!("delete {handle}"))
        }
    }
}
