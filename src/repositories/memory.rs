//! In-memory store used by service tests.
//!
//! Implements all three store traits over one mutex-guarded state so that a
//! ledger batch is applied to a working copy and only committed when every
//! movement succeeds.

use std::sync::Mutex;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::credit_repo::settlement_error;
use crate::error::{AppError, AppResult};
use crate::models::{
    Channel, ChannelWorkflow, CreditConsumptionLog, LedgerBatch, Message, NewChannel, NewMessage,
    NewWorkflowDefinition, NewWorkflowValue, UpdateWorkflowDefinition, UpdateWorkflowValue,
    UsageFilter, UsageReport, UserCredit, WorkflowDefinition, WorkflowStatus, WorkflowValue,
};
use crate::repositories::{LedgerStore, MessageStore, WorkflowStore};

#[derive(Default)]
struct State {
    next_id: i64,
    definitions: Vec<WorkflowDefinition>,
    channels: Vec<Channel>,
    links: Vec<ChannelWorkflow>,
    values: Vec<WorkflowValue>,
    messages: Vec<Message>,
    accounts: Vec<UserCredit>,
    logs: Vec<CreditConsumptionLog>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    failing_account: Mutex<Option<String>>,
}

pub fn sample_definition(workflow_id: &str, user_id: &str) -> NewWorkflowDefinition {
    NewWorkflowDefinition {
        workflow_definition_id: workflow_id.to_string(),
        user_id: user_id.to_string(),
        name: format!("{workflow_id} digest"),
        prompt: "Summarize the discussion.".to_string(),
        model: "google/gemini-2.0-flash-001".to_string(),
        refresh_interval_hours: 0,
        schedule_id: String::new(),
        status: WorkflowStatus::Paused,
        message_strategy: "latest_n".to_string(),
        message_count: 100,
        time_window_value: 24,
        time_window_unit: "hours".to_string(),
        is_private: false,
    }
}

pub fn sample_channel(channel_id: &str, owner: &str) -> NewChannel {
    NewChannel {
        channel_id: channel_id.to_string(),
        user_id: owner.to_string(),
        data_type: "telegram".to_string(),
        data_id: channel_id.to_string(),
        metadata: json!({ "name": format!("{channel_id} chat"), "type": "group" }),
        is_public: true,
        is_free: true,
        subscription_fee: BigDecimal::zero(),
        last_synced_at: None,
    }
}

pub fn sample_message(channel_id: &str, seq: i64, timestamp: i64) -> NewMessage {
    NewMessage {
        message_id: format!("m{seq}"),
        channel_id: channel_id.to_string(),
        reply_to: None,
        message_text: format!("message number {seq}"),
        buttons: None,
        sender_id: Some("alice".to_string()),
        sender: None,
        reactions: None,
        message_timestamp: timestamp,
        is_pinned: false,
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Makes any ledger batch touching `user_id` abort at that movement.
    pub fn fail_movements_for(&self, user_id: &str) {
        *self.failing_account.lock().unwrap() = Some(user_id.to_string());
    }

    pub fn balance(&self, user_id: &str) -> Option<BigDecimal> {
        self.state()
            .accounts
            .iter()
            .find(|a| a.user_id == user_id)
            .map(|a| a.credits.clone())
    }

    pub fn slots(&self, user_id: &str) -> Option<i32> {
        self.state()
            .accounts
            .iter()
            .find(|a| a.user_id == user_id)
            .map(|a| a.workflows)
    }

    pub fn logs(&self) -> Vec<CreditConsumptionLog> {
        self.state().logs.clone()
    }

    pub fn values(&self) -> Vec<WorkflowValue> {
        self.state().values.clone()
    }

    pub fn definition(&self, workflow_id: &str) -> Option<WorkflowDefinition> {
        self.state()
            .definitions
            .iter()
            .find(|d| d.workflow_definition_id == workflow_id)
            .cloned()
    }

    pub fn link_count(&self) -> usize {
        self.state().links.len()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn pinned(&self, channel_id: &str) -> AppResult<Vec<Message>> {
        let mut found: Vec<Message> = self
            .state()
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id && m.is_pinned)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.message_timestamp);
        Ok(found)
    }

    async fn latest(&self, channel_id: &str, limit: i64) -> AppResult<Vec<Message>> {
        let mut found: Vec<Message> = self
            .state()
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.message_timestamp
                .cmp(&a.message_timestamp)
                .then(b.id.cmp(&a.id))
        });
        found.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(found)
    }

    async fn since(&self, channel_id: &str, cutoff_ms: i64) -> AppResult<Vec<Message>> {
        let mut found: Vec<Message> = self
            .state()
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id && m.message_timestamp >= cutoff_ms)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.message_timestamp.cmp(&a.message_timestamp));
        Ok(found)
    }

    async fn ingest(&self, messages: Vec<NewMessage>) -> AppResult<usize> {
        let mut state = self.state();
        let mut inserted = 0;
        for message in messages {
            let exists = state.messages.iter().any(|m| {
                m.channel_id == message.channel_id && m.message_id == message.message_id
            });
            if exists {
                continue;
            }
            let id = state.next_id();
            state.messages.push(Message {
                id,
                message_id: message.message_id,
                channel_id: message.channel_id,
                reply_to: message.reply_to,
                message_text: message.message_text,
                buttons: message.buttons,
                sender_id: message.sender_id,
                sender: message.sender,
                reactions: message.reactions,
                message_timestamp: message.message_timestamp,
                is_pinned: message.is_pinned,
                created_at: Utc::now(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn find_definition(&self, workflow_id: &str) -> AppResult<Option<WorkflowDefinition>> {
        Ok(self.definition(workflow_id))
    }

    async fn list_definitions(&self, user_id: &str) -> AppResult<Vec<WorkflowDefinition>> {
        Ok(self
            .state()
            .definitions
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_definitions(&self, user_id: &str) -> AppResult<i64> {
        Ok(self
            .state()
            .definitions
            .iter()
            .filter(|d| d.user_id == user_id)
            .count() as i64)
    }

    async fn scheduled_definitions(&self) -> AppResult<Vec<WorkflowDefinition>> {
        Ok(self
            .state()
            .definitions
            .iter()
            .filter(|d| d.refresh_interval_hours > 0 && d.schedule_handle().is_some())
            .cloned()
            .collect())
    }

    async fn insert_definition(
        &self,
        definition: NewWorkflowDefinition,
    ) -> AppResult<WorkflowDefinition> {
        let mut state = self.state();
        if state
            .definitions
            .iter()
            .any(|d| d.workflow_definition_id == definition.workflow_definition_id)
        {
            return Err(AppError::Duplicate {
                entity: "workflow_definitions".to_string(),
                field: "workflow_definition_id".to_string(),
                value: definition.workflow_definition_id,
            });
        }
        let now = Utc::now();
        let row = WorkflowDefinition {
            id: state.next_id() as i32,
            workflow_definition_id: definition.workflow_definition_id,
            user_id: definition.user_id,
            name: definition.name,
            prompt: definition.prompt,
            model: definition.model,
            refresh_interval_hours: definition.refresh_interval_hours,
            schedule_id: definition.schedule_id,
            status: definition.status,
            message_strategy: definition.message_strategy,
            message_count: definition.message_count,
            time_window_value: definition.time_window_value,
            time_window_unit: definition.time_window_unit,
            is_private: definition.is_private,
            created_at: now,
            updated_at: now,
        };
        state.definitions.push(row.clone());
        Ok(row)
    }

    async fn update_definition(
        &self,
        workflow_id: &str,
        changes: UpdateWorkflowDefinition,
    ) -> AppResult<WorkflowDefinition> {
        let mut state = self.state();
        let row = state
            .definitions
            .iter_mut()
            .find(|d| d.workflow_definition_id == workflow_id)
            .ok_or_else(|| AppError::not_found("workflow_definition", "id", workflow_id))?;

        macro_rules! apply {
            ($($field:ident),*) => {
                $(if let Some(v) = changes.$field { row.$field = v; })*
            };
        }
        apply!(
            name,
            prompt,
            model,
            refresh_interval_hours,
            schedule_id,
            status,
            message_strategy,
            message_count,
            time_window_value,
            time_window_unit,
            is_private
        );
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete_definition(&self, workflow_id: &str) -> AppResult<()> {
        let mut state = self.state();
        let before = state.definitions.len();
        state
            .definitions
            .retain(|d| d.workflow_definition_id != workflow_id);
        if state.definitions.len() == before {
            return Err(AppError::not_found("workflow_definition", "id", workflow_id));
        }
        state
            .values
            .retain(|v| v.workflow_definition_id != workflow_id);
        state
            .links
            .retain(|l| l.workflow_definition_id != workflow_id);
        Ok(())
    }

    async fn find_channel(&self, channel_id: &str) -> AppResult<Option<Channel>> {
        Ok(self
            .state()
            .channels
            .iter()
            .find(|c| c.channel_id == channel_id)
            .cloned())
    }

    async fn find_channels(&self, channel_ids: &[String]) -> AppResult<Vec<Channel>> {
        Ok(self
            .state()
            .channels
            .iter()
            .filter(|c| channel_ids.contains(&c.channel_id))
            .cloned()
            .collect())
    }

    async fn upsert_channel(&self, channel: NewChannel) -> AppResult<Channel> {
        let mut state = self.state();
        let now = Utc::now();
        let id = match state
            .channels
            .iter()
            .position(|c| c.channel_id == channel.channel_id)
        {
            Some(index) => state.channels.remove(index).id,
            None => state.next_id() as i32,
        };
        let row = Channel {
            id,
            channel_id: channel.channel_id,
            user_id: channel.user_id,
            data_type: channel.data_type,
            data_id: channel.data_id,
            metadata: channel.metadata,
            is_public: channel.is_public,
            is_free: channel.is_free,
            subscription_fee: channel.subscription_fee,
            last_synced_at: channel.last_synced_at,
            created_at: now,
            updated_at: now,
        };
        state.channels.push(row.clone());
        Ok(row)
    }

    async fn channel_links(&self, workflow_id: &str) -> AppResult<Vec<ChannelWorkflow>> {
        Ok(self
            .state()
            .links
            .iter()
            .filter(|l| l.workflow_definition_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn paid_channels(&self, workflow_id: &str) -> AppResult<Vec<Channel>> {
        let state = self.state();
        Ok(state
            .links
            .iter()
            .filter(|l| l.workflow_definition_id == workflow_id)
            .filter_map(|l| state.channels.iter().find(|c| c.channel_id == l.channel_id))
            .filter(|c| c.charges_subscription())
            .cloned()
            .collect())
    }

    async fn link_channels(
        &self,
        workflow_ids: &[String],
        channel_ids: &[String],
    ) -> AppResult<usize> {
        let mut state = self.state();
        let mut inserted = 0;
        for workflow_id in workflow_ids {
            for channel_id in channel_ids {
                let exists = state.links.iter().any(|l| {
                    &l.workflow_definition_id == workflow_id && &l.channel_id == channel_id
                });
                if !exists {
                    let id = state.next_id() as i32;
                    state.links.push(ChannelWorkflow {
                        id,
                        channel_id: channel_id.clone(),
                        workflow_definition_id: workflow_id.clone(),
                        created_at: Utc::now(),
                    });
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    async fn unlink_channels(&self, workflow_id: &str, channel_ids: &[String]) -> AppResult<usize> {
        let mut state = self.state();
        let before = state.links.len();
        state.links.retain(|l| {
            !(l.workflow_definition_id == workflow_id && channel_ids.contains(&l.channel_id))
        });
        Ok(before - state.links.len())
    }

    async fn insert_value(&self, value: NewWorkflowValue) -> AppResult<WorkflowValue> {
        let mut state = self.state();
        let version = state
            .values
            .iter()
            .filter(|v| {
                v.workflow_definition_id == value.workflow_definition_id
                    && v.channel_id == value.channel_id
            })
            .map(|v| v.version)
            .max()
            .unwrap_or(0)
            + 1;
        let now = Utc::now();
        let row = WorkflowValue {
            id: state.next_id(),
            workflow_value_id: Uuid::new_v4().to_string(),
            workflow_definition_id: value.workflow_definition_id,
            channel_id: value.channel_id,
            value: value.value,
            confidence: value.confidence,
            reason: value.reason,
            version,
            status: value.status,
            is_aggregated: value.is_aggregated,
            created_at: now,
            updated_at: now,
        };
        state.values.push(row.clone());
        Ok(row)
    }

    async fn update_value(
        &self,
        workflow_value_id: &str,
        changes: UpdateWorkflowValue,
    ) -> AppResult<WorkflowValue> {
        let mut state = self.state();
        let row = state
            .values
            .iter_mut()
            .find(|v| v.workflow_value_id == workflow_value_id)
            .ok_or_else(|| AppError::not_found("workflow_value", "id", workflow_value_id))?;
        if let Some(value) = changes.value {
            row.value = value;
        }
        if let Some(confidence) = changes.confidence {
            row.confidence = confidence;
        }
        if let Some(reason) = changes.reason {
            row.reason = reason;
        }
        row.status = changes.status;
        row.updated_at = changes.updated_at;
        Ok(row.clone())
    }

    async fn aggregate_values(
        &self,
        workflow_id: &str,
        limit: i64,
    ) -> AppResult<Vec<WorkflowValue>> {
        let mut found: Vec<WorkflowValue> = self
            .state()
            .values
            .iter()
            .filter(|v| v.workflow_definition_id == workflow_id && v.is_aggregated)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.version.cmp(&a.version));
        found.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(found)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn account(&self, user_id: &str) -> AppResult<Option<UserCredit>> {
        Ok(self
            .state()
            .accounts
            .iter()
            .find(|a| a.user_id == user_id)
            .cloned())
    }

    async fn provision(
        &self,
        user_id: &str,
        credits: &BigDecimal,
        workflows: i32,
    ) -> AppResult<UserCredit> {
        let mut state = self.state();
        if let Some(existing) = state.accounts.iter().find(|a| a.user_id == user_id) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let row = UserCredit {
            id: state.next_id() as i32,
            user_id: user_id.to_string(),
            credits: credits.clone(),
            workflows,
            created_at: now,
            updated_at: now,
        };
        state.accounts.push(row.clone());
        Ok(row)
    }

    async fn apply(&self, batch: LedgerBatch) -> AppResult<()> {
        let failing = self.failing_account.lock().unwrap().clone();
        let mut state = self.state();
        let mut accounts = state.accounts.clone();

        for movement in &batch.ordered_movements() {
            if failing.as_deref() == Some(movement.user_id.as_str()) {
                let cause = AppError::Database {
                    operation: "update user_credits".to_string(),
                    source: anyhow::anyhow!("injected failure for {}", movement.user_id),
                };
                return Err(settlement_error(&batch.operation, cause));
            }
            let Some(account) = accounts.iter_mut().find(|a| a.user_id == movement.user_id) else {
                let cause = AppError::not_found("user_credit", "user_id", movement.user_id.clone());
                return Err(settlement_error(&batch.operation, cause));
            };
            let next = &account.credits + &movement.delta;
            if movement.require_sufficient && next < BigDecimal::zero() {
                return Err(AppError::insufficient_credits(format!(
                    "balance of {} does not cover {}",
                    movement.user_id, movement.delta
                )));
            }
            account.credits = next;
            account.workflows += movement.workflow_slots;
        }

        state.accounts = accounts;
        for entry in batch.entries {
            let id = state.next_id();
            state.logs.push(CreditConsumptionLog {
                id,
                user_id: entry.user_id,
                workflow_definition_id: entry.workflow_definition_id,
                model: entry.model,
                credits_consumed: entry.credits_consumed,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn usage(&self, user_id: &str, filter: &UsageFilter) -> AppResult<UsageReport> {
        let state = self.state();
        let mine: Vec<&CreditConsumptionLog> =
            state.logs.iter().filter(|l| l.user_id == user_id).collect();

        let mut logs: Vec<CreditConsumptionLog> = mine
            .iter()
            .filter(|l| filter.model.as_ref().is_none_or(|m| &l.model == m))
            .filter(|l| {
                filter
                    .workflow_definition_id
                    .as_ref()
                    .is_none_or(|w| &l.workflow_definition_id == w)
            })
            .filter(|l| filter.from.is_none_or(|from| l.created_at >= from))
            .filter(|l| filter.to.is_none_or(|to| l.created_at <= to))
            .map(|l| (*l).clone())
            .collect();
        logs.sort_by(|a, b| b.id.cmp(&a.id));
        logs.truncate(usize::try_from(filter.limit).unwrap_or(0));

        let mut models: Vec<String> = mine.iter().map(|l| l.model.clone()).collect();
        models.sort();
        models.dedup();
        let mut workflow_ids: Vec<String> = mine
            .iter()
            .map(|l| l.workflow_definition_id.clone())
            .filter(|w| !w.is_empty())
            .collect();
        workflow_ids.sort();
        workflow_ids.dedup();

        Ok(UsageReport {
            logs,
            models,
            workflow_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::models::{BalanceMovement, NewCreditLog, ValueStatus};

    fn channel_value(workflow_id: &str, channel_id: &str) -> NewWorkflowValue {
        NewWorkflowValue {
            channel_id: channel_id.to_string(),
            is_aggregated: false,
            status: ValueStatus::Completed,
            ..NewWorkflowValue::aggregate_placeholder(workflow_id)
        }
    }

    proptest! {
        #[test]
        fn prop_versions_count_up_per_pair(
            picks in proptest::collection::vec((0usize..3, 0usize..3), 1..60)
        ) {
            let store = MemoryStore::new();
            let mut last: HashMap<(usize, usize), i32> = HashMap::new();

            for (workflow, channel) in picks {
                let row = futures::executor::block_on(store.insert_value(channel_value(
                    &format!("wf{workflow}"),
                    &format!("chan{channel}"),
                )))
                .unwrap();
                let expected = last.get(&(workflow, channel)).copied().unwrap_or(0) + 1;
                prop_assert_eq!(row.version, expected);
                last.insert((workflow, channel), row.version);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_get_distinct_versions() {
        let store = Arc::new(MemoryStore::new());

        let tasks = (0..16).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.insert_value(channel_value("wf1", "chan-a")).await })
        });
        let mut versions: Vec<i32> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap().version)
            .collect();
        versions.sort();

        assert_eq!(versions, (1..=16).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn test_ingest_ignores_duplicates() {
        let store = MemoryStore::new();
        let first = vec![sample_message("c1", 1, 10), sample_message("c1", 2, 20)];
        assert_eq!(store.ingest(first).await.unwrap(), 2);

        let again = vec![sample_message("c1", 2, 99), sample_message("c1", 3, 30)];
        assert_eq!(store.ingest(again).await.unwrap(), 1);

        let latest = store.latest("c1", 10).await.unwrap();
        let stamps: Vec<i64> = latest.iter().map(|m| m.message_timestamp).collect();
        assert_eq!(stamps, vec![30, 20, 10]);
    }

    #[tokio::test]
    async fn test_apply_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.provision("payer", &BigDecimal::from(10), 1).await.unwrap();
        store.provision("owner", &BigDecimal::from(0), 1).await.unwrap();
        store.fail_movements_for("owner");

        let batch = LedgerBatch {
            operation: "test".to_string(),
            movements: vec![
                BalanceMovement::debit("payer", BigDecimal::from(3)),
                BalanceMovement::credit("owner", BigDecimal::from(2)),
            ],
            entries: vec![NewCreditLog {
                user_id: "payer".to_string(),
                workflow_definition_id: String::new(),
                model: "m".to_string(),
                credits_consumed: BigDecimal::from(3),
            }],
        };

        assert!(matches!(
            store.apply(batch).await,
            Err(AppError::Settlement { .. })
        ));
        assert_eq!(store.balance("payer"), Some(BigDecimal::from(10)));
        assert!(store.logs().is_empty());
    }
}
