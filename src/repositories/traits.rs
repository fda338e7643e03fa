//! Storage seams used by the workflow pipeline and the credit ledger.
//!
//! The Postgres repositories implement these for production; services only
//! ever see the traits so runs can be exercised against an in-memory store.

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::error::AppResult;
use crate::models::{
    Channel, ChannelWorkflow, LedgerBatch, Message, NewChannel, NewMessage, NewWorkflowDefinition,
    NewWorkflowValue, UpdateWorkflowDefinition, UpdateWorkflowValue, UsageFilter, UsageReport,
    UserCredit, WorkflowDefinition, WorkflowStatus, WorkflowValue,
};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Every pinned message of the channel.
    async fn pinned(&self, channel_id: &str) -> AppResult<Vec<Message>>;

    /// The `limit` most recent messages, newest first.
    async fn latest(&self, channel_id: &str, limit: i64) -> AppResult<Vec<Message>>;

    /// All messages with `message_timestamp >= cutoff_ms`, newest first.
    async fn since(&self, channel_id: &str, cutoff_ms: i64) -> AppResult<Vec<Message>>;

    /// Inserts messages, silently skipping ones already stored. Returns the inserted count.
    async fn ingest(&self, messages: Vec<NewMessage>) -> AppResult<usize>;
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn find_definition(&self, workflow_id: &str) -> AppResult<Option<WorkflowDefinition>>;

    async fn list_definitions(&self, user_id: &str) -> AppResult<Vec<WorkflowDefinition>>;

    async fn count_definitions(&self, user_id: &str) -> AppResult<i64>;

    /// Definitions with a recurring interval and a stored schedule handle.
    async fn scheduled_definitions(&self) -> AppResult<Vec<WorkflowDefinition>>;

    async fn insert_definition(
        &self,
        definition: NewWorkflowDefinition,
    ) -> AppResult<WorkflowDefinition>;

    async fn update_definition(
        &self,
        workflow_id: &str,
        changes: UpdateWorkflowDefinition,
    ) -> AppResult<WorkflowDefinition>;

    /// Removes the definition with its values and channel links in one transaction.
    async fn delete_definition(&self, workflow_id: &str) -> AppResult<()>;

    async fn set_status(&self, workflow_id: &str, status: WorkflowStatus) -> AppResult<()> {
        let changes = UpdateWorkflowDefinition {
            status: Some(status),
            ..Default::default()
        };
        self.update_definition(workflow_id, changes).await.map(|_| ())
    }

    async fn set_schedule_handle(&self, workflow_id: &str, handle: &str) -> AppResult<()> {
        let changes = UpdateWorkflowDefinition {
            schedule_id: Some(handle.to_string()),
            ..Default::default()
        };
        self.update_definition(workflow_id, changes).await.map(|_| ())
    }

    async fn find_channel(&self, channel_id: &str) -> AppResult<Option<Channel>>;

    async fn find_channels(&self, channel_ids: &[String]) -> AppResult<Vec<Channel>>;

    /// Inserts the channel or replaces the stored attributes of an existing one.
    async fn upsert_channel(&self, channel: NewChannel) -> AppResult<Channel>;

    async fn channel_links(&self, workflow_id: &str) -> AppResult<Vec<ChannelWorkflow>>;

    /// Linked channels that charge a subscription fee.
    async fn paid_channels(&self, workflow_id: &str) -> AppResult<Vec<Channel>>;

    /// Links every workflow to every channel, ignoring pairs that already exist.
    async fn link_channels(
        &self,
        workflow_ids: &[String],
        channel_ids: &[String],
    ) -> AppResult<usize>;

    async fn unlink_channels(&self, workflow_id: &str, channel_ids: &[String]) -> AppResult<usize>;

    /// Inserts a value as the next version of its (workflow, channel) pair.
    async fn insert_value(&self, value: NewWorkflowValue) -> AppResult<WorkflowValue>;

    async fn update_value(
        &self,
        workflow_value_id: &str,
        changes: UpdateWorkflowValue,
    ) -> AppResult<WorkflowValue>;

    /// Aggregate values of a workflow, newest version first.
    async fn aggregate_values(&self, workflow_id: &str, limit: i64)
    -> AppResult<Vec<WorkflowValue>>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn account(&self, user_id: &str) -> AppResult<Option<UserCredit>>;

    /// Creates the account with the given grant unless it already exists.
    async fn provision(
        &self,
        user_id: &str,
        credits: &BigDecimal,
        workflows: i32,
    ) -> AppResult<UserCredit>;

    /// Applies every movement and audit entry of the batch, or none of them.
    async fn apply(&self, batch: LedgerBatch) -> AppResult<()>;

    async fn usage(&self, user_id: &str, filter: &UsageFilter) -> AppResult<UsageReport>;
}
