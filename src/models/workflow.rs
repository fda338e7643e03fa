use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::schema::{channel_workflows, workflow_definitions, workflow_values};

/// Lifecycle of a workflow definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum, ToSchema)]
#[db_enum(existing_type_path = "crate::schema::sql_types::WorkflowStatus")]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Active,
    Paused,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Active => write!(f, "active"),
            WorkflowStatus::Paused => write!(f, "paused"),
        }
    }
}

/// Lifecycle of one workflow output row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum, ToSchema)]
#[db_enum(existing_type_path = "crate::schema::sql_types::ValueStatus")]
#[serde(rename_all = "lowercase")]
pub enum ValueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for ValueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueStatus::Pending => write!(f, "pending"),
            ValueStatus::Processing => write!(f, "processing"),
            ValueStatus::Completed => write!(f, "completed"),
            ValueStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = workflow_definitions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WorkflowDefinition {
    pub id: i32,
    pub workflow_definition_id: String,
    pub user_id: String,
    pub name: String,
    pub prompt: String,
    pub model: String,
    pub refresh_interval_hours: i32,
    /// External schedule handle, empty when the workflow is manual-only
    pub schedule_id: String,
    pub status: WorkflowStatus,
    pub message_strategy: String,
    pub message_count: i32,
    pub time_window_value: i32,
    pub time_window_unit: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn schedule_handle(&self) -> Option<&str> {
        Some(self.schedule_id.as_str()).filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = workflow_definitions)]
pub struct NewWorkflowDefinition {
    pub workflow_definition_id: String,
    pub user_id: String,
    pub name: String,
    pub prompt: String,
    pub model: String,
    pub refresh_interval_hours: i32,
    pub schedule_id: String,
    pub status: WorkflowStatus,
    pub message_strategy: String,
    pub message_count: i32,
    pub time_window_value: i32,
    pub time_window_unit: String,
    pub is_private: bool,
}

/// Partial edit of a definition; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = workflow_definitions)]
pub struct UpdateWorkflowDefinition {
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub refresh_interval_hours: Option<i32>,
    pub schedule_id: Option<String>,
    pub status: Option<WorkflowStatus>,
    pub message_strategy: Option<String>,
    pub message_count: Option<i32>,
    pub time_window_value: Option<i32>,
    pub time_window_unit: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = channel_workflows)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChannelWorkflow {
    pub id: i32,
    pub channel_id: String,
    pub workflow_definition_id: String,
    pub created_at: DateTime<Utc>,
}

/// One versioned workflow output, per channel or aggregated (empty `channel_id`).
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = workflow_values)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WorkflowValue {
    pub id: i64,
    pub workflow_value_id: String,
    pub workflow_definition_id: String,
    pub channel_id: String,
    pub value: String,
    pub confidence: BigDecimal,
    pub reason: String,
    pub version: i32,
    pub status: ValueStatus,
    pub is_aggregated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Value row to insert. The version is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewWorkflowValue {
    pub workflow_definition_id: String,
    pub channel_id: String,
    pub value: String,
    pub confidence: BigDecimal,
    pub reason: String,
    pub status: ValueStatus,
    pub is_aggregated: bool,
}

impl NewWorkflowValue {
    /// Placeholder aggregate row written before a run fans out.
    pub fn aggregate_placeholder(workflow_definition_id: &str) -> Self {
        Self {
            workflow_definition_id: workflow_definition_id.to_string(),
            channel_id: String::new(),
            value: String::new(),
            confidence: BigDecimal::from(0),
            reason: String::new(),
            status: ValueStatus::Processing,
            is_aggregated: true,
        }
    }
}

/// In-place transition of an in-flight value row.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = workflow_values)]
pub struct UpdateWorkflowValue {
    pub value: Option<String>,
    pub confidence: Option<BigDecimal>,
    pub reason: Option<String>,
    pub status: ValueStatus,
    pub updated_at: DateTime<Utc>,
}

impl UpdateWorkflowValue {
    pub fn completed(value: String, confidence: BigDecimal, reason: String) -> Self {
        Self {
            value: Some(value),
            confidence: Some(confidence),
            reason: Some(reason),
            status: ValueStatus::Completed,
            updated_at: Utc::now(),
        }
    }

    pub fn failed(reason: String) -> Self {
        Self {
            value: None,
            confidence: None,
            reason: Some(reason),
            status: ValueStatus::Failed,
            updated_at: Utc::now(),
        }
    }
}
