//! Workflow DTOs: definitions, values, channel links and runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::models::{ValueStatus, WorkflowDefinition, WorkflowStatus, WorkflowValue};
use crate::services::workflow::{
    DEFAULT_MESSAGE_COUNT, RetrievalStrategy, RunOutcome, WindowUnit, WorkflowDraft,
    WorkflowPatch,
};

/// Which messages feed a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyDto {
    /// The most recent `count` messages plus pinned ones
    LatestN { count: i64 },
    /// Every message newer than `value` `unit`s plus pinned ones
    PastTime { value: i64, unit: WindowUnit },
}

impl Default for StrategyDto {
    fn default() -> Self {
        StrategyDto::LatestN {
            count: DEFAULT_MESSAGE_COUNT,
        }
    }
}

impl From<StrategyDto> for RetrievalStrategy {
    fn from(dto: StrategyDto) -> Self {
        match dto {
            StrategyDto::LatestN { count } => RetrievalStrategy::LatestN { count },
            StrategyDto::PastTime { value, unit } => RetrievalStrategy::PastTime { value, unit },
        }
    }
}

impl From<RetrievalStrategy> for StrategyDto {
    fn from(strategy: RetrievalStrategy) -> Self {
        match strategy {
            RetrievalStrategy::LatestN { count } => StrategyDto::LatestN { count },
            RetrievalStrategy::PastTime { value, unit } => StrategyDto::PastTime { value, unit },
        }
    }
}

fn validate_strategy(strategy: &StrategyDto) -> Result<(), ValidationError> {
    let (amount, max) = match strategy {
        StrategyDto::LatestN { count } => (*count, 10_000),
        StrategyDto::PastTime { value, .. } => (*value, 8_760),
    };
    if amount <= 0 || amount > max {
        return Err(ValidationError::new("strategy")
            .with_message(format!("Strategy amount must be between 1 and {max}").into()));
    }
    Ok(())
}

/// Request to create a workflow
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[schema(example = json!({
    "name": "Morning digest",
    "prompt": "Summarize what happened and flag anything urgent.",
    "model": "google/gemini-2.0-flash-001",
    "refresh_interval_hours": 6,
    "strategy": { "type": "past_time", "value": 24, "unit": "hours" },
    "is_private": false,
    "channel_ids": ["-1001234567890"]
}))]
pub struct CreateWorkflowRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    #[validate(length(min = 1, message = "Prompt is required"))]
    pub prompt: String,

    /// Model identifier; the configured default when omitted
    #[serde(default)]
    #[validate(length(max = 255, message = "Model must be at most 255 characters"))]
    pub model: Option<String>,

    /// Hours between scheduled runs, 0 for manual-only
    #[serde(default)]
    #[validate(range(min = 0, max = 24, message = "Interval must be between 0 and 24 hours"))]
    pub refresh_interval_hours: i32,

    #[serde(default)]
    #[validate(custom(function = "validate_strategy"))]
    pub strategy: StrategyDto,

    #[serde(default)]
    pub is_private: bool,

    #[serde(default)]
    pub channel_ids: Vec<String>,
}

impl CreateWorkflowRequest {
    pub fn into_draft(self) -> WorkflowDraft {
        WorkflowDraft {
            name: self.name,
            prompt: self.prompt,
            model: self.model.unwrap_or_default(),
            refresh_interval_hours: self.refresh_interval_hours,
            strategy: self.strategy.into(),
            is_private: self.is_private,
            channel_ids: self.channel_ids,
        }
    }
}

/// Partial update of a workflow; omitted fields stay unchanged
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateWorkflowRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 1, message = "Prompt must not be empty"))]
    pub prompt: Option<String>,

    #[validate(length(max = 255, message = "Model must be at most 255 characters"))]
    pub model: Option<String>,

    #[validate(range(min = 0, max = 24, message = "Interval must be between 0 and 24 hours"))]
    pub refresh_interval_hours: Option<i32>,

    #[validate(custom(function = "validate_strategy"))]
    pub strategy: Option<StrategyDto>,

    pub is_private: Option<bool>,
}

impl UpdateWorkflowRequest {
    pub fn into_patch(self) -> WorkflowPatch {
        WorkflowPatch {
            name: self.name,
            prompt: self.prompt,
            model: self.model,
            refresh_interval_hours: self.refresh_interval_hours,
            strategy: self.strategy.map(Into::into),
            is_private: self.is_private,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StatusRequest {
    pub status: WorkflowStatus,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChannelIdsRequest {
    #[validate(length(min = 1, max = 100, message = "Provide 1-100 channel ids"))]
    pub channel_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LinkResponse {
    /// Links created or removed
    pub affected: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkflowResponse {
    pub workflow_definition_id: String,
    pub name: String,
    pub prompt: String,
    pub model: String,
    pub refresh_interval_hours: i32,
    /// External schedule handle, absent for manual-only workflows
    pub schedule_id: Option<String>,
    pub status: WorkflowStatus,
    pub strategy: StrategyDto,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WorkflowDefinition> for WorkflowResponse {
    fn from(definition: WorkflowDefinition) -> Self {
        let strategy = RetrievalStrategy::for_definition(&definition).into();
        Self {
            schedule_id: definition.schedule_handle().map(str::to_string),
            workflow_definition_id: definition.workflow_definition_id,
            name: definition.name,
            prompt: definition.prompt,
            model: definition.model,
            refresh_interval_hours: definition.refresh_interval_hours,
            status: definition.status,
            strategy,
            is_private: definition.is_private,
            created_at: definition.created_at,
            updated_at: definition.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct ValuesQuery {
    /// Number of versions to return (1-100, default 20)
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkflowValueResponse {
    pub workflow_value_id: String,
    /// Empty for aggregate values
    pub channel_id: String,
    pub value: String,
    /// 0-100
    pub confidence: String,
    pub reason: String,
    pub version: i32,
    pub status: ValueStatus,
    pub is_aggregated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WorkflowValue> for WorkflowValueResponse {
    fn from(value: WorkflowValue) -> Self {
        Self {
            workflow_value_id: value.workflow_value_id,
            channel_id: value.channel_id,
            value: value.value,
            confidence: value.confidence.to_string(),
            reason: value.reason,
            version: value.version,
            status: value.status,
            is_aggregated: value.is_aggregated,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CronQuery {
    #[serde(rename = "definitionId")]
    #[param(rename = "definitionId")]
    pub definition_id: String,
}

/// Result of a synchronous scheduled run
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CronRunResponse {
    /// `no_channels`, `no_data` or `completed`
    pub outcome: String,
    pub aggregate_value_id: Option<String>,
    pub channels_processed: usize,
}

impl From<RunOutcome> for CronRunResponse {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::NoChannels => Self {
                outcome: "no_channels".to_string(),
                aggregate_value_id: None,
                channels_processed: 0,
            },
            RunOutcome::NoData { aggregate } => Self {
                outcome: "no_data".to_string(),
                aggregate_value_id: Some(aggregate.workflow_value_id),
                channels_processed: 0,
            },
            RunOutcome::Completed {
                aggregate,
                channels_processed,
            } => Self {
                outcome: "completed".to_string(),
                aggregate_value_id: Some(aggregate.workflow_value_id),
                channels_processed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_wire_format() {
        let parsed: StrategyDto =
            serde_json::from_str(r#"{"type":"past_time","value":2,"unit":"days"}"#).unwrap();
        assert_eq!(
            parsed,
            StrategyDto::PastTime {
                value: 2,
                unit: WindowUnit::Days
            }
        );
        assert_eq!(
            serde_json::to_value(StrategyDto::default()).unwrap(),
            serde_json::json!({ "type": "latest_n", "count": 100 })
        );
    }

    #[test]
    fn test_create_defaults() {
        let request: CreateWorkflowRequest =
            serde_json::from_str(r#"{"name":"n","prompt":"p"}"#).unwrap();
        assert!(request.validate().is_ok());

        let draft = request.into_draft();
        assert_eq!(draft.refresh_interval_hours, 0);
        assert_eq!(draft.model, "");
        assert_eq!(draft.strategy, RetrievalStrategy::default());
    }

    #[test]
    fn test_interval_capped_at_a_day() {
        let daily: CreateWorkflowRequest =
            serde_json::from_str(r#"{"name":"n","prompt":"p","refresh_interval_hours":24}"#).unwrap();
        assert!(daily.validate().is_ok());

        let two_days: CreateWorkflowRequest =
            serde_json::from_str(r#"{"name":"n","prompt":"p","refresh_interval_hours":48}"#).unwrap();
        assert!(two_days.validate().is_err());

        let weekly: UpdateWorkflowRequest =
            serde_json::from_str(r#"{"refresh_interval_hours":168}"#).unwrap();
        assert!(weekly.validate().is_err());
    }

    #[test]
    fn test_strategy_bounds() {
        let request: CreateWorkflowRequest = serde_json::from_str(
            r#"{"name":"n","prompt":"p","strategy":{"type":"latest_n","count":0}}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());
    }
}
