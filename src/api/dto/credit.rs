//! Credit balance, usage and package DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::config::WorkflowPackage;
use crate::models::{CreditConsumptionLog, UsageFilter, UsageReport, UserCredit};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreditsResponse {
    pub user_id: String,
    pub credits: String,
    /// Workflow slot allowance
    pub workflows: i32,
}

impl From<UserCredit> for CreditsResponse {
    fn from(account: UserCredit) -> Self {
        Self {
            user_id: account.user_id,
            credits: account.credits.to_string(),
            workflows: account.workflows,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct UsageQuery {
    pub model: Option<String>,
    pub workflow_definition_id: Option<String>,
    /// Inclusive lower bound on the entry time
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the entry time
    pub to: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,
}

impl From<UsageQuery> for UsageFilter {
    fn from(query: UsageQuery) -> Self {
        UsageFilter {
            model: query.model,
            workflow_definition_id: query.workflow_definition_id,
            from: query.from,
            to: query.to,
            limit: query.limit.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreditLogResponse {
    pub workflow_definition_id: String,
    pub model: String,
    /// Negative for income
    pub credits_consumed: String,
    pub created_at: DateTime<Utc>,
}

impl From<CreditConsumptionLog> for CreditLogResponse {
    fn from(log: CreditConsumptionLog) -> Self {
        Self {
            workflow_definition_id: log.workflow_definition_id,
            model: log.model,
            credits_consumed: log.credits_consumed.to_string(),
            created_at: log.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageResponse {
    pub logs: Vec<CreditLogResponse>,
    pub models: Vec<String>,
    pub workflow_ids: Vec<String>,
}

impl From<UsageReport> for UsageResponse {
    fn from(report: UsageReport) -> Self {
        Self {
            logs: report.logs.into_iter().map(CreditLogResponse::from).collect(),
            models: report.models,
            workflow_ids: report.workflow_ids,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PurchaseRequest {
    #[validate(length(min = 1, message = "Package id is required"))]
    pub package_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PackageResponse {
    pub id: String,
    pub name: String,
    pub price: String,
    pub workflows: i32,
}

impl From<&WorkflowPackage> for PackageResponse {
    fn from(package: &WorkflowPackage) -> Self {
        Self {
            id: package.id.clone(),
            name: package.name.clone(),
            price: package.price.to_string(),
            workflows: package.workflows,
        }
    }
}
