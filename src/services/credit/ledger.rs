//! Credit ledger: every balance or slot change goes through one atomic batch.

use std::sync::Arc;

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::{CreditsConfig, WorkflowPackage};
use crate::error::{AppError, AppResult};
use crate::models::{
    BalanceMovement, Channel, LedgerBatch, NewCreditLog, UsageFilter, UsageReport, UserCredit,
};
use crate::repositories::LedgerStore;
use crate::services::credit::CREDIT_SCALE;

pub const PURCHASE_WORKFLOW_ID: &str = "purchase_workflows";
pub const PURCHASE_MODEL: &str = "workflow_package";
pub const INCOME_MODEL: &str = "subscription_income";
pub const USAGE_LIMIT: i64 = 100;

/// Outcome of a multi-party workflow settlement.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SettlementSummary {
    #[schema(value_type = String)]
    pub total_debited: BigDecimal,
    #[schema(value_type = String)]
    pub commissions_paid: BigDecimal,
    pub recipients: usize,
}

#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn LedgerStore>,
    config: CreditsConfig,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn LedgerStore>, config: CreditsConfig) -> Self {
        Self { store, config }
    }

    pub fn packages(&self) -> &[WorkflowPackage] {
        &self.config.packages
    }

    /// Owner's share of a subscription fee.
    pub fn commission(&self, fee: &BigDecimal) -> BigDecimal {
        (fee * &self.config.commission_rate).with_scale_round(CREDIT_SCALE, RoundingMode::HalfUp)
    }

    /// Returns the user's account, creating it with the initial grant on first contact.
    pub async fn account(&self, user_id: &str) -> AppResult<UserCredit> {
        if let Some(account) = self.store.account(user_id).await? {
            return Ok(account);
        }
        let account = self
            .store
            .provision(
                user_id,
                &self.config.initial_credits,
                self.config.initial_workflows,
            )
            .await?;
        info!(
            user_id,
            credits = %account.credits,
            workflows = account.workflows,
            "Provisioned credit account"
        );
        Ok(account)
    }

    pub async fn balance(&self, user_id: &str) -> AppResult<BigDecimal> {
        self.account(user_id).await.map(|a| a.credits)
    }

    /// Debits one user and records a single audit entry.
    pub async fn deduct(
        &self,
        user_id: &str,
        amount: &BigDecimal,
        model: &str,
        workflow_id: Option<&str>,
    ) -> AppResult<()> {
        self.account(user_id).await?;
        let batch = LedgerBatch {
            operation: "credit deduction".to_string(),
            movements: vec![BalanceMovement::debit(user_id, amount.clone())],
            entries: vec![NewCreditLog {
                user_id: user_id.to_string(),
                workflow_definition_id: workflow_id.unwrap_or_default().to_string(),
                model: model.to_string(),
                credits_consumed: amount.clone(),
            }],
        };
        self.store.apply(batch).await
    }

    /// Plans the debit of usage plus fees and the commission credit of every paid channel owner.
    pub fn plan_workflow_settlement(
        &self,
        user_id: &str,
        workflow_id: &str,
        model: &str,
        usage_cost: &BigDecimal,
        paid_channels: &[Channel],
    ) -> LedgerBatch {
        let mut movements = Vec::with_capacity(paid_channels.len() + 1);
        let mut entries = Vec::with_capacity(paid_channels.len() + 1);
        let mut total = usage_cost.clone();

        for channel in paid_channels.iter().filter(|c| c.charges_subscription()) {
            total += &channel.subscription_fee;
            let income = self.commission(&channel.subscription_fee);
            if income.is_zero() {
                continue;
            }
            movements.push(BalanceMovement::credit(&channel.user_id, income.clone()));
            entries.push(NewCreditLog {
                user_id: channel.user_id.clone(),
                workflow_definition_id: workflow_id.to_string(),
                model: INCOME_MODEL.to_string(),
                credits_consumed: -income,
            });
        }

        movements.insert(0, BalanceMovement::debit(user_id, total.clone()));
        entries.insert(
            0,
            NewCreditLog {
                user_id: user_id.to_string(),
                workflow_definition_id: workflow_id.to_string(),
                model: model.to_string(),
                credits_consumed: total,
            },
        );

        let mut batch = LedgerBatch {
            operation: "workflow settlement".to_string(),
            movements,
            entries,
        };
        batch.movements = batch.ordered_movements();
        batch
    }

    /// Settles an aggregate run atomically: subscriber debit plus publisher commissions.
    pub async fn settle_workflow(
        &self,
        user_id: &str,
        workflow_id: &str,
        model: &str,
        usage_cost: &BigDecimal,
        paid_channels: &[Channel],
    ) -> AppResult<SettlementSummary> {
        let batch =
            self.plan_workflow_settlement(user_id, workflow_id, model, usage_cost, paid_channels);

        for movement in &batch.movements {
            self.account(&movement.user_id).await?;
        }

        let summary = SettlementSummary {
            total_debited: batch.entries[0].credits_consumed.clone(),
            commissions_paid: batch.entries[1..]
                .iter()
                .map(|e| -e.credits_consumed.clone())
                .sum(),
            recipients: batch.entries.len() - 1,
        };

        self.store.apply(batch).await.inspect_err(|e| {
            warn!(user_id, workflow_definition_id = workflow_id, error = %e, "Workflow settlement aborted");
        })?;

        info!(
            user_id,
            workflow_definition_id = workflow_id,
            total = %summary.total_debited,
            commissions = %summary.commissions_paid,
            recipients = summary.recipients,
            "Workflow settlement applied"
        );
        Ok(summary)
    }

    /// Buys a workflow package: guarded debit of its price plus its slots.
    pub async fn purchase_package(&self, user_id: &str, package_id: &str) -> AppResult<UserCredit> {
        let package = self
            .config
            .packages
            .iter()
            .find(|p| p.id == package_id)
            .ok_or_else(|| AppError::not_found("workflow_package", "id", package_id))?
            .clone();

        self.account(user_id).await?;
        let batch = LedgerBatch {
            operation: "workflow package purchase".to_string(),
            movements: vec![
                BalanceMovement::debit(user_id, package.price.clone())
                    .guarded()
                    .with_slots(package.workflows),
            ],
            entries: vec![NewCreditLog {
                user_id: user_id.to_string(),
                workflow_definition_id: PURCHASE_WORKFLOW_ID.to_string(),
                model: PURCHASE_MODEL.to_string(),
                credits_consumed: package.price.clone(),
            }],
        };
        self.store.apply(batch).await?;

        info!(user_id, package = %package.id, workflows = package.workflows, "Workflow package purchased");
        self.account(user_id).await
    }

    pub async fn usage(&self, user_id: &str, mut filter: UsageFilter) -> AppResult<UsageReport> {
        if filter.limit <= 0 || filter.limit > USAGE_LIMIT {
            filter.limit = USAGE_LIMIT;
        }
        self.store.usage(user_id, &filter).await
    }
}
