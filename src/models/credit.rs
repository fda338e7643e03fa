use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::schema::{credit_consumption_logs, user_credits};

/// Per-user balance and workflow slot allowance.
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = user_credits)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserCredit {
    pub id: i32,
    pub user_id: String,
    pub credits: BigDecimal,
    pub workflows: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit entry. Positive amounts are expenses, negative are income.
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = credit_consumption_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreditConsumptionLog {
    pub id: i64,
    pub user_id: String,
    pub workflow_definition_id: String,
    pub model: String,
    pub credits_consumed: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = credit_consumption_logs)]
pub struct NewCreditLog {
    pub user_id: String,
    pub workflow_definition_id: String,
    pub model: String,
    pub credits_consumed: BigDecimal,
}

/// One balance change inside a [`LedgerBatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceMovement {
    pub user_id: String,
    /// Signed change to the credit balance
    pub delta: BigDecimal,
    /// Signed change to the workflow slot allowance
    pub workflow_slots: i32,
    /// Refuse the movement when it would leave the balance negative
    pub require_sufficient: bool,
}

impl BalanceMovement {
    pub fn debit(user_id: &str, amount: BigDecimal) -> Self {
        Self {
            user_id: user_id.to_string(),
            delta: -amount,
            workflow_slots: 0,
            require_sufficient: false,
        }
    }

    pub fn credit(user_id: &str, amount: BigDecimal) -> Self {
        Self {
            user_id: user_id.to_string(),
            delta: amount,
            workflow_slots: 0,
            require_sufficient: false,
        }
    }

    pub fn guarded(mut self) -> Self {
        self.require_sufficient = true;
        self
    }

    pub fn with_slots(mut self, slots: i32) -> Self {
        self.workflow_slots = slots;
        self
    }
}

/// Every movement and audit entry of one settlement. Applied all-or-nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerBatch {
    pub operation: String,
    pub movements: Vec<BalanceMovement>,
    pub entries: Vec<NewCreditLog>,
}

impl LedgerBatch {
    /// Movements merged per user and sorted by user id.
    ///
    /// Every batch applied in this order locks `user_credits` rows in one global
    /// order, so settlements with crossed subscriber and owner roles cannot deadlock.
    pub fn ordered_movements(&self) -> Vec<BalanceMovement> {
        let mut merged: BTreeMap<&str, BalanceMovement> = BTreeMap::new();
        for movement in &self.movements {
            merged
                .entry(movement.user_id.as_str())
                .and_modify(|acc| {
                    acc.delta += &movement.delta;
                    acc.workflow_slots += movement.workflow_slots;
                    acc.require_sufficient |= movement.require_sufficient;
                })
                .or_insert_with(|| movement.clone());
        }
        merged.into_values().collect()
    }
}


/// Filters for the usage view. All present filters must match.
#[derive(Debug, Clone, Default)]
pub struct UsageFilter {
    pub model: Option<String>,
    pub workflow_definition_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageReport {
    pub logs: Vec<CreditConsumptionLog>,
    pub models: Vec<String>,
    pub workflow_ids: Vec<String>,
}
