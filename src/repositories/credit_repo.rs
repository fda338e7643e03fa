//! Credit repository: balances, slot allowances and the append-only audit log.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use crate::db::{AsyncDbPool, get_connection};
use crate::error::{AppError, AppResult};
use crate::models::{CreditConsumptionLog, LedgerBatch, UsageFilter, UsageReport, UserCredit};
use crate::repositories::LedgerStore;
use crate::schema::{credit_consumption_logs as logs, user_credits};

/// Credit repository holding an async connection pool.
#[derive(Clone)]
pub struct CreditRepository {
    pool: AsyncDbPool,
}

impl CreditRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

/// Wraps an aborted batch. Insufficient credit stays distinguishable for callers.
pub(crate) fn settlement_error(operation: &str, error: AppError) -> AppError {
    match error {
        AppError::InsufficientCredits { .. } => error,
        other => AppError::Settlement {
            operation: operation.to_string(),
            source: anyhow::Error::new(other),
        },
    }
}

#[async_trait]
impl LedgerStore for CreditRepository {
    async fn account(&self, user_id: &str) -> AppResult<Option<UserCredit>> {
        let mut conn = get_connection(&self.pool).await?;

        user_credits::table
            .filter(user_credits::user_id.eq(user_id))
            .select(UserCredit::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn provision(
        &self,
        user_id: &str,
        credits: &BigDecimal,
        workflows: i32,
    ) -> AppResult<UserCredit> {
        let mut conn = get_connection(&self.pool).await?;

        diesel::insert_into(user_credits::table)
            .values((
                user_credits::user_id.eq(user_id),
                user_credits::credits.eq(credits),
                user_credits::workflows.eq(workflows),
            ))
            .on_conflict(user_credits::user_id)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        user_credits::table
            .filter(user_credits::user_id.eq(user_id))
            .select(UserCredit::as_select())
            .first(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn apply(&self, batch: LedgerBatch) -> AppResult<()> {
        let mut conn = get_connection(&self.pool).await?;
        let operation = batch.operation.clone();

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let now = Utc::now();
                let movements = batch.ordered_movements();
                for movement in &movements {
                    let target =
                        user_credits::table.filter(user_credits::user_id.eq(&movement.user_id));
                    let changes = (
                        user_credits::credits.eq(user_credits::credits + movement.delta.clone()),
                        user_credits::workflows
                            .eq(user_credits::workflows + movement.workflow_slots),
                        user_credits::updated_at.eq(now),
                    );

                    // The row lock taken by UPDATE serializes concurrent settlements per user
                    let updated = if movement.require_sufficient {
                        let floor = -movement.delta.clone();
                        diesel::update(target.filter(user_credits::credits.ge(floor)))
                            .set(changes)
                            .execute(conn)
                            .await?
                    } else {
                        diesel::update(target).set(changes).execute(conn).await?
                    };

                    if updated == 0 {
                        let exists: bool = diesel::select(diesel::dsl::exists(
                            user_credits::table.filter(user_credits::user_id.eq(&movement.user_id)),
                        ))
                        .get_result(conn)
                        .await?;

                        return Err(if exists && movement.require_sufficient {
                            AppError::insufficient_credits(format!(
                                "balance of {} does not cover {}",
                                movement.user_id, movement.delta
                            ))
                        } else {
                            AppError::not_found("user_credit", "user_id", movement.user_id.clone())
                        });
                    }
                }

                if !batch.entries.is_empty() {
                    diesel::insert_into(logs::table)
                        .values(&batch.entries)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(|e| settlement_error(&operation, e))
    }

    async fn usage(&self, user_id: &str, filter: &UsageFilter) -> AppResult<UsageReport> {
        let mut conn = get_connection(&self.pool).await?;

        let mut query = logs::table.filter(logs::user_id.eq(user_id)).into_boxed();
        if let Some(model) = &filter.model {
            query = query.filter(logs::model.eq(model.clone()));
        }
        if let Some(workflow_id) = &filter.workflow_definition_id {
            query = query.filter(logs::workflow_definition_id.eq(workflow_id.clone()));
        }
        if let Some(from) = filter.from {
            query = query.filter(logs::created_at.ge(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(logs::created_at.le(to));
        }

        let entries = query
            .order((logs::created_at.desc(), logs::id.desc()))
            .limit(filter.limit)
            .select(CreditConsumptionLog::as_select())
            .load(&mut conn)
            .await?;

        let models = logs::table
            .filter(logs::user_id.eq(user_id))
            .select(logs::model)
            .distinct()
            .order(logs::model.asc())
            .load::<String>(&mut conn)
            .await?;

        let workflow_ids = logs::table
            .filter(logs::user_id.eq(user_id))
            .filter(logs::workflow_definition_id.ne(""))
            .select(logs::workflow_definition_id)
            .distinct()
            .order(logs::workflow_definition_id.asc())
            .load::<String>(&mut conn)
            .await?;

        Ok(UsageReport {
            logs: entries,
            models,
            workflow_ids,
        })
    }
}
