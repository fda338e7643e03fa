//! Workflow repository: definitions, channels, channel links and workflow values.

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::{AsyncDbPool, get_connection};
use crate::error::{AppError, AppResult};
use crate::models::{
    Channel, ChannelWorkflow, NewChannel, NewWorkflowDefinition, NewWorkflowValue,
    UpdateWorkflowDefinition, UpdateWorkflowValue, WorkflowDefinition, WorkflowValue,
};
use crate::repositories::WorkflowStore;
use crate::schema::{
    channel_workflows as links, channels, workflow_definitions as definitions,
    workflow_values as values,
};

/// Workflow repository holding an async connection pool.
///
/// The pool is reference counted, so clones share it.
#[derive(Clone)]
pub struct WorkflowRepository {
    pool: AsyncDbPool,
}

impl WorkflowRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for WorkflowRepository {
    async fn find_definition(&self, workflow_id: &str) -> AppResult<Option<WorkflowDefinition>> {
        let mut conn = get_connection(&self.pool).await?;

        definitions::table
            .filter(definitions::workflow_definition_id.eq(workflow_id))
            .select(WorkflowDefinition::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn list_definitions(&self, user_id: &str) -> AppResult<Vec<WorkflowDefinition>> {
        let mut conn = get_connection(&self.pool).await?;

        definitions::table
            .filter(definitions::user_id.eq(user_id))
            .order(definitions::created_at.desc())
            .select(WorkflowDefinition::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn count_definitions(&self, user_id: &str) -> AppResult<i64> {
        let mut conn = get_connection(&self.pool).await?;

        definitions::table
            .filter(definitions::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn scheduled_definitions(&self) -> AppResult<Vec<WorkflowDefinition>> {
        let mut conn = get_connection(&self.pool).await?;

        definitions::table
            .filter(definitions::refresh_interval_hours.gt(0))
            .filter(definitions::schedule_id.ne(""))
            .select(WorkflowDefinition::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn insert_definition(
        &self,
        definition: NewWorkflowDefinition,
    ) -> AppResult<WorkflowDefinition> {
        let mut conn = get_connection(&self.pool).await?;

        diesel::insert_into(definitions::table)
            .values(&definition)
            .returning(WorkflowDefinition::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn update_definition(
        &self,
        workflow_id: &str,
        changes: UpdateWorkflowDefinition,
    ) -> AppResult<WorkflowDefinition> {
        let mut conn = get_connection(&self.pool).await?;

        diesel::update(
            definitions::table.filter(definitions::workflow_definition_id.eq(workflow_id)),
        )
        .set((&changes, definitions::updated_at.eq(Utc::now())))
        .returning(WorkflowDefinition::as_returning())
        .get_result(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::not_found("workflow_definition", "id", workflow_id))
    }

    async fn delete_definition(&self, workflow_id: &str) -> AppResult<()> {
        let mut conn = get_connection(&self.pool).await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                diesel::delete(values::table.filter(values::workflow_definition_id.eq(workflow_id)))
                    .execute(conn)
                    .await?;
                diesel::delete(links::table.filter(links::workflow_definition_id.eq(workflow_id)))
                    .execute(conn)
                    .await?;
                let deleted = diesel::delete(
                    definitions::table.filter(definitions::workflow_definition_id.eq(workflow_id)),
                )
                .execute(conn)
                .await?;

                if deleted == 0 {
                    return Err(AppError::not_found("workflow_definition", "id", workflow_id));
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_channel(&self, channel_id: &str) -> AppResult<Option<Channel>> {
        let mut conn = get_connection(&self.pool).await?;

        channels::table
            .filter(channels::channel_id.eq(channel_id))
            .select(Channel::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn find_channels(&self, channel_ids: &[String]) -> AppResult<Vec<Channel>> {
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = get_connection(&self.pool).await?;

        channels::table
            .filter(channels::channel_id.eq_any(channel_ids))
            .select(Channel::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn upsert_channel(&self, channel: NewChannel) -> AppResult<Channel> {
        let mut conn = get_connection(&self.pool).await?;

        diesel::insert_into(channels::table)
            .values(&channel)
            .on_conflict(channels::channel_id)
            .do_update()
            .set((&channel, channels::updated_at.eq(Utc::now())))
            .returning(Channel::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn channel_links(&self, workflow_id: &str) -> AppResult<Vec<ChannelWorkflow>> {
        let mut conn = get_connection(&self.pool).await?;

        links::table
            .filter(links::workflow_definition_id.eq(workflow_id))
            .order(links::id.asc())
            .select(ChannelWorkflow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn paid_channels(&self, workflow_id: &str) -> AppResult<Vec<Channel>> {
        let mut conn = get_connection(&self.pool).await?;

        channels::table
            .inner_join(links::table.on(links::channel_id.eq(channels::channel_id)))
            .filter(links::workflow_definition_id.eq(workflow_id))
            .filter(channels::is_free.eq(false))
            .filter(channels::subscription_fee.gt(BigDecimal::zero()))
            .select(Channel::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn link_channels(
        &self,
        workflow_ids: &[String],
        channel_ids: &[String],
    ) -> AppResult<usize> {
        let rows: Vec<_> = workflow_ids
            .iter()
            .flat_map(|workflow_id| {
                channel_ids.iter().map(move |channel_id| {
                    (
                        links::channel_id.eq(channel_id.clone()),
                        links::workflow_definition_id.eq(workflow_id.clone()),
                    )
                })
            })
            .collect();
        if rows.is_empty() {
            return Ok(0);
        }
        let mut conn = get_connection(&self.pool).await?;

        diesel::insert_into(links::table)
            .values(rows)
            .on_conflict((links::channel_id, links::workflow_definition_id))
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn unlink_channels(&self, workflow_id: &str, channel_ids: &[String]) -> AppResult<usize> {
        let mut conn = get_connection(&self.pool).await?;

        diesel::delete(
            links::table
                .filter(links::workflow_definition_id.eq(workflow_id))
                .filter(links::channel_id.eq_any(channel_ids)),
        )
        .execute(&mut conn)
        .await
        .map_err(AppError::from)
    }

    async fn insert_value(&self, value: NewWorkflowValue) -> AppResult<WorkflowValue> {
        let mut conn = get_connection(&self.pool).await?;
        let lock_key = format!("{}:{}", value.workflow_definition_id, value.channel_id);

        // Concurrent inserts for one pair serialize on the advisory lock, so
        // max(version) + 1 cannot collide.
        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
                    .bind::<Text, _>(lock_key)
                    .execute(conn)
                    .await?;

                let current: Option<i32> = values::table
                    .filter(values::workflow_definition_id.eq(&value.workflow_definition_id))
                    .filter(values::channel_id.eq(&value.channel_id))
                    .select(max(values::version))
                    .first(conn)
                    .await?;

                diesel::insert_into(values::table)
                    .values((
                        values::workflow_value_id.eq(Uuid::new_v4().to_string()),
                        values::workflow_definition_id.eq(&value.workflow_definition_id),
                        values::channel_id.eq(&value.channel_id),
                        values::value.eq(&value.value),
                        values::confidence.eq(&value.confidence),
                        values::reason.eq(&value.reason),
                        values::version.eq(current.unwrap_or(0) + 1),
                        values::status.eq(value.status),
                        values::is_aggregated.eq(value.is_aggregated),
                    ))
                    .returning(WorkflowValue::as_returning())
                    .get_result(conn)
                    .await
                    .map_err(AppError::from)
            }
            .scope_boxed()
        })
        .await
    }

    async fn update_value(
        &self,
        workflow_value_id: &str,
        changes: UpdateWorkflowValue,
    ) -> AppResult<WorkflowValue> {
        let mut conn = get_connection(&self.pool).await?;

        diesel::update(values::table.filter(values::workflow_value_id.eq(workflow_value_id)))
            .set(&changes)
            .returning(WorkflowValue::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| AppError::not_found("workflow_value", "id", workflow_value_id))
    }

    async fn aggregate_values(
        &self,
        workflow_id: &str,
        limit: i64,
    ) -> AppResult<Vec<WorkflowValue>> {
        let mut conn = get_connection(&self.pool).await?;

        values::table
            .filter(values::workflow_definition_id.eq(workflow_id))
            .filter(values::is_aggregated.eq(true))
            .order(values::version.desc())
            .limit(limit)
            .select(WorkflowValue::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }
}
