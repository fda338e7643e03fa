//! Message repository for async database operations.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::db::{AsyncDbPool, get_connection};
use crate::error::{AppError, AppResult};
use crate::models::{Message, NewMessage};
use crate::repositories::MessageStore;

/// Message repository holding an async connection pool.
#[derive(Clone)]
pub struct MessageRepository {
    pool: AsyncDbPool,
}

impl MessageRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn pinned(&self, channel: &str) -> AppResult<Vec<Message>> {
        use crate::schema::messages::dsl::*;
        let mut conn = get_connection(&self.pool).await?;

        messages
            .filter(channel_id.eq(channel))
            .filter(is_pinned.eq(true))
            .order(message_timestamp.asc())
            .select(Message::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn latest(&self, channel: &str, limit: i64) -> AppResult<Vec<Message>> {
        use crate::schema::messages::dsl::*;
        let mut conn = get_connection(&self.pool).await?;

        messages
            .filter(channel_id.eq(channel))
            .order((message_timestamp.desc(), id.desc()))
            .limit(limit)
            .select(Message::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn since(&self, channel: &str, cutoff_ms: i64) -> AppResult<Vec<Message>> {
        use crate::schema::messages::dsl::*;
        let mut conn = get_connection(&self.pool).await?;

        messages
            .filter(channel_id.eq(channel))
            .filter(message_timestamp.ge(cutoff_ms))
            .order((message_timestamp.desc(), id.desc()))
            .select(Message::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn ingest(&self, batch: Vec<NewMessage>) -> AppResult<usize> {
        use crate::schema::messages::dsl::*;
        if batch.is_empty() {
            return Ok(0);
        }
        let mut conn = get_connection(&self.pool).await?;

        diesel::insert_into(messages)
            .values(&batch)
            .on_conflict((channel_id, message_id))
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(AppError::from)
    }
}
