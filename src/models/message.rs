use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::schema::messages;

/// A channel message. `message_timestamp` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Message {
    pub id: i64,
    pub message_id: String,
    pub channel_id: String,
    pub reply_to: Option<String>,
    pub message_text: String,
    pub buttons: Option<JsonValue>,
    pub sender_id: Option<String>,
    pub sender: Option<JsonValue>,
    pub reactions: Option<JsonValue>,
    pub message_timestamp: i64,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Name shown in prompt transcripts.
    pub fn sender_label(&self) -> &str {
        self.sender_id.as_deref().unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub message_id: String,
    pub channel_id: String,
    pub reply_to: Option<String>,
    pub message_text: String,
    pub buttons: Option<JsonValue>,
    pub sender_id: Option<String>,
    pub sender: Option<JsonValue>,
    pub reactions: Option<JsonValue>,
    pub message_timestamp: i64,
    pub is_pinned: bool,
}
