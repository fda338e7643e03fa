//! Channel registration and message ingest DTOs.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Channel, ChannelMetadata, NewMessage};
use crate::services::workflow::ChannelDraft;

fn default_true() -> bool {
    true
}

/// Registers or refreshes a channel owned by the caller
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[schema(example = json!({
    "channel_id": "-1001234567890",
    "data_type": "telegram",
    "data_id": "-1001234567890",
    "metadata": { "name": "Rust News", "type": "channel", "username": "rustnews", "participantsCount": 5120 },
    "is_public": true,
    "is_free": false,
    "subscription_fee": "0.5"
}))]
pub struct UpsertChannelRequest {
    #[validate(length(min = 1, max = 255, message = "Channel id must be 1-255 characters"))]
    pub channel_id: String,

    #[validate(length(min = 1, max = 64, message = "Data type must be 1-64 characters"))]
    pub data_type: String,

    #[validate(length(min = 1, max = 255, message = "Data id must be 1-255 characters"))]
    pub data_id: String,

    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: ChannelMetadata,

    #[serde(default = "default_true")]
    pub is_public: bool,

    #[serde(default = "default_true")]
    pub is_free: bool,

    /// Fee charged per aggregate run to workflows reading this channel
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub subscription_fee: Option<BigDecimal>,
}

impl UpsertChannelRequest {
    pub fn into_draft(self) -> ChannelDraft {
        ChannelDraft {
            channel_id: self.channel_id,
            data_type: self.data_type,
            data_id: self.data_id,
            metadata: self.metadata,
            is_public: self.is_public,
            is_free: self.is_free,
            subscription_fee: self.subscription_fee.unwrap_or_else(BigDecimal::zero),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChannelResponse {
    pub channel_id: String,
    pub user_id: String,
    pub data_type: String,
    pub data_id: String,
    /// Metadata without image payloads
    #[schema(value_type = Object)]
    pub metadata: ChannelMetadata,
    pub is_public: bool,
    pub is_free: bool,
    pub subscription_fee: String,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl From<Channel> for ChannelResponse {
    fn from(channel: Channel) -> Self {
        Self {
            metadata: channel.typed_metadata().without_binary(),
            channel_id: channel.channel_id,
            user_id: channel.user_id,
            data_type: channel.data_type,
            data_id: channel.data_id,
            is_public: channel.is_public,
            is_free: channel.is_free,
            subscription_fee: channel.subscription_fee.to_string(),
            last_synced_at: channel.last_synced_at,
        }
    }
}

/// One message as delivered by the sync layer
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct IngestMessage {
    #[validate(length(min = 1, max = 255, message = "Message id must be 1-255 characters"))]
    pub message_id: String,
    pub reply_to: Option<String>,
    #[serde(default)]
    pub message_text: String,
    #[schema(value_type = Option<Object>)]
    pub buttons: Option<JsonValue>,
    pub sender_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub sender: Option<JsonValue>,
    #[schema(value_type = Option<Object>)]
    pub reactions: Option<JsonValue>,
    /// Epoch milliseconds
    pub message_timestamp: i64,
    #[serde(default)]
    pub is_pinned: bool,
}

impl IngestMessage {
    fn into_new_message(self, channel_id: &str) -> NewMessage {
        NewMessage {
            message_id: self.message_id,
            channel_id: channel_id.to_string(),
            reply_to: self.reply_to,
            message_text: self.message_text,
            buttons: self.buttons,
            sender_id: self.sender_id,
            sender: self.sender,
            reactions: self.reactions,
            message_timestamp: self.message_timestamp,
            is_pinned: self.is_pinned,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct IngestMessagesRequest {
    #[validate(length(min = 1, max = 1000, message = "Provide 1-1000 messages"))]
    #[validate(nested)]
    pub messages: Vec<IngestMessage>,
}

impl IngestMessagesRequest {
    pub fn into_new_messages(self, channel_id: &str) -> Vec<NewMessage> {
        self.messages
            .into_iter()
            .map(|m| m.into_new_message(channel_id))
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    pub submitted: usize,
    /// Messages not seen before
    pub inserted: usize,
}
