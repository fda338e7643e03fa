use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::schema::channels;

/// A synced third-party channel owned by one publisher.
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = channels)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Channel {
    pub id: i32,
    pub channel_id: String,
    pub user_id: String,
    pub data_type: String,
    pub data_id: String,
    pub metadata: JsonValue,
    pub is_public: bool,
    pub is_free: bool,
    pub subscription_fee: BigDecimal,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    /// Typed view over the metadata blob.
    ///
    /// Malformed metadata degrades to an empty record rather than failing a run.
    pub fn typed_metadata(&self) -> ChannelMetadata {
        serde_json::from_value(self.metadata.clone()).unwrap_or_default()
    }

    /// Whether subscribers pay this channel's owner when it feeds a workflow.
    pub fn charges_subscription(&self) -> bool {
        !self.is_free && self.subscription_fee > BigDecimal::zero()
    }
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = channels)]
pub struct NewChannel {
    pub channel_id: String,
    pub user_id: String,
    pub data_type: String,
    pub data_id: String,
    pub metadata: JsonValue,
    pub is_public: bool,
    pub is_free: bool,
    pub subscription_fee: BigDecimal,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Channel metadata with the fields the pipeline reads.
///
/// Everything else the sync layer stores is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants_count: Option<i64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Avatar payload, usually a base64 data URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ChannelMetadata {
    /// Copy without image payloads: `photo` plus any extra field holding a data URI.
    pub fn without_binary(&self) -> Self {
        let extra = self
            .extra
            .iter()
            .filter(|(_, value)| !is_data_uri(value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            photo: None,
            extra,
            ..self.clone()
        }
    }
}

fn is_data_uri(value: &JsonValue) -> bool {
    value
        .as_str()
        .is_some_and(|s| s.starts_with("data:") && s.contains(";base64,"))
}
