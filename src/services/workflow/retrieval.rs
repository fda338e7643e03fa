//! Which messages of a channel feed one run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppResult;
use crate::models::{Message, WorkflowDefinition};
use crate::repositories::MessageStore;

const HOUR_MS: i64 = 60 * 60 * 1000;

pub const DEFAULT_MESSAGE_COUNT: i64 = 100;
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WindowUnit {
    Hours,
    Days,
}

impl WindowUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowUnit::Hours => "hours",
            WindowUnit::Days => "days",
        }
    }

    fn millis(&self) -> i64 {
        match self {
            WindowUnit::Hours => HOUR_MS,
            WindowUnit::Days => 24 * HOUR_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    /// The N most recent messages, no time bound
    LatestN { count: i64 },
    /// Every message inside the window, no count bound
    PastTime { value: i64, unit: WindowUnit },
}

impl Default for RetrievalStrategy {
    fn default() -> Self {
        RetrievalStrategy::LatestN {
            count: DEFAULT_MESSAGE_COUNT,
        }
    }
}

impl RetrievalStrategy {
    /// Reads the strategy columns. Unknown or unusable settings fall back to the defaults.
    pub fn from_columns(strategy: &str, count: i32, window_value: i32, window_unit: &str) -> Self {
        match strategy {
            "past_time" => {
                let unit = match window_unit {
                    "days" => WindowUnit::Days,
                    _ => WindowUnit::Hours,
                };
                if window_value > 0 {
                    RetrievalStrategy::PastTime {
                        value: i64::from(window_value),
                        unit,
                    }
                } else {
                    RetrievalStrategy::PastTime {
                        value: DEFAULT_WINDOW_HOURS,
                        unit: WindowUnit::Hours,
                    }
                }
            }
            "latest_n" if count > 0 => RetrievalStrategy::LatestN {
                count: i64::from(count),
            },
            _ => RetrievalStrategy::default(),
        }
    }

    pub fn for_definition(definition: &WorkflowDefinition) -> Self {
        Self::from_columns(
            &definition.message_strategy,
            definition.message_count,
            definition.time_window_value,
            &definition.time_window_unit,
        )
    }

    /// Earliest timestamp included by a time window.
    pub fn cutoff_ms(&self, now_ms: i64) -> Option<i64> {
        match self {
            RetrievalStrategy::LatestN { .. } => None,
            RetrievalStrategy::PastTime { value, unit } => {
                Some(now_ms.saturating_sub(value.saturating_mul(unit.millis())))
            }
        }
    }
}

/// Messages for one channel: the strategy's selection unioned with every
/// pinned message, without duplicates, oldest first.
pub async fn retrieve_messages(
    store: &dyn MessageStore,
    channel_id: &str,
    strategy: &RetrievalStrategy,
    now_ms: i64,
) -> AppResult<Vec<Message>> {
    let pinned = store.pinned(channel_id).await?;
    let selected = match (strategy, strategy.cutoff_ms(now_ms)) {
        (_, Some(cutoff)) => store.since(channel_id, cutoff).await?,
        (RetrievalStrategy::LatestN { count }, None) => store.latest(channel_id, *count).await?,
        (RetrievalStrategy::PastTime { .. }, None) => Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut merged: Vec<Message> = pinned
        .into_iter()
        .chain(selected)
        .filter(|m| seen.insert(m.message_id.clone()))
        .collect();
    merged.sort_by(|a, b| {
        a.message_timestamp
            .cmp(&b.message_timestamp)
            .then_with(|| a.message_id.cmp(&b.message_id))
    });

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::{MemoryStore, sample_message};

    const NOW: i64 = 1_700_000_000_000;

    async fn store_with(count: i64, spacing_ms: i64) -> MemoryStore {
        let store = MemoryStore::new();
        let batch = (0..count)
            .map(|i| sample_message("c1", i, NOW - (count - i) * spacing_ms))
            .collect();
        store.ingest(batch).await.unwrap();
        store
    }

    #[test]
    fn test_unknown_strategy_falls_back_to_latest_100() {
        assert_eq!(
            RetrievalStrategy::from_columns("everything", 5, 1, "hours"),
            RetrievalStrategy::LatestN { count: 100 }
        );
        assert_eq!(
            RetrievalStrategy::from_columns("latest_n", 0, 1, "hours"),
            RetrievalStrategy::LatestN { count: 100 }
        );
    }

    #[test]
    fn test_days_window_converts_to_millis() {
        let strategy = RetrievalStrategy::from_columns("past_time", 0, 2, "days");
        assert_eq!(strategy.cutoff_ms(NOW), Some(NOW - 2 * 24 * HOUR_MS));
    }

    #[tokio::test]
    async fn test_latest_n_returns_newest_plus_pinned_outside_window() {
        let store = store_with(150, 1_000).await;
        let mut pinned = sample_message("c1", 999, NOW - 10_000_000);
        pinned.is_pinned = true;
        store.ingest(vec![pinned]).await.unwrap();

        let strategy = RetrievalStrategy::LatestN { count: 100 };
        let messages = retrieve_messages(&store, "c1", &strategy, NOW).await.unwrap();

        assert_eq!(messages.len(), 101);
        assert_eq!(messages[0].message_id, "m999");
        assert_eq!(messages[1].message_id, "m50");
        assert_eq!(messages.last().unwrap().message_id, "m149");
    }

    #[tokio::test]
    async fn test_pinned_inside_window_is_not_duplicated() {
        let store = store_with(10, 1_000).await;
        let mut pinned = sample_message("c1", 500, NOW - 500);
        pinned.is_pinned = true;
        store.ingest(vec![pinned]).await.unwrap();

        let strategy = RetrievalStrategy::LatestN { count: 5 };
        let messages = retrieve_messages(&store, "c1", &strategy, NOW).await.unwrap();

        let pinned_count = messages.iter().filter(|m| m.message_id == "m500").count();
        assert_eq!(pinned_count, 1);
        assert_eq!(messages.len(), 5);
        assert!(
            messages
                .windows(2)
                .all(|w| w[0].message_timestamp <= w[1].message_timestamp)
        );
    }

    #[tokio::test]
    async fn test_past_time_is_unbounded_and_inclusive() {
        // One message every 30 minutes across 48 hours
        let store = store_with(96, HOUR_MS / 2).await;
        let mut boundary = sample_message("c1", 1000, NOW - 24 * HOUR_MS);
        boundary.message_id = "boundary".to_string();
        store.ingest(vec![boundary]).await.unwrap();

        let strategy = RetrievalStrategy::PastTime {
            value: 24,
            unit: WindowUnit::Hours,
        };
        let messages = retrieve_messages(&store, "c1", &strategy, NOW).await.unwrap();

        let cutoff = NOW - 24 * HOUR_MS;
        assert!(messages.iter().all(|m| m.message_timestamp >= cutoff));
        assert!(messages.iter().any(|m| m.message_id == "boundary"));
        // 48 generated inside the window plus the boundary message
        assert_eq!(messages.len(), 49);
    }

    #[tokio::test]
    async fn test_empty_channel_yields_nothing() {
        let store = MemoryStore::new();
        let messages = retrieve_messages(&store, "silent", &RetrievalStrategy::default(), NOW)
            .await
            .unwrap();
        assert!(messages.is_empty());
    }
}
