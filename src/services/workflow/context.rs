//! Size-bounded prompt context for one channel.

use serde::{Deserialize, Serialize};

use crate::config::WorkflowConfig;
use crate::models::{ChannelMetadata, Message};

/// One message as it appears in a stored context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMessage {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    pub message_text: String,
    pub message_timestamp: i64,
    #[serde(default)]
    pub is_pinned: bool,
}

impl ContextMessage {
    pub fn sender_label(&self) -> &str {
        self.sender_id.as_deref().unwrap_or("unknown")
    }
}

impl From<Message> for ContextMessage {
    fn from(message: Message) -> Self {
        Self {
            message_id: message.message_id,
            sender_id: message.sender_id,
            message_text: message.message_text,
            message_timestamp: message.message_timestamp,
            is_pinned: message.is_pinned,
        }
    }
}

/// What one channel contributes to a run: stripped metadata plus messages, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelContext {
    pub channel_id: String,
    pub channel: ChannelMetadata,
    pub messages: Vec<ContextMessage>,
}

#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder {
    char_budget: usize,
    message_overhead: usize,
}

impl ContextBuilder {
    pub fn new(char_budget: usize, message_overhead: usize) -> Self {
        Self {
            char_budget,
            message_overhead,
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(config.context_char_budget, config.message_overhead_chars)
    }

    fn cost(&self, message: &Message) -> usize {
        message.message_text.chars().count() + self.message_overhead
    }

    /// Builds the context, or `None` when the channel has nothing to summarize.
    ///
    /// Pinned messages always go in and count against the budget. The rest are
    /// taken newest first until the next one would overflow the budget.
    pub fn build(
        &self,
        channel_id: &str,
        metadata: &ChannelMetadata,
        messages: Vec<Message>,
    ) -> Option<ChannelContext> {
        if messages.is_empty() {
            return None;
        }

        let channel = metadata.without_binary();
        let mut used = serde_json::to_string(&channel).map_or(0, |s| s.chars().count());

        let (pinned, mut rest): (Vec<Message>, Vec<Message>) =
            messages.into_iter().partition(|m| m.is_pinned);
        used += pinned.iter().map(|m| self.cost(m)).sum::<usize>();

        rest.sort_by(|a, b| b.message_timestamp.cmp(&a.message_timestamp));
        let mut selected = pinned;
        for message in rest {
            let cost = self.cost(&message);
            if used + cost > self.char_budget {
                break;
            }
            used += cost;
            selected.push(message);
        }

        selected.sort_by(|a, b| {
            a.message_timestamp
                .cmp(&b.message_timestamp)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });

        Some(ChannelContext {
            channel_id: channel_id.to_string(),
            channel,
            messages: selected.into_iter().map(ContextMessage::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn message(seq: i64, text: &str, pinned: bool) -> Message {
        Message {
            id: seq,
            message_id: format!("m{seq}"),
            channel_id: "c1".to_string(),
            reply_to: None,
            message_text: text.to_string(),
            buttons: None,
            sender_id: Some("bob".to_string()),
            sender: None,
            reactions: None,
            message_timestamp: seq * 1_000,
            is_pinned: pinned,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_messages_means_no_context() {
        let builder = ContextBuilder::new(24_000, 50);
        assert!(builder.build("c1", &ChannelMetadata::default(), Vec::new()).is_none());
    }

    #[test]
    fn test_ten_thousand_messages_stay_within_budget() {
        let builder = ContextBuilder::new(24_000, 50);
        let text = "x".repeat(100);
        let messages = (0..10_000).map(|i| message(i, &text, false)).collect();

        let context = builder
            .build("c1", &ChannelMetadata::default(), messages)
            .unwrap();

        // `{}` metadata costs 2, each message 150
        assert_eq!(context.messages.len(), (24_000 - 2) / 150);
        assert_eq!(context.messages.last().unwrap().message_id, "m9999");
        assert!(
            context
                .messages
                .windows(2)
                .all(|w| w[0].message_timestamp < w[1].message_timestamp)
        );
    }

    #[test]
    fn test_pinned_always_included() {
        let builder = ContextBuilder::new(300, 50);
        let long = "y".repeat(400);
        let messages = vec![
            message(1, &long, true),
            message(2, "recent", false),
            message(3, "latest", false),
        ];

        let context = builder
            .build("c1", &ChannelMetadata::default(), messages)
            .unwrap();

        let ids: Vec<&str> = context.messages.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m1"]);
    }

    #[test]
    fn test_photo_is_stripped() {
        let builder = ContextBuilder::new(24_000, 50);
        let metadata = ChannelMetadata {
            name: Some("Builders".to_string()),
            photo: Some("data:image/png;base64,AAAA".to_string()),
            ..ChannelMetadata::default()
        };

        let context = builder
            .build("c1", &metadata, vec![message(1, "hi", false)])
            .unwrap();

        assert_eq!(context.channel.photo, None);
        assert_eq!(context.channel.name.as_deref(), Some("Builders"));
    }

    proptest! {
        #[test]
        fn prop_unpinned_share_never_exceeds_budget(
            lengths in prop::collection::vec(0usize..400, 1..200),
            budget in 100usize..5_000,
        ) {
            let builder = ContextBuilder::new(budget, 50);
            let messages: Vec<Message> = lengths
                .iter()
                .enumerate()
                .map(|(i, len)| message(i as i64, &"z".repeat(*len), false))
                .collect();

            let context = builder.build("c1", &ChannelMetadata::default(), messages).unwrap();
            let used: usize = 2 + context
                .messages
                .iter()
                .map(|m| m.message_text.len() + 50)
                .sum::<usize>();
            prop_assert!(used <= budget);

            // Whatever was kept is the newest run of messages
            if let Some(first) = context.messages.first() {
                let kept_from = first.message_timestamp / 1_000;
                prop_assert_eq!(context.messages.len() as i64, lengths.len() as i64 - kept_from);
            }
        }
    }
}
