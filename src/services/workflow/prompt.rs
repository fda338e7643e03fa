//! Prompt text for the per-channel and aggregate model calls.

use chrono::{DateTime, SecondsFormat};

use crate::services::workflow::{ChannelContext, ContextMessage};

const BLOCK_DELIMITER: &str = "-------------------";

fn format_timestamp(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

fn transcript(messages: &[ContextMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            format!(
                "[{}] {}: {}",
                format_timestamp(m.message_timestamp),
                m.sender_label(),
                m.message_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn channel_prompt(base: &str, context: &ChannelContext) -> String {
    let metadata = serde_json::to_string(&context.channel).unwrap_or_else(|_| "{}".to_string());
    format!(
        "{base}\n\nChat Information:\nMetadata: {metadata}\n\nPinned and Latest Messages:\n{}",
        transcript(&context.messages)
    )
}

fn channel_block(context: &ChannelContext) -> String {
    let channel = &context.channel;
    let username = channel
        .username
        .as_deref()
        .map_or_else(|| "Private Group".to_string(), |u| format!("@{u}"));
    let participants = channel
        .participants_count
        .map_or_else(|| "Unknown".to_string(), |n| n.to_string());

    format!(
        "Group: {}\nType: {}\nUsername: {}\nParticipants: {} members\nDescription: {}\n\nRecent Messages: {} messages\n{}\n{}",
        channel.name.as_deref().unwrap_or("Unknown"),
        channel.kind.as_deref().unwrap_or("Unknown"),
        username,
        participants,
        channel.about.as_deref().unwrap_or("No description"),
        context.messages.len(),
        transcript(&context.messages),
        BLOCK_DELIMITER,
    )
}

pub fn aggregate_prompt(base: &str, contexts: &[ChannelContext]) -> String {
    let blocks = contexts
        .iter()
        .map(channel_block)
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{base}\n\nAnalysis Context:\n{blocks}")
}
