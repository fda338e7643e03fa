//! Clients for services outside this process.

pub mod client;
pub mod llm;
pub mod schedule;

pub use llm::{ChatCompletion, ChatMessage, ChatModel, ChatRequest, ChatRole, OpenAiChatModel};
pub use schedule::{HttpScheduleClient, MAX_INTERVAL_HOURS, ScheduleAdapter, interval_to_cron};
