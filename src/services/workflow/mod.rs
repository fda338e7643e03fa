//! The per-workflow pipeline: message selection, context assembly, runs and lifecycle.

mod context;
mod lifecycle;
pub mod processor;
pub mod prompt;
mod retrieval;
mod temp_store;

pub use context::{ChannelContext, ContextBuilder, ContextMessage};
pub use lifecycle::{ChannelDraft, SlotStats, WorkflowDraft, WorkflowPatch, WorkflowService};
pub use processor::{RunOutcome, RunTrigger, WorkflowProcessor};
pub use retrieval::{
    DEFAULT_MESSAGE_COUNT, DEFAULT_WINDOW_HOURS, RetrievalStrategy, WindowUnit, retrieve_messages,
};
pub use temp_store::{ContextHandle, TempContextStore};
