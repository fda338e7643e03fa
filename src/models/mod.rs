mod channel;
mod credit;
mod message;
mod workflow;

pub use channel::{Channel, ChannelMetadata, NewChannel};
pub use credit::{
    BalanceMovement, CreditConsumptionLog, LedgerBatch, NewCreditLog, UsageFilter, UsageReport,
    UserCredit,
};
pub use message::{Message, NewMessage};
pub use workflow::{
    ChannelWorkflow, NewWorkflowDefinition, NewWorkflowValue, UpdateWorkflowDefinition,
    UpdateWorkflowValue, ValueStatus, WorkflowDefinition, WorkflowStatus, WorkflowValue,
};
