//! Data Transfer Objects for API requests and responses.
//!
//! DTOs are organized by domain:
//! - `workflow` - workflow definitions, values and runs
//! - `channel` - channel registration and message ingest
//! - `credit` - balances, usage and packages
//! - `health` - health probe
//! - `error` - common error response

mod channel;
mod credit;
mod error;
mod health;
mod workflow;

pub use channel::{
    ChannelResponse, IngestMessage, IngestMessagesRequest, IngestResponse, UpsertChannelRequest,
};
pub use credit::{
    CreditLogResponse, CreditsResponse, PackageResponse, PurchaseRequest, UsageQuery,
    UsageResponse,
};
pub use error::ErrorResponse;
pub use health::{ComponentHealth, HealthResponse, HealthStatus};
pub use workflow::{
    ChannelIdsRequest, CreateWorkflowRequest, CronQuery, CronRunResponse, LinkResponse,
    StatusRequest, StrategyDto, UpdateWorkflowRequest, ValuesQuery, WorkflowResponse,
    WorkflowValueResponse,
};
