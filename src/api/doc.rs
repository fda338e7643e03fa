use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

pub const WORKFLOW_TAG: &str = "Workflows";
pub const CHANNEL_TAG: &str = "Channels";
pub const CREDIT_TAG: &str = "Credits";
pub const CRON_TAG: &str = "Cron";
pub const HEALTH_TAG: &str = "Health";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "chanflow",
        description = "Multi-tenant workflows that summarize chat channels with language models",
    ),
    modifiers(&SecurityAddon),
    components(
        schemas(
            crate::api::dto::ErrorResponse,
            crate::models::WorkflowStatus,
            crate::models::ValueStatus,
            crate::services::workflow::WindowUnit,
            crate::services::workflow::RunTrigger,
        )
    ),
    tags(
        (name = WORKFLOW_TAG, description = "Workflow definitions, runs and results"),
        (name = CHANNEL_TAG, description = "Channel registration and message ingest"),
        (name = CREDIT_TAG, description = "Credit balance and usage"),
        (name = CRON_TAG, description = "Schedule service callbacks"),
        (name = HEALTH_TAG, description = "Health check endpoints"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Bearer token issued by the identity provider"))
                        .build(),
                ),
            )
        }
    }
}
