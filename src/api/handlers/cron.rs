//! Schedule service callback.
//!
//! Not behind bearer auth: the schedule service proves itself with the
//! shared `x-callback-token` instead.

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::CRON_TAG;
use crate::api::dto::{CronQuery, CronRunResponse};
use crate::error::{AppError, AppResult};
use crate::services::workflow::RunTrigger;
use crate::state::AppState;

pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

pub fn cron_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(process_workflow))
}

fn verify_callback(headers: &HeaderMap, expected: &str) -> AppResult<()> {
    let presented = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if expected.is_empty() || presented != expected {
        return Err(AppError::Unauthorized {
            message: "Invalid callback token".to_string(),
        });
    }
    Ok(())
}

/// GET /api/cron/process-workflow - Run a workflow on behalf of its schedule
///
/// Runs synchronously so the schedule service sees the outcome and can retry.
#[utoipa::path(
    get,
    path = "/process-workflow",
    tag = CRON_TAG,
    params(
        CronQuery,
        ("x-callback-token" = String, Header, description = "Shared callback secret")
    ),
    responses(
        (status = 200, description = "Run finished", body = CronRunResponse),
        (status = 401, description = "Bad callback token"),
        (status = 402, description = "Owner balance is negative; workflow paused"),
        (status = 404, description = "Workflow not found"),
        (status = 409, description = "A run of this workflow is already in progress")
    )
)]
async fn process_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CronQuery>,
) -> AppResult<Json<CronRunResponse>> {
    verify_callback(&headers, &state.callback_token)?;
    let outcome = state
        .services
        .processor()
        .run(&query.definition_id, RunTrigger::Scheduled)
        .await?;
    Ok(Json(CronRunResponse::from(outcome)))
}
