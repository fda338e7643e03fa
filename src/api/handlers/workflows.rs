//! Workflow request handlers.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::WORKFLOW_TAG;
use crate::api::dto::{
    ChannelIdsRequest, CreateWorkflowRequest, CreditsResponse, LinkResponse, PackageResponse,
    PurchaseRequest, StatusRequest, UpdateWorkflowRequest, ValuesQuery, WorkflowResponse,
    WorkflowValueResponse,
};
use crate::api::middleware::AuthUser;
use crate::error::AppResult;
use crate::jobs::RunTicket;
use crate::services::workflow::{RunTrigger, SlotStats};
use crate::state::AppState;
use crate::utils::validate::{ValidatedJson, ValidatedQuery};

const DEFAULT_VALUES_PAGE: i64 = 20;

pub fn workflow_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_workflows, create_workflow))
        .routes(routes!(slot_stats))
        .routes(routes!(list_packages, purchase_package))
        .routes(routes!(get_workflow, update_workflow, delete_workflow))
        .routes(routes!(set_status))
        .routes(routes!(run_workflow))
        .routes(routes!(list_values))
        .routes(routes!(link_channels, unlink_channels))
}

/// GET /api/workflows - List the caller's workflows
#[utoipa::path(
    get,
    path = "/",
    tag = WORKFLOW_TAG,
    responses(
        (status = 200, description = "Workflows owned by the caller", body = Vec<WorkflowResponse>)
    ),
    security(("bearerAuth" = []))
)]
async fn list_workflows(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<WorkflowResponse>>> {
    let workflows = state.services.workflows.list(&auth_user.user_id).await?;
    Ok(Json(
        workflows.into_iter().map(WorkflowResponse::from).collect(),
    ))
}

/// POST /api/workflows - Create a workflow
///
/// Consumes one workflow slot. A positive interval registers a schedule.
#[utoipa::path(
    post,
    path = "/",
    tag = WORKFLOW_TAG,
    request_body = CreateWorkflowRequest,
    responses(
        (status = 201, description = "Workflow created", body = WorkflowResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "No free workflow slot"),
        (status = 502, description = "Schedule service failed")
    ),
    security(("bearerAuth" = []))
)]
async fn create_workflow(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<CreateWorkflowRequest>,
) -> AppResult<(StatusCode, Json<WorkflowResponse>)> {
    let definition = state
        .services
        .workflows
        .create(&auth_user.user_id, req.into_draft())
        .await?;
    Ok((StatusCode::CREATED, Json(WorkflowResponse::from(definition))))
}

/// GET /api/workflows/stats - Workflow slot usage
#[utoipa::path(
    get,
    path = "/stats",
    tag = WORKFLOW_TAG,
    responses(
        (status = 200, description = "Slot allowance and usage", body = SlotStats)
    ),
    security(("bearerAuth" = []))
)]
async fn slot_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<SlotStats>> {
    let stats = state.services.workflows.slot_stats(&auth_user.user_id).await?;
    Ok(Json(stats))
}

/// GET /api/workflows/packages - Purchasable workflow slot packages
#[utoipa::path(
    get,
    path = "/packages",
    tag = WORKFLOW_TAG,
    responses(
        (status = 200, description = "Configured packages", body = Vec<PackageResponse>)
    ),
    security(("bearerAuth" = []))
)]
async fn list_packages(State(state): State<AppState>) -> Json<Vec<PackageResponse>> {
    Json(
        state
            .services
            .credits
            .packages()
            .iter()
            .map(PackageResponse::from)
            .collect(),
    )
}

/// POST /api/workflows/packages - Buy extra workflow slots with credits
#[utoipa::path(
    post,
    path = "/packages",
    tag = WORKFLOW_TAG,
    request_body = PurchaseRequest,
    responses(
        (status = 200, description = "Package applied", body = CreditsResponse),
        (status = 402, description = "Balance does not cover the price"),
        (status = 404, description = "Unknown package")
    ),
    security(("bearerAuth" = []))
)]
async fn purchase_package(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<PurchaseRequest>,
) -> AppResult<Json<CreditsResponse>> {
    let account = state
        .services
        .credits
        .purchase_package(&auth_user.user_id, &req.package_id)
        .await?;
    Ok(Json(CreditsResponse::from(account)))
}

/// GET /api/workflows/{id} - Read a workflow
///
/// Private workflows are visible to their owner only.
#[utoipa::path(
    get,
    path = "/{id}",
    tag = WORKFLOW_TAG,
    params(("id" = String, Path, description = "Workflow definition ID")),
    responses(
        (status = 200, description = "Workflow found", body = WorkflowResponse),
        (status = 403, description = "Private workflow of another user"),
        (status = 404, description = "Workflow not found")
    ),
    security(("bearerAuth" = []))
)]
async fn get_workflow(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<WorkflowResponse>> {
    let definition = state.services.workflows.get(&auth_user.user_id, &id).await?;
    Ok(Json(WorkflowResponse::from(definition)))
}

/// PATCH /api/workflows/{id} - Edit a workflow
///
/// Interval changes create, update or remove the schedule to match.
#[utoipa::path(
    patch,
    path = "/{id}",
    tag = WORKFLOW_TAG,
    params(("id" = String, Path, description = "Workflow definition ID")),
    request_body = UpdateWorkflowRequest,
    responses(
        (status = 200, description = "Workflow updated", body = WorkflowResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Workflow not found")
    ),
    security(("bearerAuth" = []))
)]
async fn update_workflow(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateWorkflowRequest>,
) -> AppResult<Json<WorkflowResponse>> {
    let definition = state
        .services
        .workflows
        .update(&auth_user.user_id, &id, req.into_patch())
        .await?;
    Ok(Json(WorkflowResponse::from(definition)))
}

/// DELETE /api/workflows/{id} - Delete a workflow with its values and links
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = WORKFLOW_TAG,
    params(("id" = String, Path, description = "Workflow definition ID")),
    responses(
        (status = 204, description = "Workflow deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Workflow not found")
    ),
    security(("bearerAuth" = []))
)]
async fn delete_workflow(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.services.workflows.delete(&auth_user.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/workflows/{id}/status - Pause or resume a workflow
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tag = WORKFLOW_TAG,
    params(("id" = String, Path, description = "Workflow definition ID")),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Status changed", body = WorkflowResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Workflow not found")
    ),
    security(("bearerAuth" = []))
)]
async fn set_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<StatusRequest>,
) -> AppResult<Json<WorkflowResponse>> {
    let definition = state
        .services
        .workflows
        .set_status(&auth_user.user_id, &id, req.status)
        .await?;
    Ok(Json(WorkflowResponse::from(definition)))
}

/// POST /api/workflows/{id}/run - Start a run in the background
///
/// Returns at once with the run ID; progress is visible through the values endpoint.
#[utoipa::path(
    post,
    path = "/{id}/run",
    tag = WORKFLOW_TAG,
    params(("id" = String, Path, description = "Workflow definition ID")),
    responses(
        (status = 202, description = "Run accepted", body = RunTicket),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Workflow not found"),
        (status = 409, description = "Server is shutting down")
    ),
    security(("bearerAuth" = []))
)]
async fn run_workflow(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<(StatusCode, Json<RunTicket>)> {
    state.services.workflows.owned(&auth_user.user_id, &id).await?;
    let ticket = state.services.runs.submit(&id, RunTrigger::Manual)?;
    Ok((StatusCode::ACCEPTED, Json(ticket)))
}

/// GET /api/workflows/{id}/values - Aggregate results, newest version first
#[utoipa::path(
    get,
    path = "/{id}/values",
    tag = WORKFLOW_TAG,
    params(("id" = String, Path, description = "Workflow definition ID"), ValuesQuery),
    responses(
        (status = 200, description = "Aggregate values", body = Vec<WorkflowValueResponse>),
        (status = 403, description = "Private workflow of another user"),
        (status = 404, description = "Workflow not found")
    ),
    security(("bearerAuth" = []))
)]
async fn list_values(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedQuery(query): ValidatedQuery<ValuesQuery>,
) -> AppResult<Json<Vec<WorkflowValueResponse>>> {
    let values = state
        .services
        .workflows
        .values(
            &auth_user.user_id,
            &id,
            query.limit.unwrap_or(DEFAULT_VALUES_PAGE),
        )
        .await?;
    Ok(Json(
        values.into_iter().map(WorkflowValueResponse::from).collect(),
    ))
}

/// POST /api/workflows/{id}/channels - Link channels to a workflow
#[utoipa::path(
    post,
    path = "/{id}/channels",
    tag = WORKFLOW_TAG,
    params(("id" = String, Path, description = "Workflow definition ID")),
    request_body = ChannelIdsRequest,
    responses(
        (status = 200, description = "Links created", body = LinkResponse),
        (status = 403, description = "Not the owner, or a private channel"),
        (status = 404, description = "Workflow or channel not found")
    ),
    security(("bearerAuth" = []))
)]
async fn link_channels(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<ChannelIdsRequest>,
) -> AppResult<Json<LinkResponse>> {
    let affected = state
        .services
        .workflows
        .link_channels(&auth_user.user_id, &id, &req.channel_ids)
        .await?;
    Ok(Json(LinkResponse { affected }))
}

/// DELETE /api/workflows/{id}/channels - Unlink channels from a workflow
#[utoipa::path(
    delete,
    path = "/{id}/channels",
    tag = WORKFLOW_TAG,
    params(("id" = String, Path, description = "Workflow definition ID")),
    request_body = ChannelIdsRequest,
    responses(
        (status = 200, description = "Links removed", body = LinkResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Workflow not found")
    ),
    security(("bearerAuth" = []))
)]
async fn unlink_channels(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<ChannelIdsRequest>,
) -> AppResult<Json<LinkResponse>> {
    let affected = state
        .services
        .workflows
        .unlink_channels(&auth_user.user_id, &id, &req.channel_ids)
        .await?;
    Ok(Json(LinkResponse { affected }))
}
