//! Channel registration and message ingest handlers.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::CHANNEL_TAG;
use crate::api::dto::{
    ChannelResponse, IngestMessagesRequest, IngestResponse, UpsertChannelRequest,
};
use crate::api::middleware::AuthUser;
use crate::error::AppResult;
use crate::state::AppState;
use crate::utils::validate::ValidatedJson;

pub fn channel_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(upsert_channel))
        .routes(routes!(ingest_messages))
}

/// POST /api/channels - Register or refresh a channel
///
/// The first user to register a channel id owns it.
#[utoipa::path(
    post,
    path = "/",
    tag = CHANNEL_TAG,
    request_body = UpsertChannelRequest,
    responses(
        (status = 200, description = "Channel stored", body = ChannelResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Channel owned by another user")
    ),
    security(("bearerAuth" = []))
)]
async fn upsert_channel(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<UpsertChannelRequest>,
) -> AppResult<Json<ChannelResponse>> {
    let channel = state
        .services
        .workflows
        .upsert_channel(&auth_user.user_id, req.into_draft())
        .await?;
    Ok(Json(ChannelResponse::from(channel)))
}

/// POST /api/channels/{id}/messages - Store a batch of synced messages
///
/// Messages already stored are ignored.
#[utoipa::path(
    post,
    path = "/{id}/messages",
    tag = CHANNEL_TAG,
    params(("id" = String, Path, description = "Channel ID")),
    request_body = IngestMessagesRequest,
    responses(
        (status = 200, description = "Batch stored", body = IngestResponse),
        (status = 403, description = "Channel owned by another user"),
        (status = 404, description = "Channel not found")
    ),
    security(("bearerAuth" = []))
)]
async fn ingest_messages(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<IngestMessagesRequest>,
) -> AppResult<Json<IngestResponse>> {
    let batch = req.into_new_messages(&id);
    let submitted = batch.len();
    let inserted = state
        .services
        .workflows
        .ingest_messages(&auth_user.user_id, &id, batch)
        .await?;
    Ok(Json(IngestResponse {
        submitted,
        inserted,
    }))
}
