//! Credit balance and usage handlers.

use axum::{Extension, Json, extract::State};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::CREDIT_TAG;
use crate::api::dto::{CreditsResponse, UsageQuery, UsageResponse};
use crate::api::middleware::AuthUser;
use crate::error::AppResult;
use crate::state::AppState;
use crate::utils::validate::ValidatedQuery;

pub fn credit_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(get_credits))
        .routes(routes!(get_usage))
}

/// GET /api/credits - Balance and slot allowance
///
/// First access provisions the account with the configured starting grant.
#[utoipa::path(
    get,
    path = "/",
    tag = CREDIT_TAG,
    responses(
        (status = 200, description = "Credit account", body = CreditsResponse)
    ),
    security(("bearerAuth" = []))
)]
async fn get_credits(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<CreditsResponse>> {
    let account = state.services.credits.account(&auth_user.user_id).await?;
    Ok(Json(CreditsResponse::from(account)))
}

/// GET /api/credits/usage - Consumption and income entries, newest first
#[utoipa::path(
    get,
    path = "/usage",
    tag = CREDIT_TAG,
    params(UsageQuery),
    responses(
        (status = 200, description = "Audit log with the distinct filter values", body = UsageResponse)
    ),
    security(("bearerAuth" = []))
)]
async fn get_usage(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedQuery(query): ValidatedQuery<UsageQuery>,
) -> AppResult<Json<UsageResponse>> {
    let report = state
        .services
        .credits
        .usage(&auth_user.user_id, query.into())
        .await?;
    Ok(Json(UsageResponse::from(report)))
}
