//! Router configuration for the API.

use std::time::Duration;

use axum::{Router, http::StatusCode, middleware};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::doc::ApiDoc;
use crate::api::handlers::{channels, credits, cron, health, workflows};
use crate::api::middleware::{
    auth_middleware, global_error_handler, logging_middleware, request_id_middleware,
};
use crate::state::AppState;

/// Builds the application router.
///
/// Bearer auth guards the workflow, channel and credit groups; health and the
/// schedule callback are public. Middleware runs outermost first: request ID,
/// logging, error normalization, then the handler. Swagger UI is mounted only
/// when `expose_docs` is set.
pub fn create_router(state: AppState, request_timeout: Duration, expose_docs: bool) -> Router {
    let protected = OpenApiRouter::new()
        .nest("/workflows", workflows::workflow_routes())
        .nest("/channels", channels::channel_routes())
        .nest("/credits", credits::credit_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let public = OpenApiRouter::new()
        .nest("/health", health::health_routes())
        .nest("/cron", cron::cron_routes());

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api", protected.merge(public))
        .split_for_parts();

    let router = if expose_docs {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
    } else {
        router
    };

    router
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(middleware::from_fn(global_error_handler))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
