//! Error handler for converting AppError to HTTP responses.
//!
//! Every error leaves the service as `{code, message, details?, request_id?}`.
//! `global_error_handler` fills in the request ID and wraps the plain-text
//! errors produced by axum itself (unknown route, wrong method) into the same shape.

use axum::{
    Json,
    body::{Body, Bytes},
    extract::Request,
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::api::dto::ErrorResponse;
use crate::api::middleware::RequestId;
use crate::error::AppError;

/// Upper bound on an error body the handler will re-read.
const MAX_ERROR_BODY: usize = 64 * 1024;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = error_to_status_code(&self);
        let code = error_to_code(&self);

        let error_response = match &self {
            AppError::NotFound {
                entity,
                field,
                value,
            } => ErrorResponse::new(code, &self.to_string()).with_details(json!({
                "entity": entity,
                "field": field,
                "value": value,
            })),
            AppError::Duplicate {
                entity,
                field,
                value,
            } => ErrorResponse::new(code, &self.to_string()).with_details(json!({
                "entity": entity,
                "field": field,
                "value": value,
            })),
            AppError::Validation { field, reason } => ErrorResponse::new(code, reason)
                .with_details(json!({
                    "field": field,
                })),
            AppError::BadRequest { message }
            | AppError::Unauthorized { message }
            | AppError::Forbidden { message }
            | AppError::Conflict { message }
            | AppError::InsufficientCredits { message } => ErrorResponse::new(code, message),
            AppError::WorkflowLimitReached { used, allowance } => {
                ErrorResponse::new(code, &self.to_string()).with_details(json!({
                    "used_workflows": used,
                    "total_workflows": allowance,
                }))
            }
            AppError::ExternalCall { service, .. } => {
                tracing::warn!(error = %self, "External call failed");
                ErrorResponse::new(code, &format!("Upstream service {service} failed"))
                    .with_details(json!({ "service": service }))
            }
            AppError::Settlement { operation, .. } => {
                tracing::error!(error = %self.failure_reason(), "Credit settlement failed");
                ErrorResponse::new(code, "Credit settlement failed")
                    .with_details(json!({ "operation": operation }))
            }
            AppError::Database { operation, .. } => {
                tracing::error!(error = %self.failure_reason(), "Database error");
                ErrorResponse::new(code, &format!("Database operation failed: {operation}"))
                    .with_details(json!({ "operation": operation }))
            }
            AppError::Configuration { key, .. } => {
                tracing::error!(error = %self.failure_reason(), "Configuration error");
                ErrorResponse::new(code, &format!("Configuration error: {key}"))
                    .with_details(json!({ "key": key }))
            }
            AppError::ConnectionPool { .. } => {
                tracing::error!(error = %self.failure_reason(), "Connection pool error");
                ErrorResponse::new(code, "Database connection unavailable")
            }
            AppError::Internal { .. } => {
                tracing::error!(error = %self.failure_reason(), "Internal error");
                ErrorResponse::new(code, "An internal error occurred")
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Maps an AppError variant to its HTTP status code.
pub fn error_to_status_code(error: &AppError) -> StatusCode {
    match error {
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Duplicate { .. } | AppError::Conflict { .. } => StatusCode::CONFLICT,
        AppError::Validation { .. } | AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        AppError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
        AppError::Forbidden { .. } | AppError::WorkflowLimitReached { .. } => {
            StatusCode::FORBIDDEN
        }
        AppError::ExternalCall { .. } => StatusCode::BAD_GATEWAY,
        AppError::ConnectionPool { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Settlement { .. }
        | AppError::Database { .. }
        | AppError::Configuration { .. }
        | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Maps an AppError variant to its error code string.
pub fn error_to_code(error: &AppError) -> &'static str {
    match error {
        AppError::NotFound { .. } => "NOT_FOUND",
        AppError::Duplicate { .. } => "DUPLICATE_ENTRY",
        AppError::Validation { .. } => "VALIDATION_ERROR",
        AppError::BadRequest { .. } => "BAD_REQUEST",
        AppError::Unauthorized { .. } => "UNAUTHORIZED",
        AppError::Forbidden { .. } => "FORBIDDEN",
        AppError::Conflict { .. } => "CONFLICT",
        AppError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
        AppError::WorkflowLimitReached { .. } => "WORKFLOW_LIMIT_REACHED",
        AppError::ExternalCall { .. } => "EXTERNAL_CALL_FAILED",
        AppError::Settlement { .. } => "SETTLEMENT_FAILED",
        AppError::Database { .. } => "DATABASE_ERROR",
        AppError::Configuration { .. } => "CONFIGURATION_ERROR",
        AppError::ConnectionPool { .. } => "SERVICE_UNAVAILABLE",
        AppError::Internal { .. } => "INTERNAL_ERROR",
    }
}

fn fallback_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::METHOD_NOT_ALLOWED => "METHOD_NOT_ALLOWED",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "UNSUPPORTED_MEDIA_TYPE",
        StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
        StatusCode::REQUEST_TIMEOUT => "REQUEST_TIMEOUT",
        StatusCode::SERVICE_UNAVAILABLE => "SERVICE_UNAVAILABLE",
        s if s.is_server_error() => "INTERNAL_SERVER_ERROR",
        _ => "UNKNOWN_ERROR",
    }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

/// Normalizes every 4xx/5xx response into an `ErrorResponse` carrying the request ID.
pub async fn global_error_handler(request: Request, next: Next) -> Response {
    let request_id = request.extensions().get::<RequestId>().map(|r| r.0.clone());
    let response = next.run(request).await;

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let json = is_json(&response);
    let (mut parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_ERROR_BODY)
        .await
        .unwrap_or_else(|_| Bytes::new());

    let error_response = if json {
        match serde_json::from_slice::<ErrorResponse>(&bytes) {
            Ok(parsed) => parsed,
            // Some other JSON document; leave it untouched.
            Err(_) => return Response::from_parts(parts, Body::from(bytes)),
        }
    } else {
        let original = String::from_utf8_lossy(&bytes).trim().to_string();
        let message = if original.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        } else {
            original
        };
        ErrorResponse::new(fallback_code(status), &message)
    };

    let error_response = match &request_id {
        Some(id) => error_response.with_request_id(id),
        None => error_response,
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::CONTENT_TYPE);
    let rebuilt = Json(error_response).into_response();
    let (rebuilt_parts, rebuilt_body) = rebuilt.into_parts();
    parts.headers.extend(rebuilt_parts.headers);
    Response::from_parts(parts, rebuilt_body)
}
