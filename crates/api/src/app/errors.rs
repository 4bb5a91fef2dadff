use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use invoicer_core::DomainError;

/// Error type of every handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    /// Malformed request body or query that never reached a service.
    #[error("{message}")]
    BadRequest { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Unauthorized => json_error(StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            ApiError::BadRequest { message } => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let status = match &err {
        DomainError::Validation { .. } => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::AccessDenied(_) => StatusCode::FORBIDDEN,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::External(_) => StatusCode::BAD_GATEWAY,
    };
    if status == StatusCode::BAD_GATEWAY {
        tracing::error!(error = %err, "collaborator failure");
    }
    let message = match &err {
        DomainError::Validation { message, .. } => message.clone(),
        other => other.to_string(),
    };
    json_error(status, err.code(), message)
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_kinds_map_to_http_statuses() {
        let cases = [
            (DomainError::validation("x", "bad"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("gone"), StatusCode::NOT_FOUND),
            (DomainError::access_denied("no"), StatusCode::FORBIDDEN),
            (DomainError::conflict("taken"), StatusCode::CONFLICT),
            (DomainError::external("smtp down"), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
        assert_eq!(ApiError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
