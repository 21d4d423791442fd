use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::errors::DomainError;

/// Error de la capa HTTP: un `DomainError` con su código de estado.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self(DomainError::InvalidInput(format!("multipart: {e}")))
    }
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            DomainError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            DomainError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            DomainError::ResourceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "RESOURCE_UNAVAILABLE"),
            DomainError::DetectionUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "DETECTION_UNAVAILABLE"),
            DomainError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            DomainError::OperationFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        let message = match &self.0 {
            DomainError::NotFound(m)
            | DomainError::InvalidInput(m)
            | DomainError::Forbidden(m)
            | DomainError::ResourceUnavailable(m)
            | DomainError::DetectionUnavailable(m)
            | DomainError::OperationFailed(m) => m.clone(),
            DomainError::Timeout(_) => self.0.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error_code, message = %message, "Request error");
        } else {
            tracing::debug!(status = %status, error_code, message = %message, "Request rejected");
        }

        (status, Json(json!({ "error": message, "error_code": error_code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (DomainError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (DomainError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (DomainError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (DomainError::ResourceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (DomainError::Timeout(Duration::from_secs(2)), StatusCode::GATEWAY_TIMEOUT),
            (DomainError::OperationFailed("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }
}
