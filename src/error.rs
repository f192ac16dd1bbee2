use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::content::ContentError;
use crate::registration::RegistrationError;
use crate::upload::UploadError;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Upstream(String),
    Internal(String),
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ContentError> for ApiError {
    fn from(value: ContentError) -> Self {
        match value {
            ContentError::Unauthorized => ApiError::Forbidden(value.to_string()),
            ContentError::MissingFile | ContentError::InvalidImage(_) => {
                ApiError::BadRequest(value.to_string())
            }
            ContentError::CoachNotFound(_) => ApiError::NotFound(value.to_string()),
            ContentError::Upload(UploadError::NotConfigured(_)) => {
                ApiError::ServiceUnavailable(value.to_string())
            }
            ContentError::Upload(err) => {
                error!("Upload error: {err}");
                ApiError::Upstream("Failed to upload image.".into())
            }
            ContentError::Remote { context, source } => {
                error!("Store error while trying to {context}: {source}");
                ApiError::Upstream(format!("Failed to {context}."))
            }
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(value: RegistrationError) -> Self {
        match value {
            RegistrationError::Invalid(msg) => ApiError::BadRequest(msg),
            RegistrationError::Rejected(msg) => ApiError::Upstream(msg),
            RegistrationError::Http(err) => {
                error!("HTTP error: {err}");
                ApiError::Upstream("Failed to reach the registration service".into())
            }
            RegistrationError::Url(err) => {
                error!("Invalid payments URL: {err}");
                ApiError::Internal("Registration service is misconfigured".into())
            }
        }
    }
}
