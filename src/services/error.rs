use rocket::serde::json::Json;
use crate::ApiError;
use crate::ErrorDetail;

/// Errors raised out of a service call, as opposed to the soft failures the
/// todo operations report inside their result values.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    InternalError(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let detail = Json(ErrorDetail { error: err.to_string() });
        match err {
            ServiceError::Unauthorized => ApiError::Unauthorized(detail),
            ServiceError::InvalidInput(_) => ApiError::InvalidInput(detail),
            ServiceError::InternalError(_) => ApiError::InternalError(detail),
        }
    }
}
