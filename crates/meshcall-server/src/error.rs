use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use meshcall_shared::api::ErrorResponse;
use meshcall_shared::DirectoryError;
use meshcall_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DirectoryError> for ServerError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::CallNotFound(id) => ServerError::CallNotFound(id),
            DirectoryError::Rejected(reason) => ServerError::BadRequest(reason),
            DirectoryError::Unavailable(reason) => ServerError::Storage(reason),
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        ServerError::Storage(e.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::CallNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Storage(reason) => {
                tracing::error!(error = %reason, "storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
