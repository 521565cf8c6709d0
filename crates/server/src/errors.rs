use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use service::directory::{DirectoryError, OutcomeCode};
use service::errors::StoreError;
use thiserror::Error;
use tracing::error;

/// HTTP status and short body text for an outcome code.
pub fn status_for(code: OutcomeCode) -> (StatusCode, &'static str) {
    match code {
        OutcomeCode::NoError => (StatusCode::OK, ""),
        OutcomeCode::AlreadyExists => (StatusCode::CONFLICT, "Already Exists"),
        OutcomeCode::NotImplemented => (StatusCode::NOT_IMPLEMENTED, "Not Implemented"),
        OutcomeCode::Unknown => (StatusCode::NOT_FOUND, "Not Found"),
        OutcomeCode::Invalid => (StatusCode::NOT_ACCEPTABLE, "Invalid Request"),
        OutcomeCode::NotAuthorized => (StatusCode::UNAUTHORIZED, "Not Authorized"),
        OutcomeCode::InternalError => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error"),
    }
}

/// Directory outcome rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub DirectoryError);

impl From<DirectoryError> for ApiError {
    fn from(e: DirectoryError) -> Self { Self(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let (status, body) = status_for(code);
        error!(status = status.as_u16(), code = code.as_u8(), error = %self.0, "app error");
        (status, body).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}
