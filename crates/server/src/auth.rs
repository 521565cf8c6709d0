use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use service::directory::{DirectoryError, DirectoryService, DirectoryStore};

use crate::errors::ApiError;
use crate::metrics::Metrics;

const BEARER_PREFIX: &str = "bearer ";

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct ServerState {
    pub directory: DirectoryService<dyn DirectoryStore>,
    pub api_key: Arc<str>,
    pub version: Arc<str>,
    pub worker: Arc<str>,
    pub metrics: Arc<Metrics>,
}

/// Token following a case-insensitive `bearer ` prefix.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let prefix = header.get(..BEARER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    Some(&header[BEARER_PREFIX.len()..])
}

pub fn verify_api_key(header: Option<&str>, key: &str) -> Result<(), DirectoryError> {
    match header.and_then(extract_bearer) {
        Some(token) if token == key => Ok(()),
        _ => Err(DirectoryError::NotAuthorized),
    }
}

/// Middleware: require `Authorization: bearer <api key>` on directory routes.
/// Plain `OPTIONS` requests pass through unauthenticated.
pub async fn require_api_key(State(state): State<ServerState>, req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return next.run(req).await;
    }
    let authorization = req.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if let Err(e) = verify_api_key(authorization, &state.api_key) {
        return ApiError(e).into_response();
    }
    next.run(req).await
}
