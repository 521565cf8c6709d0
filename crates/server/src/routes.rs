use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use service::directory::DirectoryError;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::{self, ServerState};
use crate::errors::ApiError;
use crate::metrics;

pub mod health;
pub mod roles;
pub mod users;

pub const API_PREFIX: &str = "/api/v1/user";

static X_WORKER: HeaderName = HeaderName::from_static("x-worker");
static X_WORKER_VERSION: HeaderName = HeaderName::from_static("x-worker-version");
static X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");
static REMEMBER_ME: HeaderName = HeaderName::from_static("remember-me");

async fn options_ok() -> StatusCode {
    StatusCode::OK
}

async fn not_implemented() -> ApiError {
    ApiError(DirectoryError::NotImplemented)
}

/// Middleware: tag every response with the serving host and version.
async fn stamp_worker(State(state): State<ServerState>, req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&state.worker) {
        headers.insert(X_WORKER.clone(), v);
    }
    if let Ok(v) = HeaderValue::from_str(&state.version) {
        headers.insert(X_WORKER_VERSION.clone(), v);
    }
    resp
}

/// Browser access from any origin, credentials included.
pub fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::POST, Method::PUT, Method::GET, Method::OPTIONS, Method::DELETE])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            X_REQUESTED_WITH.clone(),
            REMEMBER_ME.clone(),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// Build the full application router: public probes plus the key-protected directory API.
pub fn build_router(state: ServerState, cors: CorsLayer) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route(&format!("{API_PREFIX}/health"), get(health::health))
        .route("/metrics", get(metrics::statistics))
        .route(&format!("{API_PREFIX}/metrics"), get(metrics::statistics));

    let api = Router::new()
        .route(
            &format!("{API_PREFIX}/account"),
            get(users::list_users)
                .post(users::create_user)
                .options(options_ok)
                .fallback(not_implemented),
        )
        .route(
            &format!("{API_PREFIX}/account/:name"),
            get(users::read_user)
                .put(users::update_user)
                .delete(users::delete_user)
                .options(options_ok)
                .fallback(not_implemented),
        )
        .route(
            &format!("{API_PREFIX}/roles"),
            get(roles::list_roles).options(options_ok).fallback(not_implemented),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    public
        .merge(api)
        .layer(middleware::from_fn_with_state(state.clone(), stamp_worker))
        .layer(middleware::from_fn_with_state(state.clone(), metrics::record_call))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
        .with_state(state)
}
