use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use models::User;
use service::directory::DirectoryError;

use crate::auth::ServerState;
use crate::errors::ApiError;

/// Paging values that are absent or not integers count as -1.
fn int_param(params: &HashMap<String, String>, key: &str) -> i64 {
    params.get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(-1)
}

fn decode_user(body: &[u8]) -> Result<User, DirectoryError> {
    serde_json::from_slice(body).map_err(|e| DirectoryError::Invalid(format!("undecodable user: {e}")))
}

pub async fn list_users(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<String>> {
    let search = params.get("search").map(String::as_str).unwrap_or_default();
    let names = state
        .directory
        .list_users(search, int_param(&params, "page"), int_param(&params, "pageSize"))
        .await;
    Json(names)
}

pub async fn create_user(State(state): State<ServerState>, body: Bytes) -> Result<Json<User>, ApiError> {
    let user = decode_user(&body)?;
    Ok(Json(state.directory.create_user(user).await?))
}

pub async fn read_user(State(state): State<ServerState>, Path(name): Path<String>) -> Result<Json<User>, ApiError> {
    Ok(Json(state.directory.read_user(&name).await?))
}

pub async fn update_user(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<User>, ApiError> {
    let mut user = decode_user(&body)?;
    if user.username.is_empty() {
        user.username = name;
    } else if user.username != name {
        return Err(DirectoryError::Invalid(format!("body names '{}' but path names '{name}'", user.username)).into());
    }
    Ok(Json(state.directory.update_user(user).await?))
}

/// Answers with an empty user object on success.
pub async fn delete_user(State(state): State<ServerState>, Path(name): Path<String>) -> Result<Json<User>, ApiError> {
    state.directory.delete_user(&name).await?;
    Ok(Json(User::default()))
}
