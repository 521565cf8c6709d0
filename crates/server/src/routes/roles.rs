use axum::{extract::State, Json};

use crate::auth::ServerState;
use crate::errors::ApiError;

/// Names from the role catalog, in file order.
pub async fn list_roles(State(state): State<ServerState>) -> Result<Json<Vec<String>>, ApiError> {
    let roles = state.directory.read_roles().await?;
    Ok(Json(roles))
}
