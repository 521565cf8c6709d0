use axum::Json;
use common::types::Health;

pub async fn health() -> Json<Health> {
    Json(Health::up())
}
