use serde::{Deserialize, Serialize};

/// Liveness payload returned by the health endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Health {
    pub status: String,
}

impl Health {
    pub fn up() -> Self {
        Self { status: "up".to_string() }
    }
}
