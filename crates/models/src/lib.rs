//! Directory entities shared by the storage and HTTP layers.

pub mod errors;
pub mod role;
pub mod user;

pub use role::Role;
pub use user::{validate_user, User};
