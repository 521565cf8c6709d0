//! Directory use cases: the single entry point for every read and mutation
//! of users and roles.
//!
//! Three layers, mirroring the rest of the service crate:
//! - `repository`: the `DirectoryStore` seam and an in-memory implementation
//! - `errors`: the closed outcome taxonomy handed to the transport
//! - `service`: existence rules and error mapping

pub mod errors;
pub mod repository;
pub mod service;

pub use errors::{DirectoryError, OutcomeCode};
pub use repository::DirectoryStore;
pub use service::DirectoryService;
