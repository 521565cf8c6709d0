//! Storage and use-case layer of the user directory.
//! - `storage`: flat-file record store with a lazily loaded in-memory index.
//! - `directory`: orchestrator enforcing existence rules and outcome codes.

pub mod errors;
pub mod storage;
pub mod directory;
