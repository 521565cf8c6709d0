//! Storage building blocks
//!
//! The record store keeps users and roles in flat CSV files, loads them
//! lazily into memory and rewrites the user table on every mutation under
//! an advisory file lock.

pub mod codec;
pub mod index;
pub mod lock;
pub mod csv_store;

pub use csv_store::{CsvRecordStore, StoreConfig};
pub use index::NameIndex;
