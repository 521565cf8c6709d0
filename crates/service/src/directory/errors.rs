use serde::Serialize;
use thiserror::Error;

/// Outcome of a directory call; `NoError` accompanies every success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum OutcomeCode {
    NoError = 0,
    AlreadyExists = 1,
    NotImplemented = 2,
    Unknown = 3,
    Invalid = 4,
    NotAuthorized = 5,
    InternalError = 6,
}

impl OutcomeCode {
    /// Stable numeric code for external mapping/logging
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn of<T>(result: &Result<T, DirectoryError>) -> Self {
        match result {
            Ok(_) => OutcomeCode::NoError,
            Err(e) => e.code(),
        }
    }
}

/// Business errors of the directory workflows
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user already exists")]
    AlreadyExists,
    #[error("not implemented")]
    NotImplemented,
    #[error("unknown: {0}")]
    Unknown(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("not authorized")]
    NotAuthorized,
    #[error("internal error: {0}")]
    Internal(String),
}

impl DirectoryError {
    pub fn code(&self) -> OutcomeCode {
        match self {
            DirectoryError::AlreadyExists => OutcomeCode::AlreadyExists,
            DirectoryError::NotImplemented => OutcomeCode::NotImplemented,
            DirectoryError::Unknown(_) => OutcomeCode::Unknown,
            DirectoryError::Invalid(_) => OutcomeCode::Invalid,
            DirectoryError::NotAuthorized => OutcomeCode::NotAuthorized,
            DirectoryError::Internal(_) => OutcomeCode::InternalError,
        }
    }
}
