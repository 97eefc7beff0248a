use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("NETWORK_FAILURE: {0}")]
    Network(String),
    #[error("CONFLICT: {0}")]
    Conflict(String),
    #[error("DUPLICATE_INVITE: {0}")]
    Duplicate(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("SELF_INVITE: you can't invite yourself")]
    SelfInvite,
    #[error("ALREADY_MEMBER: {0}")]
    AlreadyMember(String),
    #[error("UNAUTHORIZED: {0}")]
    Unauthorized(String),
    #[error("INVARIANT: {0}")]
    Invariant(String),
    #[error("STORAGE: {0}")]
    Storage(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
