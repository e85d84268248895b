use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {key}")]
    NotFound { key: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Expected format: `channel:{channel}:ext:{external_id}[:user:{user_id}]`.
    #[error("invalid session key: {0}")]
    InvalidKey(String),

    #[error("compaction already running for session {0}")]
    CompactionInProgress(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
