use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("invalid job action: {0}")]
    InvalidAction(String),

    #[error("job not found: {id}")]
    JobNotFound { id: String },
}

impl SchedulerError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Database(_) => "DATABASE_ERROR",
            SchedulerError::InvalidSchedule(_) => "INVALID_SCHEDULE",
            SchedulerError::InvalidAction(_) => "INVALID_ACTION",
            SchedulerError::JobNotFound { .. } => "JOB_NOT_FOUND",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
