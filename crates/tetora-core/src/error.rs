use thiserror::Error;

/// The error taxonomy from spec §7, collapsed into a single enum so the
/// dispatcher and the HTTP layer can classify any failure uniformly.
#[derive(Debug, Error)]
pub enum TetoraError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Transient upstream error: {0}")]
    TransientUpstream(String),

    #[error("Policy violation: {reason}")]
    PolicyViolation { reason: String },

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Task cancelled")]
    Cancelled,

    #[error("Maximum task depth exceeded: {depth} > {max}")]
    DepthExceeded { depth: u32, max: u32 },

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TetoraError {
    /// Short error code string sent to HTTP/SSE clients, per spec §7.
    pub fn code(&self) -> &'static str {
        match self {
            TetoraError::Config(_) => "CONFIG_ERROR",
            TetoraError::PermissionDenied { .. } => "PERMISSION_DENIED",
            TetoraError::Validation(_) => "VALIDATION_ERROR",
            TetoraError::NotFound { .. } => "NOT_FOUND",
            TetoraError::TransientUpstream(_) => "TRANSIENT_UPSTREAM",
            TetoraError::PolicyViolation { .. } => "POLICY_VIOLATION",
            TetoraError::Timeout { .. } => "TIMEOUT",
            TetoraError::Cancelled => "CANCELLED",
            TetoraError::DepthExceeded { .. } => "DEPTH_EXCEEDED",
            TetoraError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            TetoraError::Serialization(_) => "SERIALIZATION_ERROR",
            TetoraError::Io(_) => "IO_ERROR",
            TetoraError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the terminal task state this error implies is `timeout`,
    /// `cancelled`, or plain `error` — used by the dispatcher to set
    /// `TaskResult::status` without re-deriving the mapping at each call site.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TetoraError::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TetoraError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, TetoraError>;
