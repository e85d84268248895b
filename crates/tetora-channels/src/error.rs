use thiserror::Error;

/// Errors raised while adapting an inbound message or delivering an
/// outbound one. Mirrors the one-`thiserror`-enum-per-crate shape used
/// throughout the workspace, with a `.code()` classifier like
/// `tetora_core::error::TetoraError::code()`.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("routing error: {0}")]
    Routing(String),
}

impl ChannelError {
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::ConnectionFailed(_) => "CONNECTION_FAILED",
            ChannelError::SendFailed(_) => "SEND_FAILED",
            ChannelError::AuthFailed(_) => "AUTH_FAILED",
            ChannelError::Timeout { .. } => "TIMEOUT",
            ChannelError::ConfigError(_) => "CONFIG_ERROR",
            ChannelError::Session(_) => "SESSION_ERROR",
            ChannelError::Routing(_) => "ROUTING_ERROR",
        }
    }
}
