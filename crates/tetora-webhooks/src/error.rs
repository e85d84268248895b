use thiserror::Error;

/// Error taxonomy for the webhook pipeline, mapped to the HTTP status codes
/// spec §4.7 names at each step.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("unknown webhook source")]
    UnknownSource,
    #[error("body exceeds the 1 MB limit")]
    BodyTooLarge,
    #[error("signature verification failed: {0}")]
    AuthFailed(String),
    #[error("invalid JSON body: {0}")]
    MalformedJson(String),
}

impl WebhookError {
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookError::UnknownSource => 404,
            WebhookError::BodyTooLarge => 413,
            WebhookError::AuthFailed(_) => 200, // spec: auth failure is a 200 {status:"error",...} body, not a raw 401
            WebhookError::MalformedJson(_) => 400,
        }
    }
}
