pub mod audit;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod payload;
pub mod signature;
pub mod sink;
pub mod template;

pub use audit::{AuditSink, TracingAuditSink};
pub use error::WebhookError;
pub use ingest::{handle_webhook, WebhookOutcome, MAX_BODY_BYTES};
pub use signature::SignatureHeaders;
pub use sink::TaskSink;
