//! The end-to-end pipeline (spec §4.7 steps 1-6), generalizing
//! `skynet-gateway::http::webhooks::webhook_handler`'s auth-then-forward
//! shape with the filter and template-expansion stages the teacher never
//! had, plus support for all three header schemes from spec §6.

use serde_json::Value;
use tetora_core::config::WebhookSourceConfig;
use tetora_core::types::{Task, TaskId};

use crate::audit::AuditSink;
use crate::error::WebhookError;
use crate::filter::evaluate;
use crate::signature::{verify, SignatureHeaders};
use crate::sink::TaskSink;
use crate::template::expand;

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Outcome of a successfully-processed request — the body spec §4.7/§8
/// expects the HTTP layer to return with status 200 in every case except
/// the body-too-large / malformed-JSON / unknown-source rejections,
/// which the caller maps via `WebhookError::status_code`.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Accepted { task_id: TaskId },
    Filtered,
    AuthError { message: String },
}

/// Run one webhook request through the full pipeline. `body` has already
/// been read by the caller's HTTP layer; `client_ip` is used for audit
/// logging only.
pub async fn handle_webhook(
    source: &WebhookSourceConfig,
    headers: &SignatureHeaders,
    body: &[u8],
    client_ip: &str,
    sink: &dyn TaskSink,
    audit: &dyn AuditSink,
) -> Result<WebhookOutcome, WebhookError> {
    if body.len() > MAX_BODY_BYTES {
        return Err(WebhookError::BodyTooLarge);
    }

    if !source.enabled {
        return Err(WebhookError::UnknownSource);
    }

    if let Some(secret) = &source.secret {
        if let Err(reason) = verify(headers, body, secret) {
            audit
                .record("webhook.incoming.auth_fail", &source.name, client_ip, &reason)
                .await;
            return Ok(WebhookOutcome::AuthError { message: format!("signature {reason}") });
        }
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| WebhookError::MalformedJson(e.to_string()))?;

    if !evaluate(&source.filter, &payload) {
        audit
            .record("webhook.incoming.filtered", &source.name, client_ip, &source.filter)
            .await;
        return Ok(WebhookOutcome::Filtered);
    }

    let prompt = expand(&source.template, &payload);
    let mut task = Task::new(prompt, format!("webhook:{}", source.name).as_str());
    task.role = source.target_role.clone();

    let task_id = sink.submit(task).await;
    Ok(WebhookOutcome::Accepted { task_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    fn source(template: &str, secret: Option<&str>, filter: &str) -> WebhookSourceConfig {
        WebhookSourceConfig {
            name: "gh".to_string(),
            target_role: None,
            template: template.to_string(),
            secret: secret.map(String::from),
            filter: filter.to_string(),
            workflow: None,
            enabled: true,
        }
    }

    struct RecordingSink {
        tasks: Mutex<Vec<Task>>,
    }

    #[async_trait]
    impl TaskSink for RecordingSink {
        async fn submit(&self, task: Task) -> TaskId {
            let id = task.id.clone();
            self.tasks.lock().unwrap().push(task);
            id
        }
    }

    struct NoopAudit {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AuditSink for NoopAudit {
        async fn record(&self, event: &str, _source: &str, _client_ip: &str, _detail: &str) {
            self.calls.lock().unwrap().push(event.to_string());
        }
    }

    #[tokio::test]
    async fn scenario_b_valid_signature_passing_filter_dispatches_a_task() {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;
        let body = br#"{"action":"opened","pull_request":{"title":"Fix","html_url":"u"}}"#;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cret").unwrap();
        mac.update(body);
        let sig = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        let src = source(
            "Review: {{payload.pull_request.title}} ({{payload.pull_request.html_url}})",
            Some("s3cret"),
            "payload.action == 'opened'",
        );
        let headers = SignatureHeaders { hub_signature_256: Some(sig), ..Default::default() };
        let sink = Arc::new(RecordingSink { tasks: Mutex::new(vec![]) });
        let audit = NoopAudit { calls: Mutex::new(vec![]) };

        let outcome = handle_webhook(&src, &headers, body, "1.2.3.4", sink.as_ref(), &audit)
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Accepted { .. }));
        let tasks = sink.tasks.lock().unwrap();
        assert_eq!(tasks[0].prompt, "Review: Fix (u)");
        assert_eq!(tasks[0].source.as_str(), "webhook:gh");
    }

    #[tokio::test]
    async fn scenario_c_filtered_action_returns_filtered_without_dispatching() {
        let body = br#"{"action":"closed"}"#;
        let src = source("t", None, "payload.action == 'opened'");
        let headers = SignatureHeaders::default();
        let sink = RecordingSink { tasks: Mutex::new(vec![]) };
        let audit = NoopAudit { calls: Mutex::new(vec![]) };

        let outcome = handle_webhook(&src, &headers, body, "1.2.3.4", &sink, &audit).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Filtered);
        assert!(sink.tasks.lock().unwrap().is_empty());
        assert_eq!(audit.calls.lock().unwrap()[0], "webhook.incoming.filtered");
    }

    #[tokio::test]
    async fn scenario_d_tampered_body_returns_auth_error_and_audits() {
        let body = br#"{"action":"opened"}"#;
        let src = source("t", Some("s3cret"), "");
        let headers = SignatureHeaders { hub_signature_256: Some("sha256=deadbeef".to_string()), ..Default::default() };
        let sink = RecordingSink { tasks: Mutex::new(vec![]) };
        let audit = NoopAudit { calls: Mutex::new(vec![]) };

        let outcome = handle_webhook(&src, &headers, body, "1.2.3.4", &sink, &audit).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::AuthError { .. }));
        assert_eq!(audit.calls.lock().unwrap()[0], "webhook.incoming.auth_fail");
    }

    #[tokio::test]
    async fn secret_set_but_no_signature_header_present_rejects() {
        let body = br#"{"a":1}"#;
        let src = source("t", Some("s3cret"), "");
        let headers = SignatureHeaders::default();
        let sink = RecordingSink { tasks: Mutex::new(vec![]) };
        let audit = NoopAudit { calls: Mutex::new(vec![]) };

        let outcome = handle_webhook(&src, &headers, body, "1.2.3.4", &sink, &audit).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::AuthError { .. }));
    }

    #[tokio::test]
    async fn body_over_the_limit_is_rejected_before_any_parsing() {
        let src = source("t", None, "");
        let headers = SignatureHeaders::default();
        let sink = RecordingSink { tasks: Mutex::new(vec![]) };
        let audit = NoopAudit { calls: Mutex::new(vec![]) };
        let body = vec![b'x'; MAX_BODY_BYTES + 1];

        let err = handle_webhook(&src, &headers, &body, "1.2.3.4", &sink, &audit).await.unwrap_err();
        assert!(matches!(err, WebhookError::BodyTooLarge));
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let src = source("t", None, "");
        let headers = SignatureHeaders::default();
        let sink = RecordingSink { tasks: Mutex::new(vec![]) };
        let audit = NoopAudit { calls: Mutex::new(vec![]) };

        let err = handle_webhook(&src, &headers, b"not json", "1.2.3.4", &sink, &audit).await.unwrap_err();
        assert!(matches!(err, WebhookError::MalformedJson(_)));
    }

    #[tokio::test]
    async fn no_secret_configured_skips_verification_entirely() {
        let body = br#"{"a":1}"#;
        let src = source("t", None, "");
        let headers = SignatureHeaders::default();
        let sink = RecordingSink { tasks: Mutex::new(vec![]) };
        let audit = NoopAudit { calls: Mutex::new(vec![]) };

        let outcome = handle_webhook(&src, &headers, body, "1.2.3.4", &sink, &audit).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Accepted { .. }));
    }
}
