//! A deterministic `LlmProvider` test double, for use by this crate's and
//! downstream crates' tests without a network call.

use async_trait::async_trait;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

/// Echoes the last user message back as the assistant's reply, never
/// requesting a tool call. Useful for exercising the dispatcher end to end.
pub struct EchoProvider;

#[async_trait]
impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let last_user_text = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::provider::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        Ok(ChatResponse {
            content: format!("echo: {last_user_text}"),
            model: req.model.clone(),
            tokens_in: last_user_text.len() as u32,
            tokens_out: last_user_text.len() as u32,
            stop_reason: "end_turn".to_string(),
            tool_calls: vec![],
        })
    }
}
