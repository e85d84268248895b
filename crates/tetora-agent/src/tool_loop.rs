//! Tool execution loop. Grounded on `skynet-agent/src/tools/tool_loop.rs`:
//! prompt → LLM → if tool_use → execute tools → inject results → LLM →
//! repeat, stopping when `stop_reason != "tool_use"`, the iteration cap is
//! hit, or the provider errors. Adds per-call policy enforcement and
//! optional event-sink streaming, neither of which the teacher's version
//! needed (its tools ran with a single fixed trust level).

use tetora_core::config::ToolPolicyConfig;
use tetora_core::types::{SseEvent, SseEventType, TaskId};
use tetora_events::EventBroker;
use tracing::{debug, info, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use crate::tool::{enforce_tool_policy, Tool, ToolResult};

const MAX_ITERATIONS: usize = 25;

/// Where to stream `tool_call`/`tool_result` events as the loop runs.
pub struct EventSink<'a> {
    pub broker: &'a EventBroker,
    pub task_id: &'a TaskId,
}

pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    initial_request: ChatRequest,
    tools: &[Box<dyn Tool>],
    policy: &ToolPolicyConfig,
    sandbox_available: bool,
    sink: Option<&EventSink<'_>>,
) -> Result<ChatResponse, ProviderError> {
    let mut raw_messages: Vec<serde_json::Value> = match &initial_request.raw_messages {
        Some(raw) => raw.clone(),
        None => initial_request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect(),
    };

    let mut last_response: Option<ChatResponse> = None;

    for iteration in 0..MAX_ITERATIONS {
        let mut req = initial_request.clone();
        req.raw_messages = Some(raw_messages.clone());

        debug!(iteration, "tool loop iteration");
        let response = provider.send(&req).await?;

        if !response.is_tool_use() {
            info!(iteration, "tool loop complete — no more tool calls");
            return Ok(response);
        }

        let mut assistant_content: Vec<serde_json::Value> = Vec::new();
        if !response.content.is_empty() {
            assistant_content.push(serde_json::json!({ "type": "text", "text": response.content }));
        }
        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
        }
        raw_messages.push(serde_json::json!({ "role": "assistant", "content": assistant_content }));

        let mut tool_result_content: Vec<serde_json::Value> = Vec::new();
        for call in &response.tool_calls {
            if let Some(sink) = sink {
                sink.broker.publish(SseEvent::new(
                    SseEventType::ToolCall,
                    sink.task_id.clone(),
                    serde_json::json!({ "name": call.name, "input": call.input }),
                ));
            }

            let result = execute_tool_with_policy(tools, call, policy, sandbox_available).await;

            if let Some(sink) = sink {
                sink.broker.publish(SseEvent::new(
                    SseEventType::ToolResult,
                    sink.task_id.clone(),
                    serde_json::json!({ "name": call.name, "is_error": result.is_error }),
                ));
            }

            tool_result_content.push(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": call.id,
                "content": result.content,
                "is_error": result.is_error,
            }));
        }
        raw_messages.push(serde_json::json!({ "role": "user", "content": tool_result_content }));

        last_response = Some(response);
    }

    warn!(max_iterations = MAX_ITERATIONS, "tool loop hit maximum iterations");
    last_response.ok_or_else(|| {
        ProviderError::Parse(format!("tool loop exceeded {MAX_ITERATIONS} iterations without a final response"))
    })
}

async fn execute_tool_with_policy(
    tools: &[Box<dyn Tool>],
    call: &crate::provider::ToolCall,
    policy: &ToolPolicyConfig,
    sandbox_available: bool,
) -> ToolResult {
    let Some(tool) = tools.iter().find(|t| t.name() == call.name) else {
        return ToolResult::error(format!("unknown tool: {}", call.name));
    };

    if let Err(e) = enforce_tool_policy(tool.as_ref(), policy, sandbox_available) {
        return ToolResult::error(e.to_string());
    }

    debug!(tool = %call.name, "executing tool");
    tool.execute(call.input.clone()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Message, Role, ToolCall};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(ChatResponse {
                    content: String::new(),
                    model: "test-model".into(),
                    tokens_in: 10,
                    tokens_out: 5,
                    stop_reason: "tool_use".into(),
                    tool_calls: vec![ToolCall {
                        id: "call-1".into(),
                        name: "echo".into(),
                        input: serde_json::json!({"text": "hi"}),
                    }],
                })
            } else {
                Ok(ChatResponse {
                    content: "done".into(),
                    model: "test-model".into(),
                    tokens_in: 10,
                    tokens_out: 5,
                    stop_reason: "end_turn".into(),
                    tool_calls: vec![],
                })
            }
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        async fn execute(&self, input: serde_json::Value) -> ToolResult {
            ToolResult::success(input["text"].as_str().unwrap_or_default())
        }
    }

    fn base_request() -> ChatRequest {
        ChatRequest {
            model: "test-model".into(),
            system: "you are a test agent".into(),
            messages: vec![Message { role: Role::User, content: "hello".into() }],
            max_tokens: 100,
            tools: vec![],
            raw_messages: None,
        }
    }

    #[tokio::test]
    async fn loop_executes_tool_then_returns_final_response() {
        let provider = ScriptedProvider { calls: Arc::new(AtomicUsize::new(0)) };
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(EchoTool)];
        let policy = ToolPolicyConfig::default();

        let result = run_tool_loop(&provider, base_request(), &tools, &policy, false, None)
            .await
            .unwrap();

        assert_eq!(result.content, "done");
        assert!(!result.is_tool_use());
    }

    #[tokio::test]
    async fn denied_tool_returns_error_result_without_aborting_loop() {
        let provider = ScriptedProvider { calls: Arc::new(AtomicUsize::new(0)) };
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(EchoTool)];
        let mut policy = ToolPolicyConfig::default();
        policy.deny = vec!["echo".to_string()];

        let result = run_tool_loop(&provider, base_request(), &tools, &policy, false, None)
            .await
            .unwrap();

        assert_eq!(result.content, "done");
    }

    #[tokio::test]
    async fn events_are_published_for_each_tool_call() {
        let provider = ScriptedProvider { calls: Arc::new(AtomicUsize::new(0)) };
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(EchoTool)];
        let policy = ToolPolicyConfig::default();

        let broker = EventBroker::new();
        let task_id = TaskId::new();
        let (mut rx, _sub) = broker.subscribe(task_id.clone());
        let sink = EventSink { broker: &broker, task_id: &task_id };

        run_tool_loop(&provider, base_request(), &tools, &policy, false, Some(&sink))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type, SseEventType::ToolCall);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event_type, SseEventType::ToolResult);
    }
}
