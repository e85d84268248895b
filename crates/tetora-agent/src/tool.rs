//! Tool trait and policy enforcement. Grounded on
//! `skynet-agent/src/tools/mod.rs`'s `Tool` trait and `ToolResult`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tetora_core::config::{SandboxRequirement, ToolPolicyConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    /// Whether this tool needs a sandbox to run safely (e.g. shell/file
    /// access tools). Used against `ToolPolicyConfig::sandbox`.
    fn requires_sandbox(&self) -> bool {
        false
    }
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
}

pub fn to_definitions(tools: &[Box<dyn Tool>]) -> Vec<crate::provider::ToolDefinition> {
    tools
        .iter()
        .map(|t| crate::provider::ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("tool '{0}' is denied by role policy")]
    Denied(String),

    #[error("tool '{0}' is not in the role's allow list")]
    NotAllowed(String),

    #[error("tool '{0}' requires a sandbox, none is available")]
    SandboxRequired(String),
}

/// Check `tool` against `policy` before it's allowed to execute. Deny list
/// always wins; a non-empty allow list is then an exclusive allow-list;
/// finally, a tool that requires a sandbox can't run when none is attached.
pub fn enforce_tool_policy(
    tool: &dyn Tool,
    policy: &ToolPolicyConfig,
    sandbox_available: bool,
) -> Result<(), PolicyError> {
    let name = tool.name();

    if policy.deny.iter().any(|d| d == name) {
        return Err(PolicyError::Denied(name.to_string()));
    }

    if !policy.allow.is_empty() && !policy.allow.iter().any(|a| a == name) {
        return Err(PolicyError::NotAllowed(name.to_string()));
    }

    if tool.requires_sandbox() && policy.sandbox == SandboxRequirement::Required && !sandbox_available
    {
        return Err(PolicyError::SandboxRequired(name.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTool {
        name: &'static str,
        sandboxed: bool,
    }

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "fake"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn requires_sandbox(&self) -> bool {
            self.sandboxed
        }
        async fn execute(&self, _input: serde_json::Value) -> ToolResult {
            ToolResult::success("ok")
        }
    }

    #[test]
    fn deny_list_blocks_even_without_allow_list() {
        let tool = FakeTool { name: "bash", sandboxed: false };
        let mut policy = ToolPolicyConfig::default();
        policy.deny = vec!["bash".to_string()];
        assert!(matches!(
            enforce_tool_policy(&tool, &policy, true),
            Err(PolicyError::Denied(_))
        ));
    }

    #[test]
    fn non_empty_allow_list_excludes_unlisted_tools() {
        let tool = FakeTool { name: "bash", sandboxed: false };
        let mut policy = ToolPolicyConfig::default();
        policy.allow = vec!["read_file".to_string()];
        assert!(matches!(
            enforce_tool_policy(&tool, &policy, true),
            Err(PolicyError::NotAllowed(_))
        ));
    }

    #[test]
    fn sandboxed_tool_blocked_without_sandbox() {
        let tool = FakeTool { name: "bash", sandboxed: true };
        let mut policy = ToolPolicyConfig::default();
        policy.sandbox = SandboxRequirement::Required;
        assert!(matches!(
            enforce_tool_policy(&tool, &policy, false),
            Err(PolicyError::SandboxRequired(_))
        ));
    }

    #[test]
    fn unrestricted_policy_allows_anything() {
        let tool = FakeTool { name: "bash", sandboxed: false };
        let policy = ToolPolicyConfig::default();
        assert!(enforce_tool_policy(&tool, &policy, false).is_ok());
    }
}
