//! System prompt assembly: role soul file + description, wrapped with the
//! live session/task context. A deliberately smaller version of the
//! teacher's 3-tier cache-breakpoint `SystemPrompt`
//! (`skynet-agent/src/prompt.rs`) — spec §1's non-goals exclude prompting
//! strategy beyond context windowing, so the cache-tier machinery (which
//! exists purely to optimize Anthropic-specific prompt caching cost, not to
//! satisfy any invariant this spec names) isn't reproduced here. What's
//! kept is the teacher's ordering: static role identity first, then
//! situational context, so a provider-level cache breakpoint inserted later
//! would still land in the right place.

use tetora_core::config::RoleConfig;

/// Build the system prompt for a role, given its optional soul-file content
/// (already read by the caller — file I/O is out of this crate's scope)
/// and the live context line appended last.
pub fn build_system_prompt(role: &RoleConfig, soul_text: Option<&str>, context_line: &str) -> String {
    let mut parts = Vec::new();

    if let Some(soul) = soul_text {
        parts.push(soul.to_string());
    } else if !role.description.is_empty() {
        parts.push(role.description.clone());
    }

    if !context_line.is_empty() {
        parts.push(context_line.to_string());
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_role_description_without_a_soul_file() {
        let mut role = RoleConfig {
            soul_file: None,
            model: "test-model".into(),
            description: "You are the coordinator.".into(),
            permission_mode: Default::default(),
            trust_level: 1,
            tool_policy: Default::default(),
        };
        role.description = "You are the coordinator.".into();
        let prompt = build_system_prompt(&role, None, "");
        assert_eq!(prompt, "You are the coordinator.");
    }

    #[test]
    fn appends_context_line_last() {
        let role = RoleConfig {
            soul_file: Some("soul.md".into()),
            model: "test-model".into(),
            description: String::new(),
            permission_mode: Default::default(),
            trust_level: 1,
            tool_policy: Default::default(),
        };
        let prompt = build_system_prompt(&role, Some("You are Luna."), "session: main, turn 4");
        assert_eq!(prompt, "You are Luna.\n\nsession: main, turn 4");
    }
}
