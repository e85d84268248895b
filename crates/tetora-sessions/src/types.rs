//! Channel-centric session key and the complexity classifier.
//!
//! Unlike a user-centric key (`user:{id}:agent:{id}:{name}`, one session
//! following a person across every channel they use), spec §3 defines
//! session identity as `(channel, externalChannelId, [userId])` — Alice on
//! Telegram and Alice on Discord get distinct sessions, because the two
//! channels are different conversational surfaces with different histories.

use serde::{Deserialize, Serialize};
use tetora_core::types::Source;

use crate::error::{Result, SessionError};

/// Structured, channel-centric session key.
///
/// Format: `channel:{channel}:ext:{external_id}` optionally followed by
/// `:user:{user_id}`. `external_id` may itself contain colons (e.g. a
/// Discord `guild/channel` pair); the optional `:user:` suffix is found via
/// `rfind` so it doesn't have to worry about colons earlier in the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub channel: String,
    pub external_id: String,
    pub user_id: Option<String>,
}

impl SessionKey {
    pub fn new(
        channel: impl Into<String>,
        external_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            external_id: external_id.into(),
            user_id,
        }
    }

    pub fn format(&self) -> String {
        match &self.user_id {
            Some(uid) => format!("channel:{}:ext:{}:user:{}", self.channel, self.external_id, uid),
            None => format!("channel:{}:ext:{}", self.channel, self.external_id),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("channel:")
            .ok_or_else(|| SessionError::InvalidKey(format!("missing 'channel:' prefix: {s}")))?;

        let ext_marker = ":ext:";
        let ext_pos = rest
            .find(ext_marker)
            .ok_or_else(|| SessionError::InvalidKey(format!("missing ':ext:' segment: {s}")))?;

        let channel = &rest[..ext_pos];
        let after_ext = &rest[ext_pos + ext_marker.len()..];

        let user_marker = ":user:";
        let (external_id, user_id) = match after_ext.rfind(user_marker) {
            Some(pos) => (
                &after_ext[..pos],
                Some(after_ext[pos + user_marker.len()..].to_string()),
            ),
            None => (after_ext, None),
        };

        if channel.is_empty() || external_id.is_empty() {
            return Err(SessionError::InvalidKey(format!(
                "key components must not be empty: {s}"
            )));
        }

        Ok(Self {
            channel: channel.to_string(),
            external_id: external_id.to_string(),
            user_id,
        })
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
    pub task_id: Option<String>,
    pub model: Option<String>,
    pub cost_usd: Option<f64>,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
}

/// A persisted, per-channel conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub key: SessionKey,
    pub role: String,
    pub title: Option<String>,
    pub message_count: u32,
    pub cost_usd: f64,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Output of the complexity classifier, governing both the number of
/// history messages pulled into context (`N`) and the session's character
/// budget for that context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Standard,
    Complex,
}

impl Complexity {
    pub fn history_window(&self) -> usize {
        match self {
            Complexity::Simple => 5,
            Complexity::Standard => 10,
            Complexity::Complex => 20,
        }
    }

    pub fn char_budget(&self) -> usize {
        match self {
            Complexity::Simple => 4_000,
            Complexity::Standard => 8_000,
            Complexity::Complex => 16_000,
        }
    }
}

/// Non-interactive-style sources that are always treated as complex,
/// regardless of prompt content, per spec §4.4.
const ALWAYS_COMPLEX_PREFIXES: &[&str] = &["cron", "workflow", "agent_dispatch"];

/// A small coding vocabulary used to flag technical prompts as complex even
/// when they're short — mirrors the router's keyword-matching approach
/// (whole word for ASCII, substring for CJK) rather than introducing a
/// second matching strategy.
const CODING_KEYWORDS_EN: &[&str] = &[
    "code", "function", "bug", "error", "deploy", "refactor", "debug", "compile", "api", "database",
    "query", "regex", "stacktrace", "exception", "test", "build",
];
const CODING_KEYWORDS_CJK: &[&str] = &["代码", "函数", "部署", "调试", "数据库", "报错"];

const SIMPLE_MAX_RUNES: usize = 100;
const COMPLEX_MIN_RUNES: usize = 2_000;

/// Pure function of `(prompt, source)`, per spec §4.4.
pub fn classify_complexity(prompt: &str, source: &Source) -> Complexity {
    let head = source.as_str().split(':').next().unwrap_or(source.as_str());
    if ALWAYS_COMPLEX_PREFIXES.contains(&head) {
        return Complexity::Complex;
    }

    let rune_len = prompt.chars().count();
    if rune_len > COMPLEX_MIN_RUNES {
        return Complexity::Complex;
    }

    if contains_coding_vocabulary(prompt) {
        return Complexity::Complex;
    }

    if source.is_interactive() && rune_len < SIMPLE_MAX_RUNES {
        return Complexity::Simple;
    }

    Complexity::Standard
}

fn contains_coding_vocabulary(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if CODING_KEYWORDS_EN.iter().any(|kw| words.contains(kw)) {
        return true;
    }
    CODING_KEYWORDS_CJK.iter().any(|kw| lower.contains(kw))
}
