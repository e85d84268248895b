//! Top-level configuration: a `tetora.toml` file merged with `TETORA_*`
//! environment overrides via `figment`, the same layering
//! `skynet_core::config::SkynetConfig::load` used.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, TetoraError};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Global concurrency capacity `C` (spec §5).
pub const DEFAULT_SLOT_CAPACITY: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TetoraConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub slots: SlotConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,
}

impl Default for TetoraConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            slots: SlotConfig::default(),
            dispatcher: DispatcherConfig::default(),
            routing: RoutingConfig::default(),
            sessions: SessionConfig::default(),
            webhooks: WebhooksConfig::default(),
            channels: ChannelsConfig::default(),
            roles: HashMap::new(),
        }
    }
}

impl TetoraConfig {
    /// Load config from a TOML file with `TETORA_*` env var overrides.
    ///
    /// Checks, in order: explicit path argument, `$TETORA_CONFIG`,
    /// `~/.tetora/tetora.toml`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TetoraConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TETORA_").split("__"))
            .extract()
            .map_err(|e| TetoraError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.tetora/tetora.toml")
}

fn bool_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// C2 slot-pressure guard configuration (spec §3 `Slot state`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_reserved_slots")]
    pub reserved_slots: usize,
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: usize,
    #[serde(default = "default_non_interactive_timeout_ms")]
    pub non_interactive_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    #[serde(default = "default_alert_cooldown_secs")]
    pub alert_cooldown_secs: u64,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            reserved_slots: default_reserved_slots(),
            warn_threshold: default_warn_threshold(),
            non_interactive_timeout_ms: default_non_interactive_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            monitor_interval_secs: default_monitor_interval_secs(),
            alert_cooldown_secs: default_alert_cooldown_secs(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_SLOT_CAPACITY
}
fn default_reserved_slots() -> usize {
    2
}
fn default_warn_threshold() -> usize {
    3
}
fn default_non_interactive_timeout_ms() -> u64 {
    5 * 60 * 1000
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_monitor_interval_secs() -> u64 {
    30
}
fn default_alert_cooldown_secs() -> u64 {
    60
}

/// C5 dispatcher defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_task_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default)]
    pub default_budget_usd: f64,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_webhook_retry_attempts")]
    pub webhook_retry_attempts: u32,
    /// USD per 1,000 prompt tokens, used to price a completed task's
    /// `cost_usd` against its `budget` (spec §4.5 step 6). Zero (the
    /// default) means cost tracking is off and every task is priced at
    /// $0 regardless of token counts — operators turn it on by setting
    /// real per-token rates for whichever provider they've wired in.
    #[serde(default)]
    pub cost_per_1k_input_tokens_usd: f64,
    /// USD per 1,000 completion tokens. See `cost_per_1k_input_tokens_usd`.
    #[serde(default)]
    pub cost_per_1k_output_tokens_usd: f64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_task_timeout_secs(),
            default_budget_usd: 0.0,
            max_depth: default_max_depth(),
            default_model: default_model(),
            webhook_retry_attempts: default_webhook_retry_attempts(),
            cost_per_1k_input_tokens_usd: 0.0,
            cost_per_1k_output_tokens_usd: 0.0,
        }
    }
}

fn default_task_timeout_secs() -> u64 {
    600
}
fn default_max_depth() -> u32 {
    3
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_webhook_retry_attempts() -> u32 {
    3
}

/// C3 router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Whether smart dispatch (keyword + LLM layers) is enabled system-wide.
    #[serde(default = "bool_true")]
    pub smart_dispatch_enabled: bool,
    /// `(channel, external_id)` -> role direct bindings.
    #[serde(default)]
    pub bindings: HashMap<String, String>,
    /// Per-channel pinned role, e.g. `"telegram" -> "support"`.
    #[serde(default)]
    pub channel_pins: HashMap<String, String>,
    /// Ordered per-role keyword lists. Order determines precedence.
    #[serde(default)]
    pub keywords: Vec<RoleKeywords>,
    /// Model used for the LLM classification fallback.
    #[serde(default = "default_classifier_model")]
    pub classifier_model: String,
    /// Role returned when no layer resolves.
    #[serde(default = "default_role")]
    pub default_role: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            smart_dispatch_enabled: bool_true(),
            bindings: HashMap::new(),
            channel_pins: HashMap::new(),
            keywords: Vec::new(),
            classifier_model: default_classifier_model(),
            default_role: default_role(),
        }
    }
}

fn default_classifier_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}
fn default_role() -> String {
    "coordinator".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleKeywords {
    pub role: String,
    pub keywords: Vec<String>,
}

/// C4 session manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_compact_threshold")]
    pub compact_threshold: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            compact_threshold: default_compact_threshold(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.tetora/tetora.db")
}
fn default_compact_threshold() -> i64 {
    40
}

/// A named agent persona (spec §3 `Role`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub soul_file: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permission_mode: crate::types::PermissionMode,
    #[serde(default = "default_trust_level")]
    pub trust_level: u8,
    #[serde(default)]
    pub tool_policy: ToolPolicyConfig,
}

fn default_trust_level() -> u8 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SandboxRequirement {
    Required,
    #[default]
    Optional,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolPolicyConfig {
    #[serde(default)]
    pub sandbox: SandboxRequirement,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    /// Tool names that must go through the C8 approval gate before running,
    /// regardless of allow/deny outcome.
    #[serde(default)]
    pub approval_required: Vec<String>,
}

/// C7 webhook ingress: one entry per configured source, per spec §3
/// `Webhook definition`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub sources: Vec<WebhookSourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSourceConfig {
    /// Identifier used in the route, e.g. `"github"` -> `POST /hooks/github`.
    pub name: String,
    pub target_role: Option<String>,
    /// `{{payload.a.b}}` template expanded into the task prompt.
    pub template: String,
    /// HMAC/bearer secret. `None` disables signature verification.
    pub secret: Option<String>,
    /// Filter expression, e.g. `payload.action == 'opened'`. Empty = always pass.
    #[serde(default)]
    pub filter: String,
    /// Optional workflow name to invoke instead of a plain task.
    pub workflow: Option<String>,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

/// C6 channel adapter configuration: one entry per registered adapter,
/// keyed by the same name the adapter reports from `Channel::name()`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub adapters: HashMap<String, ChannelAdapterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAdapterConfig {
    /// Chat-style adapters (Discord, Telegram, WebChat) are interactive;
    /// anything else must dispatch with `permissionMode = bypassPermissions`
    /// per spec §4.6 step 5.
    #[serde(default = "bool_true")]
    pub interactive: bool,
    pub default_role: Option<String>,
    /// Token stripped from the front of inbound text before command/free-text
    /// handling, e.g. `"<@123456>"` or `"@agentbot"`. `None` if the adapter
    /// requires no explicit mention (DMs, webhooks-as-channel).
    pub mention_token: Option<String>,
    /// Channel/guild ids allowed to address the agent without an explicit
    /// mention. Empty means "mention or DM required everywhere".
    #[serde(default)]
    pub allowed_channel_ids: Vec<String>,
    #[serde(default = "bool_true")]
    pub progress_enabled: bool,
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    #[serde(default = "default_progress_refresh_ms")]
    pub progress_refresh_ms: u64,
}

impl Default for ChannelAdapterConfig {
    fn default() -> Self {
        Self {
            interactive: true,
            default_role: None,
            mention_token: None,
            allowed_channel_ids: Vec::new(),
            progress_enabled: true,
            dedup_ttl_secs: default_dedup_ttl_secs(),
            progress_refresh_ms: default_progress_refresh_ms(),
        }
    }
}

fn default_dedup_ttl_secs() -> u64 {
    3600
}
fn default_progress_refresh_ms() -> u64 {
    3_000
}

/// Expand `$VAR` references inside a string at config-load time. Unresolved
/// references are left as literal text, per spec §6.
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let rest = &input[i + 1..];
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if end > 0 {
                let name = &rest[..end];
                match std::env::var(name) {
                    Ok(val) => {
                        out.push_str(&val);
                        i += 1 + end;
                        continue;
                    }
                    Err(_) => {
                        // Unresolved: keep the literal `$NAME` text.
                        out.push('$');
                        out.push_str(name);
                        i += 1 + end;
                        continue;
                    }
                }
            }
        }
        let ch = input[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_env_vars_substitutes_known_var() {
        std::env::set_var("TETORA_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("value=$TETORA_TEST_VAR!"), "value=hello!");
        std::env::remove_var("TETORA_TEST_VAR");
    }

    #[test]
    fn expand_env_vars_leaves_unknown_var_literal() {
        std::env::remove_var("TETORA_DOES_NOT_EXIST");
        assert_eq!(
            expand_env_vars("value=$TETORA_DOES_NOT_EXIST!"),
            "value=$TETORA_DOES_NOT_EXIST!"
        );
    }

    #[test]
    fn default_config_has_sane_values() {
        let cfg = TetoraConfig::default();
        assert_eq!(cfg.slots.capacity, DEFAULT_SLOT_CAPACITY);
        assert_eq!(cfg.slots.reserved_slots, 2);
        assert_eq!(cfg.slots.warn_threshold, 3);
        assert_eq!(cfg.dispatcher.max_depth, 3);
    }
}
