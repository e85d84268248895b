//! C3 — router: resolves `(prompt, source)` to a role by the first rule
//! that matches.
//!
//! Generalizes the *shape* of a provider-failover router (ordered list of
//! strategies, first success wins, a structured log line per attempt) from
//! "LLM provider failover" to "prompt routing layers": binding → per-channel
//! pin → keyword → LLM → default. Unlike a provider failover chain this
//! router can never fail — layer 5 always returns something.

use std::collections::HashMap;

use async_trait::async_trait;
use tetora_core::config::RoutingConfig;
use tetora_core::types::{RouteConfidence, RouteMethod, RouteResult};
use tracing::{debug, instrument, warn};

/// Identity attributes of an inbound message's origin, used by the binding
/// layer. Not every field is populated by every channel.
#[derive(Debug, Clone, Default)]
pub struct RouteOrigin {
    pub channel: String,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    pub guild_id: Option<String>,
}

impl RouteOrigin {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..Default::default()
        }
    }

    /// Candidate binding keys in most-specific-first order: a channel id
    /// binding (e.g. "this Discord channel") beats a guild-wide binding,
    /// which beats a single user binding.
    fn binding_keys(&self) -> Vec<String> {
        [&self.channel_id, &self.guild_id, &self.user_id]
            .into_iter()
            .flatten()
            .map(|id| format!("{}:{}", self.channel, id))
            .collect()
    }
}

/// A role the router may select, as surfaced to the LLM classifier layer.
#[derive(Debug, Clone)]
pub struct RoleDescriptor {
    pub key: String,
    pub description: String,
}

/// External collaborator for layer 4 (LLM classifier). Kept decoupled from
/// any concrete provider so this crate has no dependency on the agent/LLM
/// stack; the gateway wires a real implementation at startup.
#[async_trait]
pub trait RoleClassifier: Send + Sync {
    /// Return one of `roles`' keys, or `None` if the model's answer can't be
    /// trusted (empty response, request failure, or a key outside the
    /// allowed set — all of these fall through to the default layer).
    async fn classify(&self, prompt: &str, roles: &[RoleDescriptor]) -> Option<String>;
}

/// Classifier that never resolves anything, for when smart dispatch's LLM
/// layer is disabled or no classifier has been configured.
pub struct NoopClassifier;

#[async_trait]
impl RoleClassifier for NoopClassifier {
    async fn classify(&self, _prompt: &str, _roles: &[RoleDescriptor]) -> Option<String> {
        None
    }
}

pub struct Router {
    config: RoutingConfig,
    roles: Vec<RoleDescriptor>,
    classifier: Box<dyn RoleClassifier>,
}

impl Router {
    pub fn new(
        config: RoutingConfig,
        roles: Vec<RoleDescriptor>,
        classifier: Box<dyn RoleClassifier>,
    ) -> Self {
        Self {
            config,
            roles,
            classifier,
        }
    }

    /// Resolve `(prompt, origin)` to a role. Never fails.
    #[instrument(skip(self, prompt), fields(channel = %origin.channel))]
    pub async fn route(&self, prompt: &str, origin: &RouteOrigin) -> RouteResult {
        if let Some(role) = self.resolve_binding(origin) {
            debug!(role, method = "binding", "resolved by direct binding");
            return RouteResult {
                role,
                method: RouteMethod::Binding,
                confidence: RouteConfidence::High,
            };
        }

        if let Some(role) = self.config.channel_pins.get(&origin.channel).cloned() {
            debug!(role, method = "binding", "resolved by channel pin");
            return RouteResult {
                role,
                method: RouteMethod::Binding,
                confidence: RouteConfidence::High,
            };
        }

        if self.config.smart_dispatch_enabled {
            if let Some(role) = self.resolve_keyword(prompt) {
                debug!(role, method = "keyword", "resolved by keyword match");
                return RouteResult {
                    role,
                    method: RouteMethod::Keyword,
                    confidence: RouteConfidence::High,
                };
            }

            if let Some(role) = self.resolve_llm(prompt).await {
                debug!(role, method = "llm", "resolved by classifier");
                return RouteResult {
                    role,
                    method: RouteMethod::Llm,
                    confidence: RouteConfidence::Medium,
                };
            }
        }

        debug!(role = %self.config.default_role, method = "default", "fell through to default role");
        RouteResult {
            role: self.config.default_role.clone(),
            method: RouteMethod::Default,
            confidence: RouteConfidence::Low,
        }
    }

    fn resolve_binding(&self, origin: &RouteOrigin) -> Option<String> {
        origin
            .binding_keys()
            .into_iter()
            .find_map(|key| self.config.bindings.get(&key).cloned())
    }

    fn resolve_keyword(&self, prompt: &str) -> Option<String> {
        let prompt_lower = prompt.to_lowercase();
        let words = tokenize_words(&prompt_lower);

        self.config.keywords.iter().find_map(|rk| {
            rk.keywords
                .iter()
                .any(|kw| keyword_matches(kw, &prompt_lower, &words))
                .then(|| rk.role.clone())
        })
    }

    async fn resolve_llm(&self, prompt: &str) -> Option<String> {
        if self.roles.is_empty() {
            return None;
        }
        let allowed: HashMap<&str, ()> = self.roles.iter().map(|r| (r.key.as_str(), ())).collect();
        match self.classifier.classify(prompt, &self.roles).await {
            Some(key) if allowed.contains_key(key.as_str()) => Some(key),
            Some(key) => {
                warn!(key, "classifier returned a role outside the allowed set — rejecting");
                None
            }
            None => None,
        }
    }
}

/// Lowercased whitespace/punctuation-delimited words, for whole-word English
/// keyword matching.
fn tokenize_words(prompt_lower: &str) -> Vec<&str> {
    prompt_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// A keyword matches as a whole English word if it's pure ASCII, or as a
/// plain substring otherwise (CJK and similar scripts have no reliable word
/// boundary to split on).
fn keyword_matches(keyword: &str, prompt_lower: &str, words: &[&str]) -> bool {
    let keyword_lower = keyword.to_lowercase();
    if keyword.is_ascii() {
        words.contains(&keyword_lower.as_str())
    } else {
        prompt_lower.contains(&keyword_lower)
    }
}
