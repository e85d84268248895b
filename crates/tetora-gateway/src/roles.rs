//! Role registry and runtime trust-level overrides (spec §6 `GET /trust`,
//! `POST /trust/{role}`). Roles themselves are loaded once from
//! `TetoraConfig` and never mutated; an admin lowering or raising a role's
//! trust level at runtime only ever touches the overlay in this struct, so
//! a restart always comes back up with the file's original values.

use std::collections::HashMap;

use dashmap::DashMap;
use tetora_core::config::RoleConfig;

pub struct RoleRegistry {
    roles: HashMap<String, RoleConfig>,
    trust_overrides: DashMap<String, u8>,
}

impl RoleRegistry {
    pub fn new(roles: HashMap<String, RoleConfig>) -> Self {
        Self {
            roles,
            trust_overrides: DashMap::new(),
        }
    }

    pub fn get(&self, role: &str) -> Option<&RoleConfig> {
        self.roles.get(role)
    }

    pub fn exists(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Effective trust level for `role`: the runtime override if one was
    /// set, otherwise the value from config.
    pub fn trust_level(&self, role: &str) -> Option<u8> {
        if let Some(level) = self.trust_overrides.get(role) {
            return Some(*level);
        }
        self.roles.get(role).map(|r| r.trust_level)
    }

    pub fn set_trust_level(&self, role: &str, level: u8) -> bool {
        if !self.roles.contains_key(role) {
            return false;
        }
        self.trust_overrides.insert(role.to_string(), level);
        true
    }

    /// `(role, trust_level)` for every configured role, sorted by name for
    /// stable output.
    pub fn list_trust(&self) -> Vec<(String, u8)> {
        let mut out: Vec<(String, u8)> = self
            .roles
            .keys()
            .map(|k| (k.clone(), self.trust_level(k).unwrap_or(1)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tetora_core::config::ToolPolicyConfig;

    fn role(trust_level: u8) -> RoleConfig {
        RoleConfig {
            soul_file: None,
            model: "m".to_string(),
            description: String::new(),
            permission_mode: Default::default(),
            trust_level,
            tool_policy: ToolPolicyConfig::default(),
        }
    }

    #[test]
    fn trust_level_falls_back_to_config_until_overridden() {
        let mut roles = HashMap::new();
        roles.insert("coordinator".to_string(), role(2));
        let registry = RoleRegistry::new(roles);

        assert_eq!(registry.trust_level("coordinator"), Some(2));
        assert!(registry.set_trust_level("coordinator", 5));
        assert_eq!(registry.trust_level("coordinator"), Some(5));
    }

    #[test]
    fn setting_trust_for_unknown_role_fails() {
        let registry = RoleRegistry::new(HashMap::new());
        assert!(!registry.set_trust_level("ghost", 3));
    }

    #[test]
    fn list_trust_is_sorted_by_role_name() {
        let mut roles = HashMap::new();
        roles.insert("zeta".to_string(), role(1));
        roles.insert("alpha".to_string(), role(1));
        let registry = RoleRegistry::new(roles);

        let list = registry.list_trust();
        assert_eq!(list[0].0, "alpha");
        assert_eq!(list[1].0, "zeta");
    }
}
