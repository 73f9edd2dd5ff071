//! Container configuration model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::ScopedProxyMode;

/// Root configuration for a trellis container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    /// Whether a bean definition may replace another one of the same name.
    pub allow_bean_definition_overriding: bool,
    /// Proxy mode applied when `@Scope` leaves it at `DEFAULT`.
    pub default_proxy_mode: ScopedProxyMode,
    /// Whether scanners register the `@Component` stereotype include filter.
    pub include_default_filters: bool,
    /// Lazy-init default applied to scanned definitions.
    pub lazy_init_default: bool,
    /// Bean-name patterns (`*` wildcards) eligible for autowiring; empty means all.
    pub autowire_candidate_patterns: Vec<String>,
    /// Explicitly active profiles.
    pub active_profiles: Vec<String>,
    /// Profiles considered active when no profile is explicitly active.
    pub default_profiles: Vec<String>,
    /// Lowest-precedence properties made available to the environment.
    pub properties: BTreeMap<String, String>,
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            allow_bean_definition_overriding: true,
            default_proxy_mode: ScopedProxyMode::No,
            include_default_filters: true,
            lazy_init_default: false,
            autowire_candidate_patterns: Vec::new(),
            active_profiles: Vec::new(),
            default_profiles: vec![crate::constants::RESERVED_DEFAULT_PROFILE.to_string()],
            properties: BTreeMap::new(),
        }
    }
}

impl TrellisConfig {
    /// Parses a configuration from JSON, applying defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid JSON for this model.
    pub fn from_json(input: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_overriding_and_no_proxy() {
        let config = TrellisConfig::default();
        assert!(config.allow_bean_definition_overriding);
        assert_eq!(config.default_proxy_mode, ScopedProxyMode::No);
        assert_eq!(config.default_profiles, vec!["default"]);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = TrellisConfig::from_json(
            r#"{ "active_profiles": ["dev"], "properties": { "db.url": "mem" } }"#,
        )
        .expect("parse");
        assert_eq!(config.active_profiles, vec!["dev"]);
        assert_eq!(config.properties.get("db.url").map(String::as_str), Some("mem"));
        assert!(config.include_default_filters);
    }

    #[test]
    fn invalid_json_is_a_serialization_error() {
        let err = TrellisConfig::from_json("{ nope").unwrap_err();
        assert!(err.to_string().contains("serialization error"));
    }
}
