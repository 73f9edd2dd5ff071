//! The environment: property sources, placeholders, and profiles.

pub mod loader;
pub mod placeholder;
pub mod profiles;
pub mod property_source;

use std::cell::RefCell;

use trellis_common::config::TrellisConfig;
use trellis_common::constants::{
    ACTIVE_PROFILES_PROPERTY, CONFIG_PROPERTY_SOURCE_NAME, DEFAULT_PROFILES_PROPERTY,
    RESERVED_DEFAULT_PROFILE,
};
use trellis_common::error::Result;

pub use self::placeholder::resolve_placeholders;
pub use self::profiles::Profiles;
pub use self::property_source::{MutablePropertySources, PropertySource};

/// Name of the property source holding process environment variables.
pub const SYSTEM_ENVIRONMENT_SOURCE_NAME: &str = "systemEnvironment";

/// Property lookup, placeholder resolution, and profile acceptance.
pub trait Environment {
    /// Looks a property up across the property sources.
    fn property(&self, key: &str) -> Option<String>;

    /// Replaces resolvable placeholders, leaving unresolvable ones untouched.
    ///
    /// # Errors
    ///
    /// Returns an error for circular placeholder references.
    fn resolve_placeholders(&self, text: &str) -> Result<String>;

    /// Replaces placeholders, failing on any that cannot be resolved.
    ///
    /// # Errors
    ///
    /// Returns [`trellis_common::error::TrellisError::UnresolvablePlaceholder`]
    /// for missing values.
    fn resolve_required_placeholders(&self, text: &str) -> Result<String>;

    /// Evaluates a profile predicate against the active (or default) profiles.
    fn accepts_profiles(&self, profiles: &Profiles) -> bool;

    /// Explicitly active profiles.
    fn active_profiles(&self) -> Vec<String>;

    /// Profiles active when none is explicitly active.
    fn default_profiles(&self) -> Vec<String>;

    /// The mutable, ordered property-source list.
    fn property_sources(&self) -> &RefCell<MutablePropertySources>;
}

/// Default [`Environment`] over a [`MutablePropertySources`] list.
#[derive(Debug, Default)]
pub struct StandardEnvironment {
    property_sources: RefCell<MutablePropertySources>,
    active_profiles: RefCell<Vec<String>>,
    default_profiles: RefCell<Option<Vec<String>>>,
}

impl StandardEnvironment {
    /// Creates an environment without property sources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an environment from container configuration.
    ///
    /// `properties` become the lowest-precedence `trellisConfig` source.
    #[must_use]
    pub fn from_config(config: &TrellisConfig) -> Self {
        let env = Self::new();
        env.property_sources
            .borrow_mut()
            .add_last(PropertySource::map(
                CONFIG_PROPERTY_SOURCE_NAME,
                config.properties.clone(),
            ));
        env.set_active_profiles(config.active_profiles.clone());
        env.set_default_profiles(config.default_profiles.clone());
        env
    }

    /// Adds process environment variables with the highest precedence.
    #[must_use]
    pub fn with_system_environment(self) -> Self {
        self.property_sources
            .borrow_mut()
            .add_first(PropertySource::map(
                SYSTEM_ENVIRONMENT_SOURCE_NAME,
                std::env::vars(),
            ));
        self
    }

    /// Replaces the explicitly active profiles.
    pub fn set_active_profiles(&self, profiles: Vec<String>) {
        *self.active_profiles.borrow_mut() = profiles;
    }

    /// Adds one active profile.
    pub fn add_active_profile(&self, profile: impl Into<String>) {
        let profile = profile.into();
        let mut active = self.active_profiles.borrow_mut();
        if !active.contains(&profile) {
            active.push(profile);
        }
    }

    /// Replaces the default profiles.
    pub fn set_default_profiles(&self, profiles: Vec<String>) {
        *self.default_profiles.borrow_mut() = Some(profiles);
    }

    fn is_profile_active(&self, profile: &str) -> bool {
        let active = self.active_profiles();
        if active.iter().any(|p| p == profile) {
            return true;
        }
        active.is_empty() && self.default_profiles().iter().any(|p| p == profile)
    }

    fn comma_delimited(&self, key: &str) -> Option<Vec<String>> {
        self.property(key).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

impl Environment for StandardEnvironment {
    fn property(&self, key: &str) -> Option<String> {
        self.property_sources
            .borrow()
            .property(key)
            .map(str::to_string)
    }

    fn resolve_placeholders(&self, text: &str) -> Result<String> {
        resolve_placeholders(text, &|key| self.property(key), true)
    }

    fn resolve_required_placeholders(&self, text: &str) -> Result<String> {
        resolve_placeholders(text, &|key| self.property(key), false)
    }

    fn accepts_profiles(&self, profiles: &Profiles) -> bool {
        profiles.matches(&|p| self.is_profile_active(p))
    }

    fn active_profiles(&self) -> Vec<String> {
        let explicit = self.active_profiles.borrow().clone();
        if explicit.is_empty() {
            self.comma_delimited(ACTIVE_PROFILES_PROPERTY)
                .unwrap_or_default()
        } else {
            explicit
        }
    }

    fn default_profiles(&self) -> Vec<String> {
        if let Some(from_property) = self.comma_delimited(DEFAULT_PROFILES_PROPERTY) {
            return from_property;
        }
        self.default_profiles
            .borrow()
            .clone()
            .unwrap_or_else(|| vec![RESERVED_DEFAULT_PROFILE.to_string()])
    }

    fn property_sources(&self) -> &RefCell<MutablePropertySources> {
        &self.property_sources
    }
}
