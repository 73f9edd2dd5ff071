//! Named property sources and their ordered list.

use indexmap::IndexMap;
use trellis_common::error::{Result, TrellisError};

/// A named set of properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertySource {
    /// Plain key/value map.
    Map {
        /// Source name.
        name: String,
        /// Properties in load order.
        properties: IndexMap<String, String>,
    },
    /// Several sources sharing one name, searched in order.
    Composite {
        /// Source name.
        name: String,
        /// Member sources, highest precedence first.
        sources: Vec<PropertySource>,
    },
}

impl PropertySource {
    /// Creates a map-backed source.
    #[must_use]
    pub fn map(
        name: impl Into<String>,
        properties: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self::Map {
            name: name.into(),
            properties: properties.into_iter().collect(),
        }
    }

    /// Creates an empty composite source.
    #[must_use]
    pub fn composite(name: impl Into<String>) -> Self {
        Self::Composite {
            name: name.into(),
            sources: Vec::new(),
        }
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Map { name, .. } | Self::Composite { name, .. } => name,
        }
    }

    /// Looks up a property; composites return the first member that has it.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        match self {
            Self::Map { properties, .. } => properties.get(key).map(String::as_str),
            Self::Composite { sources, .. } => sources.iter().find_map(|s| s.property(key)),
        }
    }

    /// Returns `true` if the source defines the key.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.property(key).is_some()
    }

    /// All property names, deduplicated, in precedence order.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        match self {
            Self::Map { properties, .. } => properties.keys().cloned().collect(),
            Self::Composite { sources, .. } => {
                let mut names: Vec<String> = Vec::new();
                for name in sources.iter().flat_map(Self::property_names) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                names
            }
        }
    }

    /// Returns a copy of this source under a different name.
    #[must_use]
    pub fn renamed(&self, new_name: impl Into<String>) -> Self {
        match self.clone() {
            Self::Map { properties, .. } => Self::Map {
                name: new_name.into(),
                properties,
            },
            Self::Composite { sources, .. } => Self::Composite {
                name: new_name.into(),
                sources,
            },
        }
    }

    /// Adds a member with the highest precedence; no-op for map sources.
    pub fn add_first_source(&mut self, source: Self) {
        if let Self::Composite { sources, .. } = self {
            sources.insert(0, source);
        }
    }

    /// Adds a member with the lowest precedence; no-op for map sources.
    pub fn add_source(&mut self, source: Self) {
        if let Self::Composite { sources, .. } = self {
            sources.push(source);
        }
    }

    /// Returns `true` for composite sources.
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::Composite { .. })
    }
}

/// Ordered list of property sources, highest precedence first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutablePropertySources {
    sources: Vec<PropertySource>,
}

impl MutablePropertySources {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the source with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertySource> {
        self.sources.iter().find(|s| s.name() == name)
    }

    /// Returns `true` if a source with the given name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Adds a source with the highest precedence, replacing any source of the same name.
    pub fn add_first(&mut self, source: PropertySource) {
        self.remove_if_present(source.name());
        self.sources.insert(0, source);
    }

    /// Adds a source with the lowest precedence, replacing any source of the same name.
    pub fn add_last(&mut self, source: PropertySource) {
        self.remove_if_present(source.name());
        self.sources.push(source);
    }

    /// Adds a source immediately before the named anchor.
    ///
    /// # Errors
    ///
    /// Returns an error if the anchor does not exist or names the source itself.
    pub fn add_before(&mut self, anchor: &str, source: PropertySource) -> Result<()> {
        self.assert_legal_relative_addition(anchor, &source)?;
        self.remove_if_present(source.name());
        let index = self.index_of(anchor)?;
        self.sources.insert(index, source);
        Ok(())
    }

    /// Adds a source immediately after the named anchor.
    ///
    /// # Errors
    ///
    /// Returns an error if the anchor does not exist or names the source itself.
    pub fn add_after(&mut self, anchor: &str, source: PropertySource) -> Result<()> {
        self.assert_legal_relative_addition(anchor, &source)?;
        self.remove_if_present(source.name());
        let index = self.index_of(anchor)?;
        self.sources.insert(index + 1, source);
        Ok(())
    }

    /// Replaces the named source in place.
    ///
    /// # Errors
    ///
    /// Returns an error if no source has that name.
    pub fn replace(&mut self, name: &str, source: PropertySource) -> Result<()> {
        let index = self.index_of(name)?;
        self.sources[index] = source;
        Ok(())
    }

    /// Removes and returns the named source.
    pub fn remove(&mut self, name: &str) -> Option<PropertySource> {
        let index = self.sources.iter().position(|s| s.name() == name)?;
        Some(self.sources.remove(index))
    }

    /// Source names in precedence order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Iterates in precedence order.
    pub fn iter(&self) -> impl Iterator<Item = &PropertySource> {
        self.sources.iter()
    }

    /// Number of sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns `true` if there are no sources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Looks a property up across all sources.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.sources.iter().find_map(|s| s.property(key))
    }

    fn remove_if_present(&mut self, name: &str) {
        self.sources.retain(|s| s.name() != name);
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.sources
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| TrellisError::NotFound {
                kind: "property source",
                id: name.to_string(),
            })
    }

    fn assert_legal_relative_addition(&self, anchor: &str, source: &PropertySource) -> Result<()> {
        if anchor == source.name() {
            return Err(TrellisError::config(format!(
                "property source named '{anchor}' cannot be added relative to itself"
            )));
        }
        Ok(())
    }
}
