//! Bean definitions: the unit written to a [`crate::registry::BeanDefinitionRegistry`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use trellis_common::constants::{SCOPE_PROTOTYPE, SCOPE_SINGLETON};
use trellis_common::types::{Role, ScopedProxyMode};

use crate::metadata::{ClassMetadata, MethodMetadata};

/// How a definition entered the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DefinitionOrigin {
    /// Registered directly by calling code.
    #[default]
    Explicit,
    /// Registered from a class through the annotated reader.
    Annotated,
    /// Found by a classpath scan.
    Scanned,
    /// A configuration class reached through an import.
    ImportedConfiguration,
    /// Produced by a bean method of a configuration class.
    BeanMethod {
        /// Declaring configuration class.
        config_class: String,
    },
    /// Proxy definition standing in for a scoped target.
    ScopedProxy,
}

impl DefinitionOrigin {
    /// Returns `true` for definitions produced by scanning.
    #[must_use]
    pub const fn is_scanned(&self) -> bool {
        matches!(self, Self::Scanned)
    }
}

/// Declarative description of one bean.
#[derive(Debug, Clone, PartialEq)]
pub struct BeanDefinition {
    /// Bean class; absent for factory-method beans whose type is not declared.
    pub class_name: Option<String>,
    /// Scope name; empty means the default (singleton).
    pub scope: String,
    /// Scoped-proxy mode resolved for this definition.
    pub proxy_mode: ScopedProxyMode,
    /// Explicit lazy-init flag, if declared.
    pub lazy_init: Option<bool>,
    /// Whether this bean wins autowiring ties.
    pub primary: bool,
    /// Beans that must be initialised first.
    pub depends_on: Vec<String>,
    /// Role hint.
    pub role: Role,
    /// Human-readable description.
    pub description: Option<String>,
    /// Whether the bean may be autowired into others.
    pub autowire_candidate: bool,
    /// Bean holding the factory method.
    pub factory_bean_name: Option<String>,
    /// Factory method producing the bean.
    pub factory_method_name: Option<String>,
    /// Initialisation callback.
    pub init_method: Option<String>,
    /// Destruction callback.
    pub destroy_method: Option<String>,
    /// Location the definition was read from.
    pub source: Option<String>,
    /// Provenance.
    pub origin: DefinitionOrigin,
    /// Metadata of the bean class, when known.
    pub metadata: Option<Arc<ClassMetadata>>,
    /// Metadata of the factory method, for bean-method definitions.
    pub factory_method_metadata: Option<MethodMetadata>,
    /// Definition this one was derived from (scoped proxies).
    pub originating: Option<Box<BeanDefinition>>,
    /// Free-form attributes.
    pub attributes: BTreeMap<String, String>,
}

impl Default for BeanDefinition {
    fn default() -> Self {
        Self {
            class_name: None,
            scope: String::new(),
            proxy_mode: ScopedProxyMode::No,
            lazy_init: None,
            primary: false,
            depends_on: Vec::new(),
            role: Role::Application,
            description: None,
            autowire_candidate: true,
            factory_bean_name: None,
            factory_method_name: None,
            init_method: None,
            destroy_method: None,
            source: None,
            origin: DefinitionOrigin::Explicit,
            metadata: None,
            factory_method_metadata: None,
            originating: None,
            attributes: BTreeMap::new(),
        }
    }
}

impl BeanDefinition {
    /// Creates an explicit definition for a class.
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: Some(class_name.into()),
            ..Self::default()
        }
    }

    /// Creates a definition backed by class metadata.
    #[must_use]
    pub fn from_metadata(metadata: Arc<ClassMetadata>, origin: DefinitionOrigin) -> Self {
        Self {
            class_name: Some(metadata.name.clone()),
            source: Some(metadata.source_location()),
            metadata: Some(metadata),
            origin,
            ..Self::default()
        }
    }

    /// Sets the scope, returning the definition for chaining.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets the dependencies, returning the definition for chaining.
    #[must_use]
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Sets an attribute, returning the definition for chaining.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attributes.insert(key.into(), value.into());
        self
    }

    /// Sets an attribute in place.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.attributes.insert(key.into(), value.into());
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The scope with the default applied.
    #[must_use]
    pub fn effective_scope(&self) -> &str {
        if self.scope.is_empty() {
            SCOPE_SINGLETON
        } else {
            &self.scope
        }
    }

    /// Returns `true` for singleton-scoped definitions.
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.effective_scope() == SCOPE_SINGLETON
    }

    /// Returns `true` for prototype-scoped definitions.
    #[must_use]
    pub fn is_prototype(&self) -> bool {
        self.effective_scope() == SCOPE_PROTOTYPE
    }

    /// Returns `true` if the bean is produced by a factory method.
    #[must_use]
    pub const fn is_factory_method(&self) -> bool {
        self.factory_method_name.is_some()
    }

    /// The resource the definition was read from, falling back to the originating one.
    #[must_use]
    pub fn resource_description(&self) -> Option<&str> {
        self.source.as_deref().or_else(|| {
            self.originating
                .as_ref()
                .and_then(|o| o.resource_description())
        })
    }
}

impl fmt::Display for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bean: class [{}]; scope={}; lazyInit={}; primary={}; factoryBeanName={}; factoryMethodName={}",
            self.class_name.as_deref().unwrap_or("null"),
            self.scope,
            self.lazy_init
                .map_or_else(|| "null".to_string(), |l| l.to_string()),
            self.primary,
            self.factory_bean_name.as_deref().unwrap_or("null"),
            self.factory_method_name.as_deref().unwrap_or("null"),
        )?;
        if let Some(source) = &self.source {
            write!(f, "; defined in {source}")?;
        }
        Ok(())
    }
}

/// A definition together with its name and aliases.
#[derive(Debug, Clone, PartialEq)]
pub struct BeanDefinitionHolder {
    /// Bean name.
    pub name: String,
    /// The definition.
    pub definition: BeanDefinition,
    /// Additional names.
    pub aliases: Vec<String>,
}

impl BeanDefinitionHolder {
    /// Creates a holder without aliases.
    #[must_use]
    pub fn new(name: impl Into<String>, definition: BeanDefinition) -> Self {
        Self {
            name: name.into(),
            definition,
            aliases: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_singleton_and_autowirable() {
        let def = BeanDefinition::new("com.a.Service");
        assert!(def.is_singleton());
        assert!(!def.is_prototype());
        assert!(def.autowire_candidate);
        assert_eq!(def.effective_scope(), "singleton");
    }

    #[test]
    fn structural_equality_ignores_nothing_declared() {
        let a = BeanDefinition::new("com.a.X").with_scope("prototype");
        let b = BeanDefinition::new("com.a.X").with_scope("prototype");
        assert_eq!(a, b);
        assert_ne!(a, b.with_attribute("k", "v"));
    }

    #[test]
    fn metadata_backed_definition_records_source() {
        let mut meta = ClassMetadata::new("com.a.X");
        meta.resource = Some("app.tcd".into());
        let def = BeanDefinition::from_metadata(Arc::new(meta), DefinitionOrigin::Scanned);
        assert_eq!(def.source.as_deref(), Some("app.tcd#com.a.X"));
        assert!(def.origin.is_scanned());
    }

    #[test]
    fn resource_description_falls_back_to_originating() {
        let mut target = BeanDefinition::new("com.a.X");
        target.source = Some("app.tcd#com.a.X".into());
        let proxy = BeanDefinition {
            originating: Some(Box::new(target)),
            ..BeanDefinition::default()
        };
        assert_eq!(proxy.resource_description(), Some("app.tcd#com.a.X"));
    }

    #[test]
    fn display_names_class_and_source() {
        let mut def = BeanDefinition::new("com.a.X");
        def.source = Some("x.tcd".into());
        let text = def.to_string();
        assert!(text.contains("class [com.a.X]"));
        assert!(text.contains("defined in x.tcd"));
    }
}
