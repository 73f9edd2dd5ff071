//! Name-to-factory registry for plugin classes.
//!
//! Declarations reference conditions, selectors, registrars, and the like by
//! class name. Each kind has its own table of factories; a factory receives
//! the [`ContainerContext`] so it can capture the environment, resource
//! loader, or registry it needs.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use trellis_common::constants::{
    DEFAULT_PROPERTY_SOURCE_FACTORY, DEFAULT_RESOURCE_READER, JSON_PROPERTY_SOURCE_FACTORY,
    PROFILE_CONDITION, YAML_PROPERTY_SOURCE_FACTORY,
};
use trellis_common::error::{Result, TrellisError};

use crate::bean_reader::{JsonBeanDefinitionReader, ResourceDefinitionReader};
use crate::condition::{Condition, ProfileCondition};
use crate::context::ContainerContext;
use crate::filter::TypeFilter;
use crate::imports::{
    DeferredImportGroup, DeferredImportSelector, ImportBeanDefinitionRegistrar, ImportSelector,
};
use crate::naming::BeanNameGenerator;
use crate::property_source::{
    DefaultPropertySourceFactory, JsonPropertySourceFactory, PropertySourceFactory,
    YamlPropertySourceFactory,
};

/// Builds a plugin instance from the container context.
pub type PluginFactory<T> = Rc<dyn Fn(&ContainerContext) -> Result<T>>;

/// How an `@Import` target is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// Computes more class names immediately.
    Selector,
    /// Computes class names in the deferred pass.
    DeferredSelector,
    /// Emits bean definitions directly.
    Registrar,
}

struct Factories<T> {
    kind: &'static str,
    entries: HashMap<String, PluginFactory<T>>,
}

impl<T> Clone for Factories<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            entries: self.entries.clone(),
        }
    }
}

impl<T> Factories<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    fn register(&mut self, class_name: impl Into<String>, factory: PluginFactory<T>) {
        let class_name = class_name.into();
        if self.entries.insert(class_name.clone(), factory).is_some() {
            tracing::debug!(kind = self.kind, class = %class_name, "plugin factory replaced");
        }
    }

    fn contains(&self, class_name: &str) -> bool {
        self.entries.contains_key(class_name)
    }

    fn create(&self, class_name: &str, context: &ContainerContext) -> Result<T> {
        let factory = self
            .entries
            .get(class_name)
            .ok_or_else(|| TrellisError::Plugin {
                kind: self.kind,
                class_name: class_name.to_string(),
                message: "no factory registered".into(),
            })?;
        tracing::trace!(kind = self.kind, class = class_name, "instantiating plugin");
        factory(context)
    }

    fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Factories for every plugin kind, keyed by class name.
#[derive(Clone)]
pub struct PluginRegistry {
    conditions: Factories<Rc<dyn Condition>>,
    selectors: Factories<Rc<dyn ImportSelector>>,
    deferred_selectors: Factories<Rc<dyn DeferredImportSelector>>,
    groups: Factories<Box<dyn DeferredImportGroup>>,
    registrars: Factories<Rc<dyn ImportBeanDefinitionRegistrar>>,
    property_source_factories: Factories<Rc<dyn PropertySourceFactory>>,
    resource_readers: Factories<Rc<dyn ResourceDefinitionReader>>,
    name_generators: Factories<Rc<dyn BeanNameGenerator>>,
    type_filters: Factories<Rc<dyn TypeFilter>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("conditions", &self.conditions.names())
            .field("selectors", &self.selectors.names())
            .field("deferred_selectors", &self.deferred_selectors.names())
            .field("groups", &self.groups.names())
            .field("registrars", &self.registrars.names())
            .field("property_source_factories", &self.property_source_factories.names())
            .field("resource_readers", &self.resource_readers.names())
            .field("name_generators", &self.name_generators.names())
            .field("type_filters", &self.type_filters.names())
            .finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl PluginRegistry {
    /// Creates a registry without any factories.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            conditions: Factories::new("condition"),
            selectors: Factories::new("import selector"),
            deferred_selectors: Factories::new("deferred import selector"),
            groups: Factories::new("deferred import group"),
            registrars: Factories::new("import bean definition registrar"),
            property_source_factories: Factories::new("property source factory"),
            resource_readers: Factories::new("resource definition reader"),
            name_generators: Factories::new("bean name generator"),
            type_filters: Factories::new("type filter"),
        }
    }

    /// Creates a registry with the built-in profile condition,
    /// property-source factories and the JSON resource reader.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut plugins = Self::empty();
        plugins.register_condition(PROFILE_CONDITION, |_| {
            Ok(Rc::new(ProfileCondition) as Rc<dyn Condition>)
        });
        plugins.register_property_source_factory(DEFAULT_PROPERTY_SOURCE_FACTORY, |_| {
            Ok(Rc::new(DefaultPropertySourceFactory) as Rc<dyn PropertySourceFactory>)
        });
        plugins.register_property_source_factory(JSON_PROPERTY_SOURCE_FACTORY, |_| {
            Ok(Rc::new(JsonPropertySourceFactory) as Rc<dyn PropertySourceFactory>)
        });
        plugins.register_property_source_factory(YAML_PROPERTY_SOURCE_FACTORY, |_| {
            Ok(Rc::new(YamlPropertySourceFactory) as Rc<dyn PropertySourceFactory>)
        });
        plugins.register_resource_reader(DEFAULT_RESOURCE_READER, |_| {
            Ok(Rc::new(JsonBeanDefinitionReader) as Rc<dyn ResourceDefinitionReader>)
        });
        plugins
    }

    /// Registers a condition factory.
    pub fn register_condition(
        &mut self,
        class_name: impl Into<String>,
        factory: impl Fn(&ContainerContext) -> Result<Rc<dyn Condition>> + 'static,
    ) {
        self.conditions.register(class_name, Rc::new(factory));
    }

    /// Registers an immediate import selector factory.
    pub fn register_import_selector(
        &mut self,
        class_name: impl Into<String>,
        factory: impl Fn(&ContainerContext) -> Result<Rc<dyn ImportSelector>> + 'static,
    ) {
        self.selectors.register(class_name, Rc::new(factory));
    }

    /// Registers a deferred import selector factory.
    pub fn register_deferred_import_selector(
        &mut self,
        class_name: impl Into<String>,
        factory: impl Fn(&ContainerContext) -> Result<Rc<dyn DeferredImportSelector>> + 'static,
    ) {
        self.deferred_selectors.register(class_name, Rc::new(factory));
    }

    /// Registers a deferred import group factory.
    pub fn register_import_group(
        &mut self,
        group_name: impl Into<String>,
        factory: impl Fn(&ContainerContext) -> Result<Box<dyn DeferredImportGroup>> + 'static,
    ) {
        self.groups.register(group_name, Rc::new(factory));
    }

    /// Registers an import bean definition registrar factory.
    pub fn register_registrar(
        &mut self,
        class_name: impl Into<String>,
        factory: impl Fn(&ContainerContext) -> Result<Rc<dyn ImportBeanDefinitionRegistrar>>
        + 'static,
    ) {
        self.registrars.register(class_name, Rc::new(factory));
    }

    /// Registers a property-source factory.
    pub fn register_property_source_factory(
        &mut self,
        class_name: impl Into<String>,
        factory: impl Fn(&ContainerContext) -> Result<Rc<dyn PropertySourceFactory>> + 'static,
    ) {
        self.property_source_factories
            .register(class_name, Rc::new(factory));
    }

    /// Registers a reader for `@ImportResource` locations.
    pub fn register_resource_reader(
        &mut self,
        class_name: impl Into<String>,
        factory: impl Fn(&ContainerContext) -> Result<Rc<dyn ResourceDefinitionReader>> + 'static,
    ) {
        self.resource_readers.register(class_name, Rc::new(factory));
    }

    /// Registers a bean name generator factory.
    pub fn register_name_generator(
        &mut self,
        class_name: impl Into<String>,
        factory: impl Fn(&ContainerContext) -> Result<Rc<dyn BeanNameGenerator>> + 'static,
    ) {
        self.name_generators.register(class_name, Rc::new(factory));
    }

    /// Registers a custom type filter factory.
    pub fn register_type_filter(
        &mut self,
        class_name: impl Into<String>,
        factory: impl Fn(&ContainerContext) -> Result<Rc<dyn TypeFilter>> + 'static,
    ) {
        self.type_filters.register(class_name, Rc::new(factory));
    }

    /// Classifies an import target by the factories registered for it.
    #[must_use]
    pub fn import_kind(&self, class_name: &str) -> Option<ImportKind> {
        if self.deferred_selectors.contains(class_name) {
            Some(ImportKind::DeferredSelector)
        } else if self.selectors.contains(class_name) {
            Some(ImportKind::Selector)
        } else if self.registrars.contains(class_name) {
            Some(ImportKind::Registrar)
        } else {
            None
        }
    }

    /// Returns `true` if a deferred group factory exists under the name.
    #[must_use]
    pub fn has_import_group(&self, group_name: &str) -> bool {
        self.groups.contains(group_name)
    }

    /// Instantiates a condition.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Plugin`] if no factory is registered, or the
    /// factory's own error.
    pub fn condition(&self, class_name: &str, context: &ContainerContext) -> Result<Rc<dyn Condition>> {
        self.conditions.create(class_name, context)
    }

    /// Instantiates an immediate import selector.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Plugin`] if no factory is registered, or the
    /// factory's own error.
    pub fn import_selector(
        &self,
        class_name: &str,
        context: &ContainerContext,
    ) -> Result<Rc<dyn ImportSelector>> {
        self.selectors.create(class_name, context)
    }

    /// Instantiates a deferred import selector.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Plugin`] if no factory is registered, or the
    /// factory's own error.
    pub fn deferred_import_selector(
        &self,
        class_name: &str,
        context: &ContainerContext,
    ) -> Result<Rc<dyn DeferredImportSelector>> {
        self.deferred_selectors.create(class_name, context)
    }

    /// Instantiates a deferred import group.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Plugin`] if no factory is registered, or the
    /// factory's own error.
    pub fn import_group(
        &self,
        group_name: &str,
        context: &ContainerContext,
    ) -> Result<Box<dyn DeferredImportGroup>> {
        self.groups.create(group_name, context)
    }

    /// Instantiates a registrar.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Plugin`] if no factory is registered, or the
    /// factory's own error.
    pub fn registrar(
        &self,
        class_name: &str,
        context: &ContainerContext,
    ) -> Result<Rc<dyn ImportBeanDefinitionRegistrar>> {
        self.registrars.create(class_name, context)
    }

    /// Instantiates a property-source factory.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Plugin`] if no factory is registered, or the
    /// factory's own error.
    pub fn property_source_factory(
        &self,
        class_name: &str,
        context: &ContainerContext,
    ) -> Result<Rc<dyn PropertySourceFactory>> {
        self.property_source_factories.create(class_name, context)
    }

    /// Instantiates a resource definition reader.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Plugin`] if no factory is registered, or the
    /// factory's own error.
    pub fn resource_reader(
        &self,
        class_name: &str,
        context: &ContainerContext,
    ) -> Result<Rc<dyn ResourceDefinitionReader>> {
        self.resource_readers.create(class_name, context)
    }

    /// Instantiates a bean name generator.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Plugin`] if no factory is registered, or the
    /// factory's own error.
    pub fn name_generator(
        &self,
        class_name: &str,
        context: &ContainerContext,
    ) -> Result<Rc<dyn BeanNameGenerator>> {
        self.name_generators.create(class_name, context)
    }

    /// Instantiates a custom type filter.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::Plugin`] if no factory is registered, or the
    /// factory's own error.
    pub fn type_filter(
        &self,
        class_name: &str,
        context: &ContainerContext,
    ) -> Result<Rc<dyn TypeFilter>> {
        self.type_filters.create(class_name, context)
    }
}

#[cfg(test)]
mod tests {
    use trellis_core::metadata::ClassMetadata;
    use trellis_core::registry::SimpleBeanDefinitionRegistry;
    use trellis_core::source::ClassIndex;

    use super::*;

    struct Fixed(Vec<String>);

    impl ImportSelector for Fixed {
        fn select_imports(&self, _importing: &ClassMetadata) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    fn context(plugins: PluginRegistry) -> ContainerContext {
        ContainerContext::new(
            SimpleBeanDefinitionRegistry::new().into_shared(),
            Rc::new(ClassIndex::new()),
        )
        .with_plugins(plugins)
    }

    #[test]
    fn missing_factory_is_a_plugin_error() {
        let plugins = PluginRegistry::empty();
        let ctx = context(PluginRegistry::empty());
        let err = plugins.condition("com.a.OnMissing", &ctx).err().unwrap();
        assert!(matches!(
            err,
            TrellisError::Plugin { kind: "condition", ref class_name, .. } if class_name == "com.a.OnMissing"
        ));
    }

    #[test]
    fn import_kind_prefers_deferred_registration() {
        let mut plugins = PluginRegistry::empty();
        plugins.register_import_selector("com.a.Sel", |_| {
            Ok(Rc::new(Fixed(vec!["com.a.B".into()])) as Rc<dyn ImportSelector>)
        });
        assert_eq!(plugins.import_kind("com.a.Sel"), Some(ImportKind::Selector));
        assert_eq!(plugins.import_kind("com.a.Plain"), None);

        let ctx = context(PluginRegistry::empty());
        let selector = plugins.import_selector("com.a.Sel", &ctx).unwrap();
        let imports = selector
            .select_imports(&ClassMetadata::new("com.a.App"))
            .unwrap();
        assert_eq!(imports, vec!["com.a.B"]);
    }

    #[test]
    fn defaults_include_profile_condition_and_property_factories() {
        let plugins = PluginRegistry::with_defaults();
        let ctx = context(PluginRegistry::empty());
        assert!(plugins.condition(PROFILE_CONDITION, &ctx).is_ok());
        assert!(plugins
            .property_source_factory(YAML_PROPERTY_SOURCE_FACTORY, &ctx)
            .is_ok());
        assert!(!plugins.has_import_group("com.a.Group"));
    }
}
