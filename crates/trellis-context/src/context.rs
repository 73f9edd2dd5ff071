//! Collaborators handed to conditions and plugin factories.

use std::fmt;
use std::rc::Rc;

use trellis_core::environment::{Environment, StandardEnvironment};
use trellis_core::registry::SharedRegistry;
use trellis_core::resource::{DefaultResourceLoader, ResourceLoader};
use trellis_core::source::MetadataSource;

use crate::plugin::PluginRegistry;

/// Registry, environment, resource loader, metadata source, and plugins.
///
/// Pieces that are not given explicitly are deduced from the registry when
/// it exposes them, and otherwise fall back to a standard environment and a
/// resource loader rooted at the working directory.
#[derive(Clone)]
pub struct ContainerContext {
    registry: SharedRegistry,
    environment: Rc<dyn Environment>,
    resource_loader: Rc<dyn ResourceLoader>,
    metadata_source: Rc<dyn MetadataSource>,
    plugins: Rc<PluginRegistry>,
}

impl fmt::Debug for ContainerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerContext")
            .field("bean_definitions", &self.registry.borrow().bean_definition_count())
            .field("active_profiles", &self.environment.active_profiles())
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

impl ContainerContext {
    /// Creates a context over a registry and a metadata source.
    #[must_use]
    pub fn new(registry: SharedRegistry, metadata_source: Rc<dyn MetadataSource>) -> Self {
        let (environment, resource_loader) = {
            let view = registry.borrow();
            (view.environment(), view.resource_loader())
        };
        let environment = environment.unwrap_or_else(|| {
            tracing::trace!("registry exposes no environment, using a standard one");
            Rc::new(StandardEnvironment::new())
        });
        let resource_loader =
            resource_loader.unwrap_or_else(|| Rc::new(DefaultResourceLoader::new(".")));
        Self {
            registry,
            environment,
            resource_loader,
            metadata_source,
            plugins: Rc::new(PluginRegistry::with_defaults()),
        }
    }

    /// Replaces the environment.
    #[must_use]
    pub fn with_environment(mut self, environment: Rc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    /// Replaces the resource loader.
    #[must_use]
    pub fn with_resource_loader(mut self, resource_loader: Rc<dyn ResourceLoader>) -> Self {
        self.resource_loader = resource_loader;
        self
    }

    /// Replaces the plugin registry.
    #[must_use]
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = Rc::new(plugins);
        self
    }

    /// The bean definition registry.
    #[must_use]
    pub const fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// The environment.
    #[must_use]
    pub fn environment(&self) -> &dyn Environment {
        self.environment.as_ref()
    }

    /// The resource loader.
    #[must_use]
    pub fn resource_loader(&self) -> &dyn ResourceLoader {
        self.resource_loader.as_ref()
    }

    /// The class metadata source.
    #[must_use]
    pub fn metadata_source(&self) -> &dyn MetadataSource {
        self.metadata_source.as_ref()
    }

    /// A shared handle to the class metadata source.
    #[must_use]
    pub fn shared_metadata_source(&self) -> Rc<dyn MetadataSource> {
        Rc::clone(&self.metadata_source)
    }

    /// The plugin factories.
    #[must_use]
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Returns `true` if the registry also answers bean-factory queries.
    #[must_use]
    pub fn has_bean_factory(&self) -> bool {
        self.registry.borrow().as_bean_factory().is_some()
    }

    /// Returns `true` if a bean with that name is known.
    ///
    /// Without a bean-factory view only bean definitions are consulted.
    #[must_use]
    pub fn contains_bean(&self, name: &str) -> bool {
        let registry = self.registry.borrow();
        registry.as_bean_factory().map_or_else(
            || registry.contains_bean_definition(name),
            |factory| factory.contains_bean(name),
        )
    }

    /// Names of beans of a class, when a bean-factory view exists.
    #[must_use]
    pub fn bean_names_for_class(&self, class_name: &str) -> Vec<String> {
        self.registry
            .borrow()
            .as_bean_factory()
            .map(|factory| factory.bean_names_for_class(class_name))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use trellis_core::definition::BeanDefinition;
    use trellis_core::environment::Profiles;
    use trellis_core::registry::{BeanDefinitionRegistry, SimpleBeanDefinitionRegistry};
    use trellis_core::resource::InMemoryResourceLoader;
    use trellis_core::source::ClassIndex;

    use super::*;

    #[test]
    fn environment_and_loader_are_deduced_from_registry() {
        let environment = StandardEnvironment::new();
        environment.set_active_profiles(vec!["dev".into()]);
        let loader = InMemoryResourceLoader::new().with("classpath:app.properties", "a=1");
        let registry = SimpleBeanDefinitionRegistry::new()
            .with_environment(Rc::new(environment))
            .with_resource_loader(Rc::new(loader))
            .into_shared();

        let context = ContainerContext::new(registry, Rc::new(ClassIndex::new()));
        assert!(context
            .environment()
            .accepts_profiles(&Profiles::parse(&["dev"]).unwrap()));
        assert!(context
            .resource_loader()
            .get_resource("classpath:app.properties")
            .exists());
    }

    #[test]
    fn missing_collaborators_fall_back_to_defaults() {
        let registry = SimpleBeanDefinitionRegistry::new().into_shared();
        registry
            .borrow_mut()
            .register_bean_definition("svc", BeanDefinition::new("com.a.Svc"))
            .unwrap();
        let context = ContainerContext::new(registry, Rc::new(ClassIndex::new()));
        assert!(context.environment().active_profiles().is_empty());
        assert!(context.has_bean_factory());
        assert!(context.contains_bean("svc"));
        assert_eq!(context.bean_names_for_class("com.a.Svc"), vec!["svc"]);
    }
}
