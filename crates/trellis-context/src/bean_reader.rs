//! Emission of bean definitions from parsed configuration classes.
//!
//! Each configuration class contributes, in order: a definition for itself
//! when it was imported, one definition per `@Bean` method, the definitions
//! of its imported resources, and whatever its registrars register.

use std::collections::HashMap;
use std::rc::Rc;

use serde::Deserialize;
use trellis_common::constants::BEAN;
use trellis_common::error::{Result, TrellisError};
use trellis_common::types::Role;
use trellis_core::definition::{BeanDefinition, BeanDefinitionHolder, DefinitionOrigin};
use trellis_core::metadata::MergedAnnotations;
use trellis_core::registry::BeanDefinitionRegistry;
use trellis_core::resource::Resource;

use crate::annotations::process_common_definition_annotations;
use crate::condition::{ConditionEvaluator, ConfigurationPhase};
use crate::configuration_class::{BeanMethod, ConfigurationClass};
use crate::context::ContainerContext;
use crate::naming::{AnnotationBeanNameGenerator, BeanNameGenerator, DefaultBeanNameGenerator};
use crate::parser::{ConfigurationClassParser, SharedConfigurationClass};
use crate::scope::{AnnotationScopeMetadataResolver, apply_scoped_proxy_mode};
use crate::utils::register_holder;

/// Loads bean definitions from a resource named by `@ImportResource`.
pub trait ResourceDefinitionReader {
    /// Registers the definitions found in the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be read or parsed, or a
    /// definition is refused by the registry.
    fn load_bean_definitions(
        &self,
        resource: &dyn Resource,
        registry: &mut dyn BeanDefinitionRegistry,
    ) -> Result<usize>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonDocument {
    beans: Vec<JsonBean>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct JsonBean {
    name: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    class: Option<String>,
    scope: Option<String>,
    lazy: Option<bool>,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    depends_on: Vec<String>,
    factory_bean: Option<String>,
    factory_method: Option<String>,
    init_method: Option<String>,
    destroy_method: Option<String>,
    description: Option<String>,
}

/// Reads bean definitions from a JSON document.
///
/// ```json
/// { "beans": [ { "name": "dataSource", "class": "com.acme.Pool", "lazy": true } ] }
/// ```
///
/// Beans without a name are named by [`DefaultBeanNameGenerator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBeanDefinitionReader;

impl ResourceDefinitionReader for JsonBeanDefinitionReader {
    fn load_bean_definitions(
        &self,
        resource: &dyn Resource,
        registry: &mut dyn BeanDefinitionRegistry,
    ) -> Result<usize> {
        let document: JsonDocument = serde_json::from_str(&resource.read_to_string()?)?;
        let description = resource.description();
        let count = document.beans.len();
        for bean in document.beans {
            let definition = BeanDefinition {
                class_name: bean.class,
                scope: bean.scope.unwrap_or_default(),
                lazy_init: bean.lazy,
                primary: bean.primary,
                depends_on: bean.depends_on,
                factory_bean_name: bean.factory_bean,
                factory_method_name: bean.factory_method,
                init_method: bean.init_method,
                destroy_method: bean.destroy_method,
                description: bean.description,
                source: Some(description.clone()),
                ..BeanDefinition::default()
            };
            let name = match bean.name {
                Some(name) => name,
                None => DefaultBeanNameGenerator.generate_bean_name(&definition, registry)?,
            };
            let mut holder = BeanDefinitionHolder::new(name, definition);
            holder.aliases = bean.aliases;
            register_holder(holder, registry)?;
        }
        tracing::debug!(resource = %description, count, "loaded bean definitions");
        Ok(count)
    }
}

/// Memoizes `REGISTER_BEAN` decisions per configuration class.
///
/// A class reached only through imports is skipped when every importer is.
#[derive(Debug)]
struct TrackedConditionEvaluator {
    conditions: ConditionEvaluator,
    skipped: HashMap<String, bool>,
}

impl TrackedConditionEvaluator {
    fn new(conditions: ConditionEvaluator) -> Self {
        Self {
            conditions,
            skipped: HashMap::new(),
        }
    }

    fn should_skip(
        &mut self,
        class: &ConfigurationClass,
        parser: &ConfigurationClassParser,
    ) -> Result<bool> {
        if let Some(skip) = self.skipped.get(class.name()) {
            return Ok(*skip);
        }
        // Provisional entry for importer cycles.
        let _ = self.skipped.insert(class.name().to_string(), false);

        let mut skip = false;
        if class.is_imported() {
            let mut all_skipped = true;
            for importer in class.imported_by() {
                let importer_skipped = match parser.configuration_class(&importer.name) {
                    Some(known) => self.should_skip(&known.borrow(), parser)?,
                    None => self.should_skip(
                        &ConfigurationClass::new(std::sync::Arc::clone(importer), None),
                        parser,
                    )?,
                };
                if !importer_skipped {
                    all_skipped = false;
                    break;
                }
            }
            skip = all_skipped;
        }
        if !skip {
            skip = self.conditions.should_skip(
                class.metadata().as_ref(),
                Some(ConfigurationPhase::RegisterBean),
            )?;
        }
        let _ = self.skipped.insert(class.name().to_string(), skip);
        Ok(skip)
    }
}

/// Turns parsed configuration classes into registry entries.
pub struct ConfigurationClassBeanDefinitionReader {
    context: ContainerContext,
    conditions: ConditionEvaluator,
    scope_resolver: AnnotationScopeMetadataResolver,
    import_name_generator: Rc<dyn BeanNameGenerator>,
    readers: HashMap<String, Rc<dyn ResourceDefinitionReader>>,
}

impl std::fmt::Debug for ConfigurationClassBeanDefinitionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationClassBeanDefinitionReader")
            .field("readers", &self.readers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ConfigurationClassBeanDefinitionReader {
    /// Creates a reader naming imported classes by their fully-qualified name.
    #[must_use]
    pub fn new(context: ContainerContext) -> Self {
        let generator = AnnotationBeanNameGenerator::fully_qualified(context.shared_metadata_source());
        Self::with_import_name_generator(context, Rc::new(generator))
    }

    /// Creates a reader with a custom name generator for imported classes.
    #[must_use]
    pub fn with_import_name_generator(
        context: ContainerContext,
        import_name_generator: Rc<dyn BeanNameGenerator>,
    ) -> Self {
        Self {
            conditions: ConditionEvaluator::new(context.clone()),
            scope_resolver: AnnotationScopeMetadataResolver::default(),
            import_name_generator,
            readers: HashMap::new(),
            context,
        }
    }

    /// Registers the definitions of every given class.
    ///
    /// `parser` resolves importers that were parsed in an earlier round and
    /// forgets the imports of classes found to be skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a condition fails, a definition is refused by the
    /// registry, or an imported resource or registrar fails.
    pub fn load_bean_definitions(
        &mut self,
        classes: &[SharedConfigurationClass],
        parser: &mut ConfigurationClassParser,
    ) -> Result<()> {
        let mut tracker = TrackedConditionEvaluator::new(self.conditions.clone());
        for class in classes {
            let skip = tracker.should_skip(&class.borrow(), parser)?;
            if skip {
                self.forget(&class.borrow(), parser)?;
            } else {
                self.load_for_configuration_class(class)?;
            }
        }
        Ok(())
    }

    fn forget(
        &self,
        class: &ConfigurationClass,
        parser: &mut ConfigurationClassParser,
    ) -> Result<()> {
        tracing::debug!(class = %class.name(), "configuration class skipped at registration");
        if let Some(bean_name) = class.bean_name() {
            let mut registry = self.context.registry().borrow_mut();
            if registry.contains_bean_definition(bean_name) {
                let _ = registry.remove_bean_definition(bean_name)?;
            }
        }
        parser.import_registry_mut().remove_importing_class(class.name());
        Ok(())
    }

    fn load_for_configuration_class(&mut self, class: &SharedConfigurationClass) -> Result<()> {
        if class.borrow().is_imported() {
            self.register_imported_configuration_class(class)?;
        }
        let bean_methods = class.borrow().bean_methods().to_vec();
        for bean_method in &bean_methods {
            self.load_bean_method(class, bean_method)?;
        }
        let resources = class.borrow().imported_resources().clone();
        for (location, reader) in &resources {
            self.load_imported_resource(location, reader)?;
        }
        let registrars = class.borrow().registrars().to_vec();
        for invocation in registrars {
            tracing::debug!(registrar = %invocation.class_name, importing = %invocation.importing.name, "invoking registrar");
            let mut registry = self.context.registry().borrow_mut();
            invocation.registrar.register_bean_definitions(
                &invocation.importing,
                &mut *registry,
                self.import_name_generator.as_ref(),
            )?;
        }
        Ok(())
    }

    fn register_imported_configuration_class(&self, class: &SharedConfigurationClass) -> Result<()> {
        let metadata = std::sync::Arc::clone(class.borrow().metadata());
        let source = self.context.metadata_source();

        let mut definition = BeanDefinition::from_metadata(
            std::sync::Arc::clone(&metadata),
            DefinitionOrigin::ImportedConfiguration,
        );
        let scope = self.scope_resolver.resolve(metadata.as_ref(), source);
        definition.scope.clone_from(&scope.scope_name);
        definition.source = Some(metadata.source_location());
        let name = {
            let registry = self.context.registry().borrow();
            self.import_name_generator
                .generate_bean_name(&definition, &*registry)?
        };
        process_common_definition_annotations(&mut definition, metadata.as_ref(), source);

        let mut registry = self.context.registry().borrow_mut();
        let holder = apply_scoped_proxy_mode(
            &scope,
            BeanDefinitionHolder::new(name.clone(), definition),
            &mut *registry,
        )?;
        register_holder(holder, &mut *registry)?;
        drop(registry);

        tracing::debug!(class = %metadata.name, bean = %name, "registered imported configuration class");
        class.borrow_mut().set_bean_name(name);
        Ok(())
    }

    fn load_bean_method(
        &self,
        class: &SharedConfigurationClass,
        bean_method: &BeanMethod,
    ) -> Result<()> {
        let method = &bean_method.metadata;
        let method_name = method.name.as_str();

        if self
            .conditions
            .should_skip(method, Some(ConfigurationPhase::RegisterBean))?
        {
            class.borrow_mut().skip_bean_method(method_name);
            return Ok(());
        }
        if class.borrow().is_bean_method_skipped(method_name) {
            return Ok(());
        }

        let source = self.context.metadata_source();
        let merged = MergedAnnotations::from_element(method, source);
        let Some(bean) = merged.get(BEAN) else {
            return Ok(());
        };

        let mut names = bean.strings("name");
        if names.is_empty() {
            names = bean.strings("value");
        }
        let bean_name = if names.is_empty() {
            method_name.to_string()
        } else {
            names.remove(0)
        };

        {
            let mut registry = self.context.registry().borrow_mut();
            for alias in &names {
                registry.register_alias(&bean_name, alias)?;
            }
        }

        let (class_metadata, class_bean_name) = {
            let class = class.borrow();
            (
                std::sync::Arc::clone(class.metadata()),
                class.bean_name().map(ToString::to_string),
            )
        };

        if self.is_overridden_by_existing_definition(&class_metadata.name, method_name, &bean_name)? {
            if class_bean_name.as_deref() == Some(bean_name.as_str()) {
                return Err(TrellisError::config(format!(
                    "bean name '{bean_name}' derived from @Bean method '{method_name}' clashes with bean name for containing configuration class {}; please make those names unique",
                    class_metadata.name
                )));
            }
            tracing::debug!(bean = %bean_name, method = method_name, "existing definition kept over @Bean method");
            return Ok(());
        }

        let mut definition = BeanDefinition {
            origin: DefinitionOrigin::BeanMethod {
                config_class: class_metadata.name.clone(),
            },
            source: Some(bean_method.location.clone()),
            metadata: Some(std::sync::Arc::clone(&class_metadata)),
            factory_method_name: Some(method_name.to_string()),
            factory_method_metadata: Some(method.clone()),
            ..BeanDefinition::default()
        };
        if method.is_static {
            definition.class_name = Some(class_metadata.name.clone());
        } else {
            definition.class_name.clone_from(&method.return_type);
            definition.factory_bean_name = class_bean_name;
        }

        process_common_definition_annotations(&mut definition, method, source);

        if let Some(autowire_candidate) = bean.boolean("autowireCandidate") {
            definition.autowire_candidate = autowire_candidate;
        }
        if let Some(init_method) = bean.string("initMethod").filter(|m| !m.is_empty()) {
            definition.init_method = Some(init_method.to_string());
        }
        if let Some(destroy_method) = bean.string("destroyMethod") {
            definition.destroy_method = Some(destroy_method.to_string());
        }

        let scope = self.scope_resolver.resolve(method, source);
        definition.scope.clone_from(&scope.scope_name);

        tracing::debug!(
            bean = %bean_name,
            class = %class_metadata.name,
            method = method_name,
            scope = %scope,
            "registering bean definition for @Bean method"
        );
        let mut registry = self.context.registry().borrow_mut();
        let holder = apply_scoped_proxy_mode(
            &scope,
            BeanDefinitionHolder::new(bean_name, definition),
            &mut *registry,
        )?;
        registry.register_bean_definition(&holder.name, holder.definition)
    }

    /// Decides whether a definition already bound to `bean_name` takes
    /// precedence over the bean method.
    fn is_overridden_by_existing_definition(
        &self,
        class_name: &str,
        method_name: &str,
        bean_name: &str,
    ) -> Result<bool> {
        let registry = self.context.registry().borrow();
        if !registry.contains_bean_definition(bean_name) {
            return Ok(false);
        }
        let existing = registry.get_bean_definition(bean_name)?;

        if let DefinitionOrigin::BeanMethod { config_class } = &existing.origin {
            if config_class == class_name {
                tracing::trace!(bean = bean_name, method = method_name, "overloaded @Bean method, keeping first");
                return Ok(true);
            }
            return Ok(false);
        }
        if existing.origin.is_scanned() || existing.role != Role::Application {
            return Ok(false);
        }
        if !registry.allow_bean_definition_overriding() {
            return Err(TrellisError::BeanDefinitionOverride {
                bean_name: bean_name.to_string(),
                new_definition: format!("@Bean method {class_name}.{method_name}"),
                existing_definition: existing
                    .class_name
                    .clone()
                    .unwrap_or_else(|| "definition without class".to_string()),
            });
        }
        Ok(true)
    }

    fn load_imported_resource(&mut self, location: &str, reader_name: &str) -> Result<()> {
        let reader = match self.readers.get(reader_name) {
            Some(reader) => Rc::clone(reader),
            None => {
                let reader = self
                    .context
                    .plugins()
                    .resource_reader(reader_name, &self.context)?;
                let _ = self
                    .readers
                    .insert(reader_name.to_string(), Rc::clone(&reader));
                reader
            }
        };
        let resources = self.context.resource_loader().get_resources(location)?;
        let mut registry = self.context.registry().borrow_mut();
        let mut count = 0;
        for resource in &resources {
            count += reader.load_bean_definitions(resource.as_ref(), &mut *registry)?;
        }
        tracing::debug!(location, reader = reader_name, count, "imported resource loaded");
        Ok(())
    }
}
