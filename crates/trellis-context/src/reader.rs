//! Registration of explicitly named component classes.

use std::fmt;
use std::rc::Rc;

use trellis_common::error::Result;
use trellis_core::definition::{BeanDefinition, BeanDefinitionHolder, DefinitionOrigin};

use crate::annotations::process_common_definition_annotations;
use crate::condition::ConditionEvaluator;
use crate::context::ContainerContext;
use crate::naming::{AnnotationBeanNameGenerator, BeanNameGenerator};
use crate::scope::{AnnotationScopeMetadataResolver, apply_scoped_proxy_mode};
use crate::utils::register_holder;

/// Registers classes given by name, typically the primary configuration
/// classes of a container.
pub struct AnnotatedBeanDefinitionReader {
    context: ContainerContext,
    conditions: ConditionEvaluator,
    scope_resolver: AnnotationScopeMetadataResolver,
    name_generator: Rc<dyn BeanNameGenerator>,
}

impl fmt::Debug for AnnotatedBeanDefinitionReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotatedBeanDefinitionReader")
            .field("scope_resolver", &self.scope_resolver)
            .finish_non_exhaustive()
    }
}

impl AnnotatedBeanDefinitionReader {
    /// Creates a reader with the annotation-based name generator.
    #[must_use]
    pub fn new(context: ContainerContext) -> Self {
        let name_generator = Rc::new(AnnotationBeanNameGenerator::new(
            context.shared_metadata_source(),
        ));
        Self {
            conditions: ConditionEvaluator::new(context.clone()),
            context,
            scope_resolver: AnnotationScopeMetadataResolver::default(),
            name_generator,
        }
    }

    /// Replaces the bean name generator.
    pub fn set_name_generator(&mut self, generator: Rc<dyn BeanNameGenerator>) {
        self.name_generator = generator;
    }

    /// Replaces the scope resolver.
    pub const fn set_scope_resolver(&mut self, resolver: AnnotationScopeMetadataResolver) {
        self.scope_resolver = resolver;
    }

    /// Registers every class under a generated name.
    ///
    /// # Errors
    ///
    /// Returns the first registration failure.
    pub fn register(&self, class_names: &[impl AsRef<str>]) -> Result<Vec<String>> {
        let mut registered = Vec::new();
        for class_name in class_names {
            if let Some(name) = self.register_bean(class_name.as_ref(), None)? {
                registered.push(name);
            }
        }
        Ok(registered)
    }

    /// Registers one class, optionally under an explicit name.
    ///
    /// Returns the bean name, or `None` when a condition skipped the class.
    ///
    /// # Errors
    ///
    /// Returns an error if the class cannot be read, a condition or the
    /// name generator fails, or the registry refuses the definition.
    pub fn register_bean(&self, class_name: &str, name: Option<&str>) -> Result<Option<String>> {
        let source = self.context.metadata_source();
        let metadata = source.read(class_name)?;
        if self.conditions.should_skip(metadata.as_ref(), None)? {
            tracing::debug!(class = %class_name, "registration skipped by condition");
            return Ok(None);
        }

        let mut definition = BeanDefinition::from_metadata(metadata, DefinitionOrigin::Annotated);
        let scope = self.scope_resolver.resolve_definition(&definition, source);
        definition.scope.clone_from(&scope.scope_name);
        definition.proxy_mode = scope.proxy_mode;

        let bean_name = match name {
            Some(name) => name.to_string(),
            None => {
                let registry = self.context.registry().borrow();
                self.name_generator.generate_bean_name(&definition, &*registry)?
            }
        };
        if let Some(class) = definition.metadata.clone() {
            process_common_definition_annotations(&mut definition, class.as_ref(), source);
        }

        let mut registry = self.context.registry().borrow_mut();
        let holder = BeanDefinitionHolder::new(bean_name, definition);
        let holder = apply_scoped_proxy_mode(&scope, holder, &mut *registry)?;
        tracing::debug!(bean = %holder.name, class = %class_name, "registering annotated class");
        let bean_name = holder.name.clone();
        register_holder(holder, &mut *registry)?;
        Ok(Some(bean_name))
    }
}

#[cfg(test)]
mod tests {
    use trellis_core::metadata::AnnotatedElement;
    use trellis_core::registry::{BeanDefinitionRegistry, SimpleBeanDefinitionRegistry};
    use trellis_core::source::ClassIndex;

    use super::*;
    use crate::condition::Condition;
    use crate::plugin::PluginRegistry;

    const SOURCES: &str = r#"
package com.a

@Configuration @Lazy @Primary class AppConfig {}
@Component("custom") class Named {}
@Scope(value = "request", proxyMode = INTERFACES) class Scoped {}
@Conditional([com.a.Never]) class Hidden {}
"#;

    struct Never;

    impl Condition for Never {
        fn matches(&self, _: &ContainerContext, _: &dyn AnnotatedElement) -> Result<bool> {
            Ok(false)
        }
    }

    fn reader() -> (
        Rc<std::cell::RefCell<SimpleBeanDefinitionRegistry>>,
        AnnotatedBeanDefinitionReader,
    ) {
        let registry = SimpleBeanDefinitionRegistry::new().into_shared();
        let index: ClassIndex =
            trellis_descriptor::index_from_sources([("a.tcd", SOURCES)]).unwrap();
        let mut plugins = PluginRegistry::with_defaults();
        plugins.register_condition("com.a.Never", |_| Ok(Rc::new(Never) as Rc<dyn Condition>));
        let context =
            ContainerContext::new(registry.clone(), Rc::new(index)).with_plugins(plugins);
        (registry, AnnotatedBeanDefinitionReader::new(context))
    }

    #[test]
    fn classes_are_registered_with_common_annotations() {
        let (registry, reader) = reader();
        let names = reader.register(&["com.a.AppConfig", "com.a.Named"]).unwrap();
        assert_eq!(names, vec!["appConfig", "custom"]);

        let registry = registry.borrow();
        let config = registry.get_bean_definition("appConfig").unwrap();
        assert_eq!(config.origin, DefinitionOrigin::Annotated);
        assert_eq!(config.lazy_init, Some(true));
        assert!(config.primary);
    }

    #[test]
    fn explicit_names_win_over_generated_ones() {
        let (registry, reader) = reader();
        let name = reader.register_bean("com.a.Named", Some("explicit")).unwrap();
        assert_eq!(name.as_deref(), Some("explicit"));
        assert!(!registry.borrow().contains_bean_definition("custom"));
    }

    #[test]
    fn scoped_classes_are_registered_behind_a_proxy() {
        let (registry, reader) = reader();
        let _ = reader.register(&["com.a.Scoped"]).unwrap();
        let registry = registry.borrow();
        assert_eq!(
            registry.get_bean_definition("scoped").unwrap().origin,
            DefinitionOrigin::ScopedProxy
        );
        assert_eq!(
            registry.get_bean_definition("scopedTarget.scoped").unwrap().scope,
            "request"
        );
    }

    #[test]
    fn conditional_classes_can_be_skipped() {
        let (registry, reader) = reader();
        assert!(reader.register(&["com.a.Hidden"]).unwrap().is_empty());
        assert_eq!(registry.borrow().bean_definition_count(), 0);
    }

    #[test]
    fn unknown_classes_are_an_error() {
        let (_, reader) = reader();
        assert!(reader.register(&["com.a.Missing"]).is_err());
    }
}
