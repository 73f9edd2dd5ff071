//! The model of one discovered configuration class.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use trellis_common::constants::CONFIGURATION;
use trellis_core::metadata::{ClassMetadata, MergedAnnotations, MethodMetadata};
use trellis_core::source::MetadataSource;

use crate::imports::ImportBeanDefinitionRegistrar;
use crate::problem::{Problem, ProblemReporter};

/// A `@Bean` method together with the configuration class it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeanMethod {
    /// Method metadata.
    pub metadata: MethodMetadata,
    /// Configuration class the method was collected for.
    pub configuration_class: String,
    /// Where the configuration class was read from.
    pub location: String,
}

impl BeanMethod {
    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    fn validate(&self, reporter: &mut ProblemReporter) {
        if self.metadata.is_static {
            return;
        }
        if !self.metadata.is_overridable() {
            reporter.error(Problem::NonOverridableBeanMethod {
                class_name: self.metadata.declaring_class.clone(),
                method: self.metadata.name.clone(),
                location: self.location.clone(),
            });
        }
    }
}

/// A registrar recorded for later invocation.
#[derive(Clone)]
pub struct RegistrarInvocation {
    /// The registrar instance.
    pub registrar: Rc<dyn ImportBeanDefinitionRegistrar>,
    /// Class name the registrar was imported as.
    pub class_name: String,
    /// Metadata of the class that imported it.
    pub importing: Arc<ClassMetadata>,
}

impl fmt::Debug for RegistrarInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrarInvocation")
            .field("class_name", &self.class_name)
            .field("importing", &self.importing.name)
            .finish_non_exhaustive()
    }
}

/// One configuration unit discovered during parsing.
///
/// Two instances are equal when they describe the same class.
#[derive(Debug, Clone)]
pub struct ConfigurationClass {
    metadata: Arc<ClassMetadata>,
    bean_name: Option<String>,
    imported_by: IndexMap<String, Arc<ClassMetadata>>,
    bean_methods: Vec<BeanMethod>,
    imported_resources: IndexMap<String, String>,
    registrars: Vec<RegistrarInvocation>,
    skipped_bean_methods: HashSet<String>,
}

impl PartialEq for ConfigurationClass {
    fn eq(&self, other: &Self) -> bool {
        self.metadata.name == other.metadata.name
    }
}

impl Eq for ConfigurationClass {}

impl ConfigurationClass {
    /// A class registered explicitly under a bean name.
    #[must_use]
    pub fn new(metadata: Arc<ClassMetadata>, bean_name: Option<String>) -> Self {
        Self {
            metadata,
            bean_name,
            imported_by: IndexMap::new(),
            bean_methods: Vec::new(),
            imported_resources: IndexMap::new(),
            registrars: Vec::new(),
            skipped_bean_methods: HashSet::new(),
        }
    }

    /// A class reached through an import, member-class nesting, or superclass walk.
    #[must_use]
    pub fn imported(metadata: Arc<ClassMetadata>, imported_by: &Arc<ClassMetadata>) -> Self {
        let mut class = Self::new(metadata, None);
        let _ = class
            .imported_by
            .insert(imported_by.name.clone(), Arc::clone(imported_by));
        class
    }

    /// Class metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Arc<ClassMetadata> {
        &self.metadata
    }

    /// Fully-qualified class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Short class name.
    #[must_use]
    pub fn simple_name(&self) -> String {
        self.metadata.short_name()
    }

    /// Bean name, once known.
    #[must_use]
    pub fn bean_name(&self) -> Option<&str> {
        self.bean_name.as_deref()
    }

    /// Sets the bean name chosen at registration.
    pub fn set_bean_name(&mut self, bean_name: impl Into<String>) {
        self.bean_name = Some(bean_name.into());
    }

    /// Returns `true` if the class was reached by import rather than registered.
    #[must_use]
    pub fn is_imported(&self) -> bool {
        !self.imported_by.is_empty()
    }

    /// Importing classes, first importer first.
    #[must_use]
    pub fn imported_by(&self) -> Vec<&Arc<ClassMetadata>> {
        self.imported_by.values().collect()
    }

    /// Unions the importers of another instance of the same class into this one.
    pub fn merge_imported_by(&mut self, other: &Self) {
        for (name, metadata) in &other.imported_by {
            if !self.imported_by.contains_key(name) {
                let _ = self.imported_by.insert(name.clone(), Arc::clone(metadata));
            }
        }
    }

    /// Records a bean method; the same method is only recorded once.
    pub fn add_bean_method(&mut self, method: MethodMetadata) {
        let bean_method = BeanMethod {
            metadata: method,
            configuration_class: self.metadata.name.clone(),
            location: self.metadata.source_location(),
        };
        if !self.bean_methods.contains(&bean_method) {
            self.bean_methods.push(bean_method);
        }
    }

    /// Bean methods in collection order.
    #[must_use]
    pub fn bean_methods(&self) -> &[BeanMethod] {
        &self.bean_methods
    }

    /// Records an `@ImportResource` location with its reader.
    pub fn add_imported_resource(&mut self, location: impl Into<String>, reader: impl Into<String>) {
        let _ = self.imported_resources.insert(location.into(), reader.into());
    }

    /// `@ImportResource` locations mapped to reader names.
    #[must_use]
    pub const fn imported_resources(&self) -> &IndexMap<String, String> {
        &self.imported_resources
    }

    /// Records a registrar to invoke during emission.
    pub fn add_registrar(
        &mut self,
        registrar: Rc<dyn ImportBeanDefinitionRegistrar>,
        class_name: impl Into<String>,
        importing: Arc<ClassMetadata>,
    ) {
        self.registrars.push(RegistrarInvocation {
            registrar,
            class_name: class_name.into(),
            importing,
        });
    }

    /// Registrars in import order.
    #[must_use]
    pub fn registrars(&self) -> &[RegistrarInvocation] {
        &self.registrars
    }

    /// Marks a bean method as skipped by its conditions.
    pub fn skip_bean_method(&mut self, name: impl Into<String>) {
        let _ = self.skipped_bean_methods.insert(name.into());
    }

    /// Returns `true` if a bean method with that name was skipped.
    #[must_use]
    pub fn is_bean_method_skipped(&self, name: &str) -> bool {
        self.skipped_bean_methods.contains(name)
    }

    /// Names of skipped bean methods, sorted.
    #[must_use]
    pub fn skipped_bean_methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.skipped_bean_methods.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Reports structural problems of a `@Configuration` class.
    ///
    /// A proxying configuration class must not be final and its instance
    /// bean methods must be overridable. Unless `enforceUniqueMethods` is
    /// disabled, a class must not declare two bean methods of the same name.
    pub fn validate(&self, source: &dyn MetadataSource, reporter: &mut ProblemReporter) {
        let merged = MergedAnnotations::from_element(self.metadata.as_ref(), source);
        let Some(attributes) = merged.get(CONFIGURATION) else {
            return;
        };
        let location = self.metadata.source_location();

        if attributes.boolean("proxyBeanMethods") != Some(false) {
            if self.metadata.is_final {
                reporter.error(Problem::FinalConfigurationClass {
                    class_name: self.metadata.name.clone(),
                    location: location.clone(),
                });
            }
            for bean_method in &self.bean_methods {
                bean_method.validate(reporter);
            }
        }

        if attributes.boolean("enforceUniqueMethods") != Some(false) {
            let mut seen: IndexSet<(&str, &str)> = IndexSet::new();
            for bean_method in &self.bean_methods {
                let key = (
                    bean_method.metadata.declaring_class.as_str(),
                    bean_method.metadata.name.as_str(),
                );
                if !seen.insert(key) {
                    reporter.error(Problem::OverloadedBeanMethod {
                        class_name: self.metadata.name.clone(),
                        method: bean_method.metadata.name.clone(),
                        location: location.clone(),
                    });
                }
            }
        }
    }
}

impl fmt::Display for ConfigurationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigurationClass: beanName '")?;
        match &self.bean_name {
            Some(name) => write!(f, "{name}")?,
            None => write!(f, "null")?,
        }
        write!(f, "', {}", self.metadata.source_location())
    }
}

#[cfg(test)]
mod tests {
    use trellis_core::source::ClassIndex;

    use super::*;

    const SOURCES: &str = r#"
package com.a

@Configuration
final class Sealed {
    @Bean final method locked
    @Bean static method shared
    @Bean method open
}

@Configuration
class Overloaded {
    @Bean method thing: String
    @Bean method thing: Integer
}

@Configuration(proxyBeanMethods = false, enforceUniqueMethods = false)
final class Relaxed {
    @Bean final method thing: String
    @Bean method thing: Integer
}
"#;

    fn index() -> ClassIndex {
        trellis_descriptor::index_from_sources([("a.tcd", SOURCES)]).unwrap()
    }

    fn with_methods(index: &ClassIndex, name: &str) -> ConfigurationClass {
        let metadata = index.read(name).unwrap();
        let mut class = ConfigurationClass::new(Arc::clone(&metadata), None);
        for method in &metadata.methods {
            class.add_bean_method(method.clone());
        }
        class
    }

    #[test]
    fn equality_is_by_class_name() {
        let index = index();
        let importer = index.read("com.a.Relaxed").unwrap();
        let explicit = ConfigurationClass::new(index.read("com.a.Sealed").unwrap(), Some("s".into()));
        let imported = ConfigurationClass::imported(index.read("com.a.Sealed").unwrap(), &importer);
        assert_eq!(explicit, imported);
        assert!(!explicit.is_imported());
        assert!(imported.is_imported());
    }

    #[test]
    fn merging_unions_importers_in_first_seen_order() {
        let target = Arc::new(ClassMetadata::new("com.a.T"));
        let a = Arc::new(ClassMetadata::new("com.a.A"));
        let b = Arc::new(ClassMetadata::new("com.a.B"));
        let mut first = ConfigurationClass::imported(Arc::clone(&target), &a);
        let second = ConfigurationClass::imported(Arc::clone(&target), &b);
        let again = ConfigurationClass::imported(target, &a);
        first.merge_imported_by(&second);
        first.merge_imported_by(&again);
        let names: Vec<_> = first.imported_by().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["com.a.A", "com.a.B"]);
    }

    #[test]
    fn same_bean_method_is_collected_once() {
        let index = index();
        let metadata = index.read("com.a.Sealed").unwrap();
        let mut class = ConfigurationClass::new(Arc::clone(&metadata), None);
        class.add_bean_method(metadata.methods[2].clone());
        class.add_bean_method(metadata.methods[2].clone());
        assert_eq!(class.bean_methods().len(), 1);
        assert_eq!(class.bean_methods()[0].name(), "open");
    }

    #[test]
    fn proxying_class_must_be_extendable() {
        let index = index();
        let mut reporter = ProblemReporter::new();
        with_methods(&index, "com.a.Sealed").validate(&index, &mut reporter);
        assert_eq!(
            reporter.problems(),
            &[
                Problem::FinalConfigurationClass {
                    class_name: "com.a.Sealed".into(),
                    location: "a.tcd#com.a.Sealed".into(),
                },
                Problem::NonOverridableBeanMethod {
                    class_name: "com.a.Sealed".into(),
                    method: "locked".into(),
                    location: "a.tcd#com.a.Sealed".into(),
                },
            ]
        );
    }

    #[test]
    fn overloads_are_reported_unless_relaxed() {
        let index = index();
        let mut reporter = ProblemReporter::new();
        with_methods(&index, "com.a.Overloaded").validate(&index, &mut reporter);
        assert!(matches!(
            reporter.problems(),
            [Problem::OverloadedBeanMethod { method, .. }] if method == "thing"
        ));

        let mut relaxed = ProblemReporter::new();
        with_methods(&index, "com.a.Relaxed").validate(&index, &mut relaxed);
        assert!(relaxed.is_empty());
    }
}
