//! Classpath component scanning.
//!
//! A scan walks every class of a base package through the metadata source,
//! keeps those that pass the exclude and include filters, the condition
//! check and the concreteness check, and registers one definition per
//! candidate. Re-registering a compatible definition is a silent no-op;
//! an incompatible one under the same name is fatal.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use trellis_common::config::TrellisConfig;
use trellis_common::constants::{COMPONENT, LOOKUP};
use trellis_common::error::{Result, TrellisError};
use trellis_core::definition::{BeanDefinition, BeanDefinitionHolder, DefinitionOrigin};
use trellis_core::metadata::{ClassMetadata, MergedAnnotations};
use trellis_core::registry::BeanDefinitionRegistry;

use crate::annotations::process_common_definition_annotations;
use crate::condition::ConditionEvaluator;
use crate::context::ContainerContext;
use crate::filter::{AnnotationTypeFilter, TypeFilter};
use crate::naming::{AnnotationBeanNameGenerator, BeanNameGenerator};
use crate::scope::{AnnotationScopeMetadataResolver, apply_scoped_proxy_mode};
use crate::utils::register_holder;

/// Registers component classes found under base packages.
pub struct ClassPathBeanDefinitionScanner {
    context: ContainerContext,
    conditions: ConditionEvaluator,
    include_filters: Vec<Rc<dyn TypeFilter>>,
    exclude_filters: Vec<Rc<dyn TypeFilter>>,
    scope_resolver: AnnotationScopeMetadataResolver,
    name_generator: Rc<dyn BeanNameGenerator>,
    lazy_init_default: bool,
    autowire_candidate_patterns: Option<GlobSet>,
}

impl fmt::Debug for ClassPathBeanDefinitionScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassPathBeanDefinitionScanner")
            .field("include_filters", &self.include_filters.len())
            .field("exclude_filters", &self.exclude_filters.len())
            .field("scope_resolver", &self.scope_resolver)
            .field("lazy_init_default", &self.lazy_init_default)
            .finish_non_exhaustive()
    }
}

impl ClassPathBeanDefinitionScanner {
    /// Creates a scanner, optionally with the `@Component` include filter.
    #[must_use]
    pub fn new(context: ContainerContext, use_default_filters: bool) -> Self {
        let name_generator = Rc::new(AnnotationBeanNameGenerator::new(
            context.shared_metadata_source(),
        ));
        let mut scanner = Self {
            conditions: ConditionEvaluator::new(context.clone()),
            context,
            include_filters: Vec::new(),
            exclude_filters: Vec::new(),
            scope_resolver: AnnotationScopeMetadataResolver::default(),
            name_generator,
            lazy_init_default: false,
            autowire_candidate_patterns: None,
        };
        if use_default_filters {
            scanner.register_default_filters();
        }
        scanner
    }

    /// Creates a scanner configured from container settings.
    ///
    /// # Errors
    ///
    /// Returns an error if an autowire-candidate pattern is invalid.
    pub fn from_config(context: ContainerContext, config: &TrellisConfig) -> Result<Self> {
        let mut scanner = Self::new(context, config.include_default_filters);
        scanner.set_scope_resolver(AnnotationScopeMetadataResolver::new(
            config.default_proxy_mode,
        ));
        scanner.set_lazy_init_default(config.lazy_init_default);
        scanner.set_autowire_candidate_patterns(&config.autowire_candidate_patterns)?;
        Ok(scanner)
    }

    fn register_default_filters(&mut self) {
        self.include_filters
            .push(Rc::new(AnnotationTypeFilter::new(COMPONENT)));
    }

    /// Drops every filter, re-adding the default include filter if asked.
    pub fn reset_filters(&mut self, use_default_filters: bool) {
        self.include_filters.clear();
        self.exclude_filters.clear();
        if use_default_filters {
            self.register_default_filters();
        }
    }

    /// Adds a filter a class must match to be a candidate.
    pub fn add_include_filter(&mut self, filter: Rc<dyn TypeFilter>) {
        self.include_filters.push(filter);
    }

    /// Adds a filter that rules a class out, checked before includes.
    pub fn add_exclude_filter(&mut self, filter: Rc<dyn TypeFilter>) {
        self.exclude_filters.push(filter);
    }

    /// Replaces the bean name generator.
    pub fn set_name_generator(&mut self, generator: Rc<dyn BeanNameGenerator>) {
        self.name_generator = generator;
    }

    /// Replaces the scope resolver.
    pub const fn set_scope_resolver(&mut self, resolver: AnnotationScopeMetadataResolver) {
        self.scope_resolver = resolver;
    }

    /// Lazy-init flag applied to every scanned definition before `@Lazy`.
    pub const fn set_lazy_init_default(&mut self, lazy: bool) {
        self.lazy_init_default = lazy;
    }

    /// Restricts autowiring to bean names matching one of the `*` patterns.
    ///
    /// An empty list leaves every scanned bean autowirable.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a pattern is invalid.
    pub fn set_autowire_candidate_patterns(&mut self, patterns: &[String]) -> Result<()> {
        if patterns.is_empty() {
            self.autowire_candidate_patterns = None;
            return Ok(());
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|err| {
                TrellisError::config(format!("invalid autowire candidate pattern '{pattern}': {err}"))
            })?;
            let _ = builder.add(glob);
        }
        let set = builder.build().map_err(|err| {
            TrellisError::config(format!("invalid autowire candidate patterns: {err}"))
        })?;
        self.autowire_candidate_patterns = Some(set);
        Ok(())
    }

    /// The collaborators the scanner works with.
    #[must_use]
    pub const fn context(&self) -> &ContainerContext {
        &self.context
    }

    /// Scans the packages and returns how many definitions were added.
    ///
    /// # Errors
    ///
    /// Returns an error if a package cannot be enumerated, a condition or
    /// name generator fails, or a candidate conflicts with an existing
    /// definition.
    pub fn scan(&self, base_packages: &[impl AsRef<str>]) -> Result<usize> {
        let before = self.context.registry().borrow().bean_definition_count();
        let _ = self.do_scan(base_packages)?;
        let after = self.context.registry().borrow().bean_definition_count();
        Ok(after.saturating_sub(before))
    }

    /// Scans the packages and returns the holders actually registered.
    ///
    /// # Errors
    ///
    /// See [`ClassPathBeanDefinitionScanner::scan`].
    pub fn do_scan(&self, base_packages: &[impl AsRef<str>]) -> Result<Vec<BeanDefinitionHolder>> {
        if base_packages.is_empty() {
            return Err(TrellisError::config(
                "at least one base package must be specified",
            ));
        }
        let mut registered = Vec::new();
        for base_package in base_packages {
            let base_package = base_package.as_ref();
            for metadata in self.find_candidate_components(base_package)? {
                if let Some(holder) = self.register_candidate(metadata)? {
                    registered.push(holder);
                }
            }
        }
        Ok(registered)
    }

    /// Reads every class of a package and keeps the candidate components.
    ///
    /// # Errors
    ///
    /// Returns an error if the package or a class cannot be read, or a
    /// filter or condition fails.
    pub fn find_candidate_components(
        &self,
        base_package: &str,
    ) -> Result<Vec<Arc<ClassMetadata>>> {
        let source = self.context.metadata_source();
        let mut candidates = Vec::new();
        for class_name in source.package_classes(base_package)? {
            let metadata = source.read(&class_name)?;
            if !self.is_candidate_component(&metadata)? {
                tracing::trace!(class = %class_name, "ignored: no matching filter");
                continue;
            }
            if !self.is_instantiable_candidate(&metadata) {
                tracing::debug!(class = %class_name, "ignored: not a concrete top-level class");
                continue;
            }
            tracing::debug!(class = %class_name, "identified candidate component");
            candidates.push(metadata);
        }
        Ok(candidates)
    }

    fn is_candidate_component(&self, metadata: &ClassMetadata) -> Result<bool> {
        let source = self.context.metadata_source();
        for filter in &self.exclude_filters {
            if filter.matches(metadata, source)? {
                return Ok(false);
            }
        }
        for filter in &self.include_filters {
            if filter.matches(metadata, source)? {
                return Ok(!self.conditions.should_skip(metadata, None)?);
            }
        }
        Ok(false)
    }

    fn is_instantiable_candidate(&self, metadata: &ClassMetadata) -> bool {
        if !metadata.is_independent() {
            return false;
        }
        if metadata.is_concrete() {
            return true;
        }
        metadata.is_abstract
            && !metadata.is_interface()
            && metadata.methods.iter().any(|method| {
                MergedAnnotations::from_element(method, self.context.metadata_source())
                    .is_present(LOOKUP)
            })
    }

    fn register_candidate(
        &self,
        metadata: Arc<ClassMetadata>,
    ) -> Result<Option<BeanDefinitionHolder>> {
        let source = self.context.metadata_source();
        let mut candidate = BeanDefinition::from_metadata(metadata, DefinitionOrigin::Scanned);
        let scope = self.scope_resolver.resolve_definition(&candidate, source);
        candidate.scope.clone_from(&scope.scope_name);
        candidate.proxy_mode = scope.proxy_mode;

        let bean_name = {
            let registry = self.context.registry().borrow();
            self.name_generator.generate_bean_name(&candidate, &*registry)?
        };
        self.post_process(&mut candidate, &bean_name);
        if let Some(class) = candidate.metadata.clone() {
            process_common_definition_annotations(&mut candidate, class.as_ref(), source);
        }

        let mut registry = self.context.registry().borrow_mut();
        if !check_candidate(&bean_name, &candidate, &*registry)? {
            tracing::trace!(bean = %bean_name, "compatible definition already registered");
            return Ok(None);
        }
        let holder = BeanDefinitionHolder::new(bean_name, candidate);
        let holder = apply_scoped_proxy_mode(&scope, holder, &mut *registry)?;
        tracing::debug!(bean = %holder.name, class = ?holder.definition.class_name, "registering scanned bean");
        register_holder(holder.clone(), &mut *registry)?;
        Ok(Some(holder))
    }

    fn post_process(&self, definition: &mut BeanDefinition, bean_name: &str) {
        definition.lazy_init = Some(self.lazy_init_default);
        if let Some(patterns) = &self.autowire_candidate_patterns {
            definition.autowire_candidate = patterns.is_match(bean_name);
        }
    }
}

/// Decides whether a scanned candidate should be registered.
///
/// Returns `Ok(true)` when the name is free and `Ok(false)` when a
/// compatible definition already holds it. An existing definition is
/// compatible if it was not produced by scanning, comes from the same
/// source, or is structurally equal; a scoped proxy is compared through the
/// target it stands in for.
///
/// # Errors
///
/// Returns [`TrellisError::ConflictingBeanDefinition`] otherwise.
pub fn check_candidate(
    bean_name: &str,
    candidate: &BeanDefinition,
    registry: &dyn BeanDefinitionRegistry,
) -> Result<bool> {
    if !registry.contains_bean_definition(bean_name) {
        return Ok(true);
    }
    let registered = registry.get_bean_definition(bean_name)?;
    let existing = registered.originating.as_deref().unwrap_or(registered);
    if is_compatible(candidate, existing) {
        return Ok(false);
    }
    Err(TrellisError::ConflictingBeanDefinition {
        bean_name: bean_name.to_string(),
        new_class: candidate.class_name.clone().unwrap_or_default(),
        existing_class: existing.class_name.clone().unwrap_or_default(),
    })
}

fn is_compatible(candidate: &BeanDefinition, existing: &BeanDefinition) -> bool {
    !existing.origin.is_scanned()
        || (candidate.source.is_some() && candidate.source == existing.source)
        || candidate == existing
}

#[cfg(test)]
mod tests {
    use trellis_common::constants::SERVICE;
    use trellis_common::types::ScopedProxyMode;
    use trellis_core::registry::SimpleBeanDefinitionRegistry;

    use super::*;
    use crate::filter::RegexPatternTypeFilter;

    const SOURCES: &str = r#"
package com.app

@Component class Alpha {}
@Service("named") class Beta {}
@Repository class Gamma {}
class Plain {}
@Component abstract class Incomplete {}
@Component abstract class WithLookup { @Lookup abstract method create }
@Component interface Contract {}
@Component class Outer {
    @Component class Inner {}
    @Component static class Nested {}
}
@Component @Scope(value = "request", proxyMode = TARGET_CLASS) class PerRequest {}
@Component @Lazy class Deferred {}
"#;

    const OTHER: &str = r#"
package com.other

@Component("alpha") class Alpha {}
"#;

    fn context() -> ContainerContext {
        let index = trellis_descriptor::index_from_sources([("app.tcd", SOURCES), ("other.tcd", OTHER)])
            .unwrap();
        ContainerContext::new(SimpleBeanDefinitionRegistry::new().into_shared(), Rc::new(index))
    }

    fn names(context: &ContainerContext) -> Vec<String> {
        context.registry().borrow().bean_definition_names()
    }

    #[test]
    fn default_filters_find_concrete_components() {
        let context = context();
        let scanner = ClassPathBeanDefinitionScanner::new(context.clone(), true);
        let count = scanner.scan(&["com.app"]).unwrap();
        assert_eq!(
            names(&context),
            vec![
                "alpha",
                "named",
                "deferred",
                "gamma",
                "outer",
                "outer.Nested",
                "scopedTarget.perRequest",
                "perRequest",
                "withLookup",
            ]
        );
        assert_eq!(count, 9);
    }

    #[test]
    fn rescanning_registers_nothing() {
        let context = context();
        let scanner = ClassPathBeanDefinitionScanner::new(context.clone(), true);
        let first = scanner.scan(&["com.app"]).unwrap();
        assert!(first > 0);
        assert_eq!(scanner.scan(&["com.app"]).unwrap(), 0);
    }

    #[test]
    fn colliding_names_from_distinct_classes_are_fatal() {
        let context = context();
        let scanner = ClassPathBeanDefinitionScanner::new(context.clone(), true);
        let _ = scanner.scan(&["com.app"]).unwrap();
        let err = scanner.scan(&["com.other"]).unwrap_err();
        assert!(matches!(
            err,
            TrellisError::ConflictingBeanDefinition { ref bean_name, ref new_class, ref existing_class }
                if bean_name == "alpha" && new_class == "com.other.Alpha" && existing_class == "com.app.Alpha"
        ));
    }

    #[test]
    fn explicit_definitions_are_never_replaced() {
        let context = context();
        context
            .registry()
            .borrow_mut()
            .register_bean_definition("alpha", BeanDefinition::new("com.explicit.Alpha"))
            .unwrap();
        let scanner = ClassPathBeanDefinitionScanner::new(context.clone(), true);
        let _ = scanner.scan(&["com.app"]).unwrap();
        let registry = context.registry().borrow();
        assert_eq!(
            registry.get_bean_definition("alpha").unwrap().class_name.as_deref(),
            Some("com.explicit.Alpha")
        );
    }

    #[test]
    fn filters_and_defaults_are_applied() {
        let context = context();
        let mut scanner = ClassPathBeanDefinitionScanner::new(context.clone(), false);
        scanner.add_include_filter(Rc::new(RegexPatternTypeFilter::new(r"com\.app\.(Plain|Beta)").unwrap()));
        scanner.add_exclude_filter(Rc::new(AnnotationTypeFilter::new(SERVICE)));
        scanner.set_lazy_init_default(true);
        scanner
            .set_autowire_candidate_patterns(&["*ain".to_string()])
            .unwrap();
        assert_eq!(scanner.scan(&["com.app"]).unwrap(), 1);

        let registry = context.registry().borrow();
        let plain = registry.get_bean_definition("plain").unwrap();
        assert_eq!(plain.lazy_init, Some(true));
        assert!(plain.autowire_candidate);
        assert_eq!(plain.origin, DefinitionOrigin::Scanned);
    }

    #[test]
    fn scoped_proxies_hide_their_target() {
        let context = context();
        let scanner = ClassPathBeanDefinitionScanner::new(context.clone(), true);
        let holders = scanner.do_scan(&["com.app"]).unwrap();
        let proxy = holders.iter().find(|h| h.name == "perRequest").unwrap();
        assert_eq!(proxy.definition.origin, DefinitionOrigin::ScopedProxy);
        let target = proxy.definition.originating.as_deref().unwrap();
        assert_eq!(target.scope, "request");
        assert_eq!(target.proxy_mode, ScopedProxyMode::TargetClass);
        assert!(!target.autowire_candidate);
    }

    #[test]
    fn lazy_annotation_wins_over_default() {
        let context = context();
        let scanner = ClassPathBeanDefinitionScanner::new(context.clone(), true);
        let _ = scanner.scan(&["com.app"]).unwrap();
        let registry = context.registry().borrow();
        assert_eq!(registry.get_bean_definition("deferred").unwrap().lazy_init, Some(true));
        assert_eq!(registry.get_bean_definition("gamma").unwrap().lazy_init, Some(false));
    }

    #[test]
    fn empty_package_list_is_rejected() {
        let scanner = ClassPathBeanDefinitionScanner::new(context(), true);
        let none: [&str; 0] = [];
        assert!(scanner.scan(&none).is_err());
    }
}
