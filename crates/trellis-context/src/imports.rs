//! Contracts for `@Import` targets that are not configuration classes.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexSet;
use trellis_common::constants::{JDK_ANNOTATION_PREFIX, STEREOTYPE_PACKAGE};
use trellis_common::error::Result;
use trellis_core::metadata::ClassMetadata;
use trellis_core::registry::BeanDefinitionRegistry;

use crate::naming::BeanNameGenerator;

/// Predicate over class names; matching classes are never read.
#[derive(Clone)]
pub struct ExclusionFilter(Rc<dyn Fn(&str) -> bool>);

impl fmt::Debug for ExclusionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExclusionFilter").finish_non_exhaustive()
    }
}

impl Default for ExclusionFilter {
    fn default() -> Self {
        Self::default_filter()
    }
}

impl ExclusionFilter {
    /// Wraps a predicate.
    pub fn new(predicate: impl Fn(&str) -> bool + 'static) -> Self {
        Self(Rc::new(predicate))
    }

    /// Excludes platform annotation types and the built-in stereotypes.
    #[must_use]
    pub fn default_filter() -> Self {
        Self::new(|class_name| {
            class_name.starts_with(JDK_ANNOTATION_PREFIX)
                || class_name
                    .strip_prefix(STEREOTYPE_PACKAGE)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// Returns `true` if the class must not be read.
    #[must_use]
    pub fn matches(&self, class_name: &str) -> bool {
        (self.0)(class_name)
    }

    /// Combines two filters; a class excluded by either is excluded.
    #[must_use]
    pub fn or(&self, other: &Self) -> Self {
        let (left, right) = (Rc::clone(&self.0), Rc::clone(&other.0));
        Self(Rc::new(move |class_name| left(class_name) || right(class_name)))
    }
}

/// Computes further classes to import.
pub trait ImportSelector {
    /// Class names to import on behalf of the importing class.
    ///
    /// # Errors
    ///
    /// Any error aborts processing of the importing class.
    fn select_imports(&self, importing: &ClassMetadata) -> Result<Vec<String>>;

    /// Classes to exclude from this selector's imports, transitively.
    fn exclusion_filter(&self) -> Option<ExclusionFilter> {
        None
    }
}

/// An import selector that runs only after every configuration class of the
/// batch has been parsed.
pub trait DeferredImportSelector: ImportSelector {
    /// Name of the group this selector belongs to; `None` forms its own group.
    fn import_group(&self) -> Option<String> {
        None
    }

    /// Explicit priority, overriding an `@Order` on the selector class.
    fn order(&self) -> Option<i32> {
        None
    }
}

/// One import produced by a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    /// The class that declared the import.
    pub metadata: Arc<ClassMetadata>,
    /// The class to import.
    pub import_class_name: String,
}

/// Folds the imports of several deferred selectors into one list.
pub trait DeferredImportGroup {
    /// Feeds one selector registered for the group.
    ///
    /// # Errors
    ///
    /// Any error aborts the deferred pass.
    fn process(
        &mut self,
        metadata: &Arc<ClassMetadata>,
        selector: &dyn DeferredImportSelector,
    ) -> Result<()>;

    /// The final, ordered imports of the group.
    ///
    /// # Errors
    ///
    /// Any error aborts the deferred pass.
    fn select_imports(&mut self) -> Result<Vec<GroupEntry>>;
}

/// Collects every selector's imports, dropping repeated class names.
#[derive(Debug, Default)]
pub struct DefaultDeferredImportGroup {
    seen: IndexSet<String>,
    entries: Vec<GroupEntry>,
}

impl DefaultDeferredImportGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeferredImportGroup for DefaultDeferredImportGroup {
    fn process(
        &mut self,
        metadata: &Arc<ClassMetadata>,
        selector: &dyn DeferredImportSelector,
    ) -> Result<()> {
        for import_class_name in selector.select_imports(metadata)? {
            if self.seen.insert(import_class_name.clone()) {
                self.entries.push(GroupEntry {
                    metadata: Arc::clone(metadata),
                    import_class_name,
                });
            } else {
                tracing::trace!(class = %import_class_name, "duplicate deferred import dropped");
            }
        }
        Ok(())
    }

    fn select_imports(&mut self) -> Result<Vec<GroupEntry>> {
        Ok(std::mem::take(&mut self.entries))
    }
}

/// Emits bean definitions directly on behalf of an importing class.
pub trait ImportBeanDefinitionRegistrar {
    /// Registers definitions.
    ///
    /// # Errors
    ///
    /// Any error aborts bean-definition emission.
    fn register_bean_definitions(
        &self,
        importing: &ClassMetadata,
        registry: &mut dyn BeanDefinitionRegistry,
        name_generator: &dyn BeanNameGenerator,
    ) -> Result<()>;
}
