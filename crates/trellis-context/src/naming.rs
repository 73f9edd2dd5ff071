//! Bean name generation.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use trellis_common::constants::{COMPONENT, GENERATED_BEAN_NAME_SEPARATOR};
use trellis_common::error::{Result, TrellisError};
use trellis_common::types::short_class_name;
use trellis_core::definition::BeanDefinition;
use trellis_core::metadata::MergedAnnotations;
use trellis_core::registry::BeanDefinitionRegistry;
use trellis_core::source::MetadataSource;

/// Chooses the name a definition is registered under.
pub trait BeanNameGenerator {
    /// Generates a name for the definition.
    ///
    /// # Errors
    ///
    /// Returns an error if no name can be derived.
    fn generate_bean_name(
        &self,
        definition: &BeanDefinition,
        registry: &dyn BeanDefinitionRegistry,
    ) -> Result<String>;
}

/// Lower-cases the first character unless the first two are both upper case.
#[must_use]
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    if chars.next().is_some_and(char::is_uppercase) && first.is_uppercase() {
        return name.to_string();
    }
    first.to_lowercase().chain(name.chars().skip(1)).collect()
}

/// Names components after their stereotype `value`, falling back to the
/// decapitalized short class name.
pub struct AnnotationBeanNameGenerator {
    source: Rc<dyn MetadataSource>,
    fully_qualified: bool,
    meta_annotation_types: RefCell<HashMap<String, HashSet<String>>>,
}

impl fmt::Debug for AnnotationBeanNameGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationBeanNameGenerator")
            .field("fully_qualified", &self.fully_qualified)
            .field("cached_types", &self.meta_annotation_types.borrow().len())
            .finish_non_exhaustive()
    }
}

impl AnnotationBeanNameGenerator {
    /// Creates a generator using short class names as the fallback.
    #[must_use]
    pub fn new(source: Rc<dyn MetadataSource>) -> Self {
        Self {
            source,
            fully_qualified: false,
            meta_annotation_types: RefCell::new(HashMap::new()),
        }
    }

    /// Creates a generator using fully-qualified class names as the fallback.
    #[must_use]
    pub fn fully_qualified(source: Rc<dyn MetadataSource>) -> Self {
        Self {
            fully_qualified: true,
            ..Self::new(source)
        }
    }

    fn is_stereotype(&self, annotation_type: &str) -> bool {
        if annotation_type == COMPONENT {
            return true;
        }
        if let Some(types) = self.meta_annotation_types.borrow().get(annotation_type) {
            return types.contains(COMPONENT);
        }
        let types: HashSet<String> = self
            .source
            .read(annotation_type)
            .map(|metadata| {
                MergedAnnotations::from_annotations(&metadata.annotations, self.source.as_ref())
                    .iter()
                    .map(|merged| merged.annotation.type_name.clone())
                    .collect()
            })
            .unwrap_or_default();
        let stereotype = types.contains(COMPONENT);
        let _ = self
            .meta_annotation_types
            .borrow_mut()
            .insert(annotation_type.to_string(), types);
        stereotype
    }

    fn name_from_annotation(&self, definition: &BeanDefinition) -> Result<Option<String>> {
        let Some(metadata) = &definition.metadata else {
            return Ok(None);
        };
        let mut bean_name: Option<String> = None;
        for annotation in &metadata.annotations {
            if !self.is_stereotype(&annotation.type_name) {
                continue;
            }
            let Some(value) = annotation
                .attributes
                .string("value")
                .filter(|value| !value.is_empty())
            else {
                continue;
            };
            match &bean_name {
                Some(existing) if existing != value => {
                    return Err(TrellisError::config(format!(
                        "stereotype annotations suggest inconsistent component names: '{existing}' versus '{value}'"
                    )));
                }
                _ => bean_name = Some(value.to_string()),
            }
        }
        Ok(bean_name)
    }

    fn default_name(&self, definition: &BeanDefinition) -> Result<String> {
        let class_name = definition.class_name.as_deref().ok_or_else(|| {
            TrellisError::config("no bean class name set on definition, cannot derive a bean name")
        })?;
        Ok(if self.fully_qualified {
            class_name.to_string()
        } else {
            decapitalize(&short_class_name(class_name))
        })
    }
}

impl BeanNameGenerator for AnnotationBeanNameGenerator {
    fn generate_bean_name(
        &self,
        definition: &BeanDefinition,
        _registry: &dyn BeanDefinitionRegistry,
    ) -> Result<String> {
        match self.name_from_annotation(definition)? {
            Some(name) => Ok(name),
            None => self.default_name(definition),
        }
    }
}

/// Names definitions after their class with a `#n` suffix unique in the registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBeanNameGenerator;

impl BeanNameGenerator for DefaultBeanNameGenerator {
    fn generate_bean_name(
        &self,
        definition: &BeanDefinition,
        registry: &dyn BeanDefinitionRegistry,
    ) -> Result<String> {
        let base = match (&definition.class_name, &definition.factory_bean_name) {
            (Some(class_name), _) => class_name.clone(),
            (None, Some(factory_bean)) => format!("{factory_bean}$created"),
            (None, None) => {
                return Err(TrellisError::config(
                    "unnamed bean definition specifies neither a class nor a factory bean",
                ));
            }
        };
        let mut counter = 0_usize;
        loop {
            let candidate = format!("{base}{GENERATED_BEAN_NAME_SEPARATOR}{counter}");
            if !registry.contains_bean_definition(&candidate) {
                return Ok(candidate);
            }
            counter += 1;
        }
    }
}
