//! Configuration-candidate detection.

use trellis_common::constants::{
    BEAN, COMPONENT, COMPONENT_SCAN, CONFIGURATION, IMPORT, IMPORT_RESOURCE,
};
use trellis_common::error::Result;
use trellis_core::definition::{BeanDefinition, BeanDefinitionHolder};
use trellis_core::metadata::{ClassMetadata, MergedAnnotations};
use trellis_core::order::annotated_order;
use trellis_core::registry::BeanDefinitionRegistry;
use trellis_core::source::MetadataSource;

/// Definition attribute recording whether a class is a full or lite configuration class.
pub const CONFIGURATION_CLASS_ATTRIBUTE: &str = "trellis.configurationClass";

/// Attribute value for `@Configuration` classes that proxy their bean methods.
pub const CONFIGURATION_CLASS_FULL: &str = "full";

/// Attribute value for any other configuration candidate.
pub const CONFIGURATION_CLASS_LITE: &str = "lite";

/// Definition attribute holding the `@Order` value of a configuration class.
pub const ORDER_ATTRIBUTE: &str = "trellis.order";

const CANDIDATE_INDICATORS: [&str; 4] = [COMPONENT, COMPONENT_SCAN, IMPORT, IMPORT_RESOURCE];

/// Returns `true` if the class should be processed as a configuration class.
///
/// Interfaces and annotation types never are. Any class carrying a
/// configuration indicator (possibly as a meta-annotation) or declaring a
/// `@Bean` method is.
#[must_use]
pub fn is_configuration_candidate(metadata: &ClassMetadata, source: &dyn MetadataSource) -> bool {
    if metadata.is_interface() {
        return false;
    }
    let merged = MergedAnnotations::from_element(metadata, source);
    if CANDIDATE_INDICATORS.iter().any(|indicator| merged.is_present(indicator)) {
        return true;
    }
    has_bean_methods(metadata, source)
}

/// Returns `true` if any method of the class is annotated with `@Bean`.
#[must_use]
pub fn has_bean_methods(metadata: &ClassMetadata, source: &dyn MetadataSource) -> bool {
    metadata
        .methods
        .iter()
        .any(|method| MergedAnnotations::from_element(method, source).is_present(BEAN))
}

/// Returns `true` for `@Configuration` classes whose bean methods are proxied.
#[must_use]
pub fn is_full_configuration(metadata: &ClassMetadata, source: &dyn MetadataSource) -> bool {
    MergedAnnotations::from_element(metadata, source)
        .get(CONFIGURATION)
        .is_some_and(|attributes| attributes.boolean("proxyBeanMethods") != Some(false))
}

/// Marks a definition as a full or lite configuration class.
///
/// Definitions without a class and factory-method definitions are never
/// candidates. On success the configuration-class attribute is set, along
/// with the order attribute when the class carries `@Order`.
///
/// # Errors
///
/// Returns an error if the class metadata cannot be read.
pub fn check_configuration_class_candidate(
    definition: &mut BeanDefinition,
    source: &dyn MetadataSource,
) -> Result<bool> {
    if definition.factory_method_name.is_some() {
        return Ok(false);
    }
    let metadata = match (&definition.metadata, &definition.class_name) {
        (Some(metadata), _) => std::sync::Arc::clone(metadata),
        (None, Some(class_name)) => source.read(class_name)?,
        (None, None) => return Ok(false),
    };

    let kind = if is_full_configuration(&metadata, source) {
        CONFIGURATION_CLASS_FULL
    } else if is_configuration_candidate(&metadata, source) {
        CONFIGURATION_CLASS_LITE
    } else {
        return Ok(false);
    };
    tracing::trace!(class = %metadata.name, kind, "configuration candidate");
    definition.set_attribute(CONFIGURATION_CLASS_ATTRIBUTE, kind);
    if let Some(order) = annotated_order(&metadata) {
        definition.set_attribute(ORDER_ATTRIBUTE, order.to_string());
    }
    Ok(true)
}

/// Reads the order attribute recorded by [`check_configuration_class_candidate`].
#[must_use]
pub fn configuration_order(definition: &BeanDefinition) -> Option<i32> {
    definition
        .attribute(ORDER_ATTRIBUTE)
        .and_then(|value| value.parse().ok())
}

/// Registers a holder's definition under its name, then its aliases.
///
/// # Errors
///
/// Returns an error if the registry refuses the definition or an alias.
pub fn register_holder(
    holder: BeanDefinitionHolder,
    registry: &mut dyn BeanDefinitionRegistry,
) -> Result<()> {
    let BeanDefinitionHolder {
        name,
        definition,
        aliases,
    } = holder;
    registry.register_bean_definition(&name, definition)?;
    for alias in &aliases {
        registry.register_alias(&name, alias)?;
    }
    Ok(())
}
