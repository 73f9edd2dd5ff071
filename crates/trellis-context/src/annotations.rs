//! Common definition annotations: `@Lazy`, `@Primary`, `@DependsOn`, `@Role`
//! and `@Description`.

use trellis_common::constants::{DEPENDS_ON, DESCRIPTION, LAZY, PRIMARY, ROLE};
use trellis_common::types::Role;
use trellis_core::definition::BeanDefinition;
use trellis_core::metadata::{AnnotatedElement, MergedAnnotations};
use trellis_core::source::MetadataSource;

/// Copies the common annotations of an element onto its definition.
///
/// For bean methods the element is the method; a `@Lazy` missing there is
/// looked up on the definition's own class metadata instead.
pub fn process_common_definition_annotations(
    definition: &mut BeanDefinition,
    element: &dyn AnnotatedElement,
    source: &dyn MetadataSource,
) {
    let merged = MergedAnnotations::from_element(element, source);

    if let Some(lazy) = merged.get(LAZY) {
        definition.lazy_init = Some(lazy.boolean("value").unwrap_or(true));
    } else if let Some(class) = definition
        .metadata
        .clone()
        .filter(|class| element.as_class().is_none_or(|own| own.name != class.name))
    {
        let class_merged = MergedAnnotations::from_element(class.as_ref(), source);
        if let Some(lazy) = class_merged.get(LAZY) {
            definition.lazy_init = Some(lazy.boolean("value").unwrap_or(true));
        }
    }

    if merged.is_present(PRIMARY) {
        definition.primary = true;
    }
    if let Some(depends_on) = merged.get(DEPENDS_ON) {
        definition.depends_on = depends_on.strings("value");
    }
    if let Some(role) = merged.get(ROLE).and_then(|role| role.int("value")) {
        definition.role = Role::from_int(role);
    }
    if let Some(description) = merged
        .get(DESCRIPTION)
        .and_then(|description| description.string("value"))
    {
        definition.description = Some(description.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use trellis_core::definition::DefinitionOrigin;
    use trellis_core::source::ClassIndex;

    use super::*;

    const SOURCES: &str = r#"
package com.a

@Lazy @Primary @DependsOn(["db", "cache"]) @Role(2) @Description("the service")
class Service {}

@Lazy(false) class Eager {}

@Primary annotation Preferred {}
@Preferred class Meta {}

@Lazy class LazyFactoryProduct {}

@Configuration class Config {
    @Bean @Primary method plain: com.a.LazyFactoryProduct
    @Bean @Lazy(false) method eager: com.a.LazyFactoryProduct
}
"#;

    fn index() -> ClassIndex {
        trellis_descriptor::index_from_sources([("a.tcd", SOURCES)]).unwrap()
    }

    fn definition_for(index: &ClassIndex, class: &str) -> BeanDefinition {
        let metadata = index.read(class).unwrap();
        let mut definition = BeanDefinition::from_metadata(Arc::clone(&metadata), DefinitionOrigin::Scanned);
        process_common_definition_annotations(&mut definition, metadata.as_ref(), index);
        definition
    }

    #[test]
    fn class_annotations_are_applied() {
        let index = index();
        let service = definition_for(&index, "com.a.Service");
        assert_eq!(service.lazy_init, Some(true));
        assert!(service.primary);
        assert_eq!(service.depends_on, vec!["db", "cache"]);
        assert_eq!(service.role, Role::from_int(2));
        assert_eq!(service.description.as_deref(), Some("the service"));

        assert_eq!(definition_for(&index, "com.a.Eager").lazy_init, Some(false));
        assert!(definition_for(&index, "com.a.Meta").primary);
        assert_eq!(definition_for(&index, "com.a.Meta").lazy_init, None);
    }

    #[test]
    fn bean_methods_fall_back_to_class_lazy() {
        let index = index();
        let config = index.read("com.a.Config").unwrap();
        let product = index.read("com.a.LazyFactoryProduct").unwrap();

        let mut plain = BeanDefinition::from_metadata(Arc::clone(&product), DefinitionOrigin::Explicit);
        process_common_definition_annotations(&mut plain, &config.methods[0], &index);
        assert!(plain.primary);
        assert_eq!(plain.lazy_init, Some(true));

        let mut eager = BeanDefinition::from_metadata(product, DefinitionOrigin::Explicit);
        process_common_definition_annotations(&mut eager, &config.methods[1], &index);
        assert_eq!(eager.lazy_init, Some(false));
    }
}
