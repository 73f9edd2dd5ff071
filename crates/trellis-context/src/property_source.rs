//! `@PropertySource` processing.
//!
//! Sources declared under the same name are merged: the first one keeps its
//! position in the environment, later ones are folded into a composite in
//! front of it. Distinct names are each inserted just before the previously
//! added one, so the last declared source has the highest precedence.

use std::collections::HashMap;

use trellis_common::constants::DEFAULT_PROPERTY_SOURCE_FACTORY;
use trellis_common::error::{Result, TrellisError};
use trellis_core::environment::loader::{parse_json, parse_properties, parse_yaml};
use trellis_core::environment::{Environment, PropertySource};
use trellis_core::metadata::AnnotationAttributes;
use trellis_core::resource::Resource;

use crate::context::ContainerContext;

/// Turns a resource into a property source.
pub trait PropertySourceFactory {
    /// Reads the resource. Without a name, the resource description is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be read or parsed.
    fn create_property_source(
        &self,
        name: Option<&str>,
        resource: &dyn Resource,
    ) -> Result<PropertySource>;
}

fn source_name(name: Option<&str>, resource: &dyn Resource) -> String {
    name.map_or_else(|| resource.description(), ToString::to_string)
}

/// Reads `.properties` text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPropertySourceFactory;

impl PropertySourceFactory for DefaultPropertySourceFactory {
    fn create_property_source(
        &self,
        name: Option<&str>,
        resource: &dyn Resource,
    ) -> Result<PropertySource> {
        let text = resource.read_to_string()?;
        Ok(PropertySource::map(
            source_name(name, resource),
            parse_properties(&text),
        ))
    }
}

/// Reads a JSON document, flattened to dotted keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPropertySourceFactory;

impl PropertySourceFactory for JsonPropertySourceFactory {
    fn create_property_source(
        &self,
        name: Option<&str>,
        resource: &dyn Resource,
    ) -> Result<PropertySource> {
        let text = resource.read_to_string()?;
        Ok(PropertySource::map(source_name(name, resource), parse_json(&text)?))
    }
}

/// Reads a YAML document, flattened to dotted keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlPropertySourceFactory;

impl PropertySourceFactory for YamlPropertySourceFactory {
    fn create_property_source(
        &self,
        name: Option<&str>,
        resource: &dyn Resource,
    ) -> Result<PropertySource> {
        let text = resource.read_to_string()?;
        Ok(PropertySource::map(source_name(name, resource), parse_yaml(&text)?))
    }
}

/// One `@PropertySource` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySourceDescriptor {
    /// Explicit source name.
    pub name: Option<String>,
    /// Resource locations, possibly with placeholders.
    pub locations: Vec<String>,
    /// Whether missing resources are skipped.
    pub ignore_resource_not_found: bool,
    /// Factory class name.
    pub factory: Option<String>,
}

impl PropertySourceDescriptor {
    /// Reads the declaration's attributes.
    #[must_use]
    pub fn from_attributes(attributes: &AnnotationAttributes) -> Self {
        Self {
            name: attributes
                .string("name")
                .filter(|name| !name.is_empty())
                .map(ToString::to_string),
            locations: attributes.strings("value"),
            ignore_resource_not_found: attributes
                .boolean("ignoreResourceNotFound")
                .unwrap_or(false),
            factory: attributes.class_names("factory").into_iter().next(),
        }
    }
}

/// Adds declared property sources to the environment.
#[derive(Debug, Default)]
pub struct PropertySourceProcessor {
    names: Vec<String>,
    descriptions: HashMap<String, String>,
}

impl PropertySourceProcessor {
    /// Creates a processor that has added nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the sources added so far, in order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Loads every location of a declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if the declaration has no location, the factory is
    /// unknown, or a location fails to load. Missing resources and
    /// unresolvable placeholders are skipped when the declaration ignores
    /// missing resources.
    pub fn process(
        &mut self,
        descriptor: &PropertySourceDescriptor,
        context: &ContainerContext,
    ) -> Result<()> {
        if descriptor.locations.is_empty() {
            return Err(TrellisError::config(
                "at least one @PropertySource(value) location is required",
            ));
        }
        let factory_name = descriptor
            .factory
            .as_deref()
            .unwrap_or(DEFAULT_PROPERTY_SOURCE_FACTORY);
        let factory = context
            .plugins()
            .property_source_factory(factory_name, context)?;

        for location in &descriptor.locations {
            match self.load_location(location, descriptor, factory.as_ref(), context) {
                Ok(()) => {}
                Err(err) if descriptor.ignore_resource_not_found && err.is_missing_resource() => {
                    tracing::warn!(location = %location, error = %err, "properties location not resolvable, skipped");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn load_location(
        &mut self,
        location: &str,
        descriptor: &PropertySourceDescriptor,
        factory: &dyn PropertySourceFactory,
        context: &ContainerContext,
    ) -> Result<()> {
        let environment = context.environment();
        let resolved = environment.resolve_required_placeholders(location)?;
        for resource in context.resource_loader().get_resources(&resolved)? {
            let source =
                factory.create_property_source(descriptor.name.as_deref(), resource.as_ref())?;
            self.add_property_source(source, resource.description(), environment)?;
        }
        Ok(())
    }

    fn add_property_source(
        &mut self,
        source: PropertySource,
        description: String,
        environment: &dyn Environment,
    ) -> Result<()> {
        let name = source.name().to_string();
        let mut sources = environment.property_sources().borrow_mut();

        if self.names.contains(&name) {
            if let Some(existing) = sources.get(&name).cloned() {
                let extension = source.renamed(description);
                if existing.is_composite() {
                    let mut composite = existing;
                    composite.add_first_source(extension);
                    sources.replace(&name, composite)?;
                } else {
                    let existing_description = self
                        .descriptions
                        .get(&name)
                        .cloned()
                        .unwrap_or_else(|| name.clone());
                    let mut composite = PropertySource::composite(name.clone());
                    composite.add_source(extension);
                    composite.add_source(existing.renamed(existing_description));
                    sources.replace(&name, composite)?;
                }
                tracing::debug!(source = %name, "extended property source");
                return Ok(());
            }
        }

        match self.names.last() {
            None => sources.add_last(source),
            Some(last_added) => sources.add_before(last_added, source)?,
        }
        tracing::debug!(source = %name, "added property source");
        let _ = self.descriptions.insert(name.clone(), description);
        self.names.push(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use trellis_core::environment::StandardEnvironment;
    use trellis_core::registry::SimpleBeanDefinitionRegistry;
    use trellis_core::resource::InMemoryResourceLoader;
    use trellis_core::source::ClassIndex;

    use super::*;

    fn context(environment: Rc<StandardEnvironment>) -> ContainerContext {
        let loader = InMemoryResourceLoader::new()
            .with("a.properties", "key=a\nonly.a=1")
            .with("b.properties", "key=b\nonly.b=2")
            .with("c.properties", "key=c")
            .with("app.json", r#"{"server": {"port": 8080}}"#);
        ContainerContext::new(
            SimpleBeanDefinitionRegistry::new().into_shared(),
            Rc::new(ClassIndex::new()),
        )
        .with_environment(environment)
        .with_resource_loader(Rc::new(loader))
    }

    fn descriptor(name: Option<&str>, locations: &[&str]) -> PropertySourceDescriptor {
        PropertySourceDescriptor {
            name: name.map(ToString::to_string),
            locations: locations.iter().map(ToString::to_string).collect(),
            ignore_resource_not_found: false,
            factory: None,
        }
    }

    #[test]
    fn later_names_take_precedence_over_earlier_ones() {
        let environment = Rc::new(StandardEnvironment::new());
        let ctx = context(Rc::clone(&environment));
        let mut processor = PropertySourceProcessor::new();
        processor.process(&descriptor(Some("first"), &["a.properties"]), &ctx).unwrap();
        processor.process(&descriptor(Some("second"), &["b.properties"]), &ctx).unwrap();

        assert_eq!(environment.property_sources().borrow().names(), vec!["second", "first"]);
        assert_eq!(environment.property("key").as_deref(), Some("b"));
        assert_eq!(environment.property("only.a").as_deref(), Some("1"));
    }

    #[test]
    fn repeated_name_keeps_position_and_prepends_into_composite() {
        let environment = Rc::new(StandardEnvironment::new());
        let ctx = context(Rc::clone(&environment));
        let mut processor = PropertySourceProcessor::new();
        processor.process(&descriptor(Some("shared"), &["a.properties"]), &ctx).unwrap();
        processor.process(&descriptor(Some("other"), &["c.properties"]), &ctx).unwrap();
        processor.process(&descriptor(Some("shared"), &["b.properties"]), &ctx).unwrap();

        let sources = environment.property_sources().borrow();
        assert_eq!(sources.names(), vec!["other", "shared"]);
        let shared = sources.get("shared").unwrap();
        assert!(shared.is_composite());
        assert_eq!(shared.property("key"), Some("b"));
        assert_eq!(shared.property("only.a"), Some("1"));
        assert_eq!(sources.property("key"), Some("c"));
    }

    #[test]
    fn unnamed_sources_are_named_after_their_resource() {
        let environment = Rc::new(StandardEnvironment::new());
        let ctx = context(Rc::clone(&environment));
        let mut processor = PropertySourceProcessor::new();
        let mut json = descriptor(None, &["${format:app}.json"]);
        json.factory = Some(trellis_common::constants::JSON_PROPERTY_SOURCE_FACTORY.into());
        processor.process(&json, &ctx).unwrap();
        assert_eq!(processor.names(), &["resource [app.json]".to_string()]);
        assert_eq!(environment.property("server.port").as_deref(), Some("8080"));
    }

    #[test]
    fn missing_resources_fail_unless_ignored() {
        let environment = Rc::new(StandardEnvironment::new());
        let ctx = context(Rc::clone(&environment));
        let mut processor = PropertySourceProcessor::new();

        let missing = descriptor(None, &["missing.properties"]);
        let err = processor.process(&missing, &ctx).unwrap_err();
        assert!(err.is_missing_resource());

        let mut ignored = descriptor(None, &["missing.properties", "${undefined.dir}/x", "a.properties"]);
        ignored.ignore_resource_not_found = true;
        processor.process(&ignored, &ctx).unwrap();
        assert_eq!(environment.property("only.a").as_deref(), Some("1"));
    }

    #[test]
    fn declaration_without_locations_is_rejected() {
        let environment = Rc::new(StandardEnvironment::new());
        let ctx = context(environment);
        let err = PropertySourceProcessor::new()
            .process(&descriptor(Some("x"), &[]), &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("location is required"));
    }
}
