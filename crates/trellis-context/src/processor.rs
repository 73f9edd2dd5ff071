//! The fixed-point loop over parse, validate and emit.
//!
//! Emitting bean definitions can register new configuration candidates
//! (imported resources, registrars). The processor keeps parsing until a
//! round registers none.

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;
use trellis_common::config::TrellisConfig;
use trellis_common::error::Result;
use trellis_core::definition::BeanDefinitionHolder;
use trellis_event::startup::{ApplicationStartup, DefaultApplicationStartup};

use crate::bean_reader::ConfigurationClassBeanDefinitionReader;
use crate::context::ContainerContext;
use crate::graph::DependencyGraph;
use crate::naming::BeanNameGenerator;
use crate::parser::{ConfigurationClassParser, SharedConfigurationClass};
use crate::utils::{
    CONFIGURATION_CLASS_ATTRIBUTE, check_configuration_class_candidate, configuration_order,
};

/// Step recorded around each parse round.
pub const PARSE_STEP: &str = "trellis.context.config-classes.parse";

/// Summary of one resolved configuration class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationClassSummary {
    /// Class name.
    pub class_name: String,
    /// Bean name, once registered.
    pub bean_name: Option<String>,
    /// Classes that imported it, first importer first.
    pub imported_by: Vec<String>,
    /// Bean methods in registration order.
    pub bean_methods: Vec<String>,
    /// Bean methods skipped by their conditions.
    pub skipped_bean_methods: Vec<String>,
    /// `@ImportResource` locations.
    pub imported_resources: Vec<String>,
}

impl ConfigurationClassSummary {
    fn of(class: &SharedConfigurationClass) -> Self {
        let class = class.borrow();
        Self {
            class_name: class.name().to_string(),
            bean_name: class.bean_name().map(ToString::to_string),
            imported_by: class
                .imported_by()
                .iter()
                .map(|importer| importer.name.clone())
                .collect(),
            bean_methods: class
                .bean_methods()
                .iter()
                .map(|method| method.name().to_string())
                .collect(),
            skipped_bean_methods: class
                .skipped_bean_methods()
                .into_iter()
                .map(ToString::to_string)
                .collect(),
            imported_resources: class.imported_resources().keys().cloned().collect(),
        }
    }
}

/// Outcome of [`ConfigurationClassPostProcessor::process`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingReport {
    /// Configuration classes in resolution order.
    pub configuration_classes: Vec<ConfigurationClassSummary>,
    /// Definitions registered while processing, in registration order.
    pub registered: Vec<String>,
    /// Property sources added to the environment.
    pub property_sources: Vec<String>,
    /// Number of parse rounds.
    pub rounds: usize,
    #[serde(skip)]
    classes: Vec<SharedConfigurationClass>,
}

impl ProcessingReport {
    /// The resolved configuration classes themselves.
    #[must_use]
    pub fn classes(&self) -> &[SharedConfigurationClass] {
        &self.classes
    }

    /// The import graph of the resolved configuration classes.
    #[must_use]
    pub fn import_graph(&self) -> DependencyGraph {
        DependencyGraph::imports(&self.classes)
    }

    /// `(class, method)` pairs of bean methods skipped by conditions.
    #[must_use]
    pub fn skipped_bean_methods(&self) -> Vec<(String, String)> {
        self.configuration_classes
            .iter()
            .flat_map(|summary| {
                summary
                    .skipped_bean_methods
                    .iter()
                    .map(|method| (summary.class_name.clone(), method.clone()))
            })
            .collect()
    }
}

/// Drives configuration-class processing over a registry.
pub struct ConfigurationClassPostProcessor {
    context: ContainerContext,
    config: TrellisConfig,
    startup: Arc<dyn ApplicationStartup>,
    import_name_generator: Option<Rc<dyn BeanNameGenerator>>,
}

impl std::fmt::Debug for ConfigurationClassPostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationClassPostProcessor")
            .field("context", &self.context)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConfigurationClassPostProcessor {
    /// Creates a processor with a no-op startup recorder.
    #[must_use]
    pub fn new(context: ContainerContext, config: TrellisConfig) -> Self {
        Self {
            context,
            config,
            startup: Arc::new(DefaultApplicationStartup),
            import_name_generator: None,
        }
    }

    /// Records each parse round on the given startup.
    #[must_use]
    pub fn with_startup(mut self, startup: Arc<dyn ApplicationStartup>) -> Self {
        self.startup = startup;
        self
    }

    /// Names imported configuration classes and registrar output with a
    /// custom generator.
    #[must_use]
    pub fn with_import_name_generator(mut self, generator: Rc<dyn BeanNameGenerator>) -> Self {
        self.import_name_generator = Some(generator);
        self
    }

    /// Processes every configuration candidate in the registry.
    ///
    /// Definitions already marked as configuration classes are left alone,
    /// so running the processor twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns the first parse, validation or emission failure.
    pub fn process(&self) -> Result<ProcessingReport> {
        let registry = self.context.registry();
        let mut candidate_names = registry.borrow().bean_definition_names();
        let initial: HashSet<String> = candidate_names.iter().cloned().collect();

        let mut candidates = Vec::new();
        for name in &candidate_names {
            if let Some(holder) = self.candidate(name, &HashSet::new())? {
                candidates.push(holder);
            }
        }
        if candidates.is_empty() {
            tracing::debug!("no configuration candidates found");
            return Ok(ProcessingReport::default());
        }
        candidates
            .sort_by_key(|holder| configuration_order(&holder.definition).unwrap_or(i32::MAX));

        let mut parser =
            ConfigurationClassParser::with_config(self.context.clone(), self.config.clone());
        let mut reader = match &self.import_name_generator {
            Some(generator) => ConfigurationClassBeanDefinitionReader::with_import_name_generator(
                self.context.clone(),
                Rc::clone(generator),
            ),
            None => ConfigurationClassBeanDefinitionReader::new(self.context.clone()),
        };
        let mut already_parsed: Vec<SharedConfigurationClass> = Vec::new();
        let mut rounds = 0;

        while !candidates.is_empty() {
            rounds += 1;
            let mut step = self.startup.start(PARSE_STEP);
            tracing::debug!(
                round = rounds,
                candidates = candidates.len(),
                "parsing configuration candidates"
            );

            parser.parse(&candidates)?;
            parser.validate()?;

            let parsed_names: HashSet<String> = already_parsed
                .iter()
                .map(|class| class.borrow().name().to_string())
                .collect();
            let fresh: Vec<SharedConfigurationClass> = parser
                .configuration_classes()
                .into_iter()
                .filter(|class| !parsed_names.contains(class.borrow().name()))
                .collect();
            reader.load_bean_definitions(&fresh, &mut parser)?;
            step.tag("classCount", fresh.len().to_string());
            step.end();
            already_parsed.extend(fresh);

            candidates.clear();
            let names = registry.borrow().bean_definition_names();
            if names.len() > candidate_names.len() {
                let old: HashSet<String> = candidate_names.into_iter().collect();
                let parsed_classes: HashSet<String> = parser
                    .configuration_classes()
                    .iter()
                    .map(|class| class.borrow().name().to_string())
                    .collect();
                for name in names.iter().filter(|name| !old.contains(*name)) {
                    if let Some(holder) = self.candidate(name, &parsed_classes)? {
                        candidates.push(holder);
                    }
                }
                candidate_names = names;
            }
        }

        let classes = parser.configuration_classes();
        let registered = registry
            .borrow()
            .bean_definition_names()
            .into_iter()
            .filter(|name| !initial.contains(name))
            .collect();
        tracing::info!(classes = classes.len(), rounds, "configuration classes processed");
        Ok(ProcessingReport {
            configuration_classes: classes.iter().map(ConfigurationClassSummary::of).collect(),
            registered,
            property_sources: parser.property_source_names().to_vec(),
            rounds,
            classes,
        })
    }

    /// Marks a definition and returns it when it is a configuration
    /// candidate whose class has not been parsed yet.
    fn candidate(
        &self,
        name: &str,
        parsed_classes: &HashSet<String>,
    ) -> Result<Option<BeanDefinitionHolder>> {
        let mut registry = self.context.registry().borrow_mut();
        let definition = registry.get_bean_definition_mut(name)?;
        if definition.attribute(CONFIGURATION_CLASS_ATTRIBUTE).is_some() {
            tracing::debug!(bean = name, "definition already processed as a configuration class");
            return Ok(None);
        }
        if !check_configuration_class_candidate(definition, self.context.metadata_source())? {
            return Ok(None);
        }
        let class_name = definition
            .metadata
            .as_ref()
            .map(|metadata| metadata.name.clone())
            .or_else(|| definition.class_name.clone());
        if class_name.is_some_and(|class_name| parsed_classes.contains(&class_name)) {
            return Ok(None);
        }
        Ok(Some(BeanDefinitionHolder::new(name, definition.clone())))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use trellis_core::definition::BeanDefinition;
    use trellis_core::metadata::ClassMetadata;
    use trellis_core::registry::{BeanDefinitionRegistry, SimpleBeanDefinitionRegistry};
    use trellis_core::source::ClassIndex;
    use trellis_event::startup::BufferingApplicationStartup;

    use super::*;
    use crate::imports::ImportBeanDefinitionRegistrar;
    use crate::plugin::PluginRegistry;

    const SOURCES: &str = r#"
package com.a

class Service {}

@Configuration @Order(2) class Second { @Bean method second: Service }
@Configuration @Order(1) class First { @Bean method first: Service }

@Configuration @Import([com.a.LateRegistrar]) class Bootstrap {}
@Configuration class Late { @Bean method lateBean: Service }

class Plain {}
"#;

    struct LateRegistrar;

    impl ImportBeanDefinitionRegistrar for LateRegistrar {
        fn register_bean_definitions(
            &self,
            _: &ClassMetadata,
            registry: &mut dyn BeanDefinitionRegistry,
            _: &dyn BeanNameGenerator,
        ) -> Result<()> {
            registry.register_bean_definition("late", BeanDefinition::new("com.a.Late"))
        }
    }

    fn processor(
        roots: &[(&str, &str)],
    ) -> (Rc<RefCell<SimpleBeanDefinitionRegistry>>, ConfigurationClassPostProcessor) {
        let registry = SimpleBeanDefinitionRegistry::new().into_shared();
        for (name, class) in roots {
            registry
                .borrow_mut()
                .register_bean_definition(name, BeanDefinition::new(*class))
                .unwrap();
        }
        let index: ClassIndex =
            trellis_descriptor::index_from_sources([("a.tcd", SOURCES)]).unwrap();
        let mut plugins = PluginRegistry::with_defaults();
        plugins.register_registrar("com.a.LateRegistrar", |_| {
            Ok(Rc::new(LateRegistrar) as Rc<dyn ImportBeanDefinitionRegistrar>)
        });
        let context = ContainerContext::new(registry.clone(), Rc::new(index)).with_plugins(plugins);
        (registry, ConfigurationClassPostProcessor::new(context, TrellisConfig::default()))
    }

    #[test]
    fn candidates_are_processed_in_order() {
        let (registry, processor) = processor(&[("secondConfig", "com.a.Second"), ("firstConfig", "com.a.First")]);
        let report = processor.process().unwrap();
        let classes: Vec<&str> = report
            .configuration_classes
            .iter()
            .map(|class| class.class_name.as_str())
            .collect();
        assert_eq!(classes, vec!["com.a.First", "com.a.Second"]);
        assert_eq!(report.rounds, 1);
        assert!(registry.borrow().contains_bean_definition("first"));
        assert!(registry.borrow().contains_bean_definition("second"));
    }

    #[test]
    fn definitions_registered_while_emitting_are_parsed_in_a_new_round() {
        let startup = BufferingApplicationStartup::new(16);
        let (registry, processor) = processor(&[("bootstrap", "com.a.Bootstrap")]);
        let report = processor
            .with_startup(Arc::new(startup.clone()))
            .process()
            .unwrap();

        assert_eq!(report.rounds, 2);
        assert!(registry.borrow().contains_bean_definition("lateBean"));
        assert_eq!(report.registered, vec!["late", "lateBean"]);

        let steps = startup.steps();
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|step| step.name == PARSE_STEP));
        assert_eq!(steps[0].tags, vec![("classCount".to_string(), "1".to_string())]);
    }

    #[test]
    fn processed_definitions_are_not_processed_again() {
        let (_, processor) = processor(&[("firstConfig", "com.a.First")]);
        assert_eq!(processor.process().unwrap().configuration_classes.len(), 1);
        let again = processor.process().unwrap();
        assert!(again.configuration_classes.is_empty());
        assert_eq!(again.rounds, 0);
    }

    #[test]
    fn registries_without_candidates_produce_an_empty_report() {
        let (_, processor) = processor(&[("plain", "com.a.Plain")]);
        let report = processor.process().unwrap();
        assert!(report.configuration_classes.is_empty());
        assert!(report.registered.is_empty());
    }

    #[test]
    fn report_serializes_summaries() {
        let (_, processor) = processor(&[("firstConfig", "com.a.First")]);
        let report = processor.process().unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["configuration_classes"][0]["bean_methods"][0], "first");
        assert_eq!(report.import_graph().len(), 1);
    }
}
