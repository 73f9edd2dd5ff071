//! `@Conditional` evaluation.

use std::fmt;

use trellis_common::constants::{CONDITIONAL, PROFILE};
use trellis_common::error::Result;
use trellis_core::environment::Profiles;
use trellis_core::metadata::{AnnotatedElement, MergedAnnotations};
use trellis_core::order::{resolve_order, sort_by_order};

use crate::context::ContainerContext;
use crate::utils::is_configuration_candidate;

/// When a condition is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigurationPhase {
    /// While deciding whether a configuration class is parsed at all.
    ParseConfiguration,
    /// While deciding whether an individual bean is registered.
    RegisterBean,
}

impl fmt::Display for ConfigurationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseConfiguration => write!(f, "PARSE_CONFIGURATION"),
            Self::RegisterBean => write!(f, "REGISTER_BEAN"),
        }
    }
}

/// A predicate deciding whether an annotated element is registered.
///
/// Implementations must not have side effects: the evaluator may instantiate
/// and consult a condition any number of times.
pub trait Condition {
    /// Returns `true` if the element should be kept.
    ///
    /// # Errors
    ///
    /// Any error aborts the whole parse.
    fn matches(&self, context: &ContainerContext, element: &dyn AnnotatedElement) -> Result<bool>;

    /// The only phase this condition applies to; `None` applies to both.
    fn required_phase(&self) -> Option<ConfigurationPhase> {
        None
    }

    /// Explicit priority, overriding an `@Order` on the condition class.
    fn order(&self) -> Option<i32> {
        None
    }
}

/// Evaluates the conditions named by `@Conditional` declarations.
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    context: ContainerContext,
}

impl ConditionEvaluator {
    /// Creates an evaluator over the given collaborators.
    #[must_use]
    pub const fn new(context: ContainerContext) -> Self {
        Self { context }
    }

    /// The collaborators handed to conditions.
    #[must_use]
    pub const fn context(&self) -> &ContainerContext {
        &self.context
    }

    /// Decides whether an element is skipped.
    ///
    /// Elements without a (possibly meta-present) `@Conditional` are never
    /// skipped and no condition is instantiated for them. Without a phase,
    /// configuration candidates are evaluated in the parse phase and
    /// everything else in the register phase.
    ///
    /// # Errors
    ///
    /// Returns an error if a condition cannot be instantiated or fails.
    pub fn should_skip(
        &self,
        element: &dyn AnnotatedElement,
        phase: Option<ConfigurationPhase>,
    ) -> Result<bool> {
        let source = self.context.metadata_source();
        let merged = MergedAnnotations::from_element(element, source);
        if !merged.is_present(CONDITIONAL) {
            return Ok(false);
        }

        let Some(phase) = phase else {
            let inferred = match element.as_class() {
                Some(class) if is_configuration_candidate(class, source) => {
                    ConfigurationPhase::ParseConfiguration
                }
                _ => ConfigurationPhase::RegisterBean,
            };
            return self.should_skip(element, Some(inferred));
        };

        let mut conditions = Vec::new();
        for attributes in merged.all_attributes(CONDITIONAL) {
            for class_name in attributes.class_names("value") {
                let condition = self.context.plugins().condition(&class_name, &self.context)?;
                let declared = source.read(&class_name).ok();
                let order = resolve_order(condition.order(), declared.as_deref());
                conditions.push((order, class_name, condition));
            }
        }
        sort_by_order(&mut conditions, |(order, _, _)| *order);

        for (_, class_name, condition) in &conditions {
            let applies = condition.required_phase().is_none_or(|required| required == phase);
            if applies && !condition.matches(&self.context, element)? {
                tracing::debug!(
                    element = %element.describe(),
                    condition = %class_name,
                    %phase,
                    "condition did not match"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Matches when any `@Profile` declaration accepts the active profiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileCondition;

impl Condition for ProfileCondition {
    fn matches(&self, context: &ContainerContext, element: &dyn AnnotatedElement) -> Result<bool> {
        let merged = MergedAnnotations::from_element(element, context.metadata_source());
        let declarations = merged.all_attributes(PROFILE);
        if declarations.is_empty() {
            return Ok(true);
        }
        for attributes in declarations {
            let profiles = Profiles::parse(&attributes.strings("value"))?;
            if context.environment().accepts_profiles(&profiles) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use trellis_core::environment::StandardEnvironment;
    use trellis_core::registry::SimpleBeanDefinitionRegistry;
    use trellis_core::source::MetadataSource;

    use super::*;
    use crate::plugin::PluginRegistry;

    const SOURCES: &str = r#"
package com.a

@Configuration
@Conditional([com.a.Never])
class NeverConfig {}

@Component
@Conditional([com.a.ParseOnly])
class ParseOnlyComponent {}

@Configuration
@Profile("dev")
class DevConfig {}

@Configuration
@Profile(["!dev", "qa"])
class NotDevConfig {}

@Configuration
@Conditional([com.a.Second, com.a.First])
class Ordered {}

class Plain {
    @Bean @Conditional([com.a.Never]) method skipped
}

@Order(1)
class First {}
"#;

    struct Fixed {
        result: bool,
        phase: Option<ConfigurationPhase>,
        order: Option<i32>,
        calls: Rc<Cell<usize>>,
        log: Rc<std::cell::RefCell<Vec<&'static str>>>,
        name: &'static str,
    }

    impl Condition for Fixed {
        fn matches(&self, _: &ContainerContext, _: &dyn AnnotatedElement) -> Result<bool> {
            self.calls.set(self.calls.get() + 1);
            self.log.borrow_mut().push(self.name);
            Ok(self.result)
        }

        fn required_phase(&self) -> Option<ConfigurationPhase> {
            self.phase
        }

        fn order(&self) -> Option<i32> {
            self.order
        }
    }

    struct Harness {
        evaluator: ConditionEvaluator,
        source: Rc<dyn MetadataSource>,
        calls: Rc<Cell<usize>>,
        log: Rc<std::cell::RefCell<Vec<&'static str>>>,
    }

    fn harness(profiles: &[&str]) -> Harness {
        let source: Rc<dyn MetadataSource> =
            Rc::new(trellis_descriptor::index_from_sources([("c.tcd", SOURCES)]).unwrap());
        let calls = Rc::new(Cell::new(0));
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut plugins = PluginRegistry::with_defaults();
        let specs: [(&'static str, bool, Option<ConfigurationPhase>, Option<i32>); 4] = [
            ("com.a.Never", false, None, None),
            ("com.a.ParseOnly", false, Some(ConfigurationPhase::ParseConfiguration), None),
            ("com.a.First", true, None, None),
            ("com.a.Second", false, None, Some(5)),
        ];
        for (name, result, phase, order) in specs {
            let calls = Rc::clone(&calls);
            let log = Rc::clone(&log);
            plugins.register_condition(name, move |_| {
                Ok(Rc::new(Fixed {
                    result,
                    phase,
                    order,
                    calls: Rc::clone(&calls),
                    log: Rc::clone(&log),
                    name,
                }) as Rc<dyn Condition>)
            });
        }
        let environment = StandardEnvironment::new();
        environment.set_active_profiles(profiles.iter().map(ToString::to_string).collect());
        let context = ContainerContext::new(
            SimpleBeanDefinitionRegistry::new().into_shared(),
            Rc::clone(&source),
        )
        .with_environment(Rc::new(environment))
        .with_plugins(plugins);
        Harness {
            evaluator: ConditionEvaluator::new(context),
            source,
            calls,
            log,
        }
    }

    #[test]
    fn unconditional_elements_never_instantiate_conditions() {
        let h = harness(&[]);
        let plain = h.source.read("com.a.Plain").unwrap();
        assert!(!h.evaluator.should_skip(plain.as_ref(), None).unwrap());
        assert_eq!(h.calls.get(), 0);
    }

    #[test]
    fn failing_condition_skips() {
        let h = harness(&[]);
        let never = h.source.read("com.a.NeverConfig").unwrap();
        assert!(h.evaluator.should_skip(never.as_ref(), None).unwrap());
        let method = &h.source.read("com.a.Plain").unwrap().methods[0];
        assert!(h
            .evaluator
            .should_skip(method, Some(ConfigurationPhase::RegisterBean))
            .unwrap());
    }

    #[test]
    fn phase_specific_conditions_only_apply_in_their_phase() {
        let h = harness(&[]);
        let component = h.source.read("com.a.ParseOnlyComponent").unwrap();
        assert!(h
            .evaluator
            .should_skip(component.as_ref(), Some(ConfigurationPhase::ParseConfiguration))
            .unwrap());
        assert!(!h
            .evaluator
            .should_skip(component.as_ref(), Some(ConfigurationPhase::RegisterBean))
            .unwrap());
        // a component is a configuration candidate, so the parse phase is inferred
        assert!(h.evaluator.should_skip(component.as_ref(), None).unwrap());
    }

    #[test]
    fn conditions_run_in_priority_order_and_short_circuit() {
        let h = harness(&[]);
        let ordered = h.source.read("com.a.Ordered").unwrap();
        assert!(h.evaluator.should_skip(ordered.as_ref(), None).unwrap());
        // First carries @Order(1), Second reports 5: First runs, then Second fails
        assert_eq!(*h.log.borrow(), vec!["com.a.First", "com.a.Second"]);
    }

    #[test]
    fn profile_condition_follows_active_profiles() {
        let dev = harness(&["dev"]);
        let dev_config = dev.source.read("com.a.DevConfig").unwrap();
        let not_dev = dev.source.read("com.a.NotDevConfig").unwrap();
        assert!(!dev.evaluator.should_skip(dev_config.as_ref(), None).unwrap());
        assert!(dev.evaluator.should_skip(not_dev.as_ref(), None).unwrap());

        let qa = harness(&["qa"]);
        let dev_config = qa.source.read("com.a.DevConfig").unwrap();
        let not_dev = qa.source.read("com.a.NotDevConfig").unwrap();
        assert!(qa.evaluator.should_skip(dev_config.as_ref(), None).unwrap());
        assert!(!qa.evaluator.should_skip(not_dev.as_ref(), None).unwrap());
    }
}
