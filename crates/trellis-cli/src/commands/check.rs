//! `trellis check`: parse and validate every `@Configuration` class found.

use std::fmt::Write as _;
use std::rc::Rc;

use clap::Args;
use serde::Serialize;
use trellis_context::utils::{check_configuration_class_candidate, is_full_configuration};
use trellis_context::{AnnotationConfigContainer, ConfigurationClassParser};
use trellis_core::definition::{BeanDefinition, BeanDefinitionHolder, DefinitionOrigin};
use trellis_core::source::{ClassIndex, MetadataSource};

use super::SourceArgs;
use crate::output;

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Descriptor inputs and container settings.
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    roots: Vec<String>,
    configuration_classes: usize,
    property_sources: Vec<String>,
}

/// Executes the `check` command.
///
/// # Errors
///
/// Returns the first parse failure, or every validation problem at once.
pub fn execute(args: &CheckArgs, json: bool) -> anyhow::Result<()> {
    let index = Rc::new(args.source.class_index()?);
    let config = args.source.trellis_config()?;
    let report = check(&index, config)?;

    let rendered = if json {
        output::to_json(&report)?
    } else {
        let mut out = String::new();
        for root in &report.roots {
            let _ = writeln!(out, "  ok {root}");
        }
        let _ = writeln!(
            out,
            "{} root(s), {} configuration class(es) resolved: OK",
            report.roots.len(),
            report.configuration_classes
        );
        out
    };
    output::emit(&rendered)
}

fn check(
    index: &Rc<ClassIndex>,
    config: trellis_common::config::TrellisConfig,
) -> anyhow::Result<CheckReport> {
    let container = AnnotationConfigContainer::builder(Rc::clone(index) as Rc<dyn MetadataSource>)
        .config(config.clone())
        .build();
    let source: &ClassIndex = index;

    let mut holders = Vec::new();
    for class_name in source.package_classes("")? {
        let metadata = source.read(&class_name)?;
        if metadata.is_interface()
            || metadata.is_annotation()
            || !is_full_configuration(&metadata, source)
        {
            continue;
        }
        let mut definition = BeanDefinition::from_metadata(metadata, DefinitionOrigin::Explicit);
        let _ = check_configuration_class_candidate(&mut definition, source)?;
        holders.push(BeanDefinitionHolder::new(class_name, definition));
    }
    tracing::debug!(count = holders.len(), "configuration classes to check");

    let mut parser = ConfigurationClassParser::with_config(container.context().clone(), config);
    parser.parse(&holders)?;
    parser.validate()?;

    Ok(CheckReport {
        roots: holders.into_iter().map(|holder| holder.name).collect(),
        configuration_classes: parser.configuration_classes().len(),
        property_sources: parser.property_source_names().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(source: &str) -> Rc<ClassIndex> {
        Rc::new(trellis_descriptor::index_from_sources([("app.tcd", source)]).unwrap())
    }

    #[test]
    fn valid_configuration_classes_pass() {
        let index = index(
            r"
package com.app

@Configuration @Import([com.app.Extra]) class AppConfig {
    @Bean method service: Service
}
class Extra {
    @Bean method repo: Repo
}
class Service {}
class Repo {}
",
        );
        let report = check(&index, trellis_common::config::TrellisConfig::default()).unwrap();
        assert_eq!(report.roots, vec!["com.app.AppConfig"]);
        assert_eq!(report.configuration_classes, 2);
    }

    #[test]
    fn final_configuration_classes_are_reported() {
        let index = index(
            r"
package com.app

@Configuration final class Sealed {
    @Bean method service: Service
}
class Service {}
",
        );
        assert!(check(&index, trellis_common::config::TrellisConfig::default()).is_err());
    }
}
