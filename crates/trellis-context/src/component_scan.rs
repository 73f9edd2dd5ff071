//! Runs the scan described by one `@ComponentScan` declaration.

use std::rc::Rc;

use trellis_common::config::TrellisConfig;
use trellis_common::error::{Result, TrellisError};
use trellis_common::types::{ScopedProxyMode, package_name};
use trellis_core::definition::BeanDefinitionHolder;
use trellis_core::metadata::{AnnotationAttributes, AnnotationInstance};

use crate::context::ContainerContext;
use crate::filter::{
    AnnotationTypeFilter, AssignableTypeFilter, ClassNameFilter, RegexPatternTypeFilter,
    TypeFilter,
};
use crate::scanner::ClassPathBeanDefinitionScanner;
use crate::scope::AnnotationScopeMetadataResolver;

const PACKAGE_DELIMITERS: &[char] = &[',', ';', ' ', '\t', '\n'];

/// How a `@Filter` declaration matches classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// By annotation, meta-annotations included.
    Annotation,
    /// By supertype.
    AssignableType,
    /// By `AspectJ` type pattern; not supported.
    AspectJ,
    /// By regular expression over the class name.
    Regex,
    /// By a plugin type filter.
    Custom,
}

impl FilterType {
    /// Parses the enum constant used in `@Filter(type = ...)`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown constant.
    pub fn from_constant(value: &str) -> Result<Self> {
        match value {
            "ANNOTATION" => Ok(Self::Annotation),
            "ASSIGNABLE_TYPE" => Ok(Self::AssignableType),
            "ASPECTJ" => Ok(Self::AspectJ),
            "REGEX" => Ok(Self::Regex),
            "CUSTOM" => Ok(Self::Custom),
            other => Err(TrellisError::config(format!("unknown filter type {other}"))),
        }
    }
}

/// Builds the type filters of one `@Filter` declaration.
///
/// # Errors
///
/// Returns a configuration error for unsupported type and value
/// combinations, an invalid pattern, or a custom filter without a factory.
pub fn create_type_filters(
    filter: &AnnotationInstance,
    context: &ContainerContext,
) -> Result<Vec<Rc<dyn TypeFilter>>> {
    let attributes = &filter.attributes;
    let filter_type = attributes
        .string("type")
        .map_or(Ok(FilterType::Annotation), FilterType::from_constant)?;

    let mut filters: Vec<Rc<dyn TypeFilter>> = Vec::new();
    let mut classes = attributes.class_names("classes");
    classes.extend(attributes.class_names("value"));
    for class_name in classes {
        let filter: Rc<dyn TypeFilter> = match filter_type {
            FilterType::Annotation => {
                let is_annotation = context
                    .metadata_source()
                    .read(&class_name)
                    .is_ok_and(|metadata| metadata.is_annotation());
                if !is_annotation {
                    return Err(TrellisError::config(format!(
                        "@ComponentScan ANNOTATION type filter requires an annotation type: {class_name}"
                    )));
                }
                Rc::new(AnnotationTypeFilter::new(class_name))
            }
            FilterType::AssignableType => Rc::new(AssignableTypeFilter::new(class_name)),
            FilterType::Custom => context.plugins().type_filter(&class_name, context)?,
            FilterType::AspectJ | FilterType::Regex => {
                return Err(TrellisError::config(format!(
                    "filter type not supported with class value: {filter_type:?}"
                )));
            }
        };
        filters.push(filter);
    }

    for pattern in attributes.strings("pattern") {
        match filter_type {
            FilterType::Regex => filters.push(Rc::new(RegexPatternTypeFilter::new(&pattern)?)),
            FilterType::AspectJ => {
                return Err(TrellisError::config(format!(
                    "AspectJ type patterns are not supported: {pattern}"
                )));
            }
            _ => {
                return Err(TrellisError::config(format!(
                    "filter type not supported with string pattern: {filter_type:?}"
                )));
            }
        }
    }
    Ok(filters)
}

/// Splits a package list on commas, semicolons and whitespace.
#[must_use]
pub fn tokenize_packages(value: &str) -> Vec<String> {
    value
        .split(PACKAGE_DELIMITERS)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Configures and runs a scanner for `@ComponentScan` declarations.
#[derive(Debug, Clone)]
pub struct ComponentScanAnnotationParser {
    context: ContainerContext,
    config: TrellisConfig,
}

impl ComponentScanAnnotationParser {
    /// Creates a parser applying container-wide scan defaults.
    #[must_use]
    pub const fn new(context: ContainerContext, config: TrellisConfig) -> Self {
        Self { context, config }
    }

    /// Scans the packages a declaration names and returns the registered holders.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter or name generator cannot be built, or
    /// the scan itself fails.
    pub fn parse(
        &self,
        scan: &AnnotationAttributes,
        declaring_class: &str,
    ) -> Result<Vec<BeanDefinitionHolder>> {
        let mut scanner =
            ClassPathBeanDefinitionScanner::from_config(self.context.clone(), &self.config)?;
        scanner.reset_filters(scan.boolean("useDefaultFilters").unwrap_or(true));

        if let Some(generator) = scan.class_names("nameGenerator").into_iter().next() {
            let generator = self
                .context
                .plugins()
                .name_generator(&generator, &self.context)?;
            scanner.set_name_generator(generator);
        }

        let proxy_mode = scan
            .string("scopedProxy")
            .and_then(ScopedProxyMode::from_constant)
            .unwrap_or_default();
        if proxy_mode != ScopedProxyMode::Default {
            scanner.set_scope_resolver(AnnotationScopeMetadataResolver::new(proxy_mode));
        }

        for filter in scan.annotations("includeFilters") {
            for type_filter in create_type_filters(filter, &self.context)? {
                scanner.add_include_filter(type_filter);
            }
        }
        for filter in scan.annotations("excludeFilters") {
            for type_filter in create_type_filters(filter, &self.context)? {
                scanner.add_exclude_filter(type_filter);
            }
        }

        if scan.boolean("lazyInit") == Some(true) {
            scanner.set_lazy_init_default(true);
        }

        let base_packages = self.base_packages(scan, declaring_class)?;
        scanner.add_exclude_filter(Rc::new(ClassNameFilter::new(declaring_class)));
        tracing::debug!(class = declaring_class, packages = ?base_packages, "component scan");
        scanner.do_scan(&base_packages)
    }

    fn base_packages(
        &self,
        scan: &AnnotationAttributes,
        declaring_class: &str,
    ) -> Result<Vec<String>> {
        let environment = self.context.environment();
        let mut packages = Vec::new();
        let declared = scan
            .strings("basePackages")
            .into_iter()
            .chain(scan.strings("value"));
        for value in declared {
            for package in tokenize_packages(&environment.resolve_placeholders(&value)?) {
                if !packages.contains(&package) {
                    packages.push(package);
                }
            }
        }
        for class_name in scan.class_names("basePackageClasses") {
            let package = package_name(&class_name).to_string();
            if !packages.contains(&package) {
                packages.push(package);
            }
        }
        if packages.is_empty() {
            packages.push(package_name(declaring_class).to_string());
        }
        Ok(packages)
    }
}

#[cfg(test)]
mod tests {
    use trellis_common::constants::COMPONENT_SCAN;
    use trellis_core::environment::{Environment, StandardEnvironment};
    use trellis_core::metadata::MergedAnnotations;
    use trellis_core::registry::SimpleBeanDefinitionRegistry;
    use trellis_core::source::{ClassIndex, MetadataSource};

    use super::*;

    const SOURCES: &str = r#"
package com.app

annotation Marker {}
interface Plugin {}

@ComponentScan(basePackages = "${scan.root}.services; com.app.web", lazyInit = true)
class AppConfig {}

@ComponentScan(includeFilters = [@Filter(type = ASSIGNABLE_TYPE, classes = [Plugin])], useDefaultFilters = false)
class PluginConfig {}

@ComponentScan(excludeFilters = [@Filter(type = REGEX, pattern = ".*Skipped"), @Filter(Marker)])
@Component class SelfScanning {}

@Component class Skipped {}
@Marker @Component class Marked {}
class FirstPlugin implements Plugin {}

@ComponentScan(includeFilters = [@Filter(type = ASPECTJ, pattern = "com..*")])
class AspectConfig {}
"#;

    const SERVICES: &str = r#"
package com.app.services

@Service class Billing {}
"#;

    const WEB: &str = r#"
package com.app.web

@Controller class Home {}
"#;

    fn fixture() -> (ContainerContext, ClassIndex) {
        let index = trellis_descriptor::index_from_sources([
            ("app.tcd", SOURCES),
            ("services.tcd", SERVICES),
            ("web.tcd", WEB),
        ])
        .unwrap();
        let environment = StandardEnvironment::new();
        environment.property_sources().borrow_mut().add_last(
            trellis_core::environment::PropertySource::map(
                "test",
                [("scan.root".to_string(), "com.app".to_string())],
            ),
        );
        let context = ContainerContext::new(
            SimpleBeanDefinitionRegistry::new().into_shared(),
            Rc::new(index.clone()),
        )
        .with_environment(Rc::new(environment));
        (context, index)
    }

    fn scan_of(index: &ClassIndex, class: &str) -> AnnotationAttributes {
        let metadata = index.read(class).unwrap();
        MergedAnnotations::from_element(metadata.as_ref(), index)
            .get(COMPONENT_SCAN)
            .cloned()
            .unwrap()
    }

    fn parse(class: &str) -> Result<Vec<String>> {
        let (context, index) = fixture();
        let parser = ComponentScanAnnotationParser::new(context, TrellisConfig::default());
        let holders = parser.parse(&scan_of(&index, class), class)?;
        Ok(holders.into_iter().map(|holder| holder.name).collect())
    }

    #[test]
    fn tokenizes_on_all_delimiters() {
        assert_eq!(
            tokenize_packages(" a.b, c;d\te\n f "),
            vec!["a.b", "c", "d", "e", "f"]
        );
    }

    #[test]
    fn placeholder_packages_are_resolved_and_split() {
        assert_eq!(parse("com.app.AppConfig").unwrap(), vec!["billing", "home"]);
    }

    #[test]
    fn lazy_init_attribute_applies_to_scanned_beans() {
        let (context, index) = fixture();
        let parser = ComponentScanAnnotationParser::new(context.clone(), TrellisConfig::default());
        let _ = parser
            .parse(&scan_of(&index, "com.app.AppConfig"), "com.app.AppConfig")
            .unwrap();
        let registry = context.registry().borrow();
        assert_eq!(registry.get_bean_definition("billing").unwrap().lazy_init, Some(true));
    }

    #[test]
    fn custom_include_filter_replaces_defaults() {
        assert_eq!(parse("com.app.PluginConfig").unwrap(), vec!["firstPlugin"]);
    }

    #[test]
    fn declaring_package_and_exclusions_apply() {
        let names = parse("com.app.SelfScanning").unwrap();
        assert!(names.contains(&"billing".to_string()));
        assert!(names.contains(&"home".to_string()));
        assert!(!names.contains(&"selfScanning".to_string()));
        assert!(!names.contains(&"skipped".to_string()));
        assert!(!names.contains(&"marked".to_string()));
    }

    #[test]
    fn aspectj_filters_are_rejected() {
        let err = parse("com.app.AspectConfig").unwrap_err();
        assert!(err.to_string().contains("AspectJ"));
    }

    #[test]
    fn annotation_filter_requires_an_annotation_type() {
        let (context, _) = fixture();
        let filter = AnnotationInstance::new("trellis.context.annotation.Filter").with(
            "classes",
            trellis_core::metadata::AnnotationValue::Class("com.app.Plugin".into()),
        );
        assert!(create_type_filters(&filter, &context).is_err());
    }
}
