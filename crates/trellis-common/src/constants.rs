//! Well-known type names, property keys and defaults.

/// Package prefix of platform types that terminate superclass walks.
pub const JDK_PACKAGE_PREFIX: &str = "java.";

/// Package prefix of platform annotation types (never expanded as meta-annotations).
pub const JDK_ANNOTATION_PREFIX: &str = "java.lang.annotation.";

/// Package prefix of the built-in stereotype annotations.
pub const STEREOTYPE_PACKAGE: &str = "trellis.stereotype";

/// `@Component` stereotype.
pub const COMPONENT: &str = "trellis.stereotype.Component";
/// `@Service` stereotype.
pub const SERVICE: &str = "trellis.stereotype.Service";
/// `@Repository` stereotype.
pub const REPOSITORY: &str = "trellis.stereotype.Repository";
/// `@Controller` stereotype.
pub const CONTROLLER: &str = "trellis.stereotype.Controller";

/// `@Configuration`.
pub const CONFIGURATION: &str = "trellis.context.Configuration";
/// `@Bean`.
pub const BEAN: &str = "trellis.context.Bean";
/// `@Import`.
pub const IMPORT: &str = "trellis.context.Import";
/// `@ImportResource`.
pub const IMPORT_RESOURCE: &str = "trellis.context.ImportResource";
/// `@ComponentScan`.
pub const COMPONENT_SCAN: &str = "trellis.context.ComponentScan";
/// `@ComponentScans` (repeatable container).
pub const COMPONENT_SCANS: &str = "trellis.context.ComponentScans";
/// `@Filter` nested in `@ComponentScan`.
pub const FILTER: &str = "trellis.context.Filter";
/// `@PropertySource`.
pub const PROPERTY_SOURCE: &str = "trellis.context.PropertySource";
/// `@PropertySources` (repeatable container).
pub const PROPERTY_SOURCES: &str = "trellis.context.PropertySources";
/// `@Conditional`.
pub const CONDITIONAL: &str = "trellis.context.Conditional";
/// `@Profile`.
pub const PROFILE: &str = "trellis.context.Profile";
/// `@Lazy`.
pub const LAZY: &str = "trellis.context.Lazy";
/// `@Primary`.
pub const PRIMARY: &str = "trellis.context.Primary";
/// `@DependsOn`.
pub const DEPENDS_ON: &str = "trellis.context.DependsOn";
/// `@Role`.
pub const ROLE: &str = "trellis.context.Role";
/// `@Description`.
pub const DESCRIPTION: &str = "trellis.context.Description";
/// `@Scope`.
pub const SCOPE: &str = "trellis.context.Scope";
/// `@Lookup`.
pub const LOOKUP: &str = "trellis.context.Lookup";
/// `@Order`.
pub const ORDER: &str = "trellis.core.Order";

/// Condition class backing `@Profile`.
pub const PROFILE_CONDITION: &str = "trellis.context.ProfileCondition";
/// Default property-source factory (`.properties` text).
pub const DEFAULT_PROPERTY_SOURCE_FACTORY: &str = "trellis.context.DefaultPropertySourceFactory";
/// JSON property-source factory.
pub const JSON_PROPERTY_SOURCE_FACTORY: &str = "trellis.context.JsonPropertySourceFactory";
/// YAML property-source factory.
pub const YAML_PROPERTY_SOURCE_FACTORY: &str = "trellis.context.YamlPropertySourceFactory";
/// Capability interface of immediate import selectors.
pub const IMPORT_SELECTOR: &str = "trellis.context.ImportSelector";
/// Capability interface of deferred import selectors.
pub const DEFERRED_IMPORT_SELECTOR: &str = "trellis.context.DeferredImportSelector";
/// Capability interface of import registrars.
pub const IMPORT_BEAN_DEFINITION_REGISTRAR: &str = "trellis.context.ImportBeanDefinitionRegistrar";
/// Reader name used by `@ImportResource` when none is declared.
pub const DEFAULT_RESOURCE_READER: &str = "default";
/// Class recorded on scoped-proxy definitions.
pub const SCOPED_PROXY_FACTORY: &str = "trellis.aop.ScopedProxyFactoryBean";

/// Short names accepted for the built-in annotation types in descriptor files.
pub const BUILTIN_ANNOTATIONS: &[(&str, &str)] = &[
    ("Component", COMPONENT),
    ("Service", SERVICE),
    ("Repository", REPOSITORY),
    ("Controller", CONTROLLER),
    ("Configuration", CONFIGURATION),
    ("Bean", BEAN),
    ("Import", IMPORT),
    ("ImportResource", IMPORT_RESOURCE),
    ("ComponentScan", COMPONENT_SCAN),
    ("ComponentScans", COMPONENT_SCANS),
    ("Filter", FILTER),
    ("PropertySource", PROPERTY_SOURCE),
    ("PropertySources", PROPERTY_SOURCES),
    ("Conditional", CONDITIONAL),
    ("Profile", PROFILE),
    ("Lazy", LAZY),
    ("Primary", PRIMARY),
    ("DependsOn", DEPENDS_ON),
    ("Role", ROLE),
    ("Description", DESCRIPTION),
    ("Scope", SCOPE),
    ("Lookup", LOOKUP),
    ("Order", ORDER),
];

/// Resolves a short built-in annotation name to its fully-qualified type.
#[must_use]
pub fn builtin_annotation(short_name: &str) -> Option<&'static str> {
    BUILTIN_ANNOTATIONS
        .iter()
        .find(|(short, _)| *short == short_name)
        .map(|(_, full)| *full)
}

/// Singleton scope name.
pub const SCOPE_SINGLETON: &str = "singleton";
/// Prototype scope name.
pub const SCOPE_PROTOTYPE: &str = "prototype";
/// Prefix of the target definition behind a scoped proxy.
pub const SCOPED_TARGET_PREFIX: &str = "scopedTarget.";
/// Separator used by generated bean names (`Class#0`).
pub const GENERATED_BEAN_NAME_SEPARATOR: &str = "#";

/// Property listing the active profiles.
pub const ACTIVE_PROFILES_PROPERTY: &str = "trellis.profiles.active";
/// Property listing the default profiles.
pub const DEFAULT_PROFILES_PROPERTY: &str = "trellis.profiles.default";
/// Profile active when no other profile is.
pub const RESERVED_DEFAULT_PROFILE: &str = "default";
/// Name of the property source built from `TrellisConfig::properties`.
pub const CONFIG_PROPERTY_SOURCE_NAME: &str = "trellisConfig";

/// File extension for class descriptor files.
pub const DESCRIPTOR_EXTENSION: &str = ".tcd";

/// Application name used in CLI output.
pub const APP_NAME: &str = "trellis";
/// Binary name for the CLI.
pub const BIN_NAME: &str = "trellis";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_short_names_resolve() {
        assert_eq!(builtin_annotation("Configuration"), Some(CONFIGURATION));
        assert_eq!(builtin_annotation("Order"), Some(ORDER));
        assert_eq!(builtin_annotation("Nope"), None);
    }

    #[test]
    fn builtin_table_has_unique_short_names() {
        let mut names: Vec<_> = BUILTIN_ANNOTATIONS.iter().map(|(s, _)| *s).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BUILTIN_ANNOTATIONS.len());
    }
}
