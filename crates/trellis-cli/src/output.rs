//! Formatted output helpers for CLI commands.
//!
//! Every command renders into a `String` first; `emit` writes it out.

use std::fmt::Write as _;
use std::io::Write as _;

use serde::Serialize;
use trellis_common::constants::SCOPE_SINGLETON;
use trellis_core::definition::{BeanDefinition, DefinitionOrigin};
use trellis_core::registry::BeanDefinitionRegistry;

/// Printable view of one registered bean definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeanView {
    /// Bean name.
    pub name: String,
    /// Bean class, if declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Effective scope.
    pub scope: String,
    /// How the definition was produced.
    pub origin: String,
    /// `factoryBean.method` for bean-method definitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory: Option<String>,
    /// Aliases.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// `@DependsOn` targets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Whether the bean is lazily initialised.
    pub lazy: bool,
    /// Whether the bean is primary.
    pub primary: bool,
}

impl BeanView {
    /// Builds the view of a registered definition.
    #[must_use]
    pub fn of(name: &str, definition: &BeanDefinition, aliases: Vec<String>) -> Self {
        let factory = definition.factory_method_name.as_ref().map(|method| {
            let owner = definition
                .factory_bean_name
                .as_deref()
                .or(definition.class_name.as_deref())
                .unwrap_or("?");
            format!("{owner}.{method}")
        });
        Self {
            name: name.to_string(),
            class_name: definition.class_name.clone(),
            scope: definition.effective_scope().to_string(),
            origin: origin_label(&definition.origin).to_string(),
            factory,
            aliases,
            depends_on: definition.depends_on.clone(),
            lazy: definition.lazy_init.unwrap_or(false),
            primary: definition.primary,
        }
    }

    /// Views of every definition in a registry, in registration order.
    #[must_use]
    pub fn all(registry: &dyn BeanDefinitionRegistry) -> Vec<Self> {
        registry
            .bean_definition_names()
            .iter()
            .filter_map(|name| {
                registry
                    .get_bean_definition(name)
                    .ok()
                    .map(|definition| Self::of(name, definition, registry.aliases(name)))
            })
            .collect()
    }
}

/// Short label for a definition origin.
#[must_use]
pub const fn origin_label(origin: &DefinitionOrigin) -> &'static str {
    match origin {
        DefinitionOrigin::Explicit => "explicit",
        DefinitionOrigin::Annotated => "annotated",
        DefinitionOrigin::Scanned => "scanned",
        DefinitionOrigin::ImportedConfiguration => "imported",
        DefinitionOrigin::BeanMethod { .. } => "bean-method",
        DefinitionOrigin::ScopedProxy => "scoped-proxy",
    }
}

/// Appends a title underlined to its width.
pub fn heading(out: &mut String, title: &str) {
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "\u{2550}".repeat(title.chars().count()));
}

/// Appends one line per bean.
pub fn bean_lines(out: &mut String, beans: &[BeanView]) {
    for bean in beans {
        let _ = write!(out, "  + {}", bean.name);
        if let Some(class_name) = &bean.class_name {
            let _ = write!(out, " [{class_name}]");
        }
        let _ = writeln!(out, " ({})", bean.origin);
        if bean.scope != SCOPE_SINGLETON {
            let _ = writeln!(out, "      scope: {}", bean.scope);
        }
        if let Some(factory) = &bean.factory {
            let _ = writeln!(out, "      factory: {factory}");
        }
        if !bean.aliases.is_empty() {
            let _ = writeln!(out, "      aliases: {}", bean.aliases.join(", "));
        }
        if !bean.depends_on.is_empty() {
            let _ = writeln!(out, "      depends on: {}", bean.depends_on.join(", "));
        }
        if bean.lazy {
            let _ = writeln!(out, "      lazy");
        }
        if bean.primary {
            let _ = writeln!(out, "      primary");
        }
    }
}

/// Serializes a value as pretty JSON.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_json(value: &impl Serialize) -> anyhow::Result<String> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}

/// Writes rendered output to stdout.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub fn emit(rendered: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
