//! Domain primitive types used across the trellis workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest precedence order value.
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// Lowest precedence order value; the default for unordered components.
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// How a scoped bean is exposed to its collaborators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopedProxyMode {
    /// Use the resolver's configured default (normally [`ScopedProxyMode::No`]).
    #[default]
    Default,
    /// Do not create a scoped proxy.
    No,
    /// Create an interface-based proxy.
    Interfaces,
    /// Create a class-based proxy.
    TargetClass,
}

impl ScopedProxyMode {
    /// Parses the enum constant used in annotation attributes.
    #[must_use]
    pub fn from_constant(value: &str) -> Option<Self> {
        match value {
            "DEFAULT" => Some(Self::Default),
            "NO" => Some(Self::No),
            "INTERFACES" => Some(Self::Interfaces),
            "TARGET_CLASS" => Some(Self::TargetClass),
            _ => None,
        }
    }
}

impl fmt::Display for ScopedProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "DEFAULT"),
            Self::No => write!(f, "NO"),
            Self::Interfaces => write!(f, "INTERFACES"),
            Self::TargetClass => write!(f, "TARGET_CLASS"),
        }
    }
}

/// Role hint of a bean definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// A major, user-defined part of the application.
    #[default]
    Application,
    /// A supporting part of some larger configuration.
    Support,
    /// Purely internal framework infrastructure.
    Infrastructure,
}

impl Role {
    /// Maps the integer used by `@Role` to a role.
    #[must_use]
    pub const fn from_int(value: i64) -> Self {
        match value {
            1 => Self::Support,
            2 => Self::Infrastructure,
            _ => Self::Application,
        }
    }
}

/// Returns the class name without its package, with `$` nesting rendered as `.`.
#[must_use]
pub fn short_class_name(class_name: &str) -> String {
    let simple = class_name.rsplit('.').next().unwrap_or(class_name);
    simple.replace('$', ".")
}

/// Returns the package part of a fully-qualified class name (empty for the default package).
#[must_use]
pub fn package_name(class_name: &str) -> &str {
    class_name.rfind('.').map_or("", |idx| &class_name[..idx])
}

/// Returns `true` for platform (JDK) types, which are never introspected.
#[must_use]
pub fn is_jdk_type(class_name: &str) -> bool {
    class_name.starts_with(crate::constants::JDK_PACKAGE_PREFIX)
}

/// Returns `true` if `class_name` lives in `base_package` or one of its sub-packages.
#[must_use]
pub fn is_in_package(class_name: &str, base_package: &str) -> bool {
    if base_package.is_empty() {
        return true;
    }
    class_name
        .strip_prefix(base_package)
        .is_some_and(|rest| rest.starts_with('.'))
}
