//! Unified error type for the trellis workspace.
//!
//! Every fallible operation in the container core returns [`Result`]. There is
//! no partial-success mode: any error surfaced here aborts container bootstrap.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum TrellisError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or declaration is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Metadata for a referenced class could not be read.
    #[error("class not found: {class_name}")]
    ClassNotFound {
        /// Fully-qualified name of the unreadable class.
        class_name: String,
    },

    /// A plugin class was referenced by name but no factory is registered for it.
    #[error("cannot instantiate {kind} [{class_name}]: {message}")]
    Plugin {
        /// Capability the class was expected to implement.
        kind: &'static str,
        /// Referenced class name.
        class_name: String,
        /// Reason the instantiation failed.
        message: String,
    },

    /// Parsing a root configuration class failed.
    #[error("failed to parse configuration class [{class_name}]: {source}")]
    Parse {
        /// Root configuration class being parsed.
        class_name: String,
        /// Underlying failure.
        source: Box<TrellisError>,
    },

    /// Processing the import candidates of a configuration class failed.
    #[error("failed to process import candidates for configuration class [{class_name}]: {source}")]
    Import {
        /// Configuration class whose imports were being processed.
        class_name: String,
        /// Underlying failure.
        source: Box<TrellisError>,
    },

    /// Problems accumulated during configuration-class traversal.
    #[error("configuration problems found ({count}):\n{report}")]
    Problems {
        /// Number of reported problems.
        count: usize,
        /// One line per problem.
        report: String,
    },

    /// Two incompatible definitions claim the same bean name.
    #[error(
        "annotation-specified bean name '{bean_name}' for bean class [{new_class}] conflicts with existing, non-compatible bean definition of same name and class [{existing_class}]"
    )]
    ConflictingBeanDefinition {
        /// Contested bean name.
        bean_name: String,
        /// Class of the definition being registered.
        new_class: String,
        /// Class of the definition already registered.
        existing_class: String,
    },

    /// A definition would replace another while overriding is disabled.
    #[error("cannot register bean definition [{new_definition}] for bean '{bean_name}': there is already [{existing_definition}] bound")]
    BeanDefinitionOverride {
        /// Contested bean name.
        bean_name: String,
        /// Description of the rejected definition.
        new_definition: String,
        /// Description of the definition already registered.
        existing_definition: String,
    },

    /// A placeholder could not be resolved in a required context.
    #[error("could not resolve placeholder '{placeholder}' in value \"{value}\"")]
    UnresolvablePlaceholder {
        /// Placeholder key.
        placeholder: String,
        /// Text that contained the placeholder.
        value: String,
    },

    /// A placeholder references itself, directly or transitively.
    #[error("circular placeholder reference '{placeholder}' in property definitions")]
    CircularPlaceholder {
        /// Placeholder key that closed the cycle.
        placeholder: String,
    },

    /// An event listener failed while handling an event.
    #[error("listener {listener} failed on {event_type}: {message}")]
    Listener {
        /// Listener identifier.
        listener: String,
        /// Name of the event type being dispatched.
        event_type: String,
        /// Failure description.
        message: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// YAML deserialization failed.
    #[error("YAML error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl TrellisError {
    /// Shorthand for a [`TrellisError::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` for failures that an "ignore missing resources"
    /// declaration is allowed to swallow.
    #[must_use]
    pub fn is_missing_resource(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::UnresolvablePlaceholder { .. } => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TrellisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_root_class_and_cause() {
        let err = TrellisError::Parse {
            class_name: "com.example.AppConfig".into(),
            source: Box::new(TrellisError::ClassNotFound {
                class_name: "com.example.Missing".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("[com.example.AppConfig]"), "got: {msg}");
        assert!(msg.contains("class not found: com.example.Missing"), "got: {msg}");
    }

    #[test]
    fn missing_resource_classification() {
        assert!(
            TrellisError::NotFound {
                kind: "resource",
                id: "x".into()
            }
            .is_missing_resource()
        );
        assert!(
            TrellisError::UnresolvablePlaceholder {
                placeholder: "dir".into(),
                value: "${dir}/a".into()
            }
            .is_missing_resource()
        );
        let io = TrellisError::Io {
            path: PathBuf::from("/nope"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(io.is_missing_resource());
        assert!(!TrellisError::config("bad").is_missing_resource());
    }
}
