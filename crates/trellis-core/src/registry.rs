//! The bean definition sink.
//!
//! All writers run on the bootstrap thread, so the shared handle is an
//! `Rc<RefCell<..>>` and registration order is the order of calls.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use trellis_common::error::{Result, TrellisError};

use crate::definition::BeanDefinition;
use crate::environment::Environment;
use crate::resource::ResourceLoader;

/// Shared, single-threaded handle to a registry.
pub type SharedRegistry = Rc<RefCell<dyn BeanDefinitionRegistry>>;

/// Accumulates `(name, definition)` bindings.
pub trait BeanDefinitionRegistry {
    /// Registers a definition under a name.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::BeanDefinitionOverride`] if the name is taken
    /// and overriding is disabled.
    fn register_bean_definition(&mut self, name: &str, definition: BeanDefinition) -> Result<()>;

    /// Removes a definition.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::NotFound`] if no definition has that name.
    fn remove_bean_definition(&mut self, name: &str) -> Result<BeanDefinition>;

    /// Returns `true` if a definition has that name.
    fn contains_bean_definition(&self, name: &str) -> bool;

    /// Returns the definition registered under a name.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::NotFound`] if no definition has that name.
    fn get_bean_definition(&self, name: &str) -> Result<&BeanDefinition>;

    /// Returns the definition registered under a name for in-place updates.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::NotFound`] if no definition has that name.
    fn get_bean_definition_mut(&mut self, name: &str) -> Result<&mut BeanDefinition>;

    /// Definition names in registration order.
    fn bean_definition_names(&self) -> Vec<String>;

    /// Number of registered definitions.
    fn bean_definition_count(&self) -> usize;

    /// Registers an alias for a name.
    ///
    /// # Errors
    ///
    /// Returns an error if the alias is already bound to another name and
    /// overriding is disabled.
    fn register_alias(&mut self, name: &str, alias: &str) -> Result<()>;

    /// Aliases registered for a name.
    fn aliases(&self, name: &str) -> Vec<String>;

    /// Returns `true` if the name is used as a bean name or an alias.
    fn is_bean_name_in_use(&self, name: &str) -> bool {
        self.contains_bean_definition(name) || self.is_alias(name)
    }

    /// Returns `true` if the name is an alias.
    fn is_alias(&self, name: &str) -> bool;

    /// Whether a registration may replace an existing one.
    fn allow_bean_definition_overriding(&self) -> bool {
        true
    }

    /// Environment view, when the registry also provides one.
    fn environment(&self) -> Option<Rc<dyn Environment>> {
        None
    }

    /// Resource-loader view, when the registry also provides one.
    fn resource_loader(&self) -> Option<Rc<dyn ResourceLoader>> {
        None
    }

    /// Bean-factory view, when the registry also provides one.
    fn as_bean_factory(&self) -> Option<&dyn BeanFactory> {
        None
    }
}

/// Read-only queries over known beans.
pub trait BeanFactory {
    /// Returns `true` if a bean (or alias) with that name exists.
    fn contains_bean(&self, name: &str) -> bool;

    /// Names of beans whose class is, extends, or implements `class_name`.
    fn bean_names_for_class(&self, class_name: &str) -> Vec<String>;
}

/// Ordered in-memory registry.
#[derive(Default)]
pub struct SimpleBeanDefinitionRegistry {
    definitions: IndexMap<String, BeanDefinition>,
    aliases: IndexMap<String, String>,
    allow_overriding: bool,
    environment: Option<Rc<dyn Environment>>,
    resource_loader: Option<Rc<dyn ResourceLoader>>,
}

impl std::fmt::Debug for SimpleBeanDefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleBeanDefinitionRegistry")
            .field("definitions", &self.definitions.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .field("allow_overriding", &self.allow_overriding)
            .finish_non_exhaustive()
    }
}

impl SimpleBeanDefinitionRegistry {
    /// Creates an empty registry that allows overriding.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allow_overriding: true,
            ..Self::default()
        }
    }

    /// Sets whether overriding is allowed, returning the registry for chaining.
    #[must_use]
    pub const fn with_overriding(mut self, allow: bool) -> Self {
        self.allow_overriding = allow;
        self
    }

    /// Exposes an environment through the registry.
    #[must_use]
    pub fn with_environment(mut self, environment: Rc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Exposes a resource loader through the registry.
    #[must_use]
    pub fn with_resource_loader(mut self, loader: Rc<dyn ResourceLoader>) -> Self {
        self.resource_loader = Some(loader);
        self
    }

    /// Wraps the registry in a shared handle.
    #[must_use]
    pub fn into_shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    /// Resolves an alias to its bean name.
    #[must_use]
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        while let Some(target) = self.aliases.get(current) {
            current = target;
        }
        current
    }

    /// Iterates over `(name, definition)` in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BeanDefinition)> {
        self.definitions.iter()
    }
}

impl BeanDefinitionRegistry for SimpleBeanDefinitionRegistry {
    fn register_bean_definition(&mut self, name: &str, definition: BeanDefinition) -> Result<()> {
        if name.is_empty() {
            return Err(TrellisError::config("bean name must not be empty"));
        }
        if let Some(existing) = self.definitions.get(name) {
            if !self.allow_overriding {
                return Err(TrellisError::BeanDefinitionOverride {
                    bean_name: name.to_string(),
                    new_definition: definition.to_string(),
                    existing_definition: existing.to_string(),
                });
            }
            tracing::debug!(bean = name, "overriding bean definition");
        }
        let _ = self.definitions.insert(name.to_string(), definition);
        Ok(())
    }

    fn remove_bean_definition(&mut self, name: &str) -> Result<BeanDefinition> {
        self.definitions
            .shift_remove(name)
            .ok_or_else(|| TrellisError::NotFound {
                kind: "bean definition",
                id: name.to_string(),
            })
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    fn get_bean_definition(&self, name: &str) -> Result<&BeanDefinition> {
        self.definitions
            .get(name)
            .ok_or_else(|| TrellisError::NotFound {
                kind: "bean definition",
                id: name.to_string(),
            })
    }

    fn get_bean_definition_mut(&mut self, name: &str) -> Result<&mut BeanDefinition> {
        self.definitions
            .get_mut(name)
            .ok_or_else(|| TrellisError::NotFound {
                kind: "bean definition",
                id: name.to_string(),
            })
    }

    fn bean_definition_names(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }

    fn bean_definition_count(&self) -> usize {
        self.definitions.len()
    }

    fn register_alias(&mut self, name: &str, alias: &str) -> Result<()> {
        if alias == name {
            let _ = self.aliases.shift_remove(alias);
            return Ok(());
        }
        if let Some(existing) = self.aliases.get(alias) {
            if existing == name {
                return Ok(());
            }
            if !self.allow_overriding {
                return Err(TrellisError::config(format!(
                    "cannot define alias '{alias}' for name '{name}': it is already registered for name '{existing}'"
                )));
            }
        }
        if self.canonical_name(name) == alias {
            return Err(TrellisError::config(format!(
                "cannot register alias '{alias}' for name '{name}': circular reference"
            )));
        }
        let _ = self.aliases.insert(alias.to_string(), name.to_string());
        Ok(())
    }

    fn aliases(&self, name: &str) -> Vec<String> {
        self.aliases
            .iter()
            .filter(|(_, target)| target.as_str() == name)
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    fn allow_bean_definition_overriding(&self) -> bool {
        self.allow_overriding
    }

    fn environment(&self) -> Option<Rc<dyn Environment>> {
        self.environment.clone()
    }

    fn resource_loader(&self) -> Option<Rc<dyn ResourceLoader>> {
        self.resource_loader.clone()
    }

    fn as_bean_factory(&self) -> Option<&dyn BeanFactory> {
        Some(self)
    }
}

impl BeanFactory for SimpleBeanDefinitionRegistry {
    fn contains_bean(&self, name: &str) -> bool {
        self.definitions.contains_key(self.canonical_name(name))
    }

    fn bean_names_for_class(&self, class_name: &str) -> Vec<String> {
        self.definitions
            .iter()
            .filter(|(_, def)| {
                def.class_name.as_deref() == Some(class_name)
                    || def.metadata.as_ref().is_some_and(|meta| {
                        meta.superclass.as_deref() == Some(class_name)
                            || meta.interfaces.iter().any(|i| i == class_name)
                    })
                    || def
                        .factory_method_metadata
                        .as_ref()
                        .is_some_and(|m| m.return_type.as_deref() == Some(class_name))
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}
