//! # trellis-context
//!
//! The resolution engine of the trellis container.
//!
//! Starting from a handful of root configuration classes, the engine
//! discovers the full set of configuration classes (imports, nested
//! classes, component scans, superclasses), evaluates conditions, and
//! emits bean definitions into a registry.
//!
//! - **Condition**: `@Conditional` evaluation by configuration phase.
//! - **Parser**: configuration-class discovery and the deferred import pass.
//! - **Scanner**: classpath component scanning with type filters.
//! - **Bean reader**: emission of bean definitions from parsed classes.
//! - **Processor**: the fixed-point loop over parse, validate, and emit.
//! - **Container**: a facade wiring it all together with lifecycle events.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod annotations;
pub mod bean_reader;
pub mod component_scan;
pub mod condition;
pub mod configuration_class;
pub mod container;
pub mod context;
pub mod deferred;
pub mod filter;
pub mod graph;
pub mod import_stack;
pub mod imports;
pub mod naming;
pub mod parser;
pub mod plugin;
pub mod problem;
pub mod processor;
pub mod property_source;
pub mod reader;
pub mod scanner;
pub mod scope;
pub mod utils;

pub use condition::{Condition, ConditionEvaluator, ConfigurationPhase};
pub use configuration_class::{BeanMethod, ConfigurationClass};
pub use container::{AnnotationConfigContainer, ContainerBuilder};
pub use context::ContainerContext;
pub use imports::{
    DeferredImportGroup, DeferredImportSelector, ExclusionFilter, GroupEntry,
    ImportBeanDefinitionRegistrar, ImportSelector,
};
pub use parser::ConfigurationClassParser;
pub use plugin::PluginRegistry;
pub use processor::{ConfigurationClassPostProcessor, ProcessingReport};
pub use scanner::ClassPathBeanDefinitionScanner;
