//! Dependency graphs using `petgraph`.
//!
//! Two graphs are built from a resolved container: the import graph of
//! configuration classes and the `@DependsOn` graph of bean definitions.
//! Both resolve to an order in which dependencies come first.

use indexmap::IndexMap;
use petgraph::dot::{Config, Dot};
use petgraph::graph::NodeIndex;
use trellis_common::error::{Result, TrellisError};
use trellis_core::registry::BeanDefinitionRegistry;

use crate::parser::SharedConfigurationClass;

/// A directed graph of named nodes.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: petgraph::Graph<String, ()>,
    nodes: IndexMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the import graph: every class depends on the classes it imported.
    #[must_use]
    pub fn imports(classes: &[SharedConfigurationClass]) -> Self {
        let mut graph = Self::new();
        for class in classes {
            let class = class.borrow();
            let imported = graph.add_node(class.name());
            for importer in class.imported_by() {
                let importer = graph.add_node(&importer.name);
                graph.add_dependency(importer, imported);
            }
        }
        graph
    }

    /// Builds the `@DependsOn` graph of every definition in the registry.
    ///
    /// Aliases are resolved to the names they stand for.
    #[must_use]
    pub fn depends_on(registry: &dyn BeanDefinitionRegistry) -> Self {
        let mut graph = Self::new();
        let names = registry.bean_definition_names();
        for name in &names {
            let _ = graph.add_node(name);
        }
        for name in &names {
            let Ok(definition) = registry.get_bean_definition(name) else {
                continue;
            };
            let dependent = graph.add_node(name);
            for target in &definition.depends_on {
                let target = canonical_name(registry, &names, target);
                if !registry.contains_bean_definition(&target) {
                    tracing::warn!(bean = %name, depends_on = %target, "depends-on target is not a known bean");
                }
                let dependency = graph.add_node(&target);
                graph.add_dependency(dependent, dependency);
            }
        }
        graph
    }

    /// Adds a node, returning the existing index if the name is known.
    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(index) = self.nodes.get(name) {
            return *index;
        }
        let index = self.graph.add_node(name.to_string());
        let _ = self.nodes.insert(name.to_string(), index);
        index
    }

    /// Adds an edge: `dependent` depends on `dependency`.
    ///
    /// The edge points from `dependency` to `dependent` so that a
    /// topological sort yields dependencies first.
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        if self.graph.find_edge(dependency, dependent).is_none() {
            let _ = self.graph.add_edge(dependency, dependent, ());
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Names a node directly depends on.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        let Some(index) = self.nodes.get(name) else {
            return Vec::new();
        };
        let mut dependencies: Vec<String> = self
            .graph
            .neighbors_directed(*index, petgraph::Direction::Incoming)
            .filter_map(|neighbor| self.graph.node_weight(neighbor).cloned())
            .collect();
        dependencies.sort();
        dependencies
    }

    /// Returns every node, dependencies before their dependents.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming a node on a cycle.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .iter()
                .filter_map(|&index| self.graph.node_weight(index).cloned())
                .collect()),
            Err(cycle) => {
                let node = self
                    .graph
                    .node_weight(cycle.node_id())
                    .map_or("<unknown>", String::as_str);
                Err(TrellisError::config(format!(
                    "cyclic dependency detected involving '{node}'"
                )))
            }
        }
    }

    /// Renders the graph in Graphviz DOT format.
    #[must_use]
    pub fn to_dot(&self) -> String {
        format!("{:?}", Dot::with_config(&self.graph, &[Config::EdgeNoLabel]))
    }
}

fn canonical_name(registry: &dyn BeanDefinitionRegistry, names: &[String], name: &str) -> String {
    if registry.contains_bean_definition(name) {
        return name.to_string();
    }
    names
        .iter()
        .find(|candidate| registry.aliases(candidate).iter().any(|alias| alias == name))
        .cloned()
        .unwrap_or_else(|| name.to_string())
}
