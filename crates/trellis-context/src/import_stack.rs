//! The stack of classes whose imports are being processed, and the
//! imported-by index used for cycle detection and importer lookups.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use trellis_core::metadata::ClassMetadata;

/// Classes currently processing their imports, plus who imported whom.
#[derive(Debug, Default)]
pub struct ImportStack {
    stack: Vec<Arc<ClassMetadata>>,
    imports: IndexMap<String, Vec<Arc<ClassMetadata>>>,
}

impl ImportStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a class about to process its imports.
    pub fn push(&mut self, metadata: &Arc<ClassMetadata>) {
        self.stack.push(Arc::clone(metadata));
    }

    /// Pops the most recently pushed class.
    pub fn pop(&mut self) -> Option<Arc<ClassMetadata>> {
        self.stack.pop()
    }

    /// Returns `true` if the class is on the stack.
    #[must_use]
    pub fn contains(&self, class_name: &str) -> bool {
        self.stack.iter().any(|m| m.name == class_name)
    }

    /// Records that `importing` imported `imported`.
    pub fn register_import(&mut self, importing: &Arc<ClassMetadata>, imported: &str) {
        self.imports
            .entry(imported.to_string())
            .or_default()
            .insert(0, Arc::clone(importing));
    }

    /// The most recent importer of a class.
    #[must_use]
    pub fn importing_class_for(&self, imported: &str) -> Option<&Arc<ClassMetadata>> {
        self.imports.get(imported).and_then(|importers| importers.first())
    }

    /// Forgets every import made by a class.
    pub fn remove_importing_class(&mut self, importing: &str) {
        for importers in self.imports.values_mut() {
            importers.retain(|m| m.name != importing);
        }
    }

    /// Returns `true` if the class is on the stack and reaches itself by
    /// walking importers upwards.
    #[must_use]
    pub fn is_chained_import_on_stack(&self, class_name: &str) -> bool {
        if !self.contains(class_name) {
            return false;
        }
        let mut visited = HashSet::new();
        let mut current = class_name;
        while let Some(importer) = self.importing_class_for(current) {
            if importer.name == class_name {
                return true;
            }
            if !visited.insert(importer.name.as_str()) {
                break;
            }
            current = &importer.name;
        }
        false
    }

    /// Renders the stack followed by the class that closes a cycle.
    #[must_use]
    pub fn chain_to(&self, class_name: &str) -> String {
        let names: Vec<&str> = self
            .stack
            .iter()
            .map(|m| m.name.as_str())
            .chain(std::iter::once(class_name))
            .collect();
        format!("[{}]", names.join("->"))
    }
}

impl fmt::Display for ImportStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stack.iter().map(|m| m.name.as_str()).collect();
        write!(f, "[{}]", names.join("->"))
    }
}
