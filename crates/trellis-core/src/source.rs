//! Reading class metadata by name.
//!
//! Two read paths exist for the same class: a structural read, which keeps
//! methods in declaration order, and an introspected read, whose method order
//! is unspecified. [`ClassIndex`] holds both and prefers the introspected
//! entry, mirroring a reader that tries the cheap path first.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use trellis_common::error::{Result, TrellisError};
use trellis_common::types::{is_in_package, is_jdk_type};

use crate::metadata::builtin::builtin_annotation_types;
use crate::metadata::{ClassMetadata, MethodOrder};

/// Produces class metadata without loading or executing the class.
pub trait MetadataSource {
    /// Reads the metadata of a class.
    ///
    /// # Errors
    ///
    /// Returns [`TrellisError::ClassNotFound`] if the class is unknown.
    fn read(&self, class_name: &str) -> Result<Arc<ClassMetadata>>;

    /// Returns the declaration-ordered structural metadata, if available.
    fn read_structural(&self, class_name: &str) -> Option<Arc<ClassMetadata>>;

    /// Lists the classes in a package and its sub-packages, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the package cannot be enumerated.
    fn package_classes(&self, base_package: &str) -> Result<Vec<String>>;
}

/// Returns `true` if `class_name` is, extends, or implements `target`.
///
/// Walks superclasses and interfaces breadth-first through `source`.
/// Platform types and unreadable types end their branch of the walk.
pub fn is_assignable(source: &dyn MetadataSource, class_name: &str, target: &str) -> bool {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([class_name.to_string()]);
    while let Some(current) = queue.pop_front() {
        if current == target {
            return true;
        }
        if is_jdk_type(&current) || !visited.insert(current.clone()) {
            continue;
        }
        let Ok(metadata) = source.read(&current) else {
            continue;
        };
        queue.extend(metadata.superclass.iter().cloned());
        queue.extend(metadata.interfaces.iter().cloned());
    }
    false
}

/// In-memory [`MetadataSource`] backed by structural and introspected entries.
#[derive(Debug, Default, Clone)]
pub struct ClassIndex {
    structural: IndexMap<String, Arc<ClassMetadata>>,
    introspected: HashMap<String, Arc<ClassMetadata>>,
}

impl ClassIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index pre-populated with the built-in annotation types.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut index = Self::new();
        index.extend(builtin_annotation_types());
        index
    }

    /// Adds structural metadata, replacing any previous entry of the same name.
    pub fn insert(&mut self, metadata: ClassMetadata) {
        let _ = self
            .structural
            .insert(metadata.name.clone(), Arc::new(metadata));
    }

    /// Adds introspected metadata; its method order is marked unspecified.
    pub fn insert_introspected(&mut self, mut metadata: ClassMetadata) {
        metadata.method_order = MethodOrder::Unspecified;
        let _ = self
            .introspected
            .insert(metadata.name.clone(), Arc::new(metadata));
    }

    /// Adds several structural entries.
    pub fn extend(&mut self, metadata: impl IntoIterator<Item = ClassMetadata>) {
        for meta in metadata {
            self.insert(meta);
        }
    }

    /// Returns `true` if either read path knows the class.
    #[must_use]
    pub fn contains(&self, class_name: &str) -> bool {
        self.structural.contains_key(class_name) || self.introspected.contains_key(class_name)
    }

    /// Number of distinct classes known to the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.structural.len()
            + self
                .introspected
                .keys()
                .filter(|name| !self.structural.contains_key(*name))
                .count()
    }

    /// Returns `true` if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.structural.is_empty() && self.introspected.is_empty()
    }
}

impl MetadataSource for ClassIndex {
    fn read(&self, class_name: &str) -> Result<Arc<ClassMetadata>> {
        self.introspected
            .get(class_name)
            .or_else(|| self.structural.get(class_name))
            .cloned()
            .ok_or_else(|| TrellisError::ClassNotFound {
                class_name: class_name.to_string(),
            })
    }

    fn read_structural(&self, class_name: &str) -> Option<Arc<ClassMetadata>> {
        self.structural.get(class_name).cloned()
    }

    fn package_classes(&self, base_package: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .structural
            .keys()
            .chain(self.introspected.keys())
            .filter(|name| is_in_package(name, base_package))
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
