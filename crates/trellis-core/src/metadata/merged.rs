//! Meta-annotation flattening.
//!
//! An annotation type may itself be annotated; a composed annotation such as
//! `@EnableCaching` can therefore carry `@Import` transitively. The walk below
//! is breadth-first so that the first occurrence of a type is also the nearest
//! one, and keeps a visited-set of expanded annotation types so that
//! self-annotated or mutually annotated types terminate.

use std::collections::{HashSet, VecDeque};

use trellis_common::constants::JDK_ANNOTATION_PREFIX;
use trellis_common::types::is_jdk_type;

use super::{AnnotatedElement, AnnotationAttributes, AnnotationInstance};
use crate::source::MetadataSource;

/// One annotation reachable from an element, with its meta-distance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedAnnotation {
    /// The annotation occurrence.
    pub annotation: AnnotationInstance,
    /// 0 for directly present annotations, 1 for their meta-annotations, ...
    pub depth: usize,
}

/// All annotations reachable from an element, nearest first.
#[derive(Debug, Clone, Default)]
pub struct MergedAnnotations {
    entries: Vec<MergedAnnotation>,
}

impl MergedAnnotations {
    /// Flattens the annotations of `element`, reading annotation types from `source`.
    #[must_use]
    pub fn from_element(element: &dyn AnnotatedElement, source: &dyn MetadataSource) -> Self {
        Self::from_annotations(element.annotations(), source)
    }

    /// Flattens a list of directly present annotations.
    #[must_use]
    pub fn from_annotations(direct: &[AnnotationInstance], source: &dyn MetadataSource) -> Self {
        let mut entries = Vec::new();
        let mut expanded: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<MergedAnnotation> = direct
            .iter()
            .map(|annotation| MergedAnnotation {
                annotation: annotation.clone(),
                depth: 0,
            })
            .collect();

        while let Some(current) = queue.pop_front() {
            let type_name = current.annotation.type_name.clone();
            let depth = current.depth;
            entries.push(current);

            if type_name.starts_with(JDK_ANNOTATION_PREFIX) || is_jdk_type(&type_name) {
                continue;
            }
            if !expanded.insert(type_name.clone()) {
                continue;
            }
            match source.read(&type_name) {
                Ok(annotation_type) => {
                    for meta in &annotation_type.annotations {
                        queue.push_back(MergedAnnotation {
                            annotation: meta.clone(),
                            depth: depth + 1,
                        });
                    }
                }
                Err(_) => {
                    tracing::trace!(annotation = %type_name, "annotation type not readable, no meta-annotations");
                }
            }
        }

        Self { entries }
    }

    /// Returns `true` if the type is present directly or as a meta-annotation.
    #[must_use]
    pub fn is_present(&self, type_name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.annotation.type_name == type_name)
    }

    /// Returns `true` if the type is directly present.
    #[must_use]
    pub fn is_directly_present(&self, type_name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.depth == 0 && e.annotation.type_name == type_name)
    }

    /// Returns the attributes of the nearest occurrence of the type.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&AnnotationAttributes> {
        self.entries
            .iter()
            .find(|e| e.annotation.type_name == type_name)
            .map(|e| &e.annotation.attributes)
    }

    /// Returns the attributes of every occurrence of the type at any depth.
    #[must_use]
    pub fn all_attributes(&self, type_name: &str) -> Vec<&AnnotationAttributes> {
        self.entries
            .iter()
            .filter(|e| e.annotation.type_name == type_name)
            .map(|e| &e.annotation.attributes)
            .collect()
    }

    /// Resolves a repeatable annotation and its container.
    ///
    /// Occurrences are collected per depth, unpacking the container's `value`;
    /// the nearest depth with any occurrence wins.
    #[must_use]
    pub fn repeatable(&self, type_name: &str, container: &str) -> Vec<AnnotationAttributes> {
        let Some(max_depth) = self.entries.iter().map(|e| e.depth).max() else {
            return Vec::new();
        };
        for depth in 0..=max_depth {
            let mut found = Vec::new();
            for entry in self.entries.iter().filter(|e| e.depth == depth) {
                if entry.annotation.type_name == type_name {
                    found.push(entry.annotation.attributes.clone());
                } else if entry.annotation.type_name == container {
                    found.extend(
                        entry
                            .annotation
                            .attributes
                            .annotations("value")
                            .into_iter()
                            .filter(|nested| nested.type_name == type_name)
                            .map(|nested| nested.attributes.clone()),
                    );
                }
            }
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Iterates over every reachable annotation, nearest first.
    pub fn iter(&self) -> impl Iterator<Item = &MergedAnnotation> {
        self.entries.iter()
    }

    /// Returns `true` if the element carries no annotation at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
