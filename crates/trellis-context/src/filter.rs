//! Type filters deciding which scanned classes become candidates.

use std::fmt;

use regex::Regex;
use trellis_common::error::{Result, TrellisError};
use trellis_core::metadata::{ClassMetadata, MergedAnnotations};
use trellis_core::source::{MetadataSource, is_assignable};

/// Decides whether a class matches.
pub trait TypeFilter {
    /// Returns `true` if the class matches.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata needed for the decision cannot be read.
    fn matches(&self, metadata: &ClassMetadata, source: &dyn MetadataSource) -> Result<bool>;
}

/// Matches classes carrying an annotation, directly or through meta-annotations.
#[derive(Debug, Clone)]
pub struct AnnotationTypeFilter {
    annotation_type: String,
    consider_meta_annotations: bool,
}

impl AnnotationTypeFilter {
    /// Matches the annotation directly present or meta-present.
    #[must_use]
    pub fn new(annotation_type: impl Into<String>) -> Self {
        Self {
            annotation_type: annotation_type.into(),
            consider_meta_annotations: true,
        }
    }

    /// Matches the annotation only when directly present.
    #[must_use]
    pub fn direct(annotation_type: impl Into<String>) -> Self {
        Self {
            annotation_type: annotation_type.into(),
            consider_meta_annotations: false,
        }
    }

    /// The annotation type matched.
    #[must_use]
    pub fn annotation_type(&self) -> &str {
        &self.annotation_type
    }
}

impl TypeFilter for AnnotationTypeFilter {
    fn matches(&self, metadata: &ClassMetadata, source: &dyn MetadataSource) -> Result<bool> {
        if metadata.direct_annotation(&self.annotation_type).is_some() {
            return Ok(true);
        }
        Ok(self.consider_meta_annotations
            && MergedAnnotations::from_element(metadata, source).is_present(&self.annotation_type))
    }
}

/// Matches classes assignable to a type.
#[derive(Debug, Clone)]
pub struct AssignableTypeFilter {
    target_type: String,
}

impl AssignableTypeFilter {
    /// Matches subtypes of `target_type`, including the type itself.
    #[must_use]
    pub fn new(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
        }
    }
}

impl TypeFilter for AssignableTypeFilter {
    fn matches(&self, metadata: &ClassMetadata, source: &dyn MetadataSource) -> Result<bool> {
        Ok(is_assignable(source, &metadata.name, &self.target_type))
    }
}

/// Matches class names against a regular expression covering the whole name.
#[derive(Debug, Clone)]
pub struct RegexPatternTypeFilter {
    pattern: Regex,
}

impl RegexPatternTypeFilter {
    /// Compiles the pattern.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pattern is not a valid regex.
    pub fn new(pattern: &str) -> Result<Self> {
        let anchored = format!("^(?:{pattern})$");
        let pattern = Regex::new(&anchored).map_err(|err| {
            TrellisError::config(format!("invalid type filter pattern '{pattern}': {err}"))
        })?;
        Ok(Self { pattern })
    }
}

impl TypeFilter for RegexPatternTypeFilter {
    fn matches(&self, metadata: &ClassMetadata, _source: &dyn MetadataSource) -> Result<bool> {
        Ok(self.pattern.is_match(&metadata.name))
    }
}

/// Excludes exactly one class; used to keep a scan from re-registering the
/// class that declared it.
#[derive(Debug, Clone)]
pub struct ClassNameFilter {
    class_name: String,
}

impl ClassNameFilter {
    /// Matches only `class_name`.
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
        }
    }
}

impl TypeFilter for ClassNameFilter {
    fn matches(&self, metadata: &ClassMetadata, _source: &dyn MetadataSource) -> Result<bool> {
        Ok(metadata.name == self.class_name)
    }
}

impl fmt::Display for AnnotationTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "annotation @{}", self.annotation_type)
    }
}

#[cfg(test)]
mod tests {
    use trellis_common::constants::{COMPONENT, SERVICE};
    use trellis_core::source::ClassIndex;

    use super::*;

    const SOURCES: &str = r#"
package com.a

interface Repo {}
class BaseRepo implements Repo {}
@Service class OrderRepo extends BaseRepo {}
@Component class Plain {}
class Bare {}
"#;

    fn index() -> ClassIndex {
        trellis_descriptor::index_from_sources([("a.tcd", SOURCES)]).unwrap()
    }

    fn check(filter: &dyn TypeFilter, index: &ClassIndex, class: &str) -> bool {
        filter.matches(&index.read(class).unwrap(), index).unwrap()
    }

    #[test]
    fn annotation_filter_considers_meta_annotations() {
        let index = index();
        let filter = AnnotationTypeFilter::new(COMPONENT);
        assert!(check(&filter, &index, "com.a.OrderRepo"));
        assert!(check(&filter, &index, "com.a.Plain"));
        assert!(!check(&filter, &index, "com.a.Bare"));

        let direct = AnnotationTypeFilter::direct(COMPONENT);
        assert!(!check(&direct, &index, "com.a.OrderRepo"));
        assert!(check(&AnnotationTypeFilter::direct(SERVICE), &index, "com.a.OrderRepo"));
    }

    #[test]
    fn assignable_filter_walks_the_hierarchy() {
        let index = index();
        let filter = AssignableTypeFilter::new("com.a.Repo");
        assert!(check(&filter, &index, "com.a.OrderRepo"));
        assert!(check(&filter, &index, "com.a.Repo"));
        assert!(!check(&filter, &index, "com.a.Plain"));
    }

    #[test]
    fn regex_filter_matches_whole_names() {
        let index = index();
        let filter = RegexPatternTypeFilter::new(r".*Repo").unwrap();
        assert!(check(&filter, &index, "com.a.OrderRepo"));
        assert!(!check(&filter, &index, "com.a.Bare"));
        assert!(!check(&RegexPatternTypeFilter::new("Order").unwrap(), &index, "com.a.OrderRepo"));
        assert!(RegexPatternTypeFilter::new("(").is_err());
    }

    #[test]
    fn class_name_filter_matches_one_class() {
        let index = index();
        let filter = ClassNameFilter::new("com.a.Plain");
        assert!(check(&filter, &index, "com.a.Plain"));
        assert!(!check(&filter, &index, "com.a.Bare"));
    }
}
