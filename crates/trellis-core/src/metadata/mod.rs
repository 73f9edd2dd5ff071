//! Structural class and annotation metadata.
//!
//! Metadata is read without loading or executing the described class. An
//! annotation is a type name plus an attribute map; nested annotations and
//! meta-annotations are plain data that [`merged::MergedAnnotations`] walks
//! as an explicit graph.

pub mod builtin;
pub mod merged;

use std::collections::BTreeMap;

use trellis_common::types::{is_jdk_type, package_name, short_class_name};

pub use self::merged::{MergedAnnotation, MergedAnnotations};

/// A single annotation attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationValue {
    /// String literal.
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Boolean literal.
    Bool(bool),
    /// Reference to a class by fully-qualified name.
    Class(String),
    /// Enum constant such as `TARGET_CLASS`.
    Enum(String),
    /// Array of values.
    Array(Vec<AnnotationValue>),
    /// Nested annotation.
    Annotation(AnnotationInstance),
}

impl AnnotationValue {
    fn flatten(&self) -> Vec<&Self> {
        match self {
            Self::Array(items) => items.iter().collect(),
            other => vec![other],
        }
    }
}

/// Attribute map of one annotation occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationAttributes(BTreeMap<String, AnnotationValue>);

impl AnnotationAttributes {
    /// Creates an empty attribute map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute, returning the map for chaining.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: AnnotationValue) -> Self {
        let _ = self.0.insert(name.into(), value);
        self
    }

    /// Sets an attribute in place.
    pub fn insert(&mut self, name: impl Into<String>, value: AnnotationValue) {
        let _ = self.0.insert(name.into(), value);
    }

    /// Returns the raw value of an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AnnotationValue> {
        self.0.get(name)
    }

    /// Returns `true` if the attribute was declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Returns a string or enum attribute.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<&str> {
        match self.0.get(name)? {
            AnnotationValue::Str(s) | AnnotationValue::Enum(s) | AnnotationValue::Class(s) => {
                Some(s)
            }
            AnnotationValue::Array(items) if items.len() == 1 => match &items[0] {
                AnnotationValue::Str(s) | AnnotationValue::Enum(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns a string attribute that may be declared as a single value or an array.
    #[must_use]
    pub fn strings(&self, name: &str) -> Vec<String> {
        self.0.get(name).map_or_else(Vec::new, |value| {
            value
                .flatten()
                .into_iter()
                .filter_map(|v| match v {
                    AnnotationValue::Str(s) | AnnotationValue::Enum(s) => Some(s.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    /// Returns class references; string values are accepted as class names.
    #[must_use]
    pub fn class_names(&self, name: &str) -> Vec<String> {
        self.0.get(name).map_or_else(Vec::new, |value| {
            value
                .flatten()
                .into_iter()
                .filter_map(|v| match v {
                    AnnotationValue::Class(s) | AnnotationValue::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    /// Returns a boolean attribute.
    #[must_use]
    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.0.get(name)? {
            AnnotationValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns an integer attribute.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.0.get(name)? {
            AnnotationValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns nested annotations declared as a single value or an array.
    #[must_use]
    pub fn annotations(&self, name: &str) -> Vec<&AnnotationInstance> {
        self.0.get(name).map_or_else(Vec::new, |value| {
            value
                .flatten()
                .into_iter()
                .filter_map(|v| match v {
                    AnnotationValue::Annotation(a) => Some(a),
                    _ => None,
                })
                .collect()
        })
    }

    /// Iterates over the declared attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnnotationValue)> {
        self.0.iter()
    }
}

/// One annotation occurrence on a class, method, or annotation type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationInstance {
    /// Fully-qualified annotation type name.
    pub type_name: String,
    /// Declared attributes.
    pub attributes: AnnotationAttributes,
}

impl AnnotationInstance {
    /// Creates an annotation without attributes.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: AnnotationAttributes::new(),
        }
    }

    /// Adds an attribute, returning the annotation for chaining.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: AnnotationValue) -> Self {
        self.attributes.insert(name, value);
        self
    }
}

/// Kind of a described type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// A regular class.
    #[default]
    Class,
    /// An interface.
    Interface,
    /// An annotation type.
    Annotation,
}

/// Whether a metadata's method list is in declaration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MethodOrder {
    /// Methods appear in source declaration order (structural read).
    #[default]
    Declared,
    /// Method order is not guaranteed to be stable (introspected read).
    Unspecified,
}

/// Structural description of a method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodMetadata {
    /// Method name.
    pub name: String,
    /// Class that declares the method.
    pub declaring_class: String,
    /// Declared return type, if known.
    pub return_type: Option<String>,
    /// Annotations present on the method.
    pub annotations: Vec<AnnotationInstance>,
    /// Whether the method has no body.
    pub is_abstract: bool,
    /// Whether the method is static.
    pub is_static: bool,
    /// Whether the method is final.
    pub is_final: bool,
    /// Whether the method is private.
    pub is_private: bool,
    /// Whether the method is an interface default method.
    pub is_default: bool,
}

impl MethodMetadata {
    /// Creates a concrete, non-static method description.
    #[must_use]
    pub fn new(declaring_class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_class: declaring_class.into(),
            ..Self::default()
        }
    }

    /// Adds an annotation, returning the method for chaining.
    #[must_use]
    pub fn annotated(mut self, annotation: AnnotationInstance) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Returns `true` if the method may be overridden by a subclass.
    #[must_use]
    pub const fn is_overridable(&self) -> bool {
        !self.is_static && !self.is_final && !self.is_private
    }
}

/// Structural description of a class, interface, or annotation type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassMetadata {
    /// Fully-qualified class name (`$` separates nested classes).
    pub name: String,
    /// Class, interface, or annotation.
    pub kind: ClassKind,
    /// Whether the class is abstract.
    pub is_abstract: bool,
    /// Whether the class is final.
    pub is_final: bool,
    /// Whether a nested class is static (top-level classes are always independent).
    pub is_static: bool,
    /// Enclosing class for nested classes.
    pub enclosing_class: Option<String>,
    /// Superclass, if any.
    pub superclass: Option<String>,
    /// Directly implemented interfaces.
    pub interfaces: Vec<String>,
    /// Directly declared member classes.
    pub member_classes: Vec<String>,
    /// Annotations present on the class.
    pub annotations: Vec<AnnotationInstance>,
    /// Declared methods.
    pub methods: Vec<MethodMetadata>,
    /// Provenance of the method ordering.
    pub method_order: MethodOrder,
    /// Resource the metadata was read from.
    pub resource: Option<String>,
}

impl ClassMetadata {
    /// Creates metadata for a plain class.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the kind, returning the metadata for chaining.
    #[must_use]
    pub const fn with_kind(mut self, kind: ClassKind) -> Self {
        self.kind = kind;
        self
    }

    /// Adds an annotation, returning the metadata for chaining.
    #[must_use]
    pub fn annotated(mut self, annotation: AnnotationInstance) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Adds a method, returning the metadata for chaining.
    #[must_use]
    pub fn with_method(mut self, method: MethodMetadata) -> Self {
        self.methods.push(method);
        self
    }

    /// Sets the superclass, returning the metadata for chaining.
    #[must_use]
    pub fn extending(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    /// Class name without package.
    #[must_use]
    pub fn short_name(&self) -> String {
        short_class_name(&self.name)
    }

    /// Package of the class.
    #[must_use]
    pub fn package_name(&self) -> &str {
        package_name(&self.name)
    }

    /// Returns `true` for interfaces and annotation types.
    #[must_use]
    pub const fn is_interface(&self) -> bool {
        matches!(self.kind, ClassKind::Interface | ClassKind::Annotation)
    }

    /// Returns `true` for annotation types.
    #[must_use]
    pub const fn is_annotation(&self) -> bool {
        matches!(self.kind, ClassKind::Annotation)
    }

    /// Returns `true` for instantiable classes.
    #[must_use]
    pub const fn is_concrete(&self) -> bool {
        !self.is_interface() && !self.is_abstract
    }

    /// Returns `true` for top-level and static nested classes.
    #[must_use]
    pub const fn is_independent(&self) -> bool {
        self.enclosing_class.is_none() || self.is_static
    }

    /// Returns the superclass unless it is absent or a platform type.
    #[must_use]
    pub fn user_superclass(&self) -> Option<&str> {
        self.superclass
            .as_deref()
            .filter(|name| !is_jdk_type(name))
    }

    /// Returns the first directly present annotation of the given type.
    #[must_use]
    pub fn direct_annotation(&self, type_name: &str) -> Option<&AnnotationInstance> {
        self.annotations.iter().find(|a| a.type_name == type_name)
    }

    /// Identifies where this class was read from, unique per class.
    #[must_use]
    pub fn source_location(&self) -> String {
        self.resource.as_ref().map_or_else(
            || format!("class [{}]", self.name),
            |resource| format!("{resource}#{}", self.name),
        )
    }
}

/// Anything that carries annotations: classes and methods.
pub trait AnnotatedElement {
    /// Directly present annotations.
    fn annotations(&self) -> &[AnnotationInstance];

    /// Human-readable identity used in logs and problems.
    fn describe(&self) -> String;

    /// Returns the class metadata when the element is a class.
    fn as_class(&self) -> Option<&ClassMetadata> {
        None
    }
}

impl AnnotatedElement for ClassMetadata {
    fn annotations(&self) -> &[AnnotationInstance] {
        &self.annotations
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn as_class(&self) -> Option<&ClassMetadata> {
        Some(self)
    }
}

impl AnnotatedElement for MethodMetadata {
    fn annotations(&self) -> &[AnnotationInstance] {
        &self.annotations
    }

    fn describe(&self) -> String {
        format!("{}.{}()", self.declaring_class, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_annotation() -> AnnotationInstance {
        AnnotationInstance::new("trellis.context.ComponentScan")
            .with(
                "basePackages",
                AnnotationValue::Array(vec![
                    AnnotationValue::Str("com.a".into()),
                    AnnotationValue::Str("com.b".into()),
                ]),
            )
            .with("lazyInit", AnnotationValue::Bool(true))
            .with("proxyMode", AnnotationValue::Enum("TARGET_CLASS".into()))
    }

    #[test]
    fn attribute_getters_flatten_single_values_and_arrays() {
        let ann = scan_annotation();
        assert_eq!(ann.attributes.strings("basePackages"), vec!["com.a", "com.b"]);
        assert_eq!(ann.attributes.boolean("lazyInit"), Some(true));
        assert_eq!(ann.attributes.string("proxyMode"), Some("TARGET_CLASS"));
        assert!(ann.attributes.strings("missing").is_empty());
    }

    #[test]
    fn class_names_accept_strings_and_class_refs() {
        let attrs = AnnotationAttributes::new().with(
            "value",
            AnnotationValue::Array(vec![
                AnnotationValue::Class("com.a.One".into()),
                AnnotationValue::Str("com.a.Two".into()),
                AnnotationValue::Int(3),
            ]),
        );
        assert_eq!(attrs.class_names("value"), vec!["com.a.One", "com.a.Two"]);
    }

    #[test]
    fn independence_and_concreteness() {
        let mut inner = ClassMetadata::new("com.a.Outer$Inner");
        inner.enclosing_class = Some("com.a.Outer".into());
        assert!(!inner.is_independent());
        inner.is_static = true;
        assert!(inner.is_independent());

        let iface = ClassMetadata::new("com.a.Api").with_kind(ClassKind::Interface);
        assert!(!iface.is_concrete());
        assert!(iface.is_interface());
    }

    #[test]
    fn user_superclass_ignores_platform_types() {
        let meta = ClassMetadata::new("com.a.X").extending("java.lang.Object");
        assert_eq!(meta.user_superclass(), None);
        let meta = ClassMetadata::new("com.a.X").extending("com.a.Base");
        assert_eq!(meta.user_superclass(), Some("com.a.Base"));
    }

    #[test]
    fn source_location_is_unique_per_class() {
        let mut a = ClassMetadata::new("com.a.A");
        let mut b = ClassMetadata::new("com.a.B");
        a.resource = Some("app.tcd".into());
        b.resource = Some("app.tcd".into());
        assert_ne!(a.source_location(), b.source_location());
    }
}
