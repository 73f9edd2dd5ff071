//! Abstract Syntax Tree for `.tcd` descriptor files.

/// Root node of a parsed `.tcd` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorFile {
    /// Optional `package` declaration applied to undotted class names.
    pub package: Option<String>,
    /// Top-level type declarations.
    pub classes: Vec<ClassDecl>,
}

/// Kind keyword of a type declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TypeKeyword {
    /// `class`
    #[default]
    Class,
    /// `interface`
    Interface,
    /// `annotation`
    Annotation,
}

/// Declaration and method modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// `abstract`
    Abstract,
    /// `final`
    Final,
    /// `static`
    Static,
    /// `private`
    Private,
    /// `default`
    Default,
}

/// A `class`, `interface`, or `annotation` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDecl {
    /// Annotations preceding the declaration.
    pub annotations: Vec<AnnotationDecl>,
    /// Modifiers preceding the keyword.
    pub modifiers: Vec<Modifier>,
    /// Declaration keyword.
    pub keyword: TypeKeyword,
    /// Declared name as written.
    pub name: String,
    /// `extends` clause.
    pub extends: Option<String>,
    /// `implements` clause.
    pub implements: Vec<String>,
    /// Declared methods in source order.
    pub methods: Vec<MethodDecl>,
    /// Nested type declarations.
    pub members: Vec<ClassDecl>,
}

impl ClassDecl {
    /// Returns `true` if the modifier was declared.
    #[must_use]
    pub fn has(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

/// A `method` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodDecl {
    /// Annotations preceding the method.
    pub annotations: Vec<AnnotationDecl>,
    /// Method modifiers.
    pub modifiers: Vec<Modifier>,
    /// Method name.
    pub name: String,
    /// Declared return type.
    pub return_type: Option<String>,
}

impl MethodDecl {
    /// Returns `true` if the modifier was declared.
    #[must_use]
    pub fn has(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

/// An annotation occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationDecl {
    /// Annotation name as written.
    pub name: String,
    /// Attributes; `None` names the implicit `value` attribute.
    pub attributes: Vec<(Option<String>, ValueDecl)>,
}

/// An attribute value as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueDecl {
    /// String literal.
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Boolean literal.
    Bool(bool),
    /// Bare name: an enum constant or a class reference.
    Name(String),
    /// `[..]` array.
    Array(Vec<ValueDecl>),
    /// Nested annotation.
    Annotation(AnnotationDecl),
}
