//! Lowering of parsed descriptors into class metadata.
//!
//! Name resolution rules:
//! - Annotation names: built-in short names first, then types declared in the
//!   same file, then dotted names as written. Anything else is an error.
//! - Type references (`extends`, `implements`, return types): types declared
//!   in the same file, then dotted names as written, then the file's package.
//! - Bare attribute values: types declared in the same file and dotted names
//!   are class references; other bare names are enum constants.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use trellis_common::constants::builtin_annotation;
use trellis_common::error::{Result, TrellisError};
use trellis_core::metadata::{
    AnnotationInstance, AnnotationValue, ClassKind, ClassMetadata, MethodMetadata, MethodOrder,
};
use trellis_core::source::ClassIndex;

use crate::parser::ast::{
    AnnotationDecl, ClassDecl, DescriptorFile, MethodDecl, Modifier, TypeKeyword, ValueDecl,
};
use crate::parser::parse_tcd;

/// Parses descriptor text and lowers it to class metadata.
///
/// `resource` is recorded on every class as its origin.
///
/// # Errors
///
/// Returns an error if the text does not parse or references unknown annotations.
pub fn load_str(input: &str, resource: &str) -> Result<Vec<ClassMetadata>> {
    let file = parse_tcd(input)?;
    lower(&file, resource)
}

/// Reads and lowers one descriptor file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid.
pub fn load_file(path: &Path) -> Result<Vec<ClassMetadata>> {
    let input = std::fs::read_to_string(path).map_err(|source| TrellisError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "loading class descriptors");
    load_str(&input, &path.display().to_string())
}

/// Builds a [`ClassIndex`] (with built-in annotation types) from descriptor files.
///
/// # Errors
///
/// Returns an error if any file is invalid or two files declare the same class.
pub fn index_from_files(paths: &[impl AsRef<Path>]) -> Result<ClassIndex> {
    let mut all = Vec::new();
    for path in paths {
        all.extend(load_file(path.as_ref())?);
    }
    build_index(all)
}

/// Builds a [`ClassIndex`] from `(resource, text)` pairs.
///
/// # Errors
///
/// Returns an error if any source is invalid or two sources declare the same class.
pub fn index_from_sources<'a>(
    sources: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<ClassIndex> {
    let mut all = Vec::new();
    for (resource, text) in sources {
        all.extend(load_str(text, resource)?);
    }
    build_index(all)
}

fn build_index(classes: Vec<ClassMetadata>) -> Result<ClassIndex> {
    let mut seen = HashSet::new();
    for class in &classes {
        if !seen.insert(class.name.clone()) {
            return Err(TrellisError::config(format!(
                "class {} is declared more than once",
                class.name
            )));
        }
    }
    let mut index = ClassIndex::with_builtins();
    index.extend(classes);
    Ok(index)
}

/// Lowers a parsed file to metadata, outer classes before their members.
///
/// # Errors
///
/// Returns an error for annotation names that cannot be resolved.
pub fn lower(file: &DescriptorFile, resource: &str) -> Result<Vec<ClassMetadata>> {
    let mut declared = HashMap::new();
    for class in &file.classes {
        collect_declared(class, None, file.package.as_deref(), &mut declared);
    }
    let resolver = NameResolver {
        package: file.package.as_deref(),
        declared,
    };
    let mut out = Vec::new();
    for class in &file.classes {
        lower_class(class, None, &resolver, resource, &mut out)?;
    }
    Ok(out)
}

fn qualified_name(decl_name: &str, outer: Option<&str>, package: Option<&str>) -> String {
    match (outer, package) {
        (Some(outer), _) => format!("{outer}${decl_name}"),
        (None, Some(package)) if !decl_name.contains('.') => format!("{package}.{decl_name}"),
        _ => decl_name.to_string(),
    }
}

fn collect_declared(
    class: &ClassDecl,
    outer: Option<(&str, &str)>,
    package: Option<&str>,
    declared: &mut HashMap<String, String>,
) {
    let fqn = qualified_name(&class.name, outer.map(|(fqn, _)| fqn), package);
    let written = outer.map_or_else(
        || class.name.clone(),
        |(_, outer_written)| format!("{outer_written}${}", class.name),
    );
    let _ = declared.insert(written.clone(), fqn.clone());
    for member in &class.members {
        collect_declared(member, Some((&fqn, &written)), package, declared);
    }
}

struct NameResolver<'a> {
    package: Option<&'a str>,
    declared: HashMap<String, String>,
}

impl NameResolver<'_> {
    fn type_name(&self, written: &str) -> String {
        if let Some(fqn) = self.declared.get(written) {
            return fqn.clone();
        }
        match self.package {
            Some(package) if !written.contains('.') => format!("{package}.{written}"),
            _ => written.to_string(),
        }
    }

    fn annotation_name(&self, written: &str) -> Result<String> {
        if let Some(builtin) = builtin_annotation(written) {
            return Ok(builtin.to_string());
        }
        if let Some(fqn) = self.declared.get(written) {
            return Ok(fqn.clone());
        }
        if written.contains('.') {
            return Ok(written.to_string());
        }
        Err(TrellisError::config(format!(
            "unknown annotation @{written}: use a built-in name, a type declared in the same file, or a fully-qualified name"
        )))
    }

    fn annotation(&self, decl: &AnnotationDecl) -> Result<AnnotationInstance> {
        let mut instance = AnnotationInstance::new(self.annotation_name(&decl.name)?);
        for (name, value) in &decl.attributes {
            let name = name.clone().unwrap_or_else(|| "value".to_string());
            instance.attributes.insert(name, self.value(value)?);
        }
        Ok(instance)
    }

    fn value(&self, decl: &ValueDecl) -> Result<AnnotationValue> {
        Ok(match decl {
            ValueDecl::Str(s) => AnnotationValue::Str(s.clone()),
            ValueDecl::Int(n) => AnnotationValue::Int(*n),
            ValueDecl::Bool(b) => AnnotationValue::Bool(*b),
            ValueDecl::Name(name) => {
                if let Some(fqn) = self.declared.get(name) {
                    AnnotationValue::Class(fqn.clone())
                } else if name.contains('.') {
                    AnnotationValue::Class(name.clone())
                } else {
                    AnnotationValue::Enum(name.clone())
                }
            }
            ValueDecl::Array(items) => AnnotationValue::Array(
                items
                    .iter()
                    .map(|item| self.value(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            ValueDecl::Annotation(nested) => AnnotationValue::Annotation(self.annotation(nested)?),
        })
    }

    fn annotations(&self, decls: &[AnnotationDecl]) -> Result<Vec<AnnotationInstance>> {
        decls.iter().map(|d| self.annotation(d)).collect()
    }
}

const fn kind_of(keyword: TypeKeyword) -> ClassKind {
    match keyword {
        TypeKeyword::Class => ClassKind::Class,
        TypeKeyword::Interface => ClassKind::Interface,
        TypeKeyword::Annotation => ClassKind::Annotation,
    }
}

fn lower_class(
    class: &ClassDecl,
    outer: Option<(&str, &str, TypeKeyword)>,
    resolver: &NameResolver<'_>,
    resource: &str,
    out: &mut Vec<ClassMetadata>,
) -> Result<()> {
    let fqn = qualified_name(&class.name, outer.map(|(fqn, _, _)| fqn), resolver.package);
    let written = outer.map_or_else(
        || class.name.clone(),
        |(_, outer_written, _)| format!("{outer_written}${}", class.name),
    );
    let kind = kind_of(class.keyword);
    let implicitly_static = kind != ClassKind::Class
        || outer.is_some_and(|(_, _, keyword)| keyword != TypeKeyword::Class);

    let mut meta = ClassMetadata::new(fqn.clone()).with_kind(kind);
    meta.is_abstract = class.has(Modifier::Abstract) || kind != ClassKind::Class;
    meta.is_final = class.has(Modifier::Final);
    meta.is_static = class.has(Modifier::Static) || implicitly_static;
    meta.enclosing_class = outer.map(|(fqn, _, _)| fqn.to_string());
    meta.superclass = class.extends.as_deref().map(|s| resolver.type_name(s));
    meta.interfaces = class
        .implements
        .iter()
        .map(|i| resolver.type_name(i))
        .collect();
    meta.annotations = resolver.annotations(&class.annotations)?;
    meta.methods = class
        .methods
        .iter()
        .map(|m| lower_method(m, &fqn, class.keyword, resolver))
        .collect::<Result<Vec<_>>>()?;
    meta.method_order = MethodOrder::Declared;
    meta.resource = Some(resource.to_string());
    meta.member_classes = class
        .members
        .iter()
        .map(|m| format!("{fqn}${}", m.name))
        .collect();

    out.push(meta);
    for member in &class.members {
        lower_class(
            member,
            Some((&fqn, &written, class.keyword)),
            resolver,
            resource,
            out,
        )?;
    }
    Ok(())
}

fn lower_method(
    method: &MethodDecl,
    declaring_class: &str,
    keyword: TypeKeyword,
    resolver: &NameResolver<'_>,
) -> Result<MethodMetadata> {
    let is_default = method.has(Modifier::Default);
    let is_static = method.has(Modifier::Static);
    let mut meta = MethodMetadata::new(declaring_class, method.name.clone());
    meta.return_type = method.return_type.as_deref().map(|r| resolver.type_name(r));
    meta.annotations = resolver.annotations(&method.annotations)?;
    meta.is_static = is_static;
    meta.is_final = method.has(Modifier::Final);
    meta.is_private = method.has(Modifier::Private);
    meta.is_default = is_default;
    meta.is_abstract = method.has(Modifier::Abstract)
        || (keyword == TypeKeyword::Interface && !is_default && !is_static);
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use trellis_common::constants::{BEAN, COMPONENT_SCAN, CONFIGURATION, FILTER, IMPORT};
    use trellis_core::source::MetadataSource;

    use super::*;

    const APP: &str = r#"
package com.example

annotation EnableThing {}

@Configuration
@EnableThing
@Import([Other, com.lib.Selector])
class AppConfig extends Base implements Api {
    @Bean method service: Service
    @Configuration static class Nested {}
    class Inner {}
}

class Other {}
class Base {}
interface Api {
    default method hello
    method abstractOne
}
"#;

    #[test]
    fn names_are_qualified_with_package_and_nesting() {
        let classes = load_str(APP, "app.tcd").expect("should load");
        let names: Vec<_> = classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "com.example.EnableThing",
                "com.example.AppConfig",
                "com.example.AppConfig$Nested",
                "com.example.AppConfig$Inner",
                "com.example.Other",
                "com.example.Base",
                "com.example.Api",
            ]
        );
    }

    #[test]
    fn annotations_and_references_resolve() {
        let classes = load_str(APP, "app.tcd").expect("should load");
        let app = &classes[1];
        assert_eq!(app.annotations[0].type_name, CONFIGURATION);
        assert_eq!(app.annotations[1].type_name, "com.example.EnableThing");
        let import = app.direct_annotation(IMPORT).expect("import present");
        assert_eq!(
            import.attributes.class_names("value"),
            vec!["com.example.Other", "com.lib.Selector"]
        );
        assert_eq!(app.superclass.as_deref(), Some("com.example.Base"));
        assert_eq!(app.interfaces, vec!["com.example.Api"]);
        assert_eq!(app.methods[0].annotations[0].type_name, BEAN);
        assert_eq!(app.methods[0].return_type.as_deref(), Some("com.example.Service"));
        assert_eq!(
            app.member_classes,
            vec!["com.example.AppConfig$Nested", "com.example.AppConfig$Inner"]
        );
        assert_eq!(app.resource.as_deref(), Some("app.tcd"));
    }

    #[test]
    fn nested_static_flags_and_interface_methods() {
        let classes = load_str(APP, "app.tcd").expect("should load");
        let nested = &classes[2];
        let inner = &classes[3];
        assert!(nested.is_independent());
        assert!(!inner.is_independent());
        assert_eq!(inner.enclosing_class.as_deref(), Some("com.example.AppConfig"));

        let api = &classes[6];
        assert!(api.is_interface());
        assert!(api.methods[0].is_default);
        assert!(!api.methods[0].is_abstract);
        assert!(api.methods[1].is_abstract);
    }

    #[test]
    fn enum_values_and_nested_annotations() {
        let src = r#"@ComponentScan(value = "com.a", excludeFilters = [@Filter(type = REGEX, pattern = ".*Test")]) class Scan {}"#;
        let classes = load_str(src, "scan.tcd").expect("should load");
        let scan = classes[0].direct_annotation(COMPONENT_SCAN).expect("scan");
        let filters = scan.attributes.annotations("excludeFilters");
        assert_eq!(filters[0].type_name, FILTER);
        assert_eq!(
            filters[0].attributes.get("type"),
            Some(&AnnotationValue::Enum("REGEX".into()))
        );
    }

    #[test]
    fn unknown_bare_annotation_is_an_error() {
        let err = load_str("@Mystery class X {}", "x.tcd").unwrap_err();
        assert!(err.to_string().contains("unknown annotation @Mystery"));
    }

    #[test]
    fn index_rejects_duplicates_across_sources() {
        let err = index_from_sources([("a.tcd", "class com.a.X {}"), ("b.tcd", "class com.a.X {}")])
            .unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn index_from_files_includes_builtins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.tcd");
        std::fs::write(&path, "package com.a\n@Configuration class Cfg {}").expect("write");
        let index = index_from_files(&[path]).expect("index");
        assert!(index.read("com.a.Cfg").is_ok());
        assert!(index.read(CONFIGURATION).is_ok());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_file(Path::new("/definitely/not/here.tcd")).unwrap_err();
        assert!(matches!(err, TrellisError::Io { .. }));
    }
}
