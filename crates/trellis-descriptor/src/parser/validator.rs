//! Static analysis and validation of the parsed AST.
//!
//! Checks for duplicate declarations, illegal clauses, and conflicting
//! modifiers before any metadata is produced.

use std::collections::HashSet;

use trellis_common::error::{Result, TrellisError};

use super::ast::{ClassDecl, DescriptorFile, Modifier, TypeKeyword};

/// Validates a parsed descriptor file for semantic correctness.
///
/// # Checks performed
///
/// 1. No two declarations share a name within the same scope.
/// 2. Interfaces and annotation types have no `extends` clause.
/// 3. Annotation types declare no methods.
/// 4. No declaration or method is both `abstract` and `final`.
/// 5. Class methods are never `default`.
///
/// # Errors
///
/// Returns an error if any semantic check fails.
pub fn validate(file: &DescriptorFile) -> Result<()> {
    tracing::debug!(classes = file.classes.len(), "validating descriptor file");
    check_duplicates(&file.classes, file.package.as_deref().unwrap_or("<default>"))?;
    for class in &file.classes {
        check_class(class)?;
    }
    Ok(())
}

fn check_duplicates(classes: &[ClassDecl], scope: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for class in classes {
        if !seen.insert(class.name.as_str()) {
            return Err(TrellisError::config(format!(
                "duplicate declaration of \"{}\" in {scope}",
                class.name
            )));
        }
    }
    Ok(())
}

fn check_class(class: &ClassDecl) -> Result<()> {
    if class.keyword != TypeKeyword::Class && class.extends.is_some() {
        return Err(TrellisError::config(format!(
            "\"{}\" is not a class and cannot use extends; list super-interfaces with implements",
            class.name
        )));
    }
    if class.keyword == TypeKeyword::Annotation && !class.methods.is_empty() {
        return Err(TrellisError::config(format!(
            "annotation type \"{}\" cannot declare methods",
            class.name
        )));
    }
    if class.has(Modifier::Abstract) && class.has(Modifier::Final) {
        return Err(TrellisError::config(format!(
            "\"{}\" cannot be both abstract and final",
            class.name
        )));
    }
    for method in &class.methods {
        if method.has(Modifier::Abstract) && method.has(Modifier::Final) {
            return Err(TrellisError::config(format!(
                "method \"{}.{}\" cannot be both abstract and final",
                class.name, method.name
            )));
        }
        if class.keyword == TypeKeyword::Class && method.has(Modifier::Default) {
            return Err(TrellisError::config(format!(
                "method \"{}.{}\" is declared default outside an interface",
                class.name, method.name
            )));
        }
    }
    check_duplicates(&class.members, &class.name)?;
    for member in &class.members {
        check_class(member)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::MethodDecl;

    fn class(name: &str, keyword: TypeKeyword) -> ClassDecl {
        ClassDecl {
            name: name.into(),
            keyword,
            ..ClassDecl::default()
        }
    }

    fn file(classes: Vec<ClassDecl>) -> DescriptorFile {
        DescriptorFile {
            package: Some("com.a".into()),
            classes,
        }
    }

    #[test]
    fn validate_empty_file_succeeds() {
        assert!(validate(&DescriptorFile::default()).is_ok());
    }

    #[test]
    fn validate_duplicate_top_level_fails() {
        let err = validate(&file(vec![
            class("A", TypeKeyword::Class),
            class("A", TypeKeyword::Interface),
        ]))
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("duplicate declaration of \"A\""), "got: {msg}");
    }

    #[test]
    fn validate_duplicate_members_fails() {
        let mut outer = class("Outer", TypeKeyword::Class);
        outer.members = vec![class("In", TypeKeyword::Class), class("In", TypeKeyword::Class)];
        assert!(validate(&file(vec![outer])).is_err());
    }

    #[test]
    fn validate_interface_extends_fails() {
        let mut api = class("Api", TypeKeyword::Interface);
        api.extends = Some("com.a.Base".into());
        let msg = validate(&file(vec![api])).unwrap_err().to_string();
        assert!(msg.contains("cannot use extends"), "got: {msg}");
    }

    #[test]
    fn validate_annotation_methods_fail() {
        let mut ann = class("Enable", TypeKeyword::Annotation);
        ann.methods.push(MethodDecl {
            name: "value".into(),
            ..MethodDecl::default()
        });
        assert!(validate(&file(vec![ann])).is_err());
    }

    #[test]
    fn validate_abstract_final_fails() {
        let mut c = class("C", TypeKeyword::Class);
        c.modifiers = vec![Modifier::Abstract, Modifier::Final];
        assert!(validate(&file(vec![c])).is_err());
    }

    #[test]
    fn validate_default_method_on_class_fails() {
        let mut c = class("C", TypeKeyword::Class);
        c.methods.push(MethodDecl {
            name: "m".into(),
            modifiers: vec![Modifier::Default],
            ..MethodDecl::default()
        });
        assert!(validate(&file(vec![c])).is_err());
    }

    #[test]
    fn validate_default_method_on_interface_succeeds() {
        let mut api = class("Api", TypeKeyword::Interface);
        api.methods.push(MethodDecl {
            name: "m".into(),
            modifiers: vec![Modifier::Default],
            ..MethodDecl::default()
        });
        assert!(validate(&file(vec![api])).is_ok());
    }
}
