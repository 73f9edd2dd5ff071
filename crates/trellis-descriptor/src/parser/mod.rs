//! `.tcd` file parser built on `nom`.
//!
//! Transforms raw `.tcd` text into a validated AST through
//! lexing, parsing, and static analysis phases.

pub mod ast;
pub mod lexer;
pub mod validator;

use trellis_common::error::{Result, TrellisError};

use self::ast::{
    AnnotationDecl, ClassDecl, DescriptorFile, MethodDecl, Modifier, TypeKeyword, ValueDecl,
};
use self::lexer::Token;

/// Cursor into a token stream for recursive-descent parsing.
struct TokenCursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    const fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Identifier(s)) => Ok(s.clone()),
            other => Err(parse_err(format!("expected identifier, got {other:?}"))),
        }
    }

    fn expect_token(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(tok) if tok == expected => Ok(()),
            other => Err(parse_err(format!("expected {expected:?}, got {other:?}"))),
        }
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    const fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

fn parse_err(message: String) -> TrellisError {
    TrellisError::config(message)
}

/// Parses a `.tcd` file from its source text.
///
/// # Errors
///
/// Returns an error if the input contains syntax errors or fails validation.
pub fn parse_tcd(input: &str) -> Result<DescriptorFile> {
    tracing::debug!("parsing .tcd input");
    let tokens = lexer::tokenize(input)?;
    let mut cursor = TokenCursor::new(&tokens);
    let file = parse_file(&mut cursor)?;
    validator::validate(&file)?;
    Ok(file)
}

fn parse_file(cursor: &mut TokenCursor<'_>) -> Result<DescriptorFile> {
    let mut file = DescriptorFile::default();
    if cursor.eat(&Token::Package) {
        file.package = Some(cursor.expect_identifier()?);
    }
    while !cursor.at_end() {
        file.classes.push(parse_class(cursor)?);
    }
    Ok(file)
}

fn parse_annotations(cursor: &mut TokenCursor<'_>) -> Result<Vec<AnnotationDecl>> {
    let mut annotations = Vec::new();
    while cursor.peek() == Some(&Token::At) {
        annotations.push(parse_annotation(cursor)?);
    }
    Ok(annotations)
}

fn parse_modifiers(cursor: &mut TokenCursor<'_>) -> Vec<Modifier> {
    let mut modifiers = Vec::new();
    loop {
        let modifier = match cursor.peek() {
            Some(Token::Abstract) => Modifier::Abstract,
            Some(Token::Final) => Modifier::Final,
            Some(Token::Static) => Modifier::Static,
            Some(Token::Private) => Modifier::Private,
            Some(Token::Default) => Modifier::Default,
            _ => return modifiers,
        };
        let _ = cursor.advance();
        modifiers.push(modifier);
    }
}

fn parse_class(cursor: &mut TokenCursor<'_>) -> Result<ClassDecl> {
    let annotations = parse_annotations(cursor)?;
    let modifiers = parse_modifiers(cursor);
    parse_class_body(cursor, annotations, modifiers)
}

fn parse_class_body(
    cursor: &mut TokenCursor<'_>,
    annotations: Vec<AnnotationDecl>,
    modifiers: Vec<Modifier>,
) -> Result<ClassDecl> {
    let keyword = match cursor.advance() {
        Some(Token::Class) => TypeKeyword::Class,
        Some(Token::Interface) => TypeKeyword::Interface,
        Some(Token::Annotation) => TypeKeyword::Annotation,
        other => {
            return Err(parse_err(format!(
                "expected class, interface, or annotation, got {other:?}"
            )));
        }
    };
    let name = cursor.expect_identifier()?;

    let extends = if cursor.eat(&Token::Extends) {
        Some(cursor.expect_identifier()?)
    } else {
        None
    };
    let mut implements = Vec::new();
    if cursor.eat(&Token::Implements) {
        implements.push(cursor.expect_identifier()?);
        while cursor.eat(&Token::Comma) {
            implements.push(cursor.expect_identifier()?);
        }
    }

    cursor.expect_token(&Token::BraceOpen)?;
    let mut decl = ClassDecl {
        annotations,
        modifiers,
        keyword,
        name,
        extends,
        implements,
        ..ClassDecl::default()
    };

    while cursor.peek() != Some(&Token::BraceClose) {
        if cursor.at_end() {
            return Err(parse_err(format!(
                "unexpected end of input inside declaration of {}",
                decl.name
            )));
        }
        let member_annotations = parse_annotations(cursor)?;
        let member_modifiers = parse_modifiers(cursor);
        if cursor.eat(&Token::Method) {
            let name = cursor.expect_identifier()?;
            let return_type = if cursor.eat(&Token::Colon) {
                Some(cursor.expect_identifier()?)
            } else {
                None
            };
            decl.methods.push(MethodDecl {
                annotations: member_annotations,
                modifiers: member_modifiers,
                name,
                return_type,
            });
        } else {
            decl.members.push(parse_class_body(
                cursor,
                member_annotations,
                member_modifiers,
            )?);
        }
    }

    cursor.expect_token(&Token::BraceClose)?;
    Ok(decl)
}

fn parse_annotation(cursor: &mut TokenCursor<'_>) -> Result<AnnotationDecl> {
    cursor.expect_token(&Token::At)?;
    let name = cursor.expect_identifier()?;
    let mut attributes = Vec::new();

    if cursor.eat(&Token::ParenOpen) {
        while cursor.peek() != Some(&Token::ParenClose) {
            if cursor.at_end() {
                return Err(parse_err(format!(
                    "unexpected end of input inside annotation @{name}"
                )));
            }
            let is_named = matches!(cursor.peek(), Some(Token::Identifier(_)))
                && cursor.peek_at(1) == Some(&Token::Equals);
            let attr_name = if is_named {
                let attr = cursor.expect_identifier()?;
                cursor.expect_token(&Token::Equals)?;
                Some(attr)
            } else {
                None
            };
            attributes.push((attr_name, parse_value(cursor)?));
            if !cursor.eat(&Token::Comma) {
                break;
            }
        }
        cursor.expect_token(&Token::ParenClose)?;
    }

    Ok(AnnotationDecl { name, attributes })
}

fn parse_value(cursor: &mut TokenCursor<'_>) -> Result<ValueDecl> {
    if cursor.peek() == Some(&Token::At) {
        return Ok(ValueDecl::Annotation(parse_annotation(cursor)?));
    }
    match cursor.advance() {
        Some(Token::StringLiteral(s)) => Ok(ValueDecl::Str(s.clone())),
        Some(Token::Integer(n)) => Ok(ValueDecl::Int(*n)),
        Some(Token::True) => Ok(ValueDecl::Bool(true)),
        Some(Token::False) => Ok(ValueDecl::Bool(false)),
        Some(Token::Identifier(name)) => Ok(ValueDecl::Name(name.clone())),
        Some(Token::BracketOpen) => {
            let mut items = Vec::new();
            while cursor.peek() != Some(&Token::BracketClose) {
                if cursor.at_end() {
                    return Err(parse_err("unexpected end of input inside array".into()));
                }
                items.push(parse_value(cursor)?);
                if !cursor.eat(&Token::Comma) {
                    break;
                }
            }
            cursor.expect_token(&Token::BracketClose)?;
            Ok(ValueDecl::Array(items))
        }
        other => Err(parse_err(format!("expected attribute value, got {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_input() {
        let file = parse_tcd("").expect("should parse empty input");
        assert!(file.package.is_none());
        assert!(file.classes.is_empty());
    }

    #[test]
    fn parse_package_and_plain_class() {
        let file = parse_tcd("package com.example\nclass Api {}").expect("should parse");
        assert_eq!(file.package.as_deref(), Some("com.example"));
        assert_eq!(file.classes[0].name, "Api");
        assert_eq!(file.classes[0].keyword, TypeKeyword::Class);
    }

    #[test]
    fn parse_configuration_with_bean_methods() {
        let input = r#"
@Configuration(proxyBeanMethods = false)
@Import([com.a.Other, com.a.Selector])
class AppConfig extends com.a.Base implements com.a.Api, com.a.Aware {
    @Bean(name = ["ds", "dataSource"]) method dataSource: com.a.DataSource
    @Bean static method props
    private final method helper
}"#;
        let file = parse_tcd(input).expect("should parse");
        let class = &file.classes[0];
        assert_eq!(class.annotations.len(), 2);
        assert_eq!(class.annotations[0].name, "Configuration");
        assert_eq!(
            class.annotations[0].attributes[0],
            (Some("proxyBeanMethods".into()), ValueDecl::Bool(false))
        );
        assert_eq!(
            class.annotations[1].attributes[0],
            (
                None,
                ValueDecl::Array(vec![
                    ValueDecl::Name("com.a.Other".into()),
                    ValueDecl::Name("com.a.Selector".into()),
                ])
            )
        );
        assert_eq!(class.extends.as_deref(), Some("com.a.Base"));
        assert_eq!(class.implements, vec!["com.a.Api", "com.a.Aware"]);
        assert_eq!(class.methods.len(), 3);
        assert_eq!(class.methods[0].return_type.as_deref(), Some("com.a.DataSource"));
        assert!(class.methods[1].has(Modifier::Static));
        assert!(class.methods[2].has(Modifier::Private));
        assert!(class.methods[2].has(Modifier::Final));
    }

    #[test]
    fn parse_nested_annotations_and_members() {
        let input = r#"
@ComponentScan(basePackages = "com.a", excludeFilters = @Filter(type = REGEX, pattern = ".*Test"))
class Scanning {
    @Configuration static class Inner {}
    interface Callback { default method onEvent }
}"#;
        let file = parse_tcd(input).expect("should parse");
        let class = &file.classes[0];
        let (name, value) = &class.annotations[0].attributes[1];
        assert_eq!(name.as_deref(), Some("excludeFilters"));
        let ValueDecl::Annotation(filter) = value else {
            panic!("expected nested annotation, got {value:?}");
        };
        assert_eq!(filter.name, "Filter");
        assert_eq!(filter.attributes[0].1, ValueDecl::Name("REGEX".into()));
        assert_eq!(class.members.len(), 2);
        assert!(class.members[0].has(Modifier::Static));
        assert_eq!(class.members[1].keyword, TypeKeyword::Interface);
        assert!(class.members[1].methods[0].has(Modifier::Default));
    }

    #[test]
    fn parse_trailing_commas() {
        let file = parse_tcd(r#"@Profile(["a", "b",],) class X {}"#).expect("should parse");
        assert_eq!(
            file.classes[0].annotations[0].attributes[0].1,
            ValueDecl::Array(vec![ValueDecl::Str("a".into()), ValueDecl::Str("b".into())])
        );
    }

    #[test]
    fn parse_error_missing_brace() {
        assert!(parse_tcd("class X {\n method a\n").is_err());
    }

    #[test]
    fn parse_error_bad_declaration_keyword() {
        assert!(parse_tcd("method orphan").is_err());
    }

    #[test]
    fn parse_error_bad_attribute_value() {
        assert!(parse_tcd("@Order(=) class X {}").is_err());
    }
}
