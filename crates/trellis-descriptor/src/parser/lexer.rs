//! Tokenization of `.tcd` source text using `nom`.
//!
//! Produces a stream of [`Token`]s from raw input for the parser to consume.
//! Whitespace and `//` line comments are discarded between tokens.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace1, not_line_ending},
    combinator::{opt, recognize, value},
    multi::many0,
    sequence::preceded,
};
use trellis_common::error::{Result, TrellisError};

/// A token in the `.tcd` language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `package` keyword.
    Package,
    /// `class` keyword.
    Class,
    /// `interface` keyword.
    Interface,
    /// `annotation` keyword.
    Annotation,
    /// `extends` keyword.
    Extends,
    /// `implements` keyword.
    Implements,
    /// `method` keyword.
    Method,
    /// `abstract` modifier.
    Abstract,
    /// `final` modifier.
    Final,
    /// `static` modifier.
    Static,
    /// `private` modifier.
    Private,
    /// `default` modifier.
    Default,
    /// Boolean literal `true`.
    True,
    /// Boolean literal `false`.
    False,
    /// A possibly dotted name (`Config`, `com.example.Config`, `TARGET_CLASS`).
    Identifier(String),
    /// A double-quoted string literal.
    StringLiteral(String),
    /// An integer literal.
    Integer(i64),
    /// `@` annotation marker.
    At,
    /// `(` opening parenthesis.
    ParenOpen,
    /// `)` closing parenthesis.
    ParenClose,
    /// `{` opening brace.
    BraceOpen,
    /// `}` closing brace.
    BraceClose,
    /// `[` opening bracket.
    BracketOpen,
    /// `]` closing bracket.
    BracketClose,
    /// `=` assignment.
    Equals,
    /// `,` comma separator.
    Comma,
    /// `:` return-type separator.
    Colon,
}

/// Skippable items: whitespace or line comments.
fn skip_trivia(input: &str) -> IResult<&str, ()> {
    let comment = value((), preceded(tag("//"), not_line_ending));
    let ws = value((), multispace1);
    let (input, _) = many0(alt((ws, comment))).parse(input)?;
    Ok((input, ()))
}

/// Parses a double-quoted string literal with basic escape support.
fn string_literal(input: &str) -> IResult<&str, Token> {
    let (input, _) = char('"')(input)?;
    let mut result = String::new();
    let mut chars = input.char_indices();
    loop {
        match chars.next() {
            Some((idx, '"')) => {
                let remaining = &input[idx + 1..];
                return Ok((remaining, Token::StringLiteral(result)));
            }
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => result.push('\n'),
                Some((_, 't')) => result.push('\t'),
                Some((_, '\\')) => result.push('\\'),
                Some((_, '"')) => result.push('"'),
                Some((_, c)) => {
                    result.push('\\');
                    result.push(c);
                }
                None => {
                    return Err(nom::Err::Failure(nom::error::Error::new(
                        input,
                        nom::error::ErrorKind::Char,
                    )));
                }
            },
            Some((_, c)) => result.push(c),
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Char,
                )));
            }
        }
    }
}

/// Parses an integer literal with an optional leading minus.
fn integer_literal(input: &str) -> IResult<&str, Token> {
    let (rest, digits) = recognize((opt(char('-')), digit1)).parse(input)?;
    let val: i64 = digits.parse().map_err(|_| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
    })?;
    Ok((rest, Token::Integer(val)))
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

const fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.'
}

/// Parses an identifier or keyword.
fn identifier_or_keyword(input: &str) -> IResult<&str, Token> {
    let (input, word) =
        recognize((take_while1(is_ident_start), take_while(is_ident_continue))).parse(input)?;
    let token = match word {
        "package" => Token::Package,
        "class" => Token::Class,
        "interface" => Token::Interface,
        "annotation" => Token::Annotation,
        "extends" => Token::Extends,
        "implements" => Token::Implements,
        "method" => Token::Method,
        "abstract" => Token::Abstract,
        "final" => Token::Final,
        "static" => Token::Static,
        "private" => Token::Private,
        "default" => Token::Default,
        "true" => Token::True,
        "false" => Token::False,
        _ => Token::Identifier(word.to_string()),
    };
    Ok((input, token))
}

/// Parses a symbol token.
fn symbol(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::At, char('@')),
        value(Token::ParenOpen, char('(')),
        value(Token::ParenClose, char(')')),
        value(Token::BraceOpen, char('{')),
        value(Token::BraceClose, char('}')),
        value(Token::BracketOpen, char('[')),
        value(Token::BracketClose, char(']')),
        value(Token::Equals, char('=')),
        value(Token::Comma, char(',')),
        value(Token::Colon, char(':')),
    ))
    .parse(input)
}

/// Parses a single token (after trivia has been skipped).
fn single_token(input: &str) -> IResult<&str, Token> {
    alt((
        string_literal,
        symbol,
        integer_literal,
        identifier_or_keyword,
    ))
    .parse(input)
}

/// Tokenizes a `.tcd` source string into a vector of tokens.
///
/// Whitespace and `//` line comments are discarded.
///
/// # Errors
///
/// Returns an error if the input contains characters that cannot be tokenized.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, ()) = skip_trivia(remaining)
            .map_err(|e| TrellisError::config(format!("lexer error skipping whitespace: {e}")))?;
        remaining = rest;

        if remaining.is_empty() {
            break;
        }

        let (rest, token) = single_token(remaining).map_err(|e| {
            let snippet: String = remaining.chars().take(20).collect();
            TrellisError::config(format!("unexpected character at: \"{snippet}\" ({e})"))
        })?;
        tokens.push(token);
        remaining = rest;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_keywords() {
        let tokens = tokenize("package class interface annotation extends implements method")
            .expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Package,
                Token::Class,
                Token::Interface,
                Token::Annotation,
                Token::Extends,
                Token::Implements,
                Token::Method,
            ]
        );
    }

    #[test]
    fn tokenize_modifiers_and_booleans() {
        let tokens =
            tokenize("abstract final static private default true false").expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Abstract,
                Token::Final,
                Token::Static,
                Token::Private,
                Token::Default,
                Token::True,
                Token::False,
            ]
        );
    }

    #[test]
    fn tokenize_symbols() {
        let tokens = tokenize("@ ( ) { } [ ] = , :").expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::At,
                Token::ParenOpen,
                Token::ParenClose,
                Token::BraceOpen,
                Token::BraceClose,
                Token::BracketOpen,
                Token::BracketClose,
                Token::Equals,
                Token::Comma,
                Token::Colon,
            ]
        );
    }

    #[test]
    fn tokenize_dotted_and_nested_names() {
        let tokens = tokenize("com.example.AppConfig Outer$Inner TARGET_CLASS").expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("com.example.AppConfig".into()),
                Token::Identifier("Outer$Inner".into()),
                Token::Identifier("TARGET_CLASS".into()),
            ]
        );
    }

    #[test]
    fn tokenize_string_with_escapes() {
        let tokens = tokenize(r#""line\nnew\ttab\\slash\"quote""#).expect("should tokenize");
        assert_eq!(
            tokens,
            vec![Token::StringLiteral("line\nnew\ttab\\slash\"quote".into())]
        );
    }

    #[test]
    fn tokenize_signed_integers() {
        let tokens = tokenize("8080 -1").expect("should tokenize");
        assert_eq!(tokens, vec![Token::Integer(8080), Token::Integer(-1)]);
    }

    #[test]
    fn tokenize_skips_comments() {
        let input = "class Api // trailing comment\n{ }";
        let tokens = tokenize(input).expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Class,
                Token::Identifier("Api".into()),
                Token::BraceOpen,
                Token::BraceClose,
            ]
        );
    }

    #[test]
    fn tokenize_annotation_with_attributes() {
        let tokens = tokenize(r#"@Scope(value = "prototype")"#).expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::At,
                Token::Identifier("Scope".into()),
                Token::ParenOpen,
                Token::Identifier("value".into()),
                Token::Equals,
                Token::StringLiteral("prototype".into()),
                Token::ParenClose,
            ]
        );
    }

    #[test]
    fn tokenize_empty_and_comment_only_input() {
        assert!(tokenize("").expect("should tokenize").is_empty());
        assert!(tokenize("// nothing\n// here").expect("should tokenize").is_empty());
    }

    #[test]
    fn tokenize_error_on_invalid_char() {
        assert!(tokenize("class #invalid").is_err());
    }

    #[test]
    fn tokenize_error_on_unterminated_string() {
        assert!(tokenize(r#""open"#).is_err());
    }
}
