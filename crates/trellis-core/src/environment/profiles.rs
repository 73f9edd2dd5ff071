//! Profile expressions: `prod`, `!test`, `prod & cloud`, `(a | b) & !c`.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{map, value},
    multi::many0,
    sequence::delimited,
};
use trellis_common::error::{Result, TrellisError};

/// A parsed profile predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profiles {
    /// A single profile name.
    Name(String),
    /// Negation.
    Not(Box<Profiles>),
    /// All operands must match.
    And(Vec<Profiles>),
    /// Any operand must match.
    Or(Vec<Profiles>),
}

impl Profiles {
    /// Parses several expressions, any of which may match.
    ///
    /// # Errors
    ///
    /// Returns an error for empty or malformed expressions.
    pub fn parse(expressions: &[impl AsRef<str>]) -> Result<Self> {
        if expressions.is_empty() {
            return Err(TrellisError::config("must specify at least one profile expression"));
        }
        let parsed = expressions
            .iter()
            .map(|e| parse_expression(e.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::Or(parsed))
    }

    /// Evaluates the predicate against the active-profile check.
    pub fn matches(&self, is_active: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Self::Name(name) => is_active(name),
            Self::Not(inner) => !inner.matches(is_active),
            Self::And(items) => items.iter().all(|p| p.matches(is_active)),
            Self::Or(items) => items.iter().any(|p| p.matches(is_active)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn is_name_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '!' | '&' | '|' | '(' | ')')
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Not, char('!')),
        value(Token::And, char('&')),
        value(Token::Or, char('|')),
        value(Token::Open, char('(')),
        value(Token::Close, char(')')),
        map(take_while1(is_name_char), |name: &str| Token::Name(name.to_string())),
    ))
    .parse(input)
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let malformed =
        || TrellisError::config(format!("malformed profile expression [{expression}]"));
    let (rest, tokens) = many0(delimited(multispace0, token, multispace0))
        .parse(expression)
        .map_err(|_| malformed())?;
    if !rest.trim().is_empty() {
        return Err(malformed());
    }
    Ok(tokens)
}

fn parse_expression(expression: &str) -> Result<Profiles> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(TrellisError::config(format!(
            "invalid profile expression [{expression}]: must contain text"
        )));
    }
    let mut parser = ExpressionParser {
        tokens: &tokens,
        pos: 0,
        expression,
    };
    let parsed = parser.expr()?;
    if parser.pos != tokens.len() {
        return Err(parser.malformed());
    }
    Ok(parsed)
}

struct ExpressionParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    expression: &'a str,
}

impl ExpressionParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn malformed(&self) -> TrellisError {
        TrellisError::config(format!("malformed profile expression [{}]", self.expression))
    }

    fn expr(&mut self) -> Result<Profiles> {
        let first = self.unary()?;
        let operator = match self.peek() {
            Some(Token::And) => Token::And,
            Some(Token::Or) => Token::Or,
            _ => return Ok(first),
        };
        let mut operands = vec![first];
        while let Some(token) = self.peek() {
            if *token == operator {
                self.pos += 1;
                operands.push(self.unary()?);
            } else if matches!(token, Token::And | Token::Or) {
                return Err(self.malformed());
            } else {
                break;
            }
        }
        Ok(if operator == Token::And {
            Profiles::And(operands)
        } else {
            Profiles::Or(operands)
        })
    }

    fn unary(&mut self) -> Result<Profiles> {
        let token = self.peek().cloned().ok_or_else(|| self.malformed())?;
        self.pos += 1;
        match token {
            Token::Not => Ok(Profiles::Not(Box::new(self.unary()?))),
            Token::Open => {
                let inner = self.expr()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(self.malformed());
                }
                self.pos += 1;
                Ok(inner)
            }
            Token::Name(name) => Ok(Profiles::Name(name)),
            Token::And | Token::Or | Token::Close => Err(self.malformed()),
        }
    }
}
