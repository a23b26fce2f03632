//! Formula tokenizer built on nom.
//!
//! Produces a flat token stream with byte positions so the parser can name
//! the offending token in its errors.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, digit1, multispace0},
    combinator::{opt, recognize, value},
    sequence::pair,
    IResult,
};

use crate::error::{FormulaError, FormulaResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token<'a> {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub position: usize,
    /// Source text of the token.
    pub text: &'a str,
}

/// Splits a formula into tokens, skipping whitespace.
pub(crate) fn tokenize(input: &str) -> FormulaResult<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = input;

    loop {
        if let Ok((after_ws, _)) = ws(rest) {
            rest = after_ws;
        }
        if rest.is_empty() {
            break;
        }

        let position = input.len() - rest.len();
        match token(rest) {
            Ok((next, kind)) => {
                let text = &rest[..rest.len() - next.len()];
                tokens.push(Token {
                    kind,
                    position,
                    text,
                });
                rest = next;
            }
            Err(_) => {
                let found = rest.chars().next().unwrap_or_default();
                return Err(FormulaError::parse(
                    position,
                    format!("unexpected character '{}'", found),
                ));
            }
        }
    }

    Ok(tokens)
}

fn token(input: &str) -> IResult<&str, TokenKind> {
    alt((
        number,
        identifier,
        value(TokenKind::Plus, char('+')),
        value(TokenKind::Minus, char('-')),
        value(TokenKind::Star, char('*')),
        value(TokenKind::Slash, char('/')),
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::Comma, char(',')),
    ))(input)
}

/// Numeric literal: `digits` or `digits.digits`.
fn number(input: &str) -> IResult<&str, TokenKind> {
    let (rest, text) = recognize(pair(digit1, opt(pair(char('.'), digit1))))(input)?;

    // Codes may start with a digit (`2024Total`); leave those to `identifier`.
    if rest.starts_with(is_code_char) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        )));
    }

    match text.parse::<f64>() {
        Ok(number) => Ok((rest, TokenKind::Number(number))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn identifier(input: &str) -> IResult<&str, TokenKind> {
    let (rest, name) = take_while1(is_code_char)(input)?;
    Ok((rest, TokenKind::Ident(name.to_string())))
}

pub(crate) fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Optional whitespace
fn ws(input: &str) -> IResult<&str, &str> {
    multispace0(input)
}
