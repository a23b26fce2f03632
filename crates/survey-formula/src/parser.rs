//! Recursive-descent formula parser.
//!
//! Grammar (left-to-right, standard precedence):
//!
//! ```text
//! expression := term (('+' | '-') term)*
//! term       := factor (('*' | '/') factor)*
//! factor     := number | identifier | '(' expression ')' | funcCall
//! funcCall   := ('sum' | 'avg') '(' identifier (',' identifier)* ')'
//! ```

use crate::ast::{Aggregate, BinaryOperator, Formula};
use crate::error::{FormulaError, FormulaResult};
use crate::lexer::{is_code_char, tokenize, Token, TokenKind};

/// Parse a formula string.
///
/// Only syntax is checked; identifiers are accepted as-is. Use
/// [`parse_with_codes`] to also require that every identifier names an
/// existing data type.
///
/// # Examples
///
/// ```rust
/// use survey_formula::{parse, Formula};
///
/// let formula = parse("(EtabDepDoc+DepDTot)/2").unwrap();
/// assert_eq!(formula.to_string(), "(EtabDepDoc+DepDTot)/2");
///
/// let formula = parse("sum(codeA, codeB, codeC)").unwrap();
/// assert!(matches!(formula, Formula::FuncCall { .. }));
/// ```
pub fn parse(input: &str) -> FormulaResult<Formula> {
    parse_inner(input, None)
}

/// Parse a formula string, rejecting identifiers for which `is_known`
/// returns false with [`FormulaError::UnknownCode`].
///
/// Syntax errors take priority: an unknown code is only reported for a
/// formula that is otherwise well formed up to that identifier.
///
/// A code made only of digits cannot be told apart from a number, so a
/// numeric token whose text is a known code is a [`FormulaError::ParseError`].
///
/// # Examples
///
/// ```rust
/// use survey_formula::{parse_with_codes, FormulaError};
///
/// let known = ["A", "B"];
/// assert!(parse_with_codes("A+B", |code| known.contains(&code)).is_ok());
///
/// let err = parse_with_codes("A+C", |code| known.contains(&code)).unwrap_err();
/// assert!(matches!(err, FormulaError::UnknownCode { .. }));
/// ```
pub fn parse_with_codes<F>(input: &str, is_known: F) -> FormulaResult<Formula>
where
    F: Fn(&str) -> bool,
{
    parse_inner(input, Some(&is_known))
}

/// Boundary check on raw formula text, run before parsing on the write path.
///
/// Accepts ASCII letters, digits, `_`, the four operators, parentheses,
/// commas, decimal points and whitespace.
pub fn check_charset(input: &str) -> FormulaResult<()> {
    for (position, character) in input.char_indices() {
        let allowed = is_code_char(character)
            || matches!(character, '+' | '-' | '*' | '/' | '(' | ')' | ',' | '.')
            || character.is_ascii_whitespace();
        if !allowed {
            return Err(FormulaError::InvalidCharacter {
                position,
                character,
            });
        }
    }
    Ok(())
}

fn parse_inner(input: &str, is_known: Option<&dyn Fn(&str) -> bool>) -> FormulaResult<Formula> {
    if input.trim().is_empty() {
        return Err(FormulaError::EmptyExpression);
    }

    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        end: input.len(),
        is_known,
    };

    let formula = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(FormulaError::parse(
            token.position,
            format!("unexpected '{}' after complete expression", token.text),
        ));
    }
    Ok(formula)
}

struct Parser<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
    /// Input length, reported as the position of end-of-input errors.
    end: usize,
    is_known: Option<&'t dyn Fn(&str) -> bool>,
}

impl<'t, 'a> Parser<'t, 'a> {
    fn peek(&self) -> Option<&'t Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'t Token<'a>> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        self.peek().is_some_and(|t| &t.kind == kind)
    }

    /// Text of the previous token, for "after '+'" style messages.
    fn previous_text(&self) -> Option<&'a str> {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.text)
    }

    fn end_of_input(&self, expected: &str) -> FormulaError {
        let message = match self.previous_text() {
            Some(prev) => format!("expected {} after '{}', found end of formula", expected, prev),
            None => format!("expected {}, found end of formula", expected),
        };
        FormulaError::parse(self.end, message)
    }

    fn unexpected(&self, token: &Token<'_>, expected: &str) -> FormulaError {
        FormulaError::parse(
            token.position,
            format!("expected {}, found '{}'", expected, token.text),
        )
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> FormulaResult<&'t Token<'a>> {
        match self.advance() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(self.unexpected(token, expected)),
            None => Err(self.end_of_input(expected)),
        }
    }

    fn expression(&mut self) -> FormulaResult<Formula> {
        let mut left = self.term()?;
        while let Some(op) = self.peek().and_then(|t| additive(&t.kind)) {
            self.pos += 1;
            let right = self.term()?;
            left = Formula::binary(op, left, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> FormulaResult<Formula> {
        let mut left = self.factor()?;
        while let Some(op) = self.peek().and_then(|t| multiplicative(&t.kind)) {
            self.pos += 1;
            let right = self.factor()?;
            left = Formula::binary(op, left, right);
        }
        Ok(left)
    }

    fn factor(&mut self) -> FormulaResult<Formula> {
        let token = match self.advance() {
            Some(token) => token,
            None => return Err(self.end_of_input("an operand")),
        };

        match &token.kind {
            TokenKind::Number(value) => {
                self.check_not_code(token)?;
                Ok(Formula::Literal(*value))
            }
            TokenKind::Ident(name) if self.peek_is(&TokenKind::LParen) => {
                let function = Aggregate::from_name(name).ok_or_else(|| {
                    FormulaError::parse(
                        token.position,
                        format!("unknown function '{}', expected sum or avg", name),
                    )
                })?;
                self.function_call(function, token)
            }
            TokenKind::Ident(name) => {
                self.check_known(name, token.position)?;
                Ok(Formula::Identifier(name.clone()))
            }
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.unexpected(token, "an operand")),
        }
    }

    fn function_call(&mut self, function: Aggregate, name: &Token<'_>) -> FormulaResult<Formula> {
        self.expect(TokenKind::LParen, "'('")?;

        if let Some(token) = self.peek() {
            if token.kind == TokenKind::RParen {
                return Err(FormulaError::parse(
                    name.position,
                    format!("{}() requires at least one argument", function),
                ));
            }
        }

        let mut args = vec![self.argument()?];
        loop {
            match self.advance() {
                Some(token) if token.kind == TokenKind::Comma => args.push(self.argument()?),
                Some(token) if token.kind == TokenKind::RParen => break,
                Some(token) => return Err(self.unexpected(token, "',' or ')'")),
                None => return Err(self.end_of_input("')'")),
            }
        }

        Ok(Formula::FuncCall { function, args })
    }

    fn argument(&mut self) -> FormulaResult<String> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Ident(name),
                position,
                ..
            }) => {
                self.check_known(name, *position)?;
                Ok(name.clone())
            }
            Some(token) => {
                self.check_not_code(token)?;
                Err(self.unexpected(token, "a data type code"))
            }
            None => Err(self.end_of_input("a data type code")),
        }
    }

    fn check_not_code(&self, token: &Token<'_>) -> FormulaResult<()> {
        match self.is_known {
            Some(is_known) if is_known(token.text) => Err(FormulaError::parse(
                token.position,
                format!(
                    "ambiguous '{}': data type code that reads as a number",
                    token.text
                ),
            )),
            _ => Ok(()),
        }
    }

    fn check_known(&self, code: &str, position: usize) -> FormulaResult<()> {
        match self.is_known {
            Some(is_known) if !is_known(code) => Err(FormulaError::UnknownCode {
                code: code.to_string(),
                position,
            }),
            _ => Ok(()),
        }
    }
}

fn additive(kind: &TokenKind) -> Option<BinaryOperator> {
    match kind {
        TokenKind::Plus => Some(BinaryOperator::Add),
        TokenKind::Minus => Some(BinaryOperator::Subtract),
        _ => None,
    }
}

fn multiplicative(kind: &TokenKind) -> Option<BinaryOperator> {
    match kind {
        TokenKind::Star => Some(BinaryOperator::Multiply),
        TokenKind::Slash => Some(BinaryOperator::Divide),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Operands
    // ========================================================================

    mod operands {
        use super::*;

        #[test]
        fn test_identifier() {
            assert_eq!(parse("EtabDepDoc").unwrap(), Formula::identifier("EtabDepDoc"));
        }

        #[test]
        fn test_integer_literal() {
            assert_eq!(parse("42").unwrap(), Formula::literal(42.0));
        }

        #[test]
        fn test_decimal_literal() {
            assert_eq!(parse("0.75").unwrap(), Formula::literal(0.75));
        }

        #[test]
        fn test_parenthesized_operand() {
            assert_eq!(parse("((A))").unwrap(), Formula::identifier("A"));
        }

        #[test]
        fn test_code_with_underscore_and_digits() {
            assert_eq!(parse("Dep_2_Tot").unwrap(), Formula::identifier("Dep_2_Tot"));
        }
    }

    // ========================================================================
    // Precedence and associativity
    // ========================================================================

    mod precedence {
        use super::*;

        #[test]
        fn test_multiplication_binds_tighter() {
            let expected = Formula::add(
                Formula::identifier("A"),
                Formula::multiply(Formula::identifier("B"), Formula::identifier("C")),
            );
            assert_eq!(parse("A + B * C").unwrap(), expected);
        }

        #[test]
        fn test_parentheses_change_precedence() {
            let expected = Formula::divide(
                Formula::add(Formula::identifier("EtabDepDoc"), Formula::identifier("DepDTot")),
                Formula::literal(2.0),
            );
            assert_eq!(parse("(EtabDepDoc+DepDTot)/2").unwrap(), expected);
        }

        #[test]
        fn test_subtraction_is_left_associative() {
            let expected = Formula::subtract(
                Formula::subtract(Formula::identifier("A"), Formula::identifier("B")),
                Formula::identifier("C"),
            );
            assert_eq!(parse("A-B-C").unwrap(), expected);
        }

        #[test]
        fn test_division_is_left_associative() {
            let expected = Formula::divide(
                Formula::divide(Formula::identifier("A"), Formula::identifier("B")),
                Formula::identifier("C"),
            );
            assert_eq!(parse("A/B/C").unwrap(), expected);
        }

        #[test]
        fn test_mixed_chain() {
            let formula = parse("A*2+B/4-C").unwrap();
            assert_eq!(formula.to_string(), "A*2+B/4-C");
        }
    }

    // ========================================================================
    // Aggregate functions
    // ========================================================================

    mod functions {
        use super::*;

        #[test]
        fn test_sum() {
            assert_eq!(
                parse("sum(codeA,codeB,codeC)").unwrap(),
                Formula::sum(["codeA", "codeB", "codeC"])
            );
        }

        #[test]
        fn test_avg_with_whitespace() {
            assert_eq!(
                parse("avg( codeA , codeB )").unwrap(),
                Formula::avg(["codeA", "codeB"])
            );
        }

        #[test]
        fn test_single_argument() {
            assert_eq!(parse("sum(A)").unwrap(), Formula::sum(["A"]));
        }

        #[test]
        fn test_function_name_case_insensitive() {
            assert_eq!(parse("SUM(A,B)").unwrap(), Formula::sum(["A", "B"]));
        }

        #[test]
        fn test_function_in_expression() {
            let expected = Formula::divide(Formula::sum(["A", "B"]), Formula::identifier("C"));
            assert_eq!(parse("sum(A,B)/C").unwrap(), expected);
        }

        #[test]
        fn test_code_named_like_function_without_call() {
            assert_eq!(parse("sum+1").unwrap().to_string(), "sum+1");
        }
    }

    // ========================================================================
    // Error handling
    // ========================================================================

    mod error_handling {
        use super::*;

        fn parse_error(input: &str) -> (usize, String) {
            match parse(input) {
                Err(FormulaError::ParseError { position, message }) => (position, message),
                other => panic!("Expected ParseError for {:?}, got {:?}", input, other),
            }
        }

        #[test]
        fn test_empty_input() {
            assert_eq!(parse(""), Err(FormulaError::EmptyExpression));
        }

        #[test]
        fn test_whitespace_only() {
            assert_eq!(parse("   "), Err(FormulaError::EmptyExpression));
        }

        #[test]
        fn test_unclosed_parenthesis() {
            let (position, message) = parse_error("(A+B");
            assert_eq!(position, 4);
            assert!(message.contains("')'"), "message: {}", message);
        }

        #[test]
        fn test_unopened_parenthesis() {
            let (position, message) = parse_error("A+B)");
            assert_eq!(position, 3);
            assert!(message.contains("')'"), "message: {}", message);
        }

        #[test]
        fn test_dangling_operator() {
            let (position, message) = parse_error("A+");
            assert_eq!(position, 2);
            assert!(message.contains("after '+'"), "message: {}", message);
        }

        #[test]
        fn test_leading_operator() {
            let (position, _) = parse_error("*A");
            assert_eq!(position, 0);
        }

        #[test]
        fn test_double_operator() {
            let (position, message) = parse_error("A+*B");
            assert_eq!(position, 2);
            assert!(message.contains("'*'"), "message: {}", message);
        }

        #[test]
        fn test_empty_function_arguments() {
            let (_, message) = parse_error("sum()");
            assert!(message.contains("at least one argument"), "message: {}", message);
        }

        #[test]
        fn test_trailing_comma_in_arguments() {
            assert!(parse("avg(A,)").is_err());
        }

        #[test]
        fn test_expression_as_function_argument() {
            let (_, message) = parse_error("sum(A+B)");
            assert!(message.contains("',' or ')'"), "message: {}", message);
        }

        #[test]
        fn test_unknown_function() {
            let (_, message) = parse_error("max(A,B)");
            assert!(message.contains("unknown function 'max'"), "message: {}", message);
        }

        #[test]
        fn test_adjacent_operands() {
            let (position, _) = parse_error("A B");
            assert_eq!(position, 2);
        }

        #[test]
        fn test_empty_parentheses() {
            assert!(parse("()").is_err());
        }
    }

    // ========================================================================
    // Known-code checking
    // ========================================================================

    mod known_codes {
        use super::*;

        const KNOWN: [&str; 3] = ["A", "B", "C"];

        fn is_known(code: &str) -> bool {
            KNOWN.contains(&code)
        }

        #[test]
        fn test_all_codes_known() {
            assert!(parse_with_codes("(A+B)/C", is_known).is_ok());
        }

        #[test]
        fn test_unknown_identifier() {
            assert_eq!(
                parse_with_codes("A+Missing", is_known),
                Err(FormulaError::UnknownCode {
                    code: "Missing".to_string(),
                    position: 2,
                })
            );
        }

        #[test]
        fn test_unknown_function_argument() {
            let err = parse_with_codes("sum(A, Nope)", is_known).unwrap_err();
            assert!(matches!(err, FormulaError::UnknownCode { ref code, .. } if code == "Nope"));
        }

        #[test]
        fn test_function_names_are_not_codes() {
            assert!(parse_with_codes("avg(A,B)", is_known).is_ok());
        }

        #[test]
        fn test_digit_only_code_is_ambiguous() {
            let known = |code: &str| code == "A" || code == "123";

            match parse_with_codes("A+123", known) {
                Err(FormulaError::ParseError { position, message }) => {
                    assert_eq!(position, 2);
                    assert!(message.contains("ambiguous '123'"), "message: {}", message);
                }
                other => panic!("expected ParseError, got {:?}", other),
            }
            assert!(matches!(
                parse_with_codes("sum(A,123)", known),
                Err(FormulaError::ParseError { ref message, .. }) if message.contains("ambiguous")
            ));
        }

        #[test]
        fn test_number_that_is_not_a_code() {
            let formula = parse_with_codes("A*100", is_known).unwrap();
            assert_eq!(formula.to_string(), "A*100");
        }
    }

    // ========================================================================
    // Boundary character check
    // ========================================================================

    mod charset {
        use super::*;

        #[test]
        fn test_wire_examples_pass() {
            assert!(check_charset("(EtabDepDoc+DepDTot)/2").is_ok());
            assert!(check_charset("sum(codeA,codeB,codeC)").is_ok());
            assert!(check_charset("avg(codeA, codeB) * 0.5").is_ok());
        }

        #[test]
        fn test_rejects_non_ascii() {
            assert_eq!(
                check_charset("A+é"),
                Err(FormulaError::InvalidCharacter {
                    position: 2,
                    character: 'é',
                })
            );
        }

        #[test]
        fn test_rejects_script_characters() {
            assert!(check_charset("A;B").is_err());
            assert!(check_charset("A$B").is_err());
        }
    }

    // ========================================================================
    // Display/roundtrip tests
    // ========================================================================

    mod display_roundtrip {
        use super::*;

        fn roundtrip(input: &str) -> String {
            parse(input).unwrap().to_string()
        }

        #[test]
        fn test_canonical_form_is_compact() {
            assert_eq!(roundtrip("( A + B ) / 2"), "(A+B)/2");
        }

        #[test]
        fn test_redundant_parentheses_dropped() {
            assert_eq!(roundtrip("(A*B)+(C)"), "A*B+C");
        }

        #[test]
        fn test_reparse_canonical_form() {
            for input in ["A-(B-C)", "A/(B*C)", "(A+B)*(C-D)", "sum(A,B)/avg(C,D)+1.5"] {
                let first = parse(input).unwrap();
                let second = parse(&first.to_string()).unwrap();
                assert_eq!(first, second, "input: {}", input);
            }
        }
    }
}
