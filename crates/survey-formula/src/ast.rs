//! Abstract Syntax Tree types for operation formulas.

use std::collections::BTreeSet;

/// Arithmetic operators, in the four binary forms the grammar allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOperator {
    /// Addition: `+`
    Add,
    /// Subtraction: `-`
    Subtract,
    /// Multiplication: `*`
    Multiply,
    /// Division: `/`
    Divide,
}

impl BinaryOperator {
    /// The operator's symbol in formula text.
    pub fn symbol(self) -> char {
        match self {
            BinaryOperator::Add => '+',
            BinaryOperator::Subtract => '-',
            BinaryOperator::Multiply => '*',
            BinaryOperator::Divide => '/',
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Add | BinaryOperator::Subtract => 1,
            BinaryOperator::Multiply | BinaryOperator::Divide => 2,
        }
    }
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Aggregate functions callable over a list of codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Aggregate {
    /// `sum(a, b, ...)`
    Sum,
    /// `avg(a, b, ...)`
    Avg,
}

impl Aggregate {
    /// Function name as written in formulas.
    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
        }
    }

    /// Looks up a function by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("sum") {
            Some(Aggregate::Sum)
        } else if name.eq_ignore_ascii_case("avg") {
            Some(Aggregate::Avg)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed operation formula.
///
/// The tree is immutable once built and carries no source positions, so two
/// formulas that differ only in whitespace or redundant parentheses compare
/// equal.
///
/// `Display` renders the canonical serialization: no whitespace and only the
/// parentheses needed to preserve the tree under left-to-right parsing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Formula {
    /// A numeric literal.
    /// Example: `2`, `0.5`
    Literal(f64),

    /// A reference to another data type by code.
    /// Example: `EtabDepDoc`
    Identifier(String),

    /// A binary arithmetic operation.
    /// Example: `EtabDepDoc+DepDTot`
    BinaryOp {
        /// The operator.
        op: BinaryOperator,
        /// Left operand.
        left: Box<Formula>,
        /// Right operand.
        right: Box<Formula>,
    },

    /// An aggregate call over one or more codes.
    /// Example: `sum(codeA,codeB,codeC)`
    FuncCall {
        /// The aggregate function.
        function: Aggregate,
        /// Referenced codes, never empty.
        args: Vec<String>,
    },
}

impl Formula {
    /// Creates a literal node.
    pub fn literal(value: f64) -> Self {
        Formula::Literal(value)
    }

    /// Creates an identifier node.
    pub fn identifier(code: impl Into<String>) -> Self {
        Formula::Identifier(code.into())
    }

    /// Creates a binary operation node.
    pub fn binary(op: BinaryOperator, left: Formula, right: Formula) -> Self {
        Formula::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Creates an addition.
    pub fn add(left: Formula, right: Formula) -> Self {
        Self::binary(BinaryOperator::Add, left, right)
    }

    /// Creates a subtraction.
    pub fn subtract(left: Formula, right: Formula) -> Self {
        Self::binary(BinaryOperator::Subtract, left, right)
    }

    /// Creates a multiplication.
    pub fn multiply(left: Formula, right: Formula) -> Self {
        Self::binary(BinaryOperator::Multiply, left, right)
    }

    /// Creates a division.
    pub fn divide(left: Formula, right: Formula) -> Self {
        Self::binary(BinaryOperator::Divide, left, right)
    }

    /// Creates a `sum(...)` call.
    pub fn sum<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Formula::FuncCall {
            function: Aggregate::Sum,
            args: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates an `avg(...)` call.
    pub fn avg<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Formula::FuncCall {
            function: Aggregate::Avg,
            args: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the set of codes this formula references directly, sorted.
    ///
    /// Nested operations are not followed; that requires the data type
    /// catalog and is done by the validator.
    pub fn references(&self) -> BTreeSet<&str> {
        let mut codes = BTreeSet::new();
        self.collect_references(&mut codes);
        codes
    }

    fn collect_references<'a>(&'a self, codes: &mut BTreeSet<&'a str>) {
        match self {
            Formula::Literal(_) => {}
            Formula::Identifier(code) => {
                codes.insert(code.as_str());
            }
            Formula::BinaryOp { left, right, .. } => {
                left.collect_references(codes);
                right.collect_references(codes);
            }
            Formula::FuncCall { args, .. } => {
                codes.extend(args.iter().map(String::as_str));
            }
        }
    }

    /// Returns true if the formula references no codes at all.
    pub fn is_constant(&self) -> bool {
        self.references().is_empty()
    }

    /// Binding strength of the node when printed; atoms bind tightest.
    fn precedence(&self) -> u8 {
        match self {
            Formula::BinaryOp { op, .. } => op.precedence(),
            _ => u8::MAX,
        }
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Formula::Literal(value) => write!(f, "{}", value),
            Formula::Identifier(code) => f.write_str(code),
            Formula::BinaryOp { op, left, right } => {
                // Left-associative: an equal-precedence right operand keeps its parentheses.
                if left.precedence() < op.precedence() {
                    write!(f, "({})", left)?;
                } else {
                    write!(f, "{}", left)?;
                }
                write!(f, "{}", op)?;
                if right.precedence() <= op.precedence() {
                    write!(f, "({})", right)
                } else {
                    write!(f, "{}", right)
                }
            }
            Formula::FuncCall { function, args } => {
                write!(f, "{}({})", function, args.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_simple_binary() {
        let formula = Formula::add(Formula::identifier("A"), Formula::identifier("B"));
        assert_eq!(formula.to_string(), "A+B");
    }

    #[test]
    fn test_display_keeps_needed_parentheses() {
        let formula = Formula::divide(
            Formula::add(Formula::identifier("EtabDepDoc"), Formula::identifier("DepDTot")),
            Formula::literal(2.0),
        );
        assert_eq!(formula.to_string(), "(EtabDepDoc+DepDTot)/2");
    }

    #[test]
    fn test_display_drops_redundant_parentheses() {
        let formula = Formula::add(
            Formula::multiply(Formula::identifier("A"), Formula::identifier("B")),
            Formula::identifier("C"),
        );
        assert_eq!(formula.to_string(), "A*B+C");
    }

    #[test]
    fn test_display_right_associated_subtraction() {
        let formula = Formula::subtract(
            Formula::identifier("A"),
            Formula::subtract(Formula::identifier("B"), Formula::identifier("C")),
        );
        assert_eq!(formula.to_string(), "A-(B-C)");
    }

    #[test]
    fn test_display_function_call() {
        assert_eq!(Formula::sum(["a", "b", "c"]).to_string(), "sum(a,b,c)");
        assert_eq!(Formula::avg(["a", "b"]).to_string(), "avg(a,b)");
    }

    #[test]
    fn test_display_decimal_literal() {
        assert_eq!(Formula::literal(0.5).to_string(), "0.5");
        assert_eq!(Formula::literal(100.0).to_string(), "100");
    }

    #[test]
    fn test_references_are_sorted_and_deduplicated() {
        let formula = Formula::add(
            Formula::sum(["B", "A"]),
            Formula::multiply(Formula::identifier("A"), Formula::literal(3.0)),
        );
        let refs: Vec<&str> = formula.references().into_iter().collect();
        assert_eq!(refs, vec!["A", "B"]);
    }

    #[test]
    fn test_is_constant() {
        assert!(Formula::add(Formula::literal(1.0), Formula::literal(2.0)).is_constant());
        assert!(!Formula::identifier("A").is_constant());
    }

    #[test]
    fn test_aggregate_from_name() {
        assert_eq!(Aggregate::from_name("sum"), Some(Aggregate::Sum));
        assert_eq!(Aggregate::from_name("AVG"), Some(Aggregate::Avg));
        assert_eq!(Aggregate::from_name("max"), None);
    }

    #[test]
    fn test_operator_precedence() {
        assert!(BinaryOperator::Multiply.precedence() > BinaryOperator::Add.precedence());
        assert_eq!(
            BinaryOperator::Divide.precedence(),
            BinaryOperator::Multiply.precedence()
        );
    }
}
