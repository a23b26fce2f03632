//! # survey-formula
//!
//! Parser for the formulas attached to *operation* data types of a yearly
//! statistical survey.
//!
//! An operation is a data type whose value is derived from other data types
//! of the same administration entity and survey, e.g. the mean of two
//! expenditure lines. This crate turns the formula text into an immutable
//! [`Formula`] tree; evaluation and cycle checking live in
//! `survey-formula-executor`.
//!
//! ## Usage
//!
//! ```rust
//! use survey_formula::{parse, Formula};
//!
//! let formula = parse("(EtabDepDoc + DepDTot) / 2").unwrap();
//!
//! // Canonical serialization
//! assert_eq!(formula.to_string(), "(EtabDepDoc+DepDTot)/2");
//!
//! // Directly referenced codes
//! let refs: Vec<&str> = formula.references().into_iter().collect();
//! assert_eq!(refs, vec!["DepDTot", "EtabDepDoc"]);
//! ```
//!
//! ## Syntax Quick Reference
//!
//! | Construct | Example |
//! |-----------|---------|
//! | Code | `DepDTot` |
//! | Number | `2`, `0.5` |
//! | Arithmetic | `A + B`, `A - B`, `A * B`, `A / B` |
//! | Grouping | `(A + B) / 2` |
//! | Sum | `sum(codeA, codeB, codeC)` |
//! | Average | `avg(codeA, codeB)` |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod ast;
mod error;
mod lexer;
mod parser;

pub use ast::{Aggregate, BinaryOperator, Formula};
pub use error::{FormulaError, FormulaResult};
pub use parser::{check_charset, parse, parse_with_codes};
