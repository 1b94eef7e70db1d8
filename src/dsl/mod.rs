//! Boolean filter DSL for rule expressions.
//!
//! Syntax:
//!   field = value           - equality (numbers, or text when either side is text)
//!   field > n, field < n    - numeric ordering
//!   'text'                  - quoted literal, no escapes
//!   expr AND expr           - conjunction (keywords are case-insensitive)
//!   expr OR expr            - disjunction
//!   (expr)                  - grouping
//!
//! There is no operator precedence; see `parser` for how mixed runs group.

mod ast;
mod combine;
mod eval;
mod lexer;
mod parser;
mod value;

pub use ast::*;
pub use combine::combine;
pub use eval::{EvalError, evaluate};
pub use parser::{ParseError, parse, validate_syntax};
pub use value::{Record, Value, normalize_record};
