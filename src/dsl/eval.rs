//! Evaluator for the rule DSL AST.

use std::cmp::Ordering;
use thiserror::Error;

use super::ast::{Comparator, Connective, Node};
use super::value::{Number, Record, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("unsupported comparator '{comparator}' for field '{field}': ordering needs numbers, got {actual} and {expected}")]
    UnsupportedComparator {
        field: String,
        comparator: String,
        actual: &'static str,
        expected: &'static str,
    },
}

/// Evaluate an AST against a record.
///
/// AND stops at the first false child and OR at the first true one, so a
/// missing field after the deciding child is never looked up.
pub fn evaluate(ast: &Node, record: &Record) -> Result<bool, EvalError> {
    match ast {
        Node::Operand {
            field,
            comparator,
            literal,
        } => {
            let actual = record
                .get(field)
                .ok_or_else(|| EvalError::FieldNotFound(field.clone()))?;
            compare(field, *comparator, actual, literal)
        }

        Node::Operator {
            connective: Connective::And,
            children,
        } => {
            for child in children {
                if !evaluate(child, record)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }

        Node::Operator {
            connective: Connective::Or,
            children,
        } => {
            for child in children {
                if evaluate(child, record)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Apply a comparator to a record value and a literal.
fn compare(
    field: &str,
    comparator: Comparator,
    actual: &Value,
    expected: &Value,
) -> Result<bool, EvalError> {
    if let (Some(left), Some(right)) = (actual.as_number(), expected.as_number()) {
        let ordering = compare_numbers(left, right);
        return Ok(match comparator {
            Comparator::Eq => ordering == Some(Ordering::Equal),
            Comparator::Gt => ordering == Some(Ordering::Greater),
            Comparator::Lt => ordering == Some(Ordering::Less),
        });
    }

    match comparator {
        Comparator::Eq => Ok(actual.as_text() == expected.as_text()),
        Comparator::Gt | Comparator::Lt => Err(EvalError::UnsupportedComparator {
            field: field.to_string(),
            comparator: comparator.to_string(),
            actual: actual.type_name(),
            expected: expected.type_name(),
        }),
    }
}

/// Integers compare exactly; any float widens both sides to f64.
fn compare_numbers(left: Number, right: Number) -> Option<Ordering> {
    match (left, right) {
        (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
        (Number::Int(a), Number::Float(b)) => (a as f64).partial_cmp(&b),
        (Number::Float(a), Number::Int(b)) => a.partial_cmp(&(b as f64)),
        (Number::Float(a), Number::Float(b)) => a.partial_cmp(&b),
    }
}
