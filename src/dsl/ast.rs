//! AST types for the rule DSL.

use super::value::Value;
use std::fmt;

/// A parsed rule expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Leaf comparison: `age > 18`, `country = 'US'`
    Operand {
        field: String,
        comparator: Comparator,
        literal: Value,
    },

    /// Run of operands joined by the same connective. Always has at least
    /// two children.
    Operator {
        connective: Connective,
        children: Vec<Node>,
    },
}

/// Comparison operator. Only the three single-character forms exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq, // =
    Gt, // >
    Lt, // <
}

/// Boolean connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Comparator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Comparator::Eq),
            ">" => Some(Comparator::Gt),
            "<" => Some(Comparator::Lt),
            _ => None,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Eq => write!(f, "="),
            Comparator::Gt => write!(f, ">"),
            Comparator::Lt => write!(f, "<"),
        }
    }
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connective::And => write!(f, "AND"),
            Connective::Or => write!(f, "OR"),
        }
    }
}

impl Node {
    /// Number of operand leaves in the tree.
    pub fn operand_count(&self) -> usize {
        match self {
            Node::Operand { .. } => 1,
            Node::Operator { children, .. } => children.iter().map(Node::operand_count).sum(),
        }
    }

    /// Field names referenced by the tree, in first-seen order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Node::Operand { field, .. } => {
                if !out.contains(&field.as_str()) {
                    out.push(field);
                }
            }
            Node::Operator { children, .. } => {
                for child in children {
                    child.collect_fields(out);
                }
            }
        }
    }
}

/// Canonical source form. Nested operator children are parenthesized so the
/// text parses back to the same tree.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Operand {
                field,
                comparator,
                literal,
            } => write!(f, "{} {} {}", field, comparator, literal),
            Node::Operator {
                connective,
                children,
            } => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", connective)?;
                    }
                    match child {
                        Node::Operator { .. } => write!(f, "({})", child)?,
                        Node::Operand { .. } => write!(f, "{}", child)?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operand(field: &str, literal: Value) -> Node {
        Node::Operand {
            field: field.into(),
            comparator: Comparator::Eq,
            literal,
        }
    }

    #[test]
    fn test_display_nested() {
        let ast = Node::Operator {
            connective: Connective::And,
            children: vec![
                operand("a", Value::Integer(1)),
                Node::Operator {
                    connective: Connective::Or,
                    children: vec![
                        operand("b", Value::String("x".into())),
                        operand("c", Value::Float(2.0)),
                    ],
                },
            ],
        };
        assert_eq!(ast.to_string(), "a = 1 AND (b = 'x' OR c = 2.0)");
        assert_eq!(ast.operand_count(), 3);
        assert_eq!(ast.fields(), vec!["a", "b", "c"]);
    }
}
