//! Parser for the rule DSL.
//!
//! Grammar:
//!
//! expr = "(" expr ")" (connective expr)?
//!      | FIELD COMPARATOR VALUE (connective expr)?
//! connective = "AND" | "OR"
//!
//! There is no precedence: a connective takes everything to its right as
//! one operand, so `a = 1 AND b = 2 OR c = 3` groups as
//! `a = 1 AND (b = 2 OR c = 3)`. Runs of the same connective are flattened
//! into a single n-ary node.

use thiserror::Error;

use super::ast::{Comparator, Connective, Node};
use super::lexer::{LexError, Token, TokenKind, tokenize};
use super::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("tokenization error: {0}")]
    Lex(#[from] LexError),

    #[error("expected comparison operator after field '{field}'")]
    ExpectedComparator { field: String },

    #[error("expected value after '{field} {comparator}'")]
    ExpectedValue { field: String, comparator: String },

    #[error("unexpected {}", describe_found(.found))]
    UnexpectedToken { found: Option<Token> },

    #[error("mismatched parentheses: {}", describe_balance(.outstanding))]
    MismatchedParens { outstanding: i32 },
}

fn describe_found(found: &Option<Token>) -> String {
    match found {
        Some(tok) => format!("token {}", tok),
        None => "end of input".to_string(),
    }
}

fn describe_balance(outstanding: &i32) -> String {
    if *outstanding > 0 {
        format!("missing {} closing parenthesis", outstanding)
    } else {
        format!("{} extra closing parenthesis", -outstanding)
    }
}

/// Parser state.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consume the next token if it has the given kind.
    fn take(&mut self, kind: TokenKind) -> Option<Token> {
        match self.tokens.get(self.pos) {
            Some(tok) if tok.kind == kind => {
                self.pos += 1;
                Some(tok.clone())
            }
            _ => None,
        }
    }

    fn take_connective(&mut self) -> Option<Connective> {
        if self.take(TokenKind::And).is_some() {
            Some(Connective::And)
        } else if self.take(TokenKind::Or).is_some() {
            Some(Connective::Or)
        } else {
            None
        }
    }

    fn parse_expression(&mut self) -> Result<Node, ParseError> {
        let left = if self.take(TokenKind::LParen).is_some() {
            self.parse_group()?
        } else if let Some(field) = self.take(TokenKind::Field) {
            self.parse_operand(field.text)?
        } else {
            return Err(ParseError::UnexpectedToken {
                found: self.peek().cloned(),
            });
        };

        let Some(connective) = self.take_connective() else {
            return Ok(left);
        };

        let right = self.parse_expression()?;
        Ok(join(connective, left, right))
    }

    /// Parse a parenthesized group; the opening paren is already consumed.
    ///
    /// After the inner expression, tokens up to the matching closer are
    /// skipped without being parsed. `((a = 1) b = 2)` therefore yields just
    /// `a = 1`.
    fn parse_group(&mut self) -> Result<Node, ParseError> {
        let inner = self.parse_expression()?;

        let mut depth: i32 = 1;
        while depth > 0 && !self.is_at_end() {
            if self.take(TokenKind::LParen).is_some() {
                depth += 1;
            } else if self.take(TokenKind::RParen).is_some() {
                depth -= 1;
            } else {
                self.pos += 1;
            }
        }

        if depth != 0 {
            return Err(ParseError::MismatchedParens { outstanding: depth });
        }

        Ok(inner)
    }

    fn parse_operand(&mut self, field: String) -> Result<Node, ParseError> {
        let Some(op) = self.take(TokenKind::Comparator) else {
            return Err(ParseError::ExpectedComparator { field });
        };
        let Some(comparator) = Comparator::from_symbol(&op.text) else {
            return Err(ParseError::ExpectedComparator { field });
        };

        let Some(value) = self.take(TokenKind::Value) else {
            return Err(ParseError::ExpectedValue {
                field,
                comparator: op.text,
            });
        };

        Ok(Node::Operand {
            field,
            comparator,
            literal: Value::from_literal(&value.text),
        })
    }
}

/// Combine `left` with an already parsed right-hand side, merging into the
/// right node when it carries the same connective.
fn join(connective: Connective, left: Node, right: Node) -> Node {
    match right {
        Node::Operator {
            connective: inner,
            mut children,
        } if inner == connective => {
            children.insert(0, left);
            Node::Operator {
                connective,
                children,
            }
        }
        right => Node::Operator {
            connective,
            children: vec![left, right],
        },
    }
}

/// Parse a rule expression into an AST.
pub fn parse(input: &str) -> Result<Node, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(tokens);
    parser.parse_expression()
}

/// Check that an expression parses, discarding the tree.
pub fn validate_syntax(input: &str) -> Result<(), ParseError> {
    parse(input).map(|_| ())
}
