//! Lexer/tokenizer for the rule DSL.

use std::fmt;
use thiserror::Error;
use winnow::ascii::multispace1;
use winnow::combinator::{alt, cut_err, preceded, terminated};
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

/// Token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LParen,
    RParen,
    Field,
    Value,
    Comparator, // = > <
    And,
    Or,
}

/// A lexed token. `text` holds the lowercased field name, the literal body
/// (quotes stripped), the comparator character or the canonical keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Token {
            kind,
            text: text.into(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Value => write!(f, "value '{}'", self.text),
            TokenKind::Field => write!(f, "field '{}'", self.text),
            _ => write!(f, "'{}'", self.text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },
}

type PResult<T> = Result<T, ErrMode<ContextError>>;

/// Identifier: a letter followed by letters or digits. `AND`/`OR` in any case
/// become keywords, anything else is a lowercased field name.
fn lex_word(input: &mut &str) -> PResult<Token> {
    (
        one_of(|c: char| c.is_alphabetic()),
        take_while(0.., |c: char| c.is_alphanumeric()),
    )
        .take()
        .map(|word: &str| {
            if word.eq_ignore_ascii_case("and") {
                Token::new(TokenKind::And, "AND")
            } else if word.eq_ignore_ascii_case("or") {
                Token::new(TokenKind::Or, "OR")
            } else {
                Token::new(TokenKind::Field, word.to_lowercase())
            }
        })
        .parse_next(input)
}

/// Digit run: a digit followed by any mix of digits and dots, kept verbatim.
fn lex_number(input: &mut &str) -> PResult<Token> {
    (
        one_of(|c: char| c.is_ascii_digit()),
        take_while(0.., |c: char| c.is_ascii_digit() || c == '.'),
    )
        .take()
        .map(|digits: &str| Token::new(TokenKind::Value, digits))
        .parse_next(input)
}

/// Single-quoted literal, no escapes. Once the opening quote is seen a
/// missing closer is a hard failure.
fn lex_quoted(input: &mut &str) -> PResult<Token> {
    preceded(
        '\'',
        cut_err(terminated(take_while(0.., |c: char| c != '\''), '\''))
            .context(StrContext::Label("unterminated string literal")),
    )
    .map(|body: &str| Token::new(TokenKind::Value, body))
    .parse_next(input)
}

/// Lex one token. `None` covers whitespace runs and characters no rule
/// claims; both are dropped.
fn lex_token(input: &mut &str) -> PResult<Option<Token>> {
    alt((
        multispace1.value(None),
        '('.value(Some(Token::new(TokenKind::LParen, "("))),
        ')'.value(Some(Token::new(TokenKind::RParen, ")"))),
        one_of(['=', '>', '<']).map(|c: char| Some(Token::new(TokenKind::Comparator, c))),
        lex_quoted.map(Some),
        lex_word.map(Some),
        lex_number.map(Some),
        any.map(|c: char| {
            tracing::trace!("dropping unrecognized character {:?}", c);
            None
        }),
    ))
    .parse_next(input)
}

/// Tokenize the entire input.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut remaining = input;
    let mut tokens = Vec::new();

    while !remaining.is_empty() {
        let offset = input.len() - remaining.len();
        match lex_token(&mut remaining) {
            Ok(Some(tok)) => tokens.push(tok),
            Ok(None) => {}
            Err(_) => return Err(LexError::UnterminatedString { offset }),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_comparison() {
        let tokens = tokenize("age > 18").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::Field, "age"),
                Token::new(TokenKind::Comparator, ">"),
                Token::new(TokenKind::Value, "18"),
            ]
        );
    }

    #[test]
    fn test_keywords_case_insensitive_and_fields_lowercased() {
        let tokens = tokenize("Age = 1 and Country = 'US' Or x < 2").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Field,
                TokenKind::Comparator,
                TokenKind::Value,
                TokenKind::And,
                TokenKind::Field,
                TokenKind::Comparator,
                TokenKind::Value,
                TokenKind::Or,
                TokenKind::Field,
                TokenKind::Comparator,
                TokenKind::Value,
            ]
        );
        assert_eq!(tokens[0].text, "age");
        assert_eq!(tokens[3].text, "AND");
        assert_eq!(tokens[6].text, "US");
    }

    #[test]
    fn test_quoted_literal_is_verbatim() {
        let tokens = tokenize("name = 'Hello World AND (x)'").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2], Token::new(TokenKind::Value, "Hello World AND (x)"));
    }

    #[test]
    fn test_digit_run_not_validated() {
        let tokens = tokenize("v = 1.2.3").unwrap();
        assert_eq!(tokens[2], Token::new(TokenKind::Value, "1.2.3"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("name = 'abc").unwrap_err();
        assert_eq!(err, LexError::UnterminatedString { offset: 7 });
    }

    #[test]
    fn test_whitespace_runs_skipped() {
        let tokens = tokenize(" \t a\n=\r\n 1 ").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Field, TokenKind::Comparator, TokenKind::Value]
        );

        let err = tokenize("a =\t\t 'abc").unwrap_err();
        assert_eq!(err, LexError::UnterminatedString { offset: 6 });
    }

    #[test]
    fn test_unknown_characters_dropped() {
        // `!`, `&`, `,` and `_` match no rule and vanish without error.
        let tokens = tokenize("a != 1, first_name & b").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::Field, "a"),
                Token::new(TokenKind::Comparator, "="),
                Token::new(TokenKind::Value, "1"),
                Token::new(TokenKind::Field, "first"),
                Token::new(TokenKind::Field, "name"),
                Token::new(TokenKind::Field, "b"),
            ]
        );
    }

    #[test]
    fn test_two_char_comparators_split() {
        let tokens = tokenize("a >= 1").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Field,
                TokenKind::Comparator,
                TokenKind::Comparator,
                TokenKind::Value,
            ]
        );
    }

    #[test]
    fn test_parens_and_empty_input() {
        assert!(tokenize("   ").unwrap().is_empty());
        let tokens = tokenize("(a=1)").unwrap();
        assert_eq!(tokens.first().unwrap().kind, TokenKind::LParen);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::RParen);
    }
}
