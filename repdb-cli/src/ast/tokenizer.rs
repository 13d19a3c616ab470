use std::ops::Range;

use logos::{Lexer, Logos};

use crate::ast::token_kind::TokenKind;

type Result<T> = std::result::Result<T, String>;

#[derive(Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub source: &'a str,
    pub slice: &'a str,
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl<'a> Token<'a> {
    fn new_eoi(source: &'a str) -> Self {
        Token {
            source,
            slice: "",
            kind: TokenKind::EOI,
            span: (source.len()..source.len()),
        }
    }

    pub fn text(&self) -> &'a str {
        &self.source[self.span.clone()]
    }
}

impl<'a> std::fmt::Debug for Token<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({:?})", self.kind, self.span)
    }
}

pub struct Tokenizer<'a> {
    source: &'a str,
    lexer: Lexer<'a, TokenKind>,
    eoi: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Tokenizer {
            source,
            lexer: TokenKind::lexer(source),
            eoi: false,
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lexer.next() {
            Some(Err(_)) => Some(Err(format!(
                "unable to recognize the rest tokens: {}",
                &self.source[self.lexer.span().start..]
            ))),
            Some(Ok(kind)) => Some(Ok(Token {
                source: self.source,
                slice: self.lexer.slice(),
                kind,
                span: self.lexer.span(),
            })),
            None if !self.eoi => {
                self.eoi = true;
                Some(Ok(Token::new_eoi(self.source)))
            }
            None => None,
        }
    }
}

/// Tokenizes one input line.
pub fn tokenize_line(line: &str) -> Result<Vec<Token>> {
    Tokenizer::new(line).collect::<Result<Vec<_>>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_lex_into_idents_and_punctuation() -> Result<()> {
        let tokens = tokenize_line("W(T1, x2, 101)")?;
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::LiteralInteger,
                TokenKind::RParen,
                TokenKind::EOI,
            ]
        );
        assert_eq!(tokens[2].text(), "T1");
        assert_eq!(tokens[6].text(), "101");
        Ok(())
    }

    #[test]
    fn comments_and_whitespace_are_skipped() -> Result<()> {
        let tokens = tokenize_line("begin(T1) // starts the show")?;
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::RParen,
                TokenKind::EOI,
            ]
        );
        Ok(())
    }

    #[test]
    fn negative_values_are_one_token() -> Result<()> {
        let tokens = tokenize_line("-42")?;
        assert_eq!(tokens[0].kind, TokenKind::LiteralInteger);
        assert_eq!(tokens[0].text(), "-42");
        Ok(())
    }

    #[test]
    fn unknown_characters_are_rejected() {
        assert!(tokenize_line("begin(T1) @").is_err());
    }
}
