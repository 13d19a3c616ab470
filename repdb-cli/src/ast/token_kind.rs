use logos::Logos;

pub use self::TokenKind::*;

/// Tokens of the command language: identifiers like `begin`, `T1` or `x12`,
/// integers, the call punctuation, and `;` between commands on one line.
/// `//` starts a comment running to the end of the line.
#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Error,

    EOI,

    #[regex(r"[ \t\r\f]+", logos::skip)]
    Whitespace,

    #[regex(r"//[^\n]*", logos::skip)]
    Comment,

    #[regex(r"[\n]+")]
    Newline,

    #[regex(r"[_a-zA-Z][_a-zA-Z0-9]*")]
    Ident,

    #[regex(r"-?[0-9]+")]
    LiteralInteger,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(";")]
    SemiColon,
}
