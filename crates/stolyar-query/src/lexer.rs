//! Lexer for the query pattern syntax.
//!
//! Produces span-based tokens; text is sliced from the query source only
//! when needed. Unknown characters surface as `Garbage` tokens so the
//! parser can report a byte-accurate compile error.

use logos::Logos;
use std::ops::Range;

#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip(r";[^\n]*", allow_greedy = true))]
pub(crate) enum TokenKind {
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("_", priority = 3)]
    Underscore,

    #[token(":")]
    Colon,

    #[token("*")]
    Star,

    #[token("+")]
    Plus,

    #[token("?")]
    Question,

    /// `@name`
    #[regex(r"@[A-Za-z_][A-Za-z0-9_.]*")]
    Capture,

    /// `#eq?`, `#not-match?`, ...
    #[regex(r"#[A-Za-z][A-Za-z0-9-]*[?!]?")]
    PredicateName,

    /// Node kind or field name.
    #[regex(r"[A-Za-z_][A-Za-z0-9_.]*")]
    Ident,

    /// `"..."` with backslash escapes.
    #[regex(r#""(\\.|[^"\\])*""#)]
    String,

    Garbage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

pub(crate) fn lex(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);
    while let Some(result) = lexer.next() {
        let kind = result.unwrap_or(TokenKind::Garbage);
        tokens.push(Token {
            kind,
            span: lexer.span(),
        });
    }
    tokens
}

pub(crate) fn token_text<'q>(source: &'q str, token: &Token) -> &'q str {
    &source[token.span.clone()]
}
