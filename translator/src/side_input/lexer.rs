// side_input/lexer.rs — Tokens of the side-input XML subset
//
// Covers tags, attributes and quoted values. The XML declaration, comments
// and whitespace are skipped. Character data between tags is not part of
// the format and is rejected by the lexer or the parser.
//
// Preconditions: input is valid UTF-8.
// Postconditions: all tokens with byte spans, plus any lex errors.
// Failure modes: unrecognised characters produce `LexError`; lexing continues.
// Side effects: none.

use std::fmt;
use std::ops::Range;

use logos::Logos;

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Range<usize>,
    pub message: String,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"<\?[^?]*\?>")]
#[logos(skip r"<!--([^-]|-[^-])*-->")]
pub enum Token {
    #[token("</")]
    CloseOpen,
    #[token("<")]
    Open,
    #[token("/>")]
    SelfClose,
    #[token(">")]
    Close,
    #[token("=")]
    Equals,

    #[regex(r"[A-Za-z_][A-Za-z0-9_.:\-]*", |lex| lex.slice().to_string())]
    Name(String),

    #[regex(r#""[^"]*""#, unquote)]
    #[regex(r"'[^']*'", unquote)]
    Value(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::CloseOpen => write!(f, "</"),
            Token::Open => write!(f, "<"),
            Token::SelfClose => write!(f, "/>"),
            Token::Close => write!(f, ">"),
            Token::Equals => write!(f, "="),
            Token::Name(n) => write!(f, "{n}"),
            Token::Value(v) => write!(f, "\"{v}\""),
        }
    }
}

fn unquote(lex: &mut logos::Lexer<'_, Token>) -> String {
    let slice = lex.slice();
    unescape(&slice[1..slice.len() - 1])
}

/// Resolve the five predefined XML entities.
pub fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn lex(source: &str) -> (Vec<(Token, Range<usize>)>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    for (result, span) in Token::lexer(source).spanned() {
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                message: format!("unexpected character: {:?}", &source[span.clone()]),
                span,
            }),
        }
    }
    (tokens, errors)
}
