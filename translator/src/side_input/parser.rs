// side_input/parser.rs — Element tree of the side-input XML subset
//
// Builds a generic element tree (name, attributes, children) from the token
// stream with chumsky combinators. Interpretation of the tree happens in the
// parent module.
//
// Preconditions: tokens come from `lexer::lex`.
// Postconditions: the root element, or every syntax error found.
// Failure modes: mismatched closing tags and malformed tags are errors.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use super::lexer::{lex, Token};

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Parse `source` into its root element. Errors carry byte offsets.
pub fn parse_document(source: &str) -> Result<Element, Vec<String>> {
    let (tokens, lex_errors) = lex(source);
    if !lex_errors.is_empty() {
        return Err(lex_errors
            .into_iter()
            .map(|e| format!("{}..{}: {}", e.span.start, e.span.end, e.message))
            .collect());
    }

    let len = source.len();
    let token_iter = tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = span.into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (root, errors) = document_parser().parse(stream).into_output_errors();
    match root {
        Some(root) if errors.is_empty() => Ok(root),
        _ => Err(errors
            .iter()
            .map(|e| format!("{}..{}: {}", e.span().start(), e.span().end(), e))
            .collect()),
    }
}

fn document_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Element, extra::Err<Rich<'tokens, Token, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let name = select! { Token::Name(n) => n };
    let value = select! { Token::Value(v) => v };

    let element = recursive(|element| {
        let attr = name
            .clone()
            .then_ignore(just(Token::Equals))
            .then(value.clone());
        let open = just(Token::Open)
            .ignore_then(name.clone())
            .then(attr.repeated().collect::<Vec<_>>());

        let empty = just(Token::SelfClose).to((Vec::new(), None));
        let with_body = just(Token::Close)
            .ignore_then(element.repeated().collect::<Vec<_>>())
            .then_ignore(just(Token::CloseOpen))
            .then(name.clone().map(Some))
            .then_ignore(just(Token::Close));

        open.then(empty.or(with_body)).try_map(
            |((name, attrs), (children, closing)), span| match closing {
                Some(closing) if closing != name => Err(Rich::custom(
                    span,
                    format!("closing tag </{}> does not match <{}>", closing, name),
                )),
                _ => Ok(Element {
                    name,
                    attrs,
                    children,
                }),
            },
        )
    });

    element.then_ignore(end())
}
