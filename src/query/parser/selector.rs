//! Label selector parser
//!
//! # Grammar
//!
//! ```text
//! selector := ws* ( "{" ws* ( term ( ws* "," ws* term )* ( ws* "," )? )? ws* "}" )? ws*
//! term     := name ws* op ws* quoted
//! name     := [A-Za-z_][A-Za-z0-9_]*
//! op       := "=" | "!=" | "=~" | "!~"
//! quoted   := '"' chars '"' | "'" chars "'"
//! ```
//!
//! Quoted values understand `\\`, `\"`, `\'`, `\n`, `\r` and `\t` escapes.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::opt,
    error::{Error as NomError, ErrorKind},
    multi::separated_list1,
    sequence::{delimited, terminated},
    IResult, Parser,
};

use crate::query::ast::{LabelSelector, MatchOp, SelectorTerm};
use crate::query::error::{QueryError, QueryResult};

/// Raw term before validation
type RawTerm<'a> = (&'a str, &'a str, String);

/// Parse a label selector
///
/// Empty text, whitespace, and `{}` yield the empty selector. Unknown
/// operators, bad label names, invalid regexes and more than 64 terms are
/// rejected as invalid requests.
pub fn parse_selector(input: &str) -> QueryResult<LabelSelector> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(LabelSelector::new());
    }

    let raw = match parse_braced_terms(trimmed) {
        Ok((remaining, raw)) => {
            if !remaining.trim().is_empty() {
                return Err(QueryError::invalid_request(format!(
                    "unexpected trailing input in selector: '{}'",
                    remaining.trim()
                )));
            }
            raw
        },
        Err(e) => {
            return Err(QueryError::invalid_request(format!(
                "malformed selector '{}': {:?}",
                input, e
            )))
        },
    };

    let mut selector = LabelSelector::new();
    for (label, op, value) in raw {
        let op: MatchOp = op.parse()?;
        selector.push(SelectorTerm::new(label, op, value)?)?;
    }
    Ok(selector)
}

// ============================================================================
// Combinators
// ============================================================================

fn parse_braced_terms(input: &str) -> IResult<&str, Vec<RawTerm<'_>>> {
    delimited(
        (multispace0, char('{'), multispace0),
        // a trailing comma is only allowed after a term
        opt(terminated(
            separated_list1((multispace0, char(','), multispace0), parse_term),
            opt((multispace0, char(','))),
        ))
        .map(Option::unwrap_or_default),
        (multispace0, char('}')),
    )
    .parse(input)
}

fn parse_term(input: &str) -> IResult<&str, RawTerm<'_>> {
    let (input, label) = parse_label_name(input)?;
    let (input, _) = multispace0(input)?;
    let (input, op) = parse_operator(input)?;
    let (input, _) = multispace0(input)?;
    let (input, value) = parse_quoted(input)?;
    Ok((input, (label, op, value)))
}

fn parse_label_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_').parse(input)
}

/// Greedy operator token; validity is decided by `MatchOp::from_str`
fn parse_operator(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| matches!(c, '=' | '!' | '~' | '<' | '>')).parse(input)
}

fn parse_quoted(input: &str) -> IResult<&str, String> {
    let (mut rest, quote) = alt((char('"'), char('\''))).parse(input)?;
    let mut out = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None => return Err(nom::Err::Error(NomError::new(rest, ErrorKind::Char))),
            Some(c) if c == quote => return Ok((&rest[c.len_utf8()..], out)),
            Some('\\') => match chars.next() {
                Some(esc) => {
                    out.push(match esc {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                    rest = &rest[1 + esc.len_utf8()..];
                },
                None => return Err(nom::Err::Error(NomError::new(rest, ErrorKind::Escaped))),
            },
            Some(c) => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            },
        }
    }
}
