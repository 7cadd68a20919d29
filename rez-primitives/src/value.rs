/*!
Parsers and container types for attribute values. A value can be a number, a
string, a boolean, a keyword, an element reference, a list, a set, a function
literal, or a behaviour tree.
*/

use std::char::CharTryFromError;
use std::fmt::{self, Formatter};

use memchr::memchr2;
use nom::{
    branch::alt,
    character::complete::char,
    error::{make_error, ErrorKind, FromExternalError, ParseError},
    Err as NomErr, IResult, Parser,
};
use nom_supreme::{
    context::ContextError,
    multi::parse_separated_terminated,
    tag::{complete::tag, TagError},
    ParserExt,
};
use serde::Serialize;

use crate::{
    btree::{parse_btree, BehaviourTree},
    number::{parse_number, BoundsError, RezNumber},
    parse_bool,
    string::{parse_identifier, parse_string, RezString},
    util::back,
    whitespace::parse_linespace,
};

/// The closed set of attribute value types. Every [`AttrValue`] carries
/// exactly one of these tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    /// A number
    Number,
    /// A string
    String,
    /// `true` or `false`
    Boolean,
    /// A `:keyword`
    Keyword,
    /// A `#reference` to another block
    ElemRef,
    /// A `[...]` list
    List,
    /// A `#{...}` set
    Set,
    /// A `(params) => { body }` function literal
    Function,
    /// A `^[...]` behaviour tree
    BTree,
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttrType::Number => "number",
            AttrType::String => "string",
            AttrType::Boolean => "boolean",
            AttrType::Keyword => "keyword",
            AttrType::ElemRef => "elem_ref",
            AttrType::List => "list",
            AttrType::Set => "set",
            AttrType::Function => "function",
            AttrType::BTree => "btree",
        })
    }
}

/// A function literal. The body is the raw text between the outer braces;
/// interpreting it belongs to code generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RezFunction<'a> {
    /// Declared parameter names, in order
    pub params: Vec<&'a str>,

    /// The raw body text, braces excluded
    pub body: &'a str,
}

/// An arbitrary attribute value, tagged with its type. Collection elements
/// are themselves tagged, so collections may be heterogeneous.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue<'a> {
    /// A number
    Number(RezNumber),

    /// A string
    String(RezString<'a>),

    /// `true` or `false`
    Boolean(bool),

    /// A `:keyword`
    Keyword(RezString<'a>),

    /// A `#reference` to another block by id
    ElemRef(RezString<'a>),

    /// A `[...]` list
    List(Vec<AttrValue<'a>>),

    /// A `#{...}` set, in source order
    Set(Vec<AttrValue<'a>>),

    /// A function literal
    Function(RezFunction<'a>),

    /// A behaviour tree
    BTree(BehaviourTree<'a>),
}

impl<'a> AttrValue<'a> {
    /// The type tag of this value.
    pub fn attr_type(&self) -> AttrType {
        match self {
            AttrValue::Number(..) => AttrType::Number,
            AttrValue::String(..) => AttrType::String,
            AttrValue::Boolean(..) => AttrType::Boolean,
            AttrValue::Keyword(..) => AttrType::Keyword,
            AttrValue::ElemRef(..) => AttrType::ElemRef,
            AttrValue::List(..) => AttrType::List,
            AttrValue::Set(..) => AttrType::Set,
            AttrValue::Function(..) => AttrType::Function,
            AttrValue::BTree(..) => AttrType::BTree,
        }
    }

    /// The elements of a list or set value, or `None` for scalar values.
    pub fn elements(&self) -> Option<&[AttrValue<'a>]> {
        match self {
            AttrValue::List(items) | AttrValue::Set(items) => Some(items),
            _ => None,
        }
    }
}

/// Parse a `:keyword`.
pub fn parse_keyword<'i, E>(input: &'i str) -> IResult<&'i str, RezString<'i>, E>
where
    E: ParseError<&'i str>,
{
    parse_identifier
        .map(RezString::from_borrowed)
        .preceded_by(char(':'))
        .parse(input)
}

/// Parse a `#reference` to another element.
pub fn parse_elem_ref<'i, E>(input: &'i str) -> IResult<&'i str, RezString<'i>, E>
where
    E: ParseError<&'i str>,
{
    parse_identifier
        .map(RezString::from_borrowed)
        .preceded_by(char('#'))
        .parse(input)
}

/// Parse a `[...]` list of whitespace separated values.
fn parse_list<'i, E>(input: &'i str) -> IResult<&'i str, Vec<AttrValue<'i>>, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
    E: FromExternalError<&'i str, CharTryFromError>,
    E: FromExternalError<&'i str, BoundsError>,
    E: ContextError<&'i str, &'static str>,
{
    parse_separated_terminated(
        parse_bare_value.preceded_by(parse_linespace),
        nom::combinator::success(()),
        char(']').preceded_by(parse_linespace),
        Vec::new,
        |mut items, item| {
            items.push(item);
            items
        },
    )
    .or(char(']').preceded_by(parse_linespace).value(Vec::new()))
    .cut()
    .preceded_by(char('['))
    .parse(input)
}

/// Parse a `#{...}` set of whitespace separated values. Source order is
/// preserved; duplicate surfacing belongs to validation.
fn parse_set<'i, E>(input: &'i str) -> IResult<&'i str, Vec<AttrValue<'i>>, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
    E: FromExternalError<&'i str, CharTryFromError>,
    E: FromExternalError<&'i str, BoundsError>,
    E: ContextError<&'i str, &'static str>,
{
    parse_separated_terminated(
        parse_bare_value.preceded_by(parse_linespace),
        nom::combinator::success(()),
        char('}').preceded_by(parse_linespace),
        Vec::new,
        |mut items, item| {
            items.push(item);
            items
        },
    )
    .or(char('}').preceded_by(parse_linespace).value(Vec::new()))
    .cut()
    .preceded_by(tag("#{"))
    .parse(input)
}

/// Take the raw text of a brace block, assuming the opening brace has
/// already been consumed. Nested braces are counted; the text is not
/// otherwise interpreted.
fn take_brace_body<'i, E>(input: &'i str) -> IResult<&'i str, &'i str, E>
where
    E: ParseError<&'i str>,
{
    let mut depth = 1usize;
    let mut point = 0usize;

    loop {
        match memchr2(b'{', b'}', input[point..].as_bytes()) {
            None => return Err(NomErr::Failure(make_error(back(input), ErrorKind::Eof))),
            Some(i) => {
                let at = point + i;
                point = at + 1;

                if input.as_bytes()[at] == b'{' {
                    depth += 1;
                } else {
                    depth -= 1;
                    if depth == 0 {
                        return Ok((&input[point..], &input[..at]));
                    }
                }
            }
        }
    }
}

/// Parse the parenthesized parameter list of a function literal.
fn parse_params<'i, E>(input: &'i str) -> IResult<&'i str, Vec<&'i str>, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
{
    parse_separated_terminated(
        parse_identifier.preceded_by(parse_linespace),
        char(',').preceded_by(parse_linespace),
        char(')').preceded_by(parse_linespace),
        Vec::new,
        |mut params, param| {
            params.push(param);
            params
        },
    )
    .or(char(')').preceded_by(parse_linespace).value(Vec::new()))
    .preceded_by(char('('))
    .parse(input)
}

/// Parse a `(params) => { body }` function literal.
pub fn parse_function<'i, E>(input: &'i str) -> IResult<&'i str, RezFunction<'i>, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
{
    parse_params
        .terminated(tag("=>").preceded_by(parse_linespace))
        .and(
            take_brace_body
                .preceded_by(char('{'))
                .preceded_by(parse_linespace)
                .cut(),
        )
        .map(|(params, body)| RezFunction { params, body })
        .parse(input)
}

/// Parse any one attribute value.
pub fn parse_bare_value<'i, E>(input: &'i str) -> IResult<&'i str, AttrValue<'i>, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
    E: FromExternalError<&'i str, CharTryFromError>,
    E: FromExternalError<&'i str, BoundsError>,
    E: ContextError<&'i str, &'static str>,
{
    alt((
        parse_bool.map(AttrValue::Boolean).context("boolean"),
        parse_number.map(AttrValue::Number).context("number"),
        parse_string.map(AttrValue::String).context("string"),
        parse_keyword.map(AttrValue::Keyword).context("keyword"),
        parse_set.map(AttrValue::Set).context("set"),
        parse_elem_ref.map(AttrValue::ElemRef).context("elem_ref"),
        parse_list.map(AttrValue::List).context("list"),
        parse_function.map(AttrValue::Function).context("function"),
        parse_btree.map(AttrValue::BTree).context("btree"),
    ))
    .parse(input)
}
