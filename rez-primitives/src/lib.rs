/*!
This crate contains parsers and other low-level helper types for the surface
syntax of the Rez authoring language: whitespace and comments, identifiers,
strings, numbers, attribute values, attributes, and behaviour tree literals.
It deliberately stops below the block level; recognizing `@block` structures
and assembling them into a game model is the compiler's job.
*/

#![deny(missing_docs)]

use nom::{branch::alt, error::ParseError, IResult, Parser};
use nom_supreme::{
    tag::{complete::tag, TagError},
    ParserExt,
};

pub mod attribute;
pub mod btree;
pub mod number;
pub mod string;
mod util;
pub mod value;
pub mod whitespace;

/// Parse a `true` or `false`
pub fn parse_bool<'i, E>(input: &'i str) -> IResult<&'i str, bool, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
{
    alt((tag("true").value(true), tag("false").value(false))).parse(input)
}
