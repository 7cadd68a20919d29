/*!
Parsers and utility types for Rez numbers. A number literal with a fractional
part or exponent is parsed as an `f64`; anything else is an `i64`.
*/

use arrayvec::ArrayString;
use memchr::memchr3;
use nom::{
    branch::alt,
    character::complete::{char, digit1},
    error::{FromExternalError, ParseError},
    IResult, Parser,
};
use nom_supreme::{multi::parse_separated_terminated, ParserExt};
use serde::Serialize;

use crate::util::at_least_one;

/// A parsed Rez number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RezNumber {
    /// An integer literal
    Int(i64),

    /// A literal with a fractional part or an exponent
    Float(f64),
}

impl RezNumber {
    /// Get the numeric value as an `f64`, regardless of how it was written.
    pub fn as_f64(self) -> f64 {
        match self {
            RezNumber::Int(value) => value as f64,
            RezNumber::Float(value) => value,
        }
    }
}

impl Serialize for RezNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match *self {
            RezNumber::Int(value) => serializer.serialize_i64(value),
            RezNumber::Float(value) => serializer.serialize_f64(value),
        }
    }
}

/// A bounds error occurred during number parsing: the literal doesn't fit
/// the numeric types we parse into.
#[derive(Debug, Clone, Copy)]
pub struct BoundsError;

impl RezNumber {
    /// Parse a recognized decimal literal. Digits may be separated by `_`.
    fn from_str(input: &str) -> Result<Self, BoundsError> {
        let mut buffer: ArrayString<64>;

        let input = if input.contains('_') {
            buffer = ArrayString::new();

            input
                .split('_')
                .try_for_each(|s| buffer.try_push_str(s).ok())
                .ok_or(BoundsError)?;

            &buffer
        } else {
            input
        };

        if memchr3(b'.', b'e', b'E', input.as_bytes()).is_some() {
            input.parse().map(RezNumber::Float).map_err(|_| BoundsError)
        } else {
            input.parse().map(RezNumber::Int).map_err(|_| BoundsError)
        }
    }
}

/// Recognize a run of decimal digits, possibly separated by underscores.
/// Underscores must sit between digits.
fn recognize_digits<'i, E>(input: &'i str) -> IResult<&'i str, (), E>
where
    E: ParseError<&'i str>,
{
    parse_separated_terminated(
        digit1,
        at_least_one(char('_')),
        char('_').not(),
        || (),
        |(), _| (),
    )
    .parse(input)
}

/// Parse a Rez number: an optional sign, an integer part, an optional
/// fractional part, and an optional exponent.
pub fn parse_number<'i, E>(input: &'i str) -> IResult<&'i str, RezNumber, E>
where
    E: ParseError<&'i str>,
    E: FromExternalError<&'i str, BoundsError>,
{
    alt((char('+'), char('-')))
        .opt()
        .terminated(recognize_digits)
        .terminated(recognize_digits.cut().preceded_by(char('.')).opt())
        .terminated(
            alt((char('+'), char('-')))
                .opt()
                .terminated(recognize_digits)
                .cut()
                .preceded_by(alt((char('e'), char('E'))))
                .opt(),
        )
        .recognize()
        .map_res_cut(RezNumber::from_str)
        .parse(input)
}
