/*!
Parser and container type for attributes. An attribute is a `name: value`
pair, where the name is an identifier and the value is any attribute value.
The same shape serves as a behaviour tree option.
*/

use std::char::CharTryFromError;

use nom::{
    character::complete::char,
    error::{FromExternalError, ParseError},
    IResult, Parser,
};
use nom_supreme::{context::ContextError, tag::TagError, ParserExt};
use serde::Serialize;

use crate::{
    number::BoundsError,
    string::{parse_identifier, RezString},
    value::{parse_bare_value, AttrType, AttrValue},
    whitespace::parse_linespace,
};

/// A named, typed attribute of a block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute<'a> {
    /// The attribute name
    pub name: RezString<'a>,

    /// The tagged value
    pub value: AttrValue<'a>,
}

impl<'a> Attribute<'a> {
    /// The type tag of this attribute's value.
    pub fn attr_type(&self) -> AttrType {
        self.value.attr_type()
    }
}

/// Parse an attribute: an identifier and a value, separated by `:`.
pub fn parse_attribute<'i, E>(input: &'i str) -> IResult<&'i str, Attribute<'i>, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
    E: FromExternalError<&'i str, CharTryFromError>,
    E: FromExternalError<&'i str, BoundsError>,
    E: ContextError<&'i str, &'static str>,
{
    parse_identifier
        .map(RezString::from_borrowed)
        .context("name")
        .terminated(parse_linespace)
        .terminated(char(':'))
        .and(parse_bare_value.preceded_by(parse_linespace).context("value"))
        .map(|(name, value)| Attribute { name, value })
        .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cool_asserts::assert_matches;

    use crate::number::RezNumber;

    fn typed_parse_attribute(input: &str) -> IResult<&str, Attribute<'_>, ()> {
        parse_attribute(input)
    }

    #[test]
    fn number() {
        assert_matches!(
            typed_parse_attribute("size: 3 }"),
            Ok((" }", attr)) => {
                assert_eq!(attr.name, "size");
                assert_matches!(attr.value, AttrValue::Number(RezNumber::Int(3)));
                assert_eq!(attr.attr_type(), AttrType::Number);
            }
        )
    }

    #[test]
    fn keyword_value() {
        assert_matches!(
            typed_parse_attribute("type: :weapon }"),
            Ok((" }", attr)) => {
                assert_eq!(attr.name, "type");
                assert_matches!(attr.value, AttrValue::Keyword(k) => assert_eq!(k, "weapon"));
            }
        )
    }

    #[test]
    fn space_before_colon() {
        assert_matches!(
            typed_parse_attribute("name : \"Sword\" "),
            Ok((" ", attr)) => assert_eq!(attr.name, "name")
        )
    }

    #[test]
    fn newline_before_value() {
        assert_matches!(
            typed_parse_attribute("tags:\n  #{:a :b} "),
            Ok((" ", attr)) => assert_matches!(attr.value, AttrValue::Set(items) => {
                assert_eq!(items.len(), 2)
            })
        )
    }

    #[test]
    fn missing_colon() {
        assert_matches!(
            typed_parse_attribute("name \"Sword\""),
            Err(nom::Err::Error(()))
        )
    }
}
