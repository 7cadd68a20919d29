/*!
Whitespace and comment parsers. We never care about the contents of
whitespace so they always return `()`.
*/

use nom::{
    branch::alt,
    character::complete::char,
    error::ParseError,
    IResult, Parser,
};
use nom_supreme::{
    tag::{complete::tag, TagError},
    ParserExt,
};

use crate::util::{at_least_one, back};

/// Parse any amount (1 or more) of inline whitespace: spaces and tabs.
pub fn parse_inline_whitespace<'i, E>(input: &'i str) -> IResult<&'i str, (), E>
where
    E: ParseError<&'i str>,
{
    at_least_one(alt((char(' '), char('\t')))).parse(input)
}

/// Parse a single newline
pub fn parse_newline<'i, E>(input: &'i str) -> IResult<&'i str, (), E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
{
    alt((tag("\r\n").value('\n'), char('\r'), char('\n')))
        .value(())
        .parse(input)
}

fn is_newline(c: char) -> bool {
    c == '\r' || c == '\n'
}

/// Parse a single `%%` style comment, terminated by a newline or the end of
/// input.
pub fn parse_line_comment<'i, E>(input: &'i str) -> IResult<&'i str, (), E>
where
    E: TagError<&'i str, &'static str>,
    E: ParseError<&'i str>,
{
    let (input, _) = tag("%%").parse(input)?;
    match input.char_indices().find_map(|(i, c)| is_newline(c).then(|| i)) {
        None => Ok((back(input), ())),
        Some(i) => {
            let input = &input[i..];
            parse_newline(input)
        }
    }
}

/// Parse a normal line terminator (newline or `%%` comment)
pub fn parse_endline<'i, E>(input: &'i str) -> IResult<&'i str, (), E>
where
    E: TagError<&'i str, &'static str>,
    E: ParseError<&'i str>,
{
    alt((parse_newline, parse_line_comment)).parse(input)
}

/// Parse 0 or more linespace. Linespace is any endline or inline whitespace;
/// Rez is brace delimited, so this is the skip that runs between any two
/// tokens.
pub fn parse_linespace<'i, E>(input: &'i str) -> IResult<&'i str, (), E>
where
    E: TagError<&'i str, &'static str>,
    E: ParseError<&'i str>,
{
    at_least_one(alt((parse_endline, parse_inline_whitespace)))
        .opt()
        .value(())
        .parse(input)
}
