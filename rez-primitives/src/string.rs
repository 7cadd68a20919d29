/*!
Parsers and utility types for Rez strings and identifiers.
*/

use std::{
    borrow::Cow,
    char::CharTryFromError,
    convert::TryInto,
    fmt::{self, Formatter},
    hash::{Hash, Hasher},
    iter::FromIterator,
    ops::{Deref, DerefMut},
};

use memchr::memchr2;
use nom::{
    branch::alt,
    bytes::complete::take_while_m_n,
    character::complete::char,
    combinator::success,
    error::{make_error, ErrorKind, FromExternalError, ParseError},
    Err as NomErr, IResult, Parser,
};
use nom_supreme::{
    multi::parse_separated_terminated,
    tag::{complete::tag, TagError},
    ParserExt,
};
use serde::Serialize;

/// A Rez string, parsed from an identifier or a quoted string. Exists in
/// either Owned or Borrowed form, depending on whether there were escapes in
/// the string.
#[derive(Debug, Clone, Eq)]
pub struct RezString<'a> {
    inner: Cow<'a, str>,
}

impl<'a> RezString<'a> {
    /// Create a new, empty Rez string
    pub fn new() -> Self {
        Self::from_borrowed("")
    }

    /// Create a Rez string from a `Cow<str>`.
    pub fn from_cow(cow: Cow<'a, str>) -> Self {
        Self { inner: cow }
    }

    /// Create a borrowed Rez string
    pub fn from_borrowed(s: &'a str) -> Self {
        Self::from_cow(Cow::Borrowed(s))
    }

    /// Create an owned Rez string
    pub fn from_string(s: String) -> Self {
        Self::from_cow(Cow::Owned(s))
    }

    /// Convert this unconditionally into an owned string.
    pub fn into_string(self) -> String {
        self.inner.into_owned()
    }

    /// Get the `&str` contained in this string.
    pub fn as_str(&self) -> &str {
        self
    }

    /// Add a borrowed string to the back of this string. Stays borrowed if
    /// this string was empty.
    pub fn push_str(&mut self, s: &'a str) {
        if self.is_empty() {
            self.inner = Cow::Borrowed(s)
        } else {
            self.inner.to_mut().push_str(s)
        }
    }

    /// Add a char to the back of this string.
    pub fn push_char(&mut self, c: char) {
        self.inner.to_mut().push(c)
    }
}

impl<T: ?Sized + AsRef<str>> PartialEq<T> for RezString<'_> {
    fn eq(&self, other: &T) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl Hash for RezString<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

impl Default for RezString<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Deref for RezString<'a> {
    type Target = Cow<'a, str>;

    fn deref(&self) -> &Cow<'a, str> {
        &self.inner
    }
}

impl DerefMut for RezString<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl AsRef<str> for RezString<'_> {
    fn as_ref(&self) -> &str {
        self
    }
}

impl fmt::Display for RezString<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self)
    }
}

impl<'a> From<&'a str> for RezString<'a> {
    fn from(s: &'a str) -> Self {
        Self::from_borrowed(s)
    }
}

impl From<String> for RezString<'_> {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl<'a> Extend<&'a str> for RezString<'a> {
    fn extend<T: IntoIterator<Item = &'a str>>(&mut self, iter: T) {
        iter.into_iter().for_each(|s| self.push_str(s))
    }
}

impl Extend<char> for RezString<'_> {
    fn extend<T: IntoIterator<Item = char>>(&mut self, iter: T) {
        iter.into_iter().for_each(|c| self.push_char(c))
    }
}

impl<T> FromIterator<T> for RezString<'_>
where
    Self: Extend<T>,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut string = RezString::new();
        string.extend(iter);
        string
    }
}

impl Serialize for RezString<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self)
    }
}

/// Returns true if this character can start an identifier
#[inline]
pub fn is_initial_identifier(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

/// Returns true if this character can continue an identifier
#[inline]
pub fn is_identifier(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Parse a Rez identifier: an ascii letter, `_`, or `$`, followed by any
/// number of ascii alphanumerics, `_`, or `$`. Used for block labels, block
/// ids, attribute names, and keyword bodies.
pub fn parse_identifier<'i, E: ParseError<&'i str>>(
    input: &'i str,
) -> IResult<&'i str, &'i str, E> {
    let mut chars = input.chars();
    match chars.next() {
        Some(c) if is_initial_identifier(c) => {
            let split_point = chars
                .as_str()
                .find(|c: char| !is_identifier(c))
                .unwrap_or(chars.as_str().len())
                + c.len_utf8();
            let (ident, tail) = input.split_at(split_point);
            Ok((tail, ident))
        }
        _ => Err(NomErr::Error(make_error(input, ErrorKind::Alpha))),
    }
}

// Parse a string matching u{00F1} as an escaped unicode code point
fn parse_unicode_escape<'i, E>(input: &'i str) -> IResult<&'i str, char, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
    E: FromExternalError<&'i str, CharTryFromError>,
{
    take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit())
        .map(|s| u32::from_str_radix(s, 16).expect("failed to parse 1-6 hex digits to a u32?"))
        .map_res(|c: u32| c.try_into())
        .terminated(char('}'))
        .cut()
        .preceded_by(tag("u{"))
        .parse(input)
}

fn parse_escape<'i, E>(input: &'i str) -> IResult<&'i str, char, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
    E: FromExternalError<&'i str, CharTryFromError>,
{
    alt((
        char('n').value('\n'),
        char('r').value('\r'),
        char('t').value('\t'),
        char('\\').value('\\'),
        char('/').value('/'),
        char('"').value('"'),
        char('b').value('\u{08}'),
        char('f').value('\u{0C}'),
        parse_unicode_escape,
    ))
    .preceded_by(char('\\'))
    .parse(input)
}

/// Parse a chunk of an escaped string. Must be at least 1 character.
fn parse_unescaped_chunk<'i, E>(input: &'i str) -> IResult<&'i str, &'i str, E>
where
    E: ParseError<&'i str>,
{
    match memchr2(b'"', b'\\', input.as_bytes()) {
        None => Err(NomErr::Error(E::or(
            make_error("", ErrorKind::Eof),
            E::from_char("", '"'),
        ))),

        Some(0) => Err(NomErr::Error(make_error(input, ErrorKind::TakeWhile1))),
        Some(n) => {
            let (head, tail) = input.split_at(n);
            Ok((tail, head))
        }
    }
}

enum StringChunk<'a> {
    Chunk(&'a str),
    Char(char),
}

fn parse_chunk<'i, E>(input: &'i str) -> IResult<&'i str, StringChunk<'i>, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
    E: FromExternalError<&'i str, CharTryFromError>,
{
    alt((
        parse_unescaped_chunk.map(StringChunk::Chunk),
        parse_escape.map(StringChunk::Char),
    ))
    .parse(input)
}

/// Parse a quoted string (with escape sequences). The result borrows the
/// input unless an escape forced a copy.
///
/// "This" -> &str
/// "This\nvalue" -> String
pub fn parse_string<'i, E>(input: &'i str) -> IResult<&'i str, RezString<'i>, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
    E: FromExternalError<&'i str, CharTryFromError>,
{
    parse_separated_terminated(
        parse_chunk,
        success(()),
        char('"'),
        RezString::new,
        |mut string, chunk| {
            match chunk {
                StringChunk::Chunk(chunk) => string.push_str(chunk),
                StringChunk::Char(c) => string.push_char(c),
            }
            string
        },
    )
    .or(char('"').map(|_| RezString::new()))
    .cut()
    .preceded_by(char('"'))
    .parse(input)
}
