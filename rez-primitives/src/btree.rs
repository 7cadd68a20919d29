/*!
Parser and container type for behaviour tree literals. A behaviour tree is a
recursive task composition: `^[#task option: value [#child ...] ...]`. The
task is named by element reference, options are written like attributes, and
children are nested bracketed nodes.
*/

use std::char::CharTryFromError;
use std::collections::HashMap;

use nom::{
    branch::alt,
    character::complete::char,
    combinator::success,
    error::{FromExternalError, ParseError},
    IResult, Parser,
};
use nom_supreme::{
    context::ContextError,
    multi::parse_separated_terminated,
    tag::TagError,
    ParserExt,
};
use serde::Serialize;

use crate::{
    attribute::{parse_attribute, Attribute},
    number::BoundsError,
    string::RezString,
    value::{parse_elem_ref, AttrValue},
    whitespace::parse_linespace,
};

/// A behaviour tree node: a task reference, its options, and its children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviourTree<'a> {
    /// The id of the task this node runs
    pub task: RezString<'a>,

    /// Options passed to the task
    pub options: HashMap<String, AttrValue<'a>>,

    /// Child nodes, in source order
    pub children: Vec<BehaviourTree<'a>>,
}

enum BTreeItem<'a> {
    Option(Attribute<'a>),
    Child(BehaviourTree<'a>),
}

fn parse_btree_item<'i, E>(input: &'i str) -> IResult<&'i str, BTreeItem<'i>, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
    E: FromExternalError<&'i str, CharTryFromError>,
    E: FromExternalError<&'i str, BoundsError>,
    E: ContextError<&'i str, &'static str>,
{
    alt((
        parse_btree_node.map(BTreeItem::Child),
        parse_attribute.map(BTreeItem::Option),
    ))
    .parse(input)
}

/// Parse one bracketed behaviour tree node. Options start with an
/// identifier, children with `[`, so the two kinds of item never collide.
fn parse_btree_node<'i, E>(input: &'i str) -> IResult<&'i str, BehaviourTree<'i>, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
    E: FromExternalError<&'i str, CharTryFromError>,
    E: FromExternalError<&'i str, BoundsError>,
    E: ContextError<&'i str, &'static str>,
{
    let (input, _) = char('[').parse(input)?;
    let (input, task) = parse_elem_ref.preceded_by(parse_linespace).parse(input)?;

    let (input, (options, children)) = parse_separated_terminated(
        parse_btree_item.preceded_by(parse_linespace),
        success(()),
        char(']').preceded_by(parse_linespace),
        || (HashMap::new(), Vec::new()),
        |(mut options, mut children), item| {
            match item {
                BTreeItem::Option(attr) => {
                    options.insert(attr.name.into_string(), attr.value);
                }
                BTreeItem::Child(child) => children.push(child),
            }
            (options, children)
        },
    )
    .or(char(']')
        .preceded_by(parse_linespace)
        .value((HashMap::new(), Vec::new())))
    .parse(input)?;

    Ok((
        input,
        BehaviourTree {
            task,
            options,
            children,
        },
    ))
}

/// Parse a `^[...]` behaviour tree literal. Once the `^` has matched, a
/// malformed tree is a hard error.
pub fn parse_btree<'i, E>(input: &'i str) -> IResult<&'i str, BehaviourTree<'i>, E>
where
    E: ParseError<&'i str>,
    E: TagError<&'i str, &'static str>,
    E: FromExternalError<&'i str, CharTryFromError>,
    E: FromExternalError<&'i str, BoundsError>,
    E: ContextError<&'i str, &'static str>,
{
    parse_btree_node.cut().preceded_by(char('^')).parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cool_asserts::assert_matches;
    use nom::Err as NomErr;

    use crate::number::RezNumber;

    fn typed_parse_btree(input: &str) -> IResult<&str, BehaviourTree<'_>, ()> {
        parse_btree(input)
    }

    #[test]
    fn leaf() {
        assert_matches!(
            typed_parse_btree("^[#wait] "),
            Ok((" ", tree)) => {
                assert_eq!(tree.task, "wait");
                assert!(tree.options.is_empty());
                assert!(tree.children.is_empty());
            }
        )
    }

    #[test]
    fn with_options() {
        assert_matches!(
            typed_parse_btree("^[#wait time: 3 message: \"zzz\"] "),
            Ok((" ", tree)) => {
                assert_eq!(tree.task, "wait");
                assert_eq!(tree.options.len(), 2);
                assert_matches!(
                    tree.options.get("time"),
                    Some(AttrValue::Number(RezNumber::Int(3)))
                );
            }
        )
    }

    #[test]
    fn with_children() {
        assert_matches!(
            typed_parse_btree("^[#select [#patrol speed: 2] [#idle]] "),
            Ok((" ", tree)) => {
                assert_eq!(tree.task, "select");
                assert_eq!(tree.children.len(), 2);
                assert_eq!(tree.children[0].task, "patrol");
                assert_eq!(tree.children[1].task, "idle");
            }
        )
    }

    #[test]
    fn deeply_nested() {
        assert_matches!(
            typed_parse_btree("^[#select [#sequence [#wait time: 1] [#move]] [#idle]]"),
            Ok(("", tree)) => {
                assert_eq!(tree.children[0].children.len(), 2);
            }
        )
    }

    #[test]
    fn missing_task_is_hard_error() {
        assert_matches!(typed_parse_btree("^[wait]"), Err(NomErr::Failure(())))
    }

    #[test]
    fn unterminated_is_hard_error() {
        assert_matches!(typed_parse_btree("^[#wait "), Err(NomErr::Failure(())))
    }

    #[test]
    fn bare_caret_does_not_match() {
        assert_matches!(typed_parse_btree("caret"), Err(NomErr::Error(())))
    }
}
