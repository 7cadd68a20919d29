/*!
Block parsing: recognizing `@label` structures and assembling them into the
game tree. The grammar below the block level lives in `rez-primitives` as
pure nom parsers; this module drives them from a stateful [`BlockParser`]
that owns the remaining input alongside the side-band state a block needs
when it completes: the logical file (for positions), the identifier map, and
the type hierarchy.

Once an `@label` has resolved to a known block schema the parse is
committed: any structural failure inside the block is a hard
[`BlockNotMatched`][crate::CompileError::BlockNotMatched] error rather than
a backtrack.
*/

use memchr::memchr_iter;
use nom::{character::complete::char, Err as NomErr, Parser};
use nom_supreme::tag::complete::tag;

use rez_primitives::{
    attribute::parse_attribute,
    string::{is_identifier, parse_identifier},
    value::{parse_keyword, AttrValue},
    whitespace::parse_linespace,
};

use crate::{
    ast::{
        Actor, Asset, AttrMap, Card, DelimitedText, Game, Group, Helper, Inventory, Item, Node,
        NodeCore, Scene, Slot, Task,
    },
    hierarchy::TypeHierarchy,
    id_map::{IdMap, IdRecord},
    source::{LogicalFile, Position},
    CompileError,
};

/// The structural shape of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockShape {
    /// `@label { attrs }`; the id is generated from the attributes
    AutoId,

    /// `@label id { attrs }`
    RequiredId,

    /// `@label id`, optionally followed by `{ attrs }`
    OptionalAttrs,

    /// `@label { (attr | child)* }` with a generated id
    Children,

    /// `@label id { (attr | child)* }`
    IdChildren,

    /// `@label begin ... end`
    Delimited,

    /// `@derive :tag :parent`
    Derive,
}

struct BlockSchema {
    label: &'static str,
    kind: &'static str,
    shape: BlockShape,
}

const SCHEMAS: &[BlockSchema] = &[
    BlockSchema {
        label: "game",
        kind: "game",
        shape: BlockShape::Children,
    },
    BlockSchema {
        label: "scene",
        kind: "scene",
        shape: BlockShape::IdChildren,
    },
    BlockSchema {
        label: "inventory",
        kind: "inventory",
        shape: BlockShape::IdChildren,
    },
    BlockSchema {
        label: "card",
        kind: "card",
        shape: BlockShape::RequiredId,
    },
    BlockSchema {
        label: "item",
        kind: "item",
        shape: BlockShape::RequiredId,
    },
    BlockSchema {
        label: "task",
        kind: "task",
        shape: BlockShape::RequiredId,
    },
    BlockSchema {
        label: "group",
        kind: "group",
        shape: BlockShape::RequiredId,
    },
    BlockSchema {
        label: "helper",
        kind: "helper",
        shape: BlockShape::RequiredId,
    },
    BlockSchema {
        label: "actor",
        kind: "actor",
        shape: BlockShape::RequiredId,
    },
    BlockSchema {
        label: "slot",
        kind: "slot",
        shape: BlockShape::OptionalAttrs,
    },
    BlockSchema {
        label: "asset",
        kind: "asset",
        shape: BlockShape::AutoId,
    },
    BlockSchema {
        label: "script",
        kind: "script",
        shape: BlockShape::Delimited,
    },
    BlockSchema {
        label: "style",
        kind: "style",
        shape: BlockShape::Delimited,
    },
    BlockSchema {
        label: "derive",
        kind: "derive",
        shape: BlockShape::Derive,
    },
];

/// Run a parser on a mutable reference to some input. If the parse is
/// successful, the input is updated in-place, and the result of the parse
/// is returned.
fn run_parser_on<'i, O>(
    input: &mut &'i str,
    mut parser: impl Parser<&'i str, O, ()>,
) -> Result<O, NomErr<()>> {
    parser.parse(*input).map(|(tail, value)| {
        *input = tail;
        value
    })
}

/// A failure inside a committed block. `Syntax` becomes `BlockNotMatched`
/// at the block boundary; `Fatal` carries an error that must not be
/// re-labelled (a nested block's failure, a derive cycle).
enum BodyError {
    Syntax,
    Fatal(CompileError),
}

impl From<NomErr<()>> for BodyError {
    fn from(_: NomErr<()>) -> Self {
        BodyError::Syntax
    }
}

/// The stateful block parser. Consumes the logical file's text from the
/// front, registering ids and derive statements as blocks complete.
pub struct BlockParser<'i> {
    source: &'i LogicalFile,
    full: &'i str,
    state: &'i str,
    id_map: IdMap,
    hierarchy: TypeHierarchy,
    script: Option<DelimitedText>,
    style: Option<DelimitedText>,
    asset_counter: usize,
}

impl<'i> BlockParser<'i> {
    /// Create a parser over a logical file.
    pub fn new(source: &'i LogicalFile) -> Self {
        let full = source.text();
        Self {
            source,
            full,
            state: full,
            id_map: IdMap::new(),
            hierarchy: TypeHierarchy::new(),
            script: None,
            style: None,
            asset_counter: 0,
        }
    }

    fn run<T>(&mut self, parser: impl Parser<&'i str, T, ()>) -> Result<T, NomErr<()>> {
        run_parser_on(&mut self.state, parser)
    }

    /// Resolve the position of a point in the input: combined line and
    /// column from the consumed prefix, then physical file and line from
    /// the logical file.
    fn position_of(&self, at: &'i str) -> Result<Position, CompileError> {
        let offset = self.full.len() - at.len();
        let consumed = &self.full[..offset];

        let line = memchr_iter(b'\n', consumed.as_bytes()).count() + 1;
        let line_start = consumed.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let col = consumed[line_start..].chars().count() + 1;

        let (file, file_line) = self
            .source
            .resolve_line(line)
            .ok_or(CompileError::LineUnmapped { line })?;

        Ok(Position {
            file: file.to_owned(),
            line: file_line,
            col,
        })
    }

    /// Parse the whole logical file and assemble the root game.
    pub fn parse(mut self) -> Result<Game<'i>, CompileError> {
        let mut nodes = Vec::new();

        loop {
            let _ = self.run(parse_linespace);
            if self.state.is_empty() {
                break;
            }
            if let Some(node) = self.parse_block()? {
                nodes.push(node);
            }
        }

        Ok(self.assemble(nodes))
    }

    /// Parse one block, starting at `@`. Statements and delimited text
    /// blocks land in side state and return `None`.
    fn parse_block(&mut self) -> Result<Option<Node<'i>>, CompileError> {
        let entry = self.state;
        let position = self.position_of(entry)?;

        if self.run(char('@')).is_err() {
            return Err(CompileError::Unexpected { position });
        }

        let label = match self.run(parse_identifier) {
            Ok(label) => label,
            Err(_) => return Err(CompileError::Unexpected { position }),
        };

        let schema = SCHEMAS
            .iter()
            .find(|schema| schema.label == label)
            .ok_or_else(|| CompileError::UnknownBlock {
                label: label.to_owned(),
                position: position.clone(),
            })?;

        // The label resolved to a schema: the parse is now committed.
        match self.parse_body(schema, &position) {
            Ok(node) => Ok(node),
            Err(BodyError::Syntax) => Err(CompileError::BlockNotMatched {
                label: schema.label.to_owned(),
                position,
            }),
            Err(BodyError::Fatal(error)) => Err(error),
        }
    }

    fn parse_body(
        &mut self,
        schema: &BlockSchema,
        position: &Position,
    ) -> Result<Option<Node<'i>>, BodyError> {
        match schema.shape {
            BlockShape::Derive => {
                self.parse_derive(position)?;
                Ok(None)
            }
            BlockShape::Delimited => {
                self.parse_delimited(schema, position)?;
                Ok(None)
            }
            BlockShape::AutoId => {
                let (attrs, _) = self.parse_braced_body(false)?;
                let id = self.generated_id(schema, &attrs);
                Ok(Some(self.build(schema, Some(id), position, attrs, Vec::new())))
            }
            BlockShape::RequiredId => {
                let id = self.parse_id()?;
                let (attrs, _) = self.parse_braced_body(false)?;
                Ok(Some(self.build(schema, Some(id), position, attrs, Vec::new())))
            }
            BlockShape::OptionalAttrs => {
                let id = self.parse_id()?;
                let _ = self.run(parse_linespace);
                let attrs = if self.state.starts_with('{') {
                    self.parse_braced_body(false)?.0
                } else {
                    AttrMap::new()
                };
                Ok(Some(self.build(schema, Some(id), position, attrs, Vec::new())))
            }
            BlockShape::Children => {
                let (attrs, children) = self.parse_braced_body(true)?;
                Ok(Some(self.build(
                    schema,
                    Some("game".to_owned()),
                    position,
                    attrs,
                    children,
                )))
            }
            BlockShape::IdChildren => {
                let id = self.parse_id()?;
                let (attrs, children) = self.parse_braced_body(true)?;
                Ok(Some(self.build(schema, Some(id), position, attrs, children)))
            }
        }
    }

    fn parse_id(&mut self) -> Result<String, BodyError> {
        let _ = self.run(parse_linespace);
        let id = self.run(parse_identifier)?;
        Ok(id.to_owned())
    }

    /// Parse `{ (attr | child)* }`. The contents are partitioned into the
    /// attribute map (last occurrence of a name wins) and, when the shape
    /// allows them, child nodes.
    fn parse_braced_body(
        &mut self,
        children_allowed: bool,
    ) -> Result<(AttrMap<'i>, Vec<Node<'i>>), BodyError> {
        let _ = self.run(parse_linespace);
        self.run(char('{'))?;

        let mut attrs = AttrMap::new();
        let mut children = Vec::new();

        loop {
            let _ = self.run(parse_linespace);
            if self.run(char('}')).is_ok() {
                break;
            }

            if self.state.starts_with('@') {
                if !children_allowed {
                    return Err(BodyError::Syntax);
                }
                if let Some(child) = self.parse_block().map_err(BodyError::Fatal)? {
                    children.push(child);
                }
                continue;
            }

            let attr = self.run(parse_attribute)?;
            attrs.insert(attr.name.as_str().to_owned(), attr);
        }

        Ok((attrs, children))
    }

    fn parse_derive(&mut self, position: &Position) -> Result<(), BodyError> {
        let _ = self.run(parse_linespace);
        let tag_keyword = self.run(parse_keyword)?;
        let _ = self.run(parse_linespace);
        let parent_keyword = self.run(parse_keyword)?;

        self.hierarchy
            .derive(tag_keyword.as_str(), parent_keyword.as_str())
            .map_err(|_| {
                BodyError::Fatal(CompileError::DeriveCycle {
                    tag: tag_keyword.as_str().to_owned(),
                    parent: parent_keyword.as_str().to_owned(),
                    position: position.clone(),
                })
            })
    }

    fn parse_delimited(&mut self, schema: &BlockSchema, position: &Position) -> Result<(), BodyError> {
        let _ = self.run(parse_linespace);
        self.run(tag("begin"))?;
        if self.state.chars().next().map_or(false, is_identifier) {
            return Err(BodyError::Syntax);
        }

        let body = DelimitedText {
            text: self.take_until_end()?.trim().to_owned(),
            position: position.clone(),
        };
        match schema.label {
            "script" => self.script = Some(body),
            _ => self.style = Some(body),
        }
        Ok(())
    }

    /// Take everything up to the first word-bounded literal `end`. There is
    /// no nesting; `end` inside a longer identifier does not close the
    /// block.
    fn take_until_end(&mut self) -> Result<&'i str, BodyError> {
        let hay = self.state;
        let mut search = 0;

        loop {
            match hay[search..].find("end") {
                None => return Err(BodyError::Syntax),
                Some(i) => {
                    let at = search + i;
                    let open = hay[..at].chars().next_back().map_or(true, |c| !is_identifier(c));
                    let close = hay[at + 3..].chars().next().map_or(true, |c| !is_identifier(c));

                    if open && close {
                        self.state = &hay[at + 3..];
                        return Ok(&hay[..at]);
                    }
                    search = at + 3;
                }
            }
        }
    }

    /// Generate an id for an auto-id block from its attributes, or from a
    /// counter when the attributes don't offer one.
    fn generated_id(&mut self, schema: &BlockSchema, attrs: &AttrMap<'i>) -> String {
        match attrs.get("name").map(|attr| &attr.value) {
            Some(AttrValue::String(name)) if !name.is_empty() => slug(name),
            _ => {
                self.asset_counter += 1;
                format!("{}_{}", schema.kind, self.asset_counter)
            }
        }
    }

    /// Construct the node for a completed block, run its `pre_process`, and
    /// register its id. Ids land in the map before any sibling block is
    /// parsed.
    fn build(
        &mut self,
        schema: &BlockSchema,
        id: Option<String>,
        position: &Position,
        attrs: AttrMap<'i>,
        children: Vec<Node<'i>>,
    ) -> Node<'i> {
        let core = NodeCore::new(id, position.clone(), attrs);

        let mut node = match schema.kind {
            "game" => Node::Game(Game {
                core,
                children,
                id_map: IdMap::new(),
                hierarchy: TypeHierarchy::new(),
                script: None,
                style: None,
                layout: None,
            }),
            "scene" => Node::Scene(Scene {
                core,
                children,
                layout: None,
            }),
            "inventory" => Node::Inventory(Inventory { core, children }),
            "card" => Node::Card(Card {
                core,
                content: None,
            }),
            "item" => Node::Item(Item { core }),
            "slot" => Node::Slot(Slot { core }),
            "asset" => Node::Asset(Asset { core }),
            "group" => Node::Group(Group { core }),
            "task" => Node::Task(Task { core }),
            "actor" => Node::Actor(Actor { core }),
            "helper" => Node::Helper(Helper {
                core,
                params: Vec::new(),
            }),
            other => panic!("schema kind {other} is not structural. This is a rez bug."),
        };

        node.pre_process(&self.hierarchy);

        if let Some(id) = node.id() {
            self.id_map.register(
                id,
                IdRecord {
                    kind: schema.kind,
                    file: position.file.clone(),
                    line: position.line,
                },
            );
        }

        node
    }

    /// Fold the top-level nodes into the root game: the first `@game` block
    /// if one appeared, or a synthesized root otherwise. The parser's side
    /// state (id map, hierarchy, delimited texts) moves onto the root.
    fn assemble(self, nodes: Vec<Node<'i>>) -> Game<'i> {
        let BlockParser {
            source,
            id_map,
            hierarchy,
            script,
            style,
            ..
        } = self;

        let mut game = None;
        let mut rest = Vec::new();

        for node in nodes {
            match node {
                Node::Game(g) if game.is_none() => game = Some(g),
                other => rest.push(other),
            }
        }

        let mut game = game.unwrap_or_else(|| {
            let file = source
                .resolve_line(1)
                .map(|(file, _)| file.to_owned())
                .unwrap_or_default();

            Game {
                core: NodeCore::new(
                    Some("game".to_owned()),
                    Position { file, line: 1, col: 1 },
                    AttrMap::new(),
                ),
                children: Vec::new(),
                id_map: IdMap::new(),
                hierarchy: TypeHierarchy::new(),
                script: None,
                style: None,
                layout: None,
            }
        });

        game.children.extend(rest);
        game.id_map = id_map;
        game.hierarchy = hierarchy;
        game.script = script;
        game.style = style;
        game
    }
}

/// Reduce an asset name to an id: identifier characters are kept (lower
/// cased), everything else becomes an underscore.
fn slug(name: &str) -> String {
    let mut id: String = name
        .chars()
        .map(|c| {
            if is_identifier(c) {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if id.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        id.insert(0, '_');
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use cool_asserts::assert_matches;

    use crate::id_map::IdEntry;
    use rez_primitives::number::RezNumber;

    fn parse_source(text: &str) -> Result<(), CompileError> {
        let source = LogicalFile::new("game.rez", text);
        BlockParser::new(&source).parse().map(|_| ())
    }

    #[test]
    fn item_block() {
        let source = LogicalFile::new(
            "game.rez",
            r#"@item sword { name: "Sword" type: :weapon size: 3 }"#,
        );
        let game = BlockParser::new(&source).parse().expect("parse failed");

        assert_eq!(game.children.len(), 1);
        assert_matches!(&game.children[0], Node::Item(item) => {
            assert_eq!(item.core.id.as_deref(), Some("sword"));
            assert_matches!(
                item.core.attr_value("name"),
                Some(AttrValue::String(s)) => assert_eq!(s, "Sword")
            );
            assert_matches!(
                item.core.attr_value("type"),
                Some(AttrValue::Keyword(k)) => assert_eq!(k, "weapon")
            );
            assert_matches!(
                item.core.attr_value("size"),
                Some(AttrValue::Number(RezNumber::Int(3)))
            );
        });

        assert_eq!(game.id_map.kind_of("sword"), Some("item"));
    }

    #[test]
    fn position_is_resolved_through_the_logical_file() {
        let mut source = LogicalFile::new("game.rez", "\n\n@item a { type: :thing }\n");
        source.include("extra.rez", 5, "  @item b { type: :thing }");

        let game = BlockParser::new(&source).parse().expect("parse failed");

        assert_matches!(&game.children[0], Node::Item(item) => {
            assert_eq!(item.core.position.file, "game.rez");
            assert_eq!(item.core.position.line, 3);
            assert_eq!(item.core.position.col, 1);
        });
        assert_matches!(&game.children[1], Node::Item(item) => {
            assert_eq!(item.core.position.file, "extra.rez");
            assert_eq!(item.core.position.line, 5);
            assert_eq!(item.core.position.col, 3);
        });
    }

    #[test]
    fn duplicate_ids_collide_newest_first() {
        let source = LogicalFile::new("game.rez", "@item a {}\n@item a {}");
        let game = BlockParser::new(&source).parse().expect("parse failed");

        assert_matches!(game.id_map.get("a"), Some(IdEntry::Collision(records)) => {
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].line, 2);
            assert_eq!(records[1].line, 1);
        });
    }

    #[test]
    fn game_block_partitions_attrs_and_children() {
        let source = LogicalFile::new(
            "game.rez",
            r#"
            @game {
                name: "Test Game"
                @scene lobby {
                    layout: "${content}"
                    initial_card: #welcome
                    @card welcome { content: "hi" }
                }
                @item sword { type: :weapon }
            }
            "#,
        );
        let game = BlockParser::new(&source).parse().expect("parse failed");

        assert_eq!(game.core.id.as_deref(), Some("game"));
        assert_matches!(
            game.core.attr_value("name"),
            Some(AttrValue::String(s)) => assert_eq!(s, "Test Game")
        );
        assert_eq!(game.children.len(), 2);
        assert_matches!(&game.children[0], Node::Scene(scene) => {
            assert_eq!(scene.core.id.as_deref(), Some("lobby"));
            assert_eq!(scene.children.len(), 1);
            assert_matches!(&scene.children[0], Node::Card(card) => {
                assert_eq!(card.core.id.as_deref(), Some("welcome"));
            });
        });

        // Children registered before the enclosing block finishes
        assert_eq!(game.id_map.kind_of("welcome"), Some("card"));
        assert_eq!(game.id_map.kind_of("lobby"), Some("scene"));
    }

    #[test]
    fn slot_attrs_are_optional() {
        let source = LogicalFile::new(
            "game.rez",
            "@slot bare\n@slot typed { accepts: :weapon }",
        );
        let game = BlockParser::new(&source).parse().expect("parse failed");

        assert_matches!(&game.children[0], Node::Slot(slot) => {
            assert!(slot.core.attributes.is_empty());
        });
        assert_matches!(&game.children[1], Node::Slot(slot) => {
            assert_matches!(
                slot.core.attr_value("accepts"),
                Some(AttrValue::Keyword(k)) => assert_eq!(k, "weapon")
            );
        });
    }

    #[test]
    fn asset_id_is_generated_from_name() {
        let source = LogicalFile::new(
            "game.rez",
            r#"@asset { name: "Frog Portrait" file_name: "frog.jpg" }
               @asset { file_name: "anon.png" }"#,
        );
        let game = BlockParser::new(&source).parse().expect("parse failed");

        assert_matches!(&game.children[0], Node::Asset(asset) => {
            assert_eq!(asset.core.id.as_deref(), Some("frog_portrait"));
        });
        assert_matches!(&game.children[1], Node::Asset(asset) => {
            assert_eq!(asset.core.id.as_deref(), Some("asset_1"));
        });
        assert_eq!(game.id_map.kind_of("frog_portrait"), Some("asset"));
    }

    #[test]
    fn derive_builds_the_hierarchy() {
        let source = LogicalFile::new(
            "game.rez",
            "@derive :sword :weapon\n@derive :weapon :item",
        );
        let game = BlockParser::new(&source).parse().expect("parse failed");

        assert!(game.hierarchy.is_a("sword", "item"));
        assert!(game.children.is_empty());
    }

    #[test]
    fn derive_cycle_is_a_compile_error() {
        assert_matches!(
            parse_source("@derive :a :b\n@derive :b :a"),
            Err(CompileError::DeriveCycle { tag, parent, .. }) => {
                assert_eq!(tag, "b");
                assert_eq!(parent, "a");
            }
        );
    }

    #[test]
    fn script_block_is_delimited_text() {
        let source = LogicalFile::new(
            "game.rez",
            "@script begin\nlet ended = false;\nrun();\nend\n@item a { type: :x }",
        );
        let game = BlockParser::new(&source).parse().expect("parse failed");

        assert_matches!(&game.script, Some(script) => {
            assert_eq!(script.text, "let ended = false;\nrun();");
            assert_eq!(script.position.line, 1);
        });
        assert_eq!(game.children.len(), 1);
    }

    #[test]
    fn style_block_is_delimited_text() {
        let source = LogicalFile::new("game.rez", "@style begin .card { color: red } end");
        let game = BlockParser::new(&source).parse().expect("parse failed");

        assert_matches!(&game.style, Some(style) => {
            assert_eq!(style.text, ".card { color: red }");
        });
    }

    #[test]
    fn committed_block_failure_is_block_not_matched() {
        assert_matches!(
            parse_source("@item sword"),
            Err(CompileError::BlockNotMatched { label, position }) => {
                assert_eq!(label, "item");
                assert_eq!(position.line, 1);
                assert_eq!(position.col, 1);
            }
        );
    }

    #[test]
    fn bad_attribute_in_committed_block() {
        assert_matches!(
            parse_source("@item sword { name }"),
            Err(CompileError::BlockNotMatched { label, .. }) => assert_eq!(label, "item")
        );
    }

    #[test]
    fn child_block_in_attrs_only_body() {
        assert_matches!(
            parse_source("@item sword { @card c { content: \"x\" } }"),
            Err(CompileError::BlockNotMatched { label, .. }) => assert_eq!(label, "item")
        );
    }

    #[test]
    fn unknown_label() {
        assert_matches!(
            parse_source("@wibble x {}"),
            Err(CompileError::UnknownBlock { label, .. }) => assert_eq!(label, "wibble")
        );
    }

    #[test]
    fn top_level_junk() {
        assert_matches!(
            parse_source("item sword {}"),
            Err(CompileError::Unexpected { position }) => {
                assert_eq!(position.line, 1);
                assert_eq!(position.col, 1);
            }
        );
    }

    #[test]
    fn repeated_attribute_keeps_the_last_occurrence() {
        let source = LogicalFile::new("game.rez", "@item a { size: 1 size: 2 }");
        let game = BlockParser::new(&source).parse().expect("parse failed");

        assert_matches!(&game.children[0], Node::Item(item) => {
            assert_eq!(item.core.attributes.len(), 1);
            assert_matches!(
                item.core.attr_value("size"),
                Some(AttrValue::Number(RezNumber::Int(2)))
            );
        });
    }

    #[test]
    fn comments_between_blocks() {
        let source = LogicalFile::new(
            "game.rez",
            "%% the armoury\n@item sword { type: :weapon } %% trailing\n",
        );
        let game = BlockParser::new(&source).parse().expect("parse failed");
        assert_eq!(game.children.len(), 1);
    }
}
