/*!
Compiler front end for the Rez interactive fiction authoring language.

Source text (already concatenated into a [`LogicalFile`] by the
preprocessor) is parsed into a typed game tree, enriched by a process pass
(template compilation, tag expansion), and checked by a declarative
validator layer. Parse failures abort compilation; validation failures are
collected into a ledger so an author sees every problem at once.

# Example

```rust
use rez::source::LogicalFile;

let source = LogicalFile::new("game.rez", r##"
@game {
    name: "Cave Adventure"
    @scene intro_scene {
        layout: "${content}"
        initial_card: #welcome
        @card welcome { content: "Hello ${player}" }
    }
}
"##);

let game = rez::compile(&source).expect("compile failed");
assert_eq!(game.core.id.as_deref(), Some("game"));

let report = rez::validate(&game);
assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);
```
*/

pub mod ast;
pub mod block;
pub mod hierarchy;
pub mod id_map;
pub mod source;
pub mod template;
pub mod validate;
pub mod validation;

use thiserror::Error;

use crate::{
    ast::Game,
    source::{LogicalFile, Position},
};

pub use crate::validation::{validate, Validation, ValidationError};

/// Compilation errors. Validation problems are not errors in this sense;
/// they accumulate in a [`Validation`] ledger instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A block whose label committed failed to match its shape
    #[error("@{label} block at {position} did not match")]
    BlockNotMatched {
        /// The block label
        label: String,
        /// Where the `@` was encountered
        position: Position,
    },

    /// An `@label` with no registered block schema
    #[error("unknown block type @{label} at {position}")]
    UnknownBlock {
        /// The unrecognized label
        label: String,
        /// Where the `@` was encountered
        position: Position,
    },

    /// Top-level input that is not a block
    #[error("expected a block at {position}")]
    Unexpected {
        /// Where parsing stopped
        position: Position,
    },

    /// A `@derive` statement that would make the type hierarchy cyclic
    #[error("@derive :{tag} :{parent} at {position} would create a cycle")]
    DeriveCycle {
        /// The tag being derived
        tag: String,
        /// The parent it was derived from
        parent: String,
        /// Where the statement was encountered
        position: Position,
    },

    /// A combined line number the logical file could not map back to a
    /// physical file. Indicates a broken preprocessor contract.
    #[error("line {line} is not covered by the logical file")]
    LineUnmapped {
        /// The unmappable combined line
        line: usize,
    },
}

/// Compile a logical file: parse every block, then run the process pass
/// over the assembled game. The result still needs [`validate()`]; parse
/// success only means the source was structurally well formed.
pub fn compile(source: &LogicalFile) -> Result<Game<'_>, CompileError> {
    let mut game = block::BlockParser::new(source).parse()?;
    game.process();
    Ok(game)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cool_asserts::assert_matches;

    use crate::{
        ast::{AttrMap, Node, NodeCore, NodeStatus},
        template::Chunk,
    };
    use rez_primitives::value::AttrValue;

    fn compile_str(text: &str) -> Game<'_> {
        // The game borrows the source text, so the source is leaked for
        // the duration of the test run.
        let source = Box::leak(Box::new(LogicalFile::new("game.rez", text.to_owned())));
        compile(source).expect("compile failed")
    }

    fn messages(report: &Validation) -> Vec<&str> {
        report
            .errors
            .iter()
            .map(|error| error.message.as_str())
            .collect()
    }

    #[test]
    fn item_with_accepting_slot_is_valid() {
        let game = compile_str(
            r#"
            @slot hand { accepts: :weapon }
            @item sword { name: "Sword" type: :weapon size: 3 }
            "#,
        );

        let report = validate(&game);
        assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);
        assert!(report.validated.contains(&"item#sword".to_owned()));
    }

    #[test]
    fn item_without_accepting_slot_is_reported() {
        let game = compile_str(
            r#"
            @slot hand { accepts: :armour }
            @item sword { name: "Sword" type: :weapon }
            "#,
        );

        let report = validate(&game);
        assert!(messages(&report)
            .contains(&"No slot found accepting type weapon for item sword"));
    }

    #[test]
    fn slot_accepts_through_the_hierarchy() {
        let game = compile_str(
            r#"
            @derive :sword :weapon
            @slot hand { accepts: :weapon }
            @item blade { type: :sword }
            "#,
        );

        let report = validate(&game);
        assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);

        // Tag expansion picked up the derive
        assert_matches!(&game.children[1], Node::Item(item) => {
            assert_matches!(item.core.attr_value("tags"), Some(AttrValue::Set(tags)) => {
                assert_eq!(tags.len(), 2);
            });
        });
    }

    #[test]
    fn consumable_requires_uses() {
        let game = compile_str(
            r#"
            @slot hand { accepts: :weapon }
            @item x { type: :weapon consumable: true }
            "#,
        );

        let report = validate(&game);
        assert!(messages(&report)
            .contains(&"Attribute 'consumable' requires 'uses' to be present"));

        // With uses present, the chain is satisfied
        let game = compile_str(
            r#"
            @slot hand { accepts: :weapon }
            @item x { type: :weapon consumable: true uses: 3 }
            "#,
        );
        assert!(validate(&game).is_ok());
    }

    #[test]
    fn consumable_false_skips_the_chain() {
        let game = compile_str(
            r#"
            @slot hand { accepts: :weapon }
            @item x { type: :weapon consumable: false }
            "#,
        );
        assert!(validate(&game).is_ok());
    }

    #[test]
    fn group_needs_tag_selection() {
        let game = compile_str(r#"@group g { type: "image" }"#);

        let report = validate(&game);
        assert!(messages(&report)
            .contains(&"One of 'include_tags', 'exclude_tags' must be present on group#g"));

        let game = compile_str(r#"@group g { type: "image" include_tags: #{:portrait} }"#);
        assert!(validate(&game).is_ok());
    }

    #[test]
    fn group_type_must_be_known() {
        let game = compile_str(r#"@group g { type: "video" include_tags: #{:a} }"#);
        let report = validate(&game);
        assert!(messages(&report)
            .contains(&"Attribute 'type' on group#g should be one of 'image', 'audio', 'text'"));
    }

    #[test]
    fn scene_initial_card_must_resolve() {
        let game = compile_str(
            r#"@scene s { layout: "${content}" initial_card: #intro }"#,
        );

        let report = validate(&game);
        assert!(messages(&report).contains(
            &"Attribute 'initial_card' on scene#s: '#intro' does not resolve to any element"
        ));

        let game = compile_str(
            r#"
            @scene s {
                layout: "${content}"
                initial_card: #intro
                @card intro { content: "hi" }
            }
            "#,
        );
        assert!(validate(&game).is_ok());
    }

    #[test]
    fn ref_to_wrong_kind_is_reported() {
        let game = compile_str(
            r#"
            @scene s {
                layout: "${content}"
                initial_card: #thing
                @card c { content: "hi" }
            }
            @slot hand { accepts: :widget }
            @item thing { type: :widget }
            "#,
        );

        let report = validate(&game);
        assert!(messages(&report).contains(
            &"Attribute 'initial_card' on scene#s: '#thing' should refer to a card, but refers to a item"
        ));
    }

    #[test]
    fn duplicate_ids_are_surfaced_not_fatal() {
        let game = compile_str(
            r#"
            @slot hand { accepts: :thing }
            @item a { type: :thing }
            @item a { type: :thing }
            "#,
        );

        let report = validate(&game);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.starts_with("Duplicate id 'a'"));
        assert_eq!(report.errors[0].node, "game#game");
    }

    #[test]
    fn behaviour_tree_validates_against_tasks() {
        let game = compile_str(
            r#"
            @task patrol { min_children: 1 options: [:speed] }
            @task idle {}
            @actor guard { behaviours: ^[#patrol speed: 2 [#idle]] }
            "#,
        );
        assert!(validate(&game).is_ok());
    }

    #[test]
    fn behaviour_tree_errors_are_merged() {
        let game = compile_str(
            r#"
            @task patrol { min_children: 1 options: [:speed] }
            @actor guard { behaviours: ^[#patrol] }
            "#,
        );

        let report = validate(&game);
        assert_eq!(report.errors.len(), 1);
        let message = &report.errors[0].message;
        assert!(message.contains("task 'patrol' needs at least 1 children, has 0"));
        assert!(message.contains("task 'patrol' requires option 'speed'"));
    }

    #[test]
    fn behaviour_tree_unknown_task() {
        let game = compile_str("@actor guard { behaviours: ^[#ghost] }");

        let report = validate(&game);
        assert!(report.errors[0]
            .message
            .contains("behaviour tree references unknown task 'ghost'"));
    }

    #[test]
    fn helper_params_must_match_declaration() {
        let game = compile_str(
            r#"@helper shout { params: ["text"] handler: (text) => { return text; } }"#,
        );
        assert!(validate(&game).is_ok());

        let game = compile_str(
            r#"@helper shout { params: ["text"] handler: (a, b) => { return a; } }"#,
        );
        let report = validate(&game);
        assert!(messages(&report).contains(
            &"Attribute 'handler' on helper#shout should take parameters (text), takes (a, b)"
        ));
    }

    #[test]
    fn helper_metadata_is_extracted() {
        let game = compile_str(
            r#"@helper shout { handler: (text, game) => { return text; } }"#,
        );
        assert_matches!(&game.children[0], Node::Helper(helper) => {
            assert_eq!(helper.params, ["text", "game"]);
        });
    }

    #[test]
    fn inventory_slots_and_children() {
        let game = compile_str(
            r#"
            @inventory bag {
                slots: [#hand]
                @slot hand { accepts: :thing }
            }
            "#,
        );

        let report = validate(&game);
        assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);

        // apply_effects defaulted by pre_process
        assert_matches!(&game.children[0], Node::Inventory(inventory) => {
            assert_matches!(
                inventory.core.attr_value("apply_effects"),
                Some(AttrValue::Boolean(false))
            );
        });
    }

    #[test]
    fn empty_slot_list_is_reported() {
        let game = compile_str("@inventory bag { slots: [] }");
        let report = validate(&game);
        assert!(messages(&report)
            .contains(&"Attribute 'slots' on inventory#bag must not be empty"));
    }

    #[test]
    fn bad_template_is_surfaced_through_status() {
        let game = compile_str(
            r#"
            @scene s {
                layout: "${content}"
                initial_card: #c
                @card c { content: "oops ${broken" }
            }
            "#,
        );

        let report = validate(&game);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].node, "card#c");
        assert!(report.errors[0].message.contains("unterminated"));
    }

    #[test]
    fn templates_are_compiled_with_envelopes() {
        let game = compile_str(
            r#"
            @scene s {
                layout: "${content}"
                initial_card: #c
                @card c { content: "Hello" }
            }
            "#,
        );

        assert_matches!(&game.children[0], Node::Scene(scene) => {
            assert_matches!(&scene.children[0], Node::Card(card) => {
                assert_matches!(&card.content, Some(template) => {
                    assert_eq!(
                        template.chunks(),
                        [Chunk::Text("<div class=\"card\" id=\"card_c\">Hello</div>".to_owned())]
                    );
                });
            });
        });
    }

    #[test]
    fn process_is_idempotent() {
        let mut game = compile_str(
            r#"
            @derive :sword :weapon
            @slot hand { accepts: :weapon }
            @item blade { type: :sword }
            @scene s {
                layout: "${content}"
                initial_card: #c
                @card c { content: "Hello ${who}" }
            }
            "#,
        );

        let chunks_of = |game: &Game<'_>| -> Vec<Chunk> {
            game.cards()[0]
                .content
                .as_ref()
                .expect("card not compiled")
                .chunks()
                .to_vec()
        };
        let tags_of = |game: &Game<'_>| -> usize {
            match game.items()[0].core.attr_value("tags") {
                Some(AttrValue::Set(tags)) => tags.len(),
                _ => 0,
            }
        };

        let chunks = chunks_of(&game);
        let tags = tags_of(&game);

        game.process();

        assert_eq!(chunks_of(&game), chunks);
        assert_eq!(tags_of(&game), tags);
        assert_matches!(game.cards()[0].core.status, NodeStatus::Ok);
    }

    #[test]
    fn validation_order_is_deterministic() {
        let text = r#"
            @group g { type: "video" }
            @item orphan { }
            @scene s { initial_card: #missing }
        "#;

        let game = compile_str(text);
        let first = validate(&game);
        let second = validate(&game);
        assert_eq!(first, second);

        // Parent-then-children, siblings in source order, validator
        // declaration order within a node.
        let nodes: Vec<&str> = first.errors.iter().map(|e| e.node.as_str()).collect();
        let mut sorted_check = nodes.clone();
        sorted_check.sort_by_key(|node| {
            ["game", "group#g", "item#orphan", "scene#s"]
                .iter()
                .position(|k| node.starts_with(k))
        });
        assert_eq!(nodes, sorted_check);

        // group#g: type check precedes the one_of check, per declaration
        let group_errors: Vec<&str> = first
            .errors
            .iter()
            .filter(|e| e.node == "group#g")
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(group_errors.len(), 2);
        assert!(group_errors[0].starts_with("Attribute 'type'"));
        assert!(group_errors[1].starts_with("One of"));
    }

    #[test]
    fn validated_lists_children_before_parent() {
        let game = compile_str(
            r#"
            @scene s {
                layout: "${content}"
                initial_card: #c
                @card c { content: "hi" }
            }
            "#,
        );

        let report = validate(&game);
        let card_at = report
            .validated
            .iter()
            .position(|d| d == "card#c")
            .expect("card not validated");
        let scene_at = report
            .validated
            .iter()
            .position(|d| d == "scene#s")
            .expect("scene not validated");
        let game_at = report
            .validated
            .iter()
            .position(|d| d == "game#game")
            .expect("game not validated");

        assert!(card_at < scene_at);
        assert!(scene_at < game_at);
    }

    #[test]
    fn merge_concatenates_in_order() {
        let error = |node: &str| ValidationError {
            node: node.to_owned(),
            position: Position {
                file: "game.rez".to_owned(),
                line: 1,
                col: 1,
            },
            message: "problem".to_owned(),
        };

        let mut first = Validation::new();
        first.errors.push(error("a"));
        first.validated.push("a".to_owned());

        let mut second = Validation::new();
        second.errors.push(error("b"));
        second.validated.push("b".to_owned());

        first.merge(second);
        assert_eq!(first.errors.len(), 2);
        assert_eq!(first.errors[0].node, "a");
        assert_eq!(first.errors[1].node, "b");
        assert_eq!(first.validated, ["a", "b"]);
    }

    #[test]
    fn script_and_style_land_on_the_game() {
        let game = compile_str(
            "@script begin console.log(1); end\n@style begin .x { } end",
        );

        assert_matches!(&game.script, Some(script) => {
            assert_eq!(script.text, "console.log(1);");
            assert_eq!(script.position.line, 1);
        });
        assert_matches!(&game.style, Some(style) => {
            assert_eq!(style.text, ".x { }");
            assert_eq!(style.position.line, 2);
        });
    }

    #[test]
    fn game_layout_is_compiled() {
        let game = compile_str(r#"@game { layout: "${scene}" }"#);

        assert_matches!(&game.layout, Some(template) => {
            assert_eq!(
                template.chunks(),
                [
                    Chunk::Text("<main class=\"game\">".to_owned()),
                    Chunk::Expr("scene".to_owned()),
                    Chunk::Text("</main>".to_owned()),
                ]
            );
        });
    }

    #[test]
    fn compile_error_display_carries_position() {
        let source = LogicalFile::new("game.rez", "@item sword");
        let error = compile(&source).expect_err("compile succeeded");

        assert_matches!(&error, CompileError::BlockNotMatched { .. });
        assert_eq!(
            error.to_string(),
            "@item block at game.rez:1:1 did not match"
        );
    }

    #[test]
    fn empty_source_synthesizes_a_root() {
        let source = LogicalFile::new("game.rez", "");
        let game = compile(&source).expect("compile failed");

        assert_eq!(game.core.id.as_deref(), Some("game"));
        assert!(game.children.is_empty());
        assert_eq!(
            game.core,
            NodeCore::new(
                Some("game".to_owned()),
                Position {
                    file: "game.rez".to_owned(),
                    line: 1,
                    col: 1
                },
                AttrMap::new()
            )
        );
    }
}
