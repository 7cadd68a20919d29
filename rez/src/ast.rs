/*!
The AST node model. Every block kind is a flat variant of [`Node`], each
embedding a [`NodeCore`] with the common fields (status, id, position,
attributes) plus its own payload. The root [`Game`] owns the whole tree, the
identifier map, and the type hierarchy.

Polymorphism is match dispatch over the variant enum; there is no trait
hierarchy.
*/

use std::collections::HashMap;

use rez_primitives::{attribute::Attribute, string::RezString, value::AttrValue};
use serde::Serialize;

use crate::{
    hierarchy::TypeHierarchy,
    id_map::IdMap,
    source::Position,
    template::Template,
};

/// Attribute map for one node, keyed by attribute name. The parser keeps
/// the last occurrence when a name repeats.
pub type AttrMap<'i> = HashMap<String, Attribute<'i>>;

/// Whether the process pass left the node healthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Nothing went wrong
    Ok,

    /// A derived computation failed; the message is surfaced at validation
    Error(String),
}

/// The fields common to every node variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeCore<'i> {
    /// Health of the node after the process pass
    pub status: NodeStatus,

    /// Author-supplied or generated id, if the block shape carries one
    pub id: Option<String>,

    /// Where the `@label` was encountered
    pub position: Position,

    /// The block's attributes
    pub attributes: AttrMap<'i>,
}

impl<'i> NodeCore<'i> {
    /// Create a healthy core.
    pub fn new(id: Option<String>, position: Position, attributes: AttrMap<'i>) -> Self {
        Self {
            status: NodeStatus::Ok,
            id,
            position,
            attributes,
        }
    }

    /// Look up an attribute by name.
    pub fn attr(&self, name: &str) -> Option<&Attribute<'i>> {
        self.attributes.get(name)
    }

    /// Look up an attribute's value by name.
    pub fn attr_value(&self, name: &str) -> Option<&AttrValue<'i>> {
        self.attr(name).map(|attr| &attr.value)
    }

    /// Whether an attribute is present.
    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Insert an attribute unless the author already set one with this name.
    pub fn set_default(&mut self, name: &str, value: AttrValue<'i>) {
        self.attributes
            .entry(name.to_owned())
            .or_insert_with(|| Attribute {
                name: RezString::from_string(name.to_owned()),
                value,
            });
    }
}

/// The body of a delimited text block (`@script` / `@style`). Anonymous
/// content: it carries a position but registers no id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelimitedText {
    /// The trimmed text between `begin` and `end`
    pub text: String,

    /// Where the block was encountered
    pub position: Position,
}

/// The root of a compiled source: the game and everything it owns.
#[derive(Debug, Clone, Serialize)]
pub struct Game<'i> {
    /// Common fields
    pub core: NodeCore<'i>,

    /// Every node in the game, in source order
    pub children: Vec<Node<'i>>,

    /// Every id registered while parsing
    pub id_map: IdMap,

    /// The keyword hierarchy built from `@derive` statements
    pub hierarchy: TypeHierarchy,

    /// The body of the `@script begin ... end` block, if any
    pub script: Option<DelimitedText>,

    /// The body of the `@style begin ... end` block, if any
    pub style: Option<DelimitedText>,

    /// The compiled `layout` template
    pub layout: Option<Template>,
}

/// A scene and the cards it owns.
#[derive(Debug, Clone, Serialize)]
pub struct Scene<'i> {
    /// Common fields
    pub core: NodeCore<'i>,

    /// The scene's cards, in source order
    pub children: Vec<Node<'i>>,

    /// The compiled `layout` template
    pub layout: Option<Template>,
}

/// A card: one unit of renderable content.
#[derive(Debug, Clone, Serialize)]
pub struct Card<'i> {
    /// Common fields
    pub core: NodeCore<'i>,

    /// The compiled `content` template
    pub content: Option<Template>,
}

/// An item the player can hold or use.
#[derive(Debug, Clone, Serialize)]
pub struct Item<'i> {
    /// Common fields
    pub core: NodeCore<'i>,
}

/// An inventory and the slots it owns.
#[derive(Debug, Clone, Serialize)]
pub struct Inventory<'i> {
    /// Common fields
    pub core: NodeCore<'i>,

    /// The inventory's slots, in source order
    pub children: Vec<Node<'i>>,
}

/// A slot: a typed location within an inventory.
#[derive(Debug, Clone, Serialize)]
pub struct Slot<'i> {
    /// Common fields
    pub core: NodeCore<'i>,
}

/// A media asset.
#[derive(Debug, Clone, Serialize)]
pub struct Asset<'i> {
    /// Common fields
    pub core: NodeCore<'i>,
}

/// A tag-driven grouping of assets.
#[derive(Debug, Clone, Serialize)]
pub struct Group<'i> {
    /// Common fields
    pub core: NodeCore<'i>,
}

/// A behaviour tree task definition.
#[derive(Debug, Clone, Serialize)]
pub struct Task<'i> {
    /// Common fields
    pub core: NodeCore<'i>,
}

/// An actor: a character driven by behaviour trees.
#[derive(Debug, Clone, Serialize)]
pub struct Actor<'i> {
    /// Common fields
    pub core: NodeCore<'i>,
}

/// A template helper function.
#[derive(Debug, Clone, Serialize)]
pub struct Helper<'i> {
    /// Common fields
    pub core: NodeCore<'i>,

    /// Parameter names of the handler, extracted during the process pass
    pub params: Vec<String>,
}

/// Any node in the game tree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node<'i> {
    /// An `@game` block (nested; the root game is held directly)
    Game(Game<'i>),
    /// An `@scene` block
    Scene(Scene<'i>),
    /// An `@card` block
    Card(Card<'i>),
    /// An `@item` block
    Item(Item<'i>),
    /// An `@inventory` block
    Inventory(Inventory<'i>),
    /// An `@slot` block
    Slot(Slot<'i>),
    /// An `@asset` block
    Asset(Asset<'i>),
    /// An `@group` block
    Group(Group<'i>),
    /// An `@task` block
    Task(Task<'i>),
    /// An `@actor` block
    Actor(Actor<'i>),
    /// An `@helper` block
    Helper(Helper<'i>),
}

impl<'i> Node<'i> {
    /// The stable kind label of this node.
    pub fn node_type(&self) -> &'static str {
        match self {
            Node::Game(..) => "game",
            Node::Scene(..) => "scene",
            Node::Card(..) => "card",
            Node::Item(..) => "item",
            Node::Inventory(..) => "inventory",
            Node::Slot(..) => "slot",
            Node::Asset(..) => "asset",
            Node::Group(..) => "group",
            Node::Task(..) => "task",
            Node::Actor(..) => "actor",
            Node::Helper(..) => "helper",
        }
    }

    /// The common fields of this node.
    pub fn core(&self) -> &NodeCore<'i> {
        match self {
            Node::Game(n) => &n.core,
            Node::Scene(n) => &n.core,
            Node::Card(n) => &n.core,
            Node::Item(n) => &n.core,
            Node::Inventory(n) => &n.core,
            Node::Slot(n) => &n.core,
            Node::Asset(n) => &n.core,
            Node::Group(n) => &n.core,
            Node::Task(n) => &n.core,
            Node::Actor(n) => &n.core,
            Node::Helper(n) => &n.core,
        }
    }

    /// The common fields of this node, mutably.
    pub fn core_mut(&mut self) -> &mut NodeCore<'i> {
        match self {
            Node::Game(n) => &mut n.core,
            Node::Scene(n) => &mut n.core,
            Node::Card(n) => &mut n.core,
            Node::Item(n) => &mut n.core,
            Node::Inventory(n) => &mut n.core,
            Node::Slot(n) => &mut n.core,
            Node::Asset(n) => &mut n.core,
            Node::Group(n) => &mut n.core,
            Node::Task(n) => &mut n.core,
            Node::Actor(n) => &mut n.core,
            Node::Helper(n) => &mut n.core,
        }
    }

    /// This node's id, if it has one.
    pub fn id(&self) -> Option<&str> {
        self.core().id.as_deref()
    }

    /// Where the node was defined.
    pub fn position(&self) -> &Position {
        &self.core().position
    }

    /// A short human-readable description, e.g. `item#sword`.
    pub fn describe(&self) -> String {
        match self.id() {
            Some(id) => format!("{}#{}", self.node_type(), id),
            None => self.node_type().to_owned(),
        }
    }

    /// The owned children of this node, for tree traversal.
    pub fn children(&self) -> &[Node<'i>] {
        match self {
            Node::Game(n) => &n.children,
            Node::Scene(n) => &n.children,
            Node::Inventory(n) => &n.children,
            _ => &[],
        }
    }

    /// Normalize the node: fill defaulted attributes and expand derived
    /// tags. Pure and idempotent; runs once when the block finishes parsing
    /// and again (with the complete hierarchy) at the start of the process
    /// pass.
    pub fn pre_process(&mut self, hierarchy: &TypeHierarchy) {
        match self {
            Node::Item(item) => item.pre_process(hierarchy),
            Node::Inventory(inventory) => inventory.pre_process(),
            _ => {}
        }
    }

    /// Compute derived fields: compiled templates and helper metadata.
    /// Recurses into owned children. Idempotent after `pre_process`.
    pub fn process(&mut self, hierarchy: &TypeHierarchy) {
        self.pre_process(hierarchy);

        match self {
            Node::Game(game) => game.process_with(hierarchy),
            Node::Scene(scene) => scene.process(hierarchy),
            Node::Card(card) => card.process(),
            Node::Helper(helper) => helper.process(),
            Node::Inventory(inventory) => inventory.process(hierarchy),
            _ => {}
        }
    }
}

/// Compile a string attribute into a template, wrapped in the given
/// envelope. A compile failure is recorded on the node's status; a missing
/// or non-string attribute is not an error here (the validators own that).
fn compile_template(
    core: &mut NodeCore<'_>,
    attr: &str,
    prefix: &str,
    suffix: &str,
) -> Option<Template> {
    let source = match core.attr_value(attr) {
        Some(AttrValue::String(s)) => format!("{prefix}{s}{suffix}"),
        _ => return None,
    };

    match Template::compile(&source) {
        Ok(template) => Some(template),
        Err(err) => {
            core.status = NodeStatus::Error(format!("Attribute '{attr}': {err}"));
            None
        }
    }
}

impl<'i> Game<'i> {
    /// Run the process pass over the whole tree: the game's own templates,
    /// then every child, depth first.
    pub fn process(&mut self) {
        let hierarchy = self.hierarchy.clone();
        self.process_with(&hierarchy);
    }

    fn process_with(&mut self, hierarchy: &TypeHierarchy) {
        self.layout = compile_template(&mut self.core, "layout", "<main class=\"game\">", "</main>");

        for child in &mut self.children {
            child.process(hierarchy);
        }
    }

    /// Every node in the tree, depth first, parents before children.
    pub fn descendants(&self) -> Vec<&Node<'i>> {
        fn collect<'a, 'i>(nodes: &'a [Node<'i>], out: &mut Vec<&'a Node<'i>>) {
            for node in nodes {
                out.push(node);
                collect(node.children(), out);
            }
        }

        let mut out = Vec::new();
        collect(&self.children, &mut out);
        out
    }

    /// Every scene, in source order.
    pub fn scenes(&self) -> Vec<&Scene<'i>> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::Scene(scene) => Some(scene),
                _ => None,
            })
            .collect()
    }

    /// Every card, including cards owned by scenes.
    pub fn cards(&self) -> Vec<&Card<'i>> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::Card(card) => Some(card),
                _ => None,
            })
            .collect()
    }

    /// Every item, in source order.
    pub fn items(&self) -> Vec<&Item<'i>> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::Item(item) => Some(item),
                _ => None,
            })
            .collect()
    }

    /// Every inventory, in source order.
    pub fn inventories(&self) -> Vec<&Inventory<'i>> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::Inventory(inventory) => Some(inventory),
                _ => None,
            })
            .collect()
    }

    /// Every slot, including slots owned by inventories.
    pub fn slots(&self) -> Vec<&Slot<'i>> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::Slot(slot) => Some(slot),
                _ => None,
            })
            .collect()
    }

    /// Every task, in source order.
    pub fn tasks(&self) -> Vec<&Task<'i>> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::Task(task) => Some(task),
                _ => None,
            })
            .collect()
    }

    /// Look up a task by id.
    pub fn task(&self, id: &str) -> Option<&Task<'i>> {
        self.tasks()
            .into_iter()
            .find(|task| task.core.id.as_deref() == Some(id))
    }

    /// Every asset, in source order.
    pub fn assets(&self) -> Vec<&Asset<'i>> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::Asset(asset) => Some(asset),
                _ => None,
            })
            .collect()
    }

    /// Every group, in source order.
    pub fn groups(&self) -> Vec<&Group<'i>> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::Group(group) => Some(group),
                _ => None,
            })
            .collect()
    }

    /// Every actor, in source order.
    pub fn actors(&self) -> Vec<&Actor<'i>> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::Actor(actor) => Some(actor),
                _ => None,
            })
            .collect()
    }

    /// Every helper, in source order.
    pub fn helpers(&self) -> Vec<&Helper<'i>> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::Helper(helper) => Some(helper),
                _ => None,
            })
            .collect()
    }
}

impl<'i> Scene<'i> {
    fn process(&mut self, hierarchy: &TypeHierarchy) {
        let prefix = format!(
            "<div class=\"scene\" id=\"scene_{}\">",
            self.core.id.as_deref().unwrap_or("")
        );
        self.layout = compile_template(&mut self.core, "layout", &prefix, "</div>");

        for child in &mut self.children {
            child.process(hierarchy);
        }
    }
}

impl<'i> Card<'i> {
    fn process(&mut self) {
        let prefix = format!(
            "<div class=\"card\" id=\"card_{}\">",
            self.core.id.as_deref().unwrap_or("")
        );
        self.content = compile_template(&mut self.core, "content", &prefix, "</div>");
    }
}

impl<'i> Item<'i> {
    /// Expand the item's `type` keyword through the hierarchy: the type and
    /// each of its ancestors become members of the `tags` set.
    fn pre_process(&mut self, hierarchy: &TypeHierarchy) {
        let item_type = match self.core.attr_value("type") {
            Some(AttrValue::Keyword(keyword)) => keyword.as_str().to_owned(),
            _ => return,
        };

        let mut expanded = vec![item_type.clone()];
        expanded.extend(hierarchy.fan_out(&item_type));

        let entry = self
            .core
            .attributes
            .entry("tags".to_owned())
            .or_insert_with(|| Attribute {
                name: RezString::from_borrowed("tags"),
                value: AttrValue::Set(Vec::new()),
            });

        // A mistyped author-supplied tags attribute is the validator's
        // problem; leave it untouched.
        if let AttrValue::Set(tags) = &mut entry.value {
            for tag in expanded {
                let keyword = AttrValue::Keyword(RezString::from_string(tag));
                if !tags.contains(&keyword) {
                    tags.push(keyword);
                }
            }
        }
    }
}

impl<'i> Inventory<'i> {
    fn pre_process(&mut self) {
        self.core.set_default("apply_effects", AttrValue::Boolean(false));
    }

    fn process(&mut self, hierarchy: &TypeHierarchy) {
        for child in &mut self.children {
            child.process(hierarchy);
        }
    }
}

impl<'i> Helper<'i> {
    /// Record the handler's parameter names so later stages don't have to
    /// reparse the function attribute.
    fn process(&mut self) {
        if let Some(AttrValue::Function(handler)) = self.core.attr_value("handler") {
            self.params = handler.params.iter().map(|p| (*p).to_owned()).collect();
        }
    }
}
