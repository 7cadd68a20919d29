/*!
The validator DSL. Validators are closure values composed into pipelines:
each builder checks one fact about a node or attribute and, on success,
hands the attribute to an optional chained validator. Failures are messages,
never panics; the driver collects them into a ledger.
*/

use rez_primitives::{
    attribute::Attribute,
    btree::BehaviourTree,
    number::RezNumber,
    value::{AttrType, AttrValue},
};

use crate::ast::{Game, Node, NodeCore, NodeStatus};

/// The result of one validator: ok, or a human readable message.
pub type Outcome = Result<(), String>;

/// A view of the node under validation. The root game runs through the same
/// machinery as every other node.
#[derive(Clone, Copy)]
pub enum NodeView<'a, 'i> {
    /// The root game
    Game(&'a Game<'i>),

    /// Any node inside the tree
    Node(&'a Node<'i>),
}

impl<'a, 'i> NodeView<'a, 'i> {
    /// The common fields of the node.
    pub fn core(&self) -> &'a NodeCore<'i> {
        match self {
            NodeView::Game(game) => &game.core,
            NodeView::Node(node) => node.core(),
        }
    }

    /// The node's kind label.
    pub fn node_type(&self) -> &'static str {
        match self {
            NodeView::Game(..) => "game",
            NodeView::Node(node) => node.node_type(),
        }
    }

    /// A short description, e.g. `item#sword`.
    pub fn describe(&self) -> String {
        match self.core().id.as_deref() {
            Some(id) => format!("{}#{id}", self.node_type()),
            None => self.node_type().to_owned(),
        }
    }

    /// The node's owned children.
    pub fn children(&self) -> &'a [Node<'i>] {
        match self {
            NodeView::Game(game) => &game.children,
            NodeView::Node(node) => node.children(),
        }
    }
}

/// A validator over a node in its game context.
pub struct Validator {
    check: Box<dyn Fn(NodeView<'_, '_>, &Game<'_>) -> Outcome>,
}

impl Validator {
    /// Wrap a check function.
    pub fn new(check: impl Fn(NodeView<'_, '_>, &Game<'_>) -> Outcome + 'static) -> Self {
        Self {
            check: Box::new(check),
        }
    }

    /// Run the check.
    pub fn run(&self, node: NodeView<'_, '_>, game: &Game<'_>) -> Outcome {
        (self.check)(node, game)
    }
}

/// A chained validator: runs against an attribute once the upstream check
/// has succeeded.
pub type Chain = Box<dyn Fn(&Attribute<'_>, NodeView<'_, '_>, &Game<'_>) -> Outcome>;

fn run_chain(
    next: &Option<Chain>,
    attr: &Attribute<'_>,
    node: NodeView<'_, '_>,
    game: &Game<'_>,
) -> Outcome {
    match next {
        None => Ok(()),
        Some(next) => next(attr, node, game),
    }
}

fn quoted_list(values: &[&str]) -> String {
    values
        .iter()
        .map(|value| format!("'{value}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn type_list(types: &[AttrType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Passes iff `key` is present; the chain then sees the attribute.
pub fn present(key: &'static str, next: Option<Chain>) -> Validator {
    Validator::new(move |node, game| match node.core().attr(key) {
        None => Err(format!(
            "Attribute '{key}' is required on {}",
            node.describe()
        )),
        Some(attr) => run_chain(&next, attr, node, game),
    })
}

/// An absent `key` passes; a present one is handed to the chain.
pub fn if_present(key: &'static str, next: Chain) -> Validator {
    Validator::new(move |node, game| match node.core().attr(key) {
        None => Ok(()),
        Some(attr) => next(attr, node, game),
    })
}

/// Passes iff either validator passes; otherwise reports both messages.
pub fn either(first: Validator, second: Validator) -> Validator {
    Validator::new(move |node, game| match first.run(node, game) {
        Ok(()) => Ok(()),
        Err(first_error) => match second.run(node, game) {
            Ok(()) => Ok(()),
            Err(second_error) => Err(format!("{first_error}; {second_error}")),
        },
    })
}

/// At least one of `keys` must be present; with `exclusive`, at most one.
pub fn one_of_present(keys: &'static [&'static str], exclusive: bool) -> Validator {
    Validator::new(move |node, _game| {
        let found = keys
            .iter()
            .filter(|key| node.core().has_attr(key))
            .count();

        if found == 0 {
            Err(format!(
                "One of {} must be present on {}",
                quoted_list(keys),
                node.describe()
            ))
        } else if exclusive && found > 1 {
            Err(format!(
                "Only one of {} may be present on {}",
                quoted_list(keys),
                node.describe()
            ))
        } else {
            Ok(())
        }
    })
}

/// Requires every key in `keys` to also be present. Chain form: expresses
/// "if A is set, B and C are required".
pub fn other_attrs_present(keys: &'static [&'static str], next: Option<Chain>) -> Chain {
    Box::new(move |attr, node, game| {
        for key in keys {
            if !node.core().has_attr(key) {
                return Err(format!(
                    "Attribute '{}' requires '{key}' to be present",
                    attr.name
                ));
            }
        }
        run_chain(&next, attr, node, game)
    })
}

/// The attribute's type tag must equal `expected`.
pub fn has_type(expected: AttrType, next: Option<Chain>) -> Chain {
    Box::new(move |attr, node, game| {
        let actual = attr.attr_type();
        if actual == expected {
            run_chain(&next, attr, node, game)
        } else {
            Err(format!(
                "Attribute '{}' on {} should be a {expected}, not a {actual}",
                attr.name,
                node.describe()
            ))
        }
    })
}

/// The attribute's string or keyword value must be one of `values`.
pub fn value_one_of(values: &'static [&'static str], next: Option<Chain>) -> Chain {
    Box::new(move |attr, node, game| {
        let text = match &attr.value {
            AttrValue::String(s) => Some(s.as_str()),
            AttrValue::Keyword(k) => Some(k.as_str()),
            _ => None,
        };

        match text {
            Some(text) if values.contains(&text) => run_chain(&next, attr, node, game),
            _ => Err(format!(
                "Attribute '{}' on {} should be one of {}",
                attr.name,
                node.describe(),
                quoted_list(values)
            )),
        }
    })
}

/// The collection attribute must have at least one element.
pub fn not_empty(next: Option<Chain>) -> Chain {
    Box::new(move |attr, node, game| match attr.value.elements() {
        None => Err(format!(
            "Attribute '{}' on {} is not a collection",
            attr.name,
            node.describe()
        )),
        Some([]) => Err(format!(
            "Attribute '{}' on {} must not be empty",
            attr.name,
            node.describe()
        )),
        Some(_) => run_chain(&next, attr, node, game),
    })
}

/// Every element's type tag must be one of `types`.
pub fn coll_of(types: &'static [AttrType], next: Option<Chain>) -> Chain {
    Box::new(move |attr, node, game| {
        let elements = match attr.value.elements() {
            None => {
                return Err(format!(
                    "Attribute '{}' on {} is not a collection",
                    attr.name,
                    node.describe()
                ))
            }
            Some(elements) => elements,
        };

        for element in elements {
            let actual = element.attr_type();
            if !types.contains(&actual) {
                return Err(format!(
                    "Attribute '{}' on {} may only contain {} values, found a {actual}",
                    attr.name,
                    node.describe(),
                    type_list(types)
                ));
            }
        }

        run_chain(&next, attr, node, game)
    })
}

fn resolve_ref(
    attr_name: &str,
    described: &str,
    id: &str,
    kind: &'static str,
    game: &Game<'_>,
) -> Outcome {
    match game.id_map.kind_of(id) {
        None => Err(format!(
            "Attribute '{attr_name}' on {described}: '#{id}' does not resolve to any element"
        )),
        Some(actual) if actual == kind => Ok(()),
        Some(actual) => Err(format!(
            "Attribute '{attr_name}' on {described}: '#{id}' should refer to a {kind}, but refers to a {actual}"
        )),
    }
}

/// The scalar elem-ref attribute must resolve to a node of `kind`.
pub fn refers_to(kind: &'static str, next: Option<Chain>) -> Chain {
    Box::new(move |attr, node, game| match &attr.value {
        AttrValue::ElemRef(id) => {
            resolve_ref(&attr.name, &node.describe(), id.as_str(), kind, game)?;
            run_chain(&next, attr, node, game)
        }
        _ => Err(format!(
            "Attribute '{}' on {} should be an elem_ref",
            attr.name,
            node.describe()
        )),
    })
}

/// Every element must be an elem-ref resolving to a node of `kind`.
pub fn list_references(kind: &'static str, next: Option<Chain>) -> Chain {
    Box::new(move |attr, node, game| {
        let elements = match attr.value.elements() {
            None => {
                return Err(format!(
                    "Attribute '{}' on {} is not a collection",
                    attr.name,
                    node.describe()
                ))
            }
            Some(elements) => elements,
        };

        for element in elements {
            match element {
                AttrValue::ElemRef(id) => {
                    resolve_ref(&attr.name, &node.describe(), id.as_str(), kind, game)?
                }
                other => {
                    return Err(format!(
                        "Attribute '{}' on {}: every entry should be an elem_ref, found a {}",
                        attr.name,
                        node.describe(),
                        other.attr_type()
                    ))
                }
            }
        }

        run_chain(&next, attr, node, game)
    })
}

/// The attribute's value must satisfy `pred`, described for the error
/// message as `description`.
pub fn value_passes(
    pred: fn(&AttrValue<'_>) -> bool,
    description: &'static str,
    next: Option<Chain>,
) -> Chain {
    Box::new(move |attr, node, game| {
        if pred(&attr.value) {
            run_chain(&next, attr, node, game)
        } else {
            Err(format!(
                "Attribute '{}' on {} should be {description}",
                attr.name,
                node.describe()
            ))
        }
    })
}

/// Runs the chain only when the attribute's value equals `test`; any other
/// value passes unchecked.
pub fn validate_if_value(test: AttrValue<'static>, next: Chain) -> Chain {
    Box::new(move |attr, node, game| {
        if attr.value == test {
            next(attr, node, game)
        } else {
            Ok(())
        }
    })
}

/// The function attribute must take exactly `count` parameters.
pub fn has_params(count: usize, next: Option<Chain>) -> Chain {
    Box::new(move |attr, node, game| match &attr.value {
        AttrValue::Function(function) if function.params.len() == count => {
            run_chain(&next, attr, node, game)
        }
        AttrValue::Function(function) => Err(format!(
            "Attribute '{}' on {} should take {count} parameters, takes {}",
            attr.name,
            node.describe(),
            function.params.len()
        )),
        _ => Err(format!(
            "Attribute '{}' on {} is not a function",
            attr.name,
            node.describe()
        )),
    })
}

/// The function attribute must declare exactly the parameter names in
/// `expected`, in order.
pub fn expects_params(expected: Vec<String>, next: Option<Chain>) -> Chain {
    Box::new(move |attr, node, game| match &attr.value {
        AttrValue::Function(function) => {
            let matches = function.params.len() == expected.len()
                && function
                    .params
                    .iter()
                    .zip(&expected)
                    .all(|(actual, wanted)| *actual == wanted.as_str());

            if matches {
                run_chain(&next, attr, node, game)
            } else {
                Err(format!(
                    "Attribute '{}' on {} should take parameters ({}), takes ({})",
                    attr.name,
                    node.describe(),
                    expected.join(", "),
                    function.params.join(", ")
                ))
            }
        }
        _ => Err(format!(
            "Attribute '{}' on {} is not a function",
            attr.name,
            node.describe()
        )),
    })
}

/// A free-form predicate over the node and game.
pub fn node_passes(check: impl Fn(NodeView<'_, '_>, &Game<'_>) -> Outcome + 'static) -> Validator {
    Validator::new(check)
}

/// The attribute must be a behaviour tree whose every node references a
/// known task correctly.
pub fn is_btree(next: Option<Chain>) -> Chain {
    Box::new(move |attr, node, game| match &attr.value {
        AttrValue::BTree(tree) => match validate_btree(tree, game) {
            Ok(()) => run_chain(&next, attr, node, game),
            Err(message) => Err(format!(
                "Attribute '{}' on {}: {message}",
                attr.name,
                node.describe()
            )),
        },
        _ => Err(format!(
            "Attribute '{}' on {} should be a btree",
            attr.name,
            node.describe()
        )),
    })
}

/// Recursively validate a behaviour tree against the game's tasks: the task
/// must exist, the child count must fit its declared bounds, and every
/// declared option must be supplied. Child errors are concatenated into the
/// parent's message; a node passes only when its whole subtree does.
pub fn validate_btree(tree: &BehaviourTree<'_>, game: &Game<'_>) -> Outcome {
    let mut errors = Vec::new();

    match game.task(tree.task.as_str()) {
        None => errors.push(format!(
            "behaviour tree references unknown task '{}'",
            tree.task
        )),
        Some(task) => {
            let min = match task.core.attr_value("min_children") {
                Some(AttrValue::Number(RezNumber::Int(n))) => *n,
                _ => -1,
            };
            let max = match task.core.attr_value("max_children") {
                Some(AttrValue::Number(RezNumber::Int(n))) => Some(*n),
                _ => None,
            };

            let count = tree.children.len() as i64;
            if min >= 0 && count < min {
                errors.push(format!(
                    "task '{}' needs at least {min} children, has {count}",
                    tree.task
                ));
            }
            if let Some(max) = max {
                if count > max {
                    errors.push(format!(
                        "task '{}' allows at most {max} children, has {count}",
                        tree.task
                    ));
                }
            }

            if let Some(AttrValue::List(options)) = task.core.attr_value("options") {
                for option in options {
                    let name = match option {
                        AttrValue::Keyword(k) => Some(k.as_str()),
                        AttrValue::String(s) => Some(s.as_str()),
                        _ => None,
                    };
                    if let Some(name) = name {
                        if !tree.options.contains_key(name) {
                            errors.push(format!(
                                "task '{}' requires option '{name}'",
                                tree.task
                            ));
                        }
                    }
                }
            }
        }
    }

    for child in &tree.children {
        if let Err(message) = validate_btree(child, game) {
            errors.push(message);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join(", "))
    }
}

fn status_ok() -> Validator {
    Validator::new(|node, _game| match &node.core().status {
        NodeStatus::Ok => Ok(()),
        NodeStatus::Error(message) => Err(message.clone()),
    })
}

const KEYWORD_ONLY: &[AttrType] = &[AttrType::Keyword];

fn positive_number(value: &AttrValue<'_>) -> bool {
    matches!(value, AttrValue::Number(n) if n.as_f64() > 0.0)
}

fn item_has_accepting_slot(view: NodeView<'_, '_>, game: &Game<'_>) -> Outcome {
    let core = view.core();
    let item_type = match core.attr_value("type") {
        Some(AttrValue::Keyword(keyword)) => keyword.as_str(),
        _ => return Ok(()),
    };

    let accepted = game.slots().iter().any(|slot| {
        match slot.core.attr_value("accepts") {
            Some(AttrValue::Keyword(accepts)) => game.hierarchy.is_a(item_type, accepts.as_str()),
            _ => false,
        }
    });

    if accepted {
        Ok(())
    } else {
        Err(format!(
            "No slot found accepting type {item_type} for item {}",
            core.id.as_deref().unwrap_or("?")
        ))
    }
}

fn children_all(kind: &'static str) -> Validator {
    node_passes(move |view, _game| {
        match view
            .children()
            .iter()
            .find(|child| child.node_type() != kind)
        {
            None => Ok(()),
            Some(child) => Err(format!(
                "{} may only contain {kind} blocks, found {}",
                view.describe(),
                child.describe()
            )),
        }
    })
}

fn game_validators(validators: &mut Vec<Validator>) {
    validators.push(if_present("initial_scene", refers_to("scene", None)));
    validators.push(if_present("layout", has_type(AttrType::String, None)));
}

/// The validator list for one node, in declaration order. Error output
/// follows this order, so it is part of the observable contract.
pub fn validators_for(view: NodeView<'_, '_>) -> Vec<Validator> {
    let mut validators = vec![status_ok()];

    match view {
        NodeView::Game(game) => {
            for (id, records) in game.id_map.collisions() {
                let message = format!(
                    "Duplicate id '{id}': defined {} times, most recently as {} at {}:{}",
                    records.len(),
                    records[0].kind,
                    records[0].file,
                    records[0].line
                );
                validators.push(node_passes(move |_view, _game| Err(message.clone())));
            }
            game_validators(&mut validators);
        }
        NodeView::Node(node) => match node {
            Node::Game(..) => game_validators(&mut validators),
            Node::Scene(..) => {
                validators.push(present("layout", Some(has_type(AttrType::String, None))));
                validators.push(present("initial_card", Some(refers_to("card", None))));
                validators.push(if_present(
                    "blocks",
                    has_type(AttrType::List, Some(list_references("card", None))),
                ));
                validators.push(children_all("card"));
            }
            Node::Card(..) => {
                validators.push(either(present("content", None), present("blocks", None)));
                validators.push(if_present("content", has_type(AttrType::String, None)));
                validators.push(if_present(
                    "blocks",
                    has_type(AttrType::List, Some(list_references("card", None))),
                ));
                validators.push(if_present(
                    "on_enter",
                    has_type(AttrType::Function, Some(has_params(2, None))),
                ));
            }
            Node::Item(..) => {
                validators.push(present("type", Some(has_type(AttrType::Keyword, None))));
                validators.push(if_present("size", has_type(AttrType::Number, None)));
                validators.push(if_present(
                    "consumable",
                    has_type(
                        AttrType::Boolean,
                        Some(validate_if_value(
                            AttrValue::Boolean(true),
                            other_attrs_present(&["uses"], None),
                        )),
                    ),
                ));
                validators.push(if_present(
                    "tags",
                    has_type(AttrType::Set, Some(coll_of(KEYWORD_ONLY, None))),
                ));
                validators.push(node_passes(item_has_accepting_slot));
            }
            Node::Inventory(..) => {
                validators.push(if_present(
                    "slots",
                    has_type(
                        AttrType::List,
                        Some(not_empty(Some(list_references("slot", None)))),
                    ),
                ));
                validators.push(if_present(
                    "apply_effects",
                    has_type(AttrType::Boolean, None),
                ));
                validators.push(if_present("owner", refers_to("actor", None)));
                validators.push(children_all("slot"));
            }
            Node::Slot(..) => {
                validators.push(present("accepts", Some(has_type(AttrType::Keyword, None))));
                validators.push(if_present(
                    "capacity",
                    has_type(
                        AttrType::Number,
                        Some(value_passes(positive_number, "a positive number", None)),
                    ),
                ));
            }
            Node::Asset(..) => {
                validators.push(one_of_present(&["file_name", "text"], true));
                validators.push(if_present("file_name", has_type(AttrType::String, None)));
                validators.push(if_present(
                    "tags",
                    has_type(AttrType::Set, Some(coll_of(KEYWORD_ONLY, None))),
                ));
            }
            Node::Group(..) => {
                validators.push(present(
                    "type",
                    Some(has_type(
                        AttrType::String,
                        Some(value_one_of(&["image", "audio", "text"], None)),
                    )),
                ));
                validators.push(one_of_present(&["include_tags", "exclude_tags"], false));
                validators.push(if_present(
                    "include_tags",
                    has_type(AttrType::Set, Some(coll_of(KEYWORD_ONLY, None))),
                ));
                validators.push(if_present(
                    "exclude_tags",
                    has_type(AttrType::Set, Some(coll_of(KEYWORD_ONLY, None))),
                ));
            }
            Node::Task(..) => {
                validators.push(if_present(
                    "options",
                    has_type(
                        AttrType::List,
                        Some(coll_of(&[AttrType::Keyword, AttrType::String], None)),
                    ),
                ));
                validators.push(if_present("min_children", has_type(AttrType::Number, None)));
                validators.push(if_present("max_children", has_type(AttrType::Number, None)));
                validators.push(if_present(
                    "execute",
                    has_type(AttrType::Function, Some(has_params(2, None))),
                ));
            }
            Node::Actor(..) => {
                validators.push(if_present("behaviours", is_btree(None)));
                validators.push(if_present("container", refers_to("inventory", None)));
            }
            Node::Helper(helper) => {
                validators.push(present("handler", Some(has_type(AttrType::Function, None))));

                // The declared parameter list, if the author wrote one, is
                // node state the validator closes over.
                let declared: Option<Vec<String>> = match helper.core.attr_value("params") {
                    Some(AttrValue::List(items)) => Some(
                        items
                            .iter()
                            .filter_map(|item| match item {
                                AttrValue::String(s) => Some(s.as_str().to_owned()),
                                AttrValue::Keyword(k) => Some(k.as_str().to_owned()),
                                _ => None,
                            })
                            .collect(),
                    ),
                    _ => None,
                };

                if let Some(declared) = declared {
                    validators.push(if_present(
                        "handler",
                        has_type(AttrType::Function, Some(expects_params(declared, None))),
                    ));
                }
            }
        },
    }

    validators
}
