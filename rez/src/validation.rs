/*!
The validation driver. Walks the game tree, runs each node's validators in
declaration order, and accumulates an error ledger. Validation always runs
to completion; errors are collected, never thrown.
*/

use serde::Serialize;

use crate::{
    ast::Game,
    source::Position,
    validate::{validators_for, NodeView},
};

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Description of the failing node, e.g. `item#sword`
    pub node: String,

    /// Where the failing node was defined
    pub position: Position,

    /// What went wrong
    pub message: String,
}

/// The outcome of validating a (sub)tree: the error ledger plus a record of
/// every node that was visited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validation {
    /// Every failed check, in deterministic order: a node's own errors in
    /// validator declaration order, then its children's, siblings in source
    /// order
    pub errors: Vec<ValidationError>,

    /// Descriptions of validated nodes, children before parents
    pub validated: Vec<String>,
}

impl Validation {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another record into this one, preserving order.
    pub fn merge(&mut self, other: Validation) {
        self.errors.extend(other.errors);
        self.validated.extend(other.validated);
    }

    /// Whether every check passed.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a whole game: the root first, then every node, depth first.
pub fn validate(game: &Game<'_>) -> Validation {
    validate_view(NodeView::Game(game), game)
}

fn validate_view(view: NodeView<'_, '_>, game: &Game<'_>) -> Validation {
    let mut record = Validation::new();

    for validator in validators_for(view) {
        if let Err(message) = validator.run(view, game) {
            record.errors.push(ValidationError {
                node: view.describe(),
                position: view.core().position.clone(),
                message,
            });
        }
    }

    for child in view.children() {
        record.merge(validate_view(NodeView::Node(child), game));
    }

    record.validated.push(view.describe());
    record
}
