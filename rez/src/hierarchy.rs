/*!
The type hierarchy: a DAG of keyword to parent keyword, built from `@derive`
statements. Item processing fans an item's type out into its tag set, and
slot compatibility checks walk the same edges.
*/

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use thiserror::Error;

/// Errors raised while building the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    /// The requested edge would make the hierarchy cyclic
    #[error("deriving :{tag} from :{parent} would create a cycle")]
    Cycle {
        /// The tag being derived
        tag: String,
        /// The parent it was derived from
        parent: String,
    },
}

/// The keyword hierarchy. Multiple parents per tag are allowed; cycles are
/// not.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeHierarchy {
    parents: HashMap<String, Vec<String>>,
}

impl TypeHierarchy {
    /// Create an empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `tag -> parent` edge. Fails if the edge would close a cycle;
    /// re-adding an existing edge is a no-op.
    pub fn derive(&mut self, tag: &str, parent: &str) -> Result<(), HierarchyError> {
        if tag == parent || self.is_a(parent, tag) {
            return Err(HierarchyError::Cycle {
                tag: tag.to_owned(),
                parent: parent.to_owned(),
            });
        }

        let parents = self.parents.entry(tag.to_owned()).or_default();
        if !parents.iter().any(|existing| existing.as_str() == parent) {
            parents.push(parent.to_owned());
        }
        Ok(())
    }

    /// All transitive ancestors of `tag`, breadth first, deduplicated. The
    /// tag itself is not included.
    pub fn fan_out(&self, tag: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        let mut out = Vec::new();

        queue.push_back(tag);
        while let Some(current) = queue.pop_front() {
            if let Some(parents) = self.parents.get(current) {
                for parent in parents {
                    if seen.insert(parent.as_str()) {
                        out.push(parent.clone());
                        queue.push_back(parent);
                    }
                }
            }
        }

        out
    }

    /// Reflexive, transitive subtype test: is `tag` an `ancestor`?
    pub fn is_a(&self, tag: &str, ancestor: &str) -> bool {
        if tag == ancestor {
            return true;
        }

        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(tag);

        while let Some(current) = queue.pop_front() {
            if let Some(parents) = self.parents.get(current) {
                for parent in parents {
                    if parent.as_str() == ancestor {
                        return true;
                    }
                    if seen.insert(parent.as_str()) {
                        queue.push_back(parent);
                    }
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cool_asserts::assert_matches;

    fn sample() -> TypeHierarchy {
        let mut hierarchy = TypeHierarchy::new();
        hierarchy.derive("sword", "weapon").unwrap();
        hierarchy.derive("weapon", "item").unwrap();
        hierarchy.derive("sword", "melee").unwrap();
        hierarchy
    }

    #[test]
    fn fan_out_is_breadth_first_and_deduplicated() {
        let hierarchy = sample();
        assert_eq!(hierarchy.fan_out("sword"), ["weapon", "melee", "item"]);
        assert_eq!(hierarchy.fan_out("weapon"), ["item"]);
        assert_eq!(hierarchy.fan_out("item"), Vec::<String>::new());
    }

    #[test]
    fn is_a_is_reflexive_and_transitive() {
        let hierarchy = sample();
        assert!(hierarchy.is_a("sword", "sword"));
        assert!(hierarchy.is_a("sword", "weapon"));
        assert!(hierarchy.is_a("sword", "item"));
        assert!(!hierarchy.is_a("item", "sword"));
        assert!(!hierarchy.is_a("sword", "armour"));
    }

    #[test]
    fn diamond_fan_out() {
        let mut hierarchy = TypeHierarchy::new();
        hierarchy.derive("a", "b").unwrap();
        hierarchy.derive("a", "c").unwrap();
        hierarchy.derive("b", "d").unwrap();
        hierarchy.derive("c", "d").unwrap();

        assert_eq!(hierarchy.fan_out("a"), ["b", "c", "d"]);
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let mut hierarchy = TypeHierarchy::new();
        assert_matches!(
            hierarchy.derive("a", "a"),
            Err(HierarchyError::Cycle { .. })
        );
    }

    #[test]
    fn indirect_cycle_is_rejected() {
        let mut hierarchy = sample();
        assert_matches!(
            hierarchy.derive("item", "sword"),
            Err(HierarchyError::Cycle { .. })
        );
    }

    #[test]
    fn repeated_edge_is_a_no_op() {
        let mut hierarchy = sample();
        hierarchy.derive("sword", "weapon").unwrap();
        assert_eq!(hierarchy.fan_out("sword"), ["weapon", "melee", "item"]);
    }
}
