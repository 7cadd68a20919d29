/*!
The identifier map: every block id registered during parsing, keyed by id.
Collisions are recorded rather than rejected; the duplicate-id validator
surfaces them after parsing completes.
*/

use std::collections::HashMap;

use serde::Serialize;

/// Where one id was defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdRecord {
    /// The node kind label, e.g. "item"
    pub kind: &'static str,

    /// The physical file the block was defined in
    pub file: String,

    /// 1-based physical line of the `@label`
    pub line: usize,
}

/// The record (or records) behind one id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IdEntry {
    /// The id was defined exactly once
    Single(IdRecord),

    /// The id was defined more than once; newest definition first
    Collision(Vec<IdRecord>),
}

impl IdEntry {
    /// The most recently registered record for this id.
    pub fn newest(&self) -> &IdRecord {
        match self {
            IdEntry::Single(record) => record,
            IdEntry::Collision(records) => &records[0],
        }
    }
}

/// Map from id to definition record(s). Populated in source order during
/// parsing, read-only during validation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IdMap {
    entries: HashMap<String, IdEntry>,
}

impl IdMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an id. A repeat registration converts the entry into a
    /// collision list with the new record at the front.
    pub fn register(&mut self, id: impl Into<String>, record: IdRecord) {
        use std::collections::hash_map::Entry;

        match self.entries.entry(id.into()) {
            Entry::Vacant(slot) => {
                slot.insert(IdEntry::Single(record));
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                IdEntry::Single(existing) => {
                    let existing = existing.clone();
                    slot.insert(IdEntry::Collision(vec![record, existing]));
                }
                IdEntry::Collision(records) => records.insert(0, record),
            },
        }
    }

    /// Look up an id.
    pub fn get(&self, id: &str) -> Option<&IdEntry> {
        self.entries.get(id)
    }

    /// The kind label of the most recent definition of `id`.
    pub fn kind_of(&self, id: &str) -> Option<&'static str> {
        self.get(id).map(|entry| entry.newest().kind)
    }

    /// Whether `id` has been registered at all.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of distinct ids registered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All ids that were registered more than once, sorted by id so that
    /// diagnostic output is stable.
    pub fn collisions(&self) -> Vec<(&str, &[IdRecord])> {
        let mut collisions: Vec<(&str, &[IdRecord])> = self
            .entries
            .iter()
            .filter_map(|(id, entry)| match entry {
                IdEntry::Single(..) => None,
                IdEntry::Collision(records) => Some((id.as_str(), records.as_slice())),
            })
            .collect();
        collisions.sort_by_key(|&(id, _)| id);
        collisions
    }
}
