use hashbrown::HashTable;
use smallvec::SmallVec;

use crate::heap::HeapId;

/// Insertion-ordered hash map keyed by runtime objects.
///
/// Uses a `HashTable<usize>` for hash lookups combined with a dense `Vec<DictEntry>`
/// to preserve insertion order. Key equality can run user code, so the table only
/// narrows a lookup to the entries with a matching hash; the caller decides which
/// candidate is equal.
#[derive(Debug, Default)]
pub(crate) struct Dict {
    indices: HashTable<usize>,
    entries: Vec<DictEntry>,
}

#[derive(Debug, Clone, Copy)]
struct DictEntry {
    key: HeapId,
    value: HeapId,
    /// the hash is needed here for rehashing the index table
    hash: u64,
}

/// Candidate entries for one hash, as (entry index, key).
pub(crate) type Candidates = SmallVec<[(usize, HeapId); 4]>;

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entries whose stored hash equals `hash`, in insertion order.
    pub fn candidates(&self, hash: u64) -> Candidates {
        let mut found = Candidates::new();
        // the eq closure never reports a match, so every probed slot is visited
        let _ = self.indices.find(hash, |&index| {
            if self.entries[index].hash == hash {
                found.push((index, self.entries[index].key));
            }
            false
        });
        found.sort_unstable_by_key(|(index, _)| *index);
        found
    }

    pub fn value_at(&self, index: usize) -> HeapId {
        self.entries[index].value
    }

    pub fn set_value_at(&mut self, index: usize, value: HeapId) {
        self.entries[index].value = value;
    }

    /// Appends a key that the caller has checked is not present.
    pub fn push(&mut self, key: HeapId, value: HeapId, hash: u64) {
        let index = self.entries.len();
        let entries = &self.entries;
        self.indices.insert_unique(hash, index, |&i| entries[i].hash);
        self.entries.push(DictEntry { key, value, hash });
    }

    pub fn keys(&self) -> impl Iterator<Item = HeapId> + '_ {
        self.entries.iter().map(|entry| entry.key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (HeapId, HeapId)> + '_ {
        self.entries.iter().map(|entry| (entry.key, entry.value))
    }

    pub fn collect_child_ids(&self, work_list: &mut Vec<HeapId>) {
        for entry in &self.entries {
            work_list.push(entry.key);
            work_list.push(entry.value);
        }
    }
}

/// Unordered collection of unique runtime objects.
///
/// Stored as a [`Dict`] whose values are the keys themselves; iteration follows
/// insertion order.
#[derive(Debug, Default)]
pub(crate) struct Set(Dict);

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn candidates(&self, hash: u64) -> Candidates {
        self.0.candidates(hash)
    }

    pub fn push(&mut self, item: HeapId, hash: u64) {
        self.0.push(item, item, hash);
    }

    pub fn items(&self) -> impl Iterator<Item = HeapId> + '_ {
        self.0.keys()
    }

    pub fn collect_child_ids(&self, work_list: &mut Vec<HeapId>) {
        work_list.extend(self.0.keys());
    }
}
