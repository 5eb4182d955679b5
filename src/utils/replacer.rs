use std::hash::Hash;

use hashlink::LinkedHashMap;

/// Eviction bookkeeping over a bounded set of entry ids. The buffer
/// pool drives one of these per pool; entries are frame ids there, but
/// the policy itself does not care what the ids mean.
pub trait Replacer<T> {
    /// Removes and returns the entry next in line for eviction, or
    /// `None` when nothing is registered.
    fn victim(&mut self) -> Option<T>;

    /// Takes the entry out of the candidate set. Unknown entries are
    /// ignored.
    fn pin(&mut self, entry_id: T);

    /// Registers the entry as an eviction candidate. Entries already
    /// registered keep their place; entries past capacity are dropped.
    fn unpin(&mut self, entry_id: T);

    /// Number of candidates currently registered.
    fn size(&self) -> usize;
}

/// Least-recently-unpinned replacement. The linked hash map keeps the
/// unpin order and the id lookup in one structure, so every operation
/// is O(1). Insertion goes to the back; the front is the oldest unpin
/// and therefore the victim.
pub struct LRUReplacer<T> {
    entries: LinkedHashMap<T, ()>,
    capacity: usize,
}

impl<T: Hash + Eq + Copy> LRUReplacer<T> {
    pub fn new(capacity: usize) -> Self {
        LRUReplacer {
            entries: LinkedHashMap::with_capacity(capacity),
            capacity,
        }
    }
}

impl<T: Hash + Eq + Copy> Replacer<T> for LRUReplacer<T> {
    fn victim(&mut self) -> Option<T> {
        self.entries.pop_front().map(|(entry_id, _)| entry_id)
    }

    fn pin(&mut self, entry_id: T) {
        self.entries.remove(&entry_id);
    }

    fn unpin(&mut self, entry_id: T) {
        // A re-unpin does not refresh recency, and a full replacer
        // silently refuses new entries.
        if self.entries.contains_key(&entry_id) || self.entries.len() == self.capacity {
            return;
        }
        self.entries.insert(entry_id, ());
    }

    fn size(&self) -> usize {
        self.entries.len()
    }
}
