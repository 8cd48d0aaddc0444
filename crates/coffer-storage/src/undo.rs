//! Undo buffer - compensating actions for mutations not yet in the WAL
//!
//! For every key touched since the last flush the buffer holds the one
//! action that restores the key's state as of that flush. The entry is
//! fixed by the *first* mutation in the window and never replaced: later
//! mutations only change `items`, and the flush derives the forward record
//! from the current value plus this pre-window fact.
//!
//! ```text
//! (no entry) --mutate, key was absent--> Delete
//! (no entry) --mutate, key held `old`--> Upsert(old)
//! Delete / Upsert(old) --any mutation--> unchanged
//! any --clear (after a durable flush)--> (no entry)
//! ```

use coffer_core::Entity;
use coffer_wal::Record;
use std::collections::BTreeMap;

/// Compensating action for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<T> {
    /// The key did not exist at the last flush; undo by deleting it
    Delete,
    /// The key held this value at the last flush; undo by restoring it
    Upsert(T),
}

/// Per-container map of pending compensating actions
#[derive(Debug, Clone)]
pub struct UndoBuffer<T: Entity> {
    items: BTreeMap<T::Key, Action<T>>,
}

impl<T: Entity> UndoBuffer<T> {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    /// Note a mutation of `key`; `previous` is the value the key held right
    /// before this mutation.
    pub(crate) fn record(&mut self, key: T::Key, previous: Option<T>) {
        self.items.entry(key).or_insert_with(|| match previous {
            Some(old) => Action::Upsert(old),
            None => Action::Delete,
        });
    }

    /// Pending action for a key
    pub fn get(&self, key: &T::Key) -> Option<&Action<T>> {
        self.items.get(key)
    }

    /// Iterate pending actions in key order
    pub fn iter(&self) -> impl Iterator<Item = (&T::Key, &Action<T>)> {
        self.items.iter()
    }

    /// Number of dirty keys
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing changed since the last flush
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Forget every pending action
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Derive the WAL records that carry the net effect of the window, in
    /// ascending key order.
    ///
    /// A key inserted and removed again within the window yields nothing.
    pub fn forward_records(&self, items: &BTreeMap<T::Key, T>) -> Vec<Record<T>> {
        self.items
            .iter()
            .filter_map(|(key, action)| match (action, items.get(key)) {
                (_, Some(current)) => Some(Record::Upsert(current.clone())),
                (Action::Upsert(_), None) => Some(Record::Delete(key.clone())),
                (Action::Delete, None) => None,
            })
            .collect()
    }

    /// Revert `items` to its state at the last flush and clear the buffer.
    ///
    /// Returns the number of keys reverted.
    pub fn rollback(&mut self, items: &mut BTreeMap<T::Key, T>) -> usize {
        let pending = std::mem::take(&mut self.items);
        let reverted = pending.len();

        for (key, action) in pending {
            match action {
                Action::Delete => {
                    items.remove(&key);
                }
                Action::Upsert(old) => {
                    items.insert(key, old);
                }
            }
        }

        reverted
    }
}

impl<T: Entity> Default for UndoBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
