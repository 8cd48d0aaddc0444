// WAL record - the durable, replayable form of one net mutation
//
// Unlike an undo action, which describes how to revert a change, a record
// describes the change itself and is applied forward during replay.

use coffer_core::Entity;
use serde::{Deserialize, Serialize};

/// A WAL record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum Record<T: Entity> {
    /// Set `items[value.id()] = value`
    Upsert(T),
    /// Remove the key if present
    Delete(T::Key),
}

impl<T: Entity> Record<T> {
    /// Key this record touches
    pub fn key(&self) -> T::Key {
        match self {
            Record::Upsert(value) => value.id(),
            Record::Delete(key) => key.clone(),
        }
    }

    /// Returns true for a delete record
    pub fn is_delete(&self) -> bool {
        matches!(self, Record::Delete(_))
    }
}
