//! Entities and change events
//!
//! Every replicated record type implements [`Entity`]. The remote store
//! pushes one ordered stream of [`ChangeEvent`]s per entity kind; the
//! replica folds that stream into its current state.

use std::fmt;

use crate::error::{Error, Result};
use crate::key::EntityKey;

/// A typed, keyed record replicated from the remote store
///
/// Fields may hold other entities' keys (foreign keys); nothing checks that
/// the referenced entity exists.
pub trait Entity: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Kind name, equal to the final path element kind of every key
    const KIND: &'static str;

    /// Key of this entity
    fn key(&self) -> &EntityKey;

    /// Mutable key access, used by the remote store to assign names
    fn key_mut(&mut self) -> &mut EntityKey;
}

/// What happened to the entity carried by a [`ChangeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Entity was created
    Created,
    /// Entity was replaced with a new value
    Updated,
    /// Entity was removed; the event carries its last value
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// One committed change to one entity
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<T> {
    /// What happened
    pub kind: ChangeKind,
    /// Entity value after the change (last value for `Deleted`)
    pub entity: T,
}

impl<T: Entity> ChangeEvent<T> {
    /// A `Created` event
    pub fn created(entity: T) -> Self {
        Self {
            kind: ChangeKind::Created,
            entity,
        }
    }

    /// An `Updated` event
    pub fn updated(entity: T) -> Self {
        Self {
            kind: ChangeKind::Updated,
            entity,
        }
    }

    /// A `Deleted` event
    pub fn deleted(entity: T) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            entity,
        }
    }

    /// Key of the affected entity
    pub fn key(&self) -> &EntityKey {
        self.entity.key()
    }

    /// Check that this event can belong to the `T::KIND` stream
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedEvent` if the key is incomplete or names a
    /// different kind.
    pub fn validate(&self) -> Result<()> {
        let key = self.entity.key();
        if key.kind() != T::KIND {
            return Err(Error::malformed(
                T::KIND,
                format!("key {} names kind {}", key, key.kind()),
            ));
        }
        if key.is_incomplete() {
            return Err(Error::malformed(
                T::KIND,
                format!("{} event carries incomplete key {}", self.kind, key),
            ));
        }
        Ok(())
    }
}
