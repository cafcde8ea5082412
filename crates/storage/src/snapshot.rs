//! Snapshot: immutable point-in-time copy of one replica
//!
//! A snapshot is taken by cloning the replica's entity map and indices while
//! the replica's apply gate is held, then freezing the copy behind an `Arc`.
//!
//! # Design Notes
//!
//! - **Deep clone**: entity values are `Arc`-shared, so the copy costs one
//!   map entry per entity rather than one entity clone
//! - **Immutable**: once created, the snapshot never changes
//! - **Thread-safe**: cheap to clone and share across threads
//! - **Self-contained**: stays valid after the replica is dropped

use std::sync::Arc;

use configstore_core::{Entity, EntityKey};

use crate::index::IndexHash;
use crate::replica::{ReplicaData, ReplicaId};

/// Frozen view of a replica
///
/// Answers the same reads as the live replica, against the state it had
/// when the snapshot was captured.
///
/// # Example
///
/// ```ignore
/// let snapshot = replica.snapshot();
///
/// // Events applied after capture are not visible
/// replica.apply(ChangeEvent::deleted(user.clone()));
/// assert!(snapshot.get(user.key()).is_some());
/// ```
pub struct Snapshot<T> {
    replica: ReplicaId,
    /// Events the replica had applied at capture time
    applied: u64,
    data: Arc<ReplicaData<T>>,
}

impl<T: Entity> Snapshot<T> {
    pub(crate) fn new(replica: ReplicaId, applied: u64, data: ReplicaData<T>) -> Self {
        Self {
            replica,
            applied,
            data: Arc::new(data),
        }
    }

    /// Replica this snapshot was taken from
    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    /// Entity kind
    pub fn kind(&self) -> &'static str {
        T::KIND
    }

    /// Number of events the replica had applied when captured
    pub fn applied_events(&self) -> u64 {
        self.applied
    }

    /// Value under `key` at capture time
    pub fn get(&self, key: &EntityKey) -> Option<Arc<T>> {
        self.data.get(key)
    }

    /// Whether `key` was present at capture time
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.data.contains(key)
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Keys of all entities, in no particular order
    pub fn keys(&self) -> Vec<EntityKey> {
        self.data.keys()
    }

    /// All entities, in no particular order
    pub fn list(&self) -> Vec<Arc<T>> {
        self.data.list()
    }

    /// Names of the indices captured with the data
    pub fn index_names(&self) -> Vec<&'static str> {
        self.data.index_names()
    }

    /// Entity most recently indexed under `hash` in `index`
    pub fn lookup(&self, index: &str, hash: impl Into<IndexHash>) -> Option<Arc<T>> {
        self.data.lookup(index, hash.into())
    }

    /// Every entity indexed under `hash` in `index`
    pub fn lookup_all(&self, index: &str, hash: impl Into<IndexHash>) -> Vec<Arc<T>> {
        self.data.lookup_all(index, hash.into())
    }

    /// Newest entity under `hash` in `index` accepted by `matches`
    pub fn lookup_where<F>(
        &self,
        index: &str,
        hash: impl Into<IndexHash>,
        matches: F,
    ) -> Option<Arc<T>>
    where
        F: Fn(&T) -> bool,
    {
        self.data.lookup_where(index, hash.into(), matches)
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            replica: self.replica,
            applied: self.applied,
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Entity> std::fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("kind", &T::KIND)
            .field("replica", &self.replica)
            .field("applied", &self.applied)
            .field("entities", &self.data.len())
            .finish()
    }
}
