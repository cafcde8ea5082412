//! Replica: local mirror of one entity kind
//!
//! This module implements the per-kind replica using:
//! - `FxHashMap<EntityKey, Arc<T>>` for O(1) point reads
//! - `parking_lot::RwLock` so readers run concurrently with the writer
//! - An apply gate (`parking_lot::Mutex`) that serialises `apply` and
//!   snapshot capture
//! - Secondary indices updated inside the same write lock as the map
//!
//! # Design Notes
//!
//! - **Single writer**: events are applied in arrival order by the kind's
//!   watch worker; the gate makes concurrent `apply` calls queue up instead
//!   of interleaving.
//! - **Atomic visibility**: the entity map and every index change under one
//!   write lock, so a reader never sees a half-applied event and an index
//!   hit always resolves through `get`.
//! - **Gate vs. lock**: the snapshot coordinator holds the gate (not the
//!   write lock) while it copies state, so applies stall but readers do not.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use configstore_core::{ChangeEvent, ChangeKind, Entity, EntityKey};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rustc_hash::FxHashMap;

use crate::index::{IndexDef, IndexHash, SecondaryIndex};
use crate::snapshot::Snapshot;

static NEXT_REPLICA_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique replica identity
///
/// Breaks ties between replicas of the same kind (one per connection) in
/// the snapshot coordinator's lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplicaId(u64);

impl ReplicaId {
    fn next() -> Self {
        ReplicaId(NEXT_REPLICA_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Proof that the holder excludes `apply` on one replica
///
/// Dropping the guard lets applies continue.
pub struct ApplyGuard<'a> {
    replica: ReplicaId,
    _gate: MutexGuard<'a, ()>,
}

impl ApplyGuard<'_> {
    /// Replica this guard excludes
    pub fn replica(&self) -> ReplicaId {
        self.replica
    }
}

/// Entity map plus its indices
///
/// Shared by the live replica (behind the lock) and by snapshots (frozen
/// behind an `Arc`), so both answer reads the same way.
pub(crate) struct ReplicaData<T> {
    entities: FxHashMap<EntityKey, Arc<T>>,
    indices: Vec<SecondaryIndex<T>>,
}

impl<T: Entity> ReplicaData<T> {
    fn new(defs: Vec<IndexDef<T>>) -> Self {
        Self {
            entities: FxHashMap::default(),
            indices: defs.into_iter().map(SecondaryIndex::new).collect(),
        }
    }

    /// Fold one event into the map and every index
    fn apply(&mut self, event: ChangeEvent<T>) {
        let ChangeEvent { kind, entity } = event;
        let key = entity.key().clone();
        match kind {
            ChangeKind::Created | ChangeKind::Updated => {
                let current = Arc::new(entity);
                let previous = self.entities.insert(key.clone(), Arc::clone(&current));
                for index in &mut self.indices {
                    index.observe(&key, previous.as_deref(), Some(&current));
                }
            }
            ChangeKind::Deleted => {
                // Absent key: nothing to remove, indices untouched
                if let Some(previous) = self.entities.remove(&key) {
                    for index in &mut self.indices {
                        index.observe(&key, Some(&previous), None);
                    }
                }
            }
        }
    }

    pub(crate) fn get(&self, key: &EntityKey) -> Option<Arc<T>> {
        self.entities.get(key).cloned()
    }

    pub(crate) fn contains(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entities.len()
    }

    pub(crate) fn keys(&self) -> Vec<EntityKey> {
        self.entities.keys().cloned().collect()
    }

    pub(crate) fn list(&self) -> Vec<Arc<T>> {
        self.entities.values().cloned().collect()
    }

    fn index(&self, name: &str) -> Option<&SecondaryIndex<T>> {
        self.indices.iter().find(|index| index.name() == name)
    }

    pub(crate) fn index_names(&self) -> Vec<&'static str> {
        self.indices.iter().map(|index| index.name()).collect()
    }

    pub(crate) fn lookup(&self, index: &str, hash: IndexHash) -> Option<Arc<T>> {
        let key = self.index(index)?.lookup_key(hash)?;
        self.get(key)
    }

    pub(crate) fn lookup_all(&self, index: &str, hash: IndexHash) -> Vec<Arc<T>> {
        match self.index(index) {
            Some(index) => index
                .keys(hash)
                .iter()
                .filter_map(|key| self.get(key))
                .collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn lookup_where<F>(&self, index: &str, hash: IndexHash, matches: F) -> Option<Arc<T>>
    where
        F: Fn(&T) -> bool,
    {
        let index = self.index(index)?;
        // Newest first, matching `lookup`
        index
            .keys(hash)
            .iter()
            .rev()
            .filter_map(|key| self.entities.get(key))
            .find(|entity| matches(entity))
            .cloned()
    }
}

impl<T: Entity> Clone for ReplicaData<T> {
    fn clone(&self) -> Self {
        Self {
            entities: self.entities.clone(),
            indices: self.indices.clone(),
        }
    }
}

struct ReplicaState<T> {
    data: ReplicaData<T>,
    /// Events applied so far, the replica's logical clock
    applied: u64,
}

/// Builder fixing a replica's secondary indices before it is shared
pub struct ReplicaBuilder<T> {
    indices: Vec<IndexDef<T>>,
}

impl<T: Entity> ReplicaBuilder<T> {
    /// Attach a secondary index
    ///
    /// An index whose name is already registered replaces the earlier one.
    pub fn index(mut self, def: IndexDef<T>) -> Self {
        self.indices.retain(|existing| existing.name() != def.name());
        self.indices.push(def);
        self
    }

    /// Build the (empty) replica
    pub fn build(self) -> Replica<T> {
        Replica::with_indices(self.indices)
    }
}

/// Local in-memory mirror of one entity kind
///
/// Thread-safe through `parking_lot::RwLock`; mutated only by `apply`.
///
/// # Example
///
/// ```ignore
/// let users = Replica::<User>::builder()
///     .index(IndexDef::field64("by_email", FieldSource::bytes(user_email)))
///     .build();
///
/// users.apply(ChangeEvent::created(user.clone()));
/// assert!(users.get(user.key()).is_some());
/// assert!(users.lookup("by_email", hash64_str(&user.email)).is_some());
/// ```
pub struct Replica<T: Entity> {
    id: ReplicaId,
    state: RwLock<ReplicaState<T>>,
    /// Serialises `apply` with itself and with snapshot capture
    apply_gate: Mutex<()>,
}

impl<T: Entity> Replica<T> {
    /// Create an empty replica with no secondary indices
    pub fn new() -> Self {
        Self::with_indices(Vec::new())
    }

    /// Start building a replica with secondary indices
    pub fn builder() -> ReplicaBuilder<T> {
        ReplicaBuilder {
            indices: Vec::new(),
        }
    }

    fn with_indices(defs: Vec<IndexDef<T>>) -> Self {
        Self {
            id: ReplicaId::next(),
            state: RwLock::new(ReplicaState {
                data: ReplicaData::new(defs),
                applied: 0,
            }),
            apply_gate: Mutex::new(()),
        }
    }

    /// Process-unique identity of this replica
    pub fn id(&self) -> ReplicaId {
        self.id
    }

    /// Entity kind this replica mirrors
    pub fn kind(&self) -> &'static str {
        T::KIND
    }

    /// Apply one change event
    ///
    /// Created/Updated insert or replace by key; Deleted removes by key and
    /// is a no-op for an absent key. Blocks while a snapshot capture holds
    /// this replica's gate.
    pub fn apply(&self, event: ChangeEvent<T>) {
        let _gate = self.apply_gate.lock();
        self.apply_held(event);
    }

    /// Apply several events as one step
    ///
    /// Readers observe either none or all of them.
    pub fn apply_batch<I>(&self, events: I)
    where
        I: IntoIterator<Item = ChangeEvent<T>>,
    {
        let _gate = self.apply_gate.lock();
        let mut state = self.state.write();
        for event in events {
            debug_assert!(
                event.validate().is_ok(),
                "malformed {} event for key {}",
                T::KIND,
                event.key()
            );
            state.data.apply(event);
            state.applied += 1;
        }
    }

    fn apply_held(&self, event: ChangeEvent<T>) {
        debug_assert!(
            event.validate().is_ok(),
            "malformed {} event for key {}",
            T::KIND,
            event.key()
        );
        let mut state = self.state.write();
        state.data.apply(event);
        state.applied += 1;
    }

    /// Exclude `apply` on this replica until the guard is dropped
    pub fn lock_applies(&self) -> ApplyGuard<'_> {
        ApplyGuard {
            replica: self.id,
            _gate: self.apply_gate.lock(),
        }
    }

    /// Current value under `key`
    ///
    /// `None` if the entity never existed, was deleted, or has not been
    /// received yet; the replica cannot tell these apart.
    pub fn get(&self, key: &EntityKey) -> Option<Arc<T>> {
        self.state.read().data.get(key)
    }

    /// Whether an entity is present under `key`
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.state.read().data.contains(key)
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.state.read().data.len()
    }

    /// Check if the replica is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of all current entities, in no particular order
    pub fn keys(&self) -> Vec<EntityKey> {
        self.state.read().data.keys()
    }

    /// All current entities, in no particular order
    pub fn list(&self) -> Vec<Arc<T>> {
        self.state.read().data.list()
    }

    /// Number of events applied since creation
    pub fn applied_events(&self) -> u64 {
        self.state.read().applied
    }

    /// Names of the attached secondary indices
    pub fn index_names(&self) -> Vec<&'static str> {
        self.state.read().data.index_names()
    }

    /// Entity most recently indexed under `hash` in `index`
    ///
    /// Returns `None` for an unknown index name.
    pub fn lookup(&self, index: &str, hash: impl Into<IndexHash>) -> Option<Arc<T>> {
        self.state.read().data.lookup(index, hash.into())
    }

    /// Every entity indexed under `hash` in `index`, oldest first
    pub fn lookup_all(&self, index: &str, hash: impl Into<IndexHash>) -> Vec<Arc<T>> {
        self.state.read().data.lookup_all(index, hash.into())
    }

    /// Newest entity under `hash` in `index` accepted by `matches`
    ///
    /// Equality fallback for callers that must rule out hash collisions.
    pub fn lookup_where<F>(
        &self,
        index: &str,
        hash: impl Into<IndexHash>,
        matches: F,
    ) -> Option<Arc<T>>
    where
        F: Fn(&T) -> bool,
    {
        self.state.read().data.lookup_where(index, hash.into(), matches)
    }

    /// Capture an immutable snapshot
    ///
    /// Reflects every event applied before this call returns and none
    /// applied after.
    pub fn snapshot(&self) -> Snapshot<T> {
        let guard = self.lock_applies();
        self.capture_held(&guard)
    }

    /// Copy current state while the caller holds this replica's gate
    pub(crate) fn capture_held(&self, guard: &ApplyGuard<'_>) -> Snapshot<T> {
        debug_assert_eq!(guard.replica(), self.id, "gate belongs to another replica");
        // Readers keep going; only the gate keeps applies out
        let state = self.state.read();
        Snapshot::new(self.id, state.applied, state.data.clone())
    }
}

impl<T: Entity> Default for Replica<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> std::fmt::Debug for Replica<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Replica")
            .field("kind", &T::KIND)
            .field("id", &self.id)
            .field("entities", &state.data.len())
            .field("applied", &state.applied)
            .finish()
    }
}
