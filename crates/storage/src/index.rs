//! Secondary hash indices
//!
//! A secondary index maps a hash computed from one field (or an ordered pair
//! of fields) of an entity to that entity's key, so callers can find an
//! entity by value without scanning the replica.
//!
//! Indices are owned by their replica and updated inside the same write lock
//! as the entity map, so an index hit can always be resolved with `get`.
//!
//! # Collisions
//!
//! Each hash owns a small bucket of keys rather than a single slot:
//! - `lookup` returns the most recently indexed key in the bucket
//! - Removing one key never disturbs another key that shares its hash
//! - `keys` exposes the whole bucket for equality fallback by the caller

use std::fmt;

use configstore_core::hash::{hash32, hash32_pair, hash64, hash64_pair};
use configstore_core::{Entity, EntityKey};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Hash value used as an index key
///
/// 32-bit hashes are widened losslessly, so a 32-bit index is queried with
/// the same `u32` the caller computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexHash(u64);

impl IndexHash {
    /// Raw value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for IndexHash {
    fn from(hash: u64) -> Self {
        IndexHash(hash)
    }
}

impl From<u32> for IndexHash {
    fn from(hash: u32) -> Self {
        IndexHash(u64::from(hash))
    }
}

/// Hash space of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashWidth {
    /// FNV-1a 32-bit
    Bits32,
    /// FNV-1a 64-bit
    Bits64,
}

/// Where an index reads one field value from
///
/// Returning `None` means the entity does not populate the field, and the
/// entity gets no entry in the index.
pub enum FieldSource<T> {
    /// Byte-like field: strings, raw bytes, foreign-key names
    Bytes(fn(&T) -> Option<&[u8]>),
    /// Unsigned integer field, hashed over its big-endian bytes
    Uint(fn(&T) -> Option<u64>),
}

impl<T> FieldSource<T> {
    /// Source reading a byte-like field
    pub fn bytes(read: fn(&T) -> Option<&[u8]>) -> Self {
        FieldSource::Bytes(read)
    }

    /// Source reading an unsigned integer field
    pub fn uint(read: fn(&T) -> Option<u64>) -> Self {
        FieldSource::Uint(read)
    }

    fn hash32(&self, entity: &T) -> Option<u32> {
        match self {
            FieldSource::Bytes(read) => read(entity).map(hash32),
            FieldSource::Uint(read) => read(entity).map(|v| hash32(&v.to_be_bytes())),
        }
    }

    fn hash64(&self, entity: &T) -> Option<u64> {
        match self {
            FieldSource::Bytes(read) => read(entity).map(hash64),
            FieldSource::Uint(read) => read(entity).map(|v| hash64(&v.to_be_bytes())),
        }
    }
}

impl<T> Clone for FieldSource<T> {
    fn clone(&self) -> Self {
        match self {
            FieldSource::Bytes(read) => FieldSource::Bytes(*read),
            FieldSource::Uint(read) => FieldSource::Uint(*read),
        }
    }
}

impl<T> fmt::Debug for FieldSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSource::Bytes(_) => f.write_str("Bytes"),
            FieldSource::Uint(_) => f.write_str("Uint"),
        }
    }
}

enum IndexSource<T> {
    Single(FieldSource<T>),
    Pair(FieldSource<T>, FieldSource<T>),
}

impl<T> Clone for IndexSource<T> {
    fn clone(&self) -> Self {
        match self {
            IndexSource::Single(field) => IndexSource::Single(field.clone()),
            IndexSource::Pair(a, b) => IndexSource::Pair(a.clone(), b.clone()),
        }
    }
}

/// Definition of one secondary index: a name, a hash width and the
/// field(s) it hashes
pub struct IndexDef<T> {
    name: &'static str,
    width: HashWidth,
    source: IndexSource<T>,
}

impl<T> IndexDef<T> {
    /// Index on `hash32(field)`
    pub fn field32(name: &'static str, field: FieldSource<T>) -> Self {
        Self {
            name,
            width: HashWidth::Bits32,
            source: IndexSource::Single(field),
        }
    }

    /// Index on `hash64(field)`
    pub fn field64(name: &'static str, field: FieldSource<T>) -> Self {
        Self {
            name,
            width: HashWidth::Bits64,
            source: IndexSource::Single(field),
        }
    }

    /// Index on `hash32_pair(hash32(first), hash32(second))`
    ///
    /// Entities that leave either field unpopulated are not indexed.
    pub fn pair32(name: &'static str, first: FieldSource<T>, second: FieldSource<T>) -> Self {
        Self {
            name,
            width: HashWidth::Bits32,
            source: IndexSource::Pair(first, second),
        }
    }

    /// Index on `hash64_pair(hash64(first), hash64(second))`
    ///
    /// Entities that leave either field unpopulated are not indexed.
    pub fn pair64(name: &'static str, first: FieldSource<T>, second: FieldSource<T>) -> Self {
        Self {
            name,
            width: HashWidth::Bits64,
            source: IndexSource::Pair(first, second),
        }
    }

    /// Index name, unique within a replica
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Hash space of this index
    pub fn width(&self) -> HashWidth {
        self.width
    }

    /// Whether this index hashes a pair of fields
    pub fn is_pair(&self) -> bool {
        matches!(self.source, IndexSource::Pair(..))
    }

    /// Index hash of `entity`'s current field values, `None` if unpopulated
    pub fn hash_of(&self, entity: &T) -> Option<IndexHash> {
        match (&self.source, self.width) {
            (IndexSource::Single(field), HashWidth::Bits32) => field.hash32(entity).map(Into::into),
            (IndexSource::Single(field), HashWidth::Bits64) => field.hash64(entity).map(Into::into),
            (IndexSource::Pair(a, b), HashWidth::Bits32) => {
                let first = a.hash32(entity)?;
                let second = b.hash32(entity)?;
                Some(hash32_pair(first, second).into())
            }
            (IndexSource::Pair(a, b), HashWidth::Bits64) => {
                let first = a.hash64(entity)?;
                let second = b.hash64(entity)?;
                Some(hash64_pair(first, second).into())
            }
        }
    }
}

impl<T> Clone for IndexDef<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            width: self.width,
            source: self.source.clone(),
        }
    }
}

impl<T> fmt::Debug for IndexDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexDef")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("pair", &self.is_pair())
            .finish()
    }
}

/// Secondary index: IndexHash → Keys
///
/// Kept consistent with the owning replica by `observe`, which the replica
/// calls for every applied event with the entity's previous and current
/// values.
pub struct SecondaryIndex<T> {
    def: IndexDef<T>,
    buckets: FxHashMap<IndexHash, SmallVec<[EntityKey; 1]>>,
    entries: usize,
}

impl<T: Entity> SecondaryIndex<T> {
    /// Create an empty index for `def`
    pub fn new(def: IndexDef<T>) -> Self {
        Self {
            def,
            buckets: FxHashMap::default(),
            entries: 0,
        }
    }

    /// Definition this index was built from
    pub fn def(&self) -> &IndexDef<T> {
        &self.def
    }

    /// Index name
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// Record a change to the entity under `key`
    ///
    /// `previous` is the value the replica held before the change (`None` if
    /// absent) and `current` the value after it (`None` once deleted). The
    /// stale entry, if any, is removed in the same step the new one is added.
    pub fn observe(&mut self, key: &EntityKey, previous: Option<&T>, current: Option<&T>) {
        let old = previous.and_then(|entity| self.def.hash_of(entity));
        let new = current.and_then(|entity| self.def.hash_of(entity));
        if old == new {
            return;
        }
        if let Some(hash) = old {
            self.remove_entry(hash, key);
        }
        if let Some(hash) = new {
            self.insert_entry(hash, key.clone());
        }
    }

    /// Most recently indexed key for `hash`
    pub fn lookup_key(&self, hash: IndexHash) -> Option<&EntityKey> {
        self.buckets.get(&hash).and_then(|bucket| bucket.last())
    }

    /// Every key indexed under `hash`, oldest first
    pub fn keys(&self, hash: IndexHash) -> &[EntityKey] {
        self.buckets
            .get(&hash)
            .map(|bucket| bucket.as_slice())
            .unwrap_or(&[])
    }

    /// Number of indexed entities
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Number of distinct hashes (fewer than `len` only under collisions)
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn insert_entry(&mut self, hash: IndexHash, key: EntityKey) {
        let bucket = self.buckets.entry(hash).or_default();
        if let Some(pos) = bucket.iter().position(|k| *k == key) {
            // Re-indexing moves the key to the most-recent slot
            let existing = bucket.remove(pos);
            bucket.push(existing);
            return;
        }
        bucket.push(key);
        self.entries += 1;
    }

    fn remove_entry(&mut self, hash: IndexHash, key: &EntityKey) {
        if let Some(bucket) = self.buckets.get_mut(&hash) {
            let before = bucket.len();
            bucket.retain(|k| k != key);
            self.entries -= before - bucket.len();
            if bucket.is_empty() {
                self.buckets.remove(&hash);
            }
        }
    }
}

impl<T: Entity> Clone for SecondaryIndex<T> {
    fn clone(&self) -> Self {
        Self {
            def: self.def.clone(),
            buckets: self.buckets.clone(),
            entries: self.entries,
        }
    }
}

impl<T> fmt::Debug for SecondaryIndex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecondaryIndex")
            .field("def", &self.def)
            .field("entries", &self.entries)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}
