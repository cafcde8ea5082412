//! Contract with the remote entity store
//!
//! The remote owns durable state and the commit order. The client only
//! relies on its observable behaviour:
//! - Accepted writes eventually reach every watcher of the kind, in commit
//!   order
//! - A write that changes nothing leaves no backlog behind
//! - `watch` delivers the current rows as `Created` events, then every
//!   later commit, with no gap

use configstore_core::{Entity, EntityKey, Result};
use configstore_storage::ChangeStream;

/// Remote entity store
///
/// # Errors
///
/// Implementations report:
/// - `Error::NotFound(key)` for a read, update or delete of an absent key
/// - `Error::AlreadyExists(key)` for a create over an existing key
/// - `Error::IncompleteKey` where a named key is required
/// - `Error::Remote(reason)` for anything the store itself rejects
/// - `Error::Closed` once the store is shut down
pub trait Remote: Send + Sync + 'static {
    /// Store a new entity, naming an incomplete key; returns the stored value
    fn create<T: Entity>(&self, entity: T) -> Result<T>;

    /// Replace an existing entity
    fn update<T: Entity>(&self, entity: T) -> Result<T>;

    /// Create or replace an entity under a named key
    fn upsert<T: Entity>(&self, entity: T) -> Result<T>;

    /// Remove an entity, returning its last value
    fn delete<T: Entity>(&self, key: &EntityKey) -> Result<T>;

    /// Read one entity from the remote
    fn get<T: Entity>(&self, key: &EntityKey) -> Result<T>;

    /// Up to `limit` entities in key order; `0` means no limit
    fn list<T: Entity>(&self, limit: usize) -> Result<Vec<T>>;

    /// Open a change stream for kind `T`
    fn watch<T: Entity>(&self) -> Result<Box<dyn ChangeStream<T>>>;

    /// Accepted writes not yet delivered to watchers
    ///
    /// Diagnostic only; used to check that the commit queue drains.
    fn pending_writes(&self) -> Result<u64>;
}
