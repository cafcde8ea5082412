//! configstore - client-side replicas of a remote entity store
//!
//! Mirrors selected entity kinds into local memory, keeps secondary hash
//! indices over them, and captures consistent snapshots across kinds.
//!
//! # Crates
//!
//! - [`core`]: keys, entities, change events, hashing, config and errors
//! - [`storage`]: replicas, indices, snapshots and watch workers
//! - [`client`]: the remote contract, an in-memory remote and the
//!   connection context

pub use configstore_client as client;
pub use configstore_core as core;
pub use configstore_storage as storage;

pub use configstore_client::{Configstore, ConfigstoreBuilder, EntitySet, InMemoryRemote, Remote};
pub use configstore_core::{
    ChangeEvent, ChangeKind, Entity, EntityKey, Error, PartitionId, ReplicationConfig, Result,
    Timestamp,
};
pub use configstore_storage::{
    FieldSource, IndexDef, IndexHash, Replica, Snapshot, SnapshotSet, WatchStatus,
};
