//! Replica engine for configstore
//!
//! This crate implements the local side of replication:
//! - Replica: per-kind in-memory mirror with RwLock-guarded state
//! - Secondary hash indices kept consistent with each replica
//! - Snapshot: immutable point-in-time copy of one replica
//! - SnapshotCoordinator: consistent captures across several replicas
//! - WatchWorker: background thread applying one kind's change stream
//!
//! # Concurrency
//!
//! Each replica has exactly one writer (its watch worker) and any number
//! of readers. Readers never block on the network and never observe a
//! partially applied event.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod index;
pub mod replica;
pub mod snapshot;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{CaptureSource, SnapshotCoordinator, SnapshotMetrics, SnapshotSet};
pub use index::{FieldSource, HashWidth, IndexDef, IndexHash, SecondaryIndex};
pub use replica::{ApplyGuard, Replica, ReplicaBuilder, ReplicaId};
pub use snapshot::Snapshot;
pub use watch::{ChangeStream, Recv, WatchExit, WatchHandle, WatchStatus, WatchWorker};
