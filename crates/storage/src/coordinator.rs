//! Snapshot coordinator for consistent captures across replicas
//!
//! Each replica is fed by its own independent stream, so there is no shared
//! clock to cut at. The coordinator builds a joint consistent cut instead:
//! - Order the replicas by a fixed global key: (kind, replica id)
//! - Take every replica's apply gate in that order
//! - Copy each replica's state while all gates are held
//! - Release the gates in reverse order
//!
//! Because every caller acquires gates in the same order, overlapping
//! `take_snapshots` calls cannot deadlock, whatever order their arguments
//! were given in. Stream consumers block on the gate for the duration of the
//! copy and resume immediately after; no event is dropped or reordered.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use configstore_core::{Entity, ReplicationConfig};
use tracing::{debug, warn};

use crate::replica::{ApplyGuard, Replica, ReplicaId};
use crate::snapshot::Snapshot;

mod private {
    pub trait Sealed {}
}

impl<T: Entity> private::Sealed for Replica<T> {}

/// Type-erased snapshot member of a `SnapshotSet`
pub struct ErasedSnapshot {
    replica: ReplicaId,
    kind: &'static str,
    snapshot: Box<dyn Any + Send + Sync>,
}

impl ErasedSnapshot {
    fn downcast<T: Entity>(&self) -> Option<&Snapshot<T>> {
        self.snapshot.downcast_ref::<Snapshot<T>>()
    }
}

impl std::fmt::Debug for ErasedSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedSnapshot")
            .field("replica", &self.replica)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A replica the coordinator can capture without knowing its entity type
///
/// Sealed: implemented only by `Replica<T>`.
pub trait CaptureSource: private::Sealed + Send + Sync {
    /// Identity used as the lock-order tie-breaker
    fn replica_id(&self) -> ReplicaId;

    /// Entity kind, the primary lock-order key
    fn kind(&self) -> &'static str;

    /// Take the replica's apply gate
    fn lock_applies(&self) -> ApplyGuard<'_>;

    /// Copy state while the caller holds the gate
    fn capture_held(&self, guard: &ApplyGuard<'_>) -> ErasedSnapshot;
}

impl<T: Entity> CaptureSource for Replica<T> {
    fn replica_id(&self) -> ReplicaId {
        self.id()
    }

    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn lock_applies(&self) -> ApplyGuard<'_> {
        Replica::lock_applies(self)
    }

    fn capture_held(&self, guard: &ApplyGuard<'_>) -> ErasedSnapshot {
        ErasedSnapshot {
            replica: self.id(),
            kind: T::KIND,
            snapshot: Box::new(Replica::capture_held(self, guard)),
        }
    }
}

/// Mutually consistent snapshots of several replicas
///
/// Members are stored in lock order.
#[derive(Debug, Default)]
pub struct SnapshotSet {
    members: Vec<ErasedSnapshot>,
    pause: Duration,
}

impl SnapshotSet {
    /// Snapshot of the first captured replica of kind `T::KIND`
    pub fn get<T: Entity>(&self) -> Option<&Snapshot<T>> {
        self.members
            .iter()
            .filter(|m| m.kind == T::KIND)
            .find_map(|m| m.downcast::<T>())
    }

    /// Snapshot of one specific replica
    pub fn get_for<T: Entity>(&self, replica: &Replica<T>) -> Option<&Snapshot<T>> {
        self.members
            .iter()
            .find(|m| m.replica == replica.id())
            .and_then(|m| m.downcast::<T>())
    }

    /// Kinds of the captured replicas, in lock order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.members.iter().map(|m| m.kind).collect()
    }

    /// Number of captured replicas
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if nothing was captured
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// How long applies were held off while capturing
    pub fn pause(&self) -> Duration {
        self.pause
    }
}

/// Coordinates single and multi-replica snapshot capture
///
/// # Memory Ordering
///
/// The counters use Relaxed ordering: they are observational only and do
/// not synchronise other memory.
pub struct SnapshotCoordinator {
    pause_warn: Duration,
    total_captures: AtomicU64,
    replicas_captured: AtomicU64,
    last_pause_nanos: AtomicU64,
    max_pause_nanos: AtomicU64,
}

impl SnapshotCoordinator {
    /// Create a coordinator that warns about pauses longer than `pause_warn`
    pub fn new(pause_warn: Duration) -> Self {
        Self {
            pause_warn,
            total_captures: AtomicU64::new(0),
            replicas_captured: AtomicU64::new(0),
            last_pause_nanos: AtomicU64::new(0),
            max_pause_nanos: AtomicU64::new(0),
        }
    }

    /// Create a coordinator from replication config
    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self::new(config.snapshot_pause_warn())
    }

    /// Capture one replica
    ///
    /// Consistent with every event applied before the call returns and none
    /// after.
    pub fn take_snapshot<T: Entity>(&self, replica: &Replica<T>) -> Snapshot<T> {
        let guard = replica.lock_applies();
        let started = Instant::now();
        let snapshot = replica.capture_held(&guard);
        drop(guard);
        self.record(1, started.elapsed(), &[T::KIND]);
        snapshot
    }

    /// Capture several replicas at one consistent instant
    ///
    /// Replicas listed more than once are captured once. An empty slice
    /// yields an empty set.
    pub fn take_snapshots(&self, sources: &[&dyn CaptureSource]) -> SnapshotSet {
        let mut ordered: Vec<&dyn CaptureSource> = sources.to_vec();
        ordered.sort_by(|a, b| (a.kind(), a.replica_id()).cmp(&(b.kind(), b.replica_id())));
        ordered.dedup_by_key(|s| s.replica_id());

        if ordered.is_empty() {
            return SnapshotSet::default();
        }

        let mut guards: Vec<ApplyGuard<'_>> = Vec::with_capacity(ordered.len());
        let mut started = None;
        for source in &ordered {
            guards.push(source.lock_applies());
            started.get_or_insert_with(Instant::now);
        }

        let members: Vec<ErasedSnapshot> = ordered
            .iter()
            .zip(&guards)
            .map(|(source, guard)| source.capture_held(guard))
            .collect();

        while let Some(guard) = guards.pop() {
            drop(guard);
        }
        let pause = started.map(|s| s.elapsed()).unwrap_or_default();

        let kinds: Vec<&'static str> = members.iter().map(|m| m.kind).collect();
        self.record(members.len() as u64, pause, &kinds);

        SnapshotSet { members, pause }
    }

    fn record(&self, replicas: u64, pause: Duration, kinds: &[&'static str]) {
        let nanos = u64::try_from(pause.as_nanos()).unwrap_or(u64::MAX);
        self.total_captures.fetch_add(1, Ordering::Relaxed);
        self.replicas_captured.fetch_add(replicas, Ordering::Relaxed);
        self.last_pause_nanos.store(nanos, Ordering::Relaxed);
        self.max_pause_nanos.fetch_max(nanos, Ordering::Relaxed);

        if pause > self.pause_warn {
            warn!(
                target: "configstore::snapshot",
                ?kinds,
                pause_us = pause.as_micros() as u64,
                warn_us = self.pause_warn.as_micros() as u64,
                "Snapshot capture held applies longer than expected"
            );
        } else {
            debug!(
                target: "configstore::snapshot",
                ?kinds,
                pause_us = pause.as_micros() as u64,
                "Snapshot captured"
            );
        }
    }

    /// Get capture metrics
    pub fn metrics(&self) -> SnapshotMetrics {
        SnapshotMetrics {
            total_captures: self.total_captures.load(Ordering::Relaxed),
            replicas_captured: self.replicas_captured.load(Ordering::Relaxed),
            last_pause: Duration::from_nanos(self.last_pause_nanos.load(Ordering::Relaxed)),
            max_pause: Duration::from_nanos(self.max_pause_nanos.load(Ordering::Relaxed)),
        }
    }
}

impl Default for SnapshotCoordinator {
    fn default() -> Self {
        Self::from_config(&ReplicationConfig::default())
    }
}

/// Snapshot capture metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMetrics {
    /// Number of `take_snapshot`/`take_snapshots` calls that captured anything
    pub total_captures: u64,
    /// Sum of replicas over all captures
    pub replicas_captured: u64,
    /// Apply pause of the most recent capture
    pub last_pause: Duration,
    /// Longest apply pause seen
    pub max_pause: Duration,
}
