//! Connection context: replicas, watch workers and the snapshot coordinator
//!
//! A [`Configstore`] is built explicitly, owns one replica and one watch
//! worker per registered kind, and is torn down explicitly with `close()`
//! (or on drop). Contexts share nothing with each other, so several can be
//! connected to the same remote at once.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use configstore_core::{Entity, EntityKey, Error, ReplicationConfig, Result};
use configstore_storage::{
    CaptureSource, IndexHash, Replica, ReplicaBuilder, Snapshot, SnapshotCoordinator,
    SnapshotMetrics, SnapshotSet, WatchExit, WatchHandle, WatchStatus, WatchWorker,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::remote::Remote;

type Registration<R> = Box<dyn FnOnce(&Arc<R>, &ReplicationConfig) -> Result<RegisteredKind>>;

enum WorkerSlot {
    Running(WatchHandle),
    Finished(WatchStatus),
}

/// One replicated kind: its replica, seen both typed and as a capture source
struct RegisteredKind {
    replica: Arc<dyn Any + Send + Sync>,
    capture: Arc<dyn CaptureSource>,
    worker: Mutex<WorkerSlot>,
}

impl RegisteredKind {
    fn new<T: Entity>(replica: Arc<Replica<T>>, handle: WatchHandle) -> Self {
        Self {
            capture: Arc::clone(&replica) as Arc<dyn CaptureSource>,
            replica,
            worker: Mutex::new(WorkerSlot::Running(handle)),
        }
    }

    fn status(&self) -> WatchStatus {
        match &*self.worker.lock() {
            WorkerSlot::Running(handle) => handle.status(),
            WorkerSlot::Finished(status) => status.clone(),
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for a [`Configstore`] connection
///
/// # Example
///
/// ```ignore
/// let store = Configstore::builder(remote)
///     .config(ReplicationConfig::from_toml_str(&text)?)
///     .replicate(Replica::<User>::builder().index(by_email))
///     .replicate(Replica::<Project>::builder())
///     .connect()?;
/// ```
pub struct ConfigstoreBuilder<R: Remote> {
    remote: Arc<R>,
    config: ReplicationConfig,
    registrations: Vec<(&'static str, Registration<R>)>,
}

impl<R: Remote> ConfigstoreBuilder<R> {
    /// Replace the default replication config
    pub fn config(mut self, config: ReplicationConfig) -> Self {
        self.config = config;
        self
    }

    /// Replicate kind `T` into a replica built from `replica`
    pub fn replicate<T: Entity>(mut self, replica: ReplicaBuilder<T>) -> Self {
        let register: Registration<R> = Box::new(move |remote, config| {
            let replica = Arc::new(replica.build());
            let stream = remote.watch::<T>()?;
            let handle = WatchWorker::new(Arc::clone(&replica), stream, config).spawn()?;
            Ok(RegisteredKind::new(replica, handle))
        });
        self.registrations.push((T::KIND, register));
        self
    }

    /// Open one watch per registered kind and start its worker
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfig` if the config is out of range or a kind is
    ///   registered twice
    /// - Any error from the remote's `watch`
    /// - `Error::IoError` if a worker thread cannot be spawned
    ///
    /// Workers already started are stopped again before the error returns.
    pub fn connect(self) -> Result<Configstore<R>> {
        self.config.validate()?;

        let mut kinds: FxHashMap<&'static str, RegisteredKind> = FxHashMap::default();
        for (kind, register) in self.registrations {
            if kinds.contains_key(kind) {
                return Err(Error::InvalidConfig(format!(
                    "kind {kind} is registered more than once"
                )));
            }
            let registered = register(&self.remote, &self.config)?;
            kinds.insert(kind, registered);
        }

        info!(
            target: "configstore::client",
            kinds = kinds.len(),
            thread_prefix = %self.config.thread_prefix,
            "Configstore connected"
        );

        Ok(Configstore {
            coordinator: Arc::new(SnapshotCoordinator::from_config(&self.config)),
            remote: self.remote,
            config: self.config,
            kinds,
            closed: AtomicBool::new(false),
        })
    }
}

// ============================================================================
// Context
// ============================================================================

/// A connection to a remote store with local replicas of selected kinds
pub struct Configstore<R: Remote> {
    remote: Arc<R>,
    config: ReplicationConfig,
    coordinator: Arc<SnapshotCoordinator>,
    kinds: FxHashMap<&'static str, RegisteredKind>,
    closed: AtomicBool,
}

impl<R: Remote> Configstore<R> {
    /// Start configuring a connection to `remote`
    pub fn builder(remote: Arc<R>) -> ConfigstoreBuilder<R> {
        ConfigstoreBuilder {
            remote,
            config: ReplicationConfig::default(),
            registrations: Vec::new(),
        }
    }

    /// Remote this context writes to and watches
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Config the context was connected with
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Replicated kinds, sorted
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.kinds.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    fn registered(&self, kind: &str) -> Result<&RegisteredKind> {
        self.kinds
            .get(kind)
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))
    }

    /// Typed replica of kind `T`
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownKind` if `T` was not registered.
    pub fn replica<T: Entity>(&self) -> Result<Arc<Replica<T>>> {
        let registered = self.registered(T::KIND)?;
        Arc::clone(&registered.replica)
            .downcast::<Replica<T>>()
            .map_err(|_| Error::UnknownKind(T::KIND.to_string()))
    }

    /// Per-kind facade over the remote and the local replica
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownKind` if `T` was not registered.
    pub fn entities<T: Entity>(&self) -> Result<EntitySet<T, R>> {
        Ok(EntitySet {
            remote: Arc::clone(&self.remote),
            replica: self.replica::<T>()?,
            coordinator: Arc::clone(&self.coordinator),
        })
    }

    /// Capture the named kinds at one consistent instant
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownKind` for a kind that was not registered;
    /// nothing is captured in that case.
    pub fn take_snapshots(&self, kinds: &[&str]) -> Result<SnapshotSet> {
        let sources = kinds
            .iter()
            .map(|kind| {
                self.registered(kind)
                    .map(|registered| &*registered.capture as &dyn CaptureSource)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.coordinator.take_snapshots(&sources))
    }

    /// Lifecycle state of a kind's watch worker
    pub fn watch_status(&self, kind: &str) -> Result<WatchStatus> {
        Ok(self.registered(kind)?.status())
    }

    /// Capture metrics of this context's coordinator
    pub fn snapshot_metrics(&self) -> SnapshotMetrics {
        self.coordinator.metrics()
    }

    /// Whether `close` has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop every watch worker and wait for them
    ///
    /// Replicas stay readable afterwards but no longer change. Idempotent.
    ///
    /// # Errors
    ///
    /// The first stream failure or malformed event any worker stopped on,
    /// in kind order.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Signal everyone first so workers wind down in parallel
        let mut running = Vec::new();
        for kind in self.kinds() {
            let registered = &self.kinds[kind];
            let mut slot = registered.worker.lock();
            let previous =
                std::mem::replace(&mut *slot, WorkerSlot::Finished(WatchStatus::Stopped));
            match previous {
                WorkerSlot::Running(handle) => {
                    handle.shutdown();
                    running.push((kind, handle));
                }
                finished => *slot = finished,
            }
        }

        let mut first_error = None;
        for (kind, handle) in running {
            let status = match handle.join() {
                Ok(WatchExit::Ended) => WatchStatus::Ended,
                Ok(WatchExit::Stopped) => WatchStatus::Stopped,
                Err(e) => {
                    warn!(
                        target: "configstore::client",
                        kind,
                        error = %e,
                        "Watch worker had failed"
                    );
                    let status = WatchStatus::Failed(e.to_string());
                    first_error.get_or_insert(e);
                    status
                }
            };
            *self.kinds[kind].worker.lock() = WorkerSlot::Finished(status);
        }

        info!(target: "configstore::client", kinds = self.kinds.len(), "Configstore closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<R: Remote> Drop for Configstore<R> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl<R: Remote> std::fmt::Debug for Configstore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configstore")
            .field("kinds", &self.kinds())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// EntitySet
// ============================================================================

/// Typed access to one replicated kind
///
/// Writes and `fetch` go to the remote; `get`, `lookup` and snapshots read
/// the local replica, which reflects a write only once its event arrives.
pub struct EntitySet<T: Entity, R: Remote> {
    remote: Arc<R>,
    replica: Arc<Replica<T>>,
    coordinator: Arc<SnapshotCoordinator>,
}

impl<T: Entity, R: Remote> EntitySet<T, R> {
    /// Create on the remote; returns the stored entity with its assigned key
    pub fn create(&self, entity: T) -> Result<T> {
        self.remote.create(entity)
    }

    /// Replace on the remote
    pub fn update(&self, entity: T) -> Result<T> {
        self.remote.update(entity)
    }

    /// Create or replace on the remote
    pub fn upsert(&self, entity: T) -> Result<T> {
        self.remote.upsert(entity)
    }

    /// Delete on the remote, returning the last value
    pub fn delete(&self, key: &EntityKey) -> Result<T> {
        self.remote.delete::<T>(key)
    }

    /// Read from the remote, bypassing the replica
    pub fn fetch(&self, key: &EntityKey) -> Result<T> {
        self.remote.get::<T>(key)
    }

    /// List from the remote
    pub fn list(&self, limit: usize) -> Result<Vec<T>> {
        self.remote.list::<T>(limit)
    }

    /// Local read
    pub fn get(&self, key: &EntityKey) -> Option<Arc<T>> {
        self.replica.get(key)
    }

    /// Local presence check
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.replica.contains(key)
    }

    /// Local index lookup
    pub fn lookup(&self, index: &str, hash: impl Into<IndexHash>) -> Option<Arc<T>> {
        self.replica.lookup(index, hash)
    }

    /// Every local entity under `hash` in `index`
    pub fn lookup_all(&self, index: &str, hash: impl Into<IndexHash>) -> Vec<Arc<T>> {
        self.replica.lookup_all(index, hash)
    }

    /// Local index lookup with an equality check
    pub fn lookup_where<F>(
        &self,
        index: &str,
        hash: impl Into<IndexHash>,
        matches: F,
    ) -> Option<Arc<T>>
    where
        F: Fn(&T) -> bool,
    {
        self.replica.lookup_where(index, hash, matches)
    }

    /// Snapshot of the local replica
    pub fn take_snapshot(&self) -> Snapshot<T> {
        self.coordinator.take_snapshot(&self.replica)
    }

    /// The local replica
    pub fn replica(&self) -> &Arc<Replica<T>> {
        &self.replica
    }
}

impl<T: Entity, R: Remote> Clone for EntitySet<T, R> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            replica: Arc::clone(&self.replica),
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}
