//! In-process remote store
//!
//! A controllable implementation of [`Remote`] for tests and embedded use.
//!
//! # Features
//!
//! - **Entity storage**: one table per kind, keyed by `EntityKey`
//! - **Server-assigned names**: incomplete keys are named with a UUID on create
//! - **Commit queue**: every accepted write enqueues one entry; a background
//!   committer drains the queue FIFO and fans each entry out to watchers
//! - **Queue control**: pause and resume commits to observe pending writes
//! - **Failure injection**: fail the next N writes, or break a kind's streams
//! - **Request counting**: track writes and reads for verification
//!
//! # Example
//!
//! ```ignore
//! let remote = Arc::new(InMemoryRemote::new()?);
//!
//! let user = remote.create(User::new("hello@example.com"))?;
//! assert!(!user.key().is_incomplete());
//!
//! let stream = remote.watch::<User>()?;
//! ```

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use configstore_core::{
    ChangeEvent, ChangeKind, Entity, EntityKey, Error, ReplicationConfig, Result,
};
use configstore_storage::ChangeStream;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::remote::Remote;

type EventSender<T> = Sender<Result<ChangeEvent<T>>>;

/// Rows and watchers of one kind
struct Table<T> {
    /// Accepted state: what reads and write validation see
    rows: BTreeMap<EntityKey, T>,
    /// State as of the last commit delivered to watchers
    committed: BTreeMap<EntityKey, T>,
    watchers: Vec<EventSender<T>>,
}

impl<T: Entity> Table<T> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            committed: BTreeMap::new(),
            watchers: Vec::new(),
        }
    }

    /// Deliver one committed event, dropping watchers whose stream is gone
    fn commit(&mut self, event: ChangeEvent<T>) {
        let key = event.key().clone();
        match event.kind {
            ChangeKind::Created | ChangeKind::Updated => {
                self.committed.insert(key, event.entity.clone());
            }
            ChangeKind::Deleted => {
                self.committed.remove(&key);
            }
        }
        self.watchers
            .retain(|watcher| watcher.send(Ok(event.clone())).is_ok());
    }
}

/// Type-erased per-kind table
trait ErasedTable: Send + Sync {
    fn close_watchers(&self);
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

struct KindTable<T> {
    inner: Mutex<Table<T>>,
}

impl<T: Entity> ErasedTable for KindTable<T> {
    fn close_watchers(&self) {
        self.inner.lock().watchers.clear();
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// One entry in the commit queue
struct PendingWrite {
    kind: &'static str,
    key: EntityKey,
    change: ChangeKind,
    deliver: Box<dyn FnOnce() + Send>,
}

struct CommitQueue {
    entries: VecDeque<PendingWrite>,
    paused: bool,
    shutdown: bool,
}

/// Shared state for the remote and its committer thread
struct RemoteState {
    tables: DashMap<&'static str, Arc<dyn ErasedTable>>,
    queue: Mutex<CommitQueue>,
    work_ready: Condvar,
    /// Queued plus in-delivery writes
    pending: AtomicU64,
    closed: AtomicBool,
    commit_delay: Duration,

    /// Number of write failures to inject for the next writes
    fail_writes: AtomicUsize,
    /// Total write requests received
    write_count: AtomicUsize,
    /// Total read requests received
    read_count: AtomicUsize,
}

impl RemoteState {
    fn table<T: Entity>(&self) -> Result<Arc<KindTable<T>>> {
        let erased = self
            .tables
            .entry(T::KIND)
            .or_insert_with(|| {
                Arc::new(KindTable::<T> {
                    inner: Mutex::new(Table::new()),
                }) as Arc<dyn ErasedTable>
            })
            .value()
            .clone();
        erased.as_any().downcast::<KindTable<T>>().map_err(|_| {
            Error::Remote(format!(
                "kind {} is registered with a different entity type",
                T::KIND
            ))
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Gate every write: closed check, injected failures, counting
    fn begin_write(&self) -> Result<()> {
        self.check_open()?;
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let injected = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::Remote("injected write failure".to_string()));
        }
        Ok(())
    }

    fn begin_read(&self) -> Result<()> {
        self.check_open()?;
        self.read_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Queue delivery of `event` to the kind's watchers
    ///
    /// Called with the kind's table locked, so queue order matches the order
    /// in which rows were changed.
    fn enqueue<T: Entity>(&self, table: &Arc<KindTable<T>>, event: ChangeEvent<T>) {
        let target = Arc::clone(table);
        let key = event.key().clone();
        let change = event.kind;
        let mut queue = self.queue.lock();
        queue.entries.push_back(PendingWrite {
            kind: T::KIND,
            key,
            change,
            deliver: Box::new(move || target.inner.lock().commit(event)),
        });
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.work_ready.notify_one();
    }

    fn run_committer(&self) {
        loop {
            let entry = {
                let mut queue = self.queue.lock();
                loop {
                    if queue.shutdown {
                        return;
                    }
                    if !queue.paused {
                        if let Some(entry) = queue.entries.pop_front() {
                            break entry;
                        }
                    }
                    self.work_ready.wait(&mut queue);
                }
            };

            if !self.commit_delay.is_zero() {
                thread::sleep(self.commit_delay);
            }

            let PendingWrite {
                kind,
                key,
                change,
                deliver,
            } = entry;
            deliver();
            self.pending.fetch_sub(1, Ordering::SeqCst);
            debug!(target: "configstore::remote", kind, %key, %change, "Write committed");
        }
    }
}

/// In-process remote store with a background commit queue
///
/// Dropping the remote shuts it down: the committer stops and every open
/// change stream ends.
pub struct InMemoryRemote {
    state: Arc<RemoteState>,
    committer: Mutex<Option<JoinHandle<()>>>,
}

impl InMemoryRemote {
    /// Create a remote with default configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::IoError` if the committer thread cannot be spawned.
    pub fn new() -> Result<Self> {
        Self::with_config(&ReplicationConfig::default())
    }

    /// Create a remote whose committer waits `commit_delay` per write
    pub fn with_config(config: &ReplicationConfig) -> Result<Self> {
        let state = Arc::new(RemoteState {
            tables: DashMap::new(),
            queue: Mutex::new(CommitQueue {
                entries: VecDeque::new(),
                paused: false,
                shutdown: false,
            }),
            work_ready: Condvar::new(),
            pending: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            commit_delay: config.commit_delay(),
            fail_writes: AtomicUsize::new(0),
            write_count: AtomicUsize::new(0),
            read_count: AtomicUsize::new(0),
        });

        let committer_state = Arc::clone(&state);
        let committer = thread::Builder::new()
            .name("configstore-commit".to_string())
            .spawn(move || committer_state.run_committer())?;

        info!(
            target: "configstore::remote",
            commit_delay_ms = config.commit_delay_ms,
            "In-memory remote started"
        );

        Ok(Self {
            state,
            committer: Mutex::new(Some(committer)),
        })
    }

    /// Hold committed writes in the queue until `resume_commits`
    pub fn pause_commits(&self) {
        self.state.queue.lock().paused = true;
    }

    /// Let the committer drain the queue again
    pub fn resume_commits(&self) {
        self.state.queue.lock().paused = false;
        self.state.work_ready.notify_all();
    }

    /// Fail the next `count` writes with `Error::Remote`
    pub fn inject_write_failures(&self, count: usize) {
        self.state.fail_writes.store(count, Ordering::SeqCst);
    }

    /// Break every open stream of kind `T` with a stream error
    ///
    /// The streams receive the error and are then closed.
    pub fn inject_stream_failure<T: Entity>(&self, reason: &str) -> Result<()> {
        let table = self.state.table::<T>()?;
        let mut inner = table.inner.lock();
        for watcher in inner.watchers.drain(..) {
            let _ = watcher.send(Err(Error::stream_failed(T::KIND, reason)));
        }
        warn!(target: "configstore::remote", kind = T::KIND, reason, "Injected stream failure");
        Ok(())
    }

    /// Number of open change streams for kind `T`
    pub fn watcher_count<T: Entity>(&self) -> usize {
        self.state
            .table::<T>()
            .map(|table| table.inner.lock().watchers.len())
            .unwrap_or(0)
    }

    /// Total write requests received
    pub fn write_count(&self) -> usize {
        self.state.write_count.load(Ordering::Relaxed)
    }

    /// Total read requests received
    pub fn read_count(&self) -> usize {
        self.state.read_count.load(Ordering::Relaxed)
    }

    /// Whether `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Stop the committer and end every change stream
    ///
    /// Writes still queued are discarded. Idempotent.
    pub fn shutdown(&self) {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut queue = self.state.queue.lock();
            queue.shutdown = true;
            let discarded = queue.entries.len() as u64;
            queue.entries.clear();
            self.state.pending.fetch_sub(discarded, Ordering::SeqCst);
        }
        self.state.work_ready.notify_all();

        if let Some(committer) = self.committer.lock().take() {
            let _ = committer.join();
        }
        for table in self.state.tables.iter() {
            table.value().close_watchers();
        }
        info!(target: "configstore::remote", "In-memory remote shut down");
    }

    fn ensure_kind<T: Entity>(key: &EntityKey) -> Result<()> {
        if key.kind() != T::KIND {
            return Err(Error::Remote(format!(
                "key {} does not belong to kind {}",
                key,
                T::KIND
            )));
        }
        Ok(())
    }

    fn require_named<T: Entity>(key: &EntityKey) -> Result<()> {
        Self::ensure_kind::<T>(key)?;
        if key.is_incomplete() {
            return Err(Error::IncompleteKey);
        }
        Ok(())
    }
}

impl Remote for InMemoryRemote {
    fn create<T: Entity>(&self, mut entity: T) -> Result<T> {
        self.state.begin_write()?;
        Self::ensure_kind::<T>(entity.key())?;
        if entity.key().is_incomplete() {
            let named = entity
                .key()
                .complete_with(Uuid::new_v4().simple().to_string());
            *entity.key_mut() = named;
        }

        let table = self.state.table::<T>()?;
        let mut inner = table.inner.lock();
        let key = entity.key().clone();
        if inner.rows.contains_key(&key) {
            return Err(Error::AlreadyExists(key));
        }
        inner.rows.insert(key, entity.clone());
        self.state.enqueue(&table, ChangeEvent::created(entity.clone()));
        Ok(entity)
    }

    fn update<T: Entity>(&self, entity: T) -> Result<T> {
        self.state.begin_write()?;
        Self::require_named::<T>(entity.key())?;

        let table = self.state.table::<T>()?;
        let mut inner = table.inner.lock();
        let key = entity.key().clone();
        match inner.rows.get(&key) {
            None => return Err(Error::NotFound(key)),
            // No-op: acknowledged without a queue entry
            Some(existing) if *existing == entity => return Ok(entity),
            Some(_) => {}
        }
        inner.rows.insert(key, entity.clone());
        self.state.enqueue(&table, ChangeEvent::updated(entity.clone()));
        Ok(entity)
    }

    fn upsert<T: Entity>(&self, entity: T) -> Result<T> {
        self.state.begin_write()?;
        Self::require_named::<T>(entity.key())?;

        let table = self.state.table::<T>()?;
        let mut inner = table.inner.lock();
        let key = entity.key().clone();
        let event = match inner.rows.get(&key) {
            None => ChangeEvent::created(entity.clone()),
            Some(existing) if *existing == entity => return Ok(entity),
            Some(_) => ChangeEvent::updated(entity.clone()),
        };
        inner.rows.insert(key, entity.clone());
        self.state.enqueue(&table, event);
        Ok(entity)
    }

    fn delete<T: Entity>(&self, key: &EntityKey) -> Result<T> {
        self.state.begin_write()?;
        Self::require_named::<T>(key)?;

        let table = self.state.table::<T>()?;
        let mut inner = table.inner.lock();
        let removed = inner
            .rows
            .remove(key)
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        self.state.enqueue(&table, ChangeEvent::deleted(removed.clone()));
        Ok(removed)
    }

    fn get<T: Entity>(&self, key: &EntityKey) -> Result<T> {
        self.state.begin_read()?;
        Self::require_named::<T>(key)?;

        let table = self.state.table::<T>()?;
        let inner = table.inner.lock();
        inner
            .rows
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.clone()))
    }

    fn list<T: Entity>(&self, limit: usize) -> Result<Vec<T>> {
        self.state.begin_read()?;
        let table = self.state.table::<T>()?;
        let inner = table.inner.lock();
        let take = if limit == 0 { usize::MAX } else { limit };
        Ok(inner.rows.values().take(take).cloned().collect())
    }

    fn watch<T: Entity>(&self) -> Result<Box<dyn ChangeStream<T>>> {
        self.state.check_open()?;
        let table = self.state.table::<T>()?;
        let (tx, rx) = mpsc::channel();

        let mut inner = table.inner.lock();
        // shutdown sets `closed` before clearing watchers under this lock
        self.state.check_open()?;
        // Replay and registration happen under one lock, so no commit falls
        // between them
        for entity in inner.committed.values() {
            tx.send(Ok(ChangeEvent::created(entity.clone())))
                .map_err(|_| Error::Closed)?;
        }
        let replayed = inner.committed.len();
        inner.watchers.push(tx);
        drop(inner);

        debug!(target: "configstore::remote", kind = T::KIND, replayed, "Watch opened");
        Ok(Box::new(rx))
    }

    fn pending_writes(&self) -> Result<u64> {
        self.state.check_open()?;
        Ok(self.state.pending.load(Ordering::SeqCst))
    }
}

impl Drop for InMemoryRemote {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for InMemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRemote")
            .field("kinds", &self.state.tables.len())
            .field("pending", &self.state.pending.load(Ordering::SeqCst))
            .field("closed", &self.is_closed())
            .finish()
    }
}
