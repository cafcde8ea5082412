//! Watch worker: applies one kind's change stream to its replica
//!
//! Each replicated kind gets one `WatchWorker` running on its own named
//! thread for the lifetime of the connection.
//!
//! # Design Notes
//!
//! - Events are applied strictly in arrival order, one at a time
//! - Receives are bounded by the poll interval, so a shutdown request is
//!   noticed within one interval even on a silent stream
//! - Graceful shutdown via atomic flag
//! - A stream error or malformed event stops the worker; nothing after it is
//!   applied and the error is kept for `status()` and `join()`
//! - Blocking on a snapshot coordinator's gate is ordinary backpressure; the
//!   worker resumes as soon as the gate is released

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use configstore_core::{ChangeEvent, Entity, Error, ReplicationConfig, Result};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::replica::Replica;

/// Outcome of one bounded receive
#[derive(Debug)]
pub enum Recv<T> {
    /// Next event in commit order
    Event(ChangeEvent<T>),
    /// Nothing arrived within the timeout
    Idle,
    /// End of stream: stop applying
    Closed,
}

/// Ordered feed of change events for one entity kind
pub trait ChangeStream<T: Entity>: Send + 'static {
    /// Wait up to `timeout` for the next event
    ///
    /// # Errors
    ///
    /// A stream-level failure. The worker stops and surfaces it.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Recv<T>>;
}

impl<T: Entity> ChangeStream<T> for mpsc::Receiver<Result<ChangeEvent<T>>> {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Recv<T>> {
        match mpsc::Receiver::recv_timeout(self, timeout) {
            Ok(Ok(event)) => Ok(Recv::Event(event)),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(Recv::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(Recv::Closed),
        }
    }
}

impl<T: Entity, S: ChangeStream<T> + ?Sized> ChangeStream<T> for Box<S> {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Recv<T>> {
        (**self).recv_timeout(timeout)
    }
}

/// Lifecycle state of a watch worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchStatus {
    /// Consuming the stream
    Running,
    /// The stream ended
    Ended,
    /// Stopped on request
    Stopped,
    /// Stopped by a stream error or malformed event
    Failed(String),
}

impl WatchStatus {
    /// Whether the worker has stopped for any reason
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WatchStatus::Running)
    }
}

/// How a worker that did not fail finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// The stream ended
    Ended,
    /// Stopped on request
    Stopped,
}

struct WatchShared {
    shutdown: AtomicBool,
    events_applied: AtomicU64,
    status: Mutex<WatchStatus>,
}

/// Background consumer of one kind's change stream
///
/// # Example
///
/// ```ignore
/// let replica = Arc::new(Replica::<User>::new());
/// let (tx, rx) = std::sync::mpsc::channel();
/// let handle = WatchWorker::new(Arc::clone(&replica), rx, &config).spawn()?;
///
/// tx.send(Ok(ChangeEvent::created(user)))?;
///
/// // Shutdown gracefully
/// handle.shutdown();
/// handle.join()?;
/// ```
pub struct WatchWorker<T: Entity, S> {
    replica: Arc<Replica<T>>,
    stream: S,
    thread_name: String,
    poll_interval: Duration,
}

impl<T: Entity, S: ChangeStream<T>> WatchWorker<T, S> {
    /// Create a worker applying `stream` to `replica`
    pub fn new(replica: Arc<Replica<T>>, stream: S, config: &ReplicationConfig) -> Self {
        Self {
            replica,
            stream,
            thread_name: format!("{}-{}", config.thread_prefix, T::KIND),
            poll_interval: config.poll_interval(),
        }
    }

    /// Start consuming on a dedicated thread named `{thread_prefix}-{kind}`
    ///
    /// # Errors
    ///
    /// Returns `Error::IoError` if the thread cannot be spawned.
    pub fn spawn(self) -> Result<WatchHandle> {
        let shared = Arc::new(WatchShared {
            shutdown: AtomicBool::new(false),
            events_applied: AtomicU64::new(0),
            status: Mutex::new(WatchStatus::Running),
        });
        let worker_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || self.run(&worker_shared))?;

        Ok(WatchHandle {
            kind: T::KIND,
            shared,
            thread: Some(thread),
        })
    }

    fn run(mut self, shared: &WatchShared) -> Result<WatchExit> {
        info!(target: "configstore::watch", kind = T::KIND, "Watch worker started");
        let result = self.consume(shared);
        let status = match &result {
            Ok(WatchExit::Ended) => WatchStatus::Ended,
            Ok(WatchExit::Stopped) => WatchStatus::Stopped,
            Err(e) => WatchStatus::Failed(e.to_string()),
        };
        let events = shared.events_applied.load(Ordering::Relaxed);
        match &result {
            Ok(exit) => info!(
                target: "configstore::watch",
                kind = T::KIND,
                ?exit,
                events,
                "Watch worker stopped"
            ),
            Err(e) => error!(
                target: "configstore::watch",
                kind = T::KIND,
                error = %e,
                events,
                "Watch worker failed"
            ),
        }
        *shared.status.lock() = status;
        result
    }

    fn consume(&mut self, shared: &WatchShared) -> Result<WatchExit> {
        loop {
            if shared.shutdown.load(Ordering::Relaxed) {
                return Ok(WatchExit::Stopped);
            }
            match self.stream.recv_timeout(self.poll_interval)? {
                Recv::Event(event) => {
                    event.validate()?;
                    debug!(
                        target: "configstore::watch",
                        kind = T::KIND,
                        change = %event.kind,
                        key = %event.key(),
                        "Applying event"
                    );
                    self.replica.apply(event);
                    shared.events_applied.fetch_add(1, Ordering::Relaxed);
                }
                Recv::Idle => continue,
                Recv::Closed => return Ok(WatchExit::Ended),
            }
        }
    }
}

/// Handle to a running watch worker
///
/// Dropping the handle signals shutdown and waits for the thread.
pub struct WatchHandle {
    kind: &'static str,
    shared: Arc<WatchShared>,
    thread: Option<JoinHandle<Result<WatchExit>>>,
}

impl WatchHandle {
    /// Kind this worker replicates
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Signal shutdown
    ///
    /// The worker exits after its current receive or apply completes.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Relaxed)
    }

    /// Current lifecycle state
    pub fn status(&self) -> WatchStatus {
        self.shared.status.lock().clone()
    }

    /// Events applied so far
    pub fn events_applied(&self) -> u64 {
        self.shared.events_applied.load(Ordering::Relaxed)
    }

    /// Whether the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the worker to exit
    ///
    /// # Errors
    ///
    /// The stream error or malformed event that stopped the worker.
    pub fn join(mut self) -> Result<WatchExit> {
        self.join_thread()
    }

    /// Signal shutdown, then wait for the worker to exit
    pub fn stop(self) -> Result<WatchExit> {
        self.shutdown();
        self.join()
    }

    fn join_thread(&mut self) -> Result<WatchExit> {
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| {
                let reason = "watch worker panicked";
                *self.shared.status.lock() = WatchStatus::Failed(reason.to_string());
                Err(Error::stream_failed(self.kind, reason))
            }),
            None => Ok(WatchExit::Stopped),
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
            let _ = self.join_thread();
        }
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("kind", &self.kind)
            .field("status", &self.status())
            .field("events_applied", &self.events_applied())
            .finish()
    }
}
