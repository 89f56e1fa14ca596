//! Bounded worker pool with surge scaling and saturation fallback.
//!
//! [`WorkerPool`] executes submitted computations on a bounded set of reusable
//! worker threads. A fixed number of core workers is spawned up front; excess
//! work is buffered on a bounded queue, and when the queue overflows the pool
//! spawns surge workers up to a hard ceiling. Once the ceiling is reached the
//! configured [`SaturationPolicy`] applies - by default the submitting thread
//! runs the task itself, so no task is ever discarded due to overload.
//!
//! An unhandled panic inside a task is captured and surfaced through that
//! task's [`TaskHandle`]; it never unwinds the worker loop or affects sibling
//! tasks.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use fanwork_common::{Result, error::Error};

use crate::{
    config::{PoolConfig, SaturationPolicy},
    handle::TaskHandle,
};

/// A work item as it travels through the queue: the submitted computation
/// wrapped with panic capture and result delivery.
type WorkItem = Box<dyn FnOnce() + Send + 'static>;

/// A bounded-concurrency executor for zero-argument computations.
///
/// `WorkerPool` implements [`Clone`]; all clones share the same underlying
/// pool, allowing multiple parts of an application to submit work to one set
/// of worker threads. The pool is intended to be constructed once at process
/// startup and shut down once at teardown via
/// [`shutdown`](Self::shutdown); dropping the last clone closes the queue so
/// workers drain whatever is left and exit, without blocking the dropping
/// thread.
#[derive(Clone)]
pub struct WorkerPool(Arc<Shared>);

struct Shared {
    config: PoolConfig,
    /// Taken (set to `None`) when shutdown begins, closing the queue.
    task_tx: Mutex<Option<Sender<WorkItem>>>,
    /// Cumulative count of tasks handed to the queue or a surge worker.
    /// Caller-runs executions are deliberately not counted, which lets tests
    /// detect when work was degraded to the submitting thread.
    submitted: AtomicUsize,
    worker_seq: AtomicUsize,
    closed: AtomicBool,
    exited_rx: Receiver<()>,
    core: Arc<Core>,
}

/// The slice of pool state shared with worker threads.
///
/// Workers hold only this, not [`Shared`]: the queue sender lives in `Shared`,
/// so once every pool clone is gone the channel disconnects and the workers
/// exit on their own.
struct Core {
    task_rx: Receiver<WorkItem>,
    live_workers: AtomicUsize,
    core_workers: usize,
    exited_tx: Sender<()>,
}

impl WorkerPool {
    /// Creates a new pool, spawning the configured number of core workers.
    pub fn new(config: PoolConfig) -> Result<WorkerPool> {
        config.validate()?;
        let (task_tx, task_rx) = crossbeam_channel::bounded(config.queue_capacity);
        let (exited_tx, exited_rx) = crossbeam_channel::unbounded();
        let core = Arc::new(Core {
            task_rx,
            live_workers: AtomicUsize::new(0),
            core_workers: config.core_workers,
            exited_tx,
        });
        let pool = WorkerPool(Arc::new(Shared {
            config,
            task_tx: Mutex::new(Some(task_tx)),
            submitted: AtomicUsize::new(0),
            worker_seq: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            exited_rx,
            core,
        }));
        for _ in 0..pool.0.config.core_workers {
            pool.spawn_core_worker()?;
        }
        log::info!(
            "worker pool initialized: core_workers={}, max_workers={}, queue_capacity={}",
            pool.0.config.core_workers,
            pool.0.config.max_workers,
            pool.0.config.queue_capacity
        );
        Ok(pool)
    }

    /// Submits a computation for execution and returns a handle to its result.
    ///
    /// Under normal load this never blocks: the task is buffered on the queue
    /// or handed to a freshly spawned surge worker. When the queue is full and
    /// the worker count is at the ceiling, the configured
    /// [`SaturationPolicy`] decides what happens; under the default
    /// caller-runs policy the task executes synchronously on the current
    /// thread and the returned handle is already settled.
    ///
    /// Submission after [`shutdown`](Self::shutdown) has begun returns a
    /// handle settled with a `PoolClosed` error.
    pub fn submit<F, R>(&self, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let Some(task_tx) = self.sender() else {
            return TaskHandle::ready_err(Error::pool_closed());
        };
        let (item, handle) = package_task(f);
        match task_tx.try_send(item) {
            Ok(()) => {
                self.0.submitted.fetch_add(1, Ordering::Relaxed);
                handle
            }
            Err(TrySendError::Full(item)) => self.submit_saturated(&task_tx, item, handle),
            Err(TrySendError::Disconnected(_)) => TaskHandle::ready_err(Error::pool_closed()),
        }
    }

    /// Shuts the pool down, waiting for workers to exit.
    ///
    /// With [`drain_on_shutdown`](PoolConfig::drain_on_shutdown) set, workers
    /// first finish every task still in the queue. Otherwise queued tasks are
    /// discarded (best effort - a worker may grab one concurrently) and their
    /// handles settle as dropped. The wait for worker exit is bounded by
    /// [`shutdown_wait`](PoolConfig::shutdown_wait); if the bound elapses a
    /// `ShutdownTimedOut` error is returned and teardown proceeds regardless.
    ///
    /// Idempotent: subsequent calls return `Ok(())` immediately.
    pub fn shutdown(&self) -> Result<()> {
        if self.0.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let task_tx = self.0.task_tx.lock().expect("task sender lock").take();
        if !self.0.config.drain_on_shutdown {
            while self.0.core.task_rx.try_recv().is_ok() {}
        }
        drop(task_tx);

        let deadline = Instant::now() + self.0.config.shutdown_wait;
        while self.0.core.live_workers.load(Ordering::SeqCst) != 0 {
            if self.0.exited_rx.recv_deadline(deadline).is_err() {
                log::warn!(
                    "worker pool shutdown timed out after {:?}",
                    self.0.config.shutdown_wait
                );
                return Err(Error::shutdown_timed_out(self.0.config.shutdown_wait));
            }
        }
        log::info!("worker pool shut down");
        Ok(())
    }

    /// Checks whether [`shutdown`](Self::shutdown) has been initiated.
    pub fn is_shut_down(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }

    /// Returns the cumulative number of tasks dispatched to the queue or a
    /// surge worker.
    ///
    /// Tasks degraded to the submitting thread by the caller-runs policy are
    /// not counted. Primarily useful for tests and diagnostics.
    pub fn tasks_submitted(&self) -> usize {
        self.0.submitted.load(Ordering::Relaxed)
    }

    /// Returns the current number of live worker threads.
    pub fn live_workers(&self) -> usize {
        self.0.core.live_workers.load(Ordering::SeqCst)
    }

    /// Returns the configuration the pool was constructed with.
    pub fn config(&self) -> &PoolConfig {
        &self.0.config
    }

    fn sender(&self) -> Option<Sender<WorkItem>> {
        self.0.task_tx.lock().expect("task sender lock").clone()
    }

    /// Applies surge scaling and then the saturation policy to a task that
    /// did not fit on the queue.
    fn submit_saturated<R>(
        &self,
        task_tx: &Sender<WorkItem>,
        item: WorkItem,
        handle: TaskHandle<R>,
    ) -> TaskHandle<R> {
        let item = match self.try_spawn_surge(item) {
            Ok(()) => {
                self.0.submitted.fetch_add(1, Ordering::Relaxed);
                return handle;
            }
            Err(item) => item,
        };
        match self.0.config.saturation {
            SaturationPolicy::CallerRuns => {
                item();
                handle
            }
            SaturationPolicy::Block => match task_tx.send(item) {
                Ok(()) => {
                    self.0.submitted.fetch_add(1, Ordering::Relaxed);
                    handle
                }
                Err(_) => TaskHandle::ready_err(Error::pool_closed()),
            },
            SaturationPolicy::Reject => {
                TaskHandle::ready_err(Error::queue_full(self.0.config.queue_capacity))
            }
            SaturationPolicy::Drop => {
                // Dropping the item closes its result channel; the handle
                // settles as TaskDropped.
                drop(item);
                handle
            }
        }
    }

    fn spawn_core_worker(&self) -> Result<()> {
        let core = self.0.core.clone();
        let name = self.next_worker_name();
        core.live_workers.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Core::worker_loop(core, None, None));
        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                self.0.core.live_workers.fetch_sub(1, Ordering::SeqCst);
                Err(Error::io(format!("spawn worker thread '{name}'"), e))
            }
        }
    }

    /// Attempts to spawn a surge worker that executes `item` as its first
    /// task. Fails, returning the item, when the worker count is already at
    /// the ceiling or the thread cannot be spawned.
    fn try_spawn_surge(&self, item: WorkItem) -> std::result::Result<(), WorkItem> {
        if !self.reserve_surge_slot() {
            return Err(item);
        }
        // The first task is handed over on a dedicated one-slot channel so
        // that it stays recoverable when thread creation fails.
        let (first_tx, first_rx) = crossbeam_channel::bounded::<WorkItem>(1);
        let core = self.0.core.clone();
        let keep_alive = self.0.config.keep_alive;
        let name = self.next_worker_name();
        let spawned = thread::Builder::new().name(name).spawn(move || {
            let first = first_rx.recv().ok();
            Core::worker_loop(core, first, Some(keep_alive));
        });
        match spawned {
            Ok(_) => {
                first_tx.send(item).expect("hand off first task");
                Ok(())
            }
            Err(_) => {
                self.0.core.live_workers.fetch_sub(1, Ordering::SeqCst);
                Err(item)
            }
        }
    }

    fn reserve_surge_slot(&self) -> bool {
        let live = &self.0.core.live_workers;
        let mut current = live.load(Ordering::SeqCst);
        while current < self.0.config.max_workers {
            match live.compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    fn next_worker_name(&self) -> String {
        let index = self.0.worker_seq.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.0.config.thread_name_prefix, index)
    }
}

impl Core {
    /// Worker thread body. Core workers (`keep_alive == None`) block on the
    /// queue until it disconnects; surge workers retire after sitting idle
    /// past their keep-alive, as long as the live count stays above the core
    /// size.
    fn worker_loop(core: Arc<Core>, first: Option<WorkItem>, keep_alive: Option<Duration>) {
        if let Some(task) = first {
            task();
        }
        loop {
            let task = match keep_alive {
                None => match core.task_rx.recv() {
                    Ok(task) => task,
                    Err(_) => break,
                },
                Some(timeout) => match core.task_rx.recv_timeout(timeout) {
                    Ok(task) => task,
                    Err(RecvTimeoutError::Timeout) => {
                        if core.try_retire() {
                            let _ = core.exited_tx.send(());
                            return;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
            };
            task();
        }
        core.live_workers.fetch_sub(1, Ordering::SeqCst);
        let _ = core.exited_tx.send(());
    }

    /// Atomically claims the right to exit: succeeds only while the live
    /// count is above the core size, so concurrent retirements never dip the
    /// pool below `core_workers`.
    fn try_retire(&self) -> bool {
        let mut live = self.live_workers.load(Ordering::SeqCst);
        while live > self.core_workers {
            match self
                .live_workers
                .compare_exchange(live, live - 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(actual) => live = actual,
            }
        }
        false
    }
}

/// Wraps a computation with panic capture and result delivery, returning the
/// type-erased work item together with the handle observing it.
fn package_task<F, R>(f: F) -> (WorkItem, TaskHandle<R>)
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    let item: WorkItem = Box::new(move || {
        // Send errors are ignored when the caller dropped the handle.
        let _ = tx.send(run_captured(f));
    });
    (item, TaskHandle::new(rx))
}

/// Runs a computation, converting an unwinding panic into a `TaskPanicked`
/// error.
pub(crate) fn run_captured<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Error::task_panicked(message)
    })
}
