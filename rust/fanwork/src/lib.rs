//! Fan-out/fan-in execution over a bounded worker pool.
//!
//! This crate lets callers run two to N independent computations in parallel
//! on a shared pool of worker threads and block until all of them have
//! completed, without managing threads, queues, or join logic by hand.
//!
//! # Key Components
//!
//! ## Worker Pool
//!
//! - [`pool::WorkerPool`] - A bounded-concurrency executor with a core worker
//!   count, a surge ceiling, a bounded work queue, and an explicit saturation
//!   policy for overload ([`config::SaturationPolicy`]; the default runs
//!   overflow work on the submitting thread, so nothing is ever discarded).
//!
//! ## Fan-Out/Fan-In
//!
//! - [`fanout::Fanout`] - Submits independent computations to the pool and
//!   blocks until all of them settle: up to three independently typed slots
//!   via [`Fanout::join_slots`](fanout::Fanout::join_slots), or an
//!   arbitrary-size homogeneous collection via
//!   [`Fanout::collect`](fanout::Fanout::collect).
//!
//! ## Task Management
//!
//! - [`handle::TaskHandle`] - Per-task handle for waiting on a result; task
//!   panics are captured and surfaced here rather than crashing the pool.
//!
//! # Lifecycle
//!
//! The pool is explicitly constructed (typically once, at process startup)
//! and explicitly shut down at teardown; the shutdown waits for queued and
//! running work up to a configured bound. Callers receive the pool by
//! reference or clone - there is no hidden global instance.
//!
//! ```rust,no_run
//! use fanwork::{Fanout, PoolConfig, WorkerPool};
//!
//! let pool = WorkerPool::new(PoolConfig::default())?;
//! let fanout = Fanout::new(pool.clone());
//!
//! let (user, orders) = fanout.join2(
//!     || "load user".len(),
//!     || vec!["order-1", "order-2"],
//! )?;
//! assert_eq!(user, 9);
//! assert_eq!(orders.len(), 2);
//!
//! pool.shutdown()?;
//! # Ok::<(), fanwork::Error>(())
//! ```

pub mod config;
pub mod fanout;
pub mod handle;
pub mod pool;

pub use config::{PoolConfig, SaturationPolicy};
pub use fanout::{Collected, Fanout, Slots};
pub use fanwork_common::{
    Result,
    error::{Error, ErrorKind},
};
pub use handle::TaskHandle;
pub use pool::WorkerPool;
