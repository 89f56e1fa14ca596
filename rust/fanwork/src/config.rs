//! Worker pool configuration.
//!
//! [`PoolConfig`] captures everything the pool reads at construction time: worker
//! counts, queue capacity, thread naming, the saturation policy and the shutdown
//! contract. Configuration is fixed for the lifetime of the pool; there is no
//! runtime reconfiguration surface.

use std::time::Duration;

use fanwork_common::{Result, verify_arg};

/// Static configuration of a [`WorkerPool`](crate::pool::WorkerPool).
///
/// The defaults mirror a pool intended to be shared process-wide: a modest set
/// of always-alive core workers, a generous surge ceiling, a large buffered
/// queue and a caller-runs degradation strategy so that no submitted task is
/// ever lost to overload.
///
/// Construct with struct update syntax when only a few fields differ:
///
/// ```rust
/// use fanwork::PoolConfig;
///
/// let config = PoolConfig {
///     core_workers: 2,
///     max_workers: 4,
///     queue_capacity: 16,
///     ..PoolConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of always-alive worker threads, spawned at pool
    /// construction. Must be at least 1.
    pub core_workers: usize,
    /// Hard ceiling on concurrently alive worker threads. Workers beyond
    /// `core_workers` are spawned on demand when the queue overflows and
    /// retire again once idle for [`keep_alive`](Self::keep_alive).
    pub max_workers: usize,
    /// Number of submitted-but-not-yet-running tasks the pool buffers before
    /// the saturation policy applies. A capacity of zero turns the queue into
    /// a rendezvous: submission hands off directly to an idle worker or
    /// saturates immediately.
    pub queue_capacity: usize,
    /// Prefix for worker thread names (`{prefix}-{index}`), visible in
    /// debuggers and profilers.
    pub thread_name_prefix: String,
    /// What happens when the queue is full and the worker count is at
    /// [`max_workers`](Self::max_workers).
    pub saturation: SaturationPolicy,
    /// Idle duration after which a surge worker (one above the core count)
    /// exits. Core workers never retire.
    pub keep_alive: Duration,
    /// Whether [`shutdown`](crate::pool::WorkerPool::shutdown) lets workers
    /// finish all queued tasks before they exit. When false, tasks still
    /// sitting in the queue are discarded and their handles settle as dropped.
    pub drain_on_shutdown: bool,
    /// Upper bound on how long `shutdown` waits for workers to exit before
    /// giving up and returning an error.
    pub shutdown_wait: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            core_workers: 16,
            max_workers: 100,
            queue_capacity: 5000,
            thread_name_prefix: "fanwork-worker".to_string(),
            saturation: SaturationPolicy::CallerRuns,
            keep_alive: Duration::from_secs(60),
            drain_on_shutdown: true,
            shutdown_wait: Duration::from_secs(30 * 60),
        }
    }
}

impl PoolConfig {
    /// Checks the configuration invariants.
    ///
    /// Called by [`WorkerPool::new`](crate::pool::WorkerPool::new); exposed so
    /// applications can validate configuration they assemble from their own
    /// settings layer before constructing the pool.
    pub fn validate(&self) -> Result<()> {
        verify_arg!(core_workers, self.core_workers >= 1);
        verify_arg!(max_workers, self.max_workers >= self.core_workers);
        verify_arg!(thread_name_prefix, !self.thread_name_prefix.is_empty());
        verify_arg!(keep_alive, !self.keep_alive.is_zero());
        Ok(())
    }
}

/// Backpressure strategy applied when the work queue is full and the worker
/// count is already at the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaturationPolicy {
    /// Execute the task synchronously on the submitting thread. The returned
    /// handle is already settled when `submit` returns. No task is ever
    /// discarded due to overload, at the cost of the submitter occasionally
    /// doing the work itself.
    CallerRuns,
    /// Block the submitting thread until queue space frees up.
    Block,
    /// Refuse the task; its handle settles with a `QueueFull` error.
    Reject,
    /// Discard the task; its handle settles with a `TaskDropped` error.
    Drop,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fanwork_common::error::ErrorKind;

    use super::{PoolConfig, SaturationPolicy};

    #[test]
    fn test_default_config_is_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.saturation, SaturationPolicy::CallerRuns);
        assert!(config.core_workers <= config.max_workers);
    }

    #[test]
    fn test_zero_core_workers_rejected() {
        let config = PoolConfig {
            core_workers: 0,
            ..PoolConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::InvalidArgument { name, .. } if name == "core_workers"
        ));
    }

    #[test]
    fn test_max_below_core_rejected() {
        let config = PoolConfig {
            core_workers: 8,
            max_workers: 4,
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_thread_name_prefix_rejected() {
        let config = PoolConfig {
            thread_name_prefix: String::new(),
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_keep_alive_rejected() {
        let config = PoolConfig {
            keep_alive: Duration::ZERO,
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
