//! Handles for waiting on submitted task results.
//!
//! A [`TaskHandle`] is returned by every submission to the
//! [`WorkerPool`](crate::pool::WorkerPool) and is the only way a task outcome
//! reaches the caller: the value it produced, the panic it raised, or the fact
//! that it was discarded before running. Failure of one task never affects the
//! handles of its siblings.

use crossbeam_channel::Receiver;
use fanwork_common::{Result, error::Error};

/// A handle for waiting on the result of a single submitted task.
///
/// The handle is the receiver end of a one-message channel that the task
/// wrapper settles exactly once: with `Ok(value)` on success or with an error
/// when the task panicked. A task that is discarded without ever running (the
/// `Drop` saturation policy, or a drain-less shutdown) settles its handle by
/// closing the channel, which [`join`](Self::join) reports as a
/// `TaskDropped` error.
///
/// ## Lifecycle
///
/// 1. **Created**: returned by `submit`
/// 2. **Pending**: the task is queued or running
/// 3. **Settled**: the outcome is available
/// 4. **Consumed**: the outcome has been retrieved via [`join`](Self::join)
pub struct TaskHandle<R>(Receiver<Result<R>>);

impl<R> TaskHandle<R> {
    pub(crate) fn new(rx: Receiver<Result<R>>) -> TaskHandle<R> {
        TaskHandle(rx)
    }

    /// Creates a handle that is already settled with the given value.
    ///
    /// Used for tasks executed synchronously on the submitting thread under
    /// the caller-runs saturation policy.
    pub fn ready(value: R) -> Self {
        Self::settled(Ok(value))
    }

    /// Creates a handle that is already settled with the given error.
    pub fn ready_err(error: Error) -> Self {
        Self::settled(Err(error))
    }

    fn settled(outcome: Result<R>) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(outcome).expect("settle handle");
        TaskHandle(rx)
    }

    /// Checks whether the task outcome is available without blocking.
    pub fn is_ready(&self) -> bool {
        !self.0.is_empty()
    }

    /// Blocks until the task settles and returns its outcome.
    ///
    /// Returns the task's value, the captured panic as a `TaskPanicked`
    /// error, or `TaskDropped` if the task was discarded before it could run.
    pub fn join(self) -> Result<R> {
        match self.0.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::task_dropped()),
        }
    }

    /// Waits for every given handle to settle and collects the results.
    ///
    /// All handles are joined before anything is returned, so in-flight pool
    /// work is never abandoned. Once every task has settled, returns the
    /// results in handle order, or the first error encountered.
    pub fn join_all(handles: impl IntoIterator<Item = TaskHandle<R>>) -> Result<Vec<R>> {
        let mut results = Vec::new();
        let mut first_err = None;
        for handle in handles {
            match handle.join() {
                Ok(value) => results.push(value),
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        match first_err {
            None => Ok(results),
            Some(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fanwork_common::error::{Error, ErrorKind};

    use super::TaskHandle;

    #[test]
    fn test_ready_handle() {
        let handle = TaskHandle::ready(42);
        assert!(handle.is_ready());
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn test_ready_err_handle() {
        let handle = TaskHandle::<usize>::ready_err(Error::queue_full(8));
        let err = handle.join().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::QueueFull { capacity: 8 }));
    }

    #[test]
    fn test_pending_then_settled() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = TaskHandle::new(rx);
        assert!(!handle.is_ready());
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(Ok(7usize)).unwrap();
        });
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn test_dropped_sender_reports_task_dropped() {
        let (tx, rx) = crossbeam_channel::bounded::<fanwork_common::Result<usize>>(1);
        let handle = TaskHandle::new(rx);
        drop(tx);
        let err = handle.join().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TaskDropped));
    }

    #[test]
    fn test_join_all_preserves_handle_order() {
        let handles = (0..10).map(TaskHandle::ready).collect::<Vec<_>>();
        let results = TaskHandle::join_all(handles).unwrap();
        assert_eq!(results, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_join_all_settles_everything_before_failing() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let slow = TaskHandle::new(rx);
        let handles = vec![
            TaskHandle::ready_err(Error::task_panicked("boom")),
            slow,
            TaskHandle::ready(3),
        ];
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(Ok(2)).unwrap();
        });
        // The first handle already failed; join_all must still wait for the
        // slow one before surfacing that failure.
        let err = TaskHandle::join_all(handles).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TaskPanicked { message } if message == "boom"));
    }
}
