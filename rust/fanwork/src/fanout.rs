//! Fan-out/fan-in coordination over a [`WorkerPool`].
//!
//! [`Fanout`] submits independent computations to the pool and blocks the
//! calling thread until every one of them has settled, aggregating the results
//! in one of two shapes:
//!
//! - [`join_slots`](Fanout::join_slots) - up to three independently typed
//!   computations, any subset of which may be absent, joined into a
//!   [`Slots`] record.
//! - [`collect`](Fanout::collect) - an arbitrary number of homogeneous
//!   computations joined into a [`Collected`] container, either deduplicated
//!   or ordered by completion.
//!
//! If any computation fails, the coordinator still waits for all of its
//! siblings before surfacing the first error, so no in-flight pool work is
//! ever abandoned.

use std::collections::HashSet;
use std::hash::Hash;

use fanwork_common::{Result, error::Error};

use crate::{handle::TaskHandle, pool::WorkerPool};

/// Fan-out/fan-in coordinator.
///
/// Holds a handle to the pool it executes on; construct one per application
/// (or clone it freely - clones share the pool) and pass it to the code that
/// needs to parallelize. The coordinator itself is stateless between calls.
#[derive(Clone)]
pub struct Fanout {
    pool: WorkerPool,
}

/// Result record of a fixed slot join: three independently typed slots, each
/// holding its task's output or `None` when that task was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Slots<F, S, T> {
    pub first: Option<F>,
    pub second: Option<S>,
    pub third: Option<T>,
}

impl<F, S, T> Default for Slots<F, S, T> {
    fn default() -> Self {
        Slots {
            first: None,
            second: None,
            third: None,
        }
    }
}

/// Aggregate produced by [`Fanout::collect`].
///
/// `Ordered` keeps every value in completion order (which may differ from
/// submission order); `Distinct` collapses duplicates by value equality and
/// has no defined order.
#[derive(Debug, Clone)]
pub enum Collected<R> {
    Ordered(Vec<R>),
    Distinct(HashSet<R>),
}

impl<R> Collected<R> {
    fn empty(distinct: bool) -> Collected<R> {
        if distinct {
            Collected::Distinct(HashSet::new())
        } else {
            Collected::Ordered(Vec::new())
        }
    }

    fn push(&mut self, value: R)
    where
        R: Eq + Hash,
    {
        match self {
            Collected::Ordered(seq) => seq.push(value),
            Collected::Distinct(set) => {
                set.insert(value);
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Collected::Ordered(seq) => seq.len(),
            Collected::Distinct(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the container into a `Vec`. For the `Distinct` variant the
    /// element order is arbitrary.
    pub fn into_vec(self) -> Vec<R> {
        match self {
            Collected::Ordered(seq) => seq,
            Collected::Distinct(set) => set.into_iter().collect(),
        }
    }

    /// Consumes the container into a `HashSet`. For the `Ordered` variant
    /// this collapses duplicates.
    pub fn into_set(self) -> HashSet<R>
    where
        R: Eq + Hash,
    {
        match self {
            Collected::Ordered(seq) => seq.into_iter().collect(),
            Collected::Distinct(set) => set,
        }
    }
}

impl Fanout {
    /// Creates a coordinator executing on the given pool.
    pub fn new(pool: WorkerPool) -> Fanout {
        Fanout { pool }
    }

    /// Returns the pool this coordinator executes on.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Executes up to three independently typed computations in parallel and
    /// joins their results into a [`Slots`] record.
    ///
    /// Each present computation is submitted to the pool and its output lands
    /// in the corresponding slot; absent computations leave their slot `None`
    /// and contribute no pool submission. The call blocks until every present
    /// computation has settled. When all three are absent it returns an
    /// all-`None` record immediately, without touching the pool.
    ///
    /// If a computation fails, the remaining ones are still waited for; the
    /// first failure (in slot order) is then returned.
    ///
    /// ```rust,no_run
    /// use fanwork::{Fanout, PoolConfig, WorkerPool};
    ///
    /// let fanout = Fanout::new(WorkerPool::new(PoolConfig::default())?);
    /// let slots = fanout.join_slots(
    ///     Some(|| 1),
    ///     None::<fn() -> u64>,
    ///     Some(|| "x"),
    /// )?;
    /// assert_eq!(slots.first, Some(1));
    /// assert_eq!(slots.second, None);
    /// assert_eq!(slots.third, Some("x"));
    /// # Ok::<(), fanwork::Error>(())
    /// ```
    pub fn join_slots<A, B, C, RA, RB, RC>(
        &self,
        first: Option<A>,
        second: Option<B>,
        third: Option<C>,
    ) -> Result<Slots<RA, RB, RC>>
    where
        A: FnOnce() -> RA + Send + 'static,
        B: FnOnce() -> RB + Send + 'static,
        C: FnOnce() -> RC + Send + 'static,
        RA: Send + 'static,
        RB: Send + 'static,
        RC: Send + 'static,
    {
        let first = first.map(|task| self.pool.submit(task));
        let second = second.map(|task| self.pool.submit(task));
        let third = third.map(|task| self.pool.submit(task));

        // Settle every submitted task before surfacing any failure.
        let first = first.map(TaskHandle::join);
        let second = second.map(TaskHandle::join);
        let third = third.map(TaskHandle::join);

        Ok(Slots {
            first: first.transpose()?,
            second: second.transpose()?,
            third: third.transpose()?,
        })
    }

    /// Executes two computations in parallel and returns both results.
    pub fn join2<A, B, RA, RB>(&self, first: A, second: B) -> Result<(RA, RB)>
    where
        A: FnOnce() -> RA + Send + 'static,
        B: FnOnce() -> RB + Send + 'static,
        RA: Send + 'static,
        RB: Send + 'static,
    {
        let slots = self.join_slots(Some(first), Some(second), None::<fn() -> ()>)?;
        Ok((
            slots.first.expect("first slot"),
            slots.second.expect("second slot"),
        ))
    }

    /// Executes three computations in parallel and returns all three results.
    pub fn join3<A, B, C, RA, RB, RC>(&self, first: A, second: B, third: C) -> Result<(RA, RB, RC)>
    where
        A: FnOnce() -> RA + Send + 'static,
        B: FnOnce() -> RB + Send + 'static,
        C: FnOnce() -> RC + Send + 'static,
        RA: Send + 'static,
        RB: Send + 'static,
        RC: Send + 'static,
    {
        let slots = self.join_slots(Some(first), Some(second), Some(third))?;
        Ok((
            slots.first.expect("first slot"),
            slots.second.expect("second slot"),
            slots.third.expect("third slot"),
        ))
    }

    /// Executes a collection of homogeneous computations in parallel and
    /// aggregates the present results.
    ///
    /// Absent (`None`) entries in `tasks` are filtered out before submission
    /// and contribute nothing. Each remaining computation runs on the pool;
    /// a `Some(value)` result is added to the aggregate as it completes, a
    /// `None` result is silently dropped. With `distinct` set the aggregate
    /// is a deduplicated set; otherwise it is a sequence in completion order,
    /// duplicates retained.
    ///
    /// An empty (or entirely absent) input returns an empty container of the
    /// requested kind immediately, without touching the pool. Otherwise the
    /// call blocks until every submitted computation has settled; if any of
    /// them failed, the first error encountered is returned once all are
    /// settled.
    pub fn collect<T, R>(
        &self,
        tasks: impl IntoIterator<Item = Option<T>>,
        distinct: bool,
    ) -> Result<Collected<R>>
    where
        T: FnOnce() -> Option<R> + Send + 'static,
        R: Send + Eq + Hash + 'static,
    {
        let tasks = tasks.into_iter().flatten().collect::<Vec<_>>();
        if tasks.is_empty() {
            return Ok(Collected::empty(distinct));
        }

        // Completions flow back over a dedicated channel, so the aggregate is
        // only ever touched by the calling thread and arrival order equals
        // completion order.
        let total = tasks.len();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Result<Option<R>>>();
        for task in tasks {
            let done_tx = done_tx.clone();
            self.pool.submit(move || {
                let _ = done_tx.send(crate::pool::run_captured(task));
            });
        }
        drop(done_tx);

        let mut collected = Collected::empty(distinct);
        let mut first_err: Option<Error> = None;
        for _ in 0..total {
            match done_rx.recv() {
                Ok(Ok(Some(value))) => collected.push(value),
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
                // Disconnected: some task was discarded without reporting.
                // All senders are gone at this point, so every task has
                // settled one way or the other.
                Err(_) => {
                    if first_err.is_none() {
                        first_err = Some(Error::task_dropped());
                    }
                    break;
                }
            }
        }
        match first_err {
            None => Ok(collected),
            Some(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::Duration,
    };

    use fanwork_common::error::ErrorKind;

    use crate::{
        config::PoolConfig,
        fanout::{Collected, Fanout},
        pool::WorkerPool,
    };

    fn fanout() -> Fanout {
        Fanout::new(
            WorkerPool::new(PoolConfig {
                core_workers: 4,
                max_workers: 8,
                queue_capacity: 64,
                ..PoolConfig::default()
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_join_slots_all_present() {
        let fanout = fanout();
        let slots = fanout
            .join_slots(
                Some(|| 1),
                Some(|| "two".to_string()),
                Some(|| vec![3u8, 4]),
            )
            .unwrap();
        assert_eq!(slots.first, Some(1));
        assert_eq!(slots.second, Some("two".to_string()));
        assert_eq!(slots.third, Some(vec![3u8, 4]));
    }

    #[test]
    fn test_join_slots_with_absent_middle_task() {
        let fanout = fanout();
        let slots = fanout
            .join_slots(Some(|| 1), None::<fn() -> u64>, Some(|| "x"))
            .unwrap();
        assert_eq!(slots.first, Some(1));
        assert_eq!(slots.second, None);
        assert_eq!(slots.third, Some("x"));
    }

    #[test]
    fn test_join_slots_empty_subset_does_not_touch_the_pool() {
        let fanout = fanout();
        let before = fanout.pool().tasks_submitted();
        let slots = fanout
            .join_slots(
                None::<fn() -> i32>,
                None::<fn() -> u64>,
                None::<fn() -> String>,
            )
            .unwrap();
        assert_eq!(slots.first, None);
        assert_eq!(slots.second, None);
        assert_eq!(slots.third, None);
        assert_eq!(fanout.pool().tasks_submitted(), before);
    }

    #[test]
    fn test_join_slots_waits_for_siblings_before_failing() {
        let fanout = fanout();
        let finished = Arc::new(AtomicUsize::new(0));
        let slow = finished.clone();
        let err = fanout
            .join_slots(
                Some(|| -> i32 { panic!("first failed") }),
                Some(move || {
                    thread::sleep(Duration::from_millis(100));
                    slow.fetch_add(1, Ordering::SeqCst);
                    2u64
                }),
                None::<fn() -> ()>,
            )
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::TaskPanicked { message } if message == "first failed"
        ));
        // The failure was surfaced only after the slow sibling finished.
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_join2_and_join3() {
        let fanout = fanout();
        let (a, b) = fanout.join2(|| 6 * 7, || "seven".to_string()).unwrap();
        assert_eq!(a, 42);
        assert_eq!(b, "seven");

        let (a, b, c) = fanout.join3(|| 1, || 2.5, || 'c').unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2.5);
        assert_eq!(c, 'c');
    }

    #[test]
    fn test_collect_ordered_keeps_duplicates() {
        let fanout = fanout();
        let tasks: Vec<Option<fn() -> Option<i32>>> =
            vec![Some(|| Some(1)), Some(|| Some(1)), Some(|| Some(2))];
        let collected = fanout.collect(tasks, false).unwrap();
        let mut values = collected.into_vec();
        values.sort_unstable();
        assert_eq!(values, vec![1, 1, 2]);
    }

    #[test]
    fn test_collect_distinct_collapses_duplicates() {
        let fanout = fanout();
        let tasks: Vec<Option<fn() -> Option<i32>>> =
            vec![Some(|| Some(1)), Some(|| Some(1)), Some(|| Some(2))];
        let collected = fanout.collect(tasks, true).unwrap();
        assert_eq!(collected.len(), 2);
        let set = collected.into_set();
        assert!(set.contains(&1));
        assert!(set.contains(&2));
    }

    #[test]
    fn test_collect_skips_absent_tasks_and_absent_results() {
        let fanout = fanout();
        let tasks: Vec<Option<fn() -> Option<i32>>> =
            vec![Some(|| Some(1)), None, Some(|| None), Some(|| Some(4))];
        let collected = fanout.collect(tasks, false).unwrap();
        let mut values = collected.into_vec();
        values.sort_unstable();
        assert_eq!(values, vec![1, 4]);
    }

    #[test]
    fn test_collect_empty_input_does_not_touch_the_pool() {
        let fanout = fanout();
        let before = fanout.pool().tasks_submitted();

        let ordered = fanout
            .collect(Vec::<Option<fn() -> Option<i32>>>::new(), false)
            .unwrap();
        assert!(matches!(&ordered, Collected::Ordered(seq) if seq.is_empty()));

        let distinct = fanout
            .collect(vec![None::<fn() -> Option<i32>>, None], true)
            .unwrap();
        assert!(matches!(&distinct, Collected::Distinct(set) if set.is_empty()));

        assert_eq!(fanout.pool().tasks_submitted(), before);
    }

    #[test]
    fn test_collect_ordered_reflects_completion_order() {
        let fanout = fanout();
        let tasks = (0..3u64)
            .map(|i| {
                Some(move || {
                    // Task 0 sleeps longest, so completion order is reversed.
                    thread::sleep(Duration::from_millis(100 * (2 - i)));
                    Some(i)
                })
            })
            .collect::<Vec<_>>();
        let collected = fanout.collect(tasks, false).unwrap();
        assert_eq!(collected.into_vec(), vec![2, 1, 0]);
    }

    #[test]
    fn test_collect_waits_for_all_five_before_failing() {
        let fanout = fanout();
        let settled = Arc::new(AtomicUsize::new(0));
        let tasks = (0..5)
            .map(|i| {
                let settled = settled.clone();
                Some(move || {
                    thread::sleep(Duration::from_millis(10 * i as u64));
                    settled.fetch_add(1, Ordering::SeqCst);
                    if i == 1 {
                        panic!("task {i} failed");
                    }
                    Some(i)
                })
            })
            .collect::<Vec<_>>();
        let err = fanout.collect(tasks, false).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TaskPanicked { .. }));
        assert_eq!(settled.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_collect_is_idempotent_for_deterministic_tasks() {
        let fanout = fanout();
        let run = |fanout: &Fanout| {
            let tasks = (0..16).map(|i| Some(move || Some(i * i))).collect::<Vec<_>>();
            let mut values = fanout.collect(tasks, false).unwrap().into_vec();
            values.sort_unstable();
            values
        };
        assert_eq!(run(&fanout), run(&fanout));
    }

    #[test]
    fn test_collect_loses_no_values_under_load() {
        // Saturates the pool hard enough that some tasks degrade to
        // caller-runs; every unique value must still arrive exactly once.
        let fanout = Fanout::new(
            WorkerPool::new(PoolConfig {
                core_workers: 4,
                max_workers: 8,
                queue_capacity: 256,
                ..PoolConfig::default()
            })
            .unwrap(),
        );
        let total = 10_000usize;
        let tasks = (0..total).map(|i| Some(move || Some(i))).collect::<Vec<_>>();
        let collected = fanout.collect(tasks, false).unwrap();
        assert_eq!(collected.len(), total);
        let mut values = collected.into_vec();
        values.sort_unstable();
        assert_eq!(values, (0..total).collect::<Vec<_>>());
    }
}
