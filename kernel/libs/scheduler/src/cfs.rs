// SPDX-License-Identifier: MPL-2.0

use alloc::{collections::BTreeMap, sync::Arc};
use core::fmt;

use crate::{BaseScheduler, EnqueueFlags, PutPrevFlags, TaskRef, WEIGHT_0};

/// The number of fractional bits of a virtual runtime.
///
/// One tick of a task with [`WEIGHT_0`] advances its virtual runtime by
/// `1 << VRUNTIME_SHIFT`.
pub const VRUNTIME_SHIFT: u32 = 10;

/// Converts `ticks` of real runtime of a task with `weight` to virtual
/// runtime.
///
/// The calculation saturates instead of wrapping. Even with the smallest
/// weight a virtual runtime takes more than 500 years of CPU time at 1000
/// ticks per second to saturate.
pub const fn vruntime_delta(weight: u64, ticks: u64) -> u64 {
    debug_assert!(weight > 0);
    ticks.saturating_mul(WEIGHT_0 << VRUNTIME_SHIFT) / weight
}

/// The ready queue of the Completely Fair Scheduler.
///
/// # `vruntime`
///
/// Every tick on the CPU advances the virtual runtime of the running task
/// by
///
/// ```text
/// delta = ticks * WEIGHT_0 / weight
/// ```
///
/// (in fixed point, see [`VRUNTIME_SHIFT`]), so a heavier task ages slower
/// and gets a bigger share of the CPU. The task with the smallest virtual
/// runtime runs next. Tasks with equal virtual runtimes run in the order
/// they were enqueued.
///
/// # `min_vruntime`
///
/// The queue tracks a monotonically increasing lower bound of the virtual
/// runtimes of the running and ready tasks. A task entering the queue from
/// outside starts no lower than this bound. Otherwise a new task, or one
/// that slept for a long time, would monopolize the CPU until it caught up.
///
/// # Preemption
///
/// The running task is preempted once its virtual runtime exceeds that of
/// the leftmost ready task by more than `granularity`.
pub struct CfsScheduler<P> {
    /// The ready tasks, keyed by their virtual runtime and enqueue sequence
    /// number.
    ///
    /// Only the running task accumulates virtual runtime, so the key of a
    /// queued task stays valid until it is dequeued.
    ready: BTreeMap<(u64, u64), TaskRef<P>>,
    min_vruntime: u64,
    next_seq: u64,
    granularity: u64,
}

impl<P> CfsScheduler<P> {
    /// Creates an empty queue that preempts as soon as the running task falls
    /// behind.
    pub const fn new() -> Self {
        Self::with_granularity(0)
    }

    /// Creates an empty queue that tolerates the running task being
    /// `granularity` ahead of the leftmost ready task.
    pub const fn with_granularity(granularity: u64) -> Self {
        Self {
            ready: BTreeMap::new(),
            min_vruntime: 0,
            next_seq: 0,
            granularity,
        }
    }

    /// Returns the lower bound of the virtual runtimes.
    pub fn min_vruntime(&self) -> u64 {
        self.min_vruntime
    }

    fn insert(&mut self, task: TaskRef<P>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        task.queue_link().set(seq);
        let prev = self.ready.insert((task.vruntime(), seq), task);
        debug_assert!(prev.is_none());
    }

    fn leftmost_vruntime(&self) -> Option<u64> {
        self.ready.first_key_value().map(|((vruntime, _), _)| *vruntime)
    }

    fn update_min_vruntime(&mut self, current: Option<u64>) {
        let candidate = match (current, self.leftmost_vruntime()) {
            (Some(current), Some(leftmost)) => current.min(leftmost),
            (Some(vruntime), None) | (None, Some(vruntime)) => vruntime,
            (None, None) => return,
        };
        self.min_vruntime = self.min_vruntime.max(candidate);
    }

    fn should_preempt(&self, current: &TaskRef<P>) -> bool {
        self.leftmost_vruntime().is_some_and(|leftmost| {
            current.vruntime() > leftmost.saturating_add(self.granularity)
        })
    }
}

impl<P> Default for CfsScheduler<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for CfsScheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CfsScheduler")
            .field("ready", &self.ready.keys())
            .field("min_vruntime", &self.min_vruntime)
            .field("granularity", &self.granularity)
            .finish()
    }
}

impl<P: Send + Sync> BaseScheduler<P> for CfsScheduler<P> {
    fn name(&self) -> &'static str {
        "cfs"
    }

    fn enqueue(&mut self, task: TaskRef<P>, _flags: EnqueueFlags) {
        task.set_vruntime(task.vruntime().max(self.min_vruntime));
        self.insert(task);
    }

    fn dequeue(&mut self, task: &TaskRef<P>) -> Option<TaskRef<P>> {
        let key = (task.vruntime(), task.queue_link().get()?);
        if !self
            .ready
            .get(&key)
            .is_some_and(|queued| Arc::ptr_eq(queued, task))
        {
            return None;
        }
        let task = self.ready.remove(&key)?;
        task.queue_link().clear();
        Some(task)
    }

    fn pick_next(&mut self) -> Option<TaskRef<P>> {
        let (_, next) = self.ready.pop_first()?;
        next.queue_link().clear();
        self.update_min_vruntime(Some(next.vruntime()));
        Some(next)
    }

    fn put_prev(&mut self, prev: TaskRef<P>, _flags: PutPrevFlags) {
        self.insert(prev);
    }

    fn tick(&mut self, current: &TaskRef<P>) -> bool {
        let delta = vruntime_delta(current.weight(), 1);
        current.set_vruntime(current.vruntime().saturating_add(delta));
        self.update_min_vruntime(Some(current.vruntime()));
        self.should_preempt(current)
    }

    fn check_preempt(&self, current: &TaskRef<P>) -> bool {
        self.should_preempt(current)
    }

    fn len(&self) -> usize {
        self.ready.len()
    }
}
