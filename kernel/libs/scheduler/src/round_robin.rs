// SPDX-License-Identifier: MPL-2.0

use core::{fmt, num::NonZeroU64};

use crate::{BaseScheduler, EnqueueFlags, PutPrevFlags, TaskRef, fifo::TaskList};

/// A Round-Robin ready queue.
///
/// Tasks run in arrival order like with [`FifoScheduler`], but each one gets
/// at most `time_slice` consecutive ticks before the next ready task takes
/// over.
///
/// A task entering the queue from outside (spawned or woken) starts with a
/// full slice. A task coming back from the CPU with ticks left, e.g., because
/// it yielded, keeps the ticks it has left; only an exhausted slice is
/// refilled.
///
/// [`FifoScheduler`]: crate::FifoScheduler
pub struct RRScheduler<P> {
    ready: TaskList<P>,
    time_slice: NonZeroU64,
}

impl<P> RRScheduler<P> {
    /// Creates an empty queue that gives every task `time_slice` ticks.
    pub const fn new(time_slice: NonZeroU64) -> Self {
        Self {
            ready: TaskList::new(),
            time_slice,
        }
    }

    /// Returns the full time slice, in ticks.
    pub const fn time_slice(&self) -> u64 {
        self.time_slice.get()
    }
}

impl<P> fmt::Debug for RRScheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RRScheduler")
            .field("ready", &self.ready)
            .field("time_slice", &self.time_slice)
            .finish()
    }
}

impl<P: Send + Sync> BaseScheduler<P> for RRScheduler<P> {
    fn name(&self) -> &'static str {
        "rr"
    }

    fn enqueue(&mut self, task: TaskRef<P>, _flags: EnqueueFlags) {
        task.set_time_slice(self.time_slice.get());
        self.ready.push_back(task);
    }

    fn dequeue(&mut self, task: &TaskRef<P>) -> Option<TaskRef<P>> {
        self.ready.remove(task)
    }

    fn pick_next(&mut self) -> Option<TaskRef<P>> {
        self.ready.pop_front()
    }

    fn put_prev(&mut self, prev: TaskRef<P>, _flags: PutPrevFlags) {
        if prev.time_slice() == 0 {
            prev.set_time_slice(self.time_slice.get());
        }
        self.ready.push_back(prev);
    }

    fn tick(&mut self, current: &TaskRef<P>) -> bool {
        let remaining = current.time_slice().saturating_sub(1);
        current.set_time_slice(remaining);
        remaining == 0
    }

    fn len(&self) -> usize {
        self.ready.len()
    }
}

#[cfg(test)]
mod test {
    use alloc::sync::Arc;

    use super::*;
    use crate::Task;

    fn rr(slice: u64) -> RRScheduler<()> {
        RRScheduler::new(NonZeroU64::new(slice).unwrap())
    }

    #[test]
    fn slice_expires_after_s_ticks() {
        let mut rr = rr(3);
        let task = Arc::new(Task::new(()));
        rr.enqueue(task.clone(), EnqueueFlags::Spawn);
        let current = rr.pick_next().unwrap();
        assert_eq!(current.time_slice(), 3);
        assert!(!rr.tick(&current));
        assert!(!rr.tick(&current));
        assert!(rr.tick(&current));
        assert_eq!(current.time_slice(), 0);
    }

    #[test]
    fn exhausted_slice_is_refilled() {
        let mut rr = rr(1);
        let task = Arc::new(Task::new(()));
        rr.enqueue(task.clone(), EnqueueFlags::Spawn);
        let current = rr.pick_next().unwrap();
        assert!(rr.tick(&current));
        rr.put_prev(current, PutPrevFlags::Preempt);
        assert_eq!(task.time_slice(), 1);
    }

    #[test]
    fn yield_keeps_the_remaining_slice() {
        let mut rr = rr(5);
        let task = Arc::new(Task::new(()));
        rr.enqueue(task.clone(), EnqueueFlags::Spawn);
        let current = rr.pick_next().unwrap();
        rr.tick(&current);
        rr.tick(&current);
        rr.put_prev(current, PutPrevFlags::Yield);
        assert_eq!(task.time_slice(), 3);
    }

    #[test]
    fn wake_refills_the_slice() {
        let mut rr = rr(4);
        let task = Arc::new(Task::new(()));
        rr.enqueue(task.clone(), EnqueueFlags::Spawn);
        let current = rr.pick_next().unwrap();
        rr.tick(&current);
        // The task blocks here, then gets woken up.
        rr.enqueue(current, EnqueueFlags::Wake);
        assert_eq!(task.time_slice(), 4);
    }

    #[test]
    fn rotates_between_tasks() {
        let mut rr = rr(2);
        let a = Arc::new(Task::new(()));
        let b = Arc::new(Task::new(()));
        rr.enqueue(a.clone(), EnqueueFlags::Spawn);
        rr.enqueue(b.clone(), EnqueueFlags::Spawn);

        let mut current = rr.pick_next().unwrap();
        let mut order = Vec::new();
        for _ in 0..8 {
            order.push(Arc::ptr_eq(&current, &a));
            if rr.tick(&current) {
                rr.put_prev(current, PutPrevFlags::Preempt);
                current = rr.pick_next().unwrap();
            }
        }
        assert_eq!(order, [true, true, false, false, true, true, false, false]);
    }
}
