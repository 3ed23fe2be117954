// SPDX-License-Identifier: MPL-2.0

use alloc::sync::Arc;
use core::fmt;

use crate::{BaseScheduler, EnqueueFlags, PutPrevFlags, TaskRef, list::LinkedSlab};

/// A queue of tasks in arrival order.
///
/// Each queued task remembers its slot in [`Task::queue_link`], which makes
/// removing it from the middle of the queue O(1).
///
/// [`Task::queue_link`]: crate::Task
pub(crate) struct TaskList<P> {
    list: LinkedSlab<TaskRef<P>>,
}

impl<P> TaskList<P> {
    pub(crate) const fn new() -> Self {
        Self {
            list: LinkedSlab::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    pub(crate) fn push_back(&mut self, task: TaskRef<P>) {
        debug_assert!(task.queue_link().get().is_none());
        let key = self.list.push_back(task);
        if let Some(task) = self.list.get(key) {
            task.queue_link().set(key as u64);
        }
    }

    pub(crate) fn pop_front(&mut self) -> Option<TaskRef<P>> {
        let task = self.list.pop_front()?;
        task.queue_link().clear();
        Some(task)
    }

    pub(crate) fn remove(&mut self, task: &TaskRef<P>) -> Option<TaskRef<P>> {
        let key = task.queue_link().get()? as usize;
        // The link may belong to a queue of another scheduler.
        if !self.list.get(key).is_some_and(|queued| Arc::ptr_eq(queued, task)) {
            return None;
        }
        let task = self.list.remove(key)?;
        task.queue_link().clear();
        Some(task)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &TaskRef<P>> {
        self.list.iter()
    }
}

impl<P> fmt::Debug for TaskList<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|task| task.id().as_u64()))
            .finish()
    }
}

/// A simple FIFO (First-In-First-Out) ready queue.
///
/// Tasks run in the order they become ready, and a running task is never
/// preempted by the timer.
pub struct FifoScheduler<P> {
    ready: TaskList<P>,
}

impl<P> FifoScheduler<P> {
    /// Creates an empty FIFO ready queue.
    pub const fn new() -> Self {
        Self {
            ready: TaskList::new(),
        }
    }
}

impl<P> Default for FifoScheduler<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for FifoScheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoScheduler")
            .field("ready", &self.ready)
            .finish()
    }
}

impl<P: Send + Sync> BaseScheduler<P> for FifoScheduler<P> {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn enqueue(&mut self, task: TaskRef<P>, _flags: EnqueueFlags) {
        self.ready.push_back(task);
    }

    fn dequeue(&mut self, task: &TaskRef<P>) -> Option<TaskRef<P>> {
        self.ready.remove(task)
    }

    fn pick_next(&mut self) -> Option<TaskRef<P>> {
        self.ready.pop_front()
    }

    fn put_prev(&mut self, prev: TaskRef<P>, _flags: PutPrevFlags) {
        self.ready.push_back(prev);
    }

    fn tick(&mut self, _current: &TaskRef<P>) -> bool {
        false
    }

    fn len(&self) -> usize {
        self.ready.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Task;

    fn tasks(n: usize) -> Vec<TaskRef<usize>> {
        (0..n).map(|i| Arc::new(Task::new(i))).collect()
    }

    #[test]
    fn picks_in_arrival_order() {
        let mut fifo = FifoScheduler::new();
        for task in tasks(3) {
            fifo.enqueue(task, EnqueueFlags::Spawn);
        }
        let order: Vec<usize> = core::iter::from_fn(|| fifo.pick_next())
            .map(|task| *task.payload())
            .collect();
        assert_eq!(order, [0, 1, 2]);
        assert!(fifo.pick_next().is_none());
    }

    #[test]
    fn never_preempts() {
        let mut fifo = FifoScheduler::new();
        let [a, b] = <[_; 2]>::try_from(tasks(2)).unwrap();
        fifo.enqueue(b, EnqueueFlags::Spawn);
        for _ in 0..100 {
            assert!(!fifo.tick(&a));
        }
        assert!(!fifo.check_preempt(&a));
    }

    #[test]
    fn put_prev_goes_to_the_tail() {
        let mut fifo = FifoScheduler::new();
        let all = tasks(2);
        for task in &all {
            fifo.enqueue(task.clone(), EnqueueFlags::Spawn);
        }
        let first = fifo.pick_next().unwrap();
        fifo.put_prev(first, PutPrevFlags::Yield);
        assert!(Arc::ptr_eq(&fifo.pick_next().unwrap(), &all[1]));
        assert!(Arc::ptr_eq(&fifo.pick_next().unwrap(), &all[0]));
    }

    #[test]
    fn dequeue_from_the_middle() {
        let mut fifo = FifoScheduler::new();
        let all = tasks(3);
        for task in &all {
            fifo.enqueue(task.clone(), EnqueueFlags::Spawn);
        }
        let removed = fifo.dequeue(&all[1]).unwrap();
        assert!(Arc::ptr_eq(&removed, &all[1]));
        assert!(removed.queue_link().get().is_none());
        assert!(fifo.dequeue(&all[1]).is_none());
        assert_eq!(fifo.len(), 2);
        let ids = [all[0].id().as_u64(), all[2].id().as_u64()];
        assert_eq!(format!("{:?}", fifo.ready), format!("{:?}", ids));
    }

    #[test]
    fn dequeue_task_of_another_queue() {
        let mut mine = FifoScheduler::new();
        let mut other = FifoScheduler::new();
        let all = tasks(2);
        mine.enqueue(all[0].clone(), EnqueueFlags::Spawn);
        other.enqueue(all[1].clone(), EnqueueFlags::Spawn);
        // Both tasks sit in slot 0 of their own queue.
        assert!(mine.dequeue(&all[1]).is_none());
        assert_eq!(mine.len(), 1);
    }
}
