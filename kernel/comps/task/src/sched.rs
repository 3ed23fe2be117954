// SPDX-License-Identifier: MPL-2.0

use alloc::{
    boxed::Box,
    sync::{Arc, Weak},
};
use core::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use log::{debug, trace};
use scheduler::{BaseScheduler, EnqueueFlags, PutPrevFlags, Task, TaskRef, TaskState};
use spinlock::SpinNoIrq;

use crate::{SchedConfig, prelude::*};

/// Scheduling statistics.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct SchedStats {
    /// The number of timer ticks received.
    pub ticks: u64,
    /// The number of times another task was picked to run.
    pub switches: u64,
}

/// The policy-agnostic scheduler core.
///
/// A `Scheduler` drives the task state machine
///
/// ```text
///          pick_next                   block_current
///  Ready ------------> Running -------------------------> Blocked
///    ^                  |  |                                 |
///    |  preempt/yield   |  | exit_current                    |
///    +------------------+  +------------> Exited             |
///    +-------------------------------------------------------+
///                               wake
/// ```
///
/// and keeps the running task plus the ready queue of one scheduling policy.
/// Blocked tasks are not tracked: whoever blocks a task keeps it and hands
/// it back to [`wake`].
///
/// The running task is only referenced weakly. Whoever switched to it, i.e.,
/// the caller of [`pick_next`], keeps it alive.
///
/// Every operation takes a spin lock that disables local IRQs, so it is safe
/// to call any of them from the interrupt context, e.g., [`tick`] from the
/// timer handler. No operation blocks.
///
/// [`wake`]: Self::wake
/// [`pick_next`]: Self::pick_next
/// [`tick`]: Self::tick
pub struct Scheduler<P> {
    id: u64,
    rq: SpinNoIrq<RunQueue<P>>,
    /// The ID of the running task, or zero. It is readable without taking
    /// the lock.
    current_id: AtomicU64,
    need_resched: AtomicBool,
}

struct RunQueue<P> {
    policy: Box<dyn BaseScheduler<P>>,
    current: Option<Weak<Task<P>>>,
    /// Whether the running task has been removed and must not be put back.
    current_removed: bool,
    stats: SchedStats,
}

impl<P> RunQueue<P> {
    fn current(&self) -> Option<TaskRef<P>> {
        self.current.as_ref()?.upgrade()
    }

    fn is_current(&self, task: &TaskRef<P>) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| core::ptr::eq(current.as_ptr(), Arc::as_ptr(task)))
    }

    fn take_current(&mut self) -> Option<TaskRef<P>> {
        self.current_removed = false;
        self.current.take()?.upgrade()
    }
}

impl<P: Send + Sync + 'static> Scheduler<P> {
    /// Creates a scheduler with the configured policy.
    pub fn new(config: &SchedConfig) -> Self {
        Self::with_policy(config.build_policy())
    }
}

impl<P> Scheduler<P> {
    /// Creates a scheduler that runs the given policy.
    pub fn with_policy(policy: Box<dyn BaseScheduler<P>>) -> Self {
        // Zero is reserved for "no scheduler".
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            rq: SpinNoIrq::new(RunQueue {
                policy,
                current: None,
                current_removed: false,
                stats: SchedStats::default(),
            }),
            current_id: AtomicU64::new(0),
            need_resched: AtomicBool::new(false),
        }
    }

    /// Adds a new task to the ready queue.
    ///
    /// Adding the current task after it was removed tracks it again, and it
    /// keeps running.
    ///
    /// Fails with [`Error::DuplicateTask`] if the task is already tracked by
    /// this or any other scheduler, with [`Error::Blocked`] if it is blocked,
    /// or with [`Error::Exited`] if it has exited.
    pub fn add_task(&self, task: TaskRef<P>) -> Result<()> {
        if task.is_exited() {
            return Err(Error::Exited);
        }

        let mut rq = self.rq.lock();
        if let Err(owner) = task.owner().set_if_is_none(self.id) {
            if owner == self.id && rq.current_removed && rq.is_current(&task) {
                rq.current_removed = false;
                debug!("[sched] {} is added back while running", task);
                return Ok(());
            }
            return Err(Error::DuplicateTask);
        }
        // Only a task that nobody runs or waits for may be added.
        let state = task.state();
        if state != TaskState::Ready {
            task.owner().set_to_none();
            return Err(match state {
                TaskState::Blocked => Error::Blocked,
                TaskState::Exited => Error::Exited,
                TaskState::Ready | TaskState::Running => Error::DuplicateTask,
            });
        }

        debug!("[sched] add {}", task);
        rq.policy.enqueue(task, EnqueueFlags::Spawn);
        self.check_preempt(&rq);
        Ok(())
    }

    /// Picks the next task to run and makes it the current task.
    ///
    /// A running task that has not been removed goes back to the ready queue
    /// first, as if it was preempted, so it competes with the ready tasks.
    ///
    /// Returns `None` if no task is ready, in which case the CPU should idle.
    pub fn pick_next(&self) -> Option<TaskRef<P>> {
        self.reschedule(PutPrevFlags::Preempt)
    }

    /// Lets the current task give up the CPU and picks the next task to run.
    ///
    /// This is the same as [`pick_next`](Self::pick_next) except that the
    /// policy may treat the current task more favorably; Round-Robin keeps
    /// the rest of its time slice.
    pub fn yield_current(&self) -> Option<TaskRef<P>> {
        self.reschedule(PutPrevFlags::Yield)
    }

    fn reschedule(&self, flags: PutPrevFlags) -> Option<TaskRef<P>> {
        let mut rq = self.rq.lock();
        self.need_resched.store(false, Ordering::Relaxed);

        let removed = rq.current_removed;
        let prev = rq.take_current();
        if let Some(prev) = &prev {
            if removed {
                prev.set_state(TaskState::Ready);
                prev.owner().set_to_none();
                debug!("[sched] {} removed", prev);
            } else {
                debug_assert!(prev.is_running());
                prev.set_state(TaskState::Ready);
                rq.policy.put_prev(prev.clone(), flags);
            }
        }

        let Some(next) = rq.policy.pick_next() else {
            self.current_id.store(0, Ordering::Relaxed);
            return None;
        };
        next.set_state(TaskState::Running);
        rq.current = Some(Arc::downgrade(&next));
        self.current_id.store(next.id().as_u64(), Ordering::Relaxed);
        if !prev.is_some_and(|prev| Arc::ptr_eq(&prev, &next)) {
            rq.stats.switches += 1;
        }
        trace!("[sched] pick {}", next);
        Some(next)
    }

    /// Blocks the current task.
    ///
    /// The task leaves the scheduler and is returned to the caller, who
    /// must keep it until it is woken up with [`wake`](Self::wake).
    ///
    /// Fails with [`Error::NotFound`] if there is no current task.
    pub fn block_current(&self) -> Result<TaskRef<P>> {
        let mut rq = self.rq.lock();
        let task = self.leave_current(&mut rq)?;
        debug!("[sched] block {}", task);
        // Wakers claim the owner after seeing the blocked state.
        task.owner().set_to_none();
        task.set_state(TaskState::Blocked);
        Ok(task)
    }

    /// Terminates the current task with an exit code.
    ///
    /// The task leaves the scheduler and can never be scheduled again.
    ///
    /// Fails with [`Error::NotFound`] if there is no current task.
    pub fn exit_current(&self, exit_code: i32) -> Result<TaskRef<P>> {
        let mut rq = self.rq.lock();
        let task = self.leave_current(&mut rq)?;
        debug!("[sched] exit {} with code {}", task, exit_code);
        task.set_exit_code(exit_code);
        task.set_state(TaskState::Exited);
        task.owner().set_to_none();
        Ok(task)
    }

    fn leave_current(&self, rq: &mut RunQueue<P>) -> Result<TaskRef<P>> {
        let task = rq.take_current();
        self.current_id.store(0, Ordering::Relaxed);
        let task = task.ok_or(Error::NotFound)?;
        self.need_resched.store(true, Ordering::Relaxed);
        Ok(task)
    }

    /// Wakes up a blocked task and puts it into the ready queue.
    ///
    /// Returns `Ok(false)` if the task is not blocked, e.g., because it has
    /// already been woken up by someone else. Fails with [`Error::Exited`]
    /// if the task has exited.
    pub fn wake(&self, task: &TaskRef<P>) -> Result<bool> {
        let mut rq = self.rq.lock();
        match task.state() {
            TaskState::Exited => return Err(Error::Exited),
            TaskState::Blocked => (),
            TaskState::Ready | TaskState::Running => return Ok(false),
        }
        // A blocked task has no owner, so only one waker can claim it.
        if task.owner().set_if_is_none(self.id).is_err() {
            return Ok(false);
        }

        debug!("[sched] wake {}", task);
        task.set_state(TaskState::Ready);
        rq.policy.enqueue(task.clone(), EnqueueFlags::Wake);
        self.check_preempt(&rq);
        Ok(true)
    }

    /// Removes a task from the scheduler.
    ///
    /// A ready task leaves the ready queue immediately. The current task
    /// keeps running until the next reschedule, which is requested, and is
    /// not put back into the ready queue then.
    ///
    /// Fails with [`Error::NotFound`] if the task is not tracked by this
    /// scheduler, including blocked tasks and tasks already removed.
    pub fn remove_task(&self, task: &TaskRef<P>) -> Result<TaskRef<P>> {
        if task.owner().get() != Some(self.id) {
            return Err(Error::NotFound);
        }

        let mut rq = self.rq.lock();
        if rq.is_current(task) {
            if rq.current_removed {
                return Err(Error::NotFound);
            }
            rq.current_removed = true;
            self.need_resched.store(true, Ordering::Relaxed);
            debug!("[sched] remove {} at the next reschedule", task);
            return Ok(task.clone());
        }

        let task = rq.policy.dequeue(task).ok_or(Error::NotFound)?;
        task.owner().set_to_none();
        debug!("[sched] remove {}", task);
        Ok(task)
    }

    /// Accounts a timer tick to the current task.
    ///
    /// Returns whether a reschedule is needed, either because the policy
    /// wants to preempt the current task or because of an earlier event.
    pub fn tick(&self) -> bool {
        let mut rq = self.rq.lock();
        rq.stats.ticks += 1;
        if let Some(current) = rq.current()
            && !rq.current_removed
            && rq.policy.tick(&current)
        {
            trace!("[sched] {} should be preempted", current);
            self.need_resched.store(true, Ordering::Relaxed);
        }
        self.need_resched.load(Ordering::Relaxed)
    }

    fn check_preempt(&self, rq: &RunQueue<P>) {
        if let Some(current) = rq.current()
            && rq.policy.check_preempt(&current)
        {
            self.need_resched.store(true, Ordering::Relaxed);
        }
    }

    /// Gets the current task.
    pub fn current(&self) -> Option<TaskRef<P>> {
        self.rq.lock().current()
    }

    /// Gets the ID of the current task without taking any lock.
    pub fn current_id(&self) -> Option<u64> {
        match self.current_id.load(Ordering::Relaxed) {
            0 => None,
            id => Some(id),
        }
    }

    /// Returns whether a reschedule is pending.
    pub fn need_resched(&self) -> bool {
        self.need_resched.load(Ordering::Relaxed)
    }

    /// Returns the number of ready tasks.
    pub fn nr_ready(&self) -> usize {
        self.rq.lock().policy.len()
    }

    /// Returns the number of tracked tasks, i.e., the ready ones plus the
    /// current one unless it has been removed.
    pub fn nr_tracked(&self) -> usize {
        let rq = self.rq.lock();
        let running = rq.current().is_some() && !rq.current_removed;
        rq.policy.len() + usize::from(running)
    }

    /// Returns whether the task is tracked by this scheduler.
    pub fn contains(&self, task: &TaskRef<P>) -> bool {
        let rq = self.rq.lock();
        task.owner().get() == Some(self.id) && !(rq.is_current(task) && rq.current_removed)
    }

    /// Returns the name of the policy.
    pub fn policy_name(&self) -> &'static str {
        self.rq.lock().policy.name()
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> SchedStats {
        self.rq.lock().stats
    }
}

impl<P> fmt::Debug for Scheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.id)
            .field("current_id", &self.current_id())
            .field("need_resched", &self.need_resched())
            .finish_non_exhaustive()
    }
}
