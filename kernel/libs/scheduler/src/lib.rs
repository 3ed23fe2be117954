// SPDX-License-Identifier: MPL-2.0

//! Ready queues of various scheduling policies.
//!
//! This crate defines what a scheduling policy has to provide, the
//! [`BaseScheduler`] trait, and three implementations of it:
//!
//! - [`FifoScheduler`]: first in, first out, without time slices;
//! - [`RRScheduler`]: FIFO plus a fixed time slice per task;
//! - [`CfsScheduler`]: the Completely Fair Scheduler, ordered by virtual
//!   runtime.
//!
//! A policy only orders the runnable tasks. Which task is running, the task
//! state machine and the locking are the business of the scheduler core
//! built on top of this crate.
//!
//! Tasks are shared as [`TaskRef`]s. The bookkeeping a policy needs lives in
//! the [`Task`] itself, so that every policy can handle every task.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod cfs;
mod error;
mod fifo;
mod list;
mod nice;
mod round_robin;
mod task;

pub use self::{
    cfs::{CfsScheduler, VRUNTIME_SHIFT, vruntime_delta},
    error::SchedError,
    fifo::FifoScheduler,
    nice::{Nice, WEIGHT_0, nice_to_weight},
    round_robin::RRScheduler,
    task::{AtomicOwner, Task, TaskId, TaskRef, TaskState},
};

/// A ready queue of one scheduling policy.
///
/// The running task is not part of the ready queue. The scheduler core
/// hands it back with [`put_prev`] when it stops running without blocking
/// or exiting.
///
/// [`put_prev`]: BaseScheduler::put_prev
pub trait BaseScheduler<P>: Send {
    /// The name of the policy.
    fn name(&self) -> &'static str;

    /// Enqueues a runnable task that was not running, i.e., a new task or a
    /// woken one.
    fn enqueue(&mut self, task: TaskRef<P>, flags: EnqueueFlags);

    /// Removes a task from the ready queue.
    ///
    /// Returns `None` if the task is not in this ready queue.
    fn dequeue(&mut self, task: &TaskRef<P>) -> Option<TaskRef<P>>;

    /// Removes and returns the task that should run next.
    ///
    /// Returns `None` if there are no ready tasks.
    fn pick_next(&mut self) -> Option<TaskRef<P>>;

    /// Puts the task that has just stopped running back into the ready queue.
    fn put_prev(&mut self, prev: TaskRef<P>, flags: PutPrevFlags);

    /// Accounts one timer tick to the running task.
    ///
    /// Returns `true` if the running task should be preempted.
    fn tick(&mut self, current: &TaskRef<P>) -> bool;

    /// Checks whether the running task should be preempted by a task that
    /// has just been enqueued.
    fn check_preempt(&self, _current: &TaskRef<P>) -> bool {
        false
    }

    /// Returns the number of ready tasks.
    fn len(&self) -> usize;

    /// Returns whether there are no ready tasks.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Possible triggers of an `enqueue` action.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum EnqueueFlags {
    /// Spawn a new task.
    Spawn,
    /// Wake a sleeping task.
    Wake,
}

/// Possible triggers of a `put_prev` action.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PutPrevFlags {
    /// The task was preempted, e.g., its time slice ran out.
    Preempt,
    /// The task gave up the CPU voluntarily.
    Yield,
}
