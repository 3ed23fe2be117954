// SPDX-License-Identifier: MPL-2.0

use alloc::{string::String, sync::Arc};
use core::{
    fmt,
    sync::atomic::{AtomicI32, AtomicU8, AtomicU64, Ordering},
};

use log::trace;

use crate::{Nice, SchedError, WEIGHT_0, nice_to_weight};

/// A shared handle to a task.
pub type TaskRef<P> = Arc<Task<P>>;

/// A unique identifier for a task.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn new() -> Self {
        static ID_COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Converts the task ID to a `u64`. It is never zero.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// The possible states of a task.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TaskState {
    /// Running on a CPU.
    Running = 1,
    /// Waiting in a ready queue.
    Ready = 2,
    /// Waiting for an event, outside any ready queue.
    Blocked = 3,
    /// Finished. This state is terminal.
    Exited = 4,
}

impl From<u8> for TaskState {
    #[inline]
    fn from(state: u8) -> Self {
        match state {
            1 => Self::Running,
            2 => Self::Ready,
            3 => Self::Blocked,
            4 => Self::Exited,
            _ => unreachable!(),
        }
    }
}

/// An atomic container for the ID of the scheduler that tracks a task.
///
/// A task is tracked by at most one scheduler at a time. A scheduler claims
/// a task with [`set_if_is_none`] and releases it with [`set_to_none`].
///
/// [`set_if_is_none`]: Self::set_if_is_none
/// [`set_to_none`]: Self::set_to_none
#[derive(Debug)]
pub struct AtomicOwner(AtomicU64);

impl AtomicOwner {
    /// The null value of a scheduler ID.
    const NONE: u64 = 0;

    /// Sets the owner if the task has none.
    ///
    /// Returns `Err(previous_owner)` if the task is already owned.
    pub fn set_if_is_none(&self, owner: u64) -> Result<(), u64> {
        debug_assert_ne!(owner, Self::NONE);
        self.0
            .compare_exchange(Self::NONE, owner, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    /// Makes the task unowned.
    pub fn set_to_none(&self) {
        self.0.store(Self::NONE, Ordering::Release);
    }

    /// Gets the owner, if any.
    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::Acquire) {
            Self::NONE => None,
            owner => Some(owner),
        }
    }
}

impl Default for AtomicOwner {
    fn default() -> Self {
        Self(AtomicU64::new(Self::NONE))
    }
}

/// The position of a task inside a ready queue.
///
/// What the position means is up to the policy: a slot of the arena for the
/// list-based policies, an enqueue sequence number for CFS.
#[derive(Debug)]
pub(crate) struct QueueLink(AtomicU64);

impl QueueLink {
    const NONE: u64 = u64::MAX;

    pub(crate) fn set(&self, position: u64) {
        let prev = self.0.swap(position, Ordering::Relaxed);
        debug_assert_eq!(prev, Self::NONE, "task is linked into two ready queues");
    }

    pub(crate) fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::Relaxed) {
            Self::NONE => None,
            position => Some(position),
        }
    }

    pub(crate) fn clear(&self) {
        self.0.store(Self::NONE, Ordering::Relaxed);
    }
}

impl Default for QueueLink {
    fn default() -> Self {
        Self(AtomicU64::new(Self::NONE))
    }
}

/// A task: a payload of the caller plus the bookkeeping of the scheduler.
///
/// The scheduler never touches the payload. It is reachable through
/// [`payload`](Self::payload).
pub struct Task<P> {
    id: TaskId,
    name: String,
    state: AtomicU8,
    owner: AtomicOwner,
    queue_link: QueueLink,
    weight: AtomicU64,
    vruntime: AtomicU64,
    time_slice: AtomicU64,
    exit_code: AtomicI32,
    payload: P,
}

impl<P> Task<P> {
    /// Creates a ready task with the default weight.
    pub fn new(payload: P) -> Self {
        Self::new_common(payload, WEIGHT_0)
    }

    /// Creates a ready task with the given weight.
    ///
    /// Fails with [`SchedError::InvalidWeight`] if `weight` is not positive.
    pub fn with_weight(payload: P, weight: i64) -> Result<Self, SchedError> {
        Ok(Self::new_common(payload, checked_weight(weight)?))
    }

    /// Creates a ready task whose weight is derived from a nice value.
    pub fn with_nice(payload: P, nice: Nice) -> Self {
        Self::new_common(payload, nice_to_weight(nice))
    }

    /// Names the task. The name only shows up in logs.
    pub fn named(mut self, name: &str) -> Self {
        self.name = String::from(name);
        self
    }

    fn new_common(payload: P, weight: u64) -> Self {
        Self {
            id: TaskId::new(),
            name: String::new(),
            state: AtomicU8::new(TaskState::Ready as u8),
            owner: AtomicOwner::default(),
            queue_link: QueueLink::default(),
            weight: AtomicU64::new(weight),
            vruntime: AtomicU64::new(0),
            time_slice: AtomicU64::new(0),
            exit_code: AtomicI32::new(0),
            payload,
        }
    }

    /// Gets the ID of the task.
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Gets the name of the task.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Gets the payload.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Gets the state of the task.
    #[inline]
    pub fn state(&self) -> TaskState {
        self.state.load(Ordering::Acquire).into()
    }

    /// Sets the state of the task.
    ///
    /// Only the scheduler core should call this method.
    #[inline]
    pub fn set_state(&self, state: TaskState) {
        debug_assert!(
            self.state() != TaskState::Exited || state == TaskState::Exited,
            "{self} leaves the exited state"
        );
        self.state.store(state as u8, Ordering::Release)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self.state(), TaskState::Running)
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), TaskState::Ready)
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        matches!(self.state(), TaskState::Blocked)
    }

    #[inline]
    pub fn is_exited(&self) -> bool {
        matches!(self.state(), TaskState::Exited)
    }

    /// Gets the scheduler that currently tracks the task.
    pub fn owner(&self) -> &AtomicOwner {
        &self.owner
    }

    pub(crate) fn queue_link(&self) -> &QueueLink {
        &self.queue_link
    }

    /// Gets the load weight of the task.
    pub fn weight(&self) -> u64 {
        self.weight.load(Ordering::Relaxed)
    }

    /// Changes the load weight of the task.
    ///
    /// The new weight applies from the next tick on. Fails with
    /// [`SchedError::InvalidWeight`] if `weight` is not positive.
    pub fn set_weight(&self, weight: i64) -> Result<(), SchedError> {
        self.weight.store(checked_weight(weight)?, Ordering::Relaxed);
        Ok(())
    }

    /// Gets the virtual runtime of the task.
    ///
    /// Only CFS maintains it.
    pub fn vruntime(&self) -> u64 {
        self.vruntime.load(Ordering::Relaxed)
    }

    pub(crate) fn set_vruntime(&self, vruntime: u64) {
        self.vruntime.store(vruntime, Ordering::Relaxed);
    }

    /// Gets the remaining time slice of the task, in ticks.
    ///
    /// Only Round-Robin maintains it.
    pub fn time_slice(&self) -> u64 {
        self.time_slice.load(Ordering::Relaxed)
    }

    pub(crate) fn set_time_slice(&self, ticks: u64) {
        self.time_slice.store(ticks, Ordering::Relaxed);
    }

    /// Gets the exit code. It is meaningful only after the task exits.
    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::Acquire)
    }

    /// Records the exit code.
    ///
    /// Only the scheduler core should call this method.
    pub fn set_exit_code(&self, code: i32) {
        self.exit_code.store(code, Ordering::Release);
    }
}

fn checked_weight(weight: i64) -> Result<u64, SchedError> {
    if weight <= 0 {
        return Err(SchedError::InvalidWeight);
    }
    Ok(weight as u64)
}

impl<P> fmt::Display for Task<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({}, {:?})", self.id.as_u64(), self.name)
    }
}

impl<P> fmt::Debug for Task<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("weight", &self.weight())
            .field("vruntime", &self.vruntime())
            .field("time_slice", &self.time_slice())
            .finish_non_exhaustive()
    }
}

impl<P> Drop for Task<P> {
    fn drop(&mut self) {
        trace!("task drop: {}", self);
    }
}
