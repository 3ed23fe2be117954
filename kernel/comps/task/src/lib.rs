// SPDX-License-Identifier: MPL-2.0

//! The scheduler core of the kernel.
//!
//! [`Scheduler`] drives the life cycle of tasks on top of one of the ready
//! queue policies of the `scheduler` crate. The kernel runs a single global
//! instance, set up once during boot:
//!
//! ```
//! use kestrel_task::{SchedConfig, Task};
//!
//! kestrel_task::init(SchedConfig::from_cmdline("sched.policy=rr").unwrap());
//!
//! let sched = kestrel_task::get();
//! let task = std::sync::Arc::new(Task::new(Box::new("init") as kestrel_task::TaskData));
//! sched.add_task(task.clone()).unwrap();
//! let next = sched.pick_next().unwrap();
//! assert!(std::sync::Arc::ptr_eq(&next, &task));
//! assert_eq!(kestrel_task::current_task_id(), Some(task.id().as_u64()));
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::boxed::Box;
use core::any::Any;

use lazy_init::LazyInit;
use log::info;

mod config;
mod error;
mod prelude;
mod sched;

pub use scheduler::{
    BaseScheduler, CfsScheduler, EnqueueFlags, FifoScheduler, Nice, PutPrevFlags, RRScheduler,
    Task, TaskId, TaskRef, TaskState,
};

pub use self::{
    config::{PolicyKind, SchedConfig},
    error::{Error, Result},
    sched::{SchedStats, Scheduler},
};

/// The payload of the tasks of the global scheduler.
pub type TaskData = Box<dyn Any + Send + Sync>;

static SCHEDULER: LazyInit<Scheduler<TaskData>> = LazyInit::new();

/// Initializes the global scheduler.
///
/// # Panics
///
/// Panics if the global scheduler has already been initialized.
pub fn init(config: SchedConfig) {
    SCHEDULER.init_once(Scheduler::new(&config));
    info!("[sched] initialized with {:?}", config);
}

/// Gets the global scheduler.
///
/// # Panics
///
/// Panics if the global scheduler has not been initialized.
pub fn get() -> &'static Scheduler<TaskData> {
    &SCHEDULER
}

/// Returns the ID of the current task of the global scheduler, if any.
///
/// It never takes a lock, so it is safe to call from any context.
pub fn current_task_id() -> Option<u64> {
    SCHEDULER.get()?.current_id()
}
