// SPDX-License-Identifier: MPL-2.0

use core::fmt;

use scheduler::SchedError;

/// The error type which is returned from the APIs of the scheduler core.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
    /// The task is already tracked by a scheduler.
    DuplicateTask,
    /// The task is not tracked by this scheduler, or there is no current task.
    NotFound,
    /// A weight is zero or negative.
    InvalidWeight,
    /// The task is blocked. Blocked tasks go back through `wake`.
    Blocked,
    /// The task has exited.
    Exited,
    /// A configuration value is malformed or out of range.
    InvalidConfig,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<SchedError> for Error {
    fn from(err: SchedError) -> Self {
        match err {
            SchedError::InvalidWeight => Error::InvalidWeight,
            SchedError::InvalidNice => Error::InvalidConfig,
        }
    }
}

/// The result type of the scheduler core.
pub type Result<T> = core::result::Result<T, Error>;
