// SPDX-License-Identifier: MPL-2.0

use core::fmt;

/// The error type which is returned from the APIs of this crate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SchedError {
    /// A weight is zero or negative.
    InvalidWeight,
    /// A nice value is out of `[-20, 19]`.
    InvalidNice,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
