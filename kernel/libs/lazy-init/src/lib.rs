// SPDX-License-Identifier: MPL-2.0

//! Lazily initialized values for kernel globals.
//!
//! A `static` must be constructed by a constant expression, but many kernel
//! globals can only be built once the kernel is running. [`LazyInit`] fills
//! that gap: it starts empty and is initialized exactly once, typically
//! during boot.
//!
//! Accessing an uninitialized [`LazyInit`] through [`Deref`] panics. Code
//! that touches a global before it is set up has a bug, and failing fast is
//! the only sane reaction.
//!
//! # Example
//!
//! ```
//! use lazy_init::LazyInit;
//!
//! static VALUE: LazyInit<u32> = LazyInit::new();
//!
//! assert!(!VALUE.is_inited());
//! VALUE.init_once(233);
//! assert_eq!(*VALUE, 233);
//! ```

#![cfg_attr(not(test), no_std)]

use core::{fmt, ops::Deref};

use spin::Once;

/// A value that is initialized exactly once, after its construction.
///
/// Concurrent initializers are serialized: exactly one of them runs, and
/// the others spin until the value is ready.
pub struct LazyInit<T> {
    inner: Once<T>,
}

impl<T> LazyInit<T> {
    /// Creates an uninitialized value.
    pub const fn new() -> Self {
        Self { inner: Once::new() }
    }

    /// Initializes the value.
    ///
    /// # Panics
    ///
    /// Panics if the value has already been initialized.
    pub fn init_once(&self, data: T) -> &T {
        let mut initialized_here = false;
        let value = self.inner.call_once(|| {
            initialized_here = true;
            data
        });
        if !initialized_here {
            panic!("LazyInit is already initialized");
        }
        value
    }

    /// Initializes the value with `f` unless it has been initialized, then
    /// returns a reference to it.
    ///
    /// If another CPU is running its initializer, this method spins until
    /// the value is ready.
    pub fn call_once<F: FnOnce() -> T>(&self, f: F) -> &T {
        self.inner.call_once(f)
    }

    /// Returns whether the value has been initialized.
    pub fn is_inited(&self) -> bool {
        self.inner.is_completed()
    }

    /// Gets a reference to the value, or `None` if it is uninitialized.
    pub fn get(&self) -> Option<&T> {
        self.inner.get()
    }

    /// Gets a mutable reference to the value, or `None` if it is uninitialized.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.inner.get_mut()
    }

    /// Spins until the value is initialized by someone else and returns it.
    pub fn wait(&self) -> &T {
        self.inner.wait()
    }
}

impl<T> Default for LazyInit<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for LazyInit<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.inner.get() {
            Some(value) => value,
            None => panic!("use of an uninitialized LazyInit"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyInit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.get() {
            Some(value) => f.debug_tuple("LazyInit").field(value).finish(),
            None => f.write_str("LazyInit(<uninitialized>)"),
        }
    }
}
