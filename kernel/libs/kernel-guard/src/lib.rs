// SPDX-License-Identifier: MPL-2.0

//! RAII guards for critical sections.
//!
//! A critical section that must not be interrupted by the scheduler holds a
//! [`DisabledPreemptGuard`]; one that must not be interrupted at all, e.g.,
//! because the same data is touched from an IRQ handler, holds a
//! [`DisabledLocalIrqGuard`]. Lock types pick the behavior they need through
//! the [`Guardian`] trait.
//!
//! This crate does not know how to talk to the hardware. The architecture
//! layer injects the low-level operations once during boot with
//! [`inject_hooks`]. Until then the guards are pure bookkeeping, which is
//! sound in the bootstrap context where nothing can preempt or interrupt us.

#![cfg_attr(not(test), no_std)]

use core::marker::PhantomData;

use spin::Once;

/// The low-level operations that the guards delegate to.
#[derive(Clone, Copy)]
pub struct GuardHooks {
    /// Disables local IRQs and returns the previous IRQ state.
    pub local_irq_save_and_disable: fn() -> usize,
    /// Restores the local IRQ state returned by `local_irq_save_and_disable`.
    pub local_irq_restore: fn(usize),
    /// Increments the preemption-disable count of the current CPU.
    pub disable_preempt: fn(),
    /// Decrements the preemption-disable count of the current CPU.
    ///
    /// The implementation may reschedule if the count drops to zero and a
    /// reschedule is pending.
    pub enable_preempt: fn(),
}

impl core::fmt::Debug for GuardHooks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GuardHooks").finish_non_exhaustive()
    }
}

static HOOKS: Once<GuardHooks> = Once::new();

/// Injects the architecture-specific guard operations.
///
/// This function can only take effect once. Later calls are ignored.
pub fn inject_hooks(hooks: GuardHooks) {
    HOOKS.call_once(|| hooks);
}

/// Returns whether the guard operations have been injected.
pub fn hooks_injected() -> bool {
    HOOKS.is_completed()
}

/// A guardian that denotes the guard behavior for holding a lock.
pub trait Guardian {
    /// The guard type held together with the lock.
    type Guard;

    /// Creates a new guard.
    fn guard() -> Self::Guard;
}

/// A guardian that does nothing.
///
/// Only use it for locks that are never taken in IRQ context and whose
/// holders may be preempted safely.
#[derive(Debug)]
pub struct NoGuard;

impl Guardian for NoGuard {
    type Guard = ();

    fn guard() -> Self::Guard {}
}

/// A guardian that disables preemption while holding a lock.
#[derive(Debug)]
pub struct PreemptDisabled;

impl Guardian for PreemptDisabled {
    type Guard = DisabledPreemptGuard;

    fn guard() -> Self::Guard {
        disable_preempt()
    }
}

/// A guardian that disables local IRQs, and thus preemption, while holding
/// a lock.
///
/// Prefer [`PreemptDisabled`] when the lock is never used in the interrupt
/// context.
#[derive(Debug)]
pub struct LocalIrqDisabled;

impl Guardian for LocalIrqDisabled {
    type Guard = DisabledLocalIrqGuard;

    fn guard() -> Self::Guard {
        disable_local()
    }
}

/// A guard for disabled preemption.
#[clippy::has_significant_drop]
#[must_use]
#[derive(Debug)]
pub struct DisabledPreemptGuard {
    // Prevents users from constructing the guard directly and makes it `!Send`.
    _private: PhantomData<*mut ()>,
}

impl DisabledPreemptGuard {
    fn new() -> Self {
        if let Some(hooks) = HOOKS.get() {
            (hooks.disable_preempt)();
        }
        Self {
            _private: PhantomData,
        }
    }
}

impl Drop for DisabledPreemptGuard {
    fn drop(&mut self) {
        if let Some(hooks) = HOOKS.get() {
            (hooks.enable_preempt)();
        }
    }
}

/// Disables preemption until the returned guard is dropped.
pub fn disable_preempt() -> DisabledPreemptGuard {
    DisabledPreemptGuard::new()
}

/// A guard for disabled local IRQs.
#[clippy::has_significant_drop]
#[must_use]
#[derive(Debug)]
pub struct DisabledLocalIrqGuard {
    saved: Option<usize>,
    // Dropped after the IRQ state is restored in `drop`.
    _preempt_guard: DisabledPreemptGuard,
}

impl DisabledLocalIrqGuard {
    fn new() -> Self {
        let saved = HOOKS.get().map(|hooks| (hooks.local_irq_save_and_disable)());
        Self {
            saved,
            _preempt_guard: disable_preempt(),
        }
    }
}

impl Drop for DisabledLocalIrqGuard {
    fn drop(&mut self) {
        if let (Some(saved), Some(hooks)) = (self.saved, HOOKS.get()) {
            (hooks.local_irq_restore)(saved);
        }
    }
}

/// Disables local IRQs until the returned guard is dropped.
///
/// Guards can be nested; each one restores the state it observed.
///
/// # Example
///
/// ```
/// use kernel_guard::disable_local;
///
/// let guard = disable_local();
/// // Do something with local IRQs disabled.
/// drop(guard);
/// ```
pub fn disable_local() -> DisabledLocalIrqGuard {
    DisabledLocalIrqGuard::new()
}
