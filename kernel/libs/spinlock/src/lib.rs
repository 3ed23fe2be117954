// SPDX-License-Identifier: MPL-2.0

//! Spin locks.
//!
//! A [`SpinLock`] never sleeps, so it can be taken where blocking is not
//! allowed, e.g., inside the scheduler or an IRQ handler. What else happens
//! while the lock is held is decided by its [`Guardian`]:
//!
//! - [`SpinRaw`] does nothing besides spinning;
//! - [`SpinNoPreempt`] disables preemption;
//! - [`SpinNoIrq`] disables local IRQs, which is required when the lock is
//!   also taken from the interrupt context.
//!
//! In debug builds, a lock remembers the CPU holding it and panics if the
//! same CPU tries to take it again, which would otherwise spin forever. The
//! CPU identity comes from the provider injected with [`inject_cpu_id`].

#![cfg_attr(not(test), no_std)]

use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

pub use kernel_guard::{Guardian, LocalIrqDisabled, NoGuard, PreemptDisabled};
use spin::Once;

/// A spin lock that only spins.
pub type SpinRaw<T> = SpinLock<T, NoGuard>;
/// A spin lock that disables preemption while held.
pub type SpinNoPreempt<T> = SpinLock<T, PreemptDisabled>;
/// A spin lock that disables local IRQs while held.
pub type SpinNoIrq<T> = SpinLock<T, LocalIrqDisabled>;

#[cfg(debug_assertions)]
const NO_OWNER: u64 = 0;

static CPU_ID: Once<fn() -> Option<u64>> = Once::new();

/// Injects the function that identifies the CPU executing the caller.
///
/// Two concurrent callers must never get the same identifier, so a task ID
/// is not suitable unless every CPU runs its own tasks. The function must not
/// take any spin lock itself. It returns `None` when the CPU is unknown,
/// e.g., during early boot. Identifiers must not be zero.
///
/// This function can only take effect once. Later calls are ignored.
pub fn inject_cpu_id(cpu_id: fn() -> Option<u64>) {
    CPU_ID.call_once(|| cpu_id);
}

#[cfg(debug_assertions)]
fn current_cpu_id() -> Option<u64> {
    let cpu_id = CPU_ID.get()?;
    cpu_id()
}

/// A spin lock.
pub struct SpinLock<T: ?Sized, G: Guardian = PreemptDisabled> {
    guardian: PhantomData<G>,
    lock: AtomicBool,
    #[cfg(debug_assertions)]
    owner: core::sync::atomic::AtomicU64,
    val: UnsafeCell<T>,
}

impl<T, G: Guardian> SpinLock<T, G> {
    /// Creates a new spin lock.
    pub const fn new(val: T) -> Self {
        Self {
            guardian: PhantomData,
            lock: AtomicBool::new(false),
            #[cfg(debug_assertions)]
            owner: core::sync::atomic::AtomicU64::new(NO_OWNER),
            val: UnsafeCell::new(val),
        }
    }

    /// Consumes the lock and returns the protected value.
    pub fn into_inner(self) -> T {
        self.val.into_inner()
    }
}

impl<T: ?Sized, G: Guardian> SpinLock<T, G> {
    /// Acquires the spin lock.
    ///
    /// The guard of `G` is created before spinning and lives as long as the
    /// returned lock guard.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the current CPU already holds the lock.
    pub fn lock(&self) -> SpinLockGuard<'_, T, G> {
        let inner_guard = G::guard();
        #[cfg(debug_assertions)]
        let owner = self.check_self_deadlock();
        self.acquire_lock();
        #[cfg(debug_assertions)]
        self.owner.store(owner, Ordering::Relaxed);
        SpinLockGuard {
            lock: self,
            _inner_guard: inner_guard,
            _not_send: PhantomData,
        }
    }

    /// Tries acquiring the spin lock immediately.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T, G>> {
        let inner_guard = G::guard();
        if !self.try_acquire_lock() {
            return None;
        }
        #[cfg(debug_assertions)]
        self.owner
            .store(current_cpu_id().unwrap_or(NO_OWNER), Ordering::Relaxed);
        Some(SpinLockGuard {
            lock: self,
            _inner_guard: inner_guard,
            _not_send: PhantomData,
        })
    }

    /// Returns whether the lock is held by anyone.
    pub fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }

    /// Returns a mutable reference to the protected value.
    ///
    /// No locking is needed since the borrow checker proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.val.get_mut()
    }

    /// Releases the lock without a guard.
    ///
    /// # Safety
    ///
    /// The caller must make sure that the guard that held the lock is gone
    /// without being dropped, e.g., because the holder switched to a new
    /// task with the lock held and never returned.
    pub unsafe fn force_unlock(&self) {
        #[cfg(debug_assertions)]
        self.owner.store(NO_OWNER, Ordering::Relaxed);
        self.release_lock();
    }

    #[cfg(debug_assertions)]
    fn check_self_deadlock(&self) -> u64 {
        let Some(id) = current_cpu_id() else {
            return NO_OWNER;
        };
        if self.is_locked() && self.owner.load(Ordering::Relaxed) == id {
            panic!("deadlock: CPU {id} acquires a spin lock that it already holds");
        }
        id
    }

    /// Acquires the spin lock, otherwise busy waiting.
    fn acquire_lock(&self) {
        while !self.try_acquire_lock() {
            while self.is_locked() {
                core::hint::spin_loop();
            }
        }
    }

    fn try_acquire_lock(&self) -> bool {
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release_lock(&self) {
        self.lock.store(false, Ordering::Release);
    }
}

impl<T: ?Sized + fmt::Debug, G: Guardian> fmt::Debug for SpinLock<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinLock").field("val", &&*guard).finish(),
            None => f.write_str("SpinLock { <locked> }"),
        }
    }
}

impl<T: Default, G: Guardian> Default for SpinLock<T, G> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// SAFETY: Only a single lock holder is permitted to access the inner data of SpinLock.
unsafe impl<T: ?Sized + Send, G: Guardian> Send for SpinLock<T, G> {}
// SAFETY: Only a single lock holder is permitted to access the inner data of SpinLock.
unsafe impl<T: ?Sized + Send, G: Guardian> Sync for SpinLock<T, G> {}

/// A guard that provides exclusive access to the data protected by a [`SpinLock`].
#[clippy::has_significant_drop]
#[must_use]
pub struct SpinLockGuard<'a, T: ?Sized, G: Guardian> {
    lock: &'a SpinLock<T, G>,
    // Dropped after the lock is released in `drop`.
    _inner_guard: G::Guard,
    _not_send: PhantomData<*mut ()>,
}

impl<T: ?Sized, G: Guardian> Deref for SpinLockGuard<'_, T, G> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The lock is held, so no one else can access the value.
        unsafe { &*self.lock.val.get() }
    }
}

impl<T: ?Sized, G: Guardian> DerefMut for SpinLockGuard<'_, T, G> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The lock is held, so no one else can access the value.
        unsafe { &mut *self.lock.val.get() }
    }
}

impl<T: ?Sized, G: Guardian> Drop for SpinLockGuard<'_, T, G> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.lock.owner.store(NO_OWNER, Ordering::Relaxed);
        self.lock.release_lock();
    }
}

impl<T: ?Sized + fmt::Debug, G: Guardian> fmt::Debug for SpinLockGuard<'_, T, G> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// SAFETY: A shared guard only hands out `&T`, which is fine to share if `T: Sync`.
unsafe impl<T: ?Sized + Sync, G: Guardian> Sync for SpinLockGuard<'_, T, G> {}

#[cfg(test)]
mod test {
    use std::{cell::Cell, sync::Arc, thread};

    use kernel_guard::GuardHooks;

    use super::*;

    thread_local! {
        static IRQ_ENABLED: Cell<bool> = const { Cell::new(true) };
        static CPU: Cell<Option<u64>> = const { Cell::new(None) };
    }

    fn setup() {
        kernel_guard::inject_hooks(GuardHooks {
            local_irq_save_and_disable: || usize::from(IRQ_ENABLED.replace(false)),
            local_irq_restore: |saved| IRQ_ENABLED.set(saved != 0),
            disable_preempt: || {},
            enable_preempt: || {},
        });
        inject_cpu_id(|| CPU.get());
    }

    #[test]
    fn try_lock_fails_while_held() {
        setup();
        let lock = SpinRaw::new(5);
        let guard = lock.lock();
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert_eq!(*lock.try_lock().unwrap(), 5);
        assert!(!lock.is_locked());
    }

    #[test]
    fn no_irq_lock_disables_local_irqs() {
        setup();
        let lock = SpinNoIrq::new(());
        {
            let _guard = lock.lock();
            assert!(!IRQ_ENABLED.get());
        }
        assert!(IRQ_ENABLED.get());
    }

    #[test]
    fn mutual_exclusion_across_threads() {
        setup();
        const THREADS: usize = 8;
        const ROUNDS: usize = 1000;

        let counter = Arc::new(SpinNoPreempt::new(0usize));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        *counter.lock() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*counter.lock(), THREADS * ROUNDS);
    }

    #[test]
    fn force_unlock_releases_leaked_guard() {
        setup();
        let lock = SpinRaw::new(1);
        core::mem::forget(lock.lock());
        assert!(lock.is_locked());
        // SAFETY: The guard was leaked above and is never used again.
        unsafe { lock.force_unlock() };
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn into_inner_and_get_mut() {
        let mut lock = SpinRaw::new(vec![1]);
        lock.get_mut().push(2);
        assert_eq!(lock.into_inner(), vec![1, 2]);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "deadlock")]
    fn relocking_on_same_cpu_panics() {
        setup();
        CPU.set(Some(7));
        let lock = SpinRaw::new(());
        let _guard = lock.lock();
        let _again = lock.lock();
    }

    #[cfg(debug_assertions)]
    #[test]
    fn other_cpu_may_wait_for_the_lock() {
        setup();
        let lock = Arc::new(SpinRaw::new(0));
        CPU.set(Some(1));
        let guard = lock.lock();
        let waiter = {
            let lock = lock.clone();
            thread::spawn(move || {
                CPU.set(Some(2));
                *lock.lock() += 1;
            })
        };
        drop(guard);
        waiter.join().unwrap();
        assert_eq!(*lock.lock(), 1);
    }
}
