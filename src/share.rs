//! # Shared Cells
//!
//! Single-slot, overwrite-on-write mailboxes used to pass a setpoint or a
//! measurement between tasks.
//!
//! A cell holds exactly one current value. `put` replaces it immediately
//! (last write wins); `get` returns a copy of the most recent write, or the
//! initial value if nothing was ever written. Neither call blocks or fails.
//!
//! The value type is fixed at construction, so a setpoint cell declared as
//! `SharedCell<i16>` cannot be handed an `i64` position.
//!
//! ## Two kinds
//!
//! | Type | Storage | `Sync` | Reachable from |
//! |------|---------|--------|----------------|
//! | [`SharedCell`] | `Cell<T>` | no | cooperative tasks |
//! | [`ProtectedCell`] | `Mutex<Cell<T>>` | yes | tasks and interrupt handlers |
//!
//! A `SharedCell` cannot be placed in a `static`, so no interrupt handler
//! can ever name one. Anything an ISR touches (an encoder tick counter, an
//! operator flag) must be a `ProtectedCell`, whose every access runs inside
//! a critical section. A half-written 64-bit value on a 32-bit core is
//! therefore never observable.

use core::cell::Cell;
use core::fmt;

use crate::sync::{self, Mutex};

/// Typed single-value mailbox between cooperative tasks.
///
/// Not `Sync`: the scheduler serializes every access, and the type system
/// keeps it out of interrupt context.
///
/// ```compile_fail
/// use coopctl::SharedCell;
///
/// static FLAG: SharedCell<bool> = SharedCell::new("flag", false);
/// ```
pub struct SharedCell<T: Copy> {
    name: &'static str,
    value: Cell<T>,
}

impl<T: Copy> SharedCell<T> {
    pub const fn new(name: &'static str, initial: T) -> Self {
        Self {
            name,
            value: Cell::new(initial),
        }
    }

    /// Replace the current value.
    #[inline]
    pub fn put(&self, value: T) {
        self.value.set(value);
    }

    /// Most recent value.
    #[inline]
    pub fn get(&self) -> T {
        self.value.get()
    }

    /// Read, transform and write back.
    pub fn update<F>(&self, f: F) -> T
    where
        F: FnOnce(T) -> T,
    {
        let next = f(self.value.get());
        self.value.set(next);
        next
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Copy + Default> SharedCell<T> {
    /// Create a cell holding the type's default (zero).
    pub fn named(name: &'static str) -> Self {
        Self::new(name, T::default())
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for SharedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCell")
            .field("name", &self.name)
            .field("value", &self.get())
            .finish()
    }
}

/// Typed single-value mailbox that interrupt handlers may also access.
///
/// Every access runs inside a critical section. Being `Sync`, it can live
/// in a `static`:
///
/// ```
/// use coopctl::ProtectedCell;
///
/// static TICKS: ProtectedCell<u32> = ProtectedCell::new("ticks", 0);
/// TICKS.update(|t| t.wrapping_add(1));
/// assert_eq!(TICKS.get(), 1);
/// ```
pub struct ProtectedCell<T: Copy> {
    name: &'static str,
    value: Mutex<Cell<T>>,
}

impl<T: Copy> ProtectedCell<T> {
    pub const fn new(name: &'static str, initial: T) -> Self {
        Self {
            name,
            value: Mutex::new(Cell::new(initial)),
        }
    }

    /// Replace the current value.
    #[inline]
    pub fn put(&self, value: T) {
        sync::critical_section(|cs| self.value.borrow(cs).set(value));
    }

    /// Most recent value.
    #[inline]
    pub fn get(&self) -> T {
        sync::critical_section(|cs| self.value.borrow(cs).get())
    }

    /// Read, transform and write back as one uninterrupted operation.
    ///
    /// The whole read-modify-write runs in a single critical section, so an
    /// interrupt cannot slip a write in between.
    pub fn update<F>(&self, f: F) -> T
    where
        F: FnOnce(T) -> T,
    {
        sync::critical_section(|cs| {
            let cell = self.value.borrow(cs);
            let next = f(cell.get());
            cell.set(next);
            next
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Copy + Default> ProtectedCell<T> {
    pub fn named(name: &'static str) -> Self {
        Self::new(name, T::default())
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for ProtectedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedCell")
            .field("name", &self.name)
            .field("value", &self.get())
            .finish()
    }
}
