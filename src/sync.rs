//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. Task bodies never run
//! concurrently with each other, so the only data race left is between a
//! task and interrupt-context code. Values shared with an interrupt handler
//! live in a [`Mutex`] and are only reachable inside a critical section.
//!
//! On Cortex-M the `critical-section` implementation comes from `cortex-m`
//! (`critical-section-single-core`: `cpsid i` on entry, prior PRIMASK
//! restored on exit). Host tests use the `std` implementation.

pub use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and the previous state is restored on
/// every exit path, including early returns out of the closure.
///
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
///
/// Keep critical sections as short as possible to minimize interrupt
/// latency.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
