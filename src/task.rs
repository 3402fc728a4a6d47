//! # Task Control Block
//!
//! Defines the task model. A task is a resumable unit of work with a name,
//! a fixed priority and a fixed period. Its body is a [`Task`]
//! implementor: the scheduler resumes it by calling [`Task::step`] once per
//! activation, and anything the body needs to remember between activations
//! lives in its own fields.
//!
//! Tasks are registered once at startup and live for the whole run. They
//! are never removed; a task that faults is parked in
//! [`TaskState::Faulted`] and skipped from then on.

use crate::error::TaskFault;
use crate::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Task body
// ---------------------------------------------------------------------------

/// A cooperative continuation.
///
/// `step` runs until the task's next yield point and returns. It must not
/// block: waiting for something is expressed as checking a condition,
/// returning `Ok(())`, and checking again on the next activation.
pub trait Task {
    fn step(&mut self, now: Instant) -> Result<(), TaskFault>;
}

impl<F> Task for F
where
    F: FnMut(Instant) -> Result<(), TaskFault>,
{
    fn step(&mut self, now: Instant) -> Result<(), TaskFault> {
        self(now)
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌───────────┐      dispatch       ┌─────────┐
///   │ Suspended │ ──────────────────► │ Running │
///   └───────────┘                     └─────────┘
///        ▲          step returns Ok        │
///        └─────────────────────────────────┤
///                                          │ step returns Err
///                                          ▼
///                                    ┌──────────┐
///                                    │ Faulted  │
///                                    └──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Waiting for its next activation.
    Suspended,
    /// Currently executing its one step.
    Running,
    /// Returned a fault; never dispatched again.
    Faulted,
}

/// When a task becomes ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Ready every `period`, starting at registration.
    Periodic(Duration),
    /// Ready only after [`Scheduler::go`](crate::scheduler::Scheduler::go).
    Triggered,
}

// ---------------------------------------------------------------------------
// Task configuration (immutable after creation)
// ---------------------------------------------------------------------------

/// Static configuration for a task, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskConfig {
    /// Lower value = more important. Equal priorities share in round robin.
    pub priority: u8,
    pub activation: Activation,
    /// Collect min/max/total step durations.
    pub profile: bool,
}

impl TaskConfig {
    /// Periodic task with the given priority and period in ms.
    pub const fn periodic(priority: u8, period_ms: u32) -> Self {
        Self {
            priority,
            activation: Activation::Periodic(Duration::from_ticks(period_ms)),
            profile: false,
        }
    }

    /// Event-driven task, run once per `go()`.
    pub const fn triggered(priority: u8) -> Self {
        Self {
            priority,
            activation: Activation::Triggered,
            profile: false,
        }
    }

    pub const fn with_profile(mut self) -> Self {
        self.profile = true;
        self
    }

    pub fn period(&self) -> Option<Duration> {
        match self.activation {
            Activation::Periodic(period) => Some(period),
            Activation::Triggered => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Profiling
// ---------------------------------------------------------------------------

/// Step duration statistics, milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileStats {
    pub samples: u32,
    pub min_ms: u32,
    pub max_ms: u32,
    pub total_ms: u64,
}

impl ProfileStats {
    pub const fn new() -> Self {
        Self {
            samples: 0,
            min_ms: 0,
            max_ms: 0,
            total_ms: 0,
        }
    }

    pub fn record(&mut self, duration: Duration) {
        let ms = duration.to_millis();
        if self.samples == 0 || ms < self.min_ms {
            self.min_ms = ms;
        }
        self.max_ms = self.max_ms.max(ms);
        self.total_ms += ms as u64;
        self.samples += 1;
    }

    /// Mean step duration, 0 before the first sample.
    pub fn average_ms(&self) -> u32 {
        if self.samples == 0 {
            0
        } else {
            (self.total_ms / self.samples as u64) as u32
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Identifier returned by registration: the task's index in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(pub usize);

/// Everything the scheduler keeps about one task.
pub struct TaskControlBlock<'a> {
    pub id: TaskId,
    pub name: &'static str,
    pub config: TaskConfig,
    pub state: TaskState,

    /// Earliest time a periodic task may run again.
    pub next_run: Instant,

    /// Pending `go()` for a triggered task.
    pub triggered: bool,

    /// Completed steps.
    pub run_count: u32,

    /// Periodic activations skipped because the task ran too late.
    pub missed: u32,

    /// Scheduler dispatch sequence number of the latest run (0 = never).
    pub last_dispatch: u64,

    pub profile: ProfileStats,

    /// Fault that parked the task, if any.
    pub fault: Option<TaskFault>,

    pub body: &'a mut dyn Task,
}

impl<'a> TaskControlBlock<'a> {
    pub fn new(
        id: TaskId,
        name: &'static str,
        config: TaskConfig,
        body: &'a mut dyn Task,
        now: Instant,
    ) -> Self {
        Self {
            id,
            name,
            config,
            state: TaskState::Suspended,
            next_run: now,
            triggered: false,
            run_count: 0,
            missed: 0,
            last_dispatch: 0,
            profile: ProfileStats::new(),
            fault: None,
            body,
        }
    }

    /// Ready to be dispatched at `now`.
    pub fn is_ready(&self, now: Instant) -> bool {
        if self.state != TaskState::Suspended {
            return false;
        }
        match self.config.activation {
            Activation::Periodic(_) => self.next_run <= now,
            Activation::Triggered => self.triggered,
        }
    }

    /// Book a completed step: count it and move the next activation.
    ///
    /// A periodic task's next run advances by whole periods from the
    /// previous one, not from `now`, so the average rate holds even when a
    /// dispatch is late. Activations that already lie in the past are
    /// skipped and counted in `missed`.
    pub fn record_run(&mut self, now: Instant) {
        self.run_count = self.run_count.wrapping_add(1);
        self.state = TaskState::Suspended;

        match self.config.activation {
            Activation::Periodic(period) => {
                if period.ticks() == 0 {
                    self.next_run = now;
                    return;
                }
                self.next_run = self.next_run + period;
                while self.next_run <= now {
                    self.next_run = self.next_run + period;
                    self.missed = self.missed.wrapping_add(1);
                }
            }
            Activation::Triggered => self.triggered = false,
        }
    }

    /// Park the task after a fault.
    pub fn record_fault(&mut self, fault: TaskFault) {
        self.state = TaskState::Faulted;
        self.fault = Some(fault);
    }

    pub fn is_faulted(&self) -> bool {
        self.state == TaskState::Faulted
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
