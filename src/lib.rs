//! # coopctl: Cooperative Control Kernel
//!
//! A cooperative task scheduler with typed inter-task shares, a
//! proportional position loop and a step-response recorder, for ARM
//! Cortex-M microcontrollers.
//!
//! ## Overview
//!
//! Several periodic control activities share one execution thread. Each
//! task is resumed for exactly one step per activation and always runs to
//! its next yield point, so tasks never race each other. The only real
//! concurrency is interrupt-context code, which talks to tasks through
//! protected cells and queues.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! │   ControlLoop (control.rs) · StepResponseRecorder       │
//! │                            (recorder.rs)                │
//! ├────────────────────────────────────────────────────────┤
//! │                Scheduler (scheduler.rs)                 │
//! │        register() · tick() · run() · go() · report()    │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Task Model  │   Inter-task Data  │  Sync Primitives  │
//! │  task.rs     │   share.rs         │  sync.rs          │
//! │  ─ Task      │   ─ SharedCell     │  ─ critical_section│
//! │  ─ TCB       │   ─ ProtectedCell  │  ─ Mutex          │
//! │  ─ profile   │   queue.rs         │  operator.rs      │
//! │              │   ─ BoundedQueue   │  ─ Operator       │
//! │              │   ─ ProtectedQueue │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │              Time (time.rs)                             │
//! │    Instant · Duration · Clock · ManualClock             │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │    SysTick · SysTickClock · wfi idle · user button      │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! - Ready: period elapsed (periodic) or `go()` pending (triggered)
//! - Highest priority first (smallest value), round robin among equals
//! - Next activation advances by whole periods; late activations are
//!   skipped, never queued
//! - A task that returns a fault is parked; the others keep running
//!
//! ## Memory Model
//!
//! - **No heap**: task table, queues and traces are `heapless` containers
//! - **No globals required**: the scheduler borrows its task bodies
//! - **Critical sections**: interrupt-shared state lives in a
//!   `critical_section::Mutex`; task-only cells and queues are not `Sync`
//!   and cannot be reached from an interrupt handler

#![cfg_attr(not(test), no_std)]

#[macro_use]
pub mod logging;

pub mod config;
pub mod control;
pub mod error;
pub mod operator;
pub mod queue;
pub mod recorder;
pub mod scheduler;
pub mod share;
pub mod sim;
pub mod sync;
pub mod task;
pub mod time;

#[cfg(feature = "firmware")]
pub mod arch;

pub use control::{ControlLoop, CountingEncoder, Encoder, EncoderReading, Motor, ProportionalController};
pub use error::{ControlFault, QueueError, SchedulerError, TaskFault};
pub use operator::{Operator, OperatorEvent};
pub use queue::{BoundedQueue, ProtectedQueue};
pub use recorder::{RecorderShares, SerialSink, StepResponseRecorder, StepResponseSample, TelemetrySink};
pub use scheduler::{Dispatch, Policy, RunSummary, Scheduler, StopSignal};
pub use share::{ProtectedCell, SharedCell};
pub use task::{Task, TaskConfig, TaskId, TaskState};
pub use time::{Clock, Duration, Instant, ManualClock};
