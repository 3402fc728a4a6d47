//! # Configuration
//!
//! Compile-time constants governing the kernel and the reference
//! step-response scenario. Nothing here is reconfigurable at runtime; all
//! limits are fixed at compile time, no dynamic allocation.

/// Maximum number of tasks a [`Scheduler`](crate::scheduler::Scheduler)
/// can hold. Bounds the inline task table.
pub const MAX_TASKS: usize = 8;

/// SysTick frequency in Hz. One tick is one millisecond of [`Instant`]
/// time.
///
/// [`Instant`]: crate::time::Instant
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Simulated time that passes on each idle call of a
/// [`ManualClock`](crate::time::ManualClock).
pub const IDLE_STEP_MS: u32 = 1;

/// Number of samples a step-response trace can hold. The reference
/// scenario (60 ms cadence, 6 s capture) needs 101.
pub const TRACE_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Reference scenario
// ---------------------------------------------------------------------------

/// Proportional gain of motor 1, duty percent per encoder tick.
pub const MOTOR1_KP: f32 = 0.1;

/// Proportional gain of motor 2.
pub const MOTOR2_KP: f32 = 0.1;

/// Motor 1 control task: priority and period in ms.
pub const MOTOR1_PRIORITY: u8 = 1;
pub const MOTOR1_PERIOD_MS: u32 = 20;

/// Motor 2 control task: priority and period in ms.
pub const MOTOR2_PRIORITY: u8 = 1;
pub const MOTOR2_PERIOD_MS: u32 = 10;

/// Step-response recorder task: priority and period in ms.
pub const RECORDER_PRIORITY: u8 = 2;
pub const RECORDER_PERIOD_MS: u32 = 60;

/// Step targets in encoder ticks.
pub const MOTOR1_SETPOINT: i16 = 24_000;
pub const MOTOR2_SETPOINT: i16 = 16_000;

/// Capture stops at the first sample whose elapsed time exceeds this.
pub const CAPTURE_DURATION_MS: u32 = 6_000;

/// Button edges closer than this to the last accepted press are bounce.
pub const BUTTON_DEBOUNCE_MS: u32 = 50;
