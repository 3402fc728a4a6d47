//! # Error Taxonomy
//!
//! Every failure a task, primitive or boundary can report. All errors are
//! small `Copy` values so they can be stored in a task control block and
//! logged without allocation.
//!
//! | Error | Scope | Handling |
//! |-------|-------|----------|
//! | [`QueueError`] | caller-local | caller drops or retries |
//! | [`ControlFault`] | one control loop | logged, step skipped |
//! | [`TaskFault`] | one task | task marked faulted, others continue |
//! | [`SchedulerError`] | scheduler bookkeeping | returned to setup code |

use core::fmt;

/// Failure of a non-blocking [`BoundedQueue`](crate::queue::BoundedQueue)
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    /// `put` on a queue already holding `capacity` items.
    Full,
    /// `get` on a queue with nothing in it.
    Empty,
}

/// The feedback source could not produce a valid reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorFault {
    /// No reading available (peripheral not responding).
    Unavailable,
    /// A reading was produced but is outside the sensor's valid range.
    InvalidReading,
}

/// The actuator rejected a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActuatorFault {
    /// Driver reported a fault condition (overcurrent, undervoltage).
    DriverFault,
    /// Command could not be represented by the driver.
    InvalidCommand,
}

/// A control step that could not complete. Contained inside the owning
/// control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlFault {
    Sensor(SensorFault),
    Actuator(ActuatorFault),
}

impl From<SensorFault> for ControlFault {
    fn from(fault: SensorFault) -> Self {
        ControlFault::Sensor(fault)
    }
}

impl From<ActuatorFault> for ControlFault {
    fn from(fault: ActuatorFault) -> Self {
        ControlFault::Actuator(fault)
    }
}

/// Failure while emitting telemetry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SinkError {
    /// The byte-stream transport failed.
    Write,
    /// A record did not fit the line buffer.
    Format,
}

/// An unhandled fault raised by a task step. The scheduler stops
/// dispatching the task that returned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskFault {
    Telemetry(SinkError),
    Control(ControlFault),
    /// Task-specific failure with a static description.
    Internal(&'static str),
}

impl From<SinkError> for TaskFault {
    fn from(err: SinkError) -> Self {
        TaskFault::Telemetry(err)
    }
}

impl From<ControlFault> for TaskFault {
    fn from(fault: ControlFault) -> Self {
        TaskFault::Control(fault)
    }
}

/// Scheduler bookkeeping failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerError {
    /// The task table already holds `MAX_TASKS` entries.
    TooManyTasks,
    /// A task with the same name is already registered.
    DuplicateName,
    /// No task with the given id.
    UnknownTask,
    /// `go()` on a task that is not triggered.
    NotTriggered,
    /// Registration after the scheduler loop has started.
    AlreadyStarted,
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Full => f.write_str("queue full"),
            QueueError::Empty => f.write_str("queue empty"),
        }
    }
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorFault::Unavailable => f.write_str("sensor unavailable"),
            SensorFault::InvalidReading => f.write_str("invalid sensor reading"),
        }
    }
}

impl fmt::Display for ActuatorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorFault::DriverFault => f.write_str("motor driver fault"),
            ActuatorFault::InvalidCommand => f.write_str("invalid actuator command"),
        }
    }
}

impl fmt::Display for ControlFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlFault::Sensor(e) => write!(f, "sensor read fault: {}", e),
            ControlFault::Actuator(e) => write!(f, "actuator fault: {}", e),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Write => f.write_str("telemetry write failed"),
            SinkError::Format => f.write_str("telemetry record too long"),
        }
    }
}

impl fmt::Display for TaskFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFault::Telemetry(e) => write!(f, "{}", e),
            TaskFault::Control(e) => write!(f, "{}", e),
            TaskFault::Internal(msg) => f.write_str(msg),
        }
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::TooManyTasks => f.write_str("task table full"),
            SchedulerError::DuplicateName => f.write_str("task name already registered"),
            SchedulerError::UnknownTask => f.write_str("no such task"),
            SchedulerError::NotTriggered => f.write_str("task is not triggered"),
            SchedulerError::AlreadyStarted => f.write_str("scheduler already started"),
        }
    }
}
