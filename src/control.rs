//! # Position Control
//!
//! One [`ControlLoop`] per motor: read the encoder, run a proportional
//! controller against the current setpoint, command the motor, publish the
//! position.
//!
//! ```text
//!   setpoint cell ──► ProportionalController ──► Motor::set_duty
//!                           ▲
//!   Encoder::read ──────────┴──────────────────► position cell
//! ```
//!
//! Hardware sits behind the [`Encoder`] and [`Motor`] traits. The gain is
//! tuned for the loop's task period, so a loop must be scheduled at a
//! roughly constant cadence.

use crate::error::{ActuatorFault, ControlFault, SensorFault, TaskFault};
use crate::share::{ProtectedCell, SharedCell};
use crate::task::Task;
use crate::time::Instant;

// ---------------------------------------------------------------------------
// Boundaries
// ---------------------------------------------------------------------------

/// One encoder sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderReading {
    /// Signed position in encoder ticks, monotonic within a session.
    pub position: i64,
    /// Ticks moved since the previous read.
    pub velocity: i32,
}

/// Feedback source. `read` must not block.
pub trait Encoder {
    fn read(&mut self) -> Result<EncoderReading, SensorFault>;
}

/// Motor actuator taking a signed duty cycle in percent.
///
/// Values beyond ±100 are the driver's to clamp; the controller applies no
/// limit of its own.
pub trait Motor {
    fn set_duty(&mut self, duty: f32) -> Result<(), ActuatorFault>;
}

impl<T: Encoder + ?Sized> Encoder for &mut T {
    fn read(&mut self) -> Result<EncoderReading, SensorFault> {
        (**self).read()
    }
}

impl<T: Motor + ?Sized> Motor for &mut T {
    fn set_duty(&mut self, duty: f32) -> Result<(), ActuatorFault> {
        (**self).set_duty(duty)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Proportional-only controller: `output = kp * (setpoint - feedback)`.
///
/// No integral or derivative term, no anti-windup, no output clamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProportionalController {
    kp: f32,
    setpoint: i32,
    last_error: i32,
    last_output: f32,
}

impl ProportionalController {
    pub const fn new(kp: f32) -> Self {
        Self {
            kp,
            setpoint: 0,
            last_error: 0,
            last_output: 0.0,
        }
    }

    /// New target, used from the next `run`.
    pub fn set_setpoint(&mut self, setpoint: i32) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> i32 {
        self.setpoint
    }

    pub fn kp(&self) -> f32 {
        self.kp
    }

    /// Compute the actuator command for `feedback`.
    pub fn run(&mut self, feedback: i64) -> f32 {
        let error = (self.setpoint as i64)
            .saturating_sub(feedback)
            .clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        let output = self.kp * error as f32;
        self.last_error = error;
        self.last_output = output;
        output
    }

    pub fn last_error(&self) -> i32 {
        self.last_error
    }

    pub fn last_output(&self) -> f32 {
        self.last_output
    }
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

/// Closes the position loop of one motor.
pub struct ControlLoop<'a, E, M> {
    name: &'static str,
    encoder: E,
    motor: M,
    controller: ProportionalController,
    setpoint: &'a SharedCell<i16>,
    position: &'a SharedCell<i64>,
    last_reading: EncoderReading,
    /// Steps skipped because of a sensor or actuator fault.
    skipped: u32,
}

impl<'a, E: Encoder, M: Motor> ControlLoop<'a, E, M> {
    pub fn new(
        name: &'static str,
        encoder: E,
        motor: M,
        controller: ProportionalController,
        setpoint: &'a SharedCell<i16>,
        position: &'a SharedCell<i64>,
    ) -> Self {
        Self {
            name,
            encoder,
            motor,
            controller,
            setpoint,
            position,
            last_reading: EncoderReading::default(),
            skipped: 0,
        }
    }

    /// Set the target position, effective on the next [`step`](Self::step).
    pub fn set_setpoint(&mut self, target: i32) {
        self.controller.set_setpoint(target);
    }

    /// One control cycle: exactly one encoder read and one motor write.
    ///
    /// The read position is published even when the motor rejects the
    /// command.
    pub fn step(&mut self) -> Result<EncoderReading, ControlFault> {
        let reading = self.encoder.read()?;
        let duty = self.controller.run(reading.position);
        let applied = self.motor.set_duty(duty);

        self.position.put(reading.position);
        self.last_reading = reading;

        applied?;
        Ok(reading)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn controller(&self) -> &ProportionalController {
        &self.controller
    }

    pub fn last_reading(&self) -> EncoderReading {
        self.last_reading
    }

    pub fn skipped(&self) -> u32 {
        self.skipped
    }
}

impl<E: Encoder, M: Motor> Task for ControlLoop<'_, E, M> {
    /// Pull the setpoint share into the controller and run one cycle.
    /// Sensor and actuator faults skip the cycle; they never fault the task.
    fn step(&mut self, _now: Instant) -> Result<(), TaskFault> {
        let target = self.setpoint.get();
        self.set_setpoint(target.into());

        if let Err(fault) = ControlLoop::step(self) {
            self.skipped = self.skipped.wrapping_add(1);
            log_warn!("{}: control step skipped: {}", self.name, fault);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Interrupt-fed encoder
// ---------------------------------------------------------------------------

/// Encoder over a tick counter maintained from interrupt context.
///
/// The counter is a [`ProtectedCell`], usually a `static` the edge handler
/// adds to with [`CountingEncoder::accumulate`].
pub struct CountingEncoder<'a> {
    counter: &'a ProtectedCell<i64>,
    last: i64,
}

impl<'a> CountingEncoder<'a> {
    pub fn new(counter: &'a ProtectedCell<i64>) -> Self {
        Self {
            counter,
            last: counter.get(),
        }
    }

    /// Add `delta` ticks. Safe to call from an interrupt handler.
    pub fn accumulate(counter: &ProtectedCell<i64>, delta: i64) {
        counter.update(|ticks| ticks.wrapping_add(delta));
    }

    /// Declare the current position to be `position`.
    pub fn zero_at(&mut self, position: i64) {
        self.counter.put(position);
        self.last = position;
    }
}

impl Encoder for CountingEncoder<'_> {
    fn read(&mut self) -> Result<EncoderReading, SensorFault> {
        let position = self.counter.get();
        let delta = position.wrapping_sub(self.last);
        self.last = position;
        let velocity = i32::try_from(delta).map_err(|_| SensorFault::InvalidReading)?;
        Ok(EncoderReading { position, velocity })
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
