//! # Simulated Plant
//!
//! First-order DC motor with an encoder, integrated against a [`Clock`].
//! Stands in for the motor driver and quadrature decoder on the host and in
//! the demo firmware.
//!
//! Model, per millisecond of clock time:
//!
//! ```text
//!   duty    = clamp(command, -100, 100)            [%]
//!   speed  += (duty * gain - speed) / tau          [ticks/s]
//!   position += speed / 1000                       [ticks]
//! ```
//!
//! The plant is shared: [`Motor`] and [`Encoder`] are implemented for
//! `&SimMotor`, so one instance serves as both ends of a control loop.

use core::cell::Cell;

use crate::control::{Encoder, EncoderReading, Motor};
use crate::error::{ActuatorFault, SensorFault};
use crate::time::{self, Clock, Instant};

/// Duty limit of the simulated driver, percent.
pub const DUTY_LIMIT: f32 = 100.0;

/// Plant constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorParams {
    /// Steady-state speed per percent duty, ticks/s.
    pub gain: f32,
    /// Mechanical time constant, ms.
    pub tau_ms: f32,
}

impl MotorParams {
    /// Small gearmotor: 10 000 ticks/s at full duty, 20 ms time constant.
    pub const DEFAULT: Self = Self {
        gain: 100.0,
        tau_ms: 20.0,
    };
}

impl Default for MotorParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy)]
struct PlantState {
    updated: Instant,
    duty: f32,
    speed: f32,
    position: f32,
    last_read: i64,
}

/// Simulated motor and encoder.
pub struct SimMotor<'c, C: Clock> {
    clock: &'c C,
    params: MotorParams,
    state: Cell<PlantState>,
    sensor_ok: Cell<bool>,
}

impl<'c, C: Clock> SimMotor<'c, C> {
    pub fn new(clock: &'c C, params: MotorParams) -> Self {
        Self {
            clock,
            params,
            state: Cell::new(PlantState {
                updated: clock.now(),
                duty: 0.0,
                speed: 0.0,
                position: 0.0,
                last_read: 0,
            }),
            sensor_ok: Cell::new(true),
        }
    }

    /// Integrate the model up to the clock's current time.
    fn advance(&self) -> PlantState {
        let mut state = self.state.get();
        let now = self.clock.now();
        let steps = time::elapsed(state.updated, now).to_millis();

        let target = state.duty * self.params.gain;
        for _ in 0..steps {
            state.speed += (target - state.speed) / self.params.tau_ms;
            state.position += state.speed / 1000.0;
        }
        state.updated = now;
        self.state.set(state);
        state
    }

    /// Current position in ticks.
    pub fn position(&self) -> i64 {
        self.advance().position as i64
    }

    /// Current speed in ticks/s.
    pub fn speed(&self) -> f32 {
        self.advance().speed
    }

    /// Duty currently applied, after clamping.
    pub fn duty(&self) -> f32 {
        self.state.get().duty
    }

    /// Make encoder reads fail until re-enabled.
    pub fn set_sensor_ok(&self, ok: bool) {
        self.sensor_ok.set(ok);
    }
}

impl<C: Clock> Motor for &SimMotor<'_, C> {
    fn set_duty(&mut self, duty: f32) -> Result<(), ActuatorFault> {
        if duty.is_nan() {
            return Err(ActuatorFault::InvalidCommand);
        }
        let mut state = self.advance();
        state.duty = duty.clamp(-DUTY_LIMIT, DUTY_LIMIT);
        self.state.set(state);
        Ok(())
    }
}

impl<C: Clock> Encoder for &SimMotor<'_, C> {
    fn read(&mut self) -> Result<EncoderReading, SensorFault> {
        if !self.sensor_ok.get() {
            return Err(SensorFault::Unavailable);
        }
        let mut state = self.advance();
        let position = state.position as i64;
        let velocity = position - state.last_read;
        state.last_read = position;
        self.state.set(state);
        Ok(EncoderReading {
            position,
            velocity: velocity.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        })
    }
}
