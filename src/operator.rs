//! # Operator Input
//!
//! One push button drives a run. The first accepted press sets the
//! recorder's `begin` flag; any later press raises the scheduler's
//! [`StopSignal`]. Edges closer than the debounce window to the previous
//! accepted press are ignored.
//!
//! [`Operator::press`] is called from the button's interrupt handler; the
//! tasks only read the flags, so everything lives in protected cells.

use crate::scheduler::StopSignal;
use crate::share::ProtectedCell;
use crate::time::{self, Duration, Instant};

/// What a button press did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatorEvent {
    /// Capture may start.
    Begin,
    /// The scheduler loop should return.
    Stop,
    /// Contact bounce, dropped.
    Bounce,
}

pub struct Operator {
    begin: ProtectedCell<bool>,
    stop: StopSignal,
    last_press: ProtectedCell<Option<Instant>>,
    debounce: Duration,
}

impl Operator {
    pub const fn new(debounce: Duration) -> Self {
        Self {
            begin: ProtectedCell::new("begin", false),
            stop: StopSignal::new(),
            last_press: ProtectedCell::new("last_press", None),
            debounce,
        }
    }

    /// Handle one button edge seen at `now`.
    pub fn press(&self, now: Instant) -> OperatorEvent {
        if let Some(prev) = self.last_press.get() {
            if time::elapsed(prev, now) < self.debounce {
                return OperatorEvent::Bounce;
            }
        }
        self.last_press.put(Some(now));

        if self.begin.get() {
            self.stop.raise();
            OperatorEvent::Stop
        } else {
            self.begin.put(true);
            OperatorEvent::Begin
        }
    }

    /// Flag the recorder waits on.
    pub fn begin(&self) -> &ProtectedCell<bool> {
        &self.begin
    }

    pub fn stop(&self) -> &StopSignal {
        &self.stop
    }
}
