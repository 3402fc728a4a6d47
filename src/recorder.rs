//! # Step-Response Recorder
//!
//! Task that commands a step on both motors, samples their positions on its
//! own cadence, and ships the trace to a telemetry sink once capture is
//! over.
//!
//! ```text
//!   ┌────────┐ begin ┌──────────┐ elapsed > capture ┌──────────┐
//!   │ Arming │ ────► │ Sampling │ ────────────────► │ Finished │
//!   └────────┘       └──────────┘   (or trace full) └──────────┘
//!                                                        │ next activation
//!                                                        ▼
//!                            ┌──────┐   all sent   ┌──────────┐
//!                            │ Idle │ ◄─────────── │ Draining │
//!                            └──────┘              └──────────┘
//! ```
//!
//! Waiting for `begin` is a check per activation, never a blocking wait.
//! Samples are sent in recording order, each exactly once.

use core::fmt::Write as _;

use heapless::{String, Vec};

use crate::error::{SinkError, TaskFault};
use crate::share::{ProtectedCell, SharedCell};
use crate::task::Task;
use crate::time::{self, Duration, Instant};

/// One point of a step-response trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepResponseSample {
    /// Milliseconds since the trace started.
    pub time_ms: u32,
    pub position1: i64,
    pub position2: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecorderState {
    /// Waiting for the begin signal.
    Arming,
    Sampling,
    /// Capture over, trace is read-only.
    Finished,
    Draining,
    /// Trace sent, nothing left to do.
    Idle,
}

// ---------------------------------------------------------------------------
// Telemetry sinks
// ---------------------------------------------------------------------------

/// Consumer of a finished trace.
pub trait TelemetrySink {
    fn write_record(&mut self, sample: &StepResponseSample) -> Result<(), SinkError>;

    /// Called once after the last record.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Longest line: a `u32` time, a signed 64-bit position, separators.
const LINE_CAPACITY: usize = 40;

/// Line-oriented sink over a byte stream (UART, USB CDC).
///
/// One record per line: `"{time_ms}, {position1}\r\n"`, the two-column
/// format host plotting scripts read. Motor 2 stays in the recorded
/// [`StepResponseSample`] but is not sent.
pub struct SerialSink<W> {
    writer: W,
    lines: u32,
}

impl<W: embedded_io::Write> SerialSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    /// Lines written so far.
    pub fn lines(&self) -> u32 {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: embedded_io::Write> TelemetrySink for SerialSink<W> {
    fn write_record(&mut self, sample: &StepResponseSample) -> Result<(), SinkError> {
        let mut line: String<LINE_CAPACITY> = String::new();
        write!(line, "{}, {}\r\n", sample.time_ms, sample.position1)
            .map_err(|_| SinkError::Format)?;

        self.writer
            .write_all(line.as_bytes())
            .map_err(|_| SinkError::Write)?;
        self.lines += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(|_| SinkError::Write)
    }
}

/// Sink that emits each record through the crate's log output.
#[derive(Debug, Default)]
pub struct LogSink {
    records: u32,
}

impl LogSink {
    pub const fn new() -> Self {
        Self { records: 0 }
    }

    pub fn records(&self) -> u32 {
        self.records
    }
}

impl TelemetrySink for LogSink {
    fn write_record(&mut self, sample: &StepResponseSample) -> Result<(), SinkError> {
        log_info!("{}, {}", sample.time_ms, sample.position1);
        self.records += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Shares the recorder reads and writes.
#[derive(Clone, Copy)]
pub struct RecorderShares<'a> {
    pub setpoint1: &'a SharedCell<i16>,
    pub setpoint2: &'a SharedCell<i16>,
    pub position1: &'a SharedCell<i64>,
    pub position2: &'a SharedCell<i64>,
    /// Operator start trigger, raised from interrupt context.
    pub begin: &'a ProtectedCell<bool>,
}

/// The recorder task. `N` bounds the trace length.
pub struct StepResponseRecorder<'a, S, const N: usize> {
    shares: RecorderShares<'a>,
    targets: [i16; 2],
    capture: Duration,
    sink: S,
    state: RecorderState,
    start: Instant,
    trace: Vec<StepResponseSample, N>,
}

impl<'a, S: TelemetrySink, const N: usize> StepResponseRecorder<'a, S, N> {
    /// `targets` are the step setpoints for motor 1 and motor 2; capture
    /// ends at the first sample taken more than `capture` after begin.
    pub fn new(shares: RecorderShares<'a>, targets: [i16; 2], capture: Duration, sink: S) -> Self {
        Self {
            shares,
            targets,
            capture,
            sink,
            state: RecorderState::Arming,
            start: Instant::from_ticks(0),
            trace: Vec::new(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Samples recorded so far, in order.
    pub fn samples(&self) -> &[StepResponseSample] {
        &self.trace
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Seed both setpoints and start the clock once begin is raised.
    fn arm(&mut self, now: Instant) {
        if !self.shares.begin.get() {
            return;
        }
        self.shares.setpoint1.put(self.targets[0]);
        self.shares.setpoint2.put(self.targets[1]);
        self.start = now;
        self.state = RecorderState::Sampling;
        log_info!(
            "step response started: targets {} / {}",
            self.targets[0],
            self.targets[1]
        );
    }

    fn sample(&mut self, now: Instant) -> Result<(), TaskFault> {
        let sample = StepResponseSample {
            time_ms: time::elapsed(self.start, now).to_millis(),
            position1: self.shares.position1.get(),
            position2: self.shares.position2.get(),
        };
        self.trace
            .push(sample)
            .map_err(|_| TaskFault::Internal("trace overflow"))?;
        log_debug!(
            "[{}, {}, {}]",
            sample.time_ms,
            sample.position1,
            sample.position2
        );

        if sample.time_ms > self.capture.to_millis() {
            self.state = RecorderState::Finished;
            log_info!("capture finished: {} samples", self.trace.len());
        } else if self.trace.is_full() {
            self.state = RecorderState::Finished;
            log_warn!(
                "trace full after {} ms, capture cut short",
                sample.time_ms
            );
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), TaskFault> {
        self.state = RecorderState::Draining;
        for sample in self.trace.iter() {
            self.sink.write_record(sample)?;
        }
        self.sink.finish()?;
        self.state = RecorderState::Idle;
        log_info!("step response sent: {} records", self.trace.len());
        Ok(())
    }
}

impl<S: TelemetrySink, const N: usize> Task for StepResponseRecorder<'_, S, N> {
    fn step(&mut self, now: Instant) -> Result<(), TaskFault> {
        match self.state {
            RecorderState::Arming => {
                self.arm(now);
                Ok(())
            }
            RecorderState::Sampling => self.sample(now),
            RecorderState::Finished | RecorderState::Draining => self.drain(),
            RecorderState::Idle => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Byte sink collecting everything written.
    #[derive(Default)]
    struct MockUart {
        bytes: std::vec::Vec<u8>,
        flushed: bool,
        fail: bool,
    }

    impl embedded_io::ErrorType for MockUart {
        type Error = embedded_io::ErrorKind;
    }

    impl embedded_io::Write for MockUart {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            if self.fail {
                return Err(embedded_io::ErrorKind::Other);
            }
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            self.flushed = true;
            Ok(())
        }
    }

    struct Cells {
        sp1: SharedCell<i16>,
        sp2: SharedCell<i16>,
        p1: SharedCell<i64>,
        p2: SharedCell<i64>,
        begin: ProtectedCell<bool>,
    }

    impl Cells {
        fn new() -> Self {
            Self {
                sp1: SharedCell::named("setpoint1"),
                sp2: SharedCell::named("setpoint2"),
                p1: SharedCell::named("position1"),
                p2: SharedCell::named("position2"),
                begin: ProtectedCell::named("begin"),
            }
        }

        fn shares(&self) -> RecorderShares<'_> {
            RecorderShares {
                setpoint1: &self.sp1,
                setpoint2: &self.sp2,
                position1: &self.p1,
                position2: &self.p2,
                begin: &self.begin,
            }
        }
    }

    fn at(ms: u32) -> Instant {
        Instant::from_ticks(ms)
    }

    #[test]
    fn test_arming_waits_for_begin() {
        let cells = Cells::new();
        let mut rec: StepResponseRecorder<'_, LogSink, 16> =
            StepResponseRecorder::new(cells.shares(), [24_000, 16_000], Duration::millis(100), LogSink::new());

        for t in [0, 60, 120] {
            rec.step(at(t)).unwrap();
            assert_eq!(rec.state(), RecorderState::Arming);
        }
        assert_eq!(cells.sp1.get(), 0);

        cells.begin.put(true);
        rec.step(at(180)).unwrap();
        assert_eq!(rec.state(), RecorderState::Sampling);
        assert_eq!(cells.sp1.get(), 24_000);
        assert_eq!(cells.sp2.get(), 16_000);
        assert!(rec.samples().is_empty());
    }

    #[test]
    fn test_capture_includes_first_sample_past_duration() {
        let cells = Cells::new();
        cells.begin.put(true);
        let mut rec: StepResponseRecorder<'_, LogSink, 16> =
            StepResponseRecorder::new(cells.shares(), [10, 20], Duration::millis(100), LogSink::new());

        rec.step(at(1_000)).unwrap();
        for (i, t) in [1_060, 1_100, 1_160].into_iter().enumerate() {
            cells.p1.put(i as i64);
            cells.p2.put(-(i as i64));
            rec.step(at(t)).unwrap();
        }
        assert_eq!(rec.state(), RecorderState::Finished);
        let times: std::vec::Vec<u32> = rec.samples().iter().map(|s| s.time_ms).collect();
        // 100 ms is not past the 100 ms capture, 160 ms is.
        assert_eq!(times, vec![60, 100, 160]);
        assert_eq!(rec.samples()[2].position2, -2);
    }

    #[test]
    fn test_drain_emits_every_sample_once() {
        let cells = Cells::new();
        cells.begin.put(true);
        let sink = SerialSink::new(MockUart::default());
        let mut rec: StepResponseRecorder<'_, _, 16> =
            StepResponseRecorder::new(cells.shares(), [1, 2], Duration::millis(50), sink);

        rec.step(at(0)).unwrap();
        cells.p1.put(120);
        cells.p2.put(-7);
        rec.step(at(30)).unwrap();
        cells.p1.put(240);
        rec.step(at(60)).unwrap();
        assert_eq!(rec.state(), RecorderState::Finished);

        rec.step(at(90)).unwrap();
        assert_eq!(rec.state(), RecorderState::Idle);
        rec.step(at(120)).unwrap();

        assert_eq!(rec.sink().lines(), 2);
        let uart = rec.into_sink().into_inner();
        assert!(uart.flushed);
        assert_eq!(
            std::str::from_utf8(&uart.bytes).unwrap(),
            "30, 120\r\n60, 240\r\n"
        );
    }

    #[test]
    fn test_full_trace_ends_capture() {
        let cells = Cells::new();
        cells.begin.put(true);
        let mut rec: StepResponseRecorder<'_, LogSink, 3> =
            StepResponseRecorder::new(cells.shares(), [1, 1], Duration::millis(10_000), LogSink::new());

        rec.step(at(0)).unwrap();
        for t in [10, 20, 30] {
            rec.step(at(t)).unwrap();
        }
        assert_eq!(rec.state(), RecorderState::Finished);
        rec.step(at(40)).unwrap();
        assert_eq!(rec.state(), RecorderState::Idle);
        assert_eq!(rec.sink().records(), 3);
    }

    #[test]
    fn test_sink_failure_is_task_fault() {
        let cells = Cells::new();
        cells.begin.put(true);
        let uart = MockUart {
            fail: true,
            ..Default::default()
        };
        let mut rec: StepResponseRecorder<'_, _, 4> =
            StepResponseRecorder::new(cells.shares(), [1, 1], Duration::millis(5), SerialSink::new(uart));

        rec.step(at(0)).unwrap();
        rec.step(at(10)).unwrap();
        assert_eq!(
            rec.step(at(20)),
            Err(TaskFault::Telemetry(SinkError::Write))
        );
    }

    #[test]
    fn test_serial_line_format_extremes() {
        let mut sink = SerialSink::new(MockUart::default());
        let sample = StepResponseSample {
            time_ms: u32::MAX,
            position1: i64::MIN,
            position2: i64::MAX,
        };
        sink.write_record(&sample).unwrap();
        let uart = sink.into_inner();
        assert_eq!(
            std::str::from_utf8(&uart.bytes).unwrap(),
            "4294967295, -9223372036854775808\r\n"
        );
    }
}
