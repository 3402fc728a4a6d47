//! # coopctl Demo Firmware
//!
//! Runs the two-motor step response on an STM32F4 board:
//!
//! | Task | Priority | Period | Role |
//! |------|----------|--------|------|
//! | `motor1` | 1 | 20 ms | position loop, motor 1 |
//! | `motor2` | 1 | 10 ms | position loop, motor 2 |
//! | `step_response` | 2 | 60 ms | seeds setpoints, records, reports |
//!
//! Motor drivers and quadrature decoders are simulated (`sim::SimMotor`)
//! against the SysTick clock. Press the user button to begin the capture;
//! press it again to stop the scheduler once the trace has been sent. The
//! trace is emitted over RTT, one `time, position` line per sample.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use defmt_rtt as _;
use panic_halt as _;

use coopctl::arch::cortex_m4::{configure_systick, configure_user_button, SysTickClock, OPERATOR};
use coopctl::config::{
    CAPTURE_DURATION_MS, MOTOR1_KP, MOTOR1_PERIOD_MS, MOTOR1_PRIORITY, MOTOR1_SETPOINT, MOTOR2_KP,
    MOTOR2_PERIOD_MS, MOTOR2_PRIORITY, MOTOR2_SETPOINT, RECORDER_PERIOD_MS, RECORDER_PRIORITY,
    TRACE_CAPACITY,
};
use coopctl::recorder::LogSink;
use coopctl::sim::{MotorParams, SimMotor};
use coopctl::{
    ControlLoop, Duration, Policy, ProportionalController, RecorderShares, Scheduler,
    SchedulerError, SharedCell, StepResponseRecorder, Task, TaskConfig,
};

fn register_tasks<'a>(
    sched: &mut Scheduler<'a>,
    motor1: &'a mut dyn Task,
    motor2: &'a mut dyn Task,
    recorder: &'a mut dyn Task,
) -> Result<(), SchedulerError> {
    sched.register(
        "motor1",
        TaskConfig::periodic(MOTOR1_PRIORITY, MOTOR1_PERIOD_MS),
        motor1,
    )?;
    sched.register(
        "motor2",
        TaskConfig::periodic(MOTOR2_PRIORITY, MOTOR2_PERIOD_MS),
        motor2,
    )?;
    sched.register(
        "step_response",
        TaskConfig::periodic(RECORDER_PRIORITY, RECORDER_PERIOD_MS).with_profile(),
        recorder,
    )?;
    Ok(())
}

#[entry]
fn main() -> ! {
    let Some(mut cp) = cortex_m::Peripherals::take() else {
        defmt::error!("core peripherals already taken");
        loop {
            cortex_m::asm::wfi();
        }
    };
    configure_systick(&mut cp.SYST, &mut cp.SCB);
    configure_user_button(&mut cp.NVIC);
    let clock = SysTickClock::new();

    // --- Shares ---
    let setpoint1 = SharedCell::<i16>::named("setpoint1");
    let setpoint2 = SharedCell::<i16>::named("setpoint2");
    let position1 = SharedCell::<i64>::named("motor1position");
    let position2 = SharedCell::<i64>::named("motor2position");

    // --- Plants and tasks ---
    let plant1 = SimMotor::new(&clock, MotorParams::DEFAULT);
    let plant2 = SimMotor::new(&clock, MotorParams::DEFAULT);

    let mut motor1 = ControlLoop::new(
        "motor1",
        &plant1,
        &plant1,
        ProportionalController::new(MOTOR1_KP),
        &setpoint1,
        &position1,
    );
    let mut motor2 = ControlLoop::new(
        "motor2",
        &plant2,
        &plant2,
        ProportionalController::new(MOTOR2_KP),
        &setpoint2,
        &position2,
    );
    let mut recorder: StepResponseRecorder<'_, LogSink, TRACE_CAPACITY> = StepResponseRecorder::new(
        RecorderShares {
            setpoint1: &setpoint1,
            setpoint2: &setpoint2,
            position1: &position1,
            position2: &position2,
            begin: OPERATOR.begin(),
        },
        [MOTOR1_SETPOINT, MOTOR2_SETPOINT],
        Duration::millis(CAPTURE_DURATION_MS),
        LogSink::new(),
    );

    let mut sched = Scheduler::new(Policy::Priority);
    let registered = register_tasks(&mut sched, &mut motor1, &mut motor2, &mut recorder);

    match registered {
        Ok(()) => {
            defmt::info!("press the user button to begin the step response");
            sched.run(&clock, OPERATOR.stop());
            sched.report();
        }
        Err(e) => defmt::error!("task registration failed: {}", e),
    }

    defmt::info!("Done");
    loop {
        cortex_m::asm::wfi();
    }
}
