//! # Cortex-M4 Port Layer
//!
//! Time base and operator input for the scheduler on an STM32F401
//! (Nucleo-64). SysTick fires at `TICK_HZ` and the handler counts
//! milliseconds into a protected cell. [`SysTickClock`] reads that counter
//! and sleeps in `wfi` when the scheduler has nothing ready.
//!
//! The blue user button (B1, PC13, active low) raises EXTI line 13 on its
//! falling edge. The handler feeds [`OPERATOR`]: first press begins the
//! capture, the next one stops the scheduler.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: priority 0xFF (lowest). The handler only increments a
//!   counter, so it never needs to preempt application interrupts.
//! - EXTI15_10: reset priority. It only touches protected cells.

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{NVIC, SCB, SYST};
use cortex_m_rt::exception;

use crate::config::{BUTTON_DEBOUNCE_MS, SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::operator::{Operator, OperatorEvent};
use crate::share::ProtectedCell;
use crate::time::{Clock, Duration, Instant};

/// Milliseconds since `configure_systick`, wrapping at `u32::MAX`.
static TICKS: ProtectedCell<u32> = ProtectedCell::new("systick", 0);

/// Begin and stop flags driven by the user button.
pub static OPERATOR: Operator = Operator::new(Duration::millis(BUTTON_DEBOUNCE_MS));

// ---------------------------------------------------------------------------
// STM32F401 registers (RM0368)
// ---------------------------------------------------------------------------

const RCC_AHB1ENR: *mut u32 = 0x4002_3830 as *mut u32;
const RCC_APB2ENR: *mut u32 = 0x4002_3844 as *mut u32;
const SYSCFG_EXTICR4: *mut u32 = 0x4001_3814 as *mut u32;
const EXTI_IMR: *mut u32 = 0x4001_3C00 as *mut u32;
const EXTI_FTSR: *mut u32 = 0x4001_3C0C as *mut u32;
const EXTI_PR: *mut u32 = 0x4001_3C14 as *mut u32;

const GPIOCEN: u32 = 1 << 2;
const SYSCFGEN: u32 = 1 << 14;
const BUTTON_LINE: u32 = 1 << 13;
/// EXTICR4 field for line 13, port C.
const EXTI13_PORT_C: u32 = 0b0010 << 4;
const EXTI13_MASK: u32 = 0b1111 << 4;

/// Position of EXTI15_10 in the STM32F401 vector table.
#[derive(Clone, Copy)]
struct Exti15To10;

unsafe impl InterruptNumber for Exti15To10 {
    fn number(self) -> u16 {
        40
    }
}

/// Read-modify-write of a memory-mapped register.
///
/// # Safety
///
/// `reg` must be a valid peripheral register address.
unsafe fn modify(reg: *mut u32, f: impl FnOnce(u32) -> u32) {
    let val = core::ptr::read_volatile(reg);
    core::ptr::write_volatile(reg, f(val));
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the processor clock and
/// drop it to the lowest exception priority.
pub fn configure_systick(syst: &mut SYST, scb: &mut SCB) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);

    // Safety: changing a system handler priority does not break any
    // priority-based critical section; this runs before the scheduler.
    unsafe {
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }

    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// User button
// ---------------------------------------------------------------------------

/// Route PC13 to EXTI line 13, trigger on the falling edge and unmask
/// EXTI15_10. PC13 stays in its reset (input) mode; the board has an
/// external pull-up.
pub fn configure_user_button(_nvic: &mut NVIC) {
    // Safety: fixed STM32F401 register addresses, written once before the
    // scheduler starts and before the interrupt is unmasked.
    unsafe {
        modify(RCC_AHB1ENR, |v| v | GPIOCEN);
        modify(RCC_APB2ENR, |v| v | SYSCFGEN);
        modify(SYSCFG_EXTICR4, |v| (v & !EXTI13_MASK) | EXTI13_PORT_C);
        modify(EXTI_FTSR, |v| v | BUTTON_LINE);
        modify(EXTI_IMR, |v| v | BUTTON_LINE);
        core::ptr::write_volatile(EXTI_PR, BUTTON_LINE);
        NVIC::unmask(Exti15To10);
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    TICKS.update(|t| t.wrapping_add(1));
}

/// Device interrupts land here; only EXTI15_10 is unmasked.
#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    if irqn != Exti15To10.number() as i16 {
        return;
    }
    // Write-one-to-clear.
    core::ptr::write_volatile(EXTI_PR, BUTTON_LINE);

    match OPERATOR.press(Instant::from_ticks(TICKS.get())) {
        OperatorEvent::Begin => log_info!("button: begin capture"),
        OperatorEvent::Stop => log_info!("button: stop"),
        OperatorEvent::Bounce => {}
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Scheduler clock driven by the SysTick counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysTickClock;

impl SysTickClock {
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for SysTickClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(TICKS.get())
    }

    /// Sleep until the next interrupt; SysTick wakes the core every tick.
    fn idle(&self) {
        cortex_m::asm::wfi();
    }
}
