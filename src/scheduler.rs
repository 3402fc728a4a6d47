//! # Scheduler
//!
//! Single-threaded cooperative dispatcher. Owns the task table and decides
//! which task runs next; every dispatch resumes exactly one task for exactly
//! one step.
//!
//! ## Scheduling Algorithm
//!
//! On every tick:
//! 1. **Ready set**: periodic tasks whose `next_run <= now`, triggered tasks
//!    with a pending `go()`. Faulted tasks are never ready.
//! 2. **Select**: smallest priority value wins. Ties go to the task
//!    dispatched least recently, then to registration order, which yields
//!    round robin among equals. [`Policy::RoundRobin`] ignores priority.
//! 3. **Run**: call [`Task::step`](crate::task::Task::step) once.
//! 4. **Book**: advance `next_run` by whole periods from the previous
//!    activation, skipping (and counting) activations already in the past.
//! 5. **Idle**: nothing ready → [`Clock::idle`].
//!
//! ## Fault Containment
//!
//! A step that returns `Err(TaskFault)` parks its task in
//! [`TaskState::Faulted`]. The fault is logged once, with the task's name,
//! and stored for inspection; every other task keeps its cadence.
//!
//! ## Cancellation
//!
//! [`Scheduler::run`] checks a [`StopSignal`] between steps only, so a
//! running step always completes before the loop returns.

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::error::{SchedulerError, TaskFault};
use crate::share::ProtectedCell;
use crate::task::{Activation, ProfileStats, Task, TaskConfig, TaskControlBlock, TaskId, TaskState};
use crate::time::{self, Clock, Duration, Instant};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Task selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Policy {
    /// Highest priority (smallest value) first, round robin among equals.
    #[default]
    Priority,
    /// Ready tasks in turn, priority ignored.
    RoundRobin,
}

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The task ran one step and is suspended again.
    Ran(TaskId),
    /// The task's step returned a fault; it will not run again.
    Faulted(TaskId),
    /// No task was ready.
    Idle,
}

/// External request to stop the scheduler loop.
///
/// Safe to raise from an interrupt handler (e.g. an operator button).
pub struct StopSignal {
    raised: ProtectedCell<bool>,
}

impl StopSignal {
    pub const fn new() -> Self {
        Self {
            raised: ProtectedCell::new("stop", false),
        }
    }

    pub fn raise(&self) {
        self.raised.put(true);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.get()
    }

    pub fn clear(&self) {
        self.raised.put(false);
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters returned when the loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Steps executed, faulted ones included.
    pub dispatched: u32,
    /// Idle calls made while nothing was ready.
    pub idle: u32,
    /// Tasks that faulted during this run.
    pub faults: u32,
}

impl RunSummary {
    /// Count one tick outcome. Counters wrap instead of overflowing.
    pub fn record(&mut self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Ran(_) => self.dispatched = self.dispatched.wrapping_add(1),
            Dispatch::Faulted(_) => {
                self.dispatched = self.dispatched.wrapping_add(1);
                self.faults = self.faults.wrapping_add(1);
            }
            Dispatch::Idle => self.idle = self.idle.wrapping_add(1),
        }
    }
}

/// Read-only view of one task, for reports and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: &'static str,
    pub priority: u8,
    /// `None` for triggered tasks.
    pub period_ms: Option<u32>,
    pub state: TaskState,
    pub run_count: u32,
    pub missed: u32,
    pub profile: Option<ProfileStats>,
    pub fault: Option<TaskFault>,
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The cooperative scheduler. Holds the task table and dispatch state.
///
/// ## Design Notes
///
/// - Tasks are stored inline in a fixed-capacity table (no heap)
/// - Task bodies are borrowed for `'a`; the scheduler never outlives them
/// - Registration is closed once the first tick runs
pub struct Scheduler<'a> {
    tasks: Vec<TaskControlBlock<'a>, MAX_TASKS>,
    policy: Policy,
    /// Monotonic dispatch counter, basis of round-robin tie breaking.
    dispatch_seq: u64,
    started: bool,
}

impl<'a> Scheduler<'a> {
    pub const fn new(policy: Policy) -> Self {
        Self {
            tasks: Vec::new(),
            policy,
            dispatch_seq: 0,
            started: false,
        }
    }

    /// Register a task body under a unique name.
    ///
    /// # Returns
    /// - `Ok(task_id)`: the index of the new task
    /// - `Err(TooManyTasks)`: the table holds `MAX_TASKS` already
    /// - `Err(DuplicateName)`: the name is taken
    /// - `Err(AlreadyStarted)`: the loop has already ticked
    pub fn register(
        &mut self,
        name: &'static str,
        config: TaskConfig,
        body: &'a mut dyn Task,
    ) -> Result<TaskId, SchedulerError> {
        if self.started {
            return Err(SchedulerError::AlreadyStarted);
        }
        if self.tasks.iter().any(|t| t.name == name) {
            return Err(SchedulerError::DuplicateName);
        }

        let id = TaskId(self.tasks.len());
        let tcb = TaskControlBlock::new(id, name, config, body, Instant::from_ticks(0));
        self.tasks
            .push(tcb)
            .map_err(|_| SchedulerError::TooManyTasks)?;

        log_debug!(
            "registered task {} (priority {}, id {})",
            name,
            config.priority,
            id.0
        );
        Ok(id)
    }

    /// Request one run of a triggered task.
    pub fn go(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        let tcb = self
            .tasks
            .get_mut(id.0)
            .ok_or(SchedulerError::UnknownTask)?;
        match tcb.config.activation {
            Activation::Triggered => {
                tcb.triggered = true;
                Ok(())
            }
            Activation::Periodic(_) => Err(SchedulerError::NotTriggered),
        }
    }

    /// Run at most one task step.
    pub fn tick<C: Clock>(&mut self, clock: &C) -> Dispatch {
        let now = clock.now();
        if !self.started {
            self.start(now);
        }

        let Some(idx) = self.select(now) else {
            return Dispatch::Idle;
        };

        self.dispatch_seq += 1;
        let seq = self.dispatch_seq;

        let tcb = &mut self.tasks[idx];
        tcb.state = TaskState::Running;
        tcb.last_dispatch = seq;

        let result = tcb.body.step(now);
        let end = clock.now();

        match result {
            Ok(()) => {
                if tcb.config.profile {
                    tcb.profile.record(time::elapsed(now, end));
                }
                let missed_before = tcb.missed;
                tcb.record_run(end);
                if tcb.missed != missed_before {
                    log_debug!(
                        "task {} skipped {} activation(s)",
                        tcb.name,
                        tcb.missed - missed_before
                    );
                }
                Dispatch::Ran(tcb.id)
            }
            Err(fault) => {
                tcb.record_fault(fault);
                log_error!("task {} faulted and is no longer scheduled: {}", tcb.name, fault);
                Dispatch::Faulted(tcb.id)
            }
        }
    }

    /// Drive the scheduler until `stop` is raised.
    pub fn run<C: Clock>(&mut self, clock: &C, stop: &StopSignal) -> RunSummary {
        self.run_loop(clock, stop, None)
    }

    /// Drive the scheduler for `span` of clock time, or until `stop` is
    /// raised, whichever comes first.
    pub fn run_for<C: Clock>(&mut self, clock: &C, span: Duration, stop: &StopSignal) -> RunSummary {
        let until = clock.now() + span;
        self.run_loop(clock, stop, Some(until))
    }

    fn run_loop<C: Clock>(&mut self, clock: &C, stop: &StopSignal, until: Option<Instant>) -> RunSummary {
        let mut summary = RunSummary::default();

        while !stop.is_raised() {
            if let Some(until) = until {
                if clock.now() >= until {
                    break;
                }
            }
            let dispatch = self.tick(clock);
            summary.record(dispatch);
            if dispatch == Dispatch::Idle {
                clock.idle();
            }
        }

        log_info!(
            "scheduler stopped: {} dispatches, {} faults",
            summary.dispatched,
            summary.faults
        );
        summary
    }

    /// First tick: every task becomes due now.
    fn start(&mut self, now: Instant) {
        for tcb in self.tasks.iter_mut() {
            tcb.next_run = now;
        }
        self.started = true;
    }

    /// Index of the task to run next, if any is ready.
    fn select(&self, now: Instant) -> Option<usize> {
        let ready = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_ready(now));

        match self.policy {
            Policy::Priority => ready
                .min_by_key(|(i, t)| (t.config.priority, t.last_dispatch, *i))
                .map(|(i, _)| i),
            Policy::RoundRobin => ready
                .min_by_key(|(i, t)| (t.last_dispatch, *i))
                .map(|(i, _)| i),
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn find(&self, name: &str) -> Option<TaskId> {
        self.tasks.iter().find(|t| t.name == name).map(|t| t.id)
    }

    pub fn snapshot(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.tasks.get(id.0).map(|t| TaskSnapshot {
            id: t.id,
            name: t.name,
            priority: t.config.priority,
            period_ms: t.config.period().map(|p| p.to_millis()),
            state: t.state,
            run_count: t.run_count,
            missed: t.missed,
            profile: t.config.profile.then_some(t.profile),
            fault: t.fault,
        })
    }

    /// Faulted tasks with the fault that parked them, in registration
    /// order.
    pub fn faults(&self) -> Vec<(TaskId, &'static str, TaskFault), MAX_TASKS> {
        self.tasks
            .iter()
            .filter_map(|t| t.fault.map(|f| (t.id, t.name, f)))
            .collect()
    }

    pub fn reset_profiles(&mut self) {
        for tcb in self.tasks.iter_mut() {
            tcb.profile.reset();
        }
    }

    /// Log one line per task: name, priority, period, state, runs, misses
    /// and, for profiled tasks, step timing.
    pub fn report(&self) {
        log_info!("task      pri  period  state      runs  missed  avg/max ms");
        for tcb in self.tasks.iter() {
            let period = tcb.config.period().map(|p| p.to_millis()).unwrap_or(0);
            if tcb.config.profile {
                log_info!(
                    "{} {} {} {:?} {} {} {}/{}",
                    tcb.name,
                    tcb.config.priority,
                    period,
                    tcb.state,
                    tcb.run_count,
                    tcb.missed,
                    tcb.profile.average_ms(),
                    tcb.profile.max_ms
                );
            } else {
                log_info!(
                    "{} {} {} {:?} {} {} -",
                    tcb.name,
                    tcb.config.priority,
                    period,
                    tcb.state,
                    tcb.run_count,
                    tcb.missed
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use core::cell::RefCell;

    /// Task body that appends its tag to a shared trace.
    struct Tagger<'t> {
        tag: char,
        trace: &'t RefCell<std::vec::Vec<char>>,
    }

    impl Task for Tagger<'_> {
        fn step(&mut self, _now: Instant) -> Result<(), TaskFault> {
            self.trace.borrow_mut().push(self.tag);
            Ok(())
        }
    }

    fn ok(_now: Instant) -> Result<(), TaskFault> {
        Ok(())
    }

    #[test]
    fn test_empty_scheduler_idles() {
        let clock = ManualClock::new();
        let mut sched = Scheduler::new(Policy::Priority);
        assert_eq!(sched.tick(&clock), Dispatch::Idle);
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn test_register_rejects_duplicates_and_overflow() {
        let mut bodies = [ok; MAX_TASKS + 1];
        let mut dup = ok;
        let names = ["t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7", "t8"];
        let mut sched = Scheduler::new(Policy::Priority);
        let mut iter = bodies.iter_mut();

        let first = iter.next().unwrap();
        assert_eq!(sched.register("t0", TaskConfig::periodic(1, 10), first), Ok(TaskId(0)));
        assert_eq!(
            sched.register("t0", TaskConfig::periodic(1, 10), &mut dup),
            Err(SchedulerError::DuplicateName)
        );

        for (name, body) in names[1..MAX_TASKS].iter().zip(iter.by_ref()) {
            sched.register(*name, TaskConfig::periodic(1, 10), body).unwrap();
        }
        let last = iter.next().unwrap();
        assert_eq!(
            sched.register(names[MAX_TASKS], TaskConfig::periodic(1, 10), last),
            Err(SchedulerError::TooManyTasks)
        );
    }

    #[test]
    fn test_registration_closed_after_start() {
        let clock = ManualClock::new();
        let mut a = ok;
        let mut b = ok;
        let mut sched = Scheduler::new(Policy::Priority);
        sched.register("a", TaskConfig::periodic(0, 10), &mut a).unwrap();
        sched.tick(&clock);
        assert_eq!(
            sched.register("b", TaskConfig::periodic(0, 10), &mut b),
            Err(SchedulerError::AlreadyStarted)
        );
    }

    #[test]
    fn test_priority_order() {
        let clock = ManualClock::new();
        let trace = RefCell::new(std::vec::Vec::new());
        let mut low = Tagger { tag: 'L', trace: &trace };
        let mut high = Tagger { tag: 'H', trace: &trace };
        let mut mid = Tagger { tag: 'M', trace: &trace };

        let mut sched = Scheduler::new(Policy::Priority);
        sched.register("low", TaskConfig::periodic(3, 100), &mut low).unwrap();
        sched.register("high", TaskConfig::periodic(0, 100), &mut high).unwrap();
        sched.register("mid", TaskConfig::periodic(1, 100), &mut mid).unwrap();

        for _ in 0..4 {
            sched.tick(&clock);
        }
        assert_eq!(*trace.borrow(), vec!['H', 'M', 'L']);
    }

    #[test]
    fn test_equal_priority_round_robin() {
        let clock = ManualClock::new();
        let trace = RefCell::new(std::vec::Vec::new());
        let mut a = Tagger { tag: 'a', trace: &trace };
        let mut b = Tagger { tag: 'b', trace: &trace };
        let mut c = Tagger { tag: 'c', trace: &trace };

        let mut sched = Scheduler::new(Policy::Priority);
        sched.register("a", TaskConfig::periodic(2, 10), &mut a).unwrap();
        sched.register("b", TaskConfig::periodic(2, 10), &mut b).unwrap();
        sched.register("c", TaskConfig::periodic(2, 10), &mut c).unwrap();

        for _ in 0..3 {
            for _ in 0..3 {
                sched.tick(&clock);
            }
            clock.advance(Duration::millis(10));
        }
        assert_eq!(trace.borrow().iter().collect::<String>(), "abcabcabc");
    }

    #[test]
    fn test_round_robin_policy_ignores_priority() {
        let clock = ManualClock::new();
        let trace = RefCell::new(std::vec::Vec::new());
        let mut a = Tagger { tag: 'a', trace: &trace };
        let mut b = Tagger { tag: 'b', trace: &trace };

        let mut sched = Scheduler::new(Policy::RoundRobin);
        sched.register("a", TaskConfig::periodic(5, 0), &mut a).unwrap();
        sched.register("b", TaskConfig::periodic(0, 0), &mut b).unwrap();

        for _ in 0..4 {
            sched.tick(&clock);
        }
        assert_eq!(trace.borrow().iter().collect::<String>(), "abab");
    }

    #[test]
    fn test_period_gating() {
        let clock = ManualClock::new();
        let mut body = ok;
        let mut sched = Scheduler::new(Policy::Priority);
        let id = sched.register("p", TaskConfig::periodic(1, 20), &mut body).unwrap();

        assert_eq!(sched.tick(&clock), Dispatch::Ran(id));
        assert_eq!(sched.tick(&clock), Dispatch::Idle);
        clock.advance(Duration::millis(19));
        assert_eq!(sched.tick(&clock), Dispatch::Idle);
        clock.advance(Duration::millis(1));
        assert_eq!(sched.tick(&clock), Dispatch::Ran(id));
    }

    #[test]
    fn test_period_self_correction() {
        // A 7 ms task sharing the CPU with a 3 ms high-priority task that
        // takes 2 ms per step: it is often late, never drifts.
        let clock = ManualClock::new();
        let mut hog = |_now: Instant| -> Result<(), TaskFault> {
            clock.advance(Duration::millis(2));
            Ok(())
        };
        let mut victim = ok;

        let mut sched = Scheduler::new(Policy::Priority);
        sched.register("hog", TaskConfig::periodic(0, 3), &mut hog).unwrap();
        let victim_id = sched.register("victim", TaskConfig::periodic(1, 7), &mut victim).unwrap();

        let stop = StopSignal::new();
        let span_ms = 7_000;
        sched.run_for(&clock, Duration::millis(span_ms), &stop);

        let snap = sched.snapshot(victim_id).unwrap();
        let expected = span_ms / 7;
        let runs = snap.run_count;
        assert!(
            (expected - 1..=expected + 1).contains(&runs),
            "victim ran {} times, expected {}",
            runs,
            expected
        );
        assert_eq!(snap.missed, 0);
    }

    #[test]
    fn test_steady_rate_matches_period() {
        let clock = ManualClock::new();
        let mut body = ok;
        let mut sched = Scheduler::new(Policy::Priority);
        let id = sched.register("p", TaskConfig::periodic(1, 10), &mut body).unwrap();

        let stop = StopSignal::new();
        sched.run_for(&clock, Duration::millis(1_000), &stop);
        let runs = sched.snapshot(id).unwrap().run_count;
        assert!((99..=101).contains(&runs), "runs = {}", runs);
    }

    #[test]
    fn test_fault_containment() {
        let clock = ManualClock::new();
        let mut healthy_runs = 0u32;
        let mut healthy = |_now: Instant| -> Result<(), TaskFault> {
            healthy_runs += 1;
            Ok(())
        };
        let mut calls = 0u32;
        let mut flaky = |_now: Instant| -> Result<(), TaskFault> {
            calls += 1;
            if calls == 3 {
                Err(TaskFault::Internal("injected"))
            } else {
                Ok(())
            }
        };

        let summary;
        let faulty_id;
        {
            let mut sched = Scheduler::new(Policy::Priority);
            faulty_id = sched.register("flaky", TaskConfig::periodic(0, 10), &mut flaky).unwrap();
            sched.register("healthy", TaskConfig::periodic(1, 10), &mut healthy).unwrap();

            let stop = StopSignal::new();
            summary = sched.run_for(&clock, Duration::millis(500), &stop);

            let faults = sched.faults();
            assert_eq!(faults.as_slice(), &[(faulty_id, "flaky", TaskFault::Internal("injected"))]);
            let snap = sched.snapshot(faulty_id).unwrap();
            assert_eq!(snap.state, TaskState::Faulted);
            assert_eq!(snap.run_count, 2);
        }
        assert_eq!(summary.faults, 1);
        assert_eq!(calls, 3);
        assert!((49..=51).contains(&healthy_runs), "healthy ran {}", healthy_runs);
    }

    #[test]
    fn test_faults_empty_while_all_tasks_healthy() {
        let clock = ManualClock::new();
        let mut body = ok;
        let mut sched = Scheduler::new(Policy::Priority);
        sched.register("fine", TaskConfig::periodic(0, 5), &mut body).unwrap();
        let stop = StopSignal::new();
        sched.run_for(&clock, Duration::millis(50), &stop);
        assert!(sched.faults().is_empty());
    }

    #[test]
    fn test_run_summary_counters_wrap() {
        let mut summary = RunSummary {
            dispatched: u32::MAX,
            idle: u32::MAX,
            faults: u32::MAX,
        };
        summary.record(Dispatch::Idle);
        assert_eq!(summary.idle, 0);
        summary.record(Dispatch::Faulted(TaskId(0)));
        assert_eq!(summary.dispatched, 0);
        assert_eq!(summary.faults, 0);
        summary.record(Dispatch::Ran(TaskId(1)));
        assert_eq!(summary, RunSummary { dispatched: 1, idle: 0, faults: 0 });
    }

    #[test]
    fn test_stop_signal_is_checked_between_steps() {
        let clock = ManualClock::new();
        let stop = StopSignal::new();
        let mut steps = 0u32;
        let mut stopper = |_now: Instant| -> Result<(), TaskFault> {
            steps += 1;
            if steps == 5 {
                stop.raise();
            }
            Ok(())
        };

        let summary = {
            let mut sched = Scheduler::new(Policy::Priority);
            sched.register("stopper", TaskConfig::periodic(0, 1), &mut stopper).unwrap();
            sched.run(&clock, &stop)
        };
        assert_eq!(steps, 5);
        assert_eq!(summary.dispatched, 5);
        assert!(stop.is_raised());
    }

    #[test]
    fn test_triggered_task_runs_once_per_go() {
        let clock = ManualClock::new();
        let mut count = 0u32;
        let mut event = |_now: Instant| -> Result<(), TaskFault> {
            count += 1;
            Ok(())
        };
        {
            let mut sched = Scheduler::new(Policy::Priority);
            let id = sched.register("event", TaskConfig::triggered(0), &mut event).unwrap();
            assert_eq!(sched.tick(&clock), Dispatch::Idle);
            sched.go(id).unwrap();
            assert_eq!(sched.tick(&clock), Dispatch::Ran(id));
            assert_eq!(sched.tick(&clock), Dispatch::Idle);
            assert_eq!(sched.go(TaskId(9)), Err(SchedulerError::UnknownTask));
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn test_go_rejects_periodic_task() {
        let mut body = ok;
        let mut sched = Scheduler::new(Policy::Priority);
        let id = sched.register("p", TaskConfig::periodic(0, 5), &mut body).unwrap();
        assert_eq!(sched.go(id), Err(SchedulerError::NotTriggered));
    }

    #[test]
    fn test_profiling_records_step_time() {
        let clock = ManualClock::new();
        let mut slow = |_now: Instant| -> Result<(), TaskFault> {
            clock.advance(Duration::millis(3));
            Ok(())
        };
        let mut sched = Scheduler::new(Policy::Priority);
        let id = sched
            .register("slow", TaskConfig::periodic(0, 10).with_profile(), &mut slow)
            .unwrap();
        sched.tick(&clock);
        let profile = sched.snapshot(id).unwrap().profile.unwrap();
        assert_eq!(profile.samples, 1);
        assert_eq!(profile.max_ms, 3);
        sched.report();
        sched.reset_profiles();
        assert_eq!(sched.snapshot(id).unwrap().profile.unwrap().samples, 0);
        assert_eq!(sched.find("slow"), Some(id));
    }
}
