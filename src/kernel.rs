//! Kernel — top-level cooperative dispatcher
//!
//! Combines the scheduler table and the sync pools into one instance.
//! Firmware pins its task futures, registers them into a `TaskSet`,
//! wires the periodic timer interrupt to `tick`, and hands the set to
//! `run`, which never returns.
//!
//! Author: Moroya Sakamoto

use core::task::Context;

use crate::error::{fault, Error, Fault};
use crate::scheduler::Scheduler;
use crate::suspend::{noop_waker, Delay, LockMutex, WaitEvent, YieldNow};
use crate::sync::{EventId, MutexId, SyncTable};
use crate::task::{TaskFuture, TaskId, TaskSet, TaskState};

/// Cooperative kernel: dispatch driver and operation surface
///
/// All kernel state lives in single-word atomics, so every method takes
/// `&self` and one instance (typically a `static`) is shared between the
/// dispatch loop, the task bodies, and the timer interrupt.
pub struct Kernel {
    /// Dispatch state
    scheduler: Scheduler,
    /// Event and mutex pools
    sync: SyncTable,
}

impl Kernel {
    /// Kernel with fresh bookkeeping; usable as a `static`.
    pub const fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            sync: SyncTable::new(),
        }
    }

    /// Reset all bookkeeping: control blocks, cursor, counters, pools.
    ///
    /// For restart flows. Call before any task is registered; handles
    /// from before the reset are stale afterwards.
    pub fn init(&self) {
        self.scheduler.reset();
        self.sync.reset();
    }

    /// Register a task. Registration order is dispatch order.
    pub fn register<'t>(
        &self,
        tasks: &mut TaskSet<'t>,
        task: TaskFuture<'t>,
    ) -> Result<TaskId, Error> {
        if tasks.push(task).is_err() {
            return Err(Error::TooManyTasks);
        }
        let id = self.scheduler.bind_slot();
        #[cfg(feature = "defmt")]
        defmt::trace!("task {} registered", id.index());
        Ok(id)
    }

    /// Hand control to the dispatch loop. Never returns.
    ///
    /// Faults if the task set is empty.
    pub fn run(&self, tasks: &mut TaskSet<'_>) -> ! {
        if tasks.is_empty() {
            fault(Fault::NoTasks);
        }
        loop {
            self.sweep(tasks);
        }
    }

    /// One full round-robin pass over the task set.
    ///
    /// Visits every task exactly once in registration order, resuming
    /// those the transition rules allow, and returns how many resumed.
    /// Test drivers call this directly; firmware uses `run`.
    pub fn sweep(&self, tasks: &mut TaskSet<'_>) -> usize {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut resumed = 0;

        for idx in 0..tasks.len() {
            self.scheduler.set_current(idx);
            if !self.scheduler.should_resume(idx, &self.sync) {
                continue;
            }
            self.scheduler.begin_resume(idx);
            #[cfg(feature = "defmt")]
            defmt::trace!("resume task {}", idx);
            resumed += 1;

            if tasks.poll(idx, &mut cx).is_ready() {
                fault(Fault::TaskReturned);
            }
        }

        self.scheduler.finish_sweep();
        resumed
    }

    /// Drive a fixed number of sweeps with one timer tick between
    /// consecutive sweeps, then return the counter snapshot.
    ///
    /// Deterministic lockstep driver for tests and host simulation.
    pub fn run_for(&self, tasks: &mut TaskSet<'_>, sweeps: u32) -> KernelStats {
        for i in 0..sweeps {
            if i != 0 {
                self.tick();
            }
            self.sweep(tasks);
        }
        self.stats()
    }

    /// Timer interrupt entry: age every delay counter by one tick.
    ///
    /// Call at a fixed period from the platform timer interrupt; delays
    /// and timeouts are measured in these ticks.
    pub fn tick(&self) {
        self.scheduler.age_delays();
    }

    /// Give the rest of the task set one visit, then continue.
    pub fn yield_now(&self) -> YieldNow<'_> {
        YieldNow::new(&self.scheduler)
    }

    /// Park the calling task for `ticks` timer ticks.
    pub fn delay(&self, ticks: u32) -> Delay<'_> {
        Delay::new(&self.scheduler, ticks)
    }

    /// Park the calling task until `event` is signaled, or until
    /// `timeout` ticks pass (zero waits unbounded). Resolves to `false`
    /// on timeout.
    pub fn wait_event(&self, event: EventId, timeout: u32) -> WaitEvent<'_> {
        WaitEvent::new(&self.scheduler, &self.sync, event, timeout)
    }

    /// Trigger `event`. Idempotent; callable from interrupt context.
    pub fn signal_event(&self, event: EventId) {
        self.sync.signal(event);
    }

    /// Queue the calling task on `mutex`; it holds the mutex once
    /// resumed. No ownership is recorded and no fairness is promised
    /// beyond round-robin visit order.
    pub fn lock_mutex(&self, mutex: MutexId) -> LockMutex<'_> {
        LockMutex::new(&self.scheduler, &self.sync, mutex)
    }

    /// Release `mutex`. No ownership check is performed.
    pub fn unlock_mutex(&self, mutex: MutexId) {
        self.sync.unlock(mutex);
    }

    /// Park the calling task until `condition` returns true.
    ///
    /// The condition is checked before the first yield, so a condition
    /// that already holds never suspends, and re-checked once per visit
    /// afterwards.
    pub async fn wait_until<F>(&self, mut condition: F)
    where
        F: FnMut() -> bool,
    {
        while !condition() {
            self.yield_now().await;
        }
    }

    /// Allocate an event, starting NotTriggered.
    pub fn create_event(&self) -> Result<EventId, Error> {
        self.sync.create_event()
    }

    /// Allocate a mutex, starting Unlocked.
    pub fn create_mutex(&self) -> Result<MutexId, Error> {
        self.sync.create_mutex()
    }

    /// Registered task count
    pub fn task_count(&self) -> usize {
        self.scheduler.task_count()
    }

    /// Task the dispatch loop is visiting or resumed last
    pub fn current_task(&self) -> TaskId {
        self.scheduler.current()
    }

    /// Lifecycle state of a registered task
    pub fn task_state(&self, task: TaskId) -> TaskState {
        self.scheduler.state_of(task)
    }

    /// Counter snapshot
    pub fn stats(&self) -> KernelStats {
        KernelStats {
            tasks: self.scheduler.task_count(),
            sweeps: self.scheduler.sweep_count(),
            resumes: self.scheduler.resume_count(),
            ticks: self.scheduler.tick_count(),
        }
    }
}

/// Kernel counter snapshot
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KernelStats {
    /// Registered tasks
    pub tasks: usize,
    /// Completed sweeps
    pub sweeps: u32,
    /// Task resumptions
    pub resumes: u32,
    /// Timer ticks seen
    pub ticks: u32,
}
