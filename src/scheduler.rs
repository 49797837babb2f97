//! Round-robin dispatch state — the task table and its transition rules
//!
//! One sweep visits every registered task exactly once, in registration
//! order. Whether a visit resumes the task is decided here, from the
//! control block alone:
//!
//! - Uninitialized: resume (first entry into the body)
//! - Active: resume
//! - Delayed: resume once the delay counter is zero
//! - Waiting: resume once the wait target is clear
//! - WaitingWithTimeout: resume on either condition
//!
//! An undecodable state byte is a fatal fault, as is a waiting task
//! with no wait target.
//!
//! Author: Moroya Sakamoto

use portable_atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::error::{fault, Fault};
use crate::sync::{SyncTable, WaitTarget};
use crate::task::{TaskControl, TaskId, TaskState, MAX_TASKS};

/// Scheduler state: the control block table and the dispatch counters
///
/// Interior-mutable throughout so one instance can sit behind a shared
/// reference, visible to the dispatch loop, task bodies, and the timer
/// interrupt alike.
pub struct Scheduler {
    /// Static control block table
    tcbs: [TaskControl; MAX_TASKS],
    /// Slot currently being visited or resumed
    current: AtomicUsize,
    /// Bound slots
    task_count: AtomicUsize,
    /// Completed sweeps
    sweeps: AtomicU32,
    /// Task resumptions
    resumes: AtomicU32,
    /// Timer ticks seen
    ticks: AtomicU32,
}

// Counters have a single writer; load/store avoids RMW atomics that
// baseline cores lack.
fn bump(counter: &AtomicU32) {
    let n = counter.load(Ordering::Relaxed);
    counter.store(n.wrapping_add(1), Ordering::Relaxed);
}

impl Scheduler {
    /// Empty dispatch state
    pub(crate) const fn new() -> Self {
        Self {
            tcbs: [TaskControl::INIT; MAX_TASKS],
            current: AtomicUsize::new(0),
            task_count: AtomicUsize::new(0),
            sweeps: AtomicU32::new(0),
            resumes: AtomicU32::new(0),
            ticks: AtomicU32::new(0),
        }
    }

    /// Reset every slot and counter to the fresh state.
    pub(crate) fn reset(&self) {
        for tcb in &self.tcbs {
            tcb.reset();
        }
        self.current.store(0, Ordering::Relaxed);
        self.task_count.store(0, Ordering::Relaxed);
        self.sweeps.store(0, Ordering::Relaxed);
        self.resumes.store(0, Ordering::Relaxed);
        self.ticks.store(0, Ordering::Relaxed);
    }

    /// Bind the next free slot to a new task.
    pub(crate) fn bind_slot(&self) -> TaskId {
        let idx = self.task_count.load(Ordering::Relaxed);
        self.tcbs[idx].reset();
        self.task_count.store(idx + 1, Ordering::Relaxed);
        TaskId(idx)
    }

    /// Number of bound slots
    pub fn task_count(&self) -> usize {
        self.task_count.load(Ordering::Relaxed)
    }

    /// Slot currently being visited or resumed
    pub fn current(&self) -> TaskId {
        TaskId(self.current.load(Ordering::Relaxed))
    }

    pub(crate) fn set_current(&self, idx: usize) {
        self.current.store(idx, Ordering::Relaxed);
    }

    /// State of a bound slot; stale handles fault.
    pub(crate) fn state_of(&self, task: TaskId) -> TaskState {
        if task.0 >= self.task_count() {
            fault(Fault::BadHandle);
        }
        match self.tcbs[task.0].state() {
            Some(state) => state,
            None => fault(Fault::UnknownState),
        }
    }

    /// Control block of the running task, checked Active.
    ///
    /// Suspension points arm through this. Arming from anywhere but the
    /// task the dispatch loop just resumed is a fault.
    pub(crate) fn begin_suspend(&self) -> &TaskControl {
        let idx = self.current.load(Ordering::Relaxed);
        let tcb = &self.tcbs[idx];
        match tcb.state() {
            Some(TaskState::Active) => tcb,
            Some(_) => fault(Fault::SuspendNotActive),
            None => fault(Fault::UnknownState),
        }
    }

    /// Apply the transition table to one slot.
    pub(crate) fn should_resume(&self, idx: usize, sync: &SyncTable) -> bool {
        let tcb = &self.tcbs[idx];
        let state = match tcb.state() {
            Some(state) => state,
            None => fault(Fault::UnknownState),
        };
        match state {
            TaskState::Uninitialized | TaskState::Active => true,
            TaskState::Delayed => tcb.delay() == 0,
            TaskState::Waiting => sync.is_clear(self.wait_target_of(idx)),
            TaskState::WaitingWithTimeout => {
                sync.is_clear(self.wait_target_of(idx)) || tcb.delay() == 0
            }
        }
    }

    fn wait_target_of(&self, idx: usize) -> WaitTarget {
        match self.tcbs[idx].wait_target() {
            Some(target) => target,
            None => fault(Fault::MissingWaitTarget),
        }
    }

    /// Mark a slot Active and drop its wait target before polling.
    pub(crate) fn begin_resume(&self, idx: usize) {
        let tcb = &self.tcbs[idx];
        tcb.set_state(TaskState::Active);
        tcb.clear_wait();
        bump(&self.resumes);
    }

    /// Age every bound delay counter by one tick.
    ///
    /// The timer interrupt enters here. Only `delay` words are touched;
    /// states and wait targets belong to the dispatch loop.
    pub(crate) fn age_delays(&self) {
        let n = self.task_count.load(Ordering::Relaxed);
        for tcb in &self.tcbs[..n] {
            tcb.age_delay();
        }
        bump(&self.ticks);
    }

    pub(crate) fn finish_sweep(&self) {
        bump(&self.sweeps);
    }

    pub(crate) fn sweep_count(&self) -> u32 {
        self.sweeps.load(Ordering::Relaxed)
    }

    pub(crate) fn resume_count(&self) -> u32 {
        self.resumes.load(Ordering::Relaxed)
    }

    pub(crate) fn tick_count(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncTable;

    #[test]
    fn fresh_scheduler() {
        let sched = Scheduler::new();
        assert_eq!(sched.task_count(), 0);
        assert_eq!(sched.current(), TaskId(0));
    }

    #[test]
    fn binds_slots_in_order() {
        let sched = Scheduler::new();
        assert_eq!(sched.bind_slot(), TaskId(0));
        assert_eq!(sched.bind_slot(), TaskId(1));
        assert_eq!(sched.task_count(), 2);
        assert_eq!(sched.state_of(TaskId(1)), TaskState::Uninitialized);
    }

    #[test]
    fn uninitialized_and_active_always_resume() {
        let sched = Scheduler::new();
        let sync = SyncTable::new();
        sched.bind_slot();
        assert!(sched.should_resume(0, &sync));

        sched.begin_resume(0);
        assert!(sched.should_resume(0, &sync));
    }

    #[test]
    fn delayed_resumes_after_aging() {
        let sched = Scheduler::new();
        let sync = SyncTable::new();
        sched.bind_slot();
        sched.begin_resume(0);

        let tcb = sched.begin_suspend();
        tcb.set_delay(2);
        tcb.set_state(TaskState::Delayed);
        assert!(!sched.should_resume(0, &sync));

        sched.age_delays();
        assert!(!sched.should_resume(0, &sync));
        sched.age_delays();
        assert!(sched.should_resume(0, &sync));
    }

    #[test]
    fn waiting_gates_on_event() {
        let sched = Scheduler::new();
        let sync = SyncTable::new();
        let e = sync.create_event().unwrap();
        sched.bind_slot();
        sched.begin_resume(0);

        let tcb = sched.begin_suspend();
        tcb.set_wait(WaitTarget::Event(e));
        tcb.set_state(TaskState::Waiting);
        assert!(!sched.should_resume(0, &sync));

        sync.signal(e);
        assert!(sched.should_resume(0, &sync));
    }

    #[test]
    fn timeout_resumes_on_either_condition() {
        let sched = Scheduler::new();
        let sync = SyncTable::new();
        let e = sync.create_event().unwrap();
        sched.bind_slot();
        sched.begin_resume(0);

        let tcb = sched.begin_suspend();
        tcb.set_wait(WaitTarget::Event(e));
        tcb.set_delay(2);
        tcb.set_state(TaskState::WaitingWithTimeout);
        assert!(!sched.should_resume(0, &sync));

        sched.age_delays();
        sched.age_delays();
        assert!(sched.should_resume(0, &sync));

        tcb.set_delay(5);
        assert!(!sched.should_resume(0, &sync));
        sync.signal(e);
        assert!(sched.should_resume(0, &sync));
    }

    #[test]
    fn resume_clears_wait_target() {
        let sched = Scheduler::new();
        let sync = SyncTable::new();
        let e = sync.create_event().unwrap();
        sched.bind_slot();
        sched.begin_resume(0);

        let tcb = sched.begin_suspend();
        tcb.set_wait(WaitTarget::Event(e));
        tcb.set_state(TaskState::Waiting);

        sched.begin_resume(0);
        assert_eq!(sched.state_of(TaskId(0)), TaskState::Active);
        assert_eq!(tcb.wait_target(), None);
    }

    #[test]
    fn aging_touches_only_bound_slots() {
        let sched = Scheduler::new();
        sched.bind_slot();
        let tcb = {
            sched.begin_resume(0);
            sched.begin_suspend()
        };
        tcb.set_delay(3);
        sched.age_delays();
        assert_eq!(tcb.delay(), 2);
        assert_eq!(sched.tick_count(), 1);
    }

    #[test]
    #[should_panic(expected = "waiting task has no wait target")]
    fn waiting_without_target_faults() {
        let sched = Scheduler::new();
        let sync = SyncTable::new();
        sched.bind_slot();
        sched.begin_resume(0);
        sched.begin_suspend().set_state(TaskState::Waiting);
        sched.should_resume(0, &sync);
    }

    #[test]
    #[should_panic(expected = "unknown task state")]
    fn corrupt_state_byte_faults() {
        let sched = Scheduler::new();
        let sync = SyncTable::new();
        sched.bind_slot();
        sched.begin_resume(0);
        sched.begin_suspend().set_state_raw(9);
        sched.should_resume(0, &sync);
    }

    #[test]
    #[should_panic(expected = "suspend outside a running task")]
    fn suspend_from_parked_task_faults() {
        let sched = Scheduler::new();
        sched.bind_slot();
        sched.begin_suspend();
    }

    #[test]
    #[should_panic(expected = "stale or out-of-range handle")]
    fn stale_task_id_faults() {
        let sched = Scheduler::new();
        sched.bind_slot();
        sched.reset();
        sched.state_of(TaskId(0));
    }
}
