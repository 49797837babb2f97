//! Task bookkeeping — control blocks and the task registry
//!
//! A task is a pinned future that never completes; its state machine is
//! the saved continuation, so a single shared stack serves every task.
//! The control block keeps dispatch state in three single-word atomics
//! shared between the dispatch loop and the timer interrupt.
//!
//! Author: Moroya Sakamoto

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use heapless::Vec;
use portable_atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering};

use crate::sync::{EventId, MutexId, WaitTarget};

/// Maximum tasks the kernel can manage
pub const MAX_TASKS: usize = 20;

/// Task entry point: a pinned future that yields forever
pub type TaskFuture<'a> = Pin<&'a mut dyn Future<Output = ()>>;

/// Handle to one registered task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// Slot index; registration order equals dispatch order
    pub fn index(self) -> usize {
        self.0
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TaskState {
    /// Registered, body not yet entered
    Uninitialized = 0,
    /// Runnable; resumed on every visit
    Active = 1,
    /// Parked until the delay counter reaches zero
    Delayed = 2,
    /// Parked until the wait target clears
    Waiting = 3,
    /// Parked until the wait target clears or the delay reaches zero
    WaitingWithTimeout = 4,
}

impl TaskState {
    pub(crate) const fn raw(self) -> u8 {
        self as u8
    }

    /// Decode a state byte; `None` marks table corruption.
    pub(crate) fn decode(raw: u8) -> Option<TaskState> {
        match raw {
            0 => Some(TaskState::Uninitialized),
            1 => Some(TaskState::Active),
            2 => Some(TaskState::Delayed),
            3 => Some(TaskState::Waiting),
            4 => Some(TaskState::WaitingWithTimeout),
            _ => None,
        }
    }
}

// Wait word layout: high byte selects the kind, low byte the pool index.
const WAIT_NONE: u16 = 0;
const WAIT_EVENT: u16 = 0x0100;
const WAIT_MUTEX: u16 = 0x0200;
const WAIT_KIND: u16 = 0xff00;
const WAIT_INDEX: u16 = 0x00ff;

fn encode_wait(target: WaitTarget) -> u16 {
    match target {
        WaitTarget::Event(EventId(i)) => WAIT_EVENT | i as u16,
        WaitTarget::Mutex(MutexId(i)) => WAIT_MUTEX | i as u16,
    }
}

fn decode_wait(raw: u16) -> Option<WaitTarget> {
    let idx = (raw & WAIT_INDEX) as u8;
    match raw & WAIT_KIND {
        WAIT_EVENT => Some(WaitTarget::Event(EventId(idx))),
        WAIT_MUTEX => Some(WaitTarget::Mutex(MutexId(idx))),
        _ => None,
    }
}

/// Task control block: 8 bytes, no heap
///
/// The timer interrupt only ever decrements `delay`; `state` and `wait`
/// have a single logical writer (the dispatch loop and the task itself,
/// which never run concurrently). Relaxed ordering everywhere: the loop
/// tolerates observing a tick one sweep late.
pub(crate) struct TaskControl {
    /// Raw [`TaskState`] byte
    state: AtomicU8,
    /// Remaining delay ticks; meaningful in Delayed and WaitingWithTimeout
    delay: AtomicU32,
    /// Packed wait target; meaningful in the two waiting states
    wait: AtomicU16,
}

impl TaskControl {
    /// Fresh slot: Uninitialized, no delay, no wait target
    pub(crate) const INIT: TaskControl = TaskControl {
        state: AtomicU8::new(TaskState::Uninitialized.raw()),
        delay: AtomicU32::new(0),
        wait: AtomicU16::new(WAIT_NONE),
    };

    pub(crate) fn reset(&self) {
        self.state.store(TaskState::Uninitialized.raw(), Ordering::Relaxed);
        self.delay.store(0, Ordering::Relaxed);
        self.wait.store(WAIT_NONE, Ordering::Relaxed);
    }

    pub(crate) fn state(&self) -> Option<TaskState> {
        TaskState::decode(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state.raw(), Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn set_state_raw(&self, raw: u8) {
        self.state.store(raw, Ordering::Relaxed);
    }

    pub(crate) fn delay(&self) -> u32 {
        self.delay.load(Ordering::Relaxed)
    }

    pub(crate) fn set_delay(&self, ticks: u32) {
        self.delay.store(ticks, Ordering::Relaxed);
    }

    /// One timer tick: a nonzero delay decrements, zero stays zero.
    pub(crate) fn age_delay(&self) {
        let d = self.delay.load(Ordering::Relaxed);
        if d != 0 {
            self.delay.store(d - 1, Ordering::Relaxed);
        }
    }

    pub(crate) fn wait_target(&self) -> Option<WaitTarget> {
        decode_wait(self.wait.load(Ordering::Relaxed))
    }

    pub(crate) fn set_wait(&self, target: WaitTarget) {
        self.wait.store(encode_wait(target), Ordering::Relaxed);
    }

    pub(crate) fn clear_wait(&self) {
        self.wait.store(WAIT_NONE, Ordering::Relaxed);
    }
}

/// Fixed-capacity task registry; registration order is dispatch order
///
/// Holds the pinned task futures. The futures must be pinned before the
/// set is built and outlive it; `run` borrows the set exclusively, so no
/// task can be added once dispatch has started.
pub struct TaskSet<'a> {
    slots: Vec<TaskFuture<'a>, MAX_TASKS>,
}

impl<'a> TaskSet<'a> {
    /// Empty registry
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Registered task count
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn push(&mut self, task: TaskFuture<'a>) -> Result<(), TaskFuture<'a>> {
        self.slots.push(task)
    }

    pub(crate) fn poll(&mut self, idx: usize, cx: &mut Context<'_>) -> Poll<()> {
        self.slots[idx].as_mut().poll(cx)
    }
}
