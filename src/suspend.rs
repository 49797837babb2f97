//! Suspension points — futures that park the running task
//!
//! Every blocking operation is a two-phase future. The first poll writes
//! the task's wish into its control block and returns `Pending`, handing
//! the shared stack back to the dispatch loop. The next poll happens only
//! after the dispatch rules let the task resume, so it completes.
//!
//! The dispatch loop polls with a no-op waker: readiness lives in the
//! control blocks, not in waker plumbing.
//!
//! Author: Moroya Sakamoto

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use crate::scheduler::Scheduler;
use crate::sync::{EventId, MutexId, SyncTable, WaitTarget};
use crate::task::TaskState;

static NOOP_VTABLE: RawWakerVTable = RawWakerVTable::new(
    |p| RawWaker::new(p, &NOOP_VTABLE),
    |_| (),
    |_| (),
    |_| (),
);

/// Waker the dispatch loop polls with; waking is a no-op.
///
/// Safety: none of the vtable functions touch the data pointer, so null
/// satisfies the `RawWaker` contract.
pub(crate) fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &NOOP_VTABLE)) }
}

/// One-sweep pause; the task stays Active and is resumed on the next
/// visit.
pub struct YieldNow<'a> {
    sched: &'a Scheduler,
    armed: bool,
}

impl<'a> YieldNow<'a> {
    pub(crate) fn new(sched: &'a Scheduler) -> Self {
        Self { sched, armed: false }
    }
}

impl Future for YieldNow<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.armed {
            return Poll::Ready(());
        }
        self.sched.begin_suspend();
        self.armed = true;
        Poll::Pending
    }
}

/// Tick-counted pause. Zero ticks completes without suspending.
pub struct Delay<'a> {
    sched: &'a Scheduler,
    ticks: u32,
    armed: bool,
}

impl<'a> Delay<'a> {
    pub(crate) fn new(sched: &'a Scheduler, ticks: u32) -> Self {
        Self { sched, ticks, armed: false }
    }
}

impl Future for Delay<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.armed || self.ticks == 0 {
            return Poll::Ready(());
        }
        let tcb = self.sched.begin_suspend();
        tcb.set_delay(self.ticks);
        tcb.set_state(TaskState::Delayed);
        self.armed = true;
        Poll::Pending
    }
}

/// Wait for an event, optionally bounded by a tick timeout.
///
/// Arming clears the latch, so a signal delivered before the wait began
/// is erased; only signals arriving while waiting wake the task.
/// Resolves to `true` when the event fired and `false` when the timeout
/// ran out first. A timeout of zero waits unbounded.
pub struct WaitEvent<'a> {
    sched: &'a Scheduler,
    sync: &'a SyncTable,
    event: EventId,
    timeout: u32,
    armed: bool,
}

impl<'a> WaitEvent<'a> {
    pub(crate) fn new(
        sched: &'a Scheduler,
        sync: &'a SyncTable,
        event: EventId,
        timeout: u32,
    ) -> Self {
        Self { sched, sync, event, timeout, armed: false }
    }
}

impl Future for WaitEvent<'_> {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<bool> {
        if self.armed {
            return Poll::Ready(self.sync.is_triggered(self.event));
        }
        let tcb = self.sched.begin_suspend();
        self.sync.clear(self.event);
        tcb.set_wait(WaitTarget::Event(self.event));
        if self.timeout == 0 {
            tcb.set_state(TaskState::Waiting);
        } else {
            tcb.set_delay(self.timeout);
            tcb.set_state(TaskState::WaitingWithTimeout);
        }
        self.armed = true;
        Poll::Pending
    }
}

/// Queue on a mutex; resuming marks it Locked without re-checking.
///
/// Contention resolves in visit order: the first waiter the dispatch
/// loop reaches after an unlock takes the mutex, regardless of how long
/// the others have been queued.
pub struct LockMutex<'a> {
    sched: &'a Scheduler,
    sync: &'a SyncTable,
    mutex: MutexId,
    armed: bool,
}

impl<'a> LockMutex<'a> {
    pub(crate) fn new(sched: &'a Scheduler, sync: &'a SyncTable, mutex: MutexId) -> Self {
        Self { sched, sync, mutex, armed: false }
    }
}

impl Future for LockMutex<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.armed {
            self.sync.lock(self.mutex);
            return Poll::Ready(());
        }
        let tcb = self.sched.begin_suspend();
        // Handle check before queuing on the slot.
        let _ = self.sync.is_locked(self.mutex);
        tcb.set_wait(WaitTarget::Mutex(self.mutex));
        tcb.set_state(TaskState::Waiting);
        self.armed = true;
        Poll::Pending
    }
}
