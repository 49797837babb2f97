//! Synchronization primitives — binary events and mutexes
//!
//! Events are one-bit latches: `signal` sets, entering a wait clears.
//! Mutexes are one-bit locks with no owner bookkeeping. Both live in
//! kernel-owned pools and are addressed by `Copy` handles; every access
//! validates the handle against the pool.
//!
//! Author: Moroya Sakamoto

use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{fault, Error, Fault};

/// Maximum events the kernel can hold
pub const MAX_EVENTS: usize = 8;

/// Maximum mutexes the kernel can hold
pub const MAX_MUTEXES: usize = 8;

/// Handle to one event slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventId(pub(crate) u8);

/// Handle to one mutex slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MutexId(pub(crate) u8);

/// What a waiting task is blocked on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitTarget {
    Event(EventId),
    Mutex(MutexId),
}

/// Event and mutex pools
///
/// All flags are single-word atomics accessed with relaxed ordering.
/// Signalers may run in interrupt context while the dispatch loop reads;
/// the dispatch rules tolerate observing a flag one sweep late.
pub(crate) struct SyncTable {
    /// Event latches; `true` = Triggered
    events: [AtomicBool; MAX_EVENTS],
    /// Allocated event slots
    event_count: AtomicUsize,
    /// Mutex flags; `true` = Locked
    mutexes: [AtomicBool; MAX_MUTEXES],
    /// Allocated mutex slots
    mutex_count: AtomicUsize,
}

impl SyncTable {
    /// Empty pools
    pub(crate) const fn new() -> Self {
        const UNSET: AtomicBool = AtomicBool::new(false);
        Self {
            events: [UNSET; MAX_EVENTS],
            event_count: AtomicUsize::new(0),
            mutexes: [UNSET; MAX_MUTEXES],
            mutex_count: AtomicUsize::new(0),
        }
    }

    /// Release all slots and clear all flags
    pub(crate) fn reset(&self) {
        for flag in &self.events {
            flag.store(false, Ordering::Relaxed);
        }
        for flag in &self.mutexes {
            flag.store(false, Ordering::Relaxed);
        }
        self.event_count.store(0, Ordering::Relaxed);
        self.mutex_count.store(0, Ordering::Relaxed);
    }

    /// Allocate an event slot, starting NotTriggered
    pub(crate) fn create_event(&self) -> Result<EventId, Error> {
        let idx = self.event_count.load(Ordering::Relaxed);
        if idx >= MAX_EVENTS {
            return Err(Error::TooManyEvents);
        }
        self.events[idx].store(false, Ordering::Relaxed);
        self.event_count.store(idx + 1, Ordering::Relaxed);
        Ok(EventId(idx as u8))
    }

    /// Allocate a mutex slot, starting Unlocked
    pub(crate) fn create_mutex(&self) -> Result<MutexId, Error> {
        let idx = self.mutex_count.load(Ordering::Relaxed);
        if idx >= MAX_MUTEXES {
            return Err(Error::TooManyMutexes);
        }
        self.mutexes[idx].store(false, Ordering::Relaxed);
        self.mutex_count.store(idx + 1, Ordering::Relaxed);
        Ok(MutexId(idx as u8))
    }

    fn event(&self, id: EventId) -> &AtomicBool {
        if id.0 as usize >= self.event_count.load(Ordering::Relaxed) {
            fault(Fault::BadHandle);
        }
        &self.events[id.0 as usize]
    }

    fn mutex(&self, id: MutexId) -> &AtomicBool {
        if id.0 as usize >= self.mutex_count.load(Ordering::Relaxed) {
            fault(Fault::BadHandle);
        }
        &self.mutexes[id.0 as usize]
    }

    /// Set the latch. Idempotent; callable from interrupt context.
    pub(crate) fn signal(&self, id: EventId) {
        self.event(id).store(true, Ordering::Relaxed);
    }

    /// Clear the latch. Entering a wait erases any earlier signal.
    pub(crate) fn clear(&self, id: EventId) {
        self.event(id).store(false, Ordering::Relaxed);
    }

    pub(crate) fn is_triggered(&self, id: EventId) -> bool {
        self.event(id).load(Ordering::Relaxed)
    }

    /// Mark locked. A resumed waiter stores this without re-checking.
    pub(crate) fn lock(&self, id: MutexId) {
        self.mutex(id).store(true, Ordering::Relaxed);
    }

    pub(crate) fn unlock(&self, id: MutexId) {
        self.mutex(id).store(false, Ordering::Relaxed);
    }

    pub(crate) fn is_locked(&self, id: MutexId) -> bool {
        self.mutex(id).load(Ordering::Relaxed)
    }

    /// Is the wait obstacle gone: event Triggered, mutex Unlocked
    pub(crate) fn is_clear(&self, target: WaitTarget) -> bool {
        match target {
            WaitTarget::Event(id) => self.is_triggered(id),
            WaitTarget::Mutex(id) => !self.is_locked(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_pool_capacity() {
        let table = SyncTable::new();
        for i in 0..MAX_EVENTS {
            let id = table.create_event().unwrap();
            assert_eq!(id, EventId(i as u8));
        }
        assert_eq!(table.create_event(), Err(Error::TooManyEvents));
    }

    #[test]
    fn mutex_pool_capacity() {
        let table = SyncTable::new();
        for _ in 0..MAX_MUTEXES {
            table.create_mutex().unwrap();
        }
        assert_eq!(table.create_mutex(), Err(Error::TooManyMutexes));
    }

    #[test]
    fn signal_sets_clear_erases() {
        let table = SyncTable::new();
        let e = table.create_event().unwrap();
        assert!(!table.is_triggered(e));

        table.signal(e);
        assert!(table.is_triggered(e));
        table.signal(e);
        assert!(table.is_triggered(e));

        table.clear(e);
        assert!(!table.is_triggered(e));
    }

    #[test]
    fn lock_unlock() {
        let table = SyncTable::new();
        let m = table.create_mutex().unwrap();
        assert!(!table.is_locked(m));
        table.lock(m);
        assert!(table.is_locked(m));
        table.unlock(m);
        assert!(!table.is_locked(m));
    }

    #[test]
    fn clear_means_ready() {
        let table = SyncTable::new();
        let e = table.create_event().unwrap();
        let m = table.create_mutex().unwrap();

        assert!(!table.is_clear(WaitTarget::Event(e)));
        table.signal(e);
        assert!(table.is_clear(WaitTarget::Event(e)));

        assert!(table.is_clear(WaitTarget::Mutex(m)));
        table.lock(m);
        assert!(!table.is_clear(WaitTarget::Mutex(m)));
    }

    #[test]
    #[should_panic(expected = "stale or out-of-range handle")]
    fn stale_handle_faults() {
        let table = SyncTable::new();
        let e = table.create_event().unwrap();
        table.reset();
        table.signal(e);
    }
}
