//! Error taxonomy — recoverable errors and fatal kernel faults
//!
//! Capacity problems come back as `Result`s. Broken kernel invariants do
//! not: they go through [`fault`], which reports and panics so the
//! application's panic handler (the platform fatal-error hook) takes over.
//!
//! Author: Moroya Sakamoto

use core::fmt;

/// Recoverable errors returned from registration and allocation calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Task table is full (capacity `MAX_TASKS`)
    TooManyTasks,
    /// Event pool is exhausted (capacity `MAX_EVENTS`)
    TooManyEvents,
    /// Mutex pool is exhausted (capacity `MAX_MUTEXES`)
    TooManyMutexes,
}

impl Error {
    fn as_str(self) -> &'static str {
        match self {
            Error::TooManyTasks => "task table full",
            Error::TooManyEvents => "event pool exhausted",
            Error::TooManyMutexes => "mutex pool exhausted",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal invariant violations; the kernel reports these and panics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// A task body completed instead of suspending
    TaskReturned,
    /// A task control block holds an undecodable state byte
    UnknownState,
    /// A waiting task has no wait target recorded
    MissingWaitTarget,
    /// A handle names a slot outside its pool
    BadHandle,
    /// A suspension point was armed while the task was not running
    SuspendNotActive,
    /// The dispatch loop was started with an empty task set
    NoTasks,
}

impl Fault {
    fn as_str(self) -> &'static str {
        match self {
            Fault::TaskReturned => "task returned without yielding",
            Fault::UnknownState => "unknown task state",
            Fault::MissingWaitTarget => "waiting task has no wait target",
            Fault::BadHandle => "stale or out-of-range handle",
            Fault::SuspendNotActive => "suspend outside a running task",
            Fault::NoTasks => "run with no registered tasks",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report a fatal fault and hand control to the panic handler.
///
/// Never returns; the kernel treats every fault as unrecoverable.
pub(crate) fn fault(cause: Fault) -> ! {
    #[cfg(feature = "defmt")]
    defmt::error!("kernel fault: {}", cause);
    panic!("kernel fault: {}", cause);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        assert_eq!(Error::TooManyTasks.as_str(), "task table full");
        assert_eq!(Error::TooManyEvents.as_str(), "event pool exhausted");
        assert_eq!(Error::TooManyMutexes.as_str(), "mutex pool exhausted");
    }

    #[test]
    fn fault_messages() {
        assert_eq!(Fault::TaskReturned.as_str(), "task returned without yielding");
        assert_eq!(Fault::NoTasks.as_str(), "run with no registered tasks");
    }

    #[test]
    #[should_panic(expected = "kernel fault: unknown task state")]
    fn fault_panics() {
        fault(Fault::UnknownState);
    }
}
