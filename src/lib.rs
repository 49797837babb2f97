//! tickos — Cooperative Run-To-Yield Kernel
//!
//! Don't switch stacks, switch state machines.
//!
//! Minimal cooperative kernel for single-core microcontrollers:
//! - Static task table (no heap, no allocation)
//! - Round-robin dispatch over async run-to-yield tasks
//! - Binary events and mutexes, tick-driven delays and timeouts
//! - Load/store atomics only, runs on cores without RMW support
//!
//! Author: Moroya Sakamoto

#![no_std]

pub mod error;
pub mod task;
pub mod sync;
pub mod scheduler;
pub mod suspend;
pub mod kernel;

pub use error::{Error, Fault};
pub use task::{TaskFuture, TaskId, TaskSet, TaskState, MAX_TASKS};
pub use sync::{EventId, MutexId, MAX_EVENTS, MAX_MUTEXES};
pub use suspend::{Delay, LockMutex, WaitEvent, YieldNow};
pub use kernel::{Kernel, KernelStats};
