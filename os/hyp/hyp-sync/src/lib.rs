//! # Hypervisor synchronization primitives
//!
//! A single fair ticket [`SpinLock`]: the only blocking primitive available
//! at EL2. Waiters are served strictly in arrival order, so a CPU hammering a
//! page pool cannot starve another.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
