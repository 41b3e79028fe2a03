//! # Hypervisor Page-Group Allocator
//!
//! A buddy allocator handing out physically contiguous, power-of-two sized
//! groups of 4 KiB pages, with per-group reference counts. It runs at EL2
//! without a heap: all bookkeeping lives in a caller-provided descriptor
//! table (the *vmemmap*) with one [`PageDescriptor`] per physical page.
//!
//! ## Model
//!
//! ```text
//!  range_start                                                   range_end
//!  |<-- reserved -->|<------------------ managed pages ------------------>|
//!  | R | R | R | R  |     order 2    | o0 | o0 |    order 1   |  ...      |
//!                   ^ head: order=2   ^ head  ^ head  ^ head: order=1
//!                     body: NO_ORDER                   body: NO_ORDER
//! ```
//!
//! - A **page group** of order `k` covers `2^k` pages and starts at a page
//!   index (relative to `range_start`) that is a multiple of `2^k`.
//! - Only the first page (the *head*) carries the order and the reference
//!   count; the remaining pages carry `NO_ORDER` and refcount 0.
//! - A group is **free** when it sits on the free list of its order with
//!   refcount 0, and **in use** otherwise. The reserved prefix handed to
//!   [`HypPool::init`] is permanently in use.
//! - The **buddy** of the group at index `i` of order `k` is at `i ^ 2^k`.
//!   Releasing a group merges it with free buddies of the same order as long
//!   as possible, so no two free buddies of equal order ever coexist.
//!
//! ## Components
//!
//! - [`HypPool`]: one pool, its lock, its free lists.
//! - [`EarlyAlloc`]: the bump allocator used before any pool exists; its
//!   consumption becomes the pool's reserved prefix.
//! - [`PoolRegistry`]: find the owning pool of an address.
//! - [`vmemmap_range`] / [`vmemmap_pages`]: layout of the descriptor table.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod descriptor;
mod early_alloc;
mod error;
mod free_area;
mod invariant;
mod pool;
mod registry;
mod vmemmap;

pub use descriptor::{PageDescriptor, PoolId};
pub use early_alloc::EarlyAlloc;
pub use error::{AllocError, InvariantViolation, PoolInitError, RefError, RegistryError};
pub use pool::{AllocFlags, HypPool};
pub use registry::{MAX_POOLS, PoolRegistry};
pub use vmemmap::{vmemmap_pages, vmemmap_range};

/// Largest group order; a maximal group spans `2^MAX_ORDER` pages (8 MiB).
pub const MAX_ORDER: u8 = 11;

/// Number of free lists per pool.
pub(crate) const NR_ORDERS: usize = MAX_ORDER as usize + 1;

/// Pages in a group of `order`.
#[inline]
#[must_use]
pub const fn order_pages(order: u8) -> u32 {
    1 << order
}

const _: () = {
    assert!(MAX_ORDER < 32);
};
